use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tokenkeep_auth::{TokenState, token_routes};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::Settings, handlers};

/// State for the service-level routes.
#[derive(Clone)]
pub struct AppState {
    pub env: Arc<str>,
}

pub struct TokenkeepServer {
    addr: SocketAddr,
    app: Router,
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    if settings.cors_permissive() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn build_app(settings: &Settings, tokens: TokenState) -> Router {
    let state = AppState {
        env: Arc::from(settings.env.as_str()),
    };

    Router::new()
        .route("/health", get(handlers::health))
        .with_state(state)
        .merge(token_routes(tokens))
        .layer(cors_layer(settings))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
}

pub struct ServerBuilder {
    addr: SocketAddr,
    settings: Settings,
    tokens: TokenState,
}

impl ServerBuilder {
    pub fn new(settings: Settings, tokens: TokenState) -> Self {
        Self {
            addr: settings.addr(),
            settings,
            tokens,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn build(self) -> TokenkeepServer {
        let app = build_app(&self.settings, self.tokens);

        TokenkeepServer {
            addr: self.addr,
            app,
        }
    }
}

impl TokenkeepServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
