use std::sync::Arc;

use serde_json::{Value, json};
use tokenkeep_auth::{
    AccessTokenSigner, InMemoryRefreshTokenStorage, RefreshTokenService, TokenState,
};
use tokenkeep_server::build_app;
use tokenkeep_server::config::loader::load_settings_from;
use tokio::task::JoinHandle;

struct TestServer {
    base: String,
    service: Arc<RefreshTokenService>,
    signer: Arc<AccessTokenSigner>,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

async fn start_server() -> TestServer {
    let settings = load_settings_from(
        [
            ("DATABASE_URL", "postgres://unused/test"),
            ("JWT_SECRET", "endpoint-test-secret"),
            ("ENV", "test"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
    )
    .expect("settings");

    let token_config = settings.token_config().expect("token config");
    let service = Arc::new(RefreshTokenService::new(
        Arc::new(InMemoryRefreshTokenStorage::new()),
        &token_config,
    ));
    let signer = Arc::new(
        AccessTokenSigner::new(&settings.jwt_secret, token_config.access_ttl()).expect("signer"),
    );
    let app = build_app(
        &settings,
        TokenState::new(Arc::clone(&service), Arc::clone(&signer)),
    );

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        service,
        signer,
        shutdown: tx,
        handle,
    }
}

impl TestServer {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

#[tokio::test]
async fn health_reports_environment() {
    let server = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["env"], "test");

    server.stop().await;
}

#[tokio::test]
async fn refresh_rotates_and_rejects_reuse() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let issued = server.service.issue_default(42).await.unwrap();

    let resp = client
        .post(format!("{}/auth/refresh", server.base))
        .json(&json!({ "refresh_token": issued.jti }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 15 * 60);
    let new_jti = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_jti, issued.jti);

    let claims = server
        .signer
        .verify(body["access_token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.user_id().unwrap(), 42);

    // Reusing the rotated token is refused.
    let resp = client
        .post(format!("{}/auth/refresh", server.base))
        .json(&json!({ "refresh_token": issued.jti }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "token_revoked");

    assert_eq!(server.service.validate(&new_jti).await.unwrap(), 42);

    server.stop().await;
}

#[tokio::test]
async fn error_statuses_are_distinct() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let expired = server
        .service
        .issue(7, time::Duration::seconds(-1))
        .await
        .unwrap();

    let unknown = client
        .post(format!("{}/auth/refresh", server.base))
        .json(&json!({ "refresh_token": "does-not-exist" }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 404);

    let expired = client
        .post(format!("{}/auth/refresh", server.base))
        .json(&json!({ "refresh_token": expired.jti }))
        .send()
        .await
        .unwrap();
    assert_eq!(expired.status(), 401);
    let body: Value = expired.json().await.unwrap();
    assert_eq!(body["error"], "token_expired");

    let malformed = client
        .post(format!("{}/auth/refresh", server.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), 400);

    server.stop().await;
}

#[tokio::test]
async fn revoke_and_logout_all() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let a = server.service.issue_default(5).await.unwrap();
    let b = server.service.issue_default(5).await.unwrap();
    let c = server.service.issue_default(5).await.unwrap();

    for _ in 0..2 {
        let resp = client
            .post(format!("{}/auth/revoke", server.base))
            .json(&json!({ "refresh_token": a.jti }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
    }

    let resp = client
        .post(format!("{}/auth/logout-all", server.base))
        .json(&json!({ "refresh_token": b.jti }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["revoked"], 2);

    assert!(server.service.validate(&c.jti).await.is_err());
    assert!(server.service.list_active(5).await.unwrap().is_empty());

    server.stop().await;
}
