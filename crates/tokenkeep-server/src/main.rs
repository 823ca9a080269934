use std::sync::Arc;

use tokenkeep_auth::{AccessTokenSigner, RefreshTokenService, TokenState};
use tokenkeep_auth_postgres::PostgresAuthStorage;
use tokenkeep_server::config::loader::load_settings;
use tokenkeep_server::{ServerBuilder, Settings, jobs};

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    tokenkeep_server::observability::init_tracing();

    let settings = match load_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tokenkeep_server::observability::apply_logging_level(&settings.log_level);
    tracing::info!(env = %settings.env, addr = %settings.addr(), "Configuration loaded");

    let server = match init(settings).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

async fn init(settings: Settings) -> anyhow::Result<tokenkeep_server::TokenkeepServer> {
    let pg_config = settings.postgres_config();
    let storage = PostgresAuthStorage::connect(&pg_config).await?;
    if pg_config.run_migrations {
        storage.migrate().await?;
    }

    let token_config = settings.token_config()?;
    let service = Arc::new(RefreshTokenService::new(
        Arc::new(storage.refresh_token_storage()),
        &token_config,
    ));
    let signer = Arc::new(AccessTokenSigner::new(
        &settings.jwt_secret,
        token_config.access_ttl(),
    )?);

    match settings.purge_interval() {
        Some(interval) => {
            jobs::spawn_purge_job(Arc::clone(&service), interval);
        }
        None => tracing::info!("Token purge job disabled"),
    }

    Ok(ServerBuilder::new(settings, TokenState::new(service, signer)).build())
}
