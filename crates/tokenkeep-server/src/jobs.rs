//! Background retention job.
//!
//! Periodically deletes refresh tokens whose expiry has passed. Revoked rows
//! that have not yet expired are left in place.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokenkeep_auth::{AuthResult, RefreshTokenService};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Runs one purge pass against the current time.
pub async fn purge_once(service: &RefreshTokenService) -> AuthResult<u64> {
    service.purge_expired(OffsetDateTime::now_utc()).await
}

/// Spawns the purge loop. The first pass runs one `interval` after start.
pub fn spawn_purge_job(service: Arc<RefreshTokenService>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = interval.as_secs(), "Token purge job started");

        let Some(start) = Instant::now().checked_add(interval) else {
            tracing::error!(interval_secs = interval.as_secs(), "Token purge interval out of range");
            return;
        };
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match purge_once(&service).await {
                Ok(count) => tracing::debug!(count, "Token purge pass finished"),
                Err(e) => tracing::error!(error = %e, "Token purge pass failed"),
            }
        }
    })
}
