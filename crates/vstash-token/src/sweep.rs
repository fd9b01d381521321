//! Background expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::field::display;
use vstash_config::{log_token_debug, log_token_warn};

use crate::registry::TokenRegistry;

/// Periodically delete expired tokens until the returned task is aborted.
///
/// Lookups already refuse expired tokens; this only keeps the table from
/// growing with tokens nobody presents again.
pub fn spawn_sweeper(registry: Arc<TokenRegistry>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let registry = Arc::clone(&registry);
            match tokio::task::spawn_blocking(move || registry.sweep()).await {
                Ok(Ok(removed)) => log_token_debug!("Sweep finished", removed = removed),
                Ok(Err(e)) => log_token_warn!("Sweep failed", error = display(&e)),
                Err(e) => log_token_warn!("Sweep task panicked", error = display(&e)),
            }
        }
    })
}
