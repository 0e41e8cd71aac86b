use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::evaluation::FeatureManager;

/// Refreshes the repository every `period` until `shutdown` flips to `true`
/// (or its sender is dropped). A refresh still in flight at shutdown is
/// abandoned.
pub fn spawn_refresh(
    manager: Arc<FeatureManager>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately, startup already loaded the repository
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            tokio::select! {
                result = manager.refresh() => match result {
                    Ok(()) => debug!("scheduled refresh completed"),
                    Err(e) => error!(error = %e, "scheduled refresh failed"),
                },
                _ = shutdown.changed() => break,
            }
        }

        info!("refresh scheduler stopped");
    })
}
