use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::AppState;

/// Start the background refresh task for the main coordinator.
///
/// Returns `None` when the configured interval is 0.
pub fn start_refresh_scheduler(state: Arc<AppState>) -> Option<JoinHandle<()>> {
    if !state.config.refresh_enabled() {
        info!("Scheduled token refresh disabled");
        return None;
    }

    let period = Duration::from_secs(state.config.refresh.interval_seconds);
    info!(interval_seconds = period.as_secs(), "Scheduled token refresh enabled");
    Some(spawn_refresh_loop(state, period))
}

fn spawn_refresh_loop(state: Arc<AppState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        // First tick after one full period; startup does not refresh
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            run_refresh(&state).await;
        }
    })
}

async fn run_refresh(state: &AppState) {
    debug!("Running scheduled token refresh");

    let coordinator = match state.registry.main().await {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!(error = %e, "Scheduled refresh could not reach the coordinator");
            return;
        }
    };

    match coordinator.refresh_token().await {
        Ok(token) => info!(expires_in = ?token.expires_in, "Scheduled token refresh succeeded"),
        Err(e) => error!(error = %e, "Scheduled token refresh failed"),
    }
}
