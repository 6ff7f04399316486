//! Periodic round driver.
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::engine::VotingEngine;

/// Run a voting round every poll period until `shutdown` flips.
///
/// Rounds run inline in the driver loop so they never overlap. Ticks that
/// come due while a round is still draining collapse into one catch-up round,
/// after which the original schedule resumes.
pub fn spawn_round_driver(engine: VotingEngine, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let config = engine.config().clone();
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + config.initial_delay, config.poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "[Voting] round driver started, first round in {:?}, then every {:?}",
            config.initial_delay, config.poll_period
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.run_round().await {
                        Ok(outcome) => debug!("[Voting] round finished: {:?}", outcome),
                        Err(e) => error!("[Voting] round failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("[Voting] round driver stopped");
    })
}
