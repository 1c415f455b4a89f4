//! Periodic game-end sweep.
//!
//! Spawns a background task that marks finished every team whose stopwatch
//! has run past the game duration. Runs on a fixed interval using
//! `tokio::time::interval` until the cancellation token fires.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use crate::hunt_manager::HuntManager;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(manager: HuntManager, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        game_duration_secs = manager.rules().game_duration.as_secs(),
        "Game-end sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Game-end sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match manager.sweep() {
                    Ok(ended) if !ended.is_empty() => {
                        tracing::info!(teams = ?ended, "Game ended by timer");
                    }
                    Ok(_) => tracing::trace!("Game-end sweep: nothing to do"),
                    Err(e) => tracing::error!(error = %e, "Game-end sweep failed"),
                }
            }
        }
    }
}

pub fn spawn(manager: HuntManager, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(manager, interval, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::hunt_manager::HuntRules;
    use crate::store::MemoryQuestStore;
    use crate::team::{TeamCredentials, TeamRegistry};

    fn manager(game_duration: Duration) -> HuntManager {
        let registry = TeamRegistry::new(vec![
            TeamCredentials { name: "TEAM1".into(), username: "red".into(), password: "ruby".into() },
            TeamCredentials { name: "TEAM2".into(), username: "blue".into(), password: "sapphire".into() },
        ]);
        let rules = HuntRules { game_duration, ..Default::default() };
        HuntManager::new(registry, Arc::new(MemoryQuestStore::new()), rules)
    }

    #[tokio::test]
    async fn test_sweeper_ends_logged_in_teams_only() {
        let manager = manager(Duration::ZERO);
        manager.login("red", "ruby").unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn(manager.clone(), Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(manager.registry().snapshot("TEAM1").unwrap().finished);
        assert!(!manager.registry().snapshot("TEAM2").unwrap().finished);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let handle = spawn(manager(Duration::from_secs(60)), Duration::from_secs(3600), cancel);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
