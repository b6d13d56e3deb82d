//! Abandonment sweeper.
//!
//! Sessions whose wall-clock budget (duration + grace, minus accumulated
//! pause) is exhausted get flipped to ABANDONED. Runs on an interval in
//! `serve` mode; `sweep-abandoned` performs a single pass.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info};

use super::Orchestrator;

/// Spawn the periodic sweep loop.
pub fn spawn_sweeper(
    orchestrator: Orchestrator,
    interval_secs: u64,
    grace_minutes: i64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs,
            grace_minutes, "🧹 Abandonment sweeper started"
        );
        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            match orchestrator.sweep_abandoned(grace_minutes) {
                Ok(0) => {}
                Ok(swept) => info!(swept, "sweeper abandoned overdue sessions"),
                Err(e) => error!(error = %e, "sweep pass failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::offline_orchestrator;

    #[tokio::test]
    async fn test_sweeper_task_survives_empty_store() {
        let (orch, _rx) = offline_orchestrator();
        let handle = spawn_sweeper(orch, 1, 10);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
