//! Periodic background sync
//!
//! `BackgroundSync::spawn` fires one pass immediately and then one per
//! interval. The returned handle owns both tasks; `stop` cancels them.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::sync::SyncOrchestrator;
use crate::networks::Network;

/// Shortest allowed period; tokio intervals reject zero.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub struct BackgroundSync {
    token: CancellationToken,
    initial: JoinHandle<()>,
    periodic: JoinHandle<()>,
}

impl BackgroundSync {
    pub fn spawn(orchestrator: Arc<SyncOrchestrator>, networks: Vec<Network>, every: Duration) -> Self {
        let token = CancellationToken::new();
        let every = every.max(MIN_INTERVAL);

        log::info!(
            "[sync] Background sync started for {:?} (every {}s)",
            networks.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
            every.as_secs()
        );

        let initial = {
            let orchestrator = orchestrator.clone();
            let networks = networks.clone();
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = run_pass(&orchestrator, &networks) => {}
                }
            })
        };

        let periodic = {
            let token = token.clone();
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + every, every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = run_pass(&orchestrator, &networks) => {}
                            }
                        }
                    }
                }
                log::info!("[sync] Background sync stopped");
            })
        };

        Self { token, initial, periodic }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Cancel the timer and any in-flight pass, then wait for both tasks.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.initial.await {
            log::warn!("[sync] Initial sync task ended abnormally: {}", e);
        }
        if let Err(e) = self.periodic.await {
            log::warn!("[sync] Periodic sync task ended abnormally: {}", e);
        }
    }
}

/// Quiet cascade sync per network; on total failure, one chain scan.
/// Errors are logged and never propagated.
async fn run_pass(orchestrator: &SyncOrchestrator, networks: &[Network]) {
    for network in networks {
        let options = orchestrator.default_options();
        match orchestrator.sync(*network, &options).await {
            Ok(_) => {}
            Err(e) => {
                log::warn!("[sync] Background sync for {} failed: {}", network, e);
                match orchestrator.sync_from_chain(*network).await {
                    Ok(outcome) => log::info!(
                        "[sync] Chain fallback for {} indexed {} agents",
                        network,
                        outcome.indexed
                    ),
                    Err(e) => log::error!("[sync] Chain fallback for {} failed: {}", network, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::discovery::sync::testing::StubSource;
    use crate::discovery::SourceKind;
    use crate::models::AgentRecord;
    use tempfile::tempdir;

    #[tokio::test(start_paused = true)]
    async fn test_initial_pass_then_interval_then_stop() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("bg.db").to_str().unwrap()).unwrap());
        let rest = Arc::new(StubSource::ok(SourceKind::Rest, db.clone(), vec![AgentRecord::new(1, 8453, "0x1")]));
        let orchestrator = Arc::new(SyncOrchestrator::new(db.clone(), 1).with_source(rest.clone()));

        let handle = BackgroundSync::spawn(orchestrator, vec![Network::Base], Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rest.calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rest.calls(), 2);

        assert!(handle.is_running());
        handle.stop().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(rest.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cascade_failure_falls_back_to_chain_once() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("bg.db").to_str().unwrap()).unwrap());
        let rest = Arc::new(StubSource::failing(SourceKind::Rest, db.clone()));
        let chain = Arc::new(StubSource::ok(SourceKind::Chain, db.clone(), vec![AgentRecord::new(2, 8453, "0x2")]));
        let orchestrator = Arc::new(
            SyncOrchestrator::new(db.clone(), 1)
                .with_source(rest.clone())
                .with_chain(chain.clone()),
        );

        let handle = BackgroundSync::spawn(orchestrator, vec![Network::Base], Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(rest.calls(), 1);
        assert_eq!(chain.calls(), 1);
        assert_eq!(db.count_agents().unwrap(), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("bg.db").to_str().unwrap()).unwrap());
        let orchestrator = Arc::new(
            SyncOrchestrator::new(db.clone(), 1).with_source(Arc::new(StubSource::failing(SourceKind::Graph, db.clone()))),
        );

        let handle = BackgroundSync::spawn(orchestrator, vec![Network::Base], Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.is_running());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::new(dir.path().join("bg.db").to_str().unwrap()).unwrap());
        let rest = Arc::new(StubSource::ok(SourceKind::Rest, db.clone(), vec![AgentRecord::new(1, 8453, "0x1")]));
        let orchestrator = Arc::new(SyncOrchestrator::new(db.clone(), 1).with_source(rest.clone()));

        let handle = BackgroundSync::spawn(orchestrator, vec![Network::Base], Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(rest.calls(), 2);
        handle.stop().await;
    }
}
