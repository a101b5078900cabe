//! Sync orchestration
//!
//! Runs the source cascade for one network at a time, records sync state, and
//! answers staleness questions for the read path.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::sources::{GraphSource, SyncSource};
use super::{SourceKind, SyncOptions, SyncOutcome, SyncStatus};
use crate::db::Database;
use crate::error::{format_failures, DiscoveryError, Result};
use crate::models::AgentRecord;
use crate::networks::Network;

/// SyncState concerns, stored as `<network>:<concern>`
pub mod keys {
    pub const LAST_SYNC_AT: &str = "last_sync_at";
    pub const LAST_SCANNED_BLOCK: &str = "last_scanned_block";
    pub const SOURCE: &str = "source";
    pub const MIN_FEEDBACK: &str = "min_feedback";
    pub const TOTAL_AGENTS: &str = "total_agents";
    pub const INDEXED_COUNT: &str = "indexed_count";
    pub const SKIPPED_COUNT: &str = "skipped_count";
}

pub fn state_key(network: Network, concern: &str) -> String {
    format!("{}:{}", network, concern)
}

/// Result of a staleness-gated refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    pub synced: bool,
    pub count: u64,
}

/// In-memory view of a network's last sync
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStatus {
    pub status: SyncStatus,
    pub last_outcome: Option<SyncOutcome>,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct SyncOrchestrator {
    db: Arc<Database>,
    graph: Option<Arc<GraphSource>>,
    /// Automatic cascade, tried in order
    cascade: Vec<Arc<dyn SyncSource>>,
    /// Explicit last resort, never part of the cascade
    chain: Option<Arc<dyn SyncSource>>,
    default_min_feedback: u64,
    locks: DashMap<Network, Arc<tokio::sync::Mutex<()>>>,
    statuses: DashMap<Network, NetworkStatus>,
}

impl SyncOrchestrator {
    pub fn new(db: Arc<Database>, default_min_feedback: u64) -> Self {
        Self {
            db,
            graph: None,
            cascade: Vec::new(),
            chain: None,
            default_min_feedback,
            locks: DashMap::new(),
            statuses: DashMap::new(),
        }
    }

    /// The Graph source always heads the cascade and also serves point lookups.
    pub fn with_graph(mut self, graph: Arc<GraphSource>) -> Self {
        self.cascade.insert(0, graph.clone());
        self.graph = Some(graph);
        self
    }

    /// Append a fallback source to the cascade.
    pub fn with_source(mut self, source: Arc<dyn SyncSource>) -> Self {
        self.cascade.push(source);
        self
    }

    pub fn with_chain(mut self, chain: Arc<dyn SyncSource>) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn default_options(&self) -> SyncOptions {
        SyncOptions::quiet(self.default_min_feedback)
    }

    fn lock_for(&self, network: Network) -> Arc<tokio::sync::Mutex<()>> {
        self.locks.entry(network).or_default().value().clone()
    }

    fn set_status(&self, network: Network, status: SyncStatus, outcome: Option<&SyncOutcome>, error: Option<String>) {
        let mut entry = self.statuses.entry(network).or_default();
        entry.status = status;
        if let Some(outcome) = outcome {
            entry.last_outcome = Some(outcome.clone());
        }
        entry.last_error = error;
        entry.updated_at = Some(Utc::now());
    }

    pub fn status(&self, network: Network) -> NetworkStatus {
        self.statuses.get(&network).map(|s| s.value().clone()).unwrap_or_default()
    }

    /// Full sync through the cascade. A concurrent trigger for the same
    /// network waits for the running pass.
    pub async fn sync(&self, network: Network, options: &SyncOptions) -> Result<SyncOutcome> {
        let lock = self.lock_for(network);
        let _guard = lock.lock().await;
        self.sync_locked(network, options).await
    }

    async fn sync_locked(&self, network: Network, options: &SyncOptions) -> Result<SyncOutcome> {
        self.set_status(network, SyncStatus::Syncing, None, None);
        let mut failures: Vec<(SourceKind, String)> = Vec::new();

        for source in &self.cascade {
            if !source.is_available(network) {
                log::debug!("[sync] {} source not configured for {}, skipping", source.kind(), network);
                continue;
            }

            progress_start(options, source.kind(), network);
            match source.sync(network, options).await {
                Ok(outcome) => {
                    if let Err(e) = self.record_success(network, &outcome, options) {
                        self.set_status(network, SyncStatus::Failed, Some(&outcome), Some(e.to_string()));
                        return Err(e);
                    }
                    let status = if outcome.is_partial() || !failures.is_empty() {
                        SyncStatus::PartialFailure
                    } else {
                        SyncStatus::Success
                    };
                    let error = (!failures.is_empty()).then(|| format_failures(&failures));
                    self.set_status(network, status, Some(&outcome), error);
                    log::info!(
                        "[sync] {} synced from {}: {} indexed, {} skipped, {} known",
                        network,
                        outcome.source,
                        outcome.indexed,
                        outcome.skipped,
                        outcome.total_known
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    log::warn!("[sync] {} source failed for {}: {}", source.kind(), network, e);
                    failures.push((source.kind(), e.to_string()));
                }
            }
        }

        let err = DiscoveryError::AllSourcesFailed(failures);
        self.set_status(network, SyncStatus::Failed, None, Some(err.to_string()));
        Err(err)
    }

    /// Explicit chain scan, resuming after the last scanned block.
    pub async fn sync_from_chain(&self, network: Network) -> Result<SyncOutcome> {
        let chain = self
            .chain
            .clone()
            .ok_or_else(|| DiscoveryError::Config("Chain scanning is not configured".to_string()))?;
        if !chain.is_available(network) {
            return Err(DiscoveryError::Config(format!("No chain reader for {}", network)));
        }

        let lock = self.lock_for(network);
        let _guard = lock.lock().await;
        let options = self.default_options().verbose();

        self.set_status(network, SyncStatus::Syncing, None, None);
        match chain.sync(network, &options).await {
            Ok(outcome) => {
                if let Err(e) = self.record_success(network, &outcome, &options) {
                    self.set_status(network, SyncStatus::Failed, Some(&outcome), Some(e.to_string()));
                    return Err(e);
                }
                let status = if outcome.is_partial() { SyncStatus::PartialFailure } else { SyncStatus::Success };
                self.set_status(network, status, Some(&outcome), None);
                log::info!(
                    "[sync] {} chain scan: {} indexed, {} failed range(s)",
                    network,
                    outcome.indexed,
                    outcome.failed_ranges
                );
                Ok(outcome)
            }
            Err(e) => {
                self.set_status(network, SyncStatus::Failed, None, Some(e.to_string()));
                Err(e)
            }
        }
    }

    fn record_success(&self, network: Network, outcome: &SyncOutcome, options: &SyncOptions) -> Result<()> {
        let mut entries = vec![
            (state_key(network, keys::LAST_SYNC_AT), outcome.finished_at.to_rfc3339()),
            (state_key(network, keys::SOURCE), outcome.source.to_string()),
            (state_key(network, keys::MIN_FEEDBACK), options.min_feedback.to_string()),
            (state_key(network, keys::TOTAL_AGENTS), outcome.total_known.to_string()),
            (state_key(network, keys::INDEXED_COUNT), outcome.indexed.to_string()),
            (state_key(network, keys::SKIPPED_COUNT), outcome.skipped.to_string()),
        ];
        if let Some(block) = outcome.last_block {
            entries.push((state_key(network, keys::LAST_SCANNED_BLOCK), block.to_string()));
        }
        self.db.set_sync_state_many(&entries)
    }

    pub fn last_sync_at(&self, network: Network) -> Result<Option<DateTime<Utc>>> {
        let raw = self.db.get_sync_state(&state_key(network, keys::LAST_SYNC_AT))?;
        Ok(raw.and_then(|v| match DateTime::parse_from_rfc3339(&v) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                log::warn!("[sync] Unreadable last_sync_at '{}' for {}: {}", v, network, e);
                None
            }
        }))
    }

    pub fn is_stale(&self, network: Network, ttl: Duration) -> Result<bool> {
        self.is_stale_at(network, ttl, Utc::now())
    }

    /// True with no recorded sync, or when more than `ttl` has passed since it.
    pub fn is_stale_at(&self, network: Network, ttl: Duration, now: DateTime<Utc>) -> Result<bool> {
        let Some(last) = self.last_sync_at(network)? else {
            return Ok(true);
        };
        // A timestamp in the future counts as fresh
        Ok(now.signed_duration_since(last).to_std().is_ok_and(|elapsed| elapsed > ttl))
    }

    /// Sync only when stale. Staleness is re-checked under the network lock so
    /// a queued refresh after a concurrent sync is a no-op.
    pub async fn refresh_cache(&self, network: Network, ttl: Duration) -> Result<RefreshOutcome> {
        if !self.is_stale(network, ttl)? {
            return Ok(RefreshOutcome { synced: false, count: self.db.count_agents_on(network.chain_id())? });
        }

        let lock = self.lock_for(network);
        let _guard = lock.lock().await;
        if !self.is_stale(network, ttl)? {
            return Ok(RefreshOutcome { synced: false, count: self.db.count_agents_on(network.chain_id())? });
        }

        self.sync_locked(network, &self.default_options()).await?;
        Ok(RefreshOutcome { synced: true, count: self.db.count_agents_on(network.chain_id())? })
    }

    /// Store first; on a miss, a live Graph lookup that is not persisted.
    pub async fn lookup_by_id(&self, agent_id: u64, network: Network) -> Result<Option<AgentRecord>> {
        if let Some(record) = self.db.get_agent(network.chain_id(), agent_id)? {
            return Ok(Some(record));
        }
        match &self.graph {
            Some(graph) if graph.is_available(network) => {
                log::debug!("[sync] Cache miss for agent {}, querying graph", agent_id);
                graph.lookup(network, agent_id).await
            }
            _ => Ok(None),
        }
    }
}

fn progress_start(options: &SyncOptions, kind: SourceKind, network: Network) {
    super::progress!(options, "[sync] Trying {} for {}", kind, network);
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted cascade steps for orchestrator and scheduler tests.

    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes `records` on success, or fails with an upstream error.
    pub struct StubSource {
        pub kind: SourceKind,
        pub records: Vec<AgentRecord>,
        pub fail: bool,
        pub db: Arc<Database>,
        pub calls: AtomicUsize,
        pub delay: Option<Duration>,
    }

    impl StubSource {
        pub fn ok(kind: SourceKind, db: Arc<Database>, records: Vec<AgentRecord>) -> Self {
            Self { kind, records, fail: false, db, calls: AtomicUsize::new(0), delay: None }
        }

        pub fn failing(kind: SourceKind, db: Arc<Database>) -> Self {
            Self { kind, records: Vec::new(), fail: true, db, calls: AtomicUsize::new(0), delay: None }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SyncSource for StubSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn is_available(&self, _network: Network) -> bool {
            true
        }

        async fn sync(&self, _network: Network, _options: &SyncOptions) -> Result<SyncOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(DiscoveryError::upstream(Some(503), format!("{} unavailable", self.kind)));
            }
            let mut outcome = SyncOutcome::new(self.kind);
            for record in &self.records {
                self.db.upsert_agent(record)?;
                outcome.indexed += 1;
            }
            outcome.total_known = outcome.indexed;
            Ok(outcome)
        }
    }
}
