//! Read-side façade used by the HTTP controllers

use std::sync::Arc;
use std::time::Duration;

use super::sync::{RefreshOutcome, SyncOrchestrator};
use crate::db::Database;
use crate::error::Result;
use crate::models::{AgentQuery, AgentRecord};
use crate::networks::Network;

pub struct DiscoveryService {
    db: Arc<Database>,
    orchestrator: Arc<SyncOrchestrator>,
    default_ttl: Duration,
}

impl DiscoveryService {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, default_ttl: Duration) -> Self {
        Self { db: orchestrator.db().clone(), orchestrator, default_ttl }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn search(&self, query: &AgentQuery) -> Result<Vec<AgentRecord>> {
        self.db.search_agents(query)
    }

    pub fn get(&self, network: Network, agent_id: u64) -> Result<Option<AgentRecord>> {
        self.db.get_agent(network.chain_id(), agent_id)
    }

    pub fn top_n(&self, network: Network, n: usize) -> Result<Vec<AgentRecord>> {
        self.db.top_agents(network.chain_id(), n)
    }

    pub fn remove(&self, network: Network, agent_id: u64) -> Result<bool> {
        self.db.remove_agent(network.chain_id(), agent_id)
    }

    /// Cached records on `network`.
    pub fn count(&self, network: Network) -> Result<u64> {
        self.db.count_agents_on(network.chain_id())
    }

    pub async fn refresh(&self, network: Network, ttl: Option<Duration>) -> Result<RefreshOutcome> {
        self.orchestrator.refresh_cache(network, ttl.unwrap_or(self.default_ttl)).await
    }

    pub async fn lookup_by_id(&self, agent_id: u64, network: Network) -> Result<Option<AgentRecord>> {
        self.orchestrator.lookup_by_id(agent_id, network).await
    }

    /// Search `network` after a staleness-gated refresh. A failed refresh is
    /// fatal only when that network has nothing cached to fall back on.
    pub async fn search_fresh(&self, network: Network, query: &AgentQuery) -> Result<Vec<AgentRecord>> {
        if let Err(e) = self.refresh(network, None).await {
            if self.count(network)? == 0 {
                return Err(e);
            }
            log::warn!("[discovery] Refresh for {} failed, serving cached results: {}", network, e);
        }
        self.search(&query.clone().on_chain(network.chain_id()))
    }
}
