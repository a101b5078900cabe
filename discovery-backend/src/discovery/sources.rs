//! Sync strategies
//!
//! Each source pages through its backend, normalizes every record, and upserts
//! it. Per-record failures are counted and skipped; the first network-level
//! failure aborts the pass and is returned to the orchestrator.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::chain::{ChainReader, ChainScanner, EvmRpcReader, MetadataResolver};
use super::graph::{GraphClient, GRAPH_PAGE_SIZE};
use super::normalize;
use super::rest::{RestAgentItem, RestFetcher, REST_PAGE_SIZE};
use super::transport::HttpTransport;
use super::{progress, SourceKind, SyncOptions, SyncOutcome};
use crate::config::Config;
use crate::db::Database;
use crate::error::{DiscoveryError, Result};
use crate::models::AgentRecord;
use crate::networks::{self, Network};

/// One step of the sync cascade
#[async_trait]
pub trait SyncSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Whether the source is configured for `network`. Unavailable sources
    /// are skipped by the cascade without counting as a failure.
    fn is_available(&self, network: Network) -> bool;

    async fn sync(&self, network: Network, options: &SyncOptions) -> Result<SyncOutcome>;
}

/// Hosted GraphQL indexer
pub struct GraphSource {
    db: Arc<Database>,
    transport: Arc<dyn HttpTransport>,
    api_key: Option<String>,
    url_template: String,
    subgraph_ids: HashMap<Network, String>,
}

impl GraphSource {
    pub fn from_config(db: Arc<Database>, transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        let subgraph_ids = Network::all()
            .iter()
            .filter_map(|n| networks::resolve_subgraph_id(*n, config).map(|id| (*n, id)))
            .collect();
        Self {
            db,
            transport,
            api_key: config.graph_api_key.clone(),
            url_template: config.graph_url_template.clone(),
            subgraph_ids,
        }
    }

    pub fn with_subgraph(mut self, network: Network, subgraph_id: impl Into<String>) -> Self {
        self.subgraph_ids.insert(network, subgraph_id.into());
        self
    }

    fn client(&self, network: Network) -> Result<GraphClient> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DiscoveryError::Config("GRAPH_API_KEY is not set".to_string()))?;
        let subgraph_id = self
            .subgraph_ids
            .get(&network)
            .ok_or_else(|| DiscoveryError::Config(format!("No subgraph id for {}", network)))?;
        GraphClient::new(self.transport.clone(), &self.url_template, api_key, subgraph_id)
    }

    /// Single-agent lookup by registry id. Nothing is written to the store.
    pub async fn lookup(&self, network: Network, agent_id: u64) -> Result<Option<AgentRecord>> {
        let chain_id = network.chain_id();
        let composite = format!("{}:{}", chain_id, agent_id);
        match self.client(network)?.query_by_id(&composite).await? {
            Some(agent) => normalize::from_graph(&agent, chain_id).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SyncSource for GraphSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Graph
    }

    fn is_available(&self, network: Network) -> bool {
        self.api_key.is_some() && self.subgraph_ids.contains_key(&network)
    }

    async fn sync(&self, network: Network, options: &SyncOptions) -> Result<SyncOutcome> {
        let client = self.client(network)?;
        let chain_id = network.chain_id();
        let mut outcome = SyncOutcome::new(SourceKind::Graph);
        let mut skip = 0;

        loop {
            let page = if options.unfiltered {
                client.query_all(GRAPH_PAGE_SIZE, skip).await?
            } else {
                client.query_curated(GRAPH_PAGE_SIZE, skip, options.min_feedback).await?
            };
            let raw_len = page.raw_len();
            outcome.skipped += page.malformed as u64;

            for agent in &page.agents {
                match normalize::from_graph(agent, chain_id) {
                    Ok(record) if !options.unfiltered && !record.has_service_endpoint() => {
                        outcome.filtered += 1;
                    }
                    Ok(record) => {
                        self.db.upsert_agent(&record)?;
                        outcome.indexed += 1;
                    }
                    Err(e) => {
                        log::debug!("[graph] {}", e);
                        outcome.skipped += 1;
                    }
                }
            }

            progress!(
                options,
                "[graph] {} page at skip={}: {} entries, {} indexed so far",
                network,
                skip,
                raw_len,
                outcome.indexed
            );

            if raw_len < GRAPH_PAGE_SIZE {
                break;
            }
            skip += GRAPH_PAGE_SIZE;
        }

        let seen = outcome.indexed + outcome.skipped + outcome.filtered;
        outcome.total_known = match client.query_stats().await {
            Ok(stats) => stats.total_agents().unwrap_or(seen),
            Err(e) => {
                log::debug!("[graph] Stats query failed, using seen count: {}", e);
                seen
            }
        };
        outcome.finished_at = chrono::Utc::now();
        Ok(outcome)
    }
}

/// Paginated REST explorer
pub struct RestSource {
    db: Arc<Database>,
    fetcher: RestFetcher,
}

impl RestSource {
    pub fn new(db: Arc<Database>, fetcher: RestFetcher) -> Self {
        Self { db, fetcher }
    }
}

#[async_trait]
impl SyncSource for RestSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Rest
    }

    fn is_available(&self, _network: Network) -> bool {
        true
    }

    async fn sync(&self, network: Network, options: &SyncOptions) -> Result<SyncOutcome> {
        let chain_id = network.chain_id();
        let mut outcome = SyncOutcome::new(SourceKind::Rest);
        let mut offset = 0usize;

        loop {
            let page = self.fetcher.fetch_page(chain_id, REST_PAGE_SIZE, offset).await?;
            if page.items.is_empty() {
                break;
            }
            outcome.total_known = page.total;
            let count = page.items.len();

            for item in page.items {
                let record = serde_json::from_value::<RestAgentItem>(item)
                    .map_err(|e| DiscoveryError::MalformedRecord(format!("REST item: {}", e)))
                    .and_then(|item| normalize::from_rest(&item, chain_id));
                match record {
                    Ok(record) => {
                        self.db.upsert_agent(&record)?;
                        outcome.indexed += 1;
                    }
                    Err(e) => {
                        log::debug!("[rest] {}", e);
                        outcome.skipped += 1;
                    }
                }
            }

            offset += count;
            progress!(options, "[rest] {}: {}/{} items", network, offset, page.total);
            if offset as u64 >= page.total {
                break;
            }
        }

        outcome.total_known = outcome.total_known.max(offset as u64);
        outcome.finished_at = chrono::Utc::now();
        Ok(outcome)
    }
}

/// Raw mint-event scan. Never part of the automatic cascade.
pub struct ChainSource {
    db: Arc<Database>,
    readers: HashMap<Network, Arc<dyn ChainReader>>,
    resolver: MetadataResolver,
}

impl ChainSource {
    pub fn new(db: Arc<Database>, metadata_transport: Arc<dyn HttpTransport>) -> Self {
        Self { db, readers: HashMap::new(), resolver: MetadataResolver::new(metadata_transport) }
    }

    /// One JSON-RPC reader per network, endpoints resolved from config.
    pub fn from_config(db: Arc<Database>, transport: Arc<dyn HttpTransport>, config: &Config) -> Result<Self> {
        let mut source = Self::new(db, transport.clone());
        for network in Network::all() {
            let rpc_url = networks::resolve_rpc_url(*network, config);
            let reader = EvmRpcReader::new(transport.clone(), rpc_url, &network.config().identity_registry)?;
            source.readers.insert(*network, Arc::new(reader));
        }
        Ok(source)
    }

    pub fn with_reader(mut self, network: Network, reader: Arc<dyn ChainReader>) -> Self {
        self.readers.insert(network, reader);
        self
    }

    fn start_block(&self, network: Network) -> Result<u64> {
        let key = super::sync::state_key(network, super::sync::keys::LAST_SCANNED_BLOCK);
        let resumed = self
            .db
            .get_sync_state(&key)?
            .and_then(|v| v.parse::<u64>().ok())
            .map(|block| block + 1);
        Ok(resumed.unwrap_or_else(|| network.config().genesis_block))
    }
}

#[async_trait]
impl SyncSource for ChainSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Chain
    }

    fn is_available(&self, network: Network) -> bool {
        self.readers.contains_key(&network)
    }

    async fn sync(&self, network: Network, options: &SyncOptions) -> Result<SyncOutcome> {
        let reader = self
            .readers
            .get(&network)
            .cloned()
            .ok_or_else(|| DiscoveryError::Config(format!("No RPC reader for {}", network)))?;
        let chain_id = network.chain_id();
        let mut outcome = SyncOutcome::new(SourceKind::Chain);

        let head = reader.block_number().await?;
        let from = self.start_block(network)?;
        if from > head {
            progress!(options, "[chain] {} already scanned to head {}", network, head);
            outcome.last_block = Some(head);
            return Ok(outcome);
        }

        log::info!("[chain] Scanning {} blocks {}..={}", network, from, head);
        let report = ChainScanner::new(reader.clone()).scan(from, head).await;
        outcome.failed_ranges = report.failed_ranges.len() as u64;

        // A token minted twice in range keeps its latest owner
        let mints: BTreeMap<u64, _> = report.events.into_iter().map(|e| (e.agent_id, e)).collect();

        for event in mints.values() {
            let uri = match reader.token_uri(event.agent_id).await {
                Ok(uri) => uri,
                Err(e) => {
                    log::debug!("[chain] tokenURI({}) failed: {}", event.agent_id, e);
                    String::new()
                }
            };
            let file = if uri.trim().is_empty() {
                None
            } else {
                match self.resolver.resolve(&uri).await {
                    Ok(file) => Some(file),
                    Err(e) => {
                        log::debug!("[metadata] Agent {}: {}", event.agent_id, e);
                        None
                    }
                }
            };

            let record = normalize::from_chain(event, chain_id, &uri, file.as_ref());
            self.db.upsert_agent(&record)?;
            outcome.indexed += 1;
            progress!(options, "[chain] Indexed agent {} ({}/{})", event.agent_id, outcome.indexed, mints.len());
        }

        outcome.total_known = mints.len() as u64;
        outcome.last_block = Some(head);
        outcome.finished_at = chrono::Utc::now();
        Ok(outcome)
    }
}
