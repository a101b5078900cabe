//! Agent discovery: sources, synchronization and the query façade

pub mod capabilities;
pub mod chain;
pub mod graph;
pub mod normalize;
pub mod rest;
pub mod scheduler;
pub mod service;
pub mod sources;
pub mod sync;
pub mod transport;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

pub use capabilities::{extract_capabilities, SourcePayload};
pub use scheduler::BackgroundSync;
pub use service::DiscoveryService;
pub use sources::{ChainSource, GraphSource, RestSource, SyncSource};
pub use sync::{RefreshOutcome, SyncOrchestrator};
pub use transport::{HttpTransport, ReqwestTransport};

/// Where a sync pass got its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Graph,
    Rest,
    Chain,
}

/// Per-network sync state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    /// Succeeded, but records were skipped, block ranges were unreadable, or
    /// an earlier source in the cascade failed.
    PartialFailure,
    Failed,
}

/// Knobs for one sync pass
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Server-side feedback threshold for the curated Graph query
    pub min_feedback: u64,
    /// Use the unfiltered query and keep records without endpoints
    pub unfiltered: bool,
    /// Log page progress at info instead of debug
    pub verbose: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            min_feedback: crate::config::defaults::MIN_FEEDBACK,
            unfiltered: false,
            verbose: false,
        }
    }
}

impl SyncOptions {
    pub fn quiet(min_feedback: u64) -> Self {
        Self { min_feedback, ..Default::default() }
    }

    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub fn unfiltered(mut self) -> Self {
        self.unfiltered = true;
        self
    }
}

/// What one successful source pass did
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub source: SourceKind,
    /// Agents the source reports in total (falls back to what was seen)
    pub total_known: u64,
    pub indexed: u64,
    /// Records that failed to decode
    pub skipped: u64,
    /// Records dropped by the endpoint quality gate
    pub filtered: u64,
    /// Chain scans only: block sub-ranges given up on
    pub failed_ranges: u64,
    /// Chain scans only: highest block covered by the pass
    pub last_block: Option<u64>,
    pub finished_at: DateTime<Utc>,
}

impl SyncOutcome {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            total_known: 0,
            indexed: 0,
            skipped: 0,
            filtered: 0,
            failed_ranges: 0,
            last_block: None,
            finished_at: Utc::now(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.skipped > 0 || self.failed_ranges > 0
    }
}

/// Verbose passes log progress at info, quiet ones at debug.
macro_rules! progress {
    ($options:expr, $($arg:tt)+) => {
        if $options.verbose {
            log::info!($($arg)+);
        } else {
            log::debug!($($arg)+);
        }
    };
}
pub(crate) use progress;
