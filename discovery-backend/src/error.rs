//! Error taxonomy for the discovery cache and its sources.

use crate::discovery::SourceKind;

pub type Result<T, E = DiscoveryError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Source kept answering 429 after every retry.
    #[error("rate limited by {endpoint} after {attempts} attempts")]
    RateLimited { endpoint: String, attempts: u32 },

    /// Non-2xx response, undecodable body, or a GraphQL `errors` array.
    #[error("upstream error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, message: String },

    #[error("request to {endpoint} timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    /// A single record could not be decoded. Absorbed by sync loops.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Every source in the cascade failed; the cache was left untouched.
    #[error("all sync sources failed: {}", format_failures(.0))]
    AllSourcesFailed(Vec<(SourceKind, String)>),
}

impl DiscoveryError {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        DiscoveryError::Upstream { status, message: message.into() }
    }

    /// Timeouts count as upstream failures for fallback purposes.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            DiscoveryError::Upstream { .. }
                | DiscoveryError::Timeout { .. }
                | DiscoveryError::RateLimited { .. }
        )
    }
}

pub(crate) fn format_failures(failures: &[(SourceKind, String)]) -> String {
    if failures.is_empty() {
        return "no source configured".to_string();
    }
    failures
        .iter()
        .map(|(kind, err)| format!("{}: {}", kind, err))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_message_lists_every_source() {
        let err = DiscoveryError::AllSourcesFailed(vec![
            (SourceKind::Graph, "upstream error (500): boom".to_string()),
            (SourceKind::Rest, "rate limited by api after 5 attempts".to_string()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("graph: upstream error (500): boom"));
        assert!(msg.contains("rest: rate limited"));
    }

    #[test]
    fn test_upstream_classification() {
        assert!(DiscoveryError::upstream(Some(502), "bad gateway").is_upstream());
        assert!(DiscoveryError::Timeout { endpoint: "x".into(), secs: 30 }.is_upstream());
        assert!(!DiscoveryError::MalformedRecord("bad".into()).is_upstream());
    }
}
