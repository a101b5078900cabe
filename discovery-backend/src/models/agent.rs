use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const ENDPOINT_ONLY_TAGS: [&str; 2] = ["oasf", "email"];

/// One cached, denormalized agent profile.
///
/// Writes always replace the whole record; callers supply every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: u64,
    pub chain_id: u64,
    pub wallet_address: String,
    /// Self-published registration document pointer (may be empty)
    pub source_uri: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Lowercase, duplicate-free capability tags
    pub capabilities: Vec<String>,
    pub messaging_address: Option<String>,
    pub http_endpoint: Option<String>,
    pub mcp_endpoint: Option<String>,
    pub a2a_endpoint: Option<String>,
    pub payment_address: Option<String>,
    pub reputation_score: f64,
    pub feedback_count: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub indexed_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Minimal record with every optional field empty.
    pub fn new(agent_id: u64, chain_id: u64, wallet_address: impl Into<String>) -> Self {
        Self {
            agent_id,
            chain_id,
            wallet_address: wallet_address.into(),
            source_uri: String::new(),
            name: None,
            description: None,
            capabilities: Vec::new(),
            messaging_address: None,
            http_endpoint: None,
            mcp_endpoint: None,
            a2a_endpoint: None,
            payment_address: None,
            reputation_score: 0.0,
            feedback_count: 0,
            last_updated: None,
            indexed_at: Utc::now(),
        }
    }

    /// True when at least one service endpoint is reachable. OASF and email
    /// endpoints have no column of their own and show up as bare tags.
    pub fn has_service_endpoint(&self) -> bool {
        let stored = [&self.http_endpoint, &self.mcp_endpoint, &self.a2a_endpoint]
            .iter()
            .any(|e| e.as_deref().is_some_and(|s| !s.trim().is_empty()));
        stored || ENDPOINT_ONLY_TAGS.iter().any(|tag| self.has_capability(tag))
    }

    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.iter().any(|c| c == tag)
    }
}

/// Filters for `Database::search_agents`. All supplied filters must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentQuery {
    /// Restrict to one chain's registry
    pub chain_id: Option<u64>,
    /// Substring matched against the serialized capability list
    pub capability: Option<String>,
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
}

impl AgentQuery {
    pub fn top(n: usize) -> Self {
        Self { limit: Some(n), ..Default::default() }
    }

    pub fn on_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_endpoint_detection() {
        let mut record = AgentRecord::new(1, 8453, "0x1");
        assert!(!record.has_service_endpoint());

        record.http_endpoint = Some("  ".to_string());
        assert!(!record.has_service_endpoint());

        // A namespaced skill is not an endpoint
        record.capabilities = vec!["oasf:vision".to_string()];
        assert!(!record.has_service_endpoint());

        record.capabilities.push("oasf".to_string());
        assert!(record.has_service_endpoint());

        let mut email_only = AgentRecord::new(2, 8453, "0x2");
        email_only.capabilities = vec!["email".to_string()];
        assert!(email_only.has_service_endpoint());

        let mut mcp = AgentRecord::new(3, 8453, "0x3");
        mcp.mcp_endpoint = Some("https://mcp.example".to_string());
        assert!(mcp.has_service_endpoint());
    }
}
