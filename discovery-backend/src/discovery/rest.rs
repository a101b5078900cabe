//! Paginated REST source with 429 backoff
//!
//! GET `<base>?chain_id=..&limit=..&offset=..` returning `{items, total}`.
//! Rate-limit responses are retried with exponential backoff; every other
//! non-2xx status fails the call immediately.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::transport::HttpTransport;
use crate::error::{DiscoveryError, Result};

/// Items requested per page by the orchestrator
pub const REST_PAGE_SIZE: usize = 100;
const REST_TIMEOUT: Duration = Duration::from_secs(30);
/// First backoff delay; doubles on every further 429
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Total attempts (first try included) before giving up on 429s
const MAX_ATTEMPTS: u32 = 5;

/// One agent item as served by the REST explorer.
///
/// Identifiers and counters arrive as numbers or strings depending on the
/// deployment, so they are kept as raw JSON and parsed during normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestAgentItem {
    #[serde(default, alias = "agentId", alias = "token_id")]
    pub agent_id: Value,
    #[serde(default, alias = "chainId")]
    pub chain_id: Value,
    #[serde(default, alias = "owner", alias = "ownerAddress")]
    pub owner_address: Option<String>,
    #[serde(default, alias = "agentWallet", alias = "wallet_address")]
    pub agent_wallet: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "agentURI", alias = "agent_uri", alias = "tokenURI")]
    pub token_uri: Option<String>,
    #[serde(default, alias = "totalFeedback", alias = "feedback_count")]
    pub total_feedback: Value,
    #[serde(default, alias = "averageScore", alias = "reputation_score", alias = "score")]
    pub average_score: Value,
    #[serde(default, alias = "x402Supported", alias = "x402support")]
    pub x402_supported: Option<bool>,
    #[serde(default, alias = "supportedTrust", alias = "supported_trusts")]
    pub supported_trust: Option<Vec<String>>,
    #[serde(default, alias = "mcpEndpoint")]
    pub mcp_endpoint: Option<String>,
    #[serde(default, alias = "a2aEndpoint")]
    pub a2a_endpoint: Option<String>,
    #[serde(default, alias = "webEndpoint")]
    pub web_endpoint: Option<String>,
    #[serde(default, alias = "oasfEndpoint")]
    pub oasf_endpoint: Option<String>,
    #[serde(default, alias = "emailEndpoint")]
    pub email: Option<String>,
    #[serde(default, alias = "xmtpAddress", alias = "xmtp_endpoint")]
    pub xmtp_address: Option<String>,
    #[serde(default, alias = "mcpTools")]
    pub mcp_tools: Option<Vec<String>>,
    #[serde(default, alias = "a2aSkills")]
    pub a2a_skills: Option<Vec<String>>,
    #[serde(default, alias = "oasfSkills")]
    pub oasf_skills: Option<Vec<String>>,
    /// RFC 3339 or unix seconds
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Value,
}

/// One page of raw items. Items stay undecoded so a single bad entry can be
/// skipped by the caller without losing the page.
#[derive(Debug, Clone, Default)]
pub struct RestPage {
    pub items: Vec<Value>,
    pub total: u64,
}

#[derive(Debug, Deserialize)]
struct RestEnvelope {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    total: Option<u64>,
}

pub struct RestFetcher {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
}

impl RestFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: impl Into<String>) -> Self {
        Self { transport, base_url: base_url.into() }
    }

    pub async fn fetch_page(&self, chain_id: u64, limit: usize, offset: usize) -> Result<RestPage> {
        let url = url::Url::parse_with_params(
            &self.base_url,
            &[
                ("chain_id", chain_id.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .map_err(|e| DiscoveryError::Config(format!("Invalid REST API URL '{}': {}", self.base_url, e)))?;

        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 1;
        let reply = loop {
            let reply = self.transport.get(url.as_str(), REST_TIMEOUT).await?;
            if reply.status != 429 {
                break reply;
            }
            if attempt >= MAX_ATTEMPTS {
                log::warn!("[rest] Still rate limited after {} attempts, giving up", attempt);
                return Err(DiscoveryError::RateLimited {
                    endpoint: url.host_str().unwrap_or(&self.base_url).to_string(),
                    attempts: attempt,
                });
            }
            log::warn!(
                "[rest] Rate limited (attempt {}/{}), backing off {}s",
                attempt,
                MAX_ATTEMPTS,
                delay.as_secs()
            );
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;
        };

        if !reply.is_success() {
            return Err(reply.to_error("REST API"));
        }

        let envelope: RestEnvelope = serde_json::from_str(&reply.body).map_err(|e| {
            DiscoveryError::upstream(Some(reply.status), format!("Failed to parse REST response: {}", e))
        })?;

        let total = envelope.total.unwrap_or(envelope.items.len() as u64);
        Ok(RestPage { items: envelope.items, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::transport::testing::ScriptedTransport;
    use serde_json::json;

    const BASE: &str = "https://explorer.example/api/v1/agents";

    #[tokio::test]
    async fn test_fetch_page_builds_query_and_parses() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({ "items": [{ "agent_id": 1 }, { "agent_id": "2" }], "total": 7 }));

        let fetcher = RestFetcher::new(transport.clone(), BASE);
        let page = fetcher.fetch_page(8453, 2, 4).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 7);
        assert_eq!(transport.recorded()[0].url, format!("{}?chain_id=8453&limit=2&offset=4", BASE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_retries_five_times_with_doubling_delay() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(429, "slow down");

        let fetcher = RestFetcher::new(transport.clone(), BASE);
        let err = fetcher.fetch_page(8453, 100, 0).await.unwrap_err();

        match err {
            DiscoveryError::RateLimited { endpoint, attempts } => {
                assert_eq!(endpoint, "explorer.example");
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let sent = transport.recorded();
        assert_eq!(sent.len(), 5);
        let gaps: Vec<u64> = sent.windows(2).map(|w| (w[1].at - w[0].at).as_secs()).collect();
        assert_eq!(gaps, vec![1, 2, 4, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_then_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(429, "").push(429, "").push_json(200, json!({ "items": [], "total": 0 }));

        let fetcher = RestFetcher::new(transport.clone(), BASE);
        let page = fetcher.fetch_page(1, 100, 0).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_other_status_fails_immediately() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(503, "maintenance");

        let fetcher = RestFetcher::new(transport.clone(), BASE);
        let err = fetcher.fetch_page(1, 100, 0).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Upstream { status: Some(503), .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_upstream() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err(DiscoveryError::Timeout { endpoint: "explorer.example".into(), secs: 30 });

        let err = RestFetcher::new(transport, BASE).fetch_page(1, 100, 0).await.unwrap_err();
        assert!(err.is_upstream());
    }

    #[test]
    fn test_item_accepts_camel_case_and_string_ids() {
        let item: RestAgentItem = serde_json::from_value(json!({
            "agentId": "77",
            "owner": "0xabc",
            "x402Supported": true,
            "mcpTools": ["lookup"]
        }))
        .unwrap();
        assert_eq!(item.agent_id, json!("77"));
        assert_eq!(item.owner_address.as_deref(), Some("0xabc"));
        assert_eq!(item.x402_supported, Some(true));
    }
}
