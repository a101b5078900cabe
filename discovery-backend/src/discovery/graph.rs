//! Hosted GraphQL indexer client
//!
//! Every query is a POST of `{query, variables}` to a templated endpoint that
//! embeds the API key and the network's subgraph id.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::transport::HttpTransport;
use crate::error::{DiscoveryError, Result};

/// Fixed page size for list queries
pub const GRAPH_PAGE_SIZE: usize = 1000;
const GRAPH_TIMEOUT: Duration = Duration::from_secs(30);

const AGENT_FIELDS: &str = r#"
fragment AgentFields on Agent {
  id
  chainId
  agentId
  agentURI
  owner
  agentWallet
  totalFeedback
  averageFeedbackValue
  lastActivity
  registrationFile {
    name
    description
    x402support
    supportedTrusts
    mcpEndpoint
    a2aEndpoint
    webEndpoint
    oasfEndpoint
    emailEndpoint
    xmtpEndpoint
    mcpTools
    a2aSkills
    oasfSkills
  }
}
"#;

const CURATED_QUERY: &str = r#"
query CuratedAgents($first: Int!, $skip: Int!, $minFeedback: BigInt!) {
  agents(
    first: $first
    skip: $skip
    where: { totalFeedback_gte: $minFeedback }
    orderBy: totalFeedback
    orderDirection: desc
  ) {
    ...AgentFields
  }
}
"#;

const ALL_QUERY: &str = r#"
query AllAgents($first: Int!, $skip: Int!) {
  agents(first: $first, skip: $skip, orderBy: agentId, orderDirection: asc) {
    ...AgentFields
  }
}
"#;

const BY_ID_QUERY: &str = r#"
query AgentById($id: ID!) {
  agent(id: $id) {
    ...AgentFields
  }
}
"#;

const STATS_QUERY: &str = r#"
query GlobalStats {
  globalStats(id: "global") {
    totalAgents
    totalFeedback
  }
}
"#;

/// Agent entity as served by the indexer. BigInt fields arrive as strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphAgent {
    /// Composite `<chainId>:<agentId>`
    pub id: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    pub agent_id: String,
    #[serde(default, rename = "agentURI")]
    pub agent_uri: Option<String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub agent_wallet: Option<String>,
    #[serde(default)]
    pub total_feedback: Option<String>,
    #[serde(default)]
    pub average_feedback_value: Option<String>,
    /// Unix seconds
    #[serde(default)]
    pub last_activity: Option<String>,
    #[serde(default)]
    pub registration_file: Option<GraphRegistrationFile>,
}

/// Parsed registration document as indexed by the subgraph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRegistrationFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "x402support")]
    pub x402_support: Option<bool>,
    #[serde(default)]
    pub supported_trusts: Option<Vec<String>>,
    #[serde(default)]
    pub mcp_endpoint: Option<String>,
    #[serde(default)]
    pub a2a_endpoint: Option<String>,
    #[serde(default)]
    pub web_endpoint: Option<String>,
    #[serde(default)]
    pub oasf_endpoint: Option<String>,
    #[serde(default)]
    pub email_endpoint: Option<String>,
    #[serde(default)]
    pub xmtp_endpoint: Option<String>,
    #[serde(default)]
    pub mcp_tools: Option<Vec<String>>,
    #[serde(default)]
    pub a2a_skills: Option<Vec<String>>,
    #[serde(default)]
    pub oasf_skills: Option<Vec<String>>,
}

/// One page of agents; entries that failed to decode are only counted.
#[derive(Debug, Default)]
pub struct GraphPage {
    pub agents: Vec<GraphAgent>,
    pub malformed: usize,
}

impl GraphPage {
    /// Number of entries the server returned, decoded or not
    pub fn raw_len(&self) -> usize {
        self.agents.len() + self.malformed
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    #[serde(default)]
    pub total_agents: Option<String>,
    #[serde(default)]
    pub total_feedback: Option<String>,
}

impl GraphStats {
    pub fn total_agents(&self) -> Option<u64> {
        self.total_agents.as_deref().and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphError>>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

pub struct GraphClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
}

impl GraphClient {
    /// Fill `{api_key}` and `{subgraph_id}` in the endpoint template.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        url_template: &str,
        api_key: &str,
        subgraph_id: &str,
    ) -> Result<Self> {
        let endpoint = url_template
            .replace("{api_key}", api_key)
            .replace("{subgraph_id}", subgraph_id);
        url::Url::parse(&endpoint)
            .map_err(|e| DiscoveryError::Config(format!("Invalid graph endpoint: {}", e)))?;
        Ok(Self { transport, endpoint })
    }

    pub async fn query_curated(&self, first: usize, skip: usize, min_feedback: u64) -> Result<GraphPage> {
        let data = self
            .execute(
                CURATED_QUERY,
                json!({ "first": first, "skip": skip, "minFeedback": min_feedback.to_string() }),
            )
            .await?;
        Ok(decode_page(data))
    }

    pub async fn query_all(&self, first: usize, skip: usize) -> Result<GraphPage> {
        let data = self
            .execute(ALL_QUERY, json!({ "first": first, "skip": skip }))
            .await?;
        Ok(decode_page(data))
    }

    /// Look up one agent by composite id (`<chainId>:<agentId>`).
    pub async fn query_by_id(&self, id: &str) -> Result<Option<GraphAgent>> {
        let data = self.execute(BY_ID_QUERY, json!({ "id": id })).await?;
        match data.get("agent") {
            None | Some(Value::Null) => Ok(None),
            Some(agent) => decode(agent.clone(), "agent").map(Some),
        }
    }

    pub async fn query_stats(&self) -> Result<GraphStats> {
        let data = self.execute(STATS_QUERY, json!({})).await?;
        match data.get("globalStats") {
            None | Some(Value::Null) => Ok(GraphStats::default()),
            Some(stats) => decode(stats.clone(), "globalStats"),
        }
    }

    async fn execute(&self, query: &str, variables: Value) -> Result<Value> {
        let document = if query.contains("...AgentFields") {
            format!("{}{}", query, AGENT_FIELDS)
        } else {
            query.to_string()
        };
        let body = json!({ "query": document, "variables": variables });

        let reply = self.transport.post_json(&self.endpoint, &body, GRAPH_TIMEOUT).await?;
        if !reply.is_success() {
            return Err(reply.to_error("Graph API"));
        }

        let response: GraphResponse = serde_json::from_str(&reply.body).map_err(|e| {
            DiscoveryError::upstream(Some(reply.status), format!("Failed to parse Graph response: {}", e))
        })?;

        if let Some(errors) = response.errors.filter(|errs| !errs.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(DiscoveryError::upstream(
                Some(reply.status),
                format!("Graph query error: {}", messages.join("; ")),
            ));
        }

        response
            .data
            .ok_or_else(|| DiscoveryError::upstream(Some(reply.status), "Graph response has no data"))
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| DiscoveryError::upstream(None, format!("Failed to decode {}: {}", what, e)))
}

fn decode_page(data: Value) -> GraphPage {
    let items = match data.get("agents") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let mut page = GraphPage::default();
    for item in items {
        match serde_json::from_value::<GraphAgent>(item) {
            Ok(agent) => page.agents.push(agent),
            Err(e) => {
                log::debug!("[graph] Skipping malformed agent entry: {}", e);
                page.malformed += 1;
            }
        }
    }
    page
}
