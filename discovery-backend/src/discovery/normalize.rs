//! Source payload → `AgentRecord`
//!
//! Each converter builds a complete record, since store writes replace whole
//! rows. An unusable identifier is the only hard failure; every other field
//! degrades to empty.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::capabilities::{extract_capabilities, SourcePayload};
use super::chain::{MintEvent, RegistrationFile};
use super::graph::GraphAgent;
use super::rest::RestAgentItem;
use crate::error::{DiscoveryError, Result};
use crate::models::AgentRecord;

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn value_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn value_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<i64>().ok().and_then(|secs| DateTime::from_timestamp(secs, 0))),
        _ => None,
    }
}

/// `eip155:8453:0xabc` → `0xabc`; bare addresses pass through.
fn address_of(endpoint: &str) -> Option<String> {
    non_empty(endpoint.rsplit(':').next())
}

pub fn from_graph(agent: &GraphAgent, default_chain_id: u64) -> Result<AgentRecord> {
    let agent_id: u64 = agent.agent_id.trim().parse().map_err(|_| {
        DiscoveryError::MalformedRecord(format!("graph agent '{}' has invalid agentId '{}'", agent.id, agent.agent_id))
    })?;
    let chain_id = agent
        .chain_id
        .as_deref()
        .and_then(|c| c.trim().parse().ok())
        .unwrap_or(default_chain_id);

    let payment_address = non_empty(agent.agent_wallet.as_deref());
    let wallet = payment_address.clone().unwrap_or_else(|| agent.owner.clone());

    let mut record = AgentRecord::new(agent_id, chain_id, wallet);
    record.source_uri = agent.agent_uri.clone().unwrap_or_default();
    record.capabilities = extract_capabilities(SourcePayload::Graph(agent));
    record.payment_address = payment_address;
    record.reputation_score = agent
        .average_feedback_value
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0);
    record.feedback_count = agent
        .total_feedback
        .as_deref()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);
    record.last_updated = agent
        .last_activity
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    if let Some(file) = agent.registration_file.as_ref() {
        record.name = non_empty(file.name.as_deref());
        record.description = non_empty(file.description.as_deref());
        record.http_endpoint = non_empty(file.web_endpoint.as_deref());
        record.mcp_endpoint = non_empty(file.mcp_endpoint.as_deref());
        record.a2a_endpoint = non_empty(file.a2a_endpoint.as_deref());
        record.messaging_address = non_empty(file.xmtp_endpoint.as_deref());
    }
    Ok(record)
}

pub fn from_rest(item: &RestAgentItem, default_chain_id: u64) -> Result<AgentRecord> {
    let agent_id = value_u64(&item.agent_id).ok_or_else(|| {
        DiscoveryError::MalformedRecord(format!("REST item has invalid agent_id {}", item.agent_id))
    })?;
    let chain_id = value_u64(&item.chain_id).unwrap_or(default_chain_id);

    let payment_address = non_empty(item.agent_wallet.as_deref());
    let wallet = payment_address
        .clone()
        .or_else(|| non_empty(item.owner_address.as_deref()))
        .unwrap_or_default();

    let mut record = AgentRecord::new(agent_id, chain_id, wallet);
    record.source_uri = item.token_uri.clone().unwrap_or_default();
    record.name = non_empty(item.name.as_deref());
    record.description = non_empty(item.description.as_deref());
    record.capabilities = extract_capabilities(SourcePayload::Rest(item));
    record.messaging_address = non_empty(item.xmtp_address.as_deref());
    record.http_endpoint = non_empty(item.web_endpoint.as_deref());
    record.mcp_endpoint = non_empty(item.mcp_endpoint.as_deref());
    record.a2a_endpoint = non_empty(item.a2a_endpoint.as_deref());
    record.payment_address = payment_address;
    record.reputation_score = value_f64(&item.average_score).unwrap_or(0.0);
    record.feedback_count = value_u64(&item.total_feedback).unwrap_or(0);
    record.last_updated = value_timestamp(&item.updated_at);
    Ok(record)
}

/// Identity-only reconstruction; the chain carries no reputation data.
pub fn from_chain(
    event: &MintEvent,
    chain_id: u64,
    source_uri: &str,
    file: Option<&RegistrationFile>,
) -> AgentRecord {
    let mut record = AgentRecord::new(event.agent_id, chain_id, event.owner.clone());
    record.source_uri = source_uri.to_string();

    let Some(file) = file else {
        return record;
    };

    let endpoint = |names: &[&str]| file.service(names).and_then(|s| non_empty(Some(s.endpoint.as_str())));

    record.name = non_empty(file.name.as_deref());
    record.description = non_empty(file.description.as_deref());
    record.capabilities = extract_capabilities(SourcePayload::Chain(file));
    record.http_endpoint = endpoint(&["web", "http", "https", "website"]);
    record.mcp_endpoint = endpoint(&["mcp"]);
    record.a2a_endpoint = endpoint(&["a2a"]);
    record.messaging_address = endpoint(&["xmtp"]);
    record.payment_address = file
        .service(&["agentWallet", "wallet"])
        .and_then(|s| address_of(&s.endpoint));
    record
}
