//! Capability extraction
//!
//! Maps one of the three source payload shapes onto a normalized set of
//! lowercase tags. Absent or malformed fields are skipped; extraction never
//! fails.

use std::collections::BTreeSet;
use strum::{AsRefStr, Display};

use super::chain::RegistrationFile;
use super::graph::GraphAgent;
use super::rest::RestAgentItem;

pub const X402_TAG: &str = "x402";

/// Endpoint kinds that each contribute one fixed tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum EndpointKind {
    Mcp,
    A2a,
    Web,
    Oasf,
    Email,
}

impl EndpointKind {
    /// Match a registration-file service name (`"MCP"`, `"A2A"`, `"web"`, ...).
    pub fn from_service_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mcp" => Some(EndpointKind::Mcp),
            "a2a" => Some(EndpointKind::A2a),
            "web" | "http" | "https" | "website" => Some(EndpointKind::Web),
            "oasf" => Some(EndpointKind::Oasf),
            "email" | "mailto" => Some(EndpointKind::Email),
            _ => None,
        }
    }
}

/// A source payload, tagged by where it came from
#[derive(Debug, Clone, Copy)]
pub enum SourcePayload<'a> {
    Graph(&'a GraphAgent),
    Rest(&'a RestAgentItem),
    Chain(&'a RegistrationFile),
}

/// What a payload declares, independent of its wire shape
#[derive(Debug, Default)]
struct Declared<'a> {
    trusts: Vec<&'a str>,
    x402: bool,
    endpoints: Vec<EndpointKind>,
    mcp_tools: Vec<&'a str>,
    a2a_skills: Vec<&'a str>,
    oasf_skills: Vec<&'a str>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn strs(values: &Option<Vec<String>>) -> Vec<&str> {
    values.iter().flatten().map(|s| s.as_str()).collect()
}

impl<'a> Declared<'a> {
    fn from_payload(payload: SourcePayload<'a>) -> Self {
        match payload {
            SourcePayload::Graph(agent) => {
                let Some(file) = agent.registration_file.as_ref() else {
                    return Declared::default();
                };
                let endpoints = [
                    (EndpointKind::Mcp, &file.mcp_endpoint),
                    (EndpointKind::A2a, &file.a2a_endpoint),
                    (EndpointKind::Web, &file.web_endpoint),
                    (EndpointKind::Oasf, &file.oasf_endpoint),
                    (EndpointKind::Email, &file.email_endpoint),
                ]
                .into_iter()
                .filter(|(_, e)| present(e))
                .map(|(kind, _)| kind)
                .collect();
                Declared {
                    trusts: strs(&file.supported_trusts),
                    x402: file.x402_support.unwrap_or(false),
                    endpoints,
                    mcp_tools: strs(&file.mcp_tools),
                    a2a_skills: strs(&file.a2a_skills),
                    oasf_skills: strs(&file.oasf_skills),
                }
            }
            SourcePayload::Rest(item) => {
                let endpoints = [
                    (EndpointKind::Mcp, &item.mcp_endpoint),
                    (EndpointKind::A2a, &item.a2a_endpoint),
                    (EndpointKind::Web, &item.web_endpoint),
                    (EndpointKind::Oasf, &item.oasf_endpoint),
                    (EndpointKind::Email, &item.email),
                ]
                .into_iter()
                .filter(|(_, e)| present(e))
                .map(|(kind, _)| kind)
                .collect();
                Declared {
                    trusts: strs(&item.supported_trust),
                    x402: item.x402_supported.unwrap_or(false),
                    endpoints,
                    mcp_tools: strs(&item.mcp_tools),
                    a2a_skills: strs(&item.a2a_skills),
                    oasf_skills: strs(&item.oasf_skills),
                }
            }
            SourcePayload::Chain(file) => {
                let mut declared = Declared {
                    trusts: file.supported_trust.iter().map(|s| s.as_str()).collect(),
                    x402: file.x402_support,
                    ..Default::default()
                };
                for service in &file.services {
                    let Some(kind) = EndpointKind::from_service_name(&service.name) else {
                        continue;
                    };
                    if !service.endpoint.trim().is_empty() {
                        declared.endpoints.push(kind);
                    }
                    let names = service.tools.iter().map(|s| s.as_str());
                    match kind {
                        EndpointKind::Mcp => declared.mcp_tools.extend(names),
                        EndpointKind::A2a => declared.a2a_skills.extend(names),
                        EndpointKind::Oasf => declared.oasf_skills.extend(names),
                        _ => {}
                    }
                }
                declared
            }
        }
    }
}

fn normalize(tag: &str) -> Option<String> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() { None } else { Some(tag) }
}

/// Deduplicated lowercase capability tags for a payload, sorted.
pub fn extract_capabilities(payload: SourcePayload<'_>) -> Vec<String> {
    let declared = Declared::from_payload(payload);
    let mut tags = BTreeSet::new();

    tags.extend(declared.trusts.iter().filter_map(|t| normalize(t)));

    if declared.x402 {
        tags.insert(X402_TAG.to_string());
    }

    for kind in &declared.endpoints {
        tags.insert(kind.to_string());
    }

    let namespaced = [
        (EndpointKind::Mcp, &declared.mcp_tools),
        (EndpointKind::A2a, &declared.a2a_skills),
        (EndpointKind::Oasf, &declared.oasf_skills),
    ];
    for (prefix, names) in namespaced {
        for name in names.iter().filter_map(|n| normalize(n)) {
            tags.insert(format!("{}:{}", prefix, name));
        }
    }

    tags.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::chain::ServiceEntry;
    use crate::discovery::graph::GraphRegistrationFile;

    fn graph_agent(file: GraphRegistrationFile) -> GraphAgent {
        GraphAgent {
            id: "8453:1".to_string(),
            agent_id: "1".to_string(),
            owner: "0xabc".to_string(),
            registration_file: Some(file),
            ..Default::default()
        }
    }

    #[test]
    fn test_x402_mcp_and_tools() {
        let agent = graph_agent(GraphRegistrationFile {
            x402_support: Some(true),
            mcp_endpoint: Some("https://mcp.example/sse".to_string()),
            mcp_tools: Some(vec!["get_weather".to_string(), "Get_Weather".to_string(), "search".to_string()]),
            ..Default::default()
        });

        let tags = extract_capabilities(SourcePayload::Graph(&agent));
        assert_eq!(tags, vec!["mcp", "mcp:get_weather", "mcp:search", "x402"]);
    }

    #[test]
    fn test_trusts_lowercased_and_endpoints_tagged() {
        let agent = graph_agent(GraphRegistrationFile {
            supported_trusts: Some(vec!["Reputation".to_string(), "crypto-economic".to_string()]),
            a2a_endpoint: Some("https://a2a.example".to_string()),
            web_endpoint: Some("https://example.com".to_string()),
            email_endpoint: Some("   ".to_string()),
            a2a_skills: Some(vec!["translate".to_string()]),
            oasf_skills: Some(vec!["nlp/summarize".to_string()]),
            ..Default::default()
        });

        let tags = extract_capabilities(SourcePayload::Graph(&agent));
        assert_eq!(
            tags,
            vec!["a2a", "a2a:translate", "crypto-economic", "oasf:nlp/summarize", "reputation", "web"]
        );
    }

    #[test]
    fn test_missing_registration_file_yields_nothing() {
        let agent = GraphAgent { agent_id: "5".to_string(), ..Default::default() };
        assert!(extract_capabilities(SourcePayload::Graph(&agent)).is_empty());
    }

    #[test]
    fn test_rest_item() {
        let item = RestAgentItem {
            x402_supported: Some(true),
            email: Some("ops@example.com".to_string()),
            oasf_endpoint: Some("https://oasf.example".to_string()),
            oasf_skills: Some(vec!["Vision".to_string()]),
            ..Default::default()
        };
        let tags = extract_capabilities(SourcePayload::Rest(&item));
        assert_eq!(tags, vec!["email", "oasf", "oasf:vision", "x402"]);
    }

    #[test]
    fn test_chain_registration_services() {
        let file = RegistrationFile {
            name: Some("Bot".to_string()),
            services: vec![
                ServiceEntry {
                    name: "MCP".to_string(),
                    endpoint: "https://mcp.example".to_string(),
                    tools: vec!["quote".to_string()],
                    ..Default::default()
                },
                ServiceEntry {
                    name: "A2A".to_string(),
                    endpoint: "".to_string(),
                    tools: vec!["chat".to_string()],
                    ..Default::default()
                },
                ServiceEntry {
                    name: "ENS".to_string(),
                    endpoint: "bot.eth".to_string(),
                    ..Default::default()
                },
            ],
            supported_trust: vec!["reputation".to_string()],
            ..Default::default()
        };

        let tags = extract_capabilities(SourcePayload::Chain(&file));
        // A2A declared a skill but no endpoint: skill tag only
        assert_eq!(tags, vec!["a2a:chat", "mcp", "mcp:quote", "reputation"]);
    }
}
