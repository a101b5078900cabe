use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::networks::Network;

/// Environment variable names - single source of truth
pub mod env_vars {
    pub const PORT: &str = "PORT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
    pub const CONFIG_DIR: &str = "DISCOVERY_CONFIG_DIR";
    pub const NETWORK: &str = "DISCOVERY_NETWORK";
    pub const GRAPH_API_KEY: &str = "GRAPH_API_KEY";
    pub const GRAPH_URL_TEMPLATE: &str = "GRAPH_URL_TEMPLATE";
    /// Comma separated `network=subgraph_id` pairs; take precedence over networks.ron
    pub const GRAPH_SUBGRAPH_IDS: &str = "GRAPH_SUBGRAPH_IDS";
    pub const REST_API_URL: &str = "DISCOVERY_REST_API_URL";
    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
    /// Comma separated `network=url` pairs, e.g. `base=https://...,mainnet=https://...`
    pub const RPC_ENDPOINTS: &str = "DISCOVERY_RPC_ENDPOINTS";
    pub const SYNC_INTERVAL_SECS: &str = "DISCOVERY_SYNC_INTERVAL_SECS";
    pub const CACHE_TTL_SECS: &str = "DISCOVERY_CACHE_TTL_SECS";
    pub const MIN_FEEDBACK: &str = "DISCOVERY_MIN_FEEDBACK";
    pub const BACKGROUND_SYNC: &str = "DISCOVERY_BACKGROUND_SYNC";
}

/// Default values
pub mod defaults {
    pub const PORT: u16 = 8090;
    pub const DATABASE_URL: &str = "./.db/discovery.db";
    pub const CONFIG_DIR: &str = "./config";
    pub const GRAPH_URL_TEMPLATE: &str =
        "https://gateway.thegraph.com/api/{api_key}/subgraphs/id/{subgraph_id}";
    pub const REST_API_URL: &str = "https://www.8004scan.io/api/v1/agents";
    pub const SYNC_INTERVAL_SECS: u64 = 3600;
    pub const CACHE_TTL_SECS: u64 = 3600;
    pub const MIN_FEEDBACK: u64 = 1;
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            log::warn!("{} must be a number, got '{}'; using {}", name, v, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse `network=value` pairs. Malformed pairs are skipped.
pub fn parse_network_pairs(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (network, url) = pair.split_once('=')?;
            let (network, url) = (network.trim(), url.trim());
            if network.is_empty() || url.is_empty() {
                return None;
            }
            Some((network.to_lowercase(), url.to_string()))
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub config_dir: String,
    pub default_network: Network,
    pub graph_api_key: Option<String>,
    pub graph_url_template: String,
    pub graph_subgraph_ids: HashMap<String, String>,
    pub rest_api_url: String,
    pub alchemy_api_key: Option<String>,
    pub rpc_endpoints: HashMap<String, String>,
    pub sync_interval: Duration,
    pub cache_ttl: Duration,
    pub min_feedback: u64,
    pub background_sync: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let default_network = env::var(env_vars::NETWORK)
            .ok()
            .and_then(|n| {
                n.parse::<Network>()
                    .map_err(|_| log::warn!("Unknown {} '{}', using base", env_vars::NETWORK, n))
                    .ok()
            })
            .unwrap_or_default();

        Self {
            port: env::var(env_vars::PORT)
                .unwrap_or_else(|_| defaults::PORT.to_string())
                .parse()
                .expect("PORT must be a valid number"),
            database_url: env::var(env_vars::DATABASE_URL)
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            config_dir: env::var(env_vars::CONFIG_DIR)
                .unwrap_or_else(|_| defaults::CONFIG_DIR.to_string()),
            default_network,
            graph_api_key: env_non_empty(env_vars::GRAPH_API_KEY),
            graph_url_template: env::var(env_vars::GRAPH_URL_TEMPLATE)
                .unwrap_or_else(|_| defaults::GRAPH_URL_TEMPLATE.to_string()),
            graph_subgraph_ids: env::var(env_vars::GRAPH_SUBGRAPH_IDS)
                .map(|raw| parse_network_pairs(&raw))
                .unwrap_or_default(),
            rest_api_url: env::var(env_vars::REST_API_URL)
                .unwrap_or_else(|_| defaults::REST_API_URL.to_string()),
            alchemy_api_key: env_non_empty(env_vars::ALCHEMY_API_KEY),
            rpc_endpoints: env::var(env_vars::RPC_ENDPOINTS)
                .map(|raw| parse_network_pairs(&raw))
                .unwrap_or_default(),
            sync_interval: Duration::from_secs(env_u64(
                env_vars::SYNC_INTERVAL_SECS,
                defaults::SYNC_INTERVAL_SECS,
            )),
            cache_ttl: Duration::from_secs(env_u64(env_vars::CACHE_TTL_SECS, defaults::CACHE_TTL_SECS)),
            min_feedback: env_u64(env_vars::MIN_FEEDBACK, defaults::MIN_FEEDBACK),
            background_sync: env::var(env_vars::BACKGROUND_SYNC)
                .map(|v| v != "0" && v.to_lowercase() != "false")
                .unwrap_or(true),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: defaults::PORT,
            database_url: defaults::DATABASE_URL.to_string(),
            config_dir: defaults::CONFIG_DIR.to_string(),
            default_network: Network::default(),
            graph_api_key: None,
            graph_url_template: defaults::GRAPH_URL_TEMPLATE.to_string(),
            graph_subgraph_ids: HashMap::new(),
            rest_api_url: defaults::REST_API_URL.to_string(),
            alchemy_api_key: None,
            rpc_endpoints: HashMap::new(),
            sync_interval: Duration::from_secs(defaults::SYNC_INTERVAL_SECS),
            cache_ttl: Duration::from_secs(defaults::CACHE_TTL_SECS),
            min_feedback: defaults::MIN_FEEDBACK,
            background_sync: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network_pairs() {
        let parsed = parse_network_pairs("base=https://b.example, Mainnet = https://m.example,broken,=x");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get("base").unwrap(), "https://b.example");
        assert_eq!(parsed.get("mainnet").unwrap(), "https://m.example");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.sync_interval, Duration::from_secs(3600));
        assert!(config.graph_api_key.is_none());
    }
}
