//! Network definitions
//!
//! Built-in Identity Registry deployments per network, optionally overridden
//! from `config/networks.ron`. Also resolves which JSON-RPC endpoint the chain
//! scanner talks to.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use strum::{AsRefStr, Display, EnumString};

use crate::config::Config;

/// Networks with a known Identity Registry deployment
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Mainnet,
    Base,
    Sepolia,
    BaseSepolia,
}

impl Default for Network {
    fn default() -> Self {
        Network::Base
    }
}

impl Network {
    pub fn all() -> &'static [Network] {
        &[Network::Mainnet, Network::Base, Network::Sepolia, Network::BaseSepolia]
    }

    pub fn chain_id(&self) -> u64 {
        self.config().chain_id
    }

    /// Effective configuration: file override if loaded, otherwise built-in.
    pub fn config(&self) -> NetworkConfig {
        NETWORK_OVERRIDES
            .get()
            .and_then(|overrides| overrides.get(self).cloned())
            .unwrap_or_else(|| self.builtin())
    }

    fn builtin(&self) -> NetworkConfig {
        match self {
            Network::Mainnet => NetworkConfig {
                chain_id: 1,
                identity_registry: MAINNET_IDENTITY_REGISTRY.to_string(),
                genesis_block: 24_339_871,
                subgraph_id: None,
                public_rpc: "https://eth.llamarpc.com".to_string(),
            },
            Network::Base => NetworkConfig {
                chain_id: 8453,
                identity_registry: MAINNET_IDENTITY_REGISTRY.to_string(),
                genesis_block: 41_663_783,
                subgraph_id: None,
                public_rpc: "https://mainnet.base.org".to_string(),
            },
            Network::Sepolia => NetworkConfig {
                chain_id: 11155111,
                identity_registry: TESTNET_IDENTITY_REGISTRY.to_string(),
                genesis_block: 9_989_393,
                subgraph_id: None,
                public_rpc: "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
            },
            Network::BaseSepolia => NetworkConfig {
                chain_id: 84532,
                identity_registry: TESTNET_IDENTITY_REGISTRY.to_string(),
                genesis_block: 36_304_165,
                subgraph_id: None,
                public_rpc: "https://sepolia.base.org".to_string(),
            },
        }
    }

    fn alchemy_subdomain(&self) -> &'static str {
        match self {
            Network::Mainnet => "eth-mainnet",
            Network::Base => "base-mainnet",
            Network::Sepolia => "eth-sepolia",
            Network::BaseSepolia => "base-sepolia",
        }
    }
}

const MAINNET_IDENTITY_REGISTRY: &str = "0x8004A169FB4a3325136EB29fA0ceB6D2e539a432";
const TESTNET_IDENTITY_REGISTRY: &str = "0x8004A818BFB912233c491871b3d84c89A494BD9e";

/// Per-network deployment details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub identity_registry: String,
    /// Block the registry was deployed at; chain scans start here.
    pub genesis_block: u64,
    /// Hosted indexer subgraph id. The Graph source is unavailable without one.
    #[serde(default)]
    pub subgraph_id: Option<String>,
    pub public_rpc: String,
}

static NETWORK_OVERRIDES: OnceLock<HashMap<Network, NetworkConfig>> = OnceLock::new();

/// Load network overrides from `networks.ron` in the config directory.
/// Missing or unparsable files leave the built-in definitions in place.
pub fn load_networks(config_dir: &Path) {
    let config_path = config_dir.join("networks.ron");

    if !config_path.exists() {
        log::info!("No networks.ron found, using built-in network definitions");
        return;
    }

    let overrides = match std::fs::read_to_string(&config_path) {
        Ok(content) => match parse_networks(&content) {
            Ok(networks) => {
                log::info!(
                    "Loaded {} network definitions from config: {:?}",
                    networks.len(),
                    networks.keys().collect::<Vec<_>>()
                );
                networks
            }
            Err(e) => {
                log::error!("Failed to parse networks.ron: {}", e);
                return;
            }
        },
        Err(e) => {
            log::error!("Failed to read networks.ron: {}", e);
            return;
        }
    };

    if NETWORK_OVERRIDES.set(overrides).is_err() {
        log::warn!("Network definitions already initialized");
    }
}

/// Keys are network names (`"base"`, `"base-sepolia"`, ...). Unknown names are skipped.
pub fn parse_networks(content: &str) -> Result<HashMap<Network, NetworkConfig>, ron::error::SpannedError> {
    let raw = ron::from_str::<HashMap<String, NetworkConfig>>(content)?;
    Ok(raw
        .into_iter()
        .filter_map(|(name, config)| match name.parse::<Network>() {
            Ok(network) => Some((network, config)),
            Err(_) => {
                log::warn!("Ignoring unknown network '{}' in networks.ron", name);
                None
            }
        })
        .collect())
}

/// RPC endpoint resolution: custom override → Alchemy → public RPC.
pub fn resolve_rpc_url(network: Network, config: &Config) -> String {
    if let Some(url) = config.rpc_endpoints.get(network.as_ref()) {
        log::info!("[networks] Custom RPC endpoint for {}: {}", network, url);
        return url.clone();
    }

    if let Some(ref key) = config.alchemy_api_key {
        let url = format!("https://{}.g.alchemy.com/v2/{}", network.alchemy_subdomain(), key);
        log::info!("[networks] Alchemy RPC for {}", network);
        return url;
    }

    let url = network.config().public_rpc;
    log::info!("[networks] Public RPC for {}: {}", network, url);
    url
}

/// Subgraph id for the Graph source: environment override → networks.ron.
pub fn resolve_subgraph_id(network: Network, config: &Config) -> Option<String> {
    config
        .graph_subgraph_ids
        .get(network.as_ref())
        .cloned()
        .or_else(|| network.config().subgraph_id)
        .filter(|id| !id.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parse_and_display() {
        assert_eq!("base-sepolia".parse::<Network>().unwrap(), Network::BaseSepolia);
        assert_eq!("Mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!(Network::BaseSepolia.to_string(), "base-sepolia");
        assert!("solana".parse::<Network>().is_err());
    }

    #[test]
    fn test_builtin_chain_ids() {
        assert_eq!(Network::Base.chain_id(), 8453);
        assert_eq!(Network::Mainnet.chain_id(), 1);
        assert_eq!(Network::BaseSepolia.chain_id(), 84532);
    }

    #[test]
    fn test_parse_networks_ron() {
        let content = r#"{
            "base": (
                chain_id: 8453,
                identity_registry: "0x8004A169FB4a3325136EB29fA0ceB6D2e539a432",
                genesis_block: 100,
                subgraph_id: Some("abc123"),
                public_rpc: "https://mainnet.base.org",
            ),
            "solana": (
                chain_id: 0,
                identity_registry: "",
                genesis_block: 0,
                public_rpc: "",
            ),
        }"#;
        let networks = parse_networks(content).unwrap();
        assert_eq!(networks.len(), 1);
        let base = networks.get(&Network::Base).unwrap();
        assert_eq!(base.genesis_block, 100);
        assert_eq!(base.subgraph_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_resolve_rpc_url_tiers() {
        let mut config = Config::default();
        assert_eq!(resolve_rpc_url(Network::Base, &config), "https://mainnet.base.org");

        config.alchemy_api_key = Some("key".to_string());
        assert_eq!(
            resolve_rpc_url(Network::Base, &config),
            "https://base-mainnet.g.alchemy.com/v2/key"
        );

        config.rpc_endpoints.insert("base".to_string(), "https://custom.example".to_string());
        assert_eq!(resolve_rpc_url(Network::Base, &config), "https://custom.example");
    }

    #[test]
    fn test_resolve_subgraph_id_prefers_env() {
        let mut config = Config::default();
        assert!(resolve_subgraph_id(Network::Sepolia, &config).is_none());

        config.graph_subgraph_ids.insert("sepolia".to_string(), "sub-1".to_string());
        assert_eq!(resolve_subgraph_id(Network::Sepolia, &config).as_deref(), Some("sub-1"));
    }
}
