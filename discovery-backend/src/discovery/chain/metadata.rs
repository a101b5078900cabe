//! Registration document dereference
//!
//! An agent's `tokenURI` points at its self-published registration file. The
//! pointer may be an inline `data:` document, an `ipfs://` or `ar://` content
//! address, or a plain HTTP(S) URL.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::discovery::transport::HttpTransport;
use crate::error::{DiscoveryError, Result};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";
const ARWEAVE_GATEWAY: &str = "https://arweave.net/";

/// Service advertised in a registration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Tools or skills declared for this service
    #[serde(default)]
    pub tools: Vec<String>,
}

/// The subset of a registration file the cache uses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationFile {
    pub name: Option<String>,
    pub description: Option<String>,
    pub services: Vec<ServiceEntry>,
    pub supported_trust: Vec<String>,
    pub x402_support: bool,
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn str_list(value: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_array))
        .flatten()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            // OASF-style `{ "name": ... }` entries
            Value::Object(_) => v.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

impl RegistrationFile {
    /// Lenient decode: wrong-typed fields are dropped rather than failing the
    /// whole document.
    pub fn from_json(value: &Value) -> Self {
        let services = ["services", "endpoints"]
            .iter()
            .filter_map(|k| value.get(*k).and_then(Value::as_array))
            .flatten()
            .filter_map(|entry| {
                let name = str_field(entry, &["name", "type"])?;
                Some(ServiceEntry {
                    name,
                    endpoint: str_field(entry, &["endpoint", "url"]).unwrap_or_default(),
                    version: str_field(entry, &["version"]),
                    tools: str_list(entry, &["tools", "mcpTools", "skills", "a2aSkills", "oasfSkills"]),
                })
            })
            .collect();

        let x402_support = ["x402support", "x402Support", "x402_support"]
            .iter()
            .find_map(|k| value.get(*k).and_then(Value::as_bool))
            .unwrap_or(false);

        RegistrationFile {
            name: str_field(value, &["name"]),
            description: str_field(value, &["description"]),
            services,
            supported_trust: str_list(value, &["supportedTrust", "supportedTrusts", "supported_trust"]),
            x402_support,
        }
    }

    /// First service whose name matches one of `names`, case-insensitively.
    pub fn service(&self, names: &[&str]) -> Option<&ServiceEntry> {
        self.services
            .iter()
            .find(|s| names.iter().any(|n| s.name.eq_ignore_ascii_case(n)))
    }
}

/// Map content-addressed pointers to gateway URLs; HTTP(S) passes through.
pub fn resolve_uri(uri: &str) -> String {
    if let Some(cid) = uri.strip_prefix("ipfs://") {
        format!("{}{}", IPFS_GATEWAY, cid.trim_start_matches("ipfs/"))
    } else if let Some(tx_id) = uri.strip_prefix("ar://") {
        format!("{}{}", ARWEAVE_GATEWAY, tx_id)
    } else if !uri.starts_with("http://") && !uri.starts_with("https://") {
        format!("https://{}", uri)
    } else {
        uri.to_string()
    }
}

/// Decode an inline `data:[<mime>][;base64],<payload>` document.
pub fn decode_data_uri(uri: &str) -> Result<String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| DiscoveryError::MalformedRecord("not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| DiscoveryError::MalformedRecord("data URI has no payload".to_string()))?;

    if header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| DiscoveryError::MalformedRecord(format!("invalid base64 data URI: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| DiscoveryError::MalformedRecord(format!("data URI is not UTF-8: {}", e)))
    } else {
        urlencoding::decode(payload)
            .map(|s| s.into_owned())
            .map_err(|e| DiscoveryError::MalformedRecord(format!("invalid percent-encoding: {}", e)))
    }
}

pub struct MetadataResolver {
    transport: Arc<dyn HttpTransport>,
}

impl MetadataResolver {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Fetch and decode the registration file behind `uri`.
    pub async fn resolve(&self, uri: &str) -> Result<RegistrationFile> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(DiscoveryError::MalformedRecord("empty metadata URI".to_string()));
        }

        let body = if uri.starts_with("data:") {
            decode_data_uri(uri)?
        } else {
            let url = resolve_uri(uri);
            log::debug!("[metadata] Fetching {}", url);
            let reply = self.transport.get(&url, METADATA_TIMEOUT).await?;
            if !reply.is_success() {
                return Err(reply.to_error("Metadata host"));
            }
            reply.body
        };

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| DiscoveryError::MalformedRecord(format!("registration file is not JSON: {}", e)))?;
        Ok(RegistrationFile::from_json(&value))
    }
}
