//! JSON-RPC reads against the Identity Registry
//!
//! Only three calls are needed: the chain head, mint `Transfer` logs, and
//! `tokenURI(uint256)`.

use async_trait::async_trait;
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::discovery::transport::HttpTransport;
use crate::error::{DiscoveryError, Result};

const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// A registry mint: `Transfer(0x0, owner, tokenId)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintEvent {
    pub agent_id: u64,
    pub owner: String,
    pub block_number: u64,
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    /// Mint events in the inclusive block range.
    async fn mint_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<MintEvent>>;

    async fn token_uri(&self, agent_id: u64) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn transfer_topic() -> H256 {
    H256::from(keccak256(b"Transfer(address,address,uint256)"))
}

fn parse_hex_u64(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}

/// JSON-RPC reader bound to one registry contract
pub struct EvmRpcReader {
    transport: Arc<dyn HttpTransport>,
    rpc_url: String,
    registry: Address,
}

impl EvmRpcReader {
    pub fn new(transport: Arc<dyn HttpTransport>, rpc_url: impl Into<String>, registry: &str) -> Result<Self> {
        let registry = Address::from_str(registry)
            .map_err(|e| DiscoveryError::Config(format!("Invalid registry address '{}': {}", registry, e)))?;
        Ok(Self { transport, rpc_url: rpc_url.into(), registry })
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let request = JsonRpcRequest { jsonrpc: "2.0", method, params, id: 1 };
        let body = serde_json::to_value(&request)
            .map_err(|e| DiscoveryError::upstream(None, format!("Failed to encode {}: {}", method, e)))?;

        log::debug!("[chain] {} {:?}", method, request.params);
        let reply = self.transport.post_json(&self.rpc_url, &body, RPC_TIMEOUT).await?;
        if !reply.is_success() {
            return Err(reply.to_error("RPC node"));
        }

        let response: JsonRpcResponse = serde_json::from_str(&reply.body).map_err(|e| {
            DiscoveryError::upstream(Some(reply.status), format!("Failed to parse RPC response: {}", e))
        })?;

        if let Some(error) = response.error {
            return Err(DiscoveryError::upstream(
                None,
                format!("RPC error {} on {}: {}", error.code, method, error.message),
            ));
        }

        response
            .result
            .ok_or_else(|| DiscoveryError::upstream(None, format!("RPC returned null result for {}", method)))
    }

    fn decode_log(entry: &Value) -> Option<MintEvent> {
        let topics = entry.get("topics")?.as_array()?;
        let owner = H256::from_str(topics.get(2)?.as_str()?.trim_start_matches("0x")).ok()?;
        let token_id = U256::from_str_radix(topics.get(3)?.as_str()?.trim_start_matches("0x"), 16).ok()?;
        if token_id.bits() > 64 {
            return None;
        }
        let block_number = parse_hex_u64(entry.get("blockNumber")?.as_str()?)?;
        Some(MintEvent {
            agent_id: token_id.low_u64(),
            owner: format!("{:?}", Address::from(owner)),
            block_number,
        })
    }
}

#[async_trait]
impl ChainReader for EvmRpcReader {
    async fn block_number(&self) -> Result<u64> {
        let result = self.rpc_call("eth_blockNumber", json!([])).await?;
        result
            .as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| DiscoveryError::upstream(None, format!("Invalid eth_blockNumber response: {}", result)))
    }

    async fn mint_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<MintEvent>> {
        let params = json!([{
            "address": format!("{:?}", self.registry),
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
            "topics": [format!("{:?}", transfer_topic()), format!("{:?}", H256::zero())],
        }]);

        let result = self.rpc_call("eth_getLogs", params).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| DiscoveryError::upstream(None, "eth_getLogs did not return an array"))?;

        let mut events = Vec::with_capacity(logs.len());
        for entry in logs {
            match Self::decode_log(entry) {
                Some(event) => events.push(event),
                None => log::debug!("[chain] Skipping undecodable log: {}", entry),
            }
        }
        Ok(events)
    }

    async fn token_uri(&self, agent_id: u64) -> Result<String> {
        let mut calldata = keccak256(b"tokenURI(uint256)")[..4].to_vec();
        calldata.extend(ethers::abi::encode(&[Token::Uint(U256::from(agent_id))]));

        let params = json!([
            {
                "to": format!("{:?}", self.registry),
                "data": format!("0x{}", hex::encode(&calldata)),
            },
            "latest"
        ]);
        let result = self.rpc_call("eth_call", params).await?;

        let hex_str = result
            .as_str()
            .ok_or_else(|| DiscoveryError::upstream(None, "Invalid eth_call response"))?;
        let bytes = hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| DiscoveryError::MalformedRecord(format!("tokenURI result is not hex: {}", e)))?;

        match ethers::abi::decode(&[ParamType::String], &bytes) {
            Ok(tokens) => match tokens.into_iter().next() {
                Some(Token::String(uri)) => Ok(uri),
                _ => Err(DiscoveryError::MalformedRecord("tokenURI did not return a string".to_string())),
            },
            Err(e) => Err(DiscoveryError::MalformedRecord(format!("Failed to decode tokenURI: {}", e))),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::transport::testing::ScriptedTransport;

    const REGISTRY: &str = "0x8004A169FB4a3325136EB29fA0ceB6D2e539a432";

    fn reader(transport: Arc<ScriptedTransport>) -> EvmRpcReader {
        EvmRpcReader::new(transport, "https://rpc.example", REGISTRY).unwrap()
    }

    #[tokio::test]
    async fn test_block_number() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({ "jsonrpc": "2.0", "id": 1, "result": "0x10" }));
        assert_eq!(reader(transport.clone()).block_number().await.unwrap(), 16);
        assert_eq!(transport.recorded()[0].body.as_ref().unwrap()["method"], "eth_blockNumber");
    }

    #[tokio::test]
    async fn test_mint_logs_filter_and_decode() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            json!({ "jsonrpc": "2.0", "id": 1, "result": [
                {
                    "topics": [
                        format!("{:?}", transfer_topic()),
                        format!("{:?}", H256::zero()),
                        "0x000000000000000000000000abcdefabcdefabcdefabcdefabcdefabcdefabcd",
                        "0x000000000000000000000000000000000000000000000000000000000000002a"
                    ],
                    "blockNumber": "0x3e8"
                },
                { "topics": [], "blockNumber": "0x1" }
            ]}),
        );

        let events = reader(transport.clone()).mint_logs(1000, 1999).await.unwrap();
        assert_eq!(
            events,
            vec![MintEvent {
                agent_id: 42,
                owner: "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd".to_string(),
                block_number: 1000,
            }]
        );

        let body = transport.recorded()[0].body.clone().unwrap();
        let filter = &body["params"][0];
        assert_eq!(filter["fromBlock"], "0x3e8");
        assert_eq!(filter["toBlock"], "0x7cf");
        assert_eq!(filter["address"], REGISTRY.to_lowercase());
    }

    #[tokio::test]
    async fn test_token_uri_decodes_abi_string() {
        let encoded = ethers::abi::encode(&[Token::String("ipfs://QmAgent".to_string())]);
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            json!({ "jsonrpc": "2.0", "id": 1, "result": format!("0x{}", hex::encode(encoded)) }),
        );

        let uri = reader(transport.clone()).token_uri(7).await.unwrap();
        assert_eq!(uri, "ipfs://QmAgent");

        let body = transport.recorded()[0].body.clone().unwrap();
        let data = body["params"][0]["data"].as_str().unwrap().to_string();
        // tokenURI(uint256) selector
        assert!(data.starts_with("0xc87b56dd"));
        assert!(data.ends_with("07"));
    }

    #[tokio::test]
    async fn test_rpc_error_object() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            200,
            json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32005, "message": "limit exceeded" } }),
        );
        let err = reader(transport).mint_logs(0, 10).await.unwrap_err();
        assert!(err.to_string().contains("limit exceeded"));
    }

    #[test]
    fn test_invalid_registry_address() {
        let transport = Arc::new(ScriptedTransport::new());
        assert!(EvmRpcReader::new(transport, "https://rpc.example", "0xnothex").is_err());
    }
}
