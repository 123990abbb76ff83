//! JSON-RPC adapter for an EVM-style endpoint.
//!
//! `connect` probes the endpoint with `eth_blockNumber`; `subscribe`
//! validates the address and the event against the ABI and resolves the
//! starting block; `poll` scans forward with `eth_getLogs`. The filter
//! keeps its own forward position for the duration of a session, while the
//! resubscription cursor stays with the caller.

use std::time::Duration;

use alloy_primitives::{hex, Address, B256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::application::ports::{
    Connection, EventFilter, EventSource, SourceError, SubscribeError,
};
use crate::domain::{FromPoint, Occurrence, SequenceId};
use crate::infrastructure::abi::{parse_checksummed, ContractAbi, EventAbi};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Conventional "limit exceeded" JSON-RPC error code (Infura and friends).
const RPC_LIMIT_EXCEEDED: i64 = -32005;

#[derive(Clone)]
struct Rpc {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl Rpc {
    async fn call(&self, method: &str, params: Value) -> Result<Value, SourceError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited(format!(
                "HTTP 429 from {}",
                self.url
            )));
        }

        let resp = resp
            .error_for_status()
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let body: RpcEnvelope = resp
            .json()
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        if let Some(err) = body.error {
            if err.code == RPC_LIMIT_EXCEEDED || err.message.to_ascii_lowercase().contains("rate")
            {
                return Err(SourceError::RateLimited(err.message));
            }
            return Err(SourceError::Connection(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }

        body.result
            .ok_or_else(|| SourceError::Connection("rpc response missing result".into()))
    }

    async fn block_number(&self) -> Result<u64, SourceError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let quantity = result
            .as_str()
            .ok_or_else(|| SourceError::Connection("eth_blockNumber returned a non-string".into()))?;
        parse_quantity(quantity)
            .ok_or_else(|| SourceError::Connection(format!("bad block quantity: {}", quantity)))
    }
}

pub struct EthLogSource {
    rpc: Rpc,
    abi: ContractAbi,
}

impl EthLogSource {
    pub fn new(url: impl Into<String>, abi: ContractAbi) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("http client");
        Self {
            rpc: Rpc {
                client,
                url: url.into(),
            },
            abi,
        }
    }
}

#[async_trait]
impl EventSource for EthLogSource {
    async fn connect(&self) -> Result<Box<dyn Connection>, SourceError> {
        let head = self.rpc.block_number().await?;
        info!(head, "event source reachable");
        Ok(Box::new(EthLogConnection {
            rpc: self.rpc.clone(),
            abi: self.abi.clone(),
        }))
    }
}

struct EthLogConnection {
    rpc: Rpc,
    abi: ContractAbi,
}

#[async_trait]
impl Connection for EthLogConnection {
    async fn subscribe(
        &self,
        address: &str,
        event_name: &str,
        from: FromPoint,
    ) -> Result<Box<dyn EventFilter>, SubscribeError> {
        let address = parse_checksummed(address).map_err(SubscribeError::InvalidAddress)?;
        let event = self
            .abi
            .event(event_name)
            .ok_or_else(|| SubscribeError::UnknownEvent(event_name.to_string()))?
            .clone();

        let (next_block, floor) = match from {
            FromPoint::Latest => (self.rpc.block_number().await? + 1, None),
            FromPoint::After(seq) => (seq.block, Some(seq)),
        };

        debug!(event = %event.signature(), from_block = next_block, "filter opened");
        Ok(Box::new(EthLogFilter {
            rpc: self.rpc.clone(),
            address,
            topic0: event.topic0(),
            event,
            next_block,
            floor,
        }))
    }
}

struct EthLogFilter {
    rpc: Rpc,
    address: Address,
    topic0: B256,
    event: EventAbi,
    /// Session-internal forward position; advanced only on a successful
    /// poll so a failed scan is simply repeated.
    next_block: u64,
    /// Occurrences at or below this position were already processed by a
    /// previous session and are dropped on re-delivery.
    floor: Option<SequenceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

#[async_trait]
impl EventFilter for EthLogFilter {
    async fn poll(&mut self) -> Result<Vec<Occurrence>, SourceError> {
        let params = json!([{
            "fromBlock": format!("{:#x}", self.next_block),
            "toBlock": "latest",
            "address": self.address.to_checksum(None),
            "topics": [self.topic0.to_string()],
        }]);

        let result = self.rpc.call("eth_getLogs", params).await?;
        let raw: Vec<RawLog> = serde_json::from_value(result)
            .map_err(|e| SourceError::Connection(format!("malformed eth_getLogs response: {}", e)))?;

        let mut batch: Vec<Occurrence> = raw
            .iter()
            .filter(|log| !log.removed)
            .filter_map(|log| self.to_occurrence(log))
            .collect();
        batch.sort_by_key(|o| o.sequence);

        if let Some(last) = batch.last() {
            self.next_block = last.sequence.block + 1;
        }
        Ok(batch)
    }
}

impl EthLogFilter {
    /// Pending logs (no block yet) and anything at or below the floor are
    /// skipped.
    fn to_occurrence(&self, log: &RawLog) -> Option<Occurrence> {
        let block = parse_quantity(log.block_number.as_deref()?)?;
        let log_index = parse_quantity(log.log_index.as_deref()?)? as u32;
        let sequence = SequenceId::new(block, log_index);

        if let Some(floor) = self.floor {
            if sequence <= floor {
                return None;
            }
        }

        let topics: Vec<B256> = log.topics.iter().filter_map(|t| t.parse().ok()).collect();
        let data = hex::decode(&log.data).unwrap_or_default();

        Some(Occurrence {
            event_name: self.event.name.clone(),
            source_address: self.address.to_checksum(None),
            attributes: self.event.decode(&topics, &data),
            sequence,
        })
    }
}

fn parse_quantity(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}
