//! Contract ABI handling: the known event set, topic hashes, address
//! validation, and log decoding.
//!
//! Accepts either a bare ABI array (`contract_abi.json`) or a compiled
//! artifact document (`{"abi": [...], "address": "0x..."}`), so a deploy
//! pipeline's output can feed the watchdog directly.

use std::collections::BTreeMap;
use std::str::FromStr;

use alloy_primitives::{hex, keccak256, Address, B256, U256};
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct AbiInput {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub indexed: bool,
}

#[derive(Debug, Deserialize)]
struct AbiEntry {
    #[serde(rename = "type")]
    ty: String,
    name: Option<String>,
    #[serde(default)]
    inputs: Vec<AbiInput>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    abi: Vec<AbiEntry>,
    #[serde(alias = "contractAddress")]
    address: Option<String>,
}

/// One event definition out of the ABI.
#[derive(Debug, Clone)]
pub struct EventAbi {
    pub name: String,
    pub inputs: Vec<AbiInput>,
}

impl EventAbi {
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.inputs.iter().map(|i| canonical_type(&i.ty)).collect();
        format!("{}({})", self.name, types.join(","))
    }

    pub fn topic0(&self) -> B256 {
        keccak256(self.signature().as_bytes())
    }

    /// Decode a log into named attributes. Indexed parameters come from
    /// topics (dynamic ones arrive pre-hashed and are rendered as hex);
    /// non-indexed parameters come from the data section, one head word
    /// each, with string/bytes tails followed through their offsets.
    /// Parameters the log is too short for are dropped rather than
    /// guessed at.
    pub fn decode(&self, topics: &[B256], data: &[u8]) -> BTreeMap<String, Value> {
        let mut attributes = BTreeMap::new();
        let mut topics = topics.iter().skip(1);
        let mut head = 0usize;

        for (i, input) in self.inputs.iter().enumerate() {
            let name = if input.name.is_empty() {
                format!("arg{}", i)
            } else {
                input.name.clone()
            };

            let value = if input.indexed {
                topics.next().map(|t| decode_static(&input.ty, t.as_slice()))
            } else {
                let word = data.get(head..head + 32);
                head += 32;
                word.map(|w| match input.ty.as_str() {
                    "string" | "bytes" => decode_dynamic(&input.ty, data, w),
                    _ => decode_static(&input.ty, w),
                })
            };

            if let Some(value) = value {
                attributes.insert(name, value);
            }
        }

        attributes
    }
}

/// The source's known event set, parsed once at load time so event lookup
/// is an explicit capability check rather than runtime introspection.
#[derive(Debug, Clone)]
pub struct ContractAbi {
    events: Vec<EventAbi>,
    deployed_address: Option<String>,
}

impl ContractAbi {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading ABI document {}", path))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        if let Ok(entries) = serde_json::from_str::<Vec<AbiEntry>>(raw) {
            return Ok(Self::from_entries(entries, None));
        }
        let artifact: serde_json::Result<Artifact> = serde_json::from_str(raw);
        let artifact = artifact.context("document is neither an ABI array nor a contract artifact")?;
        Ok(Self::from_entries(artifact.abi, artifact.address))
    }

    fn from_entries(entries: Vec<AbiEntry>, deployed_address: Option<String>) -> Self {
        let events = entries
            .into_iter()
            .filter(|e| e.ty == "event")
            .filter_map(|e| {
                e.name.map(|name| EventAbi {
                    name,
                    inputs: e.inputs,
                })
            })
            .collect();
        Self {
            events,
            deployed_address,
        }
    }

    pub fn event(&self, name: &str) -> Option<&EventAbi> {
        self.events.iter().find(|e| e.name == name)
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.name.as_str()).collect()
    }

    /// Address recorded by the deploy pipeline, if the document carried one.
    pub fn deployed_address(&self) -> Option<&str> {
        self.deployed_address.as_deref()
    }
}

/// Parse a contract address. Uniform-case hex is accepted and normalized;
/// mixed-case input must carry a correct EIP-55 checksum.
pub fn parse_checksummed(s: &str) -> Result<Address, String> {
    let address = Address::from_str(s).map_err(|e| format!("{}: {}", s, e))?;
    let digits = s.trim_start_matches("0x");
    let mixed = digits.chars().any(|c| c.is_ascii_uppercase())
        && digits.chars().any(|c| c.is_ascii_lowercase());
    if mixed && address.to_checksum(None) != s {
        return Err(format!("{} fails checksum validation", s));
    }
    Ok(address)
}

fn canonical_type(ty: &str) -> &str {
    match ty {
        "uint" => "uint256",
        "int" => "int256",
        other => other,
    }
}

fn decode_static(ty: &str, word: &[u8]) -> Value {
    match ty {
        "address" => Value::String(Address::from_slice(&word[12..]).to_checksum(None)),
        "bool" => Value::Bool(word[31] != 0),
        t if t.starts_with("uint") || t.starts_with("int") => {
            let mut buf = [0u8; 32];
            buf.copy_from_slice(word);
            Value::String(U256::from_be_bytes(buf).to_string())
        }
        _ => Value::String(format!("0x{}", hex::encode(word))),
    }
}

fn decode_dynamic(ty: &str, data: &[u8], head_word: &[u8]) -> Value {
    let fallback = |w: &[u8]| Value::String(format!("0x{}", hex::encode(w)));

    let mut buf = [0u8; 32];
    buf.copy_from_slice(head_word);
    let offset: usize = match U256::from_be_bytes(buf).try_into() {
        Ok(o) => o,
        Err(_) => return fallback(head_word),
    };

    let Some(len_word) = data.get(offset..offset + 32) else {
        return fallback(head_word);
    };
    buf.copy_from_slice(len_word);
    let len: usize = match U256::from_be_bytes(buf).try_into() {
        Ok(l) => l,
        Err(_) => return fallback(head_word),
    };

    let Some(payload) = data.get(offset + 32..offset + 32 + len) else {
        return fallback(head_word);
    };

    match ty {
        "string" => match std::str::from_utf8(payload) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => fallback(payload),
        },
        _ => fallback(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER_ABI: &str = r#"[
        {"type": "event", "name": "Transfer", "inputs": [
            {"name": "from", "type": "address", "indexed": true},
            {"name": "to", "type": "address", "indexed": true},
            {"name": "value", "type": "uint256", "indexed": false}
        ]},
        {"type": "function", "name": "transfer", "inputs": []}
    ]"#;

    #[test]
    fn parses_bare_abi_array() {
        let abi = ContractAbi::parse(TRANSFER_ABI).unwrap();
        assert_eq!(abi.event_names(), vec!["Transfer"]);
        assert!(abi.event("Transfer").is_some());
        assert!(abi.event("transfer").is_none());
        assert!(abi.deployed_address().is_none());
    }

    #[test]
    fn parses_artifact_with_address() {
        let raw = format!(
            r#"{{"abi": {}, "address": "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"}}"#,
            TRANSFER_ABI
        );
        let abi = ContractAbi::parse(&raw).unwrap();
        assert_eq!(
            abi.deployed_address(),
            Some("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")
        );
        assert_eq!(abi.event_names(), vec!["Transfer"]);
    }

    #[test]
    fn transfer_topic_matches_the_well_known_hash() {
        let abi = ContractAbi::parse(TRANSFER_ABI).unwrap();
        let expected: B256 = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
            .parse()
            .unwrap();
        assert_eq!(abi.event("Transfer").unwrap().topic0(), expected);
    }

    #[test]
    fn signature_canonicalizes_shorthand_integers() {
        let event = EventAbi {
            name: "Ping".into(),
            inputs: vec![AbiInput {
                name: "n".into(),
                ty: "uint".into(),
                indexed: false,
            }],
        };
        assert_eq!(event.signature(), "Ping(uint256)");
    }

    #[test]
    fn checksummed_and_uniform_case_addresses_parse() {
        // EIP-55 test vector
        assert!(parse_checksummed("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_ok());
        assert!(parse_checksummed("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_ok());
    }

    #[test]
    fn bad_checksum_and_bad_hex_are_rejected() {
        // first mixed-case letter flipped
        assert!(parse_checksummed("0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_err());
        assert!(parse_checksummed("0x1234").is_err());
        assert!(parse_checksummed("not-an-address").is_err());
    }

    #[test]
    fn decodes_indexed_topics_and_data_words() {
        let abi = ContractAbi::parse(TRANSFER_ABI).unwrap();
        let event = abi.event("Transfer").unwrap();

        let mut from_topic = [0u8; 32];
        from_topic[12..].copy_from_slice(&[0x11; 20]);
        let mut to_topic = [0u8; 32];
        to_topic[12..].copy_from_slice(&[0x22; 20]);
        let topics = vec![
            event.topic0(),
            B256::from_slice(&from_topic),
            B256::from_slice(&to_topic),
        ];

        let mut data = [0u8; 32];
        data[30] = 0x03;
        data[31] = 0xe8; // 1000

        let attrs = event.decode(&topics, &data);
        assert_eq!(
            attrs.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["from", "to", "value"]
        );
        let from = attrs["from"].as_str().unwrap();
        assert!(from.eq_ignore_ascii_case("0x1111111111111111111111111111111111111111"));
        assert_eq!(attrs["value"], Value::String("1000".into()));
    }

    #[test]
    fn short_logs_drop_missing_parameters() {
        let abi = ContractAbi::parse(TRANSFER_ABI).unwrap();
        let event = abi.event("Transfer").unwrap();
        let attrs = event.decode(&[event.topic0()], &[]);
        assert!(attrs.is_empty());
    }

    #[test]
    fn decodes_non_indexed_strings_through_their_offset() {
        let raw = r#"[{"type": "event", "name": "Named", "inputs": [
            {"name": "label", "type": "string", "indexed": false}
        ]}]"#;
        let abi = ContractAbi::parse(raw).unwrap();
        let event = abi.event("Named").unwrap();

        let mut data = vec![0u8; 96];
        data[31] = 0x20; // offset 32
        data[63] = 0x02; // length 2
        data[64] = b'h';
        data[65] = b'i';

        let attrs = event.decode(&[event.topic0()], &data);
        assert_eq!(attrs["label"], Value::String("hi".into()));
    }
}
