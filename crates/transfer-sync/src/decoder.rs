//! Default [`LogDecoder`]: dynamic ABI decoding on a blocking worker.

use alloy_dyn_abi::{DynSolValue, EventExt};
use alloy_json_abi::JsonAbi;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{AbiMap, DecodeOutcome, DecodedLog, LogDecoder, RawLog, SyncError, SyncResult};

/// Decodes logs against whatever JSON ABI each address maps to.
///
/// Decoding runs on `spawn_blocking` so a host running several sync sessions on one
/// executor is not stalled by large batches.
#[derive(Debug, Clone, Default)]
pub struct DynAbiDecoder;

impl DynAbiDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LogDecoder for DynAbiDecoder {
    async fn decode_logs(&self, abis: &AbiMap, logs: &[RawLog]) -> SyncResult<Vec<DecodedLog>> {
        let abis = abis.clone();
        let logs = logs.to_vec();
        tokio::task::spawn_blocking(move || decode_batch(&abis, &logs))
            .await
            .map_err(|e| SyncError::Decode(format!("decode worker failed: {}", e)))
    }
}

/// Decode a batch synchronously. One output entry per input log.
pub fn decode_batch(abis: &AbiMap, logs: &[RawLog]) -> Vec<DecodedLog> {
    // Every address usually maps to the same text, parse each distinct one once
    let mut parsed: HashMap<Arc<str>, Result<Arc<JsonAbi>, String>> = HashMap::new();
    for text in abis.values() {
        parsed.entry(text.clone()).or_insert_with(|| {
            serde_json::from_str::<JsonAbi>(text)
                .map(Arc::new)
                .map_err(|e| format!("ABI does not parse: {}", e))
        });
    }

    logs.iter()
        .map(|log| {
            let outcome = match abis.get(&log.address) {
                None => failed(format!("no ABI mapped for address {}", log.address)),
                Some(text) => match parsed.get(text) {
                    Some(Ok(abi)) => decode_one(abi, log),
                    Some(Err(reason)) => failed(reason.clone()),
                    None => failed("ABI missing from parse cache".to_string()),
                },
            };
            DecodedLog::new(log, outcome)
        })
        .collect()
}

fn decode_one(abi: &JsonAbi, log: &RawLog) -> DecodeOutcome {
    let Some(topic0) = log.topics.first() else {
        return failed("log has no topics".to_string());
    };
    let Some(event) = abi
        .events()
        .find(|e| !e.anonymous && e.selector() == *topic0)
    else {
        return failed(format!("no event in ABI matches topic0 {:#x}", topic0));
    };

    match event.decode_log_parts(log.topics.iter().copied(), &log.data) {
        Ok(decoded) => DecodeOutcome::Decoded {
            event: event.name.clone(),
            indexed: decoded.indexed.iter().map(value_to_json).collect(),
            body: decoded.body.iter().map(value_to_json).collect(),
        },
        Err(e) => failed(format!("{} does not decode: {}", event.name, e)),
    }
}

fn failed(reason: String) -> DecodeOutcome {
    DecodeOutcome::Failed { reason }
}

/// Render a decoded value as JSON. Integers become decimal strings so that
/// 256-bit values survive.
pub fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::Function(f) => Value::String(f.to_string()),
        DynSolValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        #[allow(unreachable_patterns)]
        other => Value::String(format!("{:?}", other)),
    }
}
