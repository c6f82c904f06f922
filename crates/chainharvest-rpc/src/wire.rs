//! Conversion between core types and the Ethereum JSON-RPC wire format.

use serde_json::{json, Value};

use chainharvest_core::types::{Address, FilterQuery, LogEvent, Transaction, TxHash};

use crate::error::RpcError;

/// Encode a block number for `fromBlock`/`toBlock` params.
pub fn hex_u64(n: u64) -> String {
    format!("0x{n:x}")
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).ok()
}

fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()
}

/// Build the filter object for `eth_getLogs` / `eth_subscribe("logs", ...)`.
///
/// Topic positions encode the OR-set rule: an empty position becomes `null`
/// (wildcard), a single entry becomes a bare hash, multiple entries an array.
pub fn filter_params(query: &FilterQuery) -> Value {
    let mut obj = serde_json::Map::new();

    if !query.addresses.is_empty() {
        let addrs: Vec<Value> = query
            .addresses
            .iter()
            .map(|a| Value::String(a.to_string()))
            .collect();
        obj.insert("address".into(), Value::Array(addrs));
    }

    if !query.topics.is_empty() {
        let topics: Vec<Value> = query
            .topics
            .iter()
            .map(|or_set| match or_set.len() {
                0 => Value::Null,
                1 => Value::String(or_set[0].to_string()),
                _ => Value::Array(
                    or_set.iter().map(|t| Value::String(t.to_string())).collect(),
                ),
            })
            .collect();
        obj.insert("topics".into(), Value::Array(topics));
    }

    if let Some(range) = &query.range {
        obj.insert("fromBlock".into(), json!(hex_u64(range.from())));
        obj.insert("toBlock".into(), json!(hex_u64(range.to())));
    }

    Value::Object(obj)
}

/// Parse one log object as returned by `eth_getLogs` or pushed by a
/// `logs` subscription.
pub fn parse_log(v: &Value) -> Result<LogEvent, RpcError> {
    let field = |name: &str| -> Result<&str, RpcError> {
        v.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid("eth_getLogs", format!("missing field '{name}'")))
    };

    let address = Address::parse(field("address")?)
        .map_err(|e| RpcError::invalid("eth_getLogs", e.to_string()))?;

    let topics = v
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::invalid("eth_getLogs", "missing field 'topics'"))?
        .iter()
        .map(|t| {
            t.as_str()
                .and_then(|s| chainharvest_core::types::TopicHash::parse(s).ok())
                .ok_or_else(|| RpcError::invalid("eth_getLogs", "malformed topic"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let data = parse_hex_bytes(field("data")?)
        .ok_or_else(|| RpcError::invalid("eth_getLogs", "malformed data"))?;

    let block_number = parse_hex_u64(field("blockNumber")?)
        .ok_or_else(|| RpcError::invalid("eth_getLogs", "malformed blockNumber"))?;

    let tx_hash = TxHash::parse(field("transactionHash")?)
        .map_err(|e| RpcError::invalid("eth_getLogs", e.to_string()))?;

    let log_index = parse_hex_u64(field("logIndex")?)
        .ok_or_else(|| RpcError::invalid("eth_getLogs", "malformed logIndex"))?
        as u32;

    let removed = v.get("removed").and_then(Value::as_bool).unwrap_or(false);

    Ok(LogEvent {
        address,
        topics,
        data,
        block_number,
        tx_hash,
        log_index,
        removed,
    })
}

/// Parse a transaction object from `eth_getTransactionByHash`.
///
/// Returns the transaction plus `pending` — `true` when the object carries no
/// block number, i.e. the transaction has not been mined yet.
pub fn parse_transaction(v: &Value) -> Result<(Transaction, bool), RpcError> {
    const M: &str = "eth_getTransactionByHash";

    let str_field = |name: &str| -> Result<&str, RpcError> {
        v.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid(M, format!("missing field '{name}'")))
    };

    let hash = TxHash::parse(str_field("hash")?)
        .map_err(|e| RpcError::invalid(M, e.to_string()))?;

    let chain_id = v
        .get("chainId")
        .and_then(Value::as_str)
        .and_then(parse_hex_u64);

    let tx_type = v
        .get("type")
        .and_then(Value::as_str)
        .and_then(parse_hex_u64)
        .unwrap_or(0) as u8;

    let from = v
        .get("from")
        .and_then(Value::as_str)
        .and_then(|s| Address::parse(s).ok());

    // `to` is null for contract creation
    let to = v
        .get("to")
        .and_then(Value::as_str)
        .and_then(|s| Address::parse(s).ok());

    let value = str_field("value")?.to_string();

    let input = parse_hex_bytes(str_field("input")?)
        .ok_or_else(|| RpcError::invalid(M, "malformed input"))?;

    let v_sig = v
        .get("v")
        .and_then(Value::as_str)
        .and_then(parse_hex_u64)
        .ok_or_else(|| RpcError::invalid(M, "missing signature field 'v'"))?;

    let pending = v
        .get("blockNumber")
        .map(Value::is_null)
        .unwrap_or(true);

    Ok((
        Transaction {
            hash,
            chain_id,
            tx_type,
            from,
            to,
            value,
            input,
            v: v_sig,
        },
        pending,
    ))
}
