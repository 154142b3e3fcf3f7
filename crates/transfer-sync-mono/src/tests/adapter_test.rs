use serde_json::json;
use transfer_sync::TRANSFER_TOPIC;

use crate::adapters::{QueryResponse, WireNumber};

#[test]
fn test_wire_numbers() {
    assert_eq!(WireNumber::Int(7).to_u64().unwrap(), 7);
    assert_eq!(WireNumber::Text("0x1f".to_string()).to_u64().unwrap(), 31);
    assert_eq!(WireNumber::Text("42".to_string()).to_u64().unwrap(), 42);
    assert!(WireNumber::Text("0xzz".to_string()).to_u64().is_err());
}

#[test]
fn test_query_response_flattens_batches() {
    let topic0 = format!("{:#x}", TRANSFER_TOPIC);
    let body = json!({
        "data": [
            {
                "logs": [{
                    "block_number": 12,
                    "log_index": "0x3",
                    "transaction_index": 1,
                    "transaction_hash": format!("0x{:064x}", 99),
                    "address": format!("0x{}", "42".repeat(20)),
                    "data": format!("0x{:064x}", 500),
                    "topic0": topic0,
                    "topic1": format!("0x{:064x}", 1),
                    "topic2": format!("0x{:064x}", 2),
                    "topic3": null
                }],
                "transactions": [{
                    "block_number": "0xc",
                    "transaction_index": 1,
                    "hash": format!("0x{:064x}", 99),
                    "gas_used": "0x5208"
                }],
                "blocks": [{ "number": 12, "hash": null, "timestamp": "0x10" }]
            },
            { "logs": [], "blocks": [{ "number": 13 }] }
        ],
        "archive_height": 20,
        "next_block": 14
    });

    let response: QueryResponse = serde_json::from_value(body).unwrap();
    let result = response.into_fetch_result().unwrap();

    assert_eq!(result.archive_height, 20);
    assert_eq!(result.next_block, 14);
    assert_eq!(result.logs.len(), 1);
    let log = &result.logs[0];
    assert_eq!(log.block_number, 12);
    assert_eq!(log.log_index, 3);
    assert_eq!(log.transaction_index, Some(1));
    assert_eq!(log.topics.len(), 3);
    assert_eq!(log.topics[0], TRANSFER_TOPIC);
    assert_eq!(log.data.len(), 32);

    assert_eq!(result.transactions.len(), 1);
    assert_eq!(result.transactions[0].block_number, 12);
    assert_eq!(result.transactions[0].fields["gas_used"], json!("0x5208"));
    assert!(!result.transactions[0].fields.contains_key("hash"));

    let numbers: Vec<u64> = result.blocks.iter().map(|b| b.number).collect();
    assert_eq!(numbers, vec![12, 13]);
    assert_eq!(result.blocks[0].hash, None);
}

#[test]
fn test_missing_archive_height_means_caught_up() {
    let response: QueryResponse =
        serde_json::from_value(json!({ "data": [], "next_block": 5 })).unwrap();
    let result = response.into_fetch_result().unwrap();
    assert_eq!(result.archive_height, 0);
    assert!(result.archive_height < result.next_block);
}

#[test]
fn test_transaction_without_key_columns_is_rejected() {
    let response: QueryResponse = serde_json::from_value(json!({
        "data": [{ "transactions": [{ "from": "0x00" }] }],
        "archive_height": 1,
        "next_block": 1
    }))
    .unwrap();
    assert!(response.into_fetch_result().is_err());
}
