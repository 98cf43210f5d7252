//! SignalR JSON hub protocol, as spoken by the TzKT events endpoint.
//!
//! Every message is a JSON document terminated by the record separator
//! `0x1E`; one WebSocket frame may carry several. After the handshake the
//! client invokes `SubscribeToHead` / `SubscribeToOperations` and the server
//! pushes invocations targeting `head` or `operations`, each carrying
//! `{ type, state, data }` where type 0 is a state sync, 1 is data and 2 is
//! a reorg back to `state`.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use govindex_core::error::IndexerError;
use govindex_core::operation::RawTransaction;
use govindex_core::types::BlockHead;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u8 = 1;
const COMPLETION: u8 = 3;
const PING: u8 = 6;
const CLOSE: u8 = 7;

const CHANNEL_STATE: u8 = 0;
const CHANNEL_DATA: u8 = 1;
const CHANNEL_REORG: u8 = 2;

fn frame(value: Value) -> String {
    let mut text = value.to_string();
    text.push(RECORD_SEPARATOR);
    text
}

pub fn handshake() -> String {
    frame(json!({ "protocol": "json", "version": 1 }))
}

pub fn subscribe_head(invocation_id: u64) -> String {
    frame(json!({
        "type": INVOCATION,
        "invocationId": invocation_id.to_string(),
        "target": "SubscribeToHead",
        "arguments": []
    }))
}

/// Subscribe to transactions targeting `address`.
pub fn subscribe_operations(invocation_id: u64, address: &str) -> String {
    frame(json!({
        "type": INVOCATION,
        "invocationId": invocation_id.to_string(),
        "target": "SubscribeToOperations",
        "arguments": [{ "address": address, "types": "transaction" }]
    }))
}

pub fn ping() -> String {
    frame(json!({ "type": PING }))
}

/// Non-empty messages in a WebSocket text frame.
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR).map(str::trim).filter(|m| !m.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Server answer to the handshake.
    Handshake { error: Option<String> },
    /// A channel is synchronized up to level `state`.
    State { channel: String, state: u64 },
    Head(BlockHead),
    Operations { state: u64, transactions: Vec<RawTransaction> },
    /// The channel rolled back to level `state`.
    Reorg { channel: String, state: u64 },
    Completion { invocation_id: Option<String>, error: Option<String> },
    Ping,
    Close { error: Option<String> },
    Ignored,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<u8>,
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(rename = "invocationId")]
    invocation_id: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChannelMessage {
    #[serde(rename = "type")]
    kind: u8,
    state: u64,
    #[serde(default)]
    data: Value,
}

/// Parse one record-separated message.
pub fn parse_message(message: &str) -> Result<HubEvent, IndexerError> {
    let envelope: Envelope = serde_json::from_str(message)
        .map_err(|e| IndexerError::Channel(format!("malformed hub message: {e}")))?;

    let kind = match envelope.kind {
        None => return Ok(HubEvent::Handshake { error: envelope.error }),
        Some(kind) => kind,
    };
    match kind {
        INVOCATION => {}
        COMPLETION => {
            return Ok(HubEvent::Completion {
                invocation_id: envelope.invocation_id,
                error: envelope.error,
            })
        }
        PING => return Ok(HubEvent::Ping),
        CLOSE => return Ok(HubEvent::Close { error: envelope.error }),
        _ => return Ok(HubEvent::Ignored),
    }

    let Some(target) = envelope.target else {
        return Ok(HubEvent::Ignored);
    };
    let Some(argument) = envelope.arguments.into_iter().next() else {
        return Ok(HubEvent::Ignored);
    };
    let channel: ChannelMessage = serde_json::from_value(argument)
        .map_err(|e| IndexerError::Channel(format!("malformed {target} message: {e}")))?;

    match channel.kind {
        CHANNEL_STATE => Ok(HubEvent::State {
            channel: target,
            state: channel.state,
        }),
        CHANNEL_REORG => Ok(HubEvent::Reorg {
            channel: target,
            state: channel.state,
        }),
        CHANNEL_DATA => match target.as_str() {
            "head" => {
                let head: BlockHead = serde_json::from_value(channel.data)
                    .map_err(|e| IndexerError::Channel(format!("malformed head: {e}")))?;
                Ok(HubEvent::Head(head))
            }
            "operations" => Ok(HubEvent::Operations {
                state: channel.state,
                transactions: transactions(channel.data),
            }),
            _ => Ok(HubEvent::Ignored),
        },
        _ => Ok(HubEvent::Ignored),
    }
}

fn transactions(data: Value) -> Vec<RawTransaction> {
    let Value::Array(items) = data else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter(|op| op.get("type").and_then(Value::as_str).map_or(true, |t| t == "transaction"))
        .filter_map(|op| match serde_json::from_value::<RawTransaction>(op) {
            Ok(tx) => Some(tx),
            Err(e) => {
                debug!(error = %e, "unreadable pushed operation skipped");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outgoing_messages_are_terminated() {
        for msg in [handshake(), subscribe_head(0), subscribe_operations(1, "KT1gov"), ping()] {
            assert!(msg.ends_with(RECORD_SEPARATOR));
            assert_eq!(msg.matches(RECORD_SEPARATOR).count(), 1);
        }
        let sub: Value = serde_json::from_str(subscribe_operations(1, "KT1gov").trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(sub["target"], "SubscribeToOperations");
        assert_eq!(sub["arguments"][0]["address"], "KT1gov");
        assert_eq!(sub["invocationId"], "1");
    }

    #[test]
    fn splits_batched_frames() {
        let text = "{}\u{1e}{\"type\":6}\u{1e}";
        let messages: Vec<&str> = split_frames(text).collect();
        assert_eq!(messages, vec!["{}", "{\"type\":6}"]);
        assert_eq!(parse_message(messages[0]).unwrap(), HubEvent::Handshake { error: None });
        assert_eq!(parse_message(messages[1]).unwrap(), HubEvent::Ping);
    }

    #[test]
    fn parses_head_data() {
        let msg = r#"{"type":1,"target":"head","arguments":[{"type":1,"state":1200,"data":{"chain":"mainnet","level":1200,"hash":"BLx","timestamp":"2024-05-01T10:00:00Z"}}]}"#;
        let HubEvent::Head(head) = parse_message(msg).unwrap() else {
            panic!("expected head");
        };
        assert_eq!(head.level, 1200);
        assert_eq!(head.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn parses_operations_and_skips_other_types() {
        let msg = r#"{"type":1,"target":"operations","arguments":[{"type":1,"state":1050,"data":[
            {"type":"transaction","hash":"ooNew","level":1050,"timestamp":"2024-05-01T10:00:00Z",
             "sender":{"address":"tz1a"},"target":{"address":"KT1gov"},
             "parameter":{"entrypoint":"new_proposal","value":"0xaa"},"status":"applied"},
            {"type":"delegation","hash":"ooDel","level":1050,"timestamp":"2024-05-01T10:00:00Z",
             "sender":{"address":"tz1b"}}
        ]}]}"#;
        let HubEvent::Operations { state, transactions } = parse_message(msg).unwrap() else {
            panic!("expected operations");
        };
        assert_eq!(state, 1050);
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].hash, "ooNew");
    }

    #[test]
    fn parses_state_and_reorg() {
        let state = r#"{"type":1,"target":"operations","arguments":[{"type":0,"state":1000}]}"#;
        assert_eq!(
            parse_message(state).unwrap(),
            HubEvent::State { channel: "operations".into(), state: 1000 }
        );
        let reorg = r#"{"type":1,"target":"head","arguments":[{"type":2,"state":998}]}"#;
        assert_eq!(parse_message(reorg).unwrap(), HubEvent::Reorg { channel: "head".into(), state: 998 });
    }

    #[test]
    fn handshake_error_and_close() {
        assert_eq!(
            parse_message(r#"{"error":"unsupported protocol"}"#).unwrap(),
            HubEvent::Handshake { error: Some("unsupported protocol".into()) }
        );
        assert_eq!(
            parse_message(r#"{"type":7,"error":"server shutting down"}"#).unwrap(),
            HubEvent::Close { error: Some("server shutting down".into()) }
        );
        assert_eq!(
            parse_message(r#"{"type":3,"invocationId":"0","result":1450}"#).unwrap(),
            HubEvent::Completion { invocation_id: Some("0".into()), error: None }
        );
    }

    #[test]
    fn malformed_message_is_channel_error() {
        assert!(matches!(parse_message("not json"), Err(IndexerError::Channel(_))));
    }
}
