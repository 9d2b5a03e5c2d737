//! NDJSON feed decoding.
//!
//! ```text
//! {"type":"session","trace_id":"4f1c..."}
//! {"type":"block","clock":{"id":"0xab","number":100,"timestamp":1700000000},"payload":"CgNhYmM="}
//! {"type":"undo","last_valid_block":{"number":99,"id":"0xaa"},"last_valid_cursor":"c1"}
//! {"type":"progress","modules":[{"name":"map_events","last_end_block":1200}]}
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Result, SinkMeterError};
use crate::event::{
    BlockEvent, BlockRef, BlockScopedData, BlockUndoSignal, Clock, ModuleProgress, ModulesProgress,
    SessionInit,
};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    body: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionWire {
    trace_id: String,
    #[serde(default)]
    resolved_start_block: u64,
    #[serde(default)]
    linear_handoff_block: u64,
    #[serde(default)]
    max_parallel_workers: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClockWire {
    #[serde(default)]
    id: String,
    number: u64,
    /// Seconds since the unix epoch.
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockWire {
    #[serde(default)]
    clock: Option<ClockWire>,
    #[serde(default)]
    output_module: String,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    final_block_height: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockRefWire {
    number: u64,
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UndoWire {
    #[serde(default)]
    last_valid_block: Option<BlockRefWire>,
    #[serde(default)]
    last_valid_cursor: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleProgressWire {
    name: String,
    last_end_block: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProgressWire {
    #[serde(default)]
    modules: Vec<ModuleProgressWire>,
}

fn body_as<T: DeserializeOwned>(kind: &str, body: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(body))
        .map_err(|e| SinkMeterError::BadRequest(format!("invalid {kind} envelope: {e}")))
}

/// Decode one feed line. Blank lines yield `Ok(None)`.
pub fn decode_line(line: &str) -> Result<Option<BlockEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let env: Envelope = serde_json::from_str(line)
        .map_err(|e| SinkMeterError::BadRequest(format!("invalid json: {e}")))?;

    let event = match env.kind.as_str() {
        "session" => {
            let w: SessionWire = body_as("session", env.body)?;
            BlockEvent::Session(SessionInit {
                trace_id: w.trace_id,
                resolved_start_block: w.resolved_start_block,
                linear_handoff_block: w.linear_handoff_block,
                max_parallel_workers: w.max_parallel_workers,
            })
        }
        "block" => {
            let w: BlockWire = body_as("block", env.body)?;
            let payload = STANDARD
                .decode(w.payload.as_bytes())
                .map_err(|e| SinkMeterError::BadRequest(format!("invalid base64 payload: {e}")))?;
            BlockEvent::Block(BlockScopedData {
                clock: w.clock.map(|c| Clock {
                    id: c.id,
                    number: c.number,
                    timestamp_seconds: c.timestamp,
                }),
                output_module: w.output_module,
                payload: Bytes::from(payload),
                final_block_height: w.final_block_height,
            })
        }
        "undo" => {
            let w: UndoWire = body_as("undo", env.body)?;
            BlockEvent::Undo(BlockUndoSignal {
                last_valid_block: w.last_valid_block.map(|b| BlockRef { number: b.number, id: b.id }),
                last_valid_cursor: w.last_valid_cursor,
            })
        }
        "progress" => {
            let w: ProgressWire = body_as("progress", env.body)?;
            BlockEvent::Progress(ModulesProgress {
                modules: w
                    .modules
                    .into_iter()
                    .map(|m| ModuleProgress { name: m.name, last_end_block: m.last_end_block })
                    .collect(),
            })
        }
        other => {
            tracing::trace!(kind = %other, "unrecognised feed envelope");
            BlockEvent::Unknown { kind: other.to_string() }
        }
    };

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn code(line: &str) -> ErrorCode {
        match decode_line(line) {
            Err(e) => e.code(),
            Ok(ev) => unreachable!("expected error, got {ev:?}"),
        }
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(matches!(decode_line("   "), Ok(None)));
    }

    #[test]
    fn block_payload_length_is_decoded_length() {
        let ev = decode_line(r#"{"type":"block","payload":"CgNhYmM="}"#);
        let Ok(Some(BlockEvent::Block(b))) = &ev else {
            unreachable!("expected block, got {ev:?}")
        };
        assert_eq!(b.encoded_len(), 5);
        assert!(b.clock.is_none());
    }

    #[test]
    fn rejects_bad_base64_and_bad_json() {
        assert_eq!(code(r#"{"type":"block","payload":"@@@"}"#), ErrorCode::BadRequest);
        assert_eq!(code("{not json"), ErrorCode::BadRequest);
        assert_eq!(code(r#"{"trace_id":"x"}"#), ErrorCode::BadRequest);
    }

    #[test]
    fn typo_in_known_envelope_fails() {
        assert_eq!(code(r#"{"type":"session","traceid":"x"}"#), ErrorCode::BadRequest);
    }

    #[test]
    fn unrecognised_type_is_unknown_event() {
        let ev = decode_line(r#"{"type":"fatal","reason":"boom"}"#);
        assert!(matches!(ev, Ok(Some(BlockEvent::Unknown { ref kind })) if kind == "fatal"));
    }
}
