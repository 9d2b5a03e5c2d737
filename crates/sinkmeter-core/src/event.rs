//! Session lifecycle events delivered by a block emitter.
//!
//! These mirror the messages a block-stream session produces after protocol
//! decoding. Only the fields metrics care about are modeled; everything else
//! stays on the session side.

use bytes::Bytes;

/// Reference to a block by number and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRef {
    pub number: u64,
    pub id: String,
}

/// Clock attached to a block: where the stream is and when that block was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    pub id: String,
    pub number: u64,
    /// Block timestamp, whole seconds since the unix epoch.
    pub timestamp_seconds: i64,
}

/// First message of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionInit {
    pub trace_id: String,
    pub resolved_start_block: u64,
    pub linear_handoff_block: u64,
    pub max_parallel_workers: u64,
}

/// One block worth of module output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockScopedData {
    /// Absent when the emitter could not attach one.
    pub clock: Option<Clock>,
    pub output_module: String,
    /// Encoded message exactly as received.
    pub payload: Bytes,
    pub final_block_height: u64,
}

impl BlockScopedData {
    /// Encoded size of the message on the wire.
    pub fn encoded_len(&self) -> usize {
        self.payload.len()
    }
}

/// Chain reorganization: everything after `last_valid_block` is retracted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockUndoSignal {
    pub last_valid_block: Option<BlockRef>,
    pub last_valid_cursor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProgress {
    pub name: String,
    pub last_end_block: u64,
}

/// Backprocessing progress report, one entry per module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModulesProgress {
    pub modules: Vec<ModuleProgress>,
}

/// Signals an emitter delivers to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEvent {
    Session(SessionInit),
    Block(BlockScopedData),
    Undo(BlockUndoSignal),
    Progress(ModulesProgress),
    /// A signal this build does not recognise (kept for forward compatibility).
    Unknown { kind: String },
}

impl BlockEvent {
    /// Signal name, as used on the feed and in logs.
    pub fn kind(&self) -> &str {
        match self {
            BlockEvent::Session(_) => "session",
            BlockEvent::Block(_) => "block",
            BlockEvent::Undo(_) => "undo",
            BlockEvent::Progress(_) => "progress",
            BlockEvent::Unknown { kind } => kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_len_is_payload_len() {
        let data = BlockScopedData {
            clock: None,
            output_module: "map_events".into(),
            payload: Bytes::from_static(&[0x0a, 0x03, 0x61, 0x62, 0x63]),
            final_block_height: 0,
        };
        assert_eq!(data.encoded_len(), 5);
    }

    #[test]
    fn unknown_kind_is_reported_verbatim() {
        let ev = BlockEvent::Unknown { kind: "fatal".into() };
        assert_eq!(ev.kind(), "fatal");
        assert_eq!(BlockEvent::Undo(BlockUndoSignal::default()).kind(), "undo");
    }
}
