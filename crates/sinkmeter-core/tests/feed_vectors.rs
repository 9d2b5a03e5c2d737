//! NDJSON feed vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use sinkmeter_core::protocol::decode_line;
use sinkmeter_core::{BlockEvent, BlockRef};

fn load(name: &str) -> Vec<BlockEvent> {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    s.lines()
        .filter_map(|l| decode_line(l).expect("vector line must decode"))
        .collect()
}

#[test]
fn session_flow_vector() {
    let events = load("session_flow.ndjson");
    let kinds: Vec<&str> = events.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, ["session", "progress", "block", "block", "undo", "block_v2"]);

    let BlockEvent::Session(s) = &events[0] else { panic!("expected session") };
    assert_eq!(s.trace_id, "4f1c9a2e0b7d");
    assert_eq!(s.linear_handoff_block, 150);

    let BlockEvent::Progress(p) = &events[1] else { panic!("expected progress") };
    assert_eq!(p.modules.len(), 2);
    assert_eq!(p.modules[1].name, "store_totals");
    assert_eq!(p.modules[1].last_end_block, 110);

    let BlockEvent::Block(b) = &events[2] else { panic!("expected block") };
    let clock = b.clock.as_ref().unwrap();
    assert_eq!(clock.number, 100);
    assert_eq!(clock.timestamp_seconds, 1_700_000_000);
    assert_eq!(b.encoded_len(), 5);
    assert_eq!(b.final_block_height, 98);

    let BlockEvent::Block(empty) = &events[3] else { panic!("expected block") };
    assert!(empty.clock.is_none());
    assert_eq!(empty.encoded_len(), 0);

    let BlockEvent::Undo(u) = &events[4] else { panic!("expected undo") };
    assert_eq!(u.last_valid_block, Some(BlockRef { number: 99, id: "0x63".into() }));
    assert_eq!(u.last_valid_cursor, "cursor-99");
}
