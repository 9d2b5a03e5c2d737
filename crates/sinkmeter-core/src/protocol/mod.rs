//! Event feed wire format.
//!
//! Sessions hand events to the exporter as newline-delimited JSON envelopes
//! tagged by `type`. Block payloads travel base64-encoded so the decoded
//! length is the exact encoded message size.
//!
//! The decoder is panic-free: malformed input is reported as
//! `SinkMeterError` and unrecognised envelope types decode to
//! `BlockEvent::Unknown` instead of failing.

pub mod feed;

pub use feed::decode_line;
