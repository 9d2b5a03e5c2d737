//! sinkmeter core: transport-agnostic session events, manifest descriptors,
//! the NDJSON event feed decoder, and the shared error type.
//!
//! This crate defines what a block-stream session reports and how those
//! reports look on the wire. It carries no runtime or metrics dependencies so
//! the exporter, tests, and tooling can all share it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! A malformed feed line surfaces as `SinkMeterError`, never as a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod event;
pub mod manifest;
pub mod protocol;

/// Shared result type.
pub use error::{Result, SinkMeterError};
pub use event::{BlockEvent, BlockRef, BlockScopedData, BlockUndoSignal, Clock, ModuleProgress, ModulesProgress, SessionInit};
pub use manifest::{ManifestDescriptor, RequestDescriptor};
