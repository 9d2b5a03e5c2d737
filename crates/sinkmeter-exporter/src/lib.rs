//! sinkmeter exporter library entry.
//!
//! This crate wires the metrics registry, the event-to-metric bridge, the
//! feed delivery loop, and the ops endpoints into one exporter. It is consumed
//! by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod bridge;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
