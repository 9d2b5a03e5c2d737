//! Event-to-metric bridge.
//!
//! Re-exports the bridge, its registration helpers and the delivery loop so
//! downstream consumers can depend on this module directly.

pub mod drift;
pub mod driver;
pub mod metrics_bridge;
pub mod register;

pub use drift::{time_drift, FixedClock, SystemClock, WallClock};
pub use metrics_bridge::{names, MetricsBridge};
pub use register::{register_counter, register_gauge, register_histogram, register_summary, DEFAULT_HELP};
