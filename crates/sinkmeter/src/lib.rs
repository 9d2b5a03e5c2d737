//! Top-level facade crate for sinkmeter.
//!
//! Re-exports the core event model and the exporter library so users can depend on a single crate.

pub mod core {
    pub use sinkmeter_core::*;
}

pub mod exporter {
    pub use sinkmeter_exporter::*;
}
