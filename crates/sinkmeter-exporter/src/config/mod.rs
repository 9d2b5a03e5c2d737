//! Exporter config loader (strict parsing).

pub mod schema;

use std::fs;

use sinkmeter_core::error::{Result, SinkMeterError};

pub use schema::{ExporterConfig, ExporterSection, ManifestSection, MetricsSection};

pub fn load_from_file(path: &str) -> Result<ExporterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| SinkMeterError::Internal(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ExporterConfig> {
    let cfg: ExporterConfig = serde_yaml::from_str(s)
        .map_err(|e| SinkMeterError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
