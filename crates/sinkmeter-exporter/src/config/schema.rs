use std::net::SocketAddr;

use serde::Deserialize;
use sinkmeter_core::error::{Result, SinkMeterError};
use sinkmeter_core::{ManifestDescriptor, RequestDescriptor};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    #[serde(default)]
    pub exporter: ExporterSection,

    #[serde(default)]
    pub metrics: MetricsSection,

    pub manifest: ManifestSection,
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(SinkMeterError::UnsupportedVersion);
        }

        self.exporter.validate()?;
        self.metrics.validate()?;
        self.manifest.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Buffered events between the feed reader and the bridge.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ExporterSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if !(1..=1_000_000).contains(&self.channel_capacity) {
            return Err(SinkMeterError::BadRequest(
                "exporter.channel_capacity must be between 1 and 1000000".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| SinkMeterError::BadRequest(format!("exporter.listen must be a valid SocketAddr: {e}")))
    }
}

fn default_listen() -> String {
    "0.0.0.0:9102".into()
}
fn default_channel_capacity() -> usize {
    1024
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Keep only the latest N `trace_id` series. Unbounded when absent.
    #[serde(default)]
    pub trace_id_series_limit: Option<usize>,
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        if self.trace_id_series_limit == Some(0) {
            return Err(SinkMeterError::BadRequest(
                "metrics.trace_id_series_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestSection {
    pub manifest: String,
    pub substreams_endpoint: String,
    pub module_hash: String,
    pub output_module: String,
    #[serde(default)]
    pub start_block_num: i64,
    #[serde(default)]
    pub stop_block_num: u64,
    #[serde(default)]
    pub production_mode: bool,
}

impl ManifestSection {
    pub fn validate(&self) -> Result<()> {
        if self.output_module.is_empty() {
            return Err(SinkMeterError::BadRequest("manifest.output_module must not be empty".into()));
        }
        if self.stop_block_num != 0 && self.start_block_num >= 0 && self.stop_block_num <= self.start_block_num as u64 {
            return Err(SinkMeterError::BadRequest(
                "manifest.stop_block_num must be greater than start_block_num".into(),
            ));
        }
        Ok(())
    }

    pub fn descriptor(&self) -> ManifestDescriptor {
        ManifestDescriptor {
            module_hash: self.module_hash.clone(),
            manifest: self.manifest.clone(),
            substreams_endpoint: self.substreams_endpoint.clone(),
            request: RequestDescriptor {
                output_module: self.output_module.clone(),
                start_block_num: self.start_block_num,
                stop_block_num: self.stop_block_num,
                production_mode: self.production_mode,
            },
        }
    }
}
