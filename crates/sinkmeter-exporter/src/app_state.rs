//! Shared application state for the exporter.
//!
//! Owns the process-wide registry and the bridge that writes into it. Both
//! are built once at startup and shared by the feed loop and the ops router.

use std::sync::Arc;

use sinkmeter_core::error::Result;

use crate::bridge::MetricsBridge;
use crate::config::ExporterConfig;
use crate::obs::MetricsRegistry;

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<ExporterConfig>,
    registry: Arc<MetricsRegistry>,
    bridge: Arc<MetricsBridge>,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: ExporterConfig) -> Result<Self> {
        cfg.validate()?;

        let registry = Arc::new(MetricsRegistry::new());
        let mut bridge = MetricsBridge::new(Arc::clone(&registry));
        if let Some(limit) = cfg.metrics.trace_id_series_limit {
            bridge = bridge.with_trace_id_limit(limit);
        }

        tracing::info!(instruments = registry.len(), "metrics registry ready");

        Ok(Self {
            cfg: Arc::new(cfg),
            registry,
            bridge: Arc::new(bridge),
        })
    }

    pub fn cfg(&self) -> &ExporterConfig {
        &self.cfg
    }

    pub fn registry(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn bridge(&self) -> Arc<MetricsBridge> {
        Arc::clone(&self.bridge)
    }

    /// Ready once the manifest info metric is published.
    pub fn is_ready(&self) -> bool {
        self.bridge.manifest_bound()
    }
}
