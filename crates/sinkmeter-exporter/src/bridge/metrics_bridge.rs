use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use sinkmeter_core::{
    BlockEvent, BlockScopedData, BlockUndoSignal, Clock, ManifestDescriptor, ModulesProgress,
    SessionInit,
};

use super::drift::{time_drift, SystemClock, WallClock};
use super::register::{register_counter, register_gauge};
use crate::obs::MetricsRegistry;

/// Metric names exposed by the bridge.
pub mod names {
    pub const MESSAGE_SIZE_BYTES: &str = "substreams_sink_message_size_bytes";
    pub const ERROR: &str = "substreams_sink_error";
    pub const DATA_MESSAGE: &str = "substreams_sink_data_message";
    pub const DATA_MESSAGE_SIZE_BYTES: &str = "substreams_sink_data_message_size_bytes";
    pub const UNDO_MESSAGE: &str = "substreams_sink_undo_message";
    pub const UNKNOWN_MESSAGE: &str = "substreams_sink_unknown_message";
    pub const PROGRESS_MESSAGE: &str = "substreams_sink_progress_message";

    pub const TRACE_ID: &str = "trace_id";
    pub const HEAD_BLOCK_NUMBER: &str = "head_block_number";
    pub const HEAD_BLOCK_TIME_DRIFT: &str = "head_block_time_drift";
    pub const HEAD_BLOCK_TIMESTAMP: &str = "head_block_timestamp";
    pub const BACKPROCESSING_COMPLETION: &str = "substreams_sink_backprocessing_completion";
    pub const PROGRESS_LAST_END_BLOCK: &str = "substreams_sink_progress_message_last_end_block";
    pub const MANIFEST: &str = "manifest";
}

/// Keeps the latest `limit` trace ids; older ones are handed back for removal.
struct TraceIdWindow {
    limit: usize,
    order: Mutex<VecDeque<String>>,
}

impl TraceIdWindow {
    fn admit(&self, trace_id: &str) -> Vec<String> {
        let mut order = self.order.lock();
        if order.iter().any(|t| t == trace_id) {
            return Vec::new();
        }
        order.push_back(trace_id.to_string());
        let mut evicted = Vec::new();
        while order.len() > self.limit {
            if let Some(old) = order.pop_front() {
                evicted.push(old);
            }
        }
        evicted
    }
}

/// Translates session events into instrument updates.
///
/// Every handler runs synchronously and looks its instruments up by name, so
/// an instrument that failed to register is skipped instead of failing the
/// event.
pub struct MetricsBridge {
    registry: Arc<MetricsRegistry>,
    clock: Arc<dyn WallClock>,
    trace_ids: Option<TraceIdWindow>,
    manifest_bound: AtomicBool,
}

impl MetricsBridge {
    /// Register the bridge's instruments on `registry`. Safe to call again on
    /// the same registry (e.g. after a reconnect): existing instruments are reused.
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        let bridge = Self {
            registry,
            clock: Arc::new(SystemClock),
            trace_ids: None,
            manifest_bound: AtomicBool::new(false),
        };
        bridge.register_instruments();
        bridge
    }

    /// Replace the wall clock used for drift.
    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Keep at most `limit` `trace_id` series, evicting the oldest session.
    pub fn with_trace_id_limit(mut self, limit: usize) -> Self {
        self.trace_ids =
            Some(TraceIdWindow { limit: limit.max(1), order: Mutex::new(VecDeque::new()) });
        self
    }

    fn register_instruments(&self) {
        let reg = self.registry.as_ref();

        // Counters
        register_counter(
            reg,
            names::MESSAGE_SIZE_BYTES,
            Some("The number of total bytes of message received from the Substreams backend"),
            &[],
        );
        register_counter(
            reg,
            names::ERROR,
            Some(
                "The error count we encountered when interacting with Substreams for which \
                 we had to restart the connection loop",
            ),
            &[],
        );
        register_counter(
            reg,
            names::DATA_MESSAGE,
            Some("The number of data message received"),
            &[],
        );
        register_counter(
            reg,
            names::DATA_MESSAGE_SIZE_BYTES,
            Some("The total size of in bytes of all data message received"),
            &[],
        );
        register_counter(
            reg,
            names::UNDO_MESSAGE,
            Some("The number of block undo message received"),
            &[],
        );
        register_counter(
            reg,
            names::UNKNOWN_MESSAGE,
            Some("The number of unknown message received"),
            &[],
        );
        register_counter(
            reg,
            names::PROGRESS_MESSAGE,
            Some("The number of progress message received"),
            &["module"],
        );

        // Gauges
        register_gauge(reg, names::TRACE_ID, Some("Substreams session trace id"), &["trace_id"]);
        register_gauge(reg, names::HEAD_BLOCK_NUMBER, Some("Last processed block number"), &[]);
        register_gauge(
            reg,
            names::HEAD_BLOCK_TIME_DRIFT,
            Some("Head block time drift in seconds"),
            &[],
        );
        register_gauge(reg, names::HEAD_BLOCK_TIMESTAMP, Some("Head block timestamp"), &[]);
        register_gauge(
            reg,
            names::BACKPROCESSING_COMPLETION,
            Some(
                "Determines if backprocessing is completed, which is if we receive a first \
                 data message",
            ),
            &[],
        );
        register_gauge(
            reg,
            names::PROGRESS_LAST_END_BLOCK,
            Some(
                "Latest progress reported processed range end block for each module, usually \
                 increments but due scheduling could make that fluctuates up/down",
            ),
            &["module"],
        );
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Whether the manifest info metric has been set.
    pub fn manifest_bound(&self) -> bool {
        self.manifest_bound.load(Ordering::Relaxed)
    }

    fn inc_counter(&self, name: &str, labels: &[&str], v: u64) {
        let Some(counter) = self.registry.counter(name) else { return };
        if let Err(e) = counter.inc_by(labels, v) {
            tracing::warn!(metric = %name, error = %e, "counter update skipped");
        }
    }

    fn set_gauge(&self, name: &str, labels: &[&str], v: f64) {
        let Some(gauge) = self.registry.gauge(name) else { return };
        if let Err(e) = gauge.set(labels, v) {
            tracing::warn!(metric = %name, error = %e, "gauge update skipped");
        }
    }

    /// Route one event to its handler.
    pub fn dispatch(&self, event: &BlockEvent) {
        match event {
            BlockEvent::Undo(undo) => self.on_undo(undo),
            BlockEvent::Session(session) => self.on_session(session),
            BlockEvent::Block(block) => self.on_block(block),
            BlockEvent::Progress(progress) => self.on_progress(progress),
            BlockEvent::Unknown { kind } => self.on_unknown(kind),
        }
    }

    pub fn on_undo(&self, _undo: &BlockUndoSignal) {
        self.inc_counter(names::UNDO_MESSAGE, &[], 1);
    }

    pub fn on_session(&self, session: &SessionInit) {
        tracing::info!(trace_id = %session.trace_id, "session started");
        self.set_gauge(names::TRACE_ID, &[session.trace_id.as_str()], 1.0);

        let Some(window) = &self.trace_ids else { return };
        let evicted = window.admit(&session.trace_id);
        if evicted.is_empty() {
            return;
        }
        let Some(gauge) = self.registry.gauge(names::TRACE_ID) else { return };
        for old in evicted {
            match gauge.remove(&[old.as_str()]) {
                Ok(_) => tracing::debug!(trace_id = %old, "evicted trace_id series"),
                Err(e) => tracing::warn!(
                    metric = %names::TRACE_ID,
                    error = %e,
                    "trace_id eviction skipped"
                ),
            }
        }
    }

    pub fn on_block(&self, block: &BlockScopedData) {
        self.update_block_data_metrics(block);
        if let Some(clock) = &block.clock {
            self.update_clock_metrics(clock);
        }
    }

    pub fn on_progress(&self, progress: &ModulesProgress) {
        for module in &progress.modules {
            self.inc_counter(names::PROGRESS_MESSAGE, &[module.name.as_str()], 1);
            self.set_gauge(
                names::PROGRESS_LAST_END_BLOCK,
                &[module.name.as_str()],
                module.last_end_block as f64,
            );
        }
    }

    pub fn on_unknown(&self, kind: &str) {
        tracing::warn!(kind = %kind, "unknown message received");
        self.inc_counter(names::UNKNOWN_MESSAGE, &[], 1);
    }

    /// Count a stream failure that forced the session loop to restart or
    /// dropped a message.
    pub fn record_error(&self, reason: &str) {
        tracing::warn!(reason = %reason, "substreams error");
        self.inc_counter(names::ERROR, &[], 1);
    }

    fn update_block_data_metrics(&self, block: &BlockScopedData) {
        let size = block.encoded_len() as u64;
        self.inc_counter(names::DATA_MESSAGE, &[], 1);
        self.inc_counter(names::DATA_MESSAGE_SIZE_BYTES, &[], size);
        self.inc_counter(names::MESSAGE_SIZE_BYTES, &[], size);
        self.set_gauge(names::BACKPROCESSING_COMPLETION, &[], 1.0);
    }

    fn update_clock_metrics(&self, clock: &Clock) {
        let drift = time_drift(self.clock.now_seconds(), clock.timestamp_seconds);
        self.set_gauge(names::HEAD_BLOCK_NUMBER, &[], clock.number as f64);
        self.set_gauge(names::HEAD_BLOCK_TIME_DRIFT, &[], drift as f64);
        self.set_gauge(names::HEAD_BLOCK_TIMESTAMP, &[], clock.timestamp_seconds as f64);
    }

    /// Publish the session's static configuration as the `manifest` info metric.
    pub fn handle_manifest(&self, manifest: &ManifestDescriptor) {
        tracing::info!(
            module_hash = %manifest.module_hash,
            manifest = %manifest.manifest,
            substreams_endpoint = %manifest.substreams_endpoint,
            "manifest"
        );
        register_gauge(
            &self.registry,
            names::MANIFEST,
            Some("Substreams manifest and sha256 hash of map module"),
            &ManifestDescriptor::LABEL_NAMES,
        );

        let values = manifest.label_values();
        let labels: Vec<&str> = values.iter().map(String::as_str).collect();
        self.set_gauge(names::MANIFEST, &labels, 1.0);
        self.manifest_bound.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_window_evicts_oldest_first() {
        let w = TraceIdWindow { limit: 2, order: Mutex::new(VecDeque::new()) };
        assert!(w.admit("a").is_empty());
        assert!(w.admit("b").is_empty());
        assert!(w.admit("b").is_empty());
        assert_eq!(w.admit("c"), vec!["a".to_string()]);
        assert_eq!(w.admit("d"), vec!["b".to_string()]);
    }

    #[test]
    fn bounded_trace_ids_drop_old_series() {
        let registry = Arc::new(MetricsRegistry::new());
        let bridge = MetricsBridge::new(Arc::clone(&registry)).with_trace_id_limit(1);
        for id in ["a", "b"] {
            bridge.on_session(&SessionInit { trace_id: id.into(), ..SessionInit::default() });
        }
        let gauge = registry.gauge(names::TRACE_ID).unwrap();
        assert_eq!(gauge.get(&["a"]), None);
        assert_eq!(gauge.get(&["b"]), Some(1.0));
        assert_eq!(gauge.series_count(), 1);
    }

    #[test]
    fn eviction_on_mismatched_trace_gauge_is_skipped() {
        let registry = Arc::new(MetricsRegistry::new());
        let foreign =
            register_gauge(&registry, names::TRACE_ID, None, &["trace_id", "host"]).unwrap();
        let bridge = MetricsBridge::new(Arc::clone(&registry)).with_trace_id_limit(1);
        for id in ["a", "b", "c"] {
            bridge.on_session(&SessionInit { trace_id: id.into(), ..SessionInit::default() });
        }
        assert_eq!(foreign.series_count(), 0);
        assert!(Arc::ptr_eq(&foreign, &registry.gauge(names::TRACE_ID).unwrap()));
    }

    #[test]
    fn progress_is_tracked_per_module() {
        let registry = Arc::new(MetricsRegistry::new());
        let bridge = MetricsBridge::new(Arc::clone(&registry));
        let progress = |end| ModulesProgress {
            modules: vec![sinkmeter_core::ModuleProgress {
                name: "map_events".into(),
                last_end_block: end,
            }],
        };
        bridge.on_progress(&progress(120));
        bridge.on_progress(&progress(90));

        let counter = registry.counter(names::PROGRESS_MESSAGE).unwrap();
        assert_eq!(counter.get(&["map_events"]), Some(2));
        let gauge = registry.gauge(names::PROGRESS_LAST_END_BLOCK).unwrap();
        assert_eq!(gauge.get(&["map_events"]), Some(90.0));
    }

    #[test]
    fn unknown_and_errors_have_their_own_counters() {
        let registry = Arc::new(MetricsRegistry::new());
        let bridge = MetricsBridge::new(Arc::clone(&registry));
        bridge.dispatch(&BlockEvent::Unknown { kind: "fatal".into() });
        bridge.record_error("stream reset");
        assert_eq!(registry.counter(names::UNKNOWN_MESSAGE).unwrap().get(&[]), Some(1));
        assert_eq!(registry.counter(names::ERROR).unwrap().get(&[]), Some(1));
    }
}
