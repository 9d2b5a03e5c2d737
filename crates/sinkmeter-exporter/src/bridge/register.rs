//! Registration helpers that never fail the caller.
//!
//! Session setup may run again on reconnect, so a name that is already taken
//! (or a descriptor the registry rejects) is logged and reported as `None`.
//! Update paths look instruments up by name and skip when they are missing.

use std::sync::Arc;

use crate::obs::{
    Counter, Gauge, Histogram, HistogramOpts, Metric, MetricsRegistry, MetricsResult, Summary, SummaryOpts,
};

/// Help text used when the caller supplies none.
pub const DEFAULT_HELP: &str = "help";

fn register_with<T>(
    registry: &MetricsRegistry,
    name: &str,
    build: impl FnOnce() -> MetricsResult<T>,
    wrap: fn(Arc<T>) -> Metric,
) -> Option<Arc<T>> {
    let registered = build().and_then(|m| {
        let m = Arc::new(m);
        registry.register(wrap(Arc::clone(&m))).map(|_| m)
    });
    match registered {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::error!(metric = %name, error = %e, "metric registration failed");
            None
        }
    }
}

fn help_or_default(help: Option<&str>) -> &str {
    match help {
        Some(h) if !h.is_empty() => h,
        _ => DEFAULT_HELP,
    }
}

pub fn register_counter(
    registry: &MetricsRegistry,
    name: &str,
    help: Option<&str>,
    label_names: &[&str],
) -> Option<Arc<Counter>> {
    let help = help_or_default(help);
    register_with(registry, name, || Counter::new(name, help, label_names), Metric::Counter)
}

pub fn register_gauge(
    registry: &MetricsRegistry,
    name: &str,
    help: Option<&str>,
    label_names: &[&str],
) -> Option<Arc<Gauge>> {
    let help = help_or_default(help);
    register_with(registry, name, || Gauge::new(name, help, label_names), Metric::Gauge)
}

pub fn register_summary(
    registry: &MetricsRegistry,
    name: &str,
    help: Option<&str>,
    label_names: &[&str],
    opts: SummaryOpts,
) -> Option<Arc<Summary>> {
    let help = help_or_default(help);
    register_with(registry, name, || Summary::new(name, help, label_names, opts), Metric::Summary)
}

pub fn register_histogram(
    registry: &MetricsRegistry,
    name: &str,
    help: Option<&str>,
    label_names: &[&str],
    opts: HistogramOpts,
) -> Option<Arc<Histogram>> {
    let help = help_or_default(help);
    register_with(registry, name, || Histogram::new(name, help, label_names, opts), Metric::Histogram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_registration_returns_none_and_keeps_first() {
        let reg = MetricsRegistry::new();
        let first = register_counter(&reg, "substreams_sink_undo_message", None, &[]).unwrap();
        first.inc_by(&[], 2).unwrap();

        assert!(register_counter(&reg, "substreams_sink_undo_message", Some("other"), &[]).is_none());
        assert!(register_gauge(&reg, "substreams_sink_undo_message", None, &[]).is_none());

        let looked_up = reg.counter("substreams_sink_undo_message").unwrap();
        assert!(Arc::ptr_eq(&first, &looked_up));
        assert_eq!(looked_up.get(&[]), Some(2));
        assert_eq!(looked_up.desc().help(), DEFAULT_HELP);
    }

    #[test]
    fn invalid_descriptor_returns_none() {
        let reg = MetricsRegistry::new();
        assert!(register_gauge(&reg, "", None, &[]).is_none());
        assert!(register_gauge(&reg, "dup_labels", None, &["a", "a"]).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn all_four_kinds_register() {
        let reg = MetricsRegistry::new();
        let s = register_summary(&reg, "payload_bytes", Some("Payload sizes"), &["module"], SummaryOpts::default()).unwrap();
        let h = register_histogram(&reg, "payload_bytes_hist", None, &[], HistogramOpts::default()).unwrap();
        register_counter(&reg, "c", None, &[]).unwrap();
        register_gauge(&reg, "g", None, &[]).unwrap();

        s.observe(&["map"], 10.0).unwrap();
        h.observe(&[], 0.2).unwrap();
        assert_eq!(reg.summary("payload_bytes").unwrap().get(&["map"]), Some((1, 10.0)));
        assert_eq!(reg.histogram("payload_bytes_hist").unwrap().get(&[]), Some((1, 0.2)));
        assert_eq!(reg.len(), 4);
    }
}
