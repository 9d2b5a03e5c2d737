//! In-process metrics registry.
//!
//! Instruments (counter, gauge, summary, histogram) are keyed by name in a
//! `DashMap`, and every instrument keeps its series in a `DashMap` keyed by the
//! label-value tuple, so updates from concurrent tasks need no outer lock.
//! Label names are fixed when an instrument is built; label values are passed
//! positionally on every update. Rendering emits the Prometheus text
//! exposition format with instruments sorted by name and series sorted by
//! label values, so output is deterministic.

use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;

/// Registry and instrument failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("metric already registered: {0}")]
    AlreadyRegistered(String),
    #[error("invalid metric name: {0:?}")]
    InvalidName(String),
    #[error("invalid label name {label:?} for metric {metric}")]
    InvalidLabel { metric: String, label: String },
    #[error("metric {metric} expects {expected} label values, got {got}")]
    LabelCountMismatch { metric: String, expected: usize, got: usize },
    #[error("invalid options for metric {metric}: {reason}")]
    InvalidOpts { metric: String, reason: String },
}

pub type MetricsResult<T> = std::result::Result<T, MetricsError>;

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".into()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".into() } else { "-Inf".into() }
    } else {
        v.to_string()
    }
}

fn valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Name, help text and label names of an instrument. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desc {
    name: String,
    help: String,
    label_names: Vec<String>,
}

impl Desc {
    /// Validate and build a descriptor. `reserved` lists label names the
    /// instrument kind uses itself (`le`, `quantile`).
    fn new(name: &str, help: &str, label_names: &[&str], reserved: &[&str]) -> MetricsResult<Self> {
        if !valid_metric_name(name) {
            return Err(MetricsError::InvalidName(name.to_string()));
        }
        let mut seen: Vec<&str> = Vec::with_capacity(label_names.len());
        for &label in label_names {
            if !valid_label_name(label) || reserved.contains(&label) || seen.contains(&label) {
                return Err(MetricsError::InvalidLabel {
                    metric: name.to_string(),
                    label: label.to_string(),
                });
            }
            seen.push(label);
        }
        Ok(Self {
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| (*l).to_string()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    fn key(&self, values: &[&str]) -> MetricsResult<Vec<String>> {
        if values.len() != self.label_names.len() {
            return Err(MetricsError::LabelCountMismatch {
                metric: self.name.clone(),
                expected: self.label_names.len(),
                got: values.len(),
            });
        }
        Ok(values.iter().map(|v| (*v).to_string()).collect())
    }

    /// `a="x",b="y"` for one series; empty when unlabeled.
    fn label_str(&self, values: &[String]) -> String {
        self.label_names
            .iter()
            .zip(values)
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn render_header(&self, kind: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {} {}", self.name, escape_help(&self.help));
        let _ = writeln!(out, "# TYPE {} {}", self.name, kind);
    }
}

fn braces(labels: &str) -> String {
    if labels.is_empty() { String::new() } else { format!("{{{}}}", labels) }
}

/// Label-value tuple -> per-series state.
struct Series<V> {
    map: DashMap<Vec<String>, V>,
}

impl<V> Series<V> {
    fn new() -> Self {
        Self { map: DashMap::new() }
    }

    /// Run `f` on the series for `values`, creating it with `init` on first use.
    fn with<R>(&self, desc: &Desc, values: &[&str], init: impl FnOnce() -> V, f: impl FnOnce(&V) -> R) -> MetricsResult<R> {
        let key = desc.key(values)?;
        if let Some(existing) = self.map.get(&key) {
            return Ok(f(existing.value()));
        }
        let entry = self.map.entry(key).or_insert_with(init);
        Ok(f(entry.value()))
    }

    fn read<R>(&self, desc: &Desc, values: &[&str], f: impl FnOnce(&V) -> R) -> Option<R> {
        let key = desc.key(values).ok()?;
        self.map.get(&key).map(|r| f(r.value()))
    }

    fn remove(&self, desc: &Desc, values: &[&str]) -> MetricsResult<bool> {
        let key = desc.key(values)?;
        Ok(self.map.remove(&key).is_some())
    }

    /// Sorted snapshot for rendering.
    fn snapshot<R>(&self, f: impl Fn(&V) -> R) -> Vec<(Vec<String>, R)> {
        let mut rows: Vec<(Vec<String>, R)> = self
            .map
            .iter()
            .map(|r| (r.key().clone(), f(r.value())))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

// --------------------
// Counter
// --------------------

/// Monotonically increasing integer counter.
pub struct Counter {
    desc: Desc,
    series: Series<AtomicU64>,
}

impl Counter {
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> MetricsResult<Self> {
        Ok(Self { desc: Desc::new(name, help, label_names, &[])?, series: Series::new() })
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    /// Increment by 1.
    pub fn inc(&self, labels: &[&str]) -> MetricsResult<()> {
        self.inc_by(labels, 1)
    }

    /// Increment by an arbitrary value.
    pub fn inc_by(&self, labels: &[&str], v: u64) -> MetricsResult<()> {
        self.series.with(&self.desc, labels, || AtomicU64::new(0), |c| {
            c.fetch_add(v, Ordering::Relaxed);
        })
    }

    /// Current value, `None` if the series was never touched.
    pub fn get(&self, labels: &[&str]) -> Option<u64> {
        self.series.read(&self.desc, labels, |c| c.load(Ordering::Relaxed))
    }

    fn render(&self, out: &mut String) {
        self.desc.render_header("counter", out);
        for (key, val) in self.series.snapshot(|c| c.load(Ordering::Relaxed)) {
            let _ = writeln!(out, "{}{} {}", self.desc.name, braces(&self.desc.label_str(&key)), val);
        }
    }
}

// --------------------
// Gauge
// --------------------

/// Settable floating point gauge (stored as `f64` bits).
pub struct Gauge {
    desc: Desc,
    series: Series<AtomicU64>,
}

impl Gauge {
    pub fn new(name: &str, help: &str, label_names: &[&str]) -> MetricsResult<Self> {
        Ok(Self { desc: Desc::new(name, help, label_names, &[])?, series: Series::new() })
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn set(&self, labels: &[&str], v: f64) -> MetricsResult<()> {
        self.series.with(&self.desc, labels, || AtomicU64::new(0f64.to_bits()), |g| {
            g.store(v.to_bits(), Ordering::Relaxed);
        })
    }

    /// Add an arbitrary signed delta.
    pub fn add(&self, labels: &[&str], delta: f64) -> MetricsResult<()> {
        self.series.with(&self.desc, labels, || AtomicU64::new(0f64.to_bits()), |g| {
            let mut cur = g.load(Ordering::Relaxed);
            loop {
                let next = (f64::from_bits(cur) + delta).to_bits();
                match g.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                    Ok(_) => break,
                    Err(actual) => cur = actual,
                }
            }
        })
    }

    pub fn inc(&self, labels: &[&str]) -> MetricsResult<()> {
        self.add(labels, 1.0)
    }

    pub fn dec(&self, labels: &[&str]) -> MetricsResult<()> {
        self.add(labels, -1.0)
    }

    pub fn get(&self, labels: &[&str]) -> Option<f64> {
        self.series.read(&self.desc, labels, |g| f64::from_bits(g.load(Ordering::Relaxed)))
    }

    /// Drop one series. Returns whether it existed.
    pub fn remove(&self, labels: &[&str]) -> MetricsResult<bool> {
        self.series.remove(&self.desc, labels)
    }

    /// Number of live series.
    pub fn series_count(&self) -> usize {
        self.series.map.len()
    }

    fn render(&self, out: &mut String) {
        self.desc.render_header("gauge", out);
        for (key, val) in self.series.snapshot(|g| f64::from_bits(g.load(Ordering::Relaxed))) {
            let _ = writeln!(out, "{}{} {}", self.desc.name, braces(&self.desc.label_str(&key)), fmt_value(val));
        }
    }
}

// --------------------
// Histogram
// --------------------

/// Standard Prometheus default buckets (seconds).
pub const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Debug, Clone)]
pub struct HistogramOpts {
    /// Upper bounds, strictly increasing. `+Inf` is implicit.
    pub buckets: Vec<f64>,
}

impl Default for HistogramOpts {
    fn default() -> Self {
        Self { buckets: DEFAULT_BUCKETS.to_vec() }
    }
}

struct HistogramState {
    /// Cumulative counts per bucket.
    buckets: Vec<u64>,
    sum: f64,
    count: u64,
}

pub struct Histogram {
    desc: Desc,
    bounds: Vec<f64>,
    series: Series<Mutex<HistogramState>>,
}

impl Histogram {
    pub fn new(name: &str, help: &str, label_names: &[&str], opts: HistogramOpts) -> MetricsResult<Self> {
        let desc = Desc::new(name, help, label_names, &["le"])?;
        let increasing = opts.buckets.windows(2).all(|w| w[0] < w[1]);
        if opts.buckets.is_empty() || !increasing || opts.buckets.iter().any(|b| b.is_nan()) {
            return Err(MetricsError::InvalidOpts {
                metric: name.to_string(),
                reason: "buckets must be non-empty and strictly increasing".into(),
            });
        }
        Ok(Self { desc, bounds: opts.buckets, series: Series::new() })
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn observe(&self, labels: &[&str], v: f64) -> MetricsResult<()> {
        let n = self.bounds.len();
        self.series.with(
            &self.desc,
            labels,
            || Mutex::new(HistogramState { buckets: vec![0; n], sum: 0.0, count: 0 }),
            |h| {
                let mut h = h.lock();
                h.count += 1;
                h.sum += v;
                // Cumulative: every bucket whose bound covers the value.
                for (i, &le) in self.bounds.iter().enumerate() {
                    if v <= le {
                        h.buckets[i] += 1;
                    }
                }
            },
        )
    }

    /// `(count, sum)` for one series.
    pub fn get(&self, labels: &[&str]) -> Option<(u64, f64)> {
        self.series.read(&self.desc, labels, |h| {
            let h = h.lock();
            (h.count, h.sum)
        })
    }

    fn render(&self, out: &mut String) {
        self.desc.render_header("histogram", out);
        let rows = self.series.snapshot(|h| {
            let h = h.lock();
            (h.buckets.clone(), h.sum, h.count)
        });
        for (key, (buckets, sum, count)) in rows {
            let labels = self.desc.label_str(&key);
            let prefix = if labels.is_empty() { String::new() } else { format!("{},", labels) };
            for (le, c) in self.bounds.iter().zip(&buckets) {
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", self.desc.name, prefix, fmt_value(*le), c);
            }
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", self.desc.name, prefix, count);
            let _ = writeln!(out, "{}_sum{} {}", self.desc.name, braces(&labels), fmt_value(sum));
            let _ = writeln!(out, "{}_count{} {}", self.desc.name, braces(&labels), count);
        }
    }
}

// --------------------
// Summary
// --------------------

#[derive(Debug, Clone)]
pub struct SummaryOpts {
    /// Quantiles to report, each in `[0, 1]`.
    pub quantiles: Vec<f64>,
    /// Most recent observations kept for quantile estimation.
    pub max_samples: usize,
}

impl Default for SummaryOpts {
    fn default() -> Self {
        Self { quantiles: vec![0.5, 0.9, 0.99], max_samples: 1024 }
    }
}

struct SummaryState {
    window: VecDeque<f64>,
    sum: f64,
    count: u64,
}

impl SummaryState {
    /// Nearest-rank quantile over the current window.
    fn quantile(&self, q: f64) -> f64 {
        if self.window.is_empty() {
            return f64::NAN;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = (q * sorted.len() as f64).ceil() as usize;
        sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
    }
}

pub struct Summary {
    desc: Desc,
    opts: SummaryOpts,
    series: Series<Mutex<SummaryState>>,
}

impl Summary {
    pub fn new(name: &str, help: &str, label_names: &[&str], opts: SummaryOpts) -> MetricsResult<Self> {
        let desc = Desc::new(name, help, label_names, &["quantile"])?;
        if opts.max_samples == 0 || opts.quantiles.iter().any(|q| !(0.0..=1.0).contains(q)) {
            return Err(MetricsError::InvalidOpts {
                metric: name.to_string(),
                reason: "quantiles must lie in [0, 1] and max_samples must be positive".into(),
            });
        }
        Ok(Self { desc, opts, series: Series::new() })
    }

    pub fn desc(&self) -> &Desc {
        &self.desc
    }

    pub fn observe(&self, labels: &[&str], v: f64) -> MetricsResult<()> {
        let cap = self.opts.max_samples;
        self.series.with(
            &self.desc,
            labels,
            || Mutex::new(SummaryState { window: VecDeque::with_capacity(cap.min(1024)), sum: 0.0, count: 0 }),
            |s| {
                let mut s = s.lock();
                s.count += 1;
                s.sum += v;
                if s.window.len() == cap {
                    s.window.pop_front();
                }
                s.window.push_back(v);
            },
        )
    }

    /// `(count, sum)` for one series.
    pub fn get(&self, labels: &[&str]) -> Option<(u64, f64)> {
        self.series.read(&self.desc, labels, |s| {
            let s = s.lock();
            (s.count, s.sum)
        })
    }

    /// Current estimate of quantile `q` for one series.
    pub fn quantile(&self, labels: &[&str], q: f64) -> Option<f64> {
        self.series.read(&self.desc, labels, |s| s.lock().quantile(q))
    }

    fn render(&self, out: &mut String) {
        self.desc.render_header("summary", out);
        let quantiles = &self.opts.quantiles;
        let rows = self.series.snapshot(|s| {
            let s = s.lock();
            let qs: Vec<f64> = quantiles.iter().map(|q| s.quantile(*q)).collect();
            (qs, s.sum, s.count)
        });
        for (key, (qs, sum, count)) in rows {
            let labels = self.desc.label_str(&key);
            let prefix = if labels.is_empty() { String::new() } else { format!("{},", labels) };
            for (q, v) in quantiles.iter().zip(qs) {
                let _ = writeln!(out, "{}{{{}quantile=\"{}\"}} {}", self.desc.name, prefix, q, fmt_value(v));
            }
            let _ = writeln!(out, "{}_sum{} {}", self.desc.name, braces(&labels), fmt_value(sum));
            let _ = writeln!(out, "{}_count{} {}", self.desc.name, braces(&labels), count);
        }
    }
}

// --------------------
// Registry
// --------------------

/// A registered instrument.
#[derive(Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Summary(Arc<Summary>),
    Histogram(Arc<Histogram>),
}

impl Metric {
    pub fn desc(&self) -> &Desc {
        match self {
            Metric::Counter(m) => m.desc(),
            Metric::Gauge(m) => m.desc(),
            Metric::Summary(m) => m.desc(),
            Metric::Histogram(m) => m.desc(),
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Metric::Counter(m) => m.render(out),
            Metric::Gauge(m) => m.render(out),
            Metric::Summary(m) => m.render(out),
            Metric::Histogram(m) => m.render(out),
        }
    }
}

/// Name -> instrument. Shared by `Arc` for the lifetime of the process.
#[derive(Default)]
pub struct MetricsRegistry {
    metrics: DashMap<String, Metric>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self { metrics: DashMap::new() }
    }

    /// Insert an instrument. A taken name is rejected and the existing
    /// instrument is left untouched.
    pub fn register(&self, metric: Metric) -> MetricsResult<Metric> {
        let name = metric.desc().name().to_string();
        match self.metrics.entry(name) {
            Entry::Occupied(e) => Err(MetricsError::AlreadyRegistered(e.key().clone())),
            Entry::Vacant(e) => {
                e.insert(metric.clone());
                Ok(metric)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.get(name).map(|r| r.value().clone())
    }

    pub fn counter(&self, name: &str) -> Option<Arc<Counter>> {
        match self.get(name)? {
            Metric::Counter(c) => Some(c),
            _ => None,
        }
    }

    pub fn gauge(&self, name: &str) -> Option<Arc<Gauge>> {
        match self.get(name)? {
            Metric::Gauge(g) => Some(g),
            _ => None,
        }
    }

    pub fn summary(&self, name: &str) -> Option<Arc<Summary>> {
        match self.get(name)? {
            Metric::Summary(s) => Some(s),
            _ => None,
        }
    }

    pub fn histogram(&self, name: &str) -> Option<Arc<Histogram>> {
        match self.get(name)? {
            Metric::Histogram(h) => Some(h),
            _ => None,
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Render all instruments in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut metrics: Vec<Metric> = self.metrics.iter().map(|r| r.value().clone()).collect();
        metrics.sort_by(|a, b| a.desc().name().cmp(b.desc().name()));

        let mut out = String::new();
        for m in &metrics {
            m.render(&mut out);
        }
        out
    }
}
