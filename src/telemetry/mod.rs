// src/telemetry/mod.rs

//! Telemetry sinks. The runtime pushes raw `(value, name)` samples; the
//! sink decides what to do with them.

use std::sync::Mutex;

use tracing::info;

pub mod names {
    pub const BATCHES_IN_CYCLE: &str = "qc_batches_in_cycle";
    pub const DURATION_CYCLE: &str = "qc_duration_cycle_seconds";
    pub const DURATION_PUBLICATION: &str = "qc_duration_publication_seconds";
    pub const OBJECTS_PUBLISHED_IN_CYCLE: &str = "qc_objects_published_in_cycle";
    pub const OBJECTS_PUBLISHED_PER_SECOND: &str = "qc_objects_published_per_second";
    pub const OBJECTS_PUBLISHED_WHOLE_RUN: &str = "qc_objects_published_whole_run";
    pub const DURATION_WHOLE_RUN: &str = "qc_duration_activity_whole_run_seconds";
    pub const OBJECTS_PER_SECOND_WHOLE_RUN: &str = "qc_objects_published_per_second_whole_run";
    pub const CPU_MEAN: &str = "qc_cpu_percent_mean";
    pub const MEMORY_MEAN: &str = "qc_memory_percent_mean";

    /// Per-kind error counter name, e.g. `qc_errors_storage`.
    pub fn errors(kind: &str) -> String {
        format!("qc_errors_{kind}")
    }
}

pub trait TelemetrySink: Send + Sync {
    fn send(&self, value: f64, name: &str);
}

/// Logs every sample at `info` under the `qcflow::telemetry` target.
#[derive(Debug, Default)]
pub struct LogSink {
    source: String,
}

impl LogSink {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into() }
    }
}

impl TelemetrySink for LogSink {
    fn send(&self, value: f64, name: &str) {
        info!(target: "qcflow::telemetry", source = %self.source, metric = name, value, "metric");
    }
}

/// Drops every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn send(&self, _value: f64, _name: &str) {}
}

/// Keeps every sample in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    samples: Mutex<Vec<(String, f64)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<(String, f64)> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Every value sent under `name`, in order.
    pub fn values(&self, name: &str) -> Vec<f64> {
        self.samples
            .lock()
            .map(|s| s.iter().filter(|(n, _)| n == name).map(|(_, v)| *v).collect())
            .unwrap_or_default()
    }

    pub fn last(&self, name: &str) -> Option<f64> {
        self.values(name).last().copied()
    }

    /// Sum of every value sent under `name`.
    pub fn total(&self, name: &str) -> f64 {
        self.values(name).iter().sum()
    }
}

impl TelemetrySink for RecordingSink {
    fn send(&self, value: f64, name: &str) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push((name.to_string(), value));
        }
    }
}
