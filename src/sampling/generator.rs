// src/sampling/generator.rs

use std::time::{Duration, Instant};

use crate::config::DataSourceSpec;

use super::{Batch, DataBlock, DataSource};

/// Longest gap between two batches, whatever the configured rate.
const MAX_PERIOD: Duration = Duration::from_secs(3600);

/// Deterministic synthetic data at a fixed batch rate.
///
/// Values are uniform in `[min, max)`, drawn from a xorshift sequence seeded
/// by `seed`, so two generators with the same settings yield the same data.
pub struct GeneratorSource {
    period: Duration,
    next_emit: Instant,
    blocks_per_batch: usize,
    values_per_block: usize,
    min: f64,
    max: f64,
    state: u64,
}

impl GeneratorSource {
    pub fn new(rate_per_second: f64, min: f64, max: f64, seed: u64) -> Self {
        let rate = if rate_per_second > 0.0 { rate_per_second } else { 1.0 };
        Self {
            period: Duration::try_from_secs_f64(1.0 / rate).map_or(MAX_PERIOD, |p| p.min(MAX_PERIOD)),
            next_emit: Instant::now(),
            blocks_per_batch: 1,
            values_per_block: 100,
            min,
            max,
            // xorshift must not start at zero
            state: (seed ^ 0x9E37_79B9_7F4A_7C15).max(1),
        }
    }

    pub fn from_spec(spec: &DataSourceSpec) -> Self {
        let mut source = Self::new(spec.rate_per_second, spec.min, spec.max, spec.seed);
        source.blocks_per_batch = spec.blocks_per_batch.max(1);
        source.values_per_block = spec.values_per_block;
        source
    }

    fn next_unit(&mut self) -> f64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }

    fn next_batch(&mut self) -> Batch {
        let span = self.max - self.min;
        let blocks = (0..self.blocks_per_batch)
            .map(|_| {
                let values: Vec<f64> = (0..self.values_per_block)
                    .map(|_| self.min + span * self.next_unit())
                    .collect();
                DataBlock::from_values(&values)
            })
            .collect();
        Batch::new(blocks)
    }
}

impl DataSource for GeneratorSource {
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Batch>> {
        let now = Instant::now();
        let wait = self.next_emit.saturating_duration_since(now);
        if wait > timeout {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        std::thread::sleep(wait);
        let base = self.next_emit.max(now);
        self.next_emit = base.checked_add(self.period).unwrap_or(base);
        Ok(Some(self.next_batch()))
    }
}
