// src/task/metrics.rs

//! CPU and memory usage of the current process, read from `/proc`.
//! On other platforms every sample is 0.

use std::time::Instant;

// USER_HZ, the unit of utime/stime in /proc/<pid>/stat
const CLOCK_TICKS_PER_SECOND: f64 = 100.0;

#[derive(Debug)]
pub struct ProcessMonitor {
    last_ticks: Option<u64>,
    last_instant: Instant,
    cpu_samples: Vec<f64>,
    memory_samples: Vec<f64>,
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self {
            last_ticks: cpu_ticks(),
            last_instant: Instant::now(),
            cpu_samples: Vec::new(),
            memory_samples: Vec::new(),
        }
    }

    /// Record one CPU % (since the previous sample) and one memory % value.
    pub fn sample(&mut self) {
        let now = Instant::now();
        let ticks = cpu_ticks();
        let elapsed = now.duration_since(self.last_instant).as_secs_f64();
        let cpu = match (self.last_ticks, ticks) {
            (Some(before), Some(after)) if elapsed > 0.0 => {
                100.0 * (after.saturating_sub(before) as f64 / CLOCK_TICKS_PER_SECOND) / elapsed
            }
            _ => 0.0,
        };
        self.cpu_samples.push(cpu);
        self.memory_samples.push(memory_percent().unwrap_or(0.0));
        self.last_ticks = ticks;
        self.last_instant = now;
    }

    pub fn mean_cpu(&self) -> f64 {
        mean(&self.cpu_samples)
    }

    pub fn mean_memory(&self) -> f64 {
        mean(&self.memory_samples)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// utime + stime of this process, in clock ticks.
fn cpu_ticks() -> Option<u64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // The command name may contain spaces; fields restart after the last ')'.
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // fields[0] is field 3 (state); utime and stime are fields 14 and 15.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

fn memory_percent() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let rss = kib_field(&status, "VmRSS:")?;
    let total = kib_field(&meminfo, "MemTotal:")?;
    (total > 0.0).then(|| 100.0 * rss / total)
}

fn kib_field(text: &str, key: &str) -> Option<f64> {
    text.lines()
        .find(|l| l.starts_with(key))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}
