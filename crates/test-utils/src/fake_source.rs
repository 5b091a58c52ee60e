use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::bail;
use qcflow::sampling::{Batch, DataBlock, DataSource};

/// Batch holding one block with `values`.
pub fn values_batch(values: &[f64]) -> Batch {
    Batch::single(DataBlock::from_values(values))
}

/// Data source replaying a fixed list of batches, then idling.
///
/// Each batch is handed out after `spacing`, so a cycle sees a predictable
/// number of them.
pub struct ScriptedSource {
    batches: VecDeque<Batch>,
    spacing: Duration,
    errors_left: usize,
    released: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self {
            batches: batches.into(),
            spacing: Duration::ZERO,
            errors_left: 0,
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    /// Fail the first `n` polls.
    pub fn with_errors(mut self, n: usize) -> Self {
        self.errors_left = n;
        self
    }

    /// Counter of batches given back through `release`.
    pub fn released(&self) -> Arc<AtomicUsize> {
        self.released.clone()
    }
}

impl DataSource for ScriptedSource {
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Batch>> {
        if self.errors_left > 0 {
            self.errors_left -= 1;
            bail!("scripted source failure");
        }
        if self.batches.is_empty() {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        if self.spacing > timeout {
            std::thread::sleep(timeout);
            return Ok(None);
        }
        std::thread::sleep(self.spacing);
        Ok(self.batches.pop_front())
    }

    fn release(&mut self, _batch: Batch) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}
