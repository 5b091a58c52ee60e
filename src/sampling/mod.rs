// src/sampling/mod.rs

//! Data sources feeding the task runtime.
//!
//! A source is polled with a bounded wait and yields ordered [`Batch`]es of
//! opaque [`DataBlock`]s. Batches are handed back through
//! [`DataSource::release`] once user code is done with them.

mod generator;
mod replay;

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DataSourceSpec;
use crate::errors::{QcError, Result};
use crate::types::DataSourceKind;

pub use generator::GeneratorSource;
pub use replay::ReplaySource;

/// One block of data: routing header plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    pub origin: String,
    pub description: String,
    pub payload: Vec<u8>,
}

impl DataBlock {
    pub fn new(origin: impl Into<String>, description: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            origin: origin.into(),
            description: description.into(),
            payload,
        }
    }

    /// Block whose payload is `values` as little-endian `f64`s.
    pub fn from_values(values: &[f64]) -> Self {
        let payload = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new("TST", "VALUES", payload)
    }

    /// Payload decoded as little-endian `f64`s; trailing bytes are ignored.
    pub fn values(&self) -> Vec<f64> {
        self.payload
            .chunks_exact(8)
            .map(|chunk| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(chunk);
                f64::from_le_bytes(bytes)
            })
            .collect()
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Ordered sequence of blocks delivered to one `monitorData` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    blocks: Vec<DataBlock>,
}

impl Batch {
    pub fn new(blocks: Vec<DataBlock>) -> Self {
        Self { blocks }
    }

    pub fn single(block: DataBlock) -> Self {
        Self { blocks: vec![block] }
    }

    pub fn blocks(&self) -> &[DataBlock] {
        &self.blocks
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataBlock> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

pub trait DataSource: Send {
    /// Wait at most `timeout` for the next batch.
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Batch>>;

    /// Give a batch back once user code has returned.
    fn release(&mut self, _batch: Batch) {}
}

/// Source that never yields anything.
#[derive(Debug, Default)]
pub struct EmptySource;

impl DataSource for EmptySource {
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Batch>> {
        std::thread::sleep(timeout);
        Ok(None)
    }
}

/// Source fed from another thread through a [`ChannelFeeder`].
pub struct ChannelSource {
    rx: Receiver<Batch>,
}

/// Sending half of a [`ChannelSource`].
#[derive(Clone)]
pub struct ChannelFeeder {
    tx: Sender<Batch>,
}

impl ChannelFeeder {
    /// `false` once the source has been dropped.
    pub fn send(&self, batch: Batch) -> bool {
        self.tx.send(batch).is_ok()
    }
}

pub fn channel() -> (ChannelFeeder, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (ChannelFeeder { tx }, ChannelSource { rx })
}

impl DataSource for ChannelSource {
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Batch>> {
        match self.rx.recv_timeout(timeout) {
            Ok(batch) => Ok(Some(batch)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // All feeders gone: behave like an idle source.
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

/// Build the source described by a `[dataSampling.<name>]` entry.
pub fn build_source(name: &str, spec: &DataSourceSpec) -> Result<Box<dyn DataSource>> {
    match spec.kind {
        DataSourceKind::Empty => Ok(Box::new(EmptySource)),
        DataSourceKind::Generator => Ok(Box::new(GeneratorSource::from_spec(spec))),
        DataSourceKind::Replay => {
            let path = spec.path.as_ref().ok_or_else(|| {
                QcError::ConfigError(format!("data source '{name}': a replay source needs a `path`"))
            })?;
            Ok(Box::new(ReplaySource::open(path, spec.blocks_per_batch, spec.repeat)?))
        }
    }
}
