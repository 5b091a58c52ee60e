// src/sampling/replay.rs

use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::errors::{QcError, Result};

use super::{Batch, DataBlock, DataSource};

/// Replays blocks from a text file: one block per non-empty line, values
/// separated by whitespace or commas. Lines starting with `#` are skipped.
pub struct ReplaySource {
    blocks: Vec<DataBlock>,
    position: usize,
    blocks_per_batch: usize,
    repeat: bool,
}

impl ReplaySource {
    pub fn open(path: &Path, blocks_per_batch: usize, repeat: bool) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| QcError::ConfigError(format!("cannot read replay file {}: {e}", path.display())))?;
        let blocks = parse_blocks(&contents).map_err(|e| {
            QcError::ConfigError(format!("replay file {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), blocks = blocks.len(), "replay source opened");
        Ok(Self::from_blocks(blocks, blocks_per_batch, repeat))
    }

    pub fn from_blocks(blocks: Vec<DataBlock>, blocks_per_batch: usize, repeat: bool) -> Self {
        Self {
            blocks,
            position: 0,
            blocks_per_batch: blocks_per_batch.max(1),
            repeat,
        }
    }
}

fn parse_blocks(contents: &str) -> std::result::Result<Vec<DataBlock>, String> {
    let mut blocks = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<f64>().map_err(|e| format!("line {}: `{t}`: {e}", number + 1)))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        blocks.push(DataBlock::from_values(&values));
    }
    Ok(blocks)
}

impl DataSource for ReplaySource {
    fn poll(&mut self, timeout: Duration) -> anyhow::Result<Option<Batch>> {
        if self.position >= self.blocks.len() {
            if self.repeat && !self.blocks.is_empty() {
                self.position = 0;
            } else {
                std::thread::sleep(timeout);
                return Ok(None);
            }
        }
        let end = (self.position + self.blocks_per_batch).min(self.blocks.len());
        let batch = Batch::new(self.blocks[self.position..end].to_vec());
        self.position = end;
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_into_blocks() {
        let blocks = parse_blocks("# header\n1 2 3\n\n4,5\n").unwrap_or_default();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].values(), vec![4.0, 5.0]);
        assert!(parse_blocks("1 x").is_err());
    }

    #[test]
    fn batches_then_idles() -> anyhow::Result<()> {
        let blocks = vec![
            DataBlock::from_values(&[1.0]),
            DataBlock::from_values(&[2.0]),
            DataBlock::from_values(&[3.0]),
        ];
        let mut source = ReplaySource::from_blocks(blocks, 2, false);
        assert_eq!(source.poll(Duration::ZERO)?.map(|b| b.len()), Some(2));
        assert_eq!(source.poll(Duration::ZERO)?.map(|b| b.len()), Some(1));
        assert!(source.poll(Duration::ZERO)?.is_none());
        Ok(())
    }
}
