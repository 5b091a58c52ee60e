use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Repository backend selected by `[publisher].backend` or a task's
/// `publisherClassName`.
///
/// - `Noop`: accept every write, store nothing (default).
/// - `Memory`: versioned store living in the process.
/// - `File`: versioned JSON files under a root directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Noop,
    Memory,
    File,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Noop
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "noop" => Ok(BackendKind::Noop),
            "memory" => Ok(BackendKind::Memory),
            "file" => Ok(BackendKind::File),
            other => Err(format!(
                "invalid repository backend: {other} (expected \"noop\", \"memory\" or \"file\")"
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Noop => "noop",
            BackendKind::Memory => "memory",
            BackendKind::File => "file",
        };
        f.write_str(name)
    }
}

/// Kind of a `[dataSampling.<name>]` source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    /// Never yields data; cycles elapse by time only.
    Empty,
    /// Blocks read from a text file, one block per line.
    Replay,
    /// Deterministic synthetic values at a fixed rate.
    Generator,
}

impl Default for DataSourceKind {
    fn default() -> Self {
        DataSourceKind::Empty
    }
}

impl FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "empty" => Ok(DataSourceKind::Empty),
            "replay" => Ok(DataSourceKind::Replay),
            "generator" => Ok(DataSourceKind::Generator),
            other => Err(format!(
                "invalid data source kind: {other} (expected \"empty\", \"replay\" or \"generator\")"
            )),
        }
    }
}

/// What to do when a conditions read returns an object whose validity does
/// not cover the requested timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Use the object silently.
    Allow,
    /// Use the object and log a warning.
    Warn,
    /// Use the object and record a ProcessingError reason on the cycle's
    /// published objects.
    Reason,
}

impl Default for StalePolicy {
    fn default() -> Self {
        StalePolicy::Allow
    }
}

impl FromStr for StalePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(StalePolicy::Allow),
            "warn" => Ok(StalePolicy::Warn),
            "reason" => Ok(StalePolicy::Reason),
            other => Err(format!(
                "invalid conditionsStalePolicy: {other} (expected \"allow\", \"warn\" or \"reason\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("File".parse::<BackendKind>(), Ok(BackendKind::File));
        assert_eq!(" generator ".parse::<DataSourceKind>(), Ok(DataSourceKind::Generator));
        assert_eq!("REASON".parse::<StalePolicy>(), Ok(StalePolicy::Reason));
        assert!("ccdb".parse::<BackendKind>().is_err());
    }

    #[test]
    fn defaults() {
        assert_eq!(BackendKind::default(), BackendKind::Noop);
        assert_eq!(StalePolicy::default(), StalePolicy::Allow);
    }
}
