// src/repository/mod.rs

//! Versioned storage of published objects.
//!
//! The core talks to a [`Repository`] trait object; backends are picked by
//! name from configuration:
//!
//! - [`noop`] accepts everything and stores nothing (development).
//! - [`memory`] keeps every version in process memory (tests, `run-checker`
//!   within one process).
//! - [`file`] persists versions as JSON files under a root directory.
//!
//! Every write is keyed by `(path, validFromMs)`, so writing the same object
//! twice for the same validity start is idempotent.

pub mod file;
pub mod memory;
pub mod metadata;
pub mod noop;
pub mod paths;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::activity::ValidityInterval;
use crate::artifact::MonitorObject;
use crate::checker::QualityObject;
use crate::errors::Result;
use crate::types::BackendKind;

pub use file::FileRepository;
pub use memory::MemoryRepository;
pub use metadata::Metadata;
pub use noop::NoopRepository;

/// Connection options. Recognized keys: `host`, `database`, `username`,
/// `password`; backends may accept more.
pub type ConnectOptions = BTreeMap<String, String>;

/// Storage backend for monitor and quality objects. Implementations must be
/// safe to share between runners.
pub trait Repository: Send + Sync {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()>;

    /// Store a monitor object under [`MonitorObject::path`].
    fn store(&self, object: &MonitorObject, metadata: &Metadata) -> Result<()>;

    /// Store a quality object under [`QualityObject::path`].
    fn store_quality(&self, qo: &QualityObject, metadata: &Metadata) -> Result<()>;

    /// Latest version of `<path>/<name>`, or the version valid at `timestamp_ms`.
    fn retrieve(&self, path: &str, name: &str, timestamp_ms: Option<i64>) -> Result<Option<MonitorObject>>;

    /// Latest version of `<path>/<name>` as raw JSON.
    fn retrieve_json(&self, path: &str, name: &str) -> Result<Option<String>>;

    /// Remove every version of `<path>/<name>`.
    fn truncate(&self, path: &str, name: &str) -> Result<()>;

    /// Paths of the monitor objects published by `task_name`.
    fn list_published_objects(&self, task_name: &str) -> Result<Vec<String>>;

    /// Validity of the latest version of `path` whose metadata matches `filter`.
    fn latest_object_validity(&self, path: &str, filter: &Metadata) -> Result<Option<ValidityInterval>>;

    /// Add or override metadata on the latest version of `<path>/<name>`.
    fn update_metadata(&self, path: &str, name: &str, updates: &Metadata) -> Result<()>;
}

/// Build and connect the backend named by `kind`.
pub fn connect(kind: BackendKind, options: &ConnectOptions) -> Result<Arc<dyn Repository>> {
    let mut repository: Box<dyn Repository> = match kind {
        BackendKind::Noop => Box::new(NoopRepository),
        BackendKind::Memory => Box::new(MemoryRepository::new()),
        BackendKind::File => Box::new(FileRepository::new()),
    };
    repository.connect(options)?;
    info!(backend = ?kind, "repository connected");
    Ok(Arc::from(repository))
}

/// `<path>/<name>`, tolerating empty parts.
pub(crate) fn join(path: &str, name: &str) -> String {
    match (path.trim_end_matches('/'), name.trim_start_matches('/')) {
        ("", n) => n.to_string(),
        (p, "") => p.to_string(),
        (p, n) => format!("{p}/{n}"),
    }
}
