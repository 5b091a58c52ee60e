// src/repository/memory.rs

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::activity::ValidityInterval;
use crate::artifact::MonitorObject;
use crate::checker::QualityObject;
use crate::errors::{QcError, Result};

use super::metadata::{self, Metadata};
use super::{join, paths, ConnectOptions, Repository};

#[derive(Debug, Clone)]
struct Version {
    json: String,
    metadata: Metadata,
}

/// path -> validFromMs -> version
type Store = BTreeMap<String, BTreeMap<i64, Version>>;

/// In-process versioned store.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    objects: Mutex<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Store>> {
        self.objects
            .lock()
            .map_err(|_| QcError::StorageError("memory repository lock poisoned".to_string()))
    }

    fn write(&self, path: String, json: String, metadata: &Metadata) -> Result<()> {
        let valid_from = metadata::valid_from(metadata);
        debug!(%path, valid_from, "memory store");
        self.lock()?.entry(path).or_default().insert(
            valid_from,
            Version {
                json,
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    /// Number of stored versions of `path`.
    pub fn versions(&self, path: &str) -> usize {
        self.lock().map(|s| s.get(path).map_or(0, BTreeMap::len)).unwrap_or(0)
    }

    /// Every path holding at least one version.
    pub fn stored_paths(&self) -> Vec<String> {
        self.lock().map(|s| s.keys().cloned().collect()).unwrap_or_default()
    }

    /// Metadata of the latest version of `path`.
    pub fn latest_metadata(&self, path: &str) -> Option<Metadata> {
        let store = self.lock().ok()?;
        let (_, version) = store.get(path)?.last_key_value()?;
        Some(version.metadata.clone())
    }

    /// Latest stored quality object at `path`.
    pub fn latest_quality_object(&self, path: &str) -> Result<Option<QualityObject>> {
        let store = self.lock()?;
        match store.get(path).and_then(|v| v.last_key_value()) {
            Some((_, version)) => Ok(Some(serde_json::from_str(&version.json)?)),
            None => Ok(None),
        }
    }
}

impl Repository for MemoryRepository {
    fn connect(&mut self, _options: &ConnectOptions) -> Result<()> {
        Ok(())
    }

    fn store(&self, object: &MonitorObject, metadata: &Metadata) -> Result<()> {
        let json = serde_json::to_string(object)?;
        self.write(object.path(), json, metadata)
    }

    fn store_quality(&self, qo: &QualityObject, metadata: &Metadata) -> Result<()> {
        let json = serde_json::to_string(qo)?;
        self.write(qo.path(), json, metadata)
    }

    fn retrieve(&self, path: &str, name: &str, timestamp_ms: Option<i64>) -> Result<Option<MonitorObject>> {
        let full = join(path, name);
        let store = self.lock()?;
        let Some(versions) = store.get(&full) else {
            return Ok(None);
        };
        let found = match timestamp_ms {
            None => versions.last_key_value().map(|(_, v)| v),
            Some(ts) => versions
                .range(..=ts)
                .rev()
                .map(|(_, v)| v)
                .find(|v| metadata::valid_until(&v.metadata) >= ts),
        };
        match found {
            Some(version) => Ok(Some(serde_json::from_str(&version.json)?)),
            None => Ok(None),
        }
    }

    fn retrieve_json(&self, path: &str, name: &str) -> Result<Option<String>> {
        let full = join(path, name);
        Ok(self
            .lock()?
            .get(&full)
            .and_then(|v| v.last_key_value())
            .map(|(_, v)| v.json.clone()))
    }

    fn truncate(&self, path: &str, name: &str) -> Result<()> {
        self.lock()?.remove(&join(path, name));
        Ok(())
    }

    fn list_published_objects(&self, task_name: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|p| paths::owning_task(p) == Some(task_name))
            .cloned()
            .collect())
    }

    fn latest_object_validity(&self, path: &str, filter: &Metadata) -> Result<Option<ValidityInterval>> {
        let store = self.lock()?;
        Ok(store.get(path).and_then(|versions| {
            versions
                .values()
                .rev()
                .find(|v| metadata::matches(&v.metadata, filter))
                .map(|v| {
                    ValidityInterval::new(metadata::valid_from(&v.metadata), metadata::valid_until(&v.metadata))
                })
        }))
    }

    fn update_metadata(&self, path: &str, name: &str, updates: &Metadata) -> Result<()> {
        let full = join(path, name);
        let mut store = self.lock()?;
        let version = store
            .get_mut(&full)
            .and_then(|v| v.values_mut().next_back())
            .ok_or_else(|| QcError::UnknownObject(full.clone()))?;
        version
            .metadata
            .extend(updates.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}
