// src/repository/file.rs

//! Directory-tree backend.
//!
//! Layout: `<root>/<path>/<validFromMs>.json`, where each file holds the
//! metadata and the serialized object. Writes go through a temporary file
//! and a rename so readers never see half-written versions.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::activity::ValidityInterval;
use crate::artifact::MonitorObject;
use crate::checker::QualityObject;
use crate::errors::{QcError, Result};

use super::metadata::{self, keys, Metadata};
use super::{join, ConnectOptions, Repository};

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    metadata: Metadata,
    object: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct FileRepository {
    root: Option<PathBuf>,
    // serializes read-modify-write of metadata
    write_lock: Mutex<()>,
}

impl FileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository rooted at `root`, already connected.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let mut repo = Self::new();
        let mut options = ConnectOptions::new();
        options.insert("database".to_string(), root.into().to_string_lossy().into_owned());
        repo.connect(&options)?;
        Ok(repo)
    }

    fn root(&self) -> Result<&Path> {
        self.root
            .as_deref()
            .ok_or_else(|| QcError::RepositoryUnreachable("file repository is not connected".to_string()))
    }

    /// Stored versions of `path`, oldest first.
    fn versions(&self, path: &str) -> Result<Vec<(i64, PathBuf)>> {
        let dir = self.root()?.join(path);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let file = entry?.path();
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(valid_from) = file
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i64>().ok())
            else {
                continue;
            };
            versions.push((valid_from, file));
        }
        versions.sort_by_key(|(from, _)| *from);
        Ok(versions)
    }

    fn read_record(file: &Path) -> Result<StoredRecord> {
        let contents = fs::read_to_string(file)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_record(&self, path: &str, record: &StoredRecord) -> Result<()> {
        let dir = self.root()?.join(path);
        fs::create_dir_all(&dir)
            .map_err(|e| QcError::StorageError(format!("cannot create {}: {e}", dir.display())))?;
        let valid_from = metadata::valid_from(&record.metadata);
        let target = dir.join(format!("{valid_from}.json"));
        let tmp = dir.join(format!(".{valid_from}.json.tmp"));
        let body = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp, body)
            .and_then(|_| fs::rename(&tmp, &target))
            .map_err(|e| QcError::StorageError(format!("cannot write {}: {e}", target.display())))?;
        debug!(file = %target.display(), "file store");
        Ok(())
    }

    fn latest_record(&self, full: &str) -> Result<Option<(PathBuf, StoredRecord)>> {
        match self.versions(full)?.pop() {
            Some((_, file)) => {
                let record = Self::read_record(&file)?;
                Ok(Some((file, record)))
            }
            None => Ok(None),
        }
    }
}

fn verify_checksum(object: &MonitorObject, md: &Metadata) -> Result<()> {
    let Some(expected) = md.get(keys::PAYLOAD_CHECKSUM) else {
        return Ok(());
    };
    let actual = metadata::payload_checksum(object)?;
    if &actual != expected {
        return Err(QcError::StorageError(format!(
            "payload checksum mismatch for {}",
            object.path()
        )));
    }
    Ok(())
}

impl Repository for FileRepository {
    fn connect(&mut self, options: &ConnectOptions) -> Result<()> {
        let root = options
            .get("database")
            .or_else(|| options.get("host"))
            .ok_or_else(|| {
                QcError::ConfigError("file repository needs a `database` directory".to_string())
            })?;
        let root = PathBuf::from(root);
        fs::create_dir_all(&root)
            .map_err(|e| QcError::RepositoryUnreachable(format!("{}: {e}", root.display())))?;
        self.root = Some(root);
        Ok(())
    }

    fn store(&self, object: &MonitorObject, metadata: &Metadata) -> Result<()> {
        let record = StoredRecord {
            metadata: metadata.clone(),
            object: serde_json::to_value(object)?,
        };
        self.write_record(&object.path(), &record)
    }

    fn store_quality(&self, qo: &QualityObject, metadata: &Metadata) -> Result<()> {
        let record = StoredRecord {
            metadata: metadata.clone(),
            object: serde_json::to_value(qo)?,
        };
        self.write_record(&qo.path(), &record)
    }

    fn retrieve(&self, path: &str, name: &str, timestamp_ms: Option<i64>) -> Result<Option<MonitorObject>> {
        let full = join(path, name);
        let mut versions = self.versions(&full)?;
        if let Some(ts) = timestamp_ms {
            versions.retain(|(from, _)| *from <= ts);
        }
        while let Some((_, file)) = versions.pop() {
            let record = Self::read_record(&file)?;
            if let Some(ts) = timestamp_ms {
                if metadata::valid_until(&record.metadata) < ts {
                    continue;
                }
            }
            let object: MonitorObject = serde_json::from_value(record.object)?;
            verify_checksum(&object, &record.metadata)?;
            return Ok(Some(object));
        }
        Ok(None)
    }

    fn retrieve_json(&self, path: &str, name: &str) -> Result<Option<String>> {
        match self.latest_record(&join(path, name))? {
            Some((_, record)) => Ok(Some(serde_json::to_string(&record.object)?)),
            None => Ok(None),
        }
    }

    fn truncate(&self, path: &str, name: &str) -> Result<()> {
        for (_, file) in self.versions(&join(path, name))? {
            fs::remove_file(&file)?;
        }
        Ok(())
    }

    fn list_published_objects(&self, task_name: &str) -> Result<Vec<String>> {
        let root = self.root()?;
        let mut found = Vec::new();
        for provenance in subdirectories(root)? {
            for detector in subdirectories(&root.join(&provenance))? {
                let task_dir = format!("{provenance}/{detector}/MO/{task_name}");
                for object in subdirectories(&root.join(&task_dir))? {
                    let path = format!("{task_dir}/{object}");
                    if !self.versions(&path)?.is_empty() {
                        found.push(path);
                    }
                }
            }
        }
        found.sort();
        Ok(found)
    }

    fn latest_object_validity(&self, path: &str, filter: &Metadata) -> Result<Option<ValidityInterval>> {
        for (_, file) in self.versions(path)?.into_iter().rev() {
            let record = Self::read_record(&file)?;
            if metadata::matches(&record.metadata, filter) {
                return Ok(Some(ValidityInterval::new(
                    metadata::valid_from(&record.metadata),
                    metadata::valid_until(&record.metadata),
                )));
            }
        }
        Ok(None)
    }

    fn update_metadata(&self, path: &str, name: &str, updates: &Metadata) -> Result<()> {
        let full = join(path, name);
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| QcError::StorageError("file repository lock poisoned".to_string()))?;
        let (_, mut record) = self
            .latest_record(&full)?
            .ok_or_else(|| QcError::UnknownObject(full.clone()))?;
        for (key, value) in updates {
            if key == keys::VALID_FROM {
                warn!(object = %full, "ignoring update of validFromMs");
                continue;
            }
            record.metadata.insert(key.clone(), value.clone());
        }
        self.write_record(&full, &record)
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}
