// src/conditions.rs

//! Read access to the conditions store for user tasks.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::activity::ValidityInterval;
use crate::errors::Result;
use crate::repository::paths::split_object_path;
use crate::repository::{Metadata, Repository};

/// A conditions object as JSON plus the validity it was stored with.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionsEntry {
    pub json: String,
    pub validity: Option<ValidityInterval>,
}

impl ConditionsEntry {
    /// `true` if the stored validity does not cover `timestamp_ms`.
    pub fn is_stale_at(&self, timestamp_ms: i64) -> bool {
        self.validity.is_some_and(|v| !v.contains(timestamp_ms))
    }
}

pub trait ConditionsClient: Send + Sync {
    /// Latest object at `path` whose metadata matches `metadata`.
    fn retrieve_json(&self, path: &str, metadata: &Metadata, timestamp_ms: Option<i64>) -> Result<Option<ConditionsEntry>>;
}

/// Deserialize a conditions object into `T`.
pub fn retrieve_typed<T: DeserializeOwned>(
    client: &dyn ConditionsClient,
    path: &str,
    metadata: &Metadata,
    timestamp_ms: Option<i64>,
) -> Result<Option<T>> {
    match client.retrieve_json(path, metadata, timestamp_ms)? {
        Some(entry) => Ok(Some(serde_json::from_str(&entry.json)?)),
        None => Ok(None),
    }
}

/// No conditions store configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConditions;

impl ConditionsClient for NoConditions {
    fn retrieve_json(&self, _path: &str, _metadata: &Metadata, _timestamp_ms: Option<i64>) -> Result<Option<ConditionsEntry>> {
        Ok(None)
    }
}

/// Conditions served by a [`Repository`] backend.
pub struct RepositoryConditions {
    repository: Arc<dyn Repository>,
}

impl RepositoryConditions {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }
}

impl ConditionsClient for RepositoryConditions {
    fn retrieve_json(&self, path: &str, metadata: &Metadata, _timestamp_ms: Option<i64>) -> Result<Option<ConditionsEntry>> {
        let Some((dir, name)) = split_object_path(path) else {
            return Ok(None);
        };
        let validity = self.repository.latest_object_validity(path, metadata)?;
        if validity.is_none() && !metadata.is_empty() {
            return Ok(None);
        }
        Ok(self
            .repository
            .retrieve_json(dir, name)?
            .map(|json| ConditionsEntry { json, validity }))
    }
}
