// src/repository/noop.rs

use tracing::trace;

use crate::activity::ValidityInterval;
use crate::artifact::MonitorObject;
use crate::checker::QualityObject;
use crate::errors::Result;

use super::{ConnectOptions, Metadata, Repository};

/// Backend that accepts every operation and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRepository;

impl Repository for NoopRepository {
    fn connect(&mut self, _options: &ConnectOptions) -> Result<()> {
        Ok(())
    }

    fn store(&self, object: &MonitorObject, _metadata: &Metadata) -> Result<()> {
        trace!(path = %object.path(), "noop store");
        Ok(())
    }

    fn store_quality(&self, _qo: &QualityObject, _metadata: &Metadata) -> Result<()> {
        Ok(())
    }

    fn retrieve(&self, _path: &str, _name: &str, _timestamp_ms: Option<i64>) -> Result<Option<MonitorObject>> {
        Ok(None)
    }

    fn retrieve_json(&self, _path: &str, _name: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn truncate(&self, _path: &str, _name: &str) -> Result<()> {
        Ok(())
    }

    fn list_published_objects(&self, _task_name: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn latest_object_validity(&self, _path: &str, _filter: &Metadata) -> Result<Option<ValidityInterval>> {
        Ok(None)
    }

    fn update_metadata(&self, _path: &str, _name: &str, _updates: &Metadata) -> Result<()> {
        Ok(())
    }
}
