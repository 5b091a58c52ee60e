use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use qcflow::activity::ValidityInterval;
use qcflow::artifact::MonitorObject;
use qcflow::checker::QualityObject;
use qcflow::errors::{QcError, Result};
use qcflow::repository::{ConnectOptions, MemoryRepository, Metadata, Repository};

/// Memory repository whose monitor-object stores can be made to fail or
/// stall. Quality objects are always stored.
#[derive(Debug, Default)]
pub struct FlakyRepository {
    inner: Arc<MemoryRepository>,
    failures_left: AtomicUsize,
    fail_forever: AtomicBool,
    delay: Mutex<Duration>,
    attempts: AtomicUsize,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` monitor-object stores.
    pub fn failing_next(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Fail every monitor-object store until [`FlakyRepository::heal`].
    pub fn set_failing(&self, failing: bool) {
        self.fail_forever.store(failing, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_forever.store(false, Ordering::SeqCst);
        self.failures_left.store(0, Ordering::SeqCst);
    }

    /// Sleep this long inside every monitor-object store.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> Arc<MemoryRepository> {
        self.inner.clone()
    }
}

impl Repository for FlakyRepository {
    fn connect(&mut self, _options: &ConnectOptions) -> Result<()> {
        Ok(())
    }

    fn store(&self, object: &MonitorObject, metadata: &Metadata) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.fail_forever.load(Ordering::SeqCst) {
            return Err(QcError::StorageError("repository is down".to_string()));
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QcError::StorageError("transient write failure".to_string()));
        }
        self.inner.store(object, metadata)
    }

    fn store_quality(&self, qo: &QualityObject, metadata: &Metadata) -> Result<()> {
        self.inner.store_quality(qo, metadata)
    }

    fn retrieve(&self, path: &str, name: &str, timestamp_ms: Option<i64>) -> Result<Option<MonitorObject>> {
        self.inner.retrieve(path, name, timestamp_ms)
    }

    fn retrieve_json(&self, path: &str, name: &str) -> Result<Option<String>> {
        self.inner.retrieve_json(path, name)
    }

    fn truncate(&self, path: &str, name: &str) -> Result<()> {
        self.inner.truncate(path, name)
    }

    fn list_published_objects(&self, task_name: &str) -> Result<Vec<String>> {
        self.inner.list_published_objects(task_name)
    }

    fn latest_object_validity(&self, path: &str, filter: &Metadata) -> Result<Option<ValidityInterval>> {
        self.inner.latest_object_validity(path, filter)
    }

    fn update_metadata(&self, path: &str, name: &str, updates: &Metadata) -> Result<()> {
        self.inner.update_metadata(path, name, updates)
    }
}
