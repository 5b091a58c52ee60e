// src/objects/mod.rs

//! Registry of the objects a task publishes.
//!
//! The manager owns the objects, keeps them in `startPublishing` order, binds
//! the declared checks to them, and on [`ObjectsManager::publish`] runs the
//! checks and ships every object to the repository. Failures inside
//! publication never escape: they end up as quality reasons and counters in
//! the returned [`PublishReport`].

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::activity::{Activity, ValidityInterval};
use crate::artifact::{
    CheckBinding, Histogram1D, MonitorObject, Payload, DISPLAY_HINTS_KEY, DRAW_OPTIONS_KEY,
};
use crate::checker::{CheckConfig, CheckRunner};
use crate::errors::{QcError, Result};
use crate::modules::ModuleRegistry;
use crate::quality::{Quality, Reason, ReasonKind};
use crate::repository::metadata::{self, keys, Metadata};
use crate::repository::Repository;

/// Consecutive storage failures after which an object's quality is forced
/// to Null until the next successful write.
pub const STORAGE_FAILURES_BEFORE_DEMOTION: u32 = 3;

/// Default per-object repository write timeout.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub objects_attempted: usize,
    pub objects_shipped: usize,
    /// Worst verdict over every object of this publication.
    pub aggregated_quality: Quality,
    pub storage_errors: usize,
    pub processing_errors: usize,
    pub type_mismatches: usize,
    pub quality_objects_stored: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Health {
    storage_failures: u32,
    processing_cycles: u32,
}

enum StoreOutcome {
    Stored,
    Failed(QcError),
    TimedOut,
}

pub struct ObjectsManager {
    task_name: String,
    task_class: String,
    detector_name: String,
    // publication order
    objects: Vec<MonitorObject>,
    index: HashMap<String, usize>,
    activity: Activity,
    checks: CheckRunner,
    repository: Arc<dyn Repository>,
    store_timeout: Duration,
    // applied to every object of the next publication
    pending_reasons: Vec<Reason>,
    health: HashMap<String, Health>,
}

impl ObjectsManager {
    pub fn new(repository: Arc<dyn Repository>, modules: Arc<ModuleRegistry>) -> Self {
        Self {
            task_name: String::new(),
            task_class: String::new(),
            detector_name: String::new(),
            objects: Vec::new(),
            index: HashMap::new(),
            activity: Activity::default(),
            checks: CheckRunner::new(modules),
            repository,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            pending_reasons: Vec::new(),
            health: HashMap::new(),
        }
    }

    /// Identity stamped on every object registered from now on.
    pub fn with_owner(mut self, task_name: &str, task_class: &str, detector_name: &str) -> Self {
        self.set_owner(task_name, task_class, detector_name);
        self
    }

    pub fn set_owner(&mut self, task_name: &str, task_class: &str, detector_name: &str) {
        self.task_name = task_name.to_string();
        self.task_class = task_class.to_string();
        self.detector_name = detector_name.to_string();
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn set_store_timeout(&mut self, timeout: Duration) {
        self.store_timeout = timeout;
    }

    pub fn set_repository(&mut self, repository: Arc<dyn Repository>) {
        self.repository = repository;
    }

    /// Register `payload` for publication under `name`, or under the
    /// payload's own name when `name` is `None` or empty.
    pub fn start_publishing(&mut self, payload: impl Into<Payload>, name: Option<&str>) -> Result<()> {
        let payload = payload.into();
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| payload.name())
            .to_string();
        if name.is_empty() {
            return Err(QcError::UnknownObject(
                "cannot publish an object without a name".to_string(),
            ));
        }
        if self.index.contains_key(&name) {
            return Err(QcError::DuplicateName(name));
        }

        let mut object = MonitorObject::new(
            &name,
            payload,
            &self.task_name,
            &self.task_class,
            &self.detector_name,
        );
        object.set_activity(self.activity.clone());
        for config in self.checks.declared() {
            if config.applies_to(&self.task_name, &name) {
                object.add_check(config.binding());
            }
        }
        debug!(task = %self.task_name, object = %name, checks = object.checks().len(), "start publishing");

        self.index.insert(name, self.objects.len());
        self.objects.push(object);
        Ok(())
    }

    pub fn stop_publishing(&mut self, name: &str) -> Result<()> {
        let position = self
            .index
            .remove(name)
            .ok_or_else(|| QcError::UnknownObject(name.to_string()))?;
        self.objects.remove(position);
        self.health.remove(name);
        self.rebuild_index();
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.name().to_string(), i))
            .collect();
    }

    pub fn is_being_published(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn number_published_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn get_monitor_object(&self, name: &str) -> Result<&MonitorObject> {
        self.index
            .get(name)
            .map(|&i| &self.objects[i])
            .ok_or_else(|| QcError::UnknownObject(name.to_string()))
    }

    pub fn get_monitor_object_mut(&mut self, name: &str) -> Result<&mut MonitorObject> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.objects[i]),
            None => Err(QcError::UnknownObject(name.to_string())),
        }
    }

    /// The 1D histogram published under `name`.
    pub fn histogram1d_mut(&mut self, name: &str) -> Result<&mut Histogram1D> {
        let object = self.get_monitor_object_mut(name)?;
        let class = object.class_name().to_string();
        object
            .payload_mut()
            .as_histogram1d_mut()
            .ok_or_else(|| QcError::TypeMismatch(format!("object {name} holds a {class}, not a 1D histogram")))
    }

    /// Bind a check to an object. A binding with the same check name is
    /// replaced.
    pub fn add_check(
        &mut self,
        object_name: &str,
        check_name: &str,
        class_name: &str,
        library_name: Option<&str>,
    ) -> Result<()> {
        let binding = CheckBinding::new(check_name, class_name, library_name.map(str::to_string));
        self.get_monitor_object_mut(object_name)?.add_check(binding);
        Ok(())
    }

    /// Make a configured check known, binding it to every matching object
    /// already registered and to those registered later.
    pub fn declare_check(&mut self, config: CheckConfig) {
        for object in self.objects.iter_mut() {
            if config.applies_to(&self.task_name, object.name()) {
                object.add_check(config.binding());
            }
        }
        self.checks.declare(config);
    }

    pub fn set_quality(&mut self, name: &str, quality: Quality) -> Result<()> {
        self.get_monitor_object_mut(name)?.set_quality(quality);
        Ok(())
    }

    pub fn get_quality(&self, name: &str) -> Result<Quality> {
        Ok(self.get_monitor_object(name)?.quality().clone())
    }

    /// Add metadata; an existing key keeps its value.
    pub fn add_metadata(&mut self, name: &str, key: &str, value: &str) -> Result<()> {
        self.get_monitor_object_mut(name)?.add_metadata(key, value);
        Ok(())
    }

    pub fn add_or_update_metadata(&mut self, name: &str, key: &str, value: &str) -> Result<()> {
        self.get_monitor_object_mut(name)?.add_or_update_metadata(key, value);
        Ok(())
    }

    pub fn set_default_draw_options(&mut self, name: &str, options: &str) -> Result<()> {
        self.add_or_update_metadata(name, DRAW_OPTIONS_KEY, options)
    }

    pub fn set_display_hint(&mut self, name: &str, hints: &str) -> Result<()> {
        self.add_or_update_metadata(name, DISPLAY_HINTS_KEY, hints)
    }

    /// Set the activity of the manager and of every registered object.
    pub fn set_activity(&mut self, activity: &Activity) {
        self.activity = activity.clone();
        for object in self.objects.iter_mut() {
            object.set_activity(activity.clone());
        }
        self.checks.start_of_activity(activity);
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Record a reason that every object of the next publication carries.
    pub fn note_reason(&mut self, kind: ReasonKind, text: impl Into<String>) {
        let reason = Reason::new(kind, text);
        if !self.pending_reasons.contains(&reason) {
            self.pending_reasons.push(reason);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MonitorObject> {
        self.objects.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.objects.iter().map(MonitorObject::name).collect()
    }

    pub fn check_runner(&mut self) -> &mut CheckRunner {
        &mut self.checks
    }

    /// Reset every cached checker.
    pub fn reset_checks(&mut self) {
        self.checks.reset();
    }

    /// Forget every registered object. Declared checks and checker
    /// instances are kept.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.index.clear();
        self.health.clear();
        self.pending_reasons.clear();
    }

    /// Check and ship every registered object, in registration order.
    pub fn publish(&mut self, validity: ValidityInterval, cycle: u64) -> PublishReport {
        let mut report = PublishReport::default();
        let pending = std::mem::take(&mut self.pending_reasons);

        for i in 0..self.objects.len() {
            self.objects[i].set_validity(validity);
            let name = self.objects[i].name().to_string();
            let mut health = self.health.get(&name).copied().unwrap_or_default();

            let evaluation = self.checks.evaluate(&mut self.objects, i);
            report.type_mismatches += evaluation.type_mismatches;
            report.processing_errors += evaluation.processing_errors;

            let mut quality = evaluation.quality;
            for reason in pending.iter() {
                quality.add_reason(reason.kind.clone(), reason.text.clone());
            }

            if evaluation.processing_errors > 0 || !pending.is_empty() {
                health.processing_cycles += 1;
                if health.processing_cycles >= 2 {
                    warn!(
                        task = %self.task_name,
                        object = %name,
                        cycles = health.processing_cycles,
                        "processing errors in consecutive cycles"
                    );
                }
            } else {
                health.processing_cycles = 0;
            }

            self.objects[i].set_quality(quality);

            let md = self.object_metadata(i, cycle);
            report.objects_attempted += 1;
            match self.store_with_timeout(&self.objects[i], md) {
                StoreOutcome::Stored => {
                    report.objects_shipped += 1;
                    health.storage_failures = 0;
                }
                StoreOutcome::Failed(err) => {
                    report.storage_errors += 1;
                    health.storage_failures += 1;
                    warn!(object = %name, failures = health.storage_failures, error = %err, "repository write failed");
                    let mut quality = self.objects[i].quality().clone();
                    quality.add_reason(ReasonKind::ProcessingError, format!("repository write failed: {err}"));
                    self.objects[i].set_quality(consecutive_failures_demotion(quality, health.storage_failures));
                }
                StoreOutcome::TimedOut => {
                    report.storage_errors += 1;
                    health.storage_failures += 1;
                    warn!(object = %name, timeout = ?self.store_timeout, "repository write timed out");
                    let quality = demoted(
                        self.objects[i].quality(),
                        format!("repository write timed out after {:?}", self.store_timeout),
                    );
                    self.objects[i].set_quality(consecutive_failures_demotion(quality, health.storage_failures));
                }
            }

            for qo in evaluation.quality_objects.iter() {
                match self.repository.store_quality(qo, &metadata::for_quality_object(qo)) {
                    Ok(()) => report.quality_objects_stored += 1,
                    Err(err) => {
                        report.storage_errors += 1;
                        warn!(check = %qo.check_name, object = %name, error = %err, "quality object write failed");
                    }
                }
            }

            report.aggregated_quality = report.aggregated_quality.combine(self.objects[i].quality());
            self.health.insert(name, health);
        }

        debug!(
            task = %self.task_name,
            shipped = report.objects_shipped,
            attempted = report.objects_attempted,
            quality = %report.aggregated_quality,
            "publication done"
        );
        report
    }

    fn object_metadata(&self, i: usize, cycle: u64) -> Metadata {
        let object = &self.objects[i];
        let mut md = metadata::for_monitor_object(object);
        md.insert(keys::CYCLE_NUMBER.to_string(), cycle.to_string());
        match metadata::payload_checksum(object) {
            Ok(checksum) => {
                md.insert(keys::PAYLOAD_CHECKSUM.to_string(), checksum);
            }
            Err(err) => warn!(object = %object.name(), error = %err, "cannot checksum payload"),
        }
        md
    }

    fn store_with_timeout(&self, object: &MonitorObject, md: Metadata) -> StoreOutcome {
        let repository = Arc::clone(&self.repository);
        let object = object.clone();
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("qc-store".to_string())
            .spawn(move || {
                let _ = tx.send(repository.store(&object, &md));
            });
        if let Err(err) = spawned {
            return StoreOutcome::Failed(QcError::IoError(err));
        }
        match rx.recv_timeout(self.store_timeout) {
            Ok(Ok(())) => StoreOutcome::Stored,
            Ok(Err(err)) => StoreOutcome::Failed(err),
            Err(RecvTimeoutError::Timeout) => StoreOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => StoreOutcome::Failed(QcError::StorageError(
                "repository backend exited without a result".to_string(),
            )),
        }
    }
}

/// Demote to Null once `failures` consecutive writes have failed.
fn consecutive_failures_demotion(quality: Quality, failures: u32) -> Quality {
    if failures < STORAGE_FAILURES_BEFORE_DEMOTION {
        return quality;
    }
    demoted(&quality, format!("repository writes failed {failures} consecutive times"))
}

/// Null quality keeping the reasons of `quality`, plus `text`.
fn demoted(quality: &Quality, text: String) -> Quality {
    let mut null = Quality::NULL;
    for reason in quality.reasons() {
        null.add_reason(reason.kind.clone(), reason.text.clone());
    }
    null.add_reason(ReasonKind::ProcessingError, text);
    null
}
