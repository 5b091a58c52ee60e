// src/artifact/mod.rs

//! Monitoring objects: named payloads published by a task.
//!
//! - [`payload`] holds the payload kinds the core understands.
//! - [`class_registry`] answers "is this payload class a subtype of X".

pub mod class_registry;
pub mod payload;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ValidityInterval};
use crate::quality::Quality;
use crate::repository::paths;

pub use class_registry::{ClassRegistry, ROOT_CLASS};
pub use payload::{Histogram1D, Histogram2D, Payload};

/// Metadata key holding default draw options.
pub const DRAW_OPTIONS_KEY: &str = "drawOptions";
/// Metadata key holding display hints.
pub const DISPLAY_HINTS_KEY: &str = "displayHints";

/// Indirect reference to a checker, resolved by the check runner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckBinding {
    pub check_name: String,
    pub class_name: String,
    #[serde(default)]
    pub library_name: Option<String>,
}

impl CheckBinding {
    pub fn new(check_name: impl Into<String>, class_name: impl Into<String>, library_name: Option<String>) -> Self {
        Self {
            check_name: check_name.into(),
            class_name: class_name.into(),
            library_name,
        }
    }
}

/// A payload plus everything needed to publish it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorObject {
    name: String,
    payload: Payload,
    task_name: String,
    #[serde(default)]
    task_class: String,
    #[serde(default)]
    detector_name: String,
    #[serde(default)]
    quality: Quality,
    #[serde(default)]
    checks: Vec<CheckBinding>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    activity: Activity,
    #[serde(default)]
    validity: ValidityInterval,
}

impl MonitorObject {
    pub fn new(
        name: impl Into<String>,
        payload: Payload,
        task_name: impl Into<String>,
        task_class: impl Into<String>,
        detector_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            payload,
            task_name: task_name.into(),
            task_class: task_class.into(),
            detector_name: detector_name.into(),
            quality: Quality::NULL,
            checks: Vec::new(),
            metadata: BTreeMap::new(),
            activity: Activity::default(),
            validity: ValidityInterval::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<taskName>/<objectName>`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.task_name, self.name)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn class_name(&self) -> &str {
        self.payload.class_name()
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn task_class(&self) -> &str {
        &self.task_class
    }

    pub fn detector_name(&self) -> &str {
        &self.detector_name
    }

    pub fn quality(&self) -> &Quality {
        &self.quality
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = quality;
    }

    pub fn checks(&self) -> &[CheckBinding] {
        &self.checks
    }

    /// Bind a checker. A binding with the same check name is replaced in place.
    pub fn add_check(&mut self, binding: CheckBinding) {
        match self
            .checks
            .iter_mut()
            .find(|b| b.check_name == binding.check_name)
        {
            Some(existing) => *existing = binding,
            None => self.checks.push(binding),
        }
    }

    /// Add a metadata entry; an existing key keeps its value.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.entry(key.into()).or_insert_with(|| value.into());
    }

    pub fn add_or_update_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Update an existing entry; unknown keys are ignored.
    pub fn update_metadata(&mut self, key: &str, value: impl Into<String>) {
        if let Some(slot) = self.metadata.get_mut(key) {
            *slot = value.into();
        }
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn metadata_map(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn set_activity(&mut self, activity: Activity) {
        self.activity = activity;
    }

    pub fn validity(&self) -> ValidityInterval {
        self.validity
    }

    pub fn set_validity(&mut self, validity: ValidityInterval) {
        self.validity = validity;
    }

    /// Repository path `<provenance>/<detector>/MO/<task>/<name>`.
    pub fn path(&self) -> String {
        paths::mo_path(
            &self.activity.provenance,
            &self.detector_name,
            &self.task_name,
            &self.name,
        )
    }

    /// `true` if the payload class is `class_name` or a subtype of it.
    pub fn encapsulated_inherits_from(&self, class_name: &str, classes: &ClassRegistry) -> bool {
        classes.inherits_from(self.class_name(), class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histo_object() -> MonitorObject {
        MonitorObject::new(
            "histo",
            Histogram1D::new("histo", "h", 10, 0.0, 10.0).into(),
            "task",
            "SkeletonTask",
            "TST",
        )
    }

    #[test]
    fn binding_with_same_name_is_replaced_in_place() {
        let mut mo = histo_object();
        mo.add_check(CheckBinding::new("a", "ClassA", None));
        mo.add_check(CheckBinding::new("b", "ClassB", None));
        mo.add_check(CheckBinding::new("a", "ClassC", Some("Lib".into())));
        let classes: Vec<_> = mo.checks().iter().map(|b| b.class_name.as_str()).collect();
        assert_eq!(classes, vec!["ClassC", "ClassB"]);
    }

    #[test]
    fn path_and_full_name() {
        let mo = histo_object();
        assert_eq!(mo.path(), "qc/TST/MO/task/histo");
        assert_eq!(mo.full_name(), "task/histo");
    }

    #[test]
    fn inheritance_uses_payload_class() {
        let mo = histo_object();
        let classes = ClassRegistry::with_defaults();
        assert!(mo.encapsulated_inherits_from("TH1", &classes));
        assert!(!mo.encapsulated_inherits_from("TH2", &classes));
    }
}
