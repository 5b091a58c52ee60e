// src/checker/mod.rs

//! Check runtime.
//!
//! A [`Check`] maps one or more monitor objects to a [`Quality`] and may
//! beautify the primary object afterwards. Checks are bound to objects by
//! name through [`CheckBinding`]s and resolved to live instances by the
//! [`CheckRunner`], which also aggregates their verdicts.

pub mod quality_object;
pub mod runner;

use std::collections::BTreeMap;

use crate::activity::Activity;
use crate::artifact::{CheckBinding, MonitorObject, ROOT_CLASS};
use crate::config::{CheckSource, CheckSpec, CustomParameters};
use crate::quality::Quality;

pub use quality_object::QualityObject;
pub use runner::{CheckRunner, Evaluation};

/// Objects handed to [`Check::check`], keyed by object name.
pub type ObjectMap<'a> = BTreeMap<String, &'a MonitorObject>;

/// User-supplied checker.
///
/// Errors and panics from any method are caught by the runner and recorded
/// as a `ProcessingError` reason; they never abort an evaluation.
pub trait Check: Send {
    /// Called once, before the first evaluation.
    fn configure(&mut self, _config: &CheckConfig) -> anyhow::Result<()> {
        Ok(())
    }

    /// Verdict for the objects in `objects`. The map holds only the primary
    /// object unless [`Check::inspects_all_objects`] is `true`.
    fn check(&mut self, objects: &ObjectMap<'_>) -> anyhow::Result<Quality>;

    /// Annotate the primary object for visualization.
    fn beautify(&mut self, _object: &mut MonitorObject, _quality: &Quality) -> anyhow::Result<()> {
        Ok(())
    }

    /// Most general payload class this check can process.
    fn accepted_type(&self) -> &str {
        ROOT_CLASS
    }

    /// Whether `check` wants every object of the task, not just the primary.
    fn inspects_all_objects(&self) -> bool {
        false
    }

    fn start_of_activity(&mut self, _activity: &Activity) {}

    fn reset(&mut self) {}
}

/// Resolved configuration of one check.
#[derive(Debug, Clone, Default)]
pub struct CheckConfig {
    pub name: String,
    pub module_name: String,
    pub class_name: String,
    /// Empty means "detector of the checked object".
    pub detector_name: String,
    pub sources: Vec<CheckSource>,
    pub parameters: CustomParameters,
}

impl CheckConfig {
    pub fn new(name: impl Into<String>, module_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_name: module_name.into(),
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    pub fn from_spec(name: &str, spec: &CheckSpec, default_detector: &str) -> Self {
        Self {
            name: name.to_string(),
            module_name: spec.module_name.clone(),
            class_name: spec.class_name.clone(),
            detector_name: spec
                .detector_name
                .clone()
                .unwrap_or_else(|| default_detector.to_string()),
            sources: spec.data_source.clone(),
            parameters: spec.parameters(),
        }
    }

    pub fn with_source(mut self, task: &str, objects: &[&str]) -> Self {
        self.sources.push(CheckSource {
            task: task.to_string(),
            objects: objects.iter().map(|o| o.to_string()).collect(),
        });
        self
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.set(key, value, "default", "default");
        self
    }

    /// `true` if this check should be bound to `task_name/object_name`.
    pub fn applies_to(&self, task_name: &str, object_name: &str) -> bool {
        self.sources.iter().any(|s| s.covers(task_name, object_name))
    }

    pub fn binding(&self) -> CheckBinding {
        let library = (!self.module_name.is_empty()).then(|| self.module_name.clone());
        CheckBinding::new(&self.name, &self.class_name, library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_to_listed_objects_or_all() {
        let all = CheckConfig::new("c", "Skeleton", "FixedQuality").with_source("task", &[]);
        assert!(all.applies_to("task", "anything"));
        assert!(!all.applies_to("other", "anything"));

        let some = CheckConfig::new("c", "Skeleton", "FixedQuality").with_source("task", &["h1"]);
        assert!(some.applies_to("task", "h1"));
        assert!(!some.applies_to("task", "h2"));
    }

    #[test]
    fn binding_carries_module_as_library() {
        let binding = CheckConfig::new("c", "Skeleton", "FixedQuality").binding();
        assert_eq!(binding.library_name.as_deref(), Some("Skeleton"));
        assert_eq!(CheckConfig::new("c", "", "X").binding().library_name, None);
    }
}
