#![allow(dead_code)]

use qcflow::config::{CheckSource, CheckSpec, ConfigFile, DataSourceSpec, RawConfigFile, TaskSpec};
use qcflow::types::{BackendKind, DataSourceKind};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskSpec) -> Self {
        self.config.tasks.insert(name.to_string(), task);
        self
    }

    pub fn with_check(mut self, name: &str, check: CheckSpec) -> Self {
        self.config.checks.insert(name.to_string(), check);
        self
    }

    pub fn with_data_source(mut self, name: &str, source: DataSourceSpec) -> Self {
        self.config.data_sampling.insert(name.to_string(), source);
        self
    }

    pub fn with_class(mut self, child: &str, parent: &str) -> Self {
        self.config.classes.insert(child.to_string(), parent.to_string());
        self
    }

    pub fn with_detector(mut self, detector: &str) -> Self {
        self.config.common.detector = detector.to_string();
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.config.publisher.backend = backend;
        self
    }

    pub fn with_publisher_option(mut self, key: &str, value: &str) -> Self {
        self.config.publisher.options.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_activity_id(mut self, id: i64) -> Self {
        self.config.activity.id = id;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskSpec`.
pub struct TaskSpecBuilder {
    task: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(module: &str, class: &str) -> Self {
        Self {
            task: TaskSpec::new(module, class),
        }
    }

    pub fn skeleton() -> Self {
        Self::new("Skeleton", "SkeletonTask")
    }

    pub fn cycle_seconds(mut self, seconds: i64) -> Self {
        self.task.cycle_duration_seconds = seconds;
        self
    }

    pub fn max_cycles(mut self, n: u64) -> Self {
        self.task.max_cycles = Some(n);
        self
    }

    pub fn reset_after_cycles(mut self, n: u64) -> Self {
        self.task.reset_after_cycles = Some(n);
        self
    }

    pub fn detector(mut self, detector: &str) -> Self {
        self.task.detector_name = Some(detector.to_string());
        self
    }

    pub fn data_source(mut self, name: &str) -> Self {
        self.task.data_source = Some(name.to_string());
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.task.publisher_class_name = Some(backend);
        self
    }

    pub fn parameter(mut self, key: &str, value: &str) -> Self {
        self.task.custom_parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn extended_parameter(mut self, run_type: &str, beam_type: &str, key: &str, value: &str) -> Self {
        self.task
            .extended_parameters
            .entry(run_type.to_string())
            .or_default()
            .entry(beam_type.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.task.active = false;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}

/// Builder for `CheckSpec`.
pub struct CheckSpecBuilder {
    check: CheckSpec,
}

impl CheckSpecBuilder {
    pub fn new(module: &str, class: &str) -> Self {
        Self {
            check: CheckSpec::new(module, class),
        }
    }

    pub fn source(mut self, task: &str, objects: &[&str]) -> Self {
        self.check.data_source.push(CheckSource {
            task: task.to_string(),
            objects: objects.iter().map(|o| o.to_string()).collect(),
        });
        self
    }

    pub fn parameter(mut self, key: &str, value: &str) -> Self {
        self.check.custom_parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn detector(mut self, detector: &str) -> Self {
        self.check.detector_name = Some(detector.to_string());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.check.active = false;
        self
    }

    pub fn build(self) -> CheckSpec {
        self.check
    }
}

/// A deterministic generator source description.
pub fn generator_source(rate_per_second: f64, seed: u64) -> DataSourceSpec {
    DataSourceSpec {
        kind: DataSourceKind::Generator,
        rate_per_second,
        seed,
        ..DataSourceSpec::default()
    }
}
