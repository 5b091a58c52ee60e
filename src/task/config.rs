// src/task/config.rs

use std::time::Duration;

use crate::checker::CheckConfig;
use crate::config::validate::is_identifier;
use crate::config::{ConfigFile, CustomParameters, DataSourceSpec};
use crate::errors::{QcError, Result};
use crate::objects::DEFAULT_STORE_TIMEOUT;
use crate::types::{BackendKind, StalePolicy};

/// Everything a task runner needs, resolved from the configuration file.
#[derive(Debug, Clone)]
pub struct TaskRunnerConfig {
    pub task_name: String,
    pub module_name: String,
    pub class_name: String,
    pub detector_name: String,
    pub cycle_duration: Duration,
    pub max_cycles: Option<u64>,
    pub reset_after_cycles: Option<u64>,
    /// Upper bound of one data-source poll.
    pub poll_timeout: Duration,
    pub backend: BackendKind,
    pub data_source: Option<DataSourceSpec>,
    pub parameters: CustomParameters,
    pub ccdb_url: Option<String>,
    pub stale_policy: StalePolicy,
    pub store_timeout: Duration,
    pub checks: Vec<CheckConfig>,
}

impl TaskRunnerConfig {
    pub fn new(task_name: &str, module_name: &str, class_name: &str) -> Self {
        Self {
            task_name: task_name.to_string(),
            module_name: module_name.to_string(),
            class_name: class_name.to_string(),
            detector_name: "MISC".to_string(),
            cycle_duration: Duration::from_secs(10),
            max_cycles: None,
            reset_after_cycles: None,
            poll_timeout: Duration::from_millis(100),
            backend: BackendKind::default(),
            data_source: None,
            parameters: CustomParameters::new(),
            ccdb_url: None,
            stale_policy: StalePolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            checks: Vec::new(),
        }
    }

    /// Resolve `[tasks.<task_name>]` against the rest of the file.
    pub fn extract(task_name: &str, config: &ConfigFile) -> Result<Self> {
        if task_name.is_empty() {
            return Err(QcError::ConfigError("task name is empty".to_string()));
        }
        let spec = config.tasks.get(task_name).ok_or_else(|| {
            QcError::ConfigError(format!("no [tasks.{task_name}] section in configuration"))
        })?;
        if spec.cycle_duration_seconds <= 0 {
            return Err(QcError::ConfigError(format!(
                "task '{task_name}': cycleDurationSeconds must be > 0 (got {})",
                spec.cycle_duration_seconds
            )));
        }

        let detector_name = spec
            .detector_name
            .clone()
            .unwrap_or_else(|| config.common.detector.clone());
        let checks = config
            .checks_for_task(task_name)
            .map(|(name, check)| CheckConfig::from_spec(name, check, &detector_name))
            .collect();
        let data_source = match &spec.data_source {
            Some(name) => Some(config.data_sampling.get(name).cloned().ok_or_else(|| {
                QcError::ConfigError(format!("task '{task_name}' uses unknown data source '{name}'"))
            })?),
            None => None,
        };

        Ok(Self {
            task_name: task_name.to_string(),
            module_name: spec.module_name.clone(),
            class_name: spec.class_name.clone(),
            detector_name,
            cycle_duration: Duration::from_secs(spec.cycle_duration_seconds as u64),
            max_cycles: spec.max_cycles,
            reset_after_cycles: spec.reset_after_cycles,
            poll_timeout: Duration::from_millis(spec.poll_timeout_ms),
            backend: spec.publisher_class_name.unwrap_or(config.publisher.backend),
            data_source,
            parameters: spec.parameters(),
            ccdb_url: spec.ccdb_url.clone().or_else(|| config.common.ccdb_url.clone()),
            stale_policy: spec
                .conditions_stale_policy
                .unwrap_or(config.common.conditions_stale_policy),
            store_timeout: Duration::from_secs(config.common.repository_timeout_seconds),
            checks,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.task_name) {
            return Err(QcError::ConfigError(format!(
                "invalid task name '{}'",
                self.task_name
            )));
        }
        if self.class_name.is_empty() {
            return Err(QcError::ConfigError(format!(
                "task '{}' has no className",
                self.task_name
            )));
        }
        if self.cycle_duration.is_zero() {
            return Err(QcError::ConfigError(format!(
                "task '{}': cycle duration must be > 0",
                self.task_name
            )));
        }
        if self.max_cycles == Some(0) || self.reset_after_cycles == Some(0) {
            return Err(QcError::ConfigError(format!(
                "task '{}': maxCycles and resetAfterCycles must be > 0 when set",
                self.task_name
            )));
        }
        if self.poll_timeout.is_zero() || self.store_timeout.is_zero() {
            return Err(QcError::ConfigError(format!(
                "task '{}': timeouts must be > 0",
                self.task_name
            )));
        }
        Ok(())
    }

    pub fn with_detector(mut self, detector: &str) -> Self {
        self.detector_name = detector.to_string();
        self
    }

    pub fn with_cycle_duration(mut self, duration: Duration) -> Self {
        self.cycle_duration = duration;
        self
    }

    pub fn with_max_cycles(mut self, max: u64) -> Self {
        self.max_cycles = Some(max);
        self
    }

    pub fn with_reset_after_cycles(mut self, n: u64) -> Self {
        self.reset_after_cycles = Some(n);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.set(key, value, "default", "default");
        self
    }

    pub fn with_check(mut self, check: CheckConfig) -> Self {
        self.checks.push(check);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;

    fn config(toml: &str) -> ConfigFile {
        let raw = load_from_str(toml).expect("valid toml");
        ConfigFile::try_from(raw).expect("valid config")
    }

    const CONFIG: &str = r#"
        [common]
        detector = "TST"
        repositoryTimeoutSeconds = 3
        conditionsStalePolicy = "warn"

        [publisher]
        backend = "memory"

        [dataSampling.gen]
        kind = "generator"

        [tasks.skeleton]
        moduleName = "Skeleton"
        className = "SkeletonTask"
        cycleDurationSeconds = 2
        maxCycles = 3
        dataSource = "gen"
        customParameters = { myOwnKey = "v" }

        [tasks.other]
        moduleName = "Skeleton"
        className = "SkeletonTask"
        detectorName = "ITS"
        publisherClassName = "noop"
        conditionsStalePolicy = "reason"

        [checks.bins]
        moduleName = "Skeleton"
        className = "BinsInRangeNonZero"
        dataSource = [{ task = "skeleton", objects = ["example"] }]
    "#;

    #[test]
    fn extracts_with_common_fallbacks() -> Result<()> {
        let cfg = config(CONFIG);
        let task = TaskRunnerConfig::extract("skeleton", &cfg)?;
        assert_eq!(task.detector_name, "TST");
        assert_eq!(task.cycle_duration, Duration::from_secs(2));
        assert_eq!(task.max_cycles, Some(3));
        assert_eq!(task.backend, BackendKind::Memory);
        assert_eq!(task.stale_policy, StalePolicy::Warn);
        assert_eq!(task.store_timeout, Duration::from_secs(3));
        assert_eq!(task.parameters.at("myOwnKey")?, "v");
        assert!(task.data_source.is_some());
        assert_eq!(task.checks.len(), 1);
        assert_eq!(task.checks[0].detector_name, "TST");
        task.validate()
    }

    #[test]
    fn task_overrides_win() -> Result<()> {
        let cfg = config(CONFIG);
        let task = TaskRunnerConfig::extract("other", &cfg)?;
        assert_eq!(task.detector_name, "ITS");
        assert_eq!(task.backend, BackendKind::Noop);
        assert_eq!(task.stale_policy, StalePolicy::Reason);
        assert!(task.checks.is_empty());
        Ok(())
    }

    #[test]
    fn absent_task_is_a_config_error() {
        let cfg = config(CONFIG);
        assert!(matches!(
            TaskRunnerConfig::extract("ghost", &cfg),
            Err(QcError::ConfigError(_))
        ));
        assert!(matches!(TaskRunnerConfig::extract("", &cfg), Err(QcError::ConfigError(_))));
    }

    #[test]
    fn zero_cycle_duration_fails_validation() {
        let cfg = TaskRunnerConfig::new("t", "Skeleton", "SkeletonTask").with_cycle_duration(Duration::ZERO);
        assert!(matches!(cfg.validate(), Err(QcError::ConfigError(_))));
    }
}
