// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::activity::Activity;
use crate::config::parameters::CustomParameters;
use crate::types::{BackendKind, DataSourceKind, StalePolicy};

type Table = BTreeMap<String, String>;

/// `extendedParameters.<runType>.<beamType>.<key> = value`
pub type ExtendedParameters = BTreeMap<String, BTreeMap<String, Table>>;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [common]
/// detector = "TST"
///
/// [publisher]
/// backend = "file"
/// database = "/tmp/qc-repo"
///
/// [activity]
/// id = 300000
/// type = 1
///
/// [dataSampling.random]
/// kind = "generator"
///
/// [tasks.skeleton]
/// moduleName = "Skeleton"
/// className = "SkeletonTask"
/// cycleDurationSeconds = 10
/// dataSource = "random"
///
/// [checks.bins]
/// moduleName = "Skeleton"
/// className = "BinsInRangeNonZero"
/// dataSource = [{ task = "skeleton", objects = ["example"] }]
/// ```
///
/// This is the raw, unvalidated form; [`ConfigFile`] is obtained through
/// `TryFrom` (see `config::validate`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfigFile {
    #[serde(default)]
    pub common: CommonSection,

    #[serde(default)]
    pub publisher: PublisherSection,

    #[serde(default)]
    pub activity: Activity,

    /// Named data sources from `[dataSampling.<name>]`.
    #[serde(default)]
    pub data_sampling: BTreeMap<String, DataSourceSpec>,

    /// Tasks from `[tasks.<name>]`, keyed by task name.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSpec>,

    /// Checks from `[checks.<name>]`, keyed by check name.
    #[serde(default)]
    pub checks: BTreeMap<String, CheckSpec>,

    /// Extra payload classes: `child = "parent"`.
    #[serde(default)]
    pub classes: BTreeMap<String, String>,
}

/// Validated configuration. Built from [`RawConfigFile`] via `TryFrom`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub common: CommonSection,
    pub publisher: PublisherSection,
    pub activity: Activity,
    pub data_sampling: BTreeMap<String, DataSourceSpec>,
    pub tasks: BTreeMap<String, TaskSpec>,
    pub checks: BTreeMap<String, CheckSpec>,
    pub classes: BTreeMap<String, String>,
}

impl ConfigFile {
    /// Assemble without validation. Only `TryFrom<RawConfigFile>` should
    /// call this.
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            common: raw.common,
            publisher: raw.publisher,
            activity: raw.activity,
            data_sampling: raw.data_sampling,
            tasks: raw.tasks,
            checks: raw.checks,
            classes: raw.classes,
        }
    }

    /// Checks whose data sources include `task_name`.
    pub fn checks_for_task<'a>(&'a self, task_name: &'a str) -> impl Iterator<Item = (&'a String, &'a CheckSpec)> {
        self.checks
            .iter()
            .filter(move |(_, c)| c.active && c.data_source.iter().any(|s| s.task == task_name))
    }
}

/// `[common]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonSection {
    /// Detector used when a task or check does not name one.
    #[serde(default = "default_detector")]
    pub detector: String,

    /// Conditions-store endpoint shared by all tasks.
    #[serde(default)]
    pub ccdb_url: Option<String>,

    /// Per-object repository write timeout.
    #[serde(default = "default_repository_timeout")]
    pub repository_timeout_seconds: u64,

    #[serde(default)]
    pub conditions_stale_policy: StalePolicy,
}

fn default_detector() -> String {
    "MISC".to_string()
}

fn default_repository_timeout() -> u64 {
    10
}

impl Default for CommonSection {
    fn default() -> Self {
        Self {
            detector: default_detector(),
            ccdb_url: None,
            repository_timeout_seconds: default_repository_timeout(),
            conditions_stale_policy: StalePolicy::default(),
        }
    }
}

/// `[publisher]` section: backend plus flat connection options
/// (`host`, `database`, `username`, `password`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublisherSection {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(flatten)]
    pub options: BTreeMap<String, String>,
}

/// `[dataSampling.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceSpec {
    #[serde(default)]
    pub kind: DataSourceKind,

    /// Input file of a `replay` source.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Restart a `replay` source at end of file.
    #[serde(default)]
    pub repeat: bool,

    /// Batches per second produced by a `generator` source.
    #[serde(default = "default_rate")]
    pub rate_per_second: f64,

    #[serde(default = "default_blocks_per_batch")]
    pub blocks_per_batch: usize,

    #[serde(default = "default_values_per_block")]
    pub values_per_block: usize,

    /// Range of generated values, `[min, max)`.
    #[serde(default)]
    pub min: f64,

    #[serde(default = "default_max")]
    pub max: f64,

    #[serde(default)]
    pub seed: u64,
}

fn default_rate() -> f64 {
    10.0
}

fn default_blocks_per_batch() -> usize {
    1
}

fn default_values_per_block() -> usize {
    100
}

fn default_max() -> f64 {
    10.0
}

impl Default for DataSourceSpec {
    fn default() -> Self {
        Self {
            kind: DataSourceKind::default(),
            path: None,
            repeat: false,
            rate_per_second: default_rate(),
            blocks_per_batch: default_blocks_per_batch(),
            values_per_block: default_values_per_block(),
            min: 0.0,
            max: default_max(),
            seed: 0,
        }
    }
}

/// `[tasks.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    #[serde(default = "default_true")]
    pub active: bool,

    pub module_name: String,

    pub class_name: String,

    /// Falls back to `[common].detector`.
    #[serde(default)]
    pub detector_name: Option<String>,

    /// Signed so that `0` and negative values reach validation instead of
    /// failing deserialization.
    #[serde(default = "default_cycle_duration")]
    pub cycle_duration_seconds: i64,

    #[serde(default)]
    pub max_cycles: Option<u64>,

    /// Call the task's `reset` every N cycles.
    #[serde(default)]
    pub reset_after_cycles: Option<u64>,

    /// Overrides `[publisher].backend` for this task.
    #[serde(default)]
    pub publisher_class_name: Option<BackendKind>,

    /// Name of a `[dataSampling.<name>]` entry.
    #[serde(default)]
    pub data_source: Option<String>,

    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,

    #[serde(default)]
    pub custom_parameters: Table,

    #[serde(default)]
    pub extended_parameters: ExtendedParameters,

    /// Overrides `[common].ccdbUrl`.
    #[serde(default)]
    pub ccdb_url: Option<String>,

    /// Overrides `[common].conditionsStalePolicy`.
    #[serde(default)]
    pub conditions_stale_policy: Option<StalePolicy>,
}

fn default_true() -> bool {
    true
}

fn default_cycle_duration() -> i64 {
    10
}

fn default_poll_timeout() -> u64 {
    100
}

impl TaskSpec {
    pub fn new(module_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            active: true,
            module_name: module_name.into(),
            class_name: class_name.into(),
            detector_name: None,
            cycle_duration_seconds: default_cycle_duration(),
            max_cycles: None,
            reset_after_cycles: None,
            publisher_class_name: None,
            data_source: None,
            poll_timeout_ms: default_poll_timeout(),
            custom_parameters: Table::new(),
            extended_parameters: ExtendedParameters::new(),
            ccdb_url: None,
            conditions_stale_policy: None,
        }
    }

    pub fn parameters(&self) -> CustomParameters {
        CustomParameters::from_tables(&self.custom_parameters, &self.extended_parameters)
    }
}

/// One entry of a check's `dataSource` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckSource {
    pub task: String,

    /// Objects of `task` the check is bound to; empty means all of them.
    #[serde(default)]
    pub objects: Vec<String>,
}

impl CheckSource {
    pub fn covers(&self, task_name: &str, object_name: &str) -> bool {
        self.task == task_name && (self.objects.is_empty() || self.objects.iter().any(|o| o == object_name))
    }
}

/// `[checks.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSpec {
    #[serde(default = "default_true")]
    pub active: bool,

    pub module_name: String,

    pub class_name: String,

    #[serde(default)]
    pub detector_name: Option<String>,

    #[serde(default)]
    pub data_source: Vec<CheckSource>,

    #[serde(default)]
    pub custom_parameters: Table,

    #[serde(default)]
    pub extended_parameters: ExtendedParameters,
}

impl CheckSpec {
    pub fn new(module_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            active: true,
            module_name: module_name.into(),
            class_name: class_name.into(),
            detector_name: None,
            data_source: Vec::new(),
            custom_parameters: Table::new(),
            extended_parameters: ExtendedParameters::new(),
        }
    }

    pub fn parameters(&self) -> CustomParameters {
        CustomParameters::from_tables(&self.custom_parameters, &self.extended_parameters)
    }
}
