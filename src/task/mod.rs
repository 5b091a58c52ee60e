// src/task/mod.rs

//! Task runtime: hosts a user [`Task`] and drives it through its lifecycle.
//!
//! - [`runner`] holds the state machine and the cycle loop.
//! - [`config`] resolves a task's configuration.
//! - [`lifecycle`] defines the states and the cross-thread stop handle.
//! - [`metrics`] samples process CPU and memory usage.

pub mod config;
pub mod lifecycle;
pub mod metrics;
pub mod runner;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::activity::{now_ms, Activity};
use crate::conditions::ConditionsClient;
use crate::config::CustomParameters;
use crate::errors::Result;
use crate::objects::ObjectsManager;
use crate::quality::ReasonKind;
use crate::repository::Metadata;
use crate::sampling::Batch;
use crate::types::StalePolicy;

pub use config::TaskRunnerConfig;
pub use lifecycle::{StatusReport, StopHandle, TaskState};
pub use runner::{CycleReport, RuntimeServices, TaskRunner};

/// User monitoring code.
///
/// Hooks return `anyhow::Result` so that module code can use `?` freely.
/// Failures of `initialize`, `start_of_activity`, `end_of_activity` and
/// `reset` are fatal for the runner; failures of the per-cycle hooks are
/// recorded on the published objects and the cycle goes on.
pub trait Task: Send {
    /// Create and register the objects to publish.
    fn initialize(&mut self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()>;

    fn start_of_activity(&mut self, _ctx: &mut TaskContext<'_>, _activity: &Activity) -> anyhow::Result<()> {
        Ok(())
    }

    fn start_of_cycle(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per batch, in arrival order.
    fn monitor_data(&mut self, ctx: &mut TaskContext<'_>, batch: &Batch) -> anyhow::Result<()>;

    fn end_of_cycle(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn end_of_activity(&mut self, _ctx: &mut TaskContext<'_>, _activity: &Activity) -> anyhow::Result<()> {
        Ok(())
    }

    /// Clear accumulated content. Registered objects are discarded by the
    /// runner after this returns, except for periodic resets.
    fn reset(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What a task sees of its runtime during a hook.
pub struct TaskContext<'a> {
    pub objects: &'a mut ObjectsManager,
    pub parameters: &'a CustomParameters,
    pub activity: &'a Activity,
    conditions: &'a dyn ConditionsClient,
    stale_policy: StalePolicy,
    task_name: &'a str,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        objects: &'a mut ObjectsManager,
        parameters: &'a CustomParameters,
        activity: &'a Activity,
        conditions: &'a dyn ConditionsClient,
        stale_policy: StalePolicy,
        task_name: &'a str,
    ) -> Self {
        Self {
            objects,
            parameters,
            activity,
            conditions,
            stale_policy,
            task_name,
        }
    }

    pub fn task_name(&self) -> &str {
        self.task_name
    }

    /// Custom parameter for the current activity, with `default` fallback.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.at_for_activity(key, self.activity)
    }

    /// Fetch a conditions object, applying the configured stale policy when
    /// its validity does not cover `timestamp_ms` (now when `None`).
    pub fn retrieve_condition<T: DeserializeOwned>(
        &mut self,
        path: &str,
        metadata: &Metadata,
        timestamp_ms: Option<i64>,
    ) -> Result<Option<T>> {
        let Some(entry) = self.conditions.retrieve_json(path, metadata, timestamp_ms)? else {
            return Ok(None);
        };
        if entry.is_stale_at(timestamp_ms.unwrap_or_else(now_ms)) {
            match self.stale_policy {
                StalePolicy::Allow => {}
                StalePolicy::Warn => warn!(task = %self.task_name, %path, "using stale conditions object"),
                StalePolicy::Reason => self
                    .objects
                    .note_reason(ReasonKind::ProcessingError, format!("stale conditions object {path}")),
            }
        }
        Ok(Some(serde_json::from_str(&entry.json)?))
    }
}
