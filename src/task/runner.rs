// src/task/runner.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::activity::{now_ms, Activity, ValidityInterval};
use crate::conditions::{ConditionsClient, NoConditions};
use crate::config::ConfigFile;
use crate::errors::{call_guarded, QcError, Result};
use crate::modules::{self, ModuleRegistry};
use crate::objects::ObjectsManager;
use crate::quality::{Quality, ReasonKind};
use crate::repository::{NoopRepository, Repository};
use crate::sampling::{Batch, DataSource, EmptySource};
use crate::telemetry::{names, NullSink, TelemetrySink};

use super::lifecycle::{StatusReport, StopHandle, TaskState};
use super::metrics::ProcessMonitor;
use super::{Task, TaskContext, TaskRunnerConfig};

/// Back-off after a failed data-source poll.
const SOURCE_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Collaborators injected into a runner.
#[derive(Clone)]
pub struct RuntimeServices {
    pub repository: Arc<dyn Repository>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub conditions: Arc<dyn ConditionsClient>,
    pub modules: Arc<ModuleRegistry>,
}

impl Default for RuntimeServices {
    fn default() -> Self {
        Self::new(Arc::new(NoopRepository))
    }
}

impl RuntimeServices {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            telemetry: Arc::new(NullSink),
            conditions: Arc::new(NoConditions),
            modules: modules::global(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_conditions(mut self, conditions: Arc<dyn ConditionsClient>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_modules(mut self, modules: Arc<ModuleRegistry>) -> Self {
        self.modules = modules;
        self
    }
}

/// Result of one `run_cycle`.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 1-based cycle number within the activity.
    pub cycle: u64,
    pub num_batches: usize,
    pub duration_cycle: Duration,
    pub duration_publish: Duration,
    pub objects_published: usize,
    pub aggregated_quality: Quality,
    pub processing_errors: usize,
    pub storage_errors: usize,
    pub type_mismatches: usize,
    pub data_source_errors: usize,
    /// A stop request ended this cycle; the runner is now STOPPED.
    pub stopped: bool,
}

#[derive(Debug, Default)]
struct ActivityCounters {
    cycles: u64,
    objects_published: u64,
    started: Option<Instant>,
}

#[derive(Clone, Copy)]
enum Hook<'b> {
    Initialize,
    StartOfActivity,
    StartOfCycle,
    MonitorData(&'b Batch),
    EndOfCycle,
    EndOfActivity,
    Reset,
}

impl Hook<'_> {
    fn name(&self) -> &'static str {
        match self {
            Hook::Initialize => "initialize",
            Hook::StartOfActivity => "startOfActivity",
            Hook::StartOfCycle => "startOfCycle",
            Hook::MonitorData(_) => "monitorData",
            Hook::EndOfCycle => "endOfCycle",
            Hook::EndOfActivity => "endOfActivity",
            Hook::Reset => "reset",
        }
    }
}

/// Drives one user task: lifecycle, cycle timing, publication, telemetry.
///
/// All methods run on the caller's thread. `run_cycle` blocks for about the
/// cycle duration plus publication time; use [`TaskRunner::stop_handle`] to
/// stop or abort it from another thread.
pub struct TaskRunner {
    services: RuntimeServices,
    state: TaskState,
    config: Option<TaskRunnerConfig>,
    task: Option<Box<dyn Task>>,
    objects: ObjectsManager,
    source: Box<dyn DataSource>,
    activity: Activity,
    stop: StopHandle,
    counters: ActivityCounters,
    process: ProcessMonitor,
    status: Vec<StatusReport>,
}

impl TaskRunner {
    pub fn new(services: RuntimeServices) -> Self {
        let objects = ObjectsManager::new(services.repository.clone(), services.modules.clone());
        Self {
            services,
            state: TaskState::Created,
            config: None,
            task: None,
            objects,
            source: Box::new(EmptySource),
            activity: Activity::default(),
            stop: StopHandle::new(),
            counters: ActivityCounters::default(),
            process: ProcessMonitor::new(),
            status: Vec::new(),
        }
    }

    pub fn with_data_source(mut self, source: Box<dyn DataSource>) -> Self {
        self.source = source;
        self
    }

    pub fn set_data_source(&mut self, source: Box<dyn DataSource>) {
        self.source = source;
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn objects(&self) -> &ObjectsManager {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectsManager {
        &mut self.objects
    }

    pub fn config(&self) -> Option<&TaskRunnerConfig> {
        self.config.as_ref()
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Fault reports collected so far.
    pub fn status_reports(&self) -> &[StatusReport] {
        &self.status
    }

    pub fn cycles_completed(&self) -> u64 {
        self.counters.cycles
    }

    fn task_name(&self) -> &str {
        self.config.as_ref().map(|c| c.task_name.as_str()).unwrap_or("")
    }

    fn lifecycle_error(&self, operation: &str) -> QcError {
        QcError::LifecycleError(format!(
            "cannot {operation} task '{}' in state {}",
            self.task_name(),
            self.state
        ))
    }

    /// CREATED -> READY from `[tasks.<task_name>]`.
    pub fn configure(&mut self, task_name: &str, config: &ConfigFile) -> Result<()> {
        if self.state != TaskState::Created {
            return Err(self.lifecycle_error("configure"));
        }
        let runner_config = TaskRunnerConfig::extract(task_name, config)?;
        self.configure_with(runner_config)
    }

    /// CREATED -> READY from an already resolved configuration.
    pub fn configure_with(&mut self, config: TaskRunnerConfig) -> Result<()> {
        if self.state != TaskState::Created {
            return Err(self.lifecycle_error("configure"));
        }
        config.validate()?;

        let factory = self
            .services
            .modules
            .task_factory(&config.module_name, &config.class_name)?;
        let task = call_guarded(|| factory(&config)).map_err(|e| {
            QcError::ConfigError(format!(
                "cannot instantiate {}::{} for task '{}': {e:#}",
                config.module_name, config.class_name, config.task_name
            ))
        })?;

        self.objects
            .set_owner(&config.task_name, &config.class_name, &config.detector_name);
        self.objects.set_store_timeout(config.store_timeout);
        for check in config.checks.iter() {
            self.objects.declare_check(check.clone());
        }

        info!(
            task = %config.task_name,
            module = %config.module_name,
            class = %config.class_name,
            cycle = ?config.cycle_duration,
            "task configured"
        );
        self.task = Some(task);
        self.config = Some(config);
        self.state = TaskState::Ready;
        Ok(())
    }

    /// READY -> ACTIVE: `initialize`, then `start_of_activity`.
    pub fn start(&mut self, activity: Activity) -> Result<()> {
        if self.state != TaskState::Ready {
            return Err(self.lifecycle_error("start"));
        }
        self.counters = ActivityCounters {
            started: Some(Instant::now()),
            ..ActivityCounters::default()
        };
        self.process.reset();
        self.stop.clear();
        self.activity = activity;
        self.objects.set_activity(&self.activity);

        self.transition_hook(Hook::Initialize)?;
        // objects registered by initialize get the activity too
        self.objects.set_activity(&self.activity);
        self.transition_hook(Hook::StartOfActivity)?;

        info!(task = %self.task_name(), activity = self.activity.id, "activity started");
        self.state = TaskState::Active;
        Ok(())
    }

    /// ACTIVE -> CYCLING -> ACTIVE: one full monitoring cycle plus
    /// publication.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        if self.state != TaskState::Active {
            return Err(self.lifecycle_error("run a cycle of"));
        }
        let Some(config) = self.config.clone() else {
            return Err(self.lifecycle_error("run a cycle of"));
        };
        if let Some(max) = config.max_cycles {
            if self.counters.cycles >= max {
                return Err(QcError::LifecycleError(format!(
                    "task '{}' reached its maximum number of cycles ({max})",
                    config.task_name
                )));
            }
        }
        if self.stop.abort_requested() {
            self.abort_now();
            return Err(QcError::LifecycleError(format!(
                "task '{}' was aborted",
                config.task_name
            )));
        }

        self.state = TaskState::Cycling;
        let cycle = self.counters.cycles + 1;
        let cycle_start = Instant::now();
        let validity = ValidityInterval::starting_at(now_ms());
        debug!(task = %config.task_name, cycle, "cycle started");

        let mut processing_errors = 0;
        let mut data_source_errors = 0;
        let mut num_batches = 0;
        let mut stopped = false;

        if self.cycle_hook(Hook::StartOfCycle) {
            processing_errors += 1;
        }

        let deadline = cycle_start + config.cycle_duration;
        loop {
            if self.stop.abort_requested() {
                self.abort_now();
                return Err(QcError::LifecycleError(format!(
                    "task '{}' was aborted during cycle {cycle}",
                    config.task_name
                )));
            }
            if self.stop.stop_requested() {
                stopped = true;
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait = config.poll_timeout.min(deadline - now);
            match self.source.poll(wait) {
                Ok(Some(batch)) => {
                    num_batches += 1;
                    if self.cycle_hook(Hook::MonitorData(&batch)) {
                        processing_errors += 1;
                    }
                    self.source.release(batch);
                }
                Ok(None) => {}
                Err(e) => {
                    data_source_errors += 1;
                    warn!(task = %config.task_name, cycle, error = %format!("{e:#}"), "data source poll failed");
                    std::thread::sleep(SOURCE_ERROR_BACKOFF.min(deadline.saturating_duration_since(Instant::now())));
                }
            }
        }
        let duration_cycle = cycle_start.elapsed();

        if self.cycle_hook(Hook::EndOfCycle) {
            processing_errors += 1;
        }

        let publish_start = Instant::now();
        let publication = self.objects.publish(validity, cycle);
        let duration_publish = publish_start.elapsed();
        processing_errors += publication.processing_errors;

        self.counters.cycles = cycle;
        self.counters.objects_published += publication.objects_shipped as u64;
        self.process.sample();

        let report = CycleReport {
            cycle,
            num_batches,
            duration_cycle,
            duration_publish,
            objects_published: publication.objects_shipped,
            aggregated_quality: publication.aggregated_quality,
            processing_errors,
            storage_errors: publication.storage_errors,
            type_mismatches: publication.type_mismatches,
            data_source_errors,
            stopped,
        };
        self.send_cycle_metrics(&report);
        info!(
            task = %config.task_name,
            cycle,
            batches = num_batches,
            published = report.objects_published,
            quality = %report.aggregated_quality,
            "cycle done"
        );

        if let Some(every) = config.reset_after_cycles {
            if cycle % every == 0 {
                debug!(task = %config.task_name, cycle, "periodic reset");
                self.state = TaskState::Active;
                self.transition_hook(Hook::Reset)?;
                self.objects.reset_checks();
            }
        }

        if stopped {
            self.state = TaskState::Active;
            self.finish_activity()?;
        } else {
            self.state = TaskState::Active;
        }
        Ok(report)
    }

    /// ACTIVE -> STOPPED via `end_of_activity`. Idempotent once stopped.
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            TaskState::Stopped => Ok(()),
            TaskState::Active | TaskState::Cycling => self.finish_activity(),
            TaskState::Created | TaskState::Ready => Err(self.lifecycle_error("stop")),
        }
    }

    /// Go to STOPPED without calling any user hook or publishing.
    pub fn abort(&mut self) -> Result<()> {
        match self.state {
            TaskState::Created => Err(self.lifecycle_error("abort")),
            TaskState::Stopped => Ok(()),
            _ => {
                self.abort_now();
                Ok(())
            }
        }
    }

    /// Back to READY: user `reset`, then every registered object is
    /// discarded. A no-op in CREATED, where there is no task yet.
    pub fn reset(&mut self) -> Result<()> {
        if self.state == TaskState::Created {
            return Ok(());
        }
        self.transition_hook(Hook::Reset)?;
        self.objects.clear();
        self.objects.reset_checks();
        self.stop.clear();
        self.state = TaskState::Ready;
        debug!(task = %self.task_name(), "task reset");
        Ok(())
    }

    fn abort_now(&mut self) {
        warn!(task = %self.task_name(), state = %self.state, "task aborted");
        self.state = TaskState::Stopped;
        self.send_activity_metrics();
    }

    fn finish_activity(&mut self) -> Result<()> {
        let result = self.transition_hook(Hook::EndOfActivity);
        if result.is_ok() {
            self.state = TaskState::Stopped;
            self.send_activity_metrics();
            info!(
                task = %self.task_name(),
                cycles = self.counters.cycles,
                published = self.counters.objects_published,
                "activity stopped"
            );
        }
        result
    }

    /// Run a hook whose failure is fatal: the runner goes to STOPPED and a
    /// status report is recorded.
    fn transition_hook(&mut self, hook: Hook<'_>) -> Result<()> {
        match self.call_hook(hook) {
            Ok(()) => Ok(()),
            Err(e) => {
                let message = format!("{e:#}");
                let name = self.task_name().to_string();
                error!(task = %name, hook = hook.name(), error = %message, "task fault");
                self.state = TaskState::Stopped;
                self.status.push(StatusReport {
                    component: name,
                    kind: "task_fault",
                    message: message.clone(),
                });
                self.services.telemetry.send(1.0, &names::errors("task_fault"));
                Err(QcError::TaskFault {
                    hook: hook.name(),
                    message,
                })
            }
        }
    }

    /// Run a per-cycle hook. A failure becomes a reason on this cycle's
    /// publication; returns `true` if the hook failed.
    fn cycle_hook(&mut self, hook: Hook<'_>) -> bool {
        match self.call_hook(hook) {
            Ok(()) => false,
            Err(e) => {
                let message = format!("{e:#}");
                warn!(task = %self.task_name(), hook = hook.name(), error = %message, "processing error");
                self.objects
                    .note_reason(ReasonKind::ProcessingError, format!("{} failed: {message}", hook.name()));
                true
            }
        }
    }

    fn call_hook(&mut self, hook: Hook<'_>) -> anyhow::Result<()> {
        let (Some(task), Some(config)) = (self.task.as_mut(), self.config.as_ref()) else {
            return Ok(());
        };
        let activity = &self.activity;
        let mut ctx = TaskContext::new(
            &mut self.objects,
            &config.parameters,
            activity,
            self.services.conditions.as_ref(),
            config.stale_policy,
            &config.task_name,
        );
        call_guarded(|| match hook {
            Hook::Initialize => task.initialize(&mut ctx),
            Hook::StartOfActivity => task.start_of_activity(&mut ctx, activity),
            Hook::StartOfCycle => task.start_of_cycle(&mut ctx),
            Hook::MonitorData(batch) => task.monitor_data(&mut ctx, batch),
            Hook::EndOfCycle => task.end_of_cycle(&mut ctx),
            Hook::EndOfActivity => task.end_of_activity(&mut ctx, activity),
            Hook::Reset => task.reset(&mut ctx),
        })
    }

    fn send_cycle_metrics(&self, report: &CycleReport) {
        let sink = &self.services.telemetry;
        let busy = (report.duration_cycle + report.duration_publish).as_secs_f64();
        sink.send(report.num_batches as f64, names::BATCHES_IN_CYCLE);
        sink.send(report.duration_cycle.as_secs_f64(), names::DURATION_CYCLE);
        sink.send(report.duration_publish.as_secs_f64(), names::DURATION_PUBLICATION);
        sink.send(report.objects_published as f64, names::OBJECTS_PUBLISHED_IN_CYCLE);
        if busy > 0.0 {
            sink.send(report.objects_published as f64 / busy, names::OBJECTS_PUBLISHED_PER_SECOND);
        }
        sink.send(self.counters.objects_published as f64, names::OBJECTS_PUBLISHED_WHOLE_RUN);

        for (kind, count) in [
            ("processing", report.processing_errors),
            ("storage", report.storage_errors),
            ("type_mismatch", report.type_mismatches),
            ("data_source", report.data_source_errors),
        ] {
            if count > 0 {
                sink.send(count as f64, &names::errors(kind));
            }
        }
    }

    fn send_activity_metrics(&self) {
        let sink = &self.services.telemetry;
        let elapsed = self
            .counters
            .started
            .map(|s| s.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let total = self.counters.objects_published as f64;
        sink.send(total, names::OBJECTS_PUBLISHED_WHOLE_RUN);
        sink.send(elapsed, names::DURATION_WHOLE_RUN);
        if elapsed > 0.0 {
            sink.send(total / elapsed, names::OBJECTS_PER_SECOND_WHOLE_RUN);
        }
        sink.send(self.process.mean_cpu(), names::CPU_MEAN);
        sink.send(self.process.mean_memory(), names::MEMORY_MEAN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskRunnerConfig;

    fn runner() -> TaskRunner {
        TaskRunner::new(RuntimeServices::new(Arc::new(NoopRepository)).with_modules(Arc::new(ModuleRegistry::with_builtin())))
    }

    fn skeleton() -> TaskRunnerConfig {
        TaskRunnerConfig::new("skeleton", "Skeleton", "SkeletonTask")
            .with_cycle_duration(Duration::from_millis(50))
            .with_poll_timeout(Duration::from_millis(10))
    }

    #[test]
    fn operations_outside_their_states_are_lifecycle_errors() -> Result<()> {
        let mut r = runner();
        assert!(matches!(r.start(Activity::default()), Err(QcError::LifecycleError(_))));
        assert!(matches!(r.run_cycle(), Err(QcError::LifecycleError(_))));
        assert!(matches!(r.stop(), Err(QcError::LifecycleError(_))));
        r.reset()?;
        assert_eq!(r.state(), TaskState::Created);

        r.configure_with(skeleton())?;
        assert!(matches!(r.run_cycle(), Err(QcError::LifecycleError(_))));
        assert!(matches!(r.configure_with(skeleton()), Err(QcError::LifecycleError(_))));
        Ok(())
    }

    #[test]
    fn unknown_class_is_a_config_error() {
        let mut r = runner();
        let err = r.configure_with(TaskRunnerConfig::new("t", "Skeleton", "NoSuchTask"));
        assert!(matches!(err, Err(QcError::ConfigError(_))));
        assert_eq!(r.state(), TaskState::Created);
    }

    #[test]
    fn max_cycles_bounds_the_activity() -> Result<()> {
        let mut r = runner();
        r.configure_with(skeleton().with_max_cycles(1))?;
        r.start(Activity::new(1, 1))?;
        r.run_cycle()?;
        assert!(matches!(r.run_cycle(), Err(QcError::LifecycleError(_))));
        r.stop()?;
        r.stop()?;
        assert_eq!(r.state(), TaskState::Stopped);
        Ok(())
    }

    #[test]
    fn abort_request_skips_the_cycle() -> Result<()> {
        let mut r = runner();
        r.configure_with(skeleton())?;
        r.start(Activity::new(1, 1))?;
        r.stop_handle().request_abort();
        assert!(matches!(r.run_cycle(), Err(QcError::LifecycleError(_))));
        assert_eq!(r.state(), TaskState::Stopped);
        assert_eq!(r.cycles_completed(), 0);
        Ok(())
    }

    #[test]
    fn reset_returns_to_ready_with_empty_registry() -> Result<()> {
        let mut r = runner();
        r.configure_with(skeleton())?;
        r.start(Activity::new(1, 1))?;
        assert_eq!(r.objects().number_published_objects(), 1);
        r.reset()?;
        assert_eq!(r.state(), TaskState::Ready);
        assert_eq!(r.objects().number_published_objects(), 0);
        r.start(Activity::new(2, 1))?;
        assert_eq!(r.objects().names(), vec!["example"]);
        Ok(())
    }
}
