// src/service.rs

//! Async shell around the blocking runtimes, one entry point per CLI
//! subcommand.
//!
//! The task runner itself is synchronous; `run_task` moves it onto the
//! blocking pool and keeps the async side for signal handling.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::activity::Activity;
use crate::checker::{CheckConfig, CheckRunner, QualityObject};
use crate::cli::{self, CliArgs, Command};
use crate::conditions::RepositoryConditions;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::config::validate::classes_in_order;
use crate::config::ConfigFile;
use crate::errors::{QcError, Result};
use crate::modules::{self, ModuleRegistry};
use crate::quality::Quality;
use crate::repository::{self, metadata, ConnectOptions, Repository};
use crate::sampling::{build_source, DataSource, EmptySource};
use crate::task::{RuntimeServices, TaskRunner, TaskRunnerConfig, TaskState};
use crate::telemetry::LogSink;
use crate::types::BackendKind;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args
        .config
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let modules = modules::global();

    match args.command {
        Command::Info => {
            let config = if config_path.exists() {
                Some(load_and_validate(&config_path)?)
            } else {
                debug!(path = %config_path.display(), "no configuration file; listing built-ins only");
                None
            };
            print!("{}", render_info(&modules, config.as_ref())?);
            Ok(())
        }
        Command::RunTask { task, cycles } => {
            let mut config = load_and_validate(&config_path)?;
            resolve_relative_paths(&mut config, &config_root_dir(&config_path));
            let summary = run_task(config, &task, cycles, modules).await?;
            println!(
                "{}: {} cycle(s), {} object(s) published, last quality {}",
                task, summary.cycles, summary.objects_published, summary.last_quality
            );
            Ok(())
        }
        Command::RunChecker { task, check } => {
            let config = load_and_validate(&config_path)?;
            let repository = connect_publisher(&config, None)?;
            let verdicts = run_checker(&config, &task, check.as_deref(), repository, modules)?;
            for qo in verdicts.iter() {
                let reasons: Vec<String> = qo.quality.reasons().iter().map(ToString::to_string).collect();
                println!(
                    "{} {} on {}: {}{}",
                    qo.path(),
                    qo.check_name,
                    qo.monitor_object_names.join(","),
                    qo.quality,
                    if reasons.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", reasons.join("; "))
                    }
                );
            }
            Ok(())
        }
        Command::MetadataUpdate { path, name, entries } => {
            let config = load_and_validate(&config_path)?;
            let updates = cli::parse_metadata_entries(&entries)?;
            let repository = connect_publisher(&config, None)?;
            repository.update_metadata(&path, &name, &updates)?;
            info!(%path, %name, keys = updates.len(), "metadata updated");
            Ok(())
        }
    }
}

/// Outcome of a whole `run-task` activity.
#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub cycles: u64,
    pub objects_published: usize,
    pub last_quality: Quality,
}

/// Declare the `[classes]` of `config` on `modules`, parents first.
///
/// Modules are loaded first so that configured classes may derive from
/// module-defined ones.
pub fn register_classes(modules: &ModuleRegistry, config: &ConfigFile) -> Result<()> {
    if config.classes.is_empty() {
        return Ok(());
    }
    modules.describe()?;
    for (child, parent) in classes_in_order(&config.classes)? {
        modules.register_class(&child, &parent)?;
    }
    Ok(())
}

fn connect_publisher(config: &ConfigFile, backend: Option<BackendKind>) -> Result<Arc<dyn Repository>> {
    repository::connect(backend.unwrap_or(config.publisher.backend), &config.publisher.options)
}

/// Run `task_name` until Ctrl-C or until `cycles` (or `maxCycles`) cycles
/// have been published.
pub async fn run_task(
    config: ConfigFile,
    task_name: &str,
    cycles: Option<u64>,
    modules: Arc<ModuleRegistry>,
) -> Result<TaskSummary> {
    register_classes(&modules, &config)?;
    let mut runner_config = TaskRunnerConfig::extract(task_name, &config)?;
    if cycles.is_some() {
        runner_config.max_cycles = cycles;
    }

    let repository = connect_publisher(&config, Some(runner_config.backend))?;
    let conditions_repository = match &runner_config.ccdb_url {
        Some(url) => {
            let options = ConnectOptions::from([("database".to_string(), url.clone())]);
            repository::connect(BackendKind::File, &options)?
        }
        None => repository.clone(),
    };
    let source: Box<dyn DataSource> = match &runner_config.data_source {
        Some(spec) => {
            let name = config
                .tasks
                .get(task_name)
                .and_then(|t| t.data_source.clone())
                .unwrap_or_default();
            build_source(&name, spec)?
        }
        None => Box::new(EmptySource),
    };

    let services = RuntimeServices::new(repository)
        .with_telemetry(Arc::new(LogSink::new(task_name)))
        .with_conditions(Arc::new(RepositoryConditions::new(conditions_repository)))
        .with_modules(modules);
    let mut runner = TaskRunner::new(services).with_data_source(source);
    runner.configure_with(runner_config)?;

    let stop = runner.stop_handle();
    let signal = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("stop requested");
        stop.request_stop();
    });

    let activity = config.activity.clone();
    let outcome = tokio::task::spawn_blocking(move || drive(runner, activity))
        .await
        .map_err(|e| QcError::Other(anyhow!("task runner thread failed: {e}")));
    signal.abort();
    outcome?
}

/// Blocking part of `run_task`: start, cycle, stop.
pub fn drive(mut runner: TaskRunner, activity: Activity) -> Result<TaskSummary> {
    runner.start(activity)?;
    let max_cycles = runner.config().and_then(|c| c.max_cycles);
    let mut summary = TaskSummary {
        cycles: 0,
        objects_published: 0,
        last_quality: Quality::NULL,
    };

    while max_cycles.is_none_or(|max| runner.cycles_completed() < max) {
        let report = runner.run_cycle()?;
        summary.cycles = report.cycle;
        summary.objects_published += report.objects_published;
        summary.last_quality = report.aggregated_quality;
        if report.stopped {
            break;
        }
    }
    if runner.state() != TaskState::Stopped {
        runner.stop()?;
    }
    Ok(summary)
}

/// Evaluate the checks configured on `task_name` against the latest stored
/// version of each of its objects, storing one quality object per verdict.
pub fn run_checker(
    config: &ConfigFile,
    task_name: &str,
    only_check: Option<&str>,
    repository: Arc<dyn Repository>,
    modules: Arc<ModuleRegistry>,
) -> Result<Vec<QualityObject>> {
    register_classes(&modules, config)?;
    let detector = config
        .tasks
        .get(task_name)
        .and_then(|t| t.detector_name.clone())
        .unwrap_or_else(|| config.common.detector.clone());
    let checks: Vec<CheckConfig> = config
        .checks_for_task(task_name)
        .filter(|(name, _)| only_check.is_none_or(|only| only == name.as_str()))
        .map(|(name, spec)| CheckConfig::from_spec(name, spec, &detector))
        .collect();
    if checks.is_empty() {
        return Err(QcError::ConfigError(format!("no active check reads task '{task_name}'")));
    }

    let mut objects = Vec::new();
    for full_path in repository.list_published_objects(task_name)? {
        let Some((path, name)) = full_path.rsplit_once('/') else {
            continue;
        };
        match repository.retrieve(path, name, None)? {
            Some(mut object) => {
                for check in checks.iter().filter(|c| c.applies_to(task_name, name)) {
                    object.add_check(check.binding());
                }
                objects.push(object);
            }
            None => debug!(path = %full_path, "listed object has no stored version"),
        }
    }
    info!(task = task_name, objects = objects.len(), checks = checks.len(), "running checks");

    let mut runner = CheckRunner::new(modules);
    for check in checks {
        runner.declare(check);
    }
    runner.start_of_activity(&config.activity);

    let mut verdicts = Vec::new();
    for index in 0..objects.len() {
        if objects[index].checks().is_empty() {
            continue;
        }
        let evaluation = runner.evaluate(&mut objects, index);
        objects[index].set_quality(evaluation.quality);
        for qo in evaluation.quality_objects {
            let md = metadata::for_quality_object(&qo);
            if let Err(e) = repository.store_quality(&qo, &md) {
                warn!(path = %qo.path(), error = %e, "cannot store quality object");
            }
            verdicts.push(qo);
        }
    }
    Ok(verdicts)
}

/// Text printed by `qcflow info`.
pub fn render_info(modules: &ModuleRegistry, config: Option<&ConfigFile>) -> Result<String> {
    if let Some(config) = config {
        register_classes(modules, config)?;
    }
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "modules:");
    for module in modules.describe()? {
        let _ = writeln!(out, "  {}", module.name);
        let _ = writeln!(out, "    tasks:  {}", module.tasks.join(", "));
        let _ = writeln!(out, "    checks: {}", module.checks.join(", "));
    }
    let _ = writeln!(out, "classes:");
    for class in modules.classes()?.classes() {
        let _ = writeln!(out, "  {class}");
    }
    if let Some(config) = config {
        let _ = writeln!(out, "tasks:");
        for (name, task) in config.tasks.iter() {
            let _ = writeln!(
                out,
                "  {name}: {}::{} every {}s{}",
                task.module_name,
                task.class_name,
                task.cycle_duration_seconds,
                if task.active { "" } else { " (inactive)" }
            );
        }
        let _ = writeln!(out, "checks:");
        for (name, check) in config.checks.iter() {
            let sources: Vec<&str> = check.data_source.iter().map(|s| s.task.as_str()).collect();
            let _ = writeln!(
                out,
                "  {name}: {}::{} on {}",
                check.module_name,
                check.class_name,
                sources.join(", ")
            );
        }
    }
    Ok(out)
}

/// Make relative replay paths relative to `root` instead of the working
/// directory.
pub fn resolve_relative_paths(config: &mut ConfigFile, root: &Path) {
    for spec in config.data_sampling.values_mut() {
        if let Some(path) = spec.path.as_mut() {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
    }
}

/// Directory a relative path in the configuration is resolved against.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;

    #[test]
    fn info_lists_builtins_and_configured_classes() -> Result<()> {
        let config = ConfigFile::try_from(load_from_str(
            r#"
            [tasks.skeleton]
            moduleName = "Skeleton"
            className = "SkeletonTask"

            [classes]
            TMyHist = "TH1F"
            "#,
        )?)?;
        let registry = ModuleRegistry::with_builtin();
        let text = render_info(&registry, Some(&config))?;
        assert!(text.contains("Skeleton"));
        assert!(text.contains("BinsInRangeNonZero"));
        assert!(text.contains("TMyHist"));
        assert!(text.contains("skeleton: Skeleton::SkeletonTask every 10s"));
        assert!(registry.inherits_from("TMyHist", "TH1"));
        Ok(())
    }

    #[test]
    fn config_root_falls_back_to_cwd() {
        assert_eq!(config_root_dir(Path::new("conf/qc.toml")), PathBuf::from("conf"));
        assert!(!config_root_dir(Path::new("qc.toml")).as_os_str().is_empty());
    }

    #[test]
    fn replay_paths_follow_the_config_file() -> Result<()> {
        let mut config = ConfigFile::try_from(load_from_str(
            r#"
            [dataSampling.rel]
            kind = "replay"
            path = "data/blocks.txt"

            [dataSampling.abs]
            kind = "replay"
            path = "/srv/blocks.txt"

            [tasks.skeleton]
            moduleName = "Skeleton"
            className = "SkeletonTask"
            "#,
        )?)?;
        resolve_relative_paths(&mut config, Path::new("/etc/qc"));
        assert_eq!(config.data_sampling["rel"].path, Some(PathBuf::from("/etc/qc/data/blocks.txt")));
        assert_eq!(config.data_sampling["abs"].path, Some(PathBuf::from("/srv/blocks.txt")));
        Ok(())
    }
}
