// tests/repository_retry.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use qcflow::activity::Activity;
use qcflow::modules::ModuleRegistry;
use qcflow::quality::ReasonKind;
use qcflow::task::{RuntimeServices, TaskRunner, TaskRunnerConfig};
use qcflow::telemetry::{RecordingSink, names};
use qcflow_test_utils::fake_repository::FlakyRepository;
use qcflow_test_utils::fake_task::{Behaviour, CallLog, RECORDING_MODULE, RECORDING_TASK, register_recording_task};
use qcflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn runner_on(repo: Arc<FlakyRepository>, telemetry: Arc<RecordingSink>) -> Result<TaskRunner, Box<dyn Error>> {
    init_tracing();
    let registry = ModuleRegistry::with_builtin();
    register_recording_task(&registry, CallLog::new(), Behaviour::default())?;
    let services = RuntimeServices::new(repo)
        .with_modules(Arc::new(registry))
        .with_telemetry(telemetry);
    let mut runner = TaskRunner::new(services);
    runner.configure_with(
        TaskRunnerConfig::new("rec", RECORDING_MODULE, RECORDING_TASK)
            .with_detector("TST")
            .with_cycle_duration(Duration::from_millis(100))
            .with_poll_timeout(Duration::from_millis(10)),
    )?;
    Ok(runner)
}

#[test]
fn a_failed_write_is_reported_and_the_next_cycle_ships() -> TestResult {
    let repo = Arc::new(FlakyRepository::new().failing_next(1));
    let telemetry = Arc::new(RecordingSink::new());
    let mut runner = runner_on(repo.clone(), telemetry.clone())?;
    runner.start(Activity::new(5, 1))?;

    let first = runner.run_cycle()?;
    assert_eq!(first.storage_errors, 1);
    assert_eq!(first.objects_published, 0);
    let quality = runner.objects().get_quality("hits")?;
    assert!(quality.has_reason_kind(&ReasonKind::ProcessingError));
    assert!(quality.reasons().iter().any(|r| r.text.contains("repository write failed")));
    assert_eq!(telemetry.total(&names::errors("storage")), 1.0);

    let second = runner.run_cycle()?;
    assert_eq!(second.storage_errors, 0);
    assert_eq!(second.objects_published, 1);
    assert_eq!(telemetry.last(names::OBJECTS_PUBLISHED_WHOLE_RUN), Some(1.0));
    assert_eq!(repo.inner().versions("qc/TST/MO/rec/hits"), 1);
    assert_eq!(repo.attempts(), 2);

    runner.stop()?;
    assert_eq!(telemetry.last(names::OBJECTS_PUBLISHED_WHOLE_RUN), Some(1.0));
    Ok(())
}

#[test]
fn a_repository_that_stays_down_never_stops_the_task() -> TestResult {
    let repo = Arc::new(FlakyRepository::new());
    repo.set_failing(true);
    let telemetry = Arc::new(RecordingSink::new());
    let mut runner = runner_on(repo.clone(), telemetry.clone())?;
    runner.start(Activity::default())?;

    for _ in 0..4 {
        let report = runner.run_cycle()?;
        assert_eq!(report.storage_errors, 1);
    }
    let quality = runner.objects().get_quality("hits")?;
    assert!(quality.is_null());
    assert!(quality.reasons().iter().any(|r| r.text.contains("consecutive")));

    repo.heal();
    let report = runner.run_cycle()?;
    assert_eq!(report.objects_published, 1);
    runner.stop()?;
    Ok(())
}
