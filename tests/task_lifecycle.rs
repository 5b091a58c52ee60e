// tests/task_lifecycle.rs

use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use qcflow::activity::Activity;
use qcflow::errors::QcError;
use qcflow::modules::ModuleRegistry;
use qcflow::quality::ReasonKind;
use qcflow::repository::MemoryRepository;
use qcflow::task::{RuntimeServices, TaskRunner, TaskRunnerConfig, TaskState};
use qcflow::telemetry::{RecordingSink, names};
use qcflow_test_utils::fake_source::{ScriptedSource, values_batch};
use qcflow_test_utils::fake_task::{Behaviour, CallLog, RECORDING_MODULE, RECORDING_TASK, register_recording_task};
use qcflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

struct Harness {
    runner: TaskRunner,
    log: CallLog,
    repo: Arc<MemoryRepository>,
    telemetry: Arc<RecordingSink>,
}

fn harness(behaviour: Behaviour) -> Result<Harness, Box<dyn Error>> {
    init_tracing();
    let registry = ModuleRegistry::with_builtin();
    let log = CallLog::new();
    register_recording_task(&registry, log.clone(), behaviour)?;
    let repo = Arc::new(MemoryRepository::new());
    let telemetry = Arc::new(RecordingSink::new());
    let services = RuntimeServices::new(repo.clone())
        .with_modules(Arc::new(registry))
        .with_telemetry(telemetry.clone());
    Ok(Harness {
        runner: TaskRunner::new(services),
        log,
        repo,
        telemetry,
    })
}

fn recording(cycle: Duration) -> TaskRunnerConfig {
    TaskRunnerConfig::new("rec", RECORDING_MODULE, RECORDING_TASK)
        .with_detector("TST")
        .with_cycle_duration(cycle)
        .with_poll_timeout(Duration::from_millis(10))
}

fn within(actual: Duration, low: f64, high: f64) -> bool {
    let secs = actual.as_secs_f64();
    low <= secs && secs <= high
}

#[test]
fn three_two_second_cycles_publish_every_cycle() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    h.runner.configure_with(recording(Duration::from_secs(2)))?;
    h.runner.start(Activity::new(7, 1))?;

    for expected in 1..=3 {
        let report = h.runner.run_cycle()?;
        assert_eq!(report.cycle, expected);
        assert!(
            within(report.duration_cycle, 2.0, 2.3),
            "cycle {expected} took {:?}",
            report.duration_cycle
        );
        assert_eq!(report.objects_published, 1);
    }
    h.runner.stop()?;

    assert_eq!(h.runner.state(), TaskState::Stopped);
    assert_eq!(h.repo.versions("qc/TST/MO/rec/hits"), 3);
    assert_eq!(h.telemetry.last(names::OBJECTS_PUBLISHED_WHOLE_RUN), Some(3.0));
    assert_eq!(h.telemetry.values(names::DURATION_CYCLE).len(), 3);
    Ok(())
}

#[test]
fn hooks_are_called_in_lifecycle_order() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    let source = ScriptedSource::new(vec![values_batch(&[1.0]), values_batch(&[2.0]), values_batch(&[3.0])]);
    h.runner.set_data_source(Box::new(source));
    h.runner.configure_with(recording(Duration::from_millis(200)))?;
    h.runner.start(Activity::new(1, 1))?;

    let first = h.runner.run_cycle()?;
    let second = h.runner.run_cycle()?;
    h.runner.stop()?;

    assert_eq!(first.num_batches + second.num_batches, 3);
    assert_eq!(h.log.count("monitorData"), 3);
    let expected = [
        "initialize",
        "startOfActivity",
        "startOfCycle",
        "monitorData",
        "endOfCycle",
        "startOfCycle",
        "endOfCycle",
        "endOfActivity",
    ];
    assert_eq!(h.log.collapsed(), expected);

    let hits = h.runner.objects().get_monitor_object("hits")?;
    assert_eq!(hits.payload().as_histogram1d().map(|h| h.entries()), Some(3));
    Ok(())
}

#[test]
fn an_idle_source_still_cycles_on_time_and_publishes() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    h.runner.configure_with(recording(Duration::from_secs(1)))?;
    h.runner.start(Activity::default())?;

    let report = h.runner.run_cycle()?;
    assert!(within(report.duration_cycle, 0.85, 1.15), "{:?}", report.duration_cycle);
    assert_eq!(report.num_batches, 0);
    assert_eq!(report.objects_published, 1);
    assert_eq!(h.log.count("monitorData"), 0);
    Ok(())
}

#[test]
fn stop_request_ends_a_long_cycle_early() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    h.runner.configure_with(recording(Duration::from_secs(10)))?;
    h.runner.start(Activity::new(3, 1))?;

    let handle = h.runner.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        handle.request_stop();
    });
    let started = Instant::now();
    let report = h.runner.run_cycle()?;
    stopper.join().map_err(|_| "stopper thread panicked")?;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(report.stopped);
    assert_eq!(h.runner.state(), TaskState::Stopped);
    assert_eq!(h.log.count("endOfCycle"), 1);
    assert_eq!(h.log.count("endOfActivity"), 1);
    assert_eq!(h.repo.versions("qc/TST/MO/rec/hits"), 1);

    // stopping again changes nothing
    h.runner.stop()?;
    assert_eq!(h.log.count("endOfActivity"), 1);
    Ok(())
}

#[test]
fn abort_skips_the_remaining_hooks_and_publication() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    h.runner.configure_with(recording(Duration::from_secs(10)))?;
    h.runner.start(Activity::default())?;

    let handle = h.runner.stop_handle();
    let aborter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.request_abort();
    });
    let result = h.runner.run_cycle();
    aborter.join().map_err(|_| "aborter thread panicked")?;

    assert!(matches!(result, Err(QcError::LifecycleError(_))));
    assert_eq!(h.runner.state(), TaskState::Stopped);
    assert_eq!(h.log.count("endOfCycle"), 0);
    assert_eq!(h.log.count("endOfActivity"), 0);
    assert_eq!(h.repo.versions("qc/TST/MO/rec/hits"), 0);
    Ok(())
}

#[test]
fn failing_initialize_is_a_task_fault() -> TestResult {
    for behaviour in [Behaviour::failing("initialize"), Behaviour::panicking("initialize")] {
        let mut h = harness(behaviour)?;
        h.runner.configure_with(recording(Duration::from_millis(50)))?;
        let result = h.runner.start(Activity::default());

        assert!(matches!(result, Err(QcError::TaskFault { hook: "initialize", .. })));
        assert_eq!(h.runner.state(), TaskState::Stopped);
        let reports = h.runner.status_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].kind, "task_fault");
        assert_eq!(reports[0].component, "rec");
        assert_eq!(h.telemetry.total(&names::errors("task_fault")), 1.0);
        assert_eq!(h.log.count("startOfActivity"), 0);
    }
    Ok(())
}

#[test]
fn failing_monitor_data_is_recorded_and_the_cycle_continues() -> TestResult {
    let mut h = harness(Behaviour::failing("monitorData"))?;
    let source = ScriptedSource::new(vec![values_batch(&[1.0]), values_batch(&[2.0])]);
    h.runner.set_data_source(Box::new(source));
    h.runner.configure_with(recording(Duration::from_millis(150)))?;
    h.runner.start(Activity::default())?;

    let report = h.runner.run_cycle()?;
    assert_eq!(report.num_batches, 2);
    assert_eq!(report.processing_errors, 2);
    assert_eq!(report.objects_published, 1);
    assert_eq!(h.runner.state(), TaskState::Active);

    let quality = h.runner.objects().get_quality("hits")?;
    assert!(quality.has_reason_kind(&ReasonKind::ProcessingError));
    assert!(quality.reasons()[0].text.starts_with("monitorData failed"));
    // one reason per distinct message
    assert_eq!(quality.reasons().len(), 1);

    // the next cycle starts clean
    let report = h.runner.run_cycle()?;
    assert_eq!(report.processing_errors, 0);
    assert!(h.runner.objects().get_quality("hits")?.reasons().is_empty());
    Ok(())
}

#[test]
fn data_source_errors_are_counted_not_fatal() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    let source = ScriptedSource::new(vec![values_batch(&[4.0])]).with_errors(2);
    h.runner.set_data_source(Box::new(source));
    h.runner.configure_with(recording(Duration::from_millis(200)))?;
    h.runner.start(Activity::default())?;

    let report = h.runner.run_cycle()?;
    assert_eq!(report.data_source_errors, 2);
    assert_eq!(report.num_batches, 1);
    assert_eq!(h.telemetry.total(&names::errors("data_source")), 2.0);
    Ok(())
}

#[test]
fn reset_returns_to_ready_and_is_repeatable() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    h.runner.configure_with(recording(Duration::from_millis(50)))?;
    h.runner.start(Activity::default())?;
    h.runner.run_cycle()?;
    h.runner.stop()?;

    h.runner.reset()?;
    assert_eq!(h.runner.state(), TaskState::Ready);
    assert_eq!(h.runner.objects().number_published_objects(), 0);
    h.runner.reset()?;
    assert_eq!(h.runner.state(), TaskState::Ready);
    assert_eq!(h.runner.objects().number_published_objects(), 0);
    assert_eq!(h.log.count("reset"), 2);

    // a new activity registers its objects again
    h.runner.start(Activity::new(2, 1))?;
    assert_eq!(h.runner.objects().names(), vec!["hits"]);
    h.runner.run_cycle()?;
    h.runner.stop()?;
    Ok(())
}

#[test]
fn periodic_reset_keeps_the_registered_objects() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    h.runner
        .configure_with(recording(Duration::from_millis(50)).with_reset_after_cycles(2))?;
    h.runner.start(Activity::default())?;
    for _ in 0..4 {
        h.runner.run_cycle()?;
    }
    assert_eq!(h.log.count("reset"), 2);
    assert_eq!(h.runner.state(), TaskState::Active);
    assert!(h.runner.objects().is_being_published("hits"));
    Ok(())
}

#[test]
fn max_cycles_bounds_the_activity() -> TestResult {
    let mut h = harness(Behaviour::default())?;
    h.runner.configure_with(recording(Duration::from_millis(20)).with_max_cycles(2))?;
    h.runner.start(Activity::default())?;
    h.runner.run_cycle()?;
    h.runner.run_cycle()?;
    assert!(matches!(h.runner.run_cycle(), Err(QcError::LifecycleError(_))));
    assert_eq!(h.runner.cycles_completed(), 2);
    Ok(())
}
