// tests/objects_manager.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use qcflow::activity::{Activity, ValidityInterval};
use qcflow::artifact::{Histogram1D, Histogram2D, Payload};
use qcflow::checker::CheckConfig;
use qcflow::modules::ModuleRegistry;
use qcflow::objects::{ObjectsManager, STORAGE_FAILURES_BEFORE_DEMOTION};
use qcflow::quality::{Quality, ReasonKind};
use qcflow::repository::metadata::keys;
use qcflow::repository::{MemoryRepository, Repository};
use qcflow_test_utils::fake_checks::{TEST_CHECKS_MODULE, classes, test_registry};
use qcflow_test_utils::fake_repository::FlakyRepository;
use qcflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn manager_on(repository: Arc<dyn Repository>) -> ObjectsManager {
    ObjectsManager::new(repository, Arc::new(ModuleRegistry::with_builtin())).with_owner("qa", "QaTask", "TST")
}

fn filled(name: &str, values: &[f64]) -> Histogram1D {
    let mut h = Histogram1D::new(name, name, 10, 0.0, 10.0);
    for v in values {
        h.fill(*v);
    }
    h
}

#[test]
fn every_registered_object_is_found_and_published_once() -> TestResult {
    init_tracing();
    let repo = Arc::new(MemoryRepository::new());
    let mut m = manager_on(repo.clone());
    m.start_publishing(filled("h1", &[1.0]), None)?;
    m.start_publishing(Histogram2D::new("h2", "", 4, 0.0, 4.0, 4, 0.0, 4.0), None)?;
    m.start_publishing(Payload::text("notes", "all quiet"), None)?;

    for name in ["h1", "h2", "notes"] {
        assert_eq!(m.get_monitor_object(name)?.name(), name);
    }
    let report = m.publish(ValidityInterval::starting_at(10), 1);
    assert_eq!(report.objects_attempted, 3);
    assert_eq!(report.objects_shipped, 3);
    for path in ["qc/TST/MO/qa/h1", "qc/TST/MO/qa/h2", "qc/TST/MO/qa/notes"] {
        assert_eq!(repo.versions(path), 1, "{path}");
    }
    Ok(())
}

#[test]
fn stored_objects_come_back_equivalent() -> TestResult {
    let repo = Arc::new(MemoryRepository::new());
    let mut m = manager_on(repo.clone());
    m.set_activity(&Activity::new(42, 2).with_period("LHC26a"));
    m.start_publishing(filled("h", &[0.5, 0.5, 7.5]), None)?;
    m.set_default_draw_options("h", "hist")?;
    m.publish(ValidityInterval::starting_at(1_000), 1);

    let back = repo
        .retrieve("qc/TST/MO/qa", "h", None)?
        .ok_or("object not stored")?;
    let original = m.get_monitor_object("h")?;
    assert_eq!(back.payload(), original.payload());
    assert_eq!(back.activity().id, 42);
    assert_eq!(back.metadata("drawOptions"), Some("hist"));

    // storing what was retrieved yields the same payload again
    repo.store(&back, &repo.latest_metadata("qc/TST/MO/qa/h").unwrap_or_default())?;
    let again = repo.retrieve("qc/TST/MO/qa", "h", None)?.ok_or("object lost")?;
    assert_eq!(again.payload(), original.payload());
    Ok(())
}

#[test]
fn publishing_twice_without_changes_stores_identical_content() -> TestResult {
    let repo = Arc::new(MemoryRepository::new());
    let mut m = manager_on(repo.clone());
    m.start_publishing(filled("h", &[2.5]), None)?;

    m.publish(ValidityInterval::starting_at(100), 1);
    let first = repo.latest_metadata("qc/TST/MO/qa/h").unwrap_or_default();
    m.publish(ValidityInterval::starting_at(200), 1);
    let second = repo.latest_metadata("qc/TST/MO/qa/h").unwrap_or_default();

    assert_eq!(first.get(keys::PAYLOAD_CHECKSUM), second.get(keys::PAYLOAD_CHECKSUM));
    assert_eq!(first.get(keys::CYCLE_NUMBER), second.get(keys::CYCLE_NUMBER));
    assert_eq!(repo.versions("qc/TST/MO/qa/h"), 2);
    Ok(())
}

#[test]
fn clearing_and_registering_again_gives_the_same_registry() -> TestResult {
    let mut m = manager_on(Arc::new(MemoryRepository::new()));
    let register = |m: &mut ObjectsManager| -> qcflow::errors::Result<()> {
        m.start_publishing(filled("b", &[]), None)?;
        m.start_publishing(filled("a", &[]), None)?;
        Ok(())
    };
    register(&mut m)?;
    let before: Vec<String> = m.names().iter().map(|s| s.to_string()).collect();
    m.clear();
    assert_eq!(m.number_published_objects(), 0);
    register(&mut m)?;
    assert_eq!(m.names(), before);
    Ok(())
}

#[test]
fn consecutive_storage_failures_demote_until_a_write_succeeds() -> TestResult {
    init_tracing();
    let repo = Arc::new(FlakyRepository::new());
    repo.set_failing(true);
    let (modules, _) = test_registry();
    let mut m = ObjectsManager::new(repo.clone(), modules).with_owner("qa", "QaTask", "TST");
    m.start_publishing(filled("h", &[1.0]), None)?;
    m.declare_check(CheckConfig::new("good", TEST_CHECKS_MODULE, classes::GOOD).with_source("qa", &["h"]));

    for cycle in 1..u64::from(STORAGE_FAILURES_BEFORE_DEMOTION) {
        let report = m.publish(ValidityInterval::starting_at(cycle as i64), cycle);
        assert_eq!(report.storage_errors, 1);
        assert_eq!(report.objects_shipped, 0);
        let quality = m.get_quality("h")?;
        assert_eq!(quality, Quality::GOOD);
        assert!(quality.has_reason_kind(&ReasonKind::ProcessingError));
    }

    let third = u64::from(STORAGE_FAILURES_BEFORE_DEMOTION);
    let report = m.publish(ValidityInterval::starting_at(third as i64), third);
    assert_eq!(report.storage_errors, 1);
    let quality = m.get_quality("h")?;
    assert!(quality.is_null());
    assert!(quality.reasons().iter().any(|r| r.text.contains("3 consecutive")));

    repo.heal();
    let report = m.publish(ValidityInterval::starting_at(10), 10);
    assert_eq!(report.objects_shipped, 1);
    let quality = m.get_quality("h")?;
    assert_eq!(quality, Quality::GOOD);
    assert!(quality.reasons().is_empty());
    let md = repo
        .inner()
        .latest_metadata("qc/TST/MO/qa/h")
        .ok_or("successful write not stored")?;
    assert_eq!(md[keys::QUALITY_NAME], "Good");
    assert!(m.is_being_published("h"));
    Ok(())
}

#[test]
fn slow_writes_time_out_and_demote_to_null() -> TestResult {
    let repo = Arc::new(FlakyRepository::new());
    repo.set_delay(Duration::from_millis(300));
    let mut m = manager_on(repo.clone());
    m.set_store_timeout(Duration::from_millis(50));
    m.start_publishing(filled("h", &[1.0]), None)?;

    let report = m.publish(ValidityInterval::starting_at(1), 1);
    assert_eq!(report.storage_errors, 1);
    let quality = m.get_quality("h")?;
    assert!(quality.is_null());
    assert!(quality.reasons().iter().any(|r| r.text.contains("timed out")));
    Ok(())
}

#[test]
fn histogram_access_checks_the_payload_kind() -> TestResult {
    let mut m = manager_on(Arc::new(MemoryRepository::new()));
    m.start_publishing(Payload::text("t", "x"), None)?;
    assert!(matches!(
        m.histogram1d_mut("t"),
        Err(qcflow::errors::QcError::TypeMismatch(_))
    ));
    assert!(matches!(
        m.start_publishing(Payload::text("", "x"), None),
        Err(qcflow::errors::QcError::UnknownObject(_))
    ));
    Ok(())
}
