// tests/check_pipeline.rs

use std::error::Error;
use std::sync::Arc;

use qcflow::activity::ValidityInterval;
use qcflow::artifact::{Histogram1D, Histogram2D};
use qcflow::checker::CheckConfig;
use qcflow::modules::{ModuleRegistry, skeleton};
use qcflow::objects::ObjectsManager;
use qcflow::quality::{Quality, ReasonKind};
use qcflow::repository::{MemoryRepository, Repository};
use qcflow_test_utils::fake_checks::{TEST_CHECKS_MODULE, classes, test_registry};
use qcflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const TASK: &str = "qa";

fn manager(modules: Arc<ModuleRegistry>) -> (ObjectsManager, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let m = ObjectsManager::new(repo.clone(), modules).with_owner(TASK, "QaTask", "TST");
    (m, repo)
}

fn test_check(name: &str, class: &str, objects: &[&str]) -> CheckConfig {
    CheckConfig::new(name, TEST_CHECKS_MODULE, class).with_source(TASK, objects)
}

fn texts(quality: &Quality) -> Vec<String> {
    quality.reasons().iter().map(|r| r.text.clone()).collect()
}

#[test]
fn empty_bins_turn_the_object_bad_until_filled() -> TestResult {
    init_tracing();
    let (mut m, repo) = manager(Arc::new(ModuleRegistry::with_builtin()));
    m.start_publishing(Histogram1D::new("h", "", 8, 0.0, 8.0), None)?;
    m.declare_check(
        CheckConfig::new("binsCheck", skeleton::MODULE_NAME, "BinsInRangeNonZero")
            .with_source(TASK, &["h"])
            .with_parameter("firstBin", "1")
            .with_parameter("lastBin", "8"),
    );

    {
        let h = m.histogram1d_mut("h")?;
        for x in [1.5, 2.5, 3.5, 4.5, 5.5, 6.5] {
            h.fill(x);
        }
    }
    let report = m.publish(ValidityInterval::starting_at(1), 1);
    let quality = m.get_quality("h")?;
    assert_eq!(quality, Quality::BAD);
    assert_eq!(texts(&quality), vec!["empty bin 1", "empty bin 8"]);
    assert_eq!(report.aggregated_quality, Quality::BAD);
    assert_eq!(report.quality_objects_stored, 1);

    {
        let h = m.histogram1d_mut("h")?;
        h.fill(0.5);
        h.fill(7.5);
    }
    m.publish(ValidityInterval::starting_at(2), 2);
    let quality = m.get_quality("h")?;
    assert_eq!(quality, Quality::GOOD);
    assert!(quality.reasons().is_empty());

    m.histogram1d_mut("h")?.set_bin_content(5, 0.0);
    m.publish(ValidityInterval::starting_at(3), 3);
    let quality = m.get_quality("h")?;
    assert_eq!(quality, Quality::BAD);
    assert_eq!(texts(&quality), vec!["empty bin 5"]);

    let qo = repo
        .latest_quality_object("qc/TST/QO/binsCheck/h")?
        .ok_or("quality object not stored")?;
    assert_eq!(qo.quality, Quality::BAD);
    assert_eq!(qo.monitor_object_names, vec!["h".to_string()]);
    Ok(())
}

#[test]
fn several_checks_aggregate_to_the_worst_with_all_reasons() -> TestResult {
    let (modules, _) = test_registry();
    let (mut m, repo) = manager(modules);
    m.start_publishing(Histogram1D::new("h", "", 4, 0.0, 4.0), None)?;
    m.declare_check(test_check("medium", classes::MEDIUM, &["h"]));
    m.declare_check(test_check("bad", classes::BAD, &["h"]));

    let report = m.publish(ValidityInterval::starting_at(1), 1);
    let quality = m.get_quality("h")?;
    assert_eq!(quality, Quality::BAD);
    assert_eq!(texts(&quality), vec!["half the acceptance", "no tracks"]);
    assert!(quality.has_reason_kind(&ReasonKind::LimitedAcceptance));
    assert!(quality.has_reason_kind(&ReasonKind::BadTracking));
    assert_eq!(report.quality_objects_stored, 2);

    let medium = repo.latest_quality_object("qc/TST/QO/medium/h")?.ok_or("missing medium")?;
    assert_eq!(medium.quality, Quality::MEDIUM);
    Ok(())
}

#[test]
fn incompatible_payload_yields_null_with_a_reason() -> TestResult {
    let (modules, _) = test_registry();
    let (mut m, repo) = manager(modules);
    m.start_publishing(Histogram1D::new("h", "", 4, 0.0, 4.0), None)?;
    m.declare_check(test_check("X", classes::ONLY_TH2, &["h"]));

    let report = m.publish(ValidityInterval::starting_at(1), 1);
    let quality = m.get_quality("h")?;
    assert!(quality.is_null());
    assert_eq!(
        texts(&quality),
        vec!["check X rejects payload class TH1F (expected TH2 or subtype)"]
    );
    assert_eq!(report.type_mismatches, 1);
    assert_eq!(report.quality_objects_stored, 0);
    assert!(repo.latest_quality_object("qc/TST/QO/X/h")?.is_none());
    Ok(())
}

#[test]
fn only_the_accepting_checker_contributes() -> TestResult {
    let (modules, _) = test_registry();
    let (mut m, _repo) = manager(modules);
    m.start_publishing(Histogram2D::new("map", "", 2, 0.0, 2.0, 2, 0.0, 2.0), None)?;
    m.start_publishing(Histogram1D::new("h", "", 2, 0.0, 2.0), None)?;
    m.declare_check(test_check("th2only", classes::ONLY_TH2, &[]));

    let report = m.publish(ValidityInterval::starting_at(1), 1);
    assert_eq!(m.get_quality("map")?, Quality::GOOD);
    assert!(m.get_quality("h")?.is_null());
    assert_eq!(report.type_mismatches, 1);
    assert_eq!(report.quality_objects_stored, 1);
    Ok(())
}

#[test]
fn unknown_checker_classes_are_resolved_once() -> TestResult {
    let (modules, instantiations) = test_registry();
    let (mut m, _repo) = manager(modules);
    m.start_publishing(Histogram1D::new("h", "", 2, 0.0, 2.0), None)?;
    m.declare_check(test_check("ghost", "NoSuchCheck", &["h"]));
    m.declare_check(test_check("good", classes::GOOD, &["h"]));

    let first = m.publish(ValidityInterval::starting_at(1), 1);
    assert_eq!(first.type_mismatches, 1);
    let quality = m.get_quality("h")?;
    assert_eq!(quality, Quality::GOOD);
    assert!(quality.has_reason_kind(&ReasonKind::ProcessingError));

    let second = m.publish(ValidityInterval::starting_at(2), 2);
    assert_eq!(second.type_mismatches, 0);
    assert_eq!(instantiations.get(), 1);
    assert_eq!(m.check_runner().cached_instances(), 1);
    Ok(())
}

#[test]
fn failing_and_panicking_checks_become_processing_errors() -> TestResult {
    init_tracing();
    let (modules, _) = test_registry();
    let (mut m, _repo) = manager(modules);
    m.start_publishing(Histogram1D::new("h", "", 2, 0.0, 2.0), None)?;
    m.declare_check(test_check("fails", classes::FAILING, &["h"]));
    m.declare_check(test_check("panics", classes::PANICKING, &["h"]));
    m.declare_check(test_check("good", classes::GOOD, &["h"]));

    let report = m.publish(ValidityInterval::starting_at(1), 1);
    assert_eq!(report.processing_errors, 2);
    assert_eq!(report.objects_shipped, 1);
    let quality = m.get_quality("h")?;
    assert_eq!(quality, Quality::GOOD);
    let reasons = texts(&quality);
    assert_eq!(reasons.len(), 2);
    assert!(reasons[0].starts_with("check fails failed"));
    assert!(reasons[1].starts_with("check panics failed"));
    assert!(reasons[1].contains("checker exploded"));
    Ok(())
}

#[test]
fn cross_object_checks_only_touch_the_primary() -> TestResult {
    let (modules, _) = test_registry();
    let (mut m, repo) = manager(modules);
    m.start_publishing(Histogram1D::new("a", "", 2, 0.0, 2.0), None)?;
    m.start_publishing(Histogram1D::new("b", "", 2, 0.0, 2.0), None)?;
    m.declare_check(test_check("cross", classes::CROSS_OBJECT, &["a"]));

    m.publish(ValidityInterval::starting_at(1), 1);
    let a = m.get_monitor_object("a")?;
    assert_eq!(a.quality(), &Quality::BAD);
    assert_eq!(texts(a.quality()), vec!["saw a,b"]);
    assert_eq!(a.metadata("crossObjectVerdict"), Some("Bad"));

    let b = m.get_monitor_object("b")?;
    assert!(b.quality().is_null());
    assert_eq!(b.metadata("crossObjectVerdict"), None);

    let qo = repo.latest_quality_object("qc/TST/QO/cross/a")?.ok_or("missing qo")?;
    assert_eq!(qo.monitor_object_names, vec!["a".to_string(), "b".to_string()]);
    Ok(())
}

#[test]
fn beautifiers_run_in_binding_order() -> TestResult {
    let (modules, _) = test_registry();
    let (mut m, _repo) = manager(modules);
    m.start_publishing(Histogram1D::new("h", "", 2, 0.0, 2.0), None)?;
    m.declare_check(test_check("second", classes::BEAUTIFIER, &["h"]));
    m.declare_check(test_check("first", classes::BEAUTIFIER, &["h"]));

    m.publish(ValidityInterval::starting_at(1), 1);
    assert_eq!(
        m.get_monitor_object("h")?.metadata("beautifiedBy"),
        Some("second,first")
    );
    Ok(())
}

#[test]
fn checks_declared_before_registration_still_bind() -> TestResult {
    let (modules, _) = test_registry();
    let (mut m, _repo) = manager(modules);
    m.declare_check(test_check("good", classes::GOOD, &["late"]));
    m.start_publishing(Histogram1D::new("late", "", 2, 0.0, 2.0), None)?;

    m.publish(ValidityInterval::starting_at(1), 1);
    assert_eq!(m.get_quality("late")?, Quality::GOOD);
    Ok(())
}

#[test]
fn republishing_the_same_cycle_stores_the_same_payload() -> TestResult {
    let (mut m, repo) = manager(Arc::new(ModuleRegistry::with_builtin()));
    let mut h = Histogram1D::new("h", "", 4, 0.0, 4.0);
    h.fill(1.5);
    m.start_publishing(h, None)?;
    m.declare_check(
        CheckConfig::new("mean", skeleton::MODULE_NAME, "MeanInRange")
            .with_source(TASK, &["h"])
            .with_parameter("min", "1")
            .with_parameter("max", "2"),
    );

    m.publish(ValidityInterval::starting_at(1), 1);
    let first = repo.retrieve_json("qc/TST/MO/qa", "h")?.ok_or("first write missing")?;
    m.publish(ValidityInterval::starting_at(1), 1);
    let second = repo.retrieve_json("qc/TST/MO/qa", "h")?.ok_or("second write missing")?;
    assert_eq!(first, second);

    for cycle in 2..50 {
        m.publish(ValidityInterval::starting_at(cycle as i64), cycle);
    }
    let object = m.get_monitor_object("h")?;
    let annotations = &object.payload().as_histogram1d().ok_or("not a 1D histogram")?.annotations;
    assert_eq!(annotations, &vec!["mean check: Good".to_string()]);
    Ok(())
}
