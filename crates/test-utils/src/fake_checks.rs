use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::bail;
use qcflow::artifact::MonitorObject;
use qcflow::checker::{Check, CheckConfig, ObjectMap};
use qcflow::errors::Result;
use qcflow::modules::{Module, ModuleRegistry};
use qcflow::quality::{Quality, ReasonKind};

pub const TEST_CHECKS_MODULE: &str = "TestChecks";

/// Check classes provided by [`TEST_CHECKS_MODULE`].
pub mod classes {
    /// Always Good.
    pub const GOOD: &str = "AlwaysGood";
    /// Always Medium, with one reason.
    pub const MEDIUM: &str = "AlwaysMedium";
    /// Always Bad, with one reason.
    pub const BAD: &str = "AlwaysBad";
    /// Good, but only accepts `TH2` payloads.
    pub const ONLY_TH2: &str = "OnlyTH2";
    /// Returns an error from `check`.
    pub const FAILING: &str = "Failing";
    /// Panics in `check`.
    pub const PANICKING: &str = "Panicking";
    /// Bad, inspecting every object of the task; records the names it saw
    /// as a reason.
    pub const CROSS_OBJECT: &str = "CrossObject";
    /// Sets `beautifiedBy` metadata on the primary object.
    pub const BEAUTIFIER: &str = "Beautifier";
}

/// Counts checker instantiations across all test check classes.
#[derive(Debug, Clone, Default)]
pub struct Instantiations(Arc<AtomicUsize>);

impl Instantiations {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct FixedCheck {
    quality: Quality,
    accepted: &'static str,
}

impl Check for FixedCheck {
    fn check(&mut self, _objects: &ObjectMap<'_>) -> anyhow::Result<Quality> {
        Ok(self.quality.clone())
    }

    fn accepted_type(&self) -> &str {
        self.accepted
    }
}

struct FailingCheck {
    panics: bool,
}

impl Check for FailingCheck {
    fn check(&mut self, _objects: &ObjectMap<'_>) -> anyhow::Result<Quality> {
        if self.panics {
            panic!("checker exploded");
        }
        bail!("checker failed on purpose")
    }
}

struct CrossObjectCheck;

impl Check for CrossObjectCheck {
    fn check(&mut self, objects: &ObjectMap<'_>) -> anyhow::Result<Quality> {
        let names: Vec<&str> = objects.keys().map(String::as_str).collect();
        Ok(Quality::BAD.with_reason(ReasonKind::Unknown, format!("saw {}", names.join(","))))
    }

    fn inspects_all_objects(&self) -> bool {
        true
    }

    fn beautify(&mut self, object: &mut MonitorObject, quality: &Quality) -> anyhow::Result<()> {
        object.add_or_update_metadata("crossObjectVerdict", quality.name());
        Ok(())
    }
}

struct BeautifierCheck {
    name: String,
}

impl Check for BeautifierCheck {
    fn configure(&mut self, config: &CheckConfig) -> anyhow::Result<()> {
        self.name = config.name.clone();
        Ok(())
    }

    fn check(&mut self, _objects: &ObjectMap<'_>) -> anyhow::Result<Quality> {
        Ok(Quality::GOOD)
    }

    fn beautify(&mut self, object: &mut MonitorObject, _quality: &Quality) -> anyhow::Result<()> {
        let previous = object.metadata("beautifiedBy").unwrap_or_default().to_string();
        let value = if previous.is_empty() {
            self.name.clone()
        } else {
            format!("{previous},{}", self.name)
        };
        object.add_or_update_metadata("beautifiedBy", value);
        Ok(())
    }
}

fn load(module: &mut Module, counter: &Instantiations) {
    let fixed = |quality: Quality, accepted: &'static str, counter: Instantiations| {
        move |_: &CheckConfig| {
            counter.bump();
            Ok::<_, anyhow::Error>(Box::new(FixedCheck {
                quality: quality.clone(),
                accepted,
            }) as Box<dyn Check>)
        }
    };
    module
        .check(classes::GOOD, fixed(Quality::GOOD, "TObject", counter.clone()))
        .check(
            classes::MEDIUM,
            fixed(
                Quality::MEDIUM.with_reason(ReasonKind::LimitedAcceptance, "half the acceptance"),
                "TObject",
                counter.clone(),
            ),
        )
        .check(
            classes::BAD,
            fixed(Quality::BAD.with_reason(ReasonKind::BadTracking, "no tracks"), "TObject", counter.clone()),
        )
        .check(classes::ONLY_TH2, fixed(Quality::GOOD, "TH2", counter.clone()));

    let c = counter.clone();
    module.check(classes::FAILING, move |_| {
        c.bump();
        Ok(Box::new(FailingCheck { panics: false }) as Box<dyn Check>)
    });
    let c = counter.clone();
    module.check(classes::PANICKING, move |_| {
        c.bump();
        Ok(Box::new(FailingCheck { panics: true }) as Box<dyn Check>)
    });
    let c = counter.clone();
    module.check(classes::CROSS_OBJECT, move |_| {
        c.bump();
        Ok(Box::new(CrossObjectCheck) as Box<dyn Check>)
    });
    let c = counter.clone();
    module.check(classes::BEAUTIFIER, move |_| {
        c.bump();
        Ok(Box::new(BeautifierCheck { name: String::new() }) as Box<dyn Check>)
    });
}

/// Register [`TEST_CHECKS_MODULE`] on `registry` and return its
/// instantiation counter.
pub fn register_test_checks(registry: &ModuleRegistry) -> Result<Instantiations> {
    let counter = Instantiations::default();
    let shared = counter.clone();
    registry.register(TEST_CHECKS_MODULE, move |module| {
        load(module, &shared);
        Ok(())
    })?;
    Ok(counter)
}

/// Fresh registry with the built-in modules plus the test checks.
pub fn test_registry() -> (Arc<ModuleRegistry>, Instantiations) {
    let registry = ModuleRegistry::with_builtin();
    let counter = register_test_checks(&registry).expect("fresh registry has no test module");
    (Arc::new(registry), counter)
}
