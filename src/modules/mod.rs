// src/modules/mod.rs

//! Late binding from configuration names to code.
//!
//! A module is a named unit of code that registers task and check factories
//! under class names, plus any payload classes and reason kinds it defines.
//! Modules are registered as loader functions and loaded lazily, once per
//! registry, under the registry mutex. Nothing is ever unloaded.

pub mod skeleton;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::{debug, info};

use crate::artifact::ClassRegistry;
use crate::checker::{Check, CheckConfig};
use crate::errors::{QcError, Result};
use crate::quality::{ReasonKind, ReasonKindRegistry};
use crate::task::{Task, TaskRunnerConfig};

pub type TaskFactory = Arc<dyn Fn(&TaskRunnerConfig) -> anyhow::Result<Box<dyn Task>> + Send + Sync>;
pub type CheckFactory = Arc<dyn Fn(&CheckConfig) -> anyhow::Result<Box<dyn Check>> + Send + Sync>;
pub type ModuleLoader = Arc<dyn Fn(&mut Module) -> Result<()> + Send + Sync>;

/// Contents of one loaded module.
#[derive(Default)]
pub struct Module {
    name: String,
    tasks: BTreeMap<String, TaskFactory>,
    checks: BTreeMap<String, CheckFactory>,
    classes: Vec<(String, String)>,
    reason_kinds: Vec<(u16, String)>,
}

impl Module {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task<F>(&mut self, class_name: &str, factory: F) -> &mut Self
    where
        F: Fn(&TaskRunnerConfig) -> anyhow::Result<Box<dyn Task>> + Send + Sync + 'static,
    {
        self.tasks.insert(class_name.to_string(), Arc::new(factory));
        self
    }

    pub fn check<F>(&mut self, class_name: &str, factory: F) -> &mut Self
    where
        F: Fn(&CheckConfig) -> anyhow::Result<Box<dyn Check>> + Send + Sync + 'static,
    {
        self.checks.insert(class_name.to_string(), Arc::new(factory));
        self
    }

    /// Declare a payload class defined by this module.
    pub fn class(&mut self, class_name: &str, parent: &str) -> &mut Self {
        self.classes.push((class_name.to_string(), parent.to_string()));
        self
    }

    /// Declare a module-specific reason kind.
    pub fn reason_kind(&mut self, id: u16, name: &str) -> &mut Self {
        self.reason_kinds.push((id, name.to_string()));
        self
    }
}

/// Summary of a module, as printed by `info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub tasks: Vec<String>,
    pub checks: Vec<String>,
}

struct Inner {
    available: BTreeMap<String, ModuleLoader>,
    loaded: BTreeMap<String, Module>,
    classes: ClassRegistry,
    reason_kinds: ReasonKindRegistry,
}

pub struct ModuleRegistry {
    inner: Mutex<Inner>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// Registry with no modules and the default payload classes.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                available: BTreeMap::new(),
                loaded: BTreeMap::new(),
                classes: ClassRegistry::with_defaults(),
                reason_kinds: ReasonKindRegistry::new(),
            }),
        }
    }

    /// Registry with the built-in modules registered.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        // A fresh registry has no name clash.
        let _ = registry.register(skeleton::MODULE_NAME, skeleton::load);
        registry
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| QcError::LifecycleError("module registry lock poisoned".to_string()))
    }

    /// Make a module available under `name`. It is loaded on first use.
    pub fn register<F>(&self, name: &str, loader: F) -> Result<()>
    where
        F: Fn(&mut Module) -> Result<()> + Send + Sync + 'static,
    {
        let mut inner = self.lock()?;
        if inner.available.contains_key(name) {
            return Err(QcError::DuplicateName(format!("module `{name}`")));
        }
        inner.available.insert(name.to_string(), Arc::new(loader));
        debug!(module = name, "module registered");
        Ok(())
    }

    /// Declare a payload class outside of any module (e.g. from `[classes]`).
    pub fn register_class(&self, class_name: &str, parent: &str) -> Result<()> {
        self.lock()?.classes.register(class_name, parent)
    }

    pub fn task_factory(&self, module: &str, class_name: &str) -> Result<TaskFactory> {
        let mut inner = self.lock()?;
        let loaded = load_locked(&mut inner, module)?;
        loaded.tasks.get(class_name).cloned().ok_or_else(|| {
            QcError::ConfigError(format!("task class `{class_name}` not found in module `{module}`"))
        })
    }

    /// Factory for a check class. Without a module name every registered
    /// module is searched, in name order.
    pub fn check_factory(&self, module: Option<&str>, class_name: &str) -> Result<CheckFactory> {
        let mut inner = self.lock()?;
        if let Some(module) = module {
            let loaded = load_locked(&mut inner, module)?;
            return loaded.checks.get(class_name).cloned().ok_or_else(|| {
                QcError::ConfigError(format!("check class `{class_name}` not found in module `{module}`"))
            });
        }
        let names: Vec<String> = inner.available.keys().cloned().collect();
        for name in names {
            let loaded = load_locked(&mut inner, &name)?;
            if let Some(factory) = loaded.checks.get(class_name) {
                return Ok(factory.clone());
            }
        }
        Err(QcError::ConfigError(format!("check class `{class_name}` not found in any module")))
    }

    pub fn inherits_from(&self, class_name: &str, ancestor: &str) -> bool {
        self.lock()
            .map(|inner| inner.classes.inherits_from(class_name, ancestor))
            .unwrap_or(false)
    }

    /// Snapshot of the class hierarchy.
    pub fn classes(&self) -> Result<ClassRegistry> {
        Ok(self.lock()?.classes.clone())
    }

    pub fn reason_kind(&self, id: u16) -> Option<ReasonKind> {
        self.lock().ok()?.reason_kinds.get(id)
    }

    pub fn is_loaded(&self, module: &str) -> bool {
        self.lock().map(|i| i.loaded.contains_key(module)).unwrap_or(false)
    }

    /// Load every registered module and describe it.
    pub fn describe(&self) -> Result<Vec<ModuleInfo>> {
        let mut inner = self.lock()?;
        let names: Vec<String> = inner.available.keys().cloned().collect();
        let mut infos = Vec::with_capacity(names.len());
        for name in names {
            let module = load_locked(&mut inner, &name)?;
            infos.push(ModuleInfo {
                name: name.clone(),
                tasks: module.tasks.keys().cloned().collect(),
                checks: module.checks.keys().cloned().collect(),
            });
        }
        Ok(infos)
    }
}

fn load_locked<'a>(inner: &'a mut Inner, name: &str) -> Result<&'a Module> {
    if !inner.loaded.contains_key(name) {
        let loader = inner
            .available
            .get(name)
            .cloned()
            .ok_or_else(|| QcError::ConfigError(format!("unknown module `{name}`")))?;
        let mut module = Module::new(name);
        loader(&mut module)?;
        for (class_name, parent) in module.classes.iter() {
            inner.classes.register(class_name, parent)?;
        }
        for (id, kind) in module.reason_kinds.iter() {
            inner.reason_kinds.register(*id, kind)?;
        }
        info!(
            module = name,
            tasks = module.tasks.len(),
            checks = module.checks.len(),
            "module loaded"
        );
        inner.loaded.insert(name.to_string(), module);
    }
    inner
        .loaded
        .get(name)
        .ok_or_else(|| QcError::ConfigError(format!("unknown module `{name}`")))
}

/// Process-wide registry with the built-in modules.
pub fn global() -> Arc<ModuleRegistry> {
    static GLOBAL: OnceLock<Arc<ModuleRegistry>> = OnceLock::new();
    GLOBAL
        .get_or_init(|| Arc::new(ModuleRegistry::with_builtin()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn modules_load_once_and_lazily() -> Result<()> {
        let registry = ModuleRegistry::new();
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        registry.register("Custom", move |m| {
            counter.fetch_add(1, Ordering::SeqCst);
            m.class("TCustomHist", "TH1").reason_kind(1500, "NoisyChannel");
            Ok(())
        })?;
        assert!(!registry.is_loaded("Custom"));
        assert!(!registry.inherits_from("TCustomHist", "TH1"));

        assert!(registry.check_factory(Some("Custom"), "Missing").is_err());
        assert!(registry.check_factory(Some("Custom"), "Missing").is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(registry.inherits_from("TCustomHist", "TH1"));
        assert_eq!(registry.reason_kind(1500).map(|k| k.name().to_string()), Some("NoisyChannel".into()));
        Ok(())
    }

    #[test]
    fn unknown_module_is_a_config_error() {
        let registry = ModuleRegistry::new();
        assert!(matches!(
            registry.task_factory("Nope", "Task"),
            Err(QcError::ConfigError(_))
        ));
    }

    #[test]
    fn duplicate_module_names_are_rejected() {
        let registry = ModuleRegistry::with_builtin();
        let err = registry.register(skeleton::MODULE_NAME, |_| Ok(()));
        assert!(matches!(err, Err(QcError::DuplicateName(_))));
    }

    #[test]
    fn builtin_module_is_described() -> Result<()> {
        let infos = ModuleRegistry::with_builtin().describe()?;
        let skeleton = infos.iter().find(|i| i.name == skeleton::MODULE_NAME);
        assert!(skeleton.is_some_and(|i| i.tasks.contains(&"SkeletonTask".to_string())));
        Ok(())
    }
}
