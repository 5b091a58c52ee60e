// src/checker/runner.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::activity::Activity;
use crate::artifact::{CheckBinding, MonitorObject};
use crate::errors::call_guarded;
use crate::modules::ModuleRegistry;
use crate::quality::{Quality, ReasonKind};

use super::{Check, CheckConfig, ObjectMap, QualityObject};

enum Cached {
    Ready(Resolved),
    /// Class could not be resolved or configured; skipped from now on.
    Unresolvable,
}

struct Resolved {
    check: Box<dyn Check>,
    accepted_type: String,
    inspects_all: bool,
    mismatch_logged: bool,
}

/// Outcome of evaluating every binding of one object.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Aggregated verdict; the caller records it on the object.
    pub quality: Quality,
    /// One per binding that produced a verdict.
    pub quality_objects: Vec<QualityObject>,
    pub type_mismatches: usize,
    pub processing_errors: usize,
}

/// Resolves bindings to checker instances and evaluates them.
///
/// Instances are created lazily and cached per binding for the lifetime of
/// the runner. A binding that cannot be resolved is reported once and then
/// skipped.
pub struct CheckRunner {
    modules: Arc<ModuleRegistry>,
    configs: BTreeMap<String, CheckConfig>,
    cache: HashMap<CheckBinding, Cached>,
}

impl CheckRunner {
    pub fn new(modules: Arc<ModuleRegistry>) -> Self {
        Self {
            modules,
            configs: BTreeMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Make a check's parameters and detector known to the runner.
    pub fn declare(&mut self, config: CheckConfig) {
        self.configs.insert(config.name.clone(), config);
    }

    pub fn declared(&self) -> impl Iterator<Item = &CheckConfig> {
        self.configs.values()
    }

    /// Number of live checker instances.
    pub fn cached_instances(&self) -> usize {
        self.cache.values().filter(|c| matches!(c, Cached::Ready(_))).count()
    }

    pub fn start_of_activity(&mut self, activity: &Activity) {
        for cached in self.cache.values_mut() {
            if let Cached::Ready(resolved) = cached {
                resolved.check.start_of_activity(activity);
            }
        }
    }

    pub fn reset(&mut self) {
        for cached in self.cache.values_mut() {
            if let Cached::Ready(resolved) = cached {
                resolved.check.reset();
            }
        }
    }

    fn config_for(&self, binding: &CheckBinding) -> CheckConfig {
        self.configs.get(&binding.check_name).cloned().unwrap_or_else(|| {
            CheckConfig::new(
                &binding.check_name,
                binding.library_name.clone().unwrap_or_default(),
                &binding.class_name,
            )
        })
    }

    /// Resolve a binding. `Err` carries the reason text on first failure,
    /// `Ok(None)` means it failed before and is skipped silently.
    fn resolve(&mut self, binding: &CheckBinding) -> Result<Option<&mut Resolved>, String> {
        if !self.cache.contains_key(binding) {
            let config = self.config_for(binding);
            let module = binding
                .library_name
                .as_deref()
                .or((!config.module_name.is_empty()).then_some(config.module_name.as_str()));
            let created = self
                .modules
                .check_factory(module, &binding.class_name)
                .map_err(|e| e.to_string())
                .and_then(|factory| call_guarded(|| factory(&config)).map_err(|e| format!("{e:#}")))
                .and_then(|mut check| {
                    call_guarded(|| check.configure(&config))
                        .map(|_| check)
                        .map_err(|e| format!("configure failed: {e:#}"))
                });
            match created {
                Ok(check) => {
                    let accepted_type = check.accepted_type().to_string();
                    let inspects_all = check.inspects_all_objects();
                    debug!(check = %binding.check_name, class = %binding.class_name, "checker instantiated");
                    self.cache.insert(
                        binding.clone(),
                        Cached::Ready(Resolved {
                            check,
                            accepted_type,
                            inspects_all,
                            mismatch_logged: false,
                        }),
                    );
                }
                Err(message) => {
                    self.cache.insert(binding.clone(), Cached::Unresolvable);
                    return Err(message);
                }
            }
        }
        match self.cache.get_mut(binding) {
            Some(Cached::Ready(resolved)) => Ok(Some(resolved)),
            _ => Ok(None),
        }
    }

    /// Evaluate every binding of `objects[index]`, then beautify it.
    ///
    /// The aggregated quality is returned, not applied. Only the primary
    /// object is mutated, even when a check inspects all objects.
    pub fn evaluate(&mut self, objects: &mut [MonitorObject], index: usize) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let Some(primary) = objects.get(index) else {
            return evaluation;
        };
        let bindings = primary.checks().to_vec();
        let primary_name = primary.name().to_string();
        let payload_class = primary.class_name().to_string();
        let detector = primary.detector_name().to_string();
        let activity = primary.activity().clone();
        let validity = primary.validity();

        let mut aggregated = Quality::NULL;
        let mut compatible = Vec::with_capacity(bindings.len());

        for binding in bindings.iter() {
            let qo_detector = self
                .configs
                .get(&binding.check_name)
                .map(|c| c.detector_name.clone())
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| detector.clone());

            let modules = self.modules.clone();
            let resolved = match self.resolve(binding) {
                Ok(Some(resolved)) => resolved,
                Ok(None) => {
                    debug!(check = %binding.check_name, "skipping unresolvable checker");
                    continue;
                }
                Err(message) => {
                    warn!(check = %binding.check_name, class = %binding.class_name, %message, "cannot resolve checker");
                    evaluation.type_mismatches += 1;
                    aggregated = aggregated.combine(&Quality::NULL.with_reason(
                        ReasonKind::ProcessingError,
                        format!("check {} cannot be resolved: {message}", binding.check_name),
                    ));
                    continue;
                }
            };

            if !modules.inherits_from(&payload_class, &resolved.accepted_type) {
                let text = format!(
                    "check {} rejects payload class {} (expected {} or subtype)",
                    binding.check_name, payload_class, resolved.accepted_type
                );
                if !resolved.mismatch_logged {
                    warn!(object = %primary_name, "{text}");
                    resolved.mismatch_logged = true;
                }
                evaluation.type_mismatches += 1;
                aggregated = aggregated.combine(&Quality::NULL.with_reason(ReasonKind::ProcessingError, text));
                continue;
            }

            let view: ObjectMap<'_> = if resolved.inspects_all {
                objects.iter().map(|o| (o.name().to_string(), o)).collect()
            } else {
                BTreeMap::from([(primary_name.clone(), &objects[index])])
            };
            let inspected: Vec<String> = std::iter::once(primary_name.clone())
                .chain(view.keys().filter(|k| **k != primary_name).cloned())
                .collect();

            let check = &mut resolved.check;
            let quality = match call_guarded(|| check.check(&view)) {
                Ok(quality) => quality,
                Err(e) => {
                    warn!(check = %binding.check_name, object = %primary_name, error = %format!("{e:#}"), "check failed");
                    evaluation.processing_errors += 1;
                    Quality::NULL.with_reason(
                        ReasonKind::ProcessingError,
                        format!("check {} failed: {e:#}", binding.check_name),
                    )
                }
            };

            aggregated = aggregated.combine(&quality);
            evaluation.quality_objects.push(QualityObject {
                quality,
                check_name: binding.check_name.clone(),
                detector: qo_detector,
                monitor_object_names: inspected,
                activity: activity.clone(),
                validity,
            });
            compatible.push(binding.clone());
        }

        for binding in compatible.iter() {
            let Some(Cached::Ready(resolved)) = self.cache.get_mut(binding) else {
                continue;
            };
            let object = &mut objects[index];
            let check = &mut resolved.check;
            if let Err(e) = call_guarded(|| check.beautify(object, &aggregated)) {
                warn!(check = %binding.check_name, object = %primary_name, error = %format!("{e:#}"), "beautify failed");
                evaluation.processing_errors += 1;
                aggregated = aggregated.combine(&Quality::NULL.with_reason(
                    ReasonKind::ProcessingError,
                    format!("beautify of check {} failed: {e:#}", binding.check_name),
                ));
            }
        }

        evaluation.quality = aggregated;
        evaluation
    }
}
