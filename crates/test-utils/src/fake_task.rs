use std::sync::{Arc, Mutex};

use anyhow::bail;
use qcflow::activity::Activity;
use qcflow::artifact::Histogram1D;
use qcflow::errors::Result;
use qcflow::modules::ModuleRegistry;
use qcflow::sampling::Batch;
use qcflow::task::{Task, TaskContext};

pub const RECORDING_MODULE: &str = "Recording";
pub const RECORDING_TASK: &str = "RecordingTask";

/// Shared, ordered log of hook calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, hook: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| *c == hook).count()
    }

    /// Calls with consecutive `monitorData` entries collapsed into one.
    pub fn collapsed(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for call in self.calls() {
            if call == "monitorData" && out.last().is_some_and(|l| l == "monitorData") {
                continue;
            }
            out.push(call);
        }
        out
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// How a [`RecordingTask`] misbehaves.
#[derive(Debug, Clone)]
pub struct Behaviour {
    /// Hooks that return an error.
    pub fail_on: Vec<&'static str>,
    /// Hooks that panic.
    pub panic_on: Vec<&'static str>,
    /// 1D histograms registered in `initialize`, filled with every value.
    pub objects: Vec<String>,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            fail_on: Vec::new(),
            panic_on: Vec::new(),
            objects: vec!["hits".to_string()],
        }
    }
}

impl Behaviour {
    pub fn failing(hook: &'static str) -> Self {
        Self {
            fail_on: vec![hook],
            ..Self::default()
        }
    }

    pub fn panicking(hook: &'static str) -> Self {
        Self {
            panic_on: vec![hook],
            ..Self::default()
        }
    }

    pub fn with_objects(mut self, names: &[&str]) -> Self {
        self.objects = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

/// Task that logs every hook call and fills its histograms.
pub struct RecordingTask {
    log: CallLog,
    behaviour: Behaviour,
}

impl RecordingTask {
    pub fn new(log: CallLog, behaviour: Behaviour) -> Self {
        Self { log, behaviour }
    }

    fn enter(&self, hook: &'static str) -> anyhow::Result<()> {
        self.log.push(hook);
        if self.behaviour.panic_on.contains(&hook) {
            panic!("{hook} exploded");
        }
        if self.behaviour.fail_on.contains(&hook) {
            bail!("{hook} failed on purpose");
        }
        Ok(())
    }
}

impl Task for RecordingTask {
    fn initialize(&mut self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        self.enter("initialize")?;
        for name in self.behaviour.objects.iter() {
            ctx.objects
                .start_publishing(Histogram1D::new(name.as_str(), "", 10, 0.0, 10.0), None)?;
        }
        Ok(())
    }

    fn start_of_activity(&mut self, _ctx: &mut TaskContext<'_>, _activity: &Activity) -> anyhow::Result<()> {
        self.enter("startOfActivity")
    }

    fn start_of_cycle(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        self.enter("startOfCycle")
    }

    fn monitor_data(&mut self, ctx: &mut TaskContext<'_>, batch: &Batch) -> anyhow::Result<()> {
        self.enter("monitorData")?;
        for name in self.behaviour.objects.iter() {
            let histogram = ctx.objects.histogram1d_mut(name)?;
            for block in batch.iter() {
                for value in block.values() {
                    histogram.fill(value);
                }
            }
        }
        Ok(())
    }

    fn end_of_cycle(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        self.enter("endOfCycle")
    }

    fn end_of_activity(&mut self, _ctx: &mut TaskContext<'_>, _activity: &Activity) -> anyhow::Result<()> {
        self.enter("endOfActivity")
    }

    fn reset(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        self.enter("reset")
    }
}

/// Register [`RECORDING_MODULE`] providing [`RECORDING_TASK`] on `registry`.
pub fn register_recording_task(registry: &ModuleRegistry, log: CallLog, behaviour: Behaviour) -> Result<()> {
    registry.register(RECORDING_MODULE, move |module| {
        let log = log.clone();
        let behaviour = behaviour.clone();
        module.task(RECORDING_TASK, move |_| {
            Ok(Box::new(RecordingTask::new(log.clone(), behaviour.clone())) as Box<dyn Task>)
        });
        Ok(())
    })
}
