// src/modules/skeleton.rs

//! Built-in example module: a task filling one histogram from block values
//! and a few simple checks for it.

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::activity::Activity;
use crate::artifact::{Histogram1D, MonitorObject};
use crate::checker::{Check, CheckConfig, ObjectMap};
use crate::errors::Result;
use crate::quality::{Quality, ReasonKind};
use crate::sampling::Batch;
use crate::task::{Task, TaskContext, TaskRunnerConfig};

use super::Module;

pub const MODULE_NAME: &str = "Skeleton";

/// Name of the histogram published by [`SkeletonTask`].
pub const HISTOGRAM_NAME: &str = "example";

const BINS: usize = 10;

pub fn load(module: &mut Module) -> Result<()> {
    module
        .task("SkeletonTask", |config| Ok(Box::new(SkeletonTask::from_config(config)?) as Box<dyn Task>))
        .check("BinsInRangeNonZero", |_| Ok(Box::new(BinsInRangeNonZero::default()) as Box<dyn Check>))
        .check("MeanInRange", |_| Ok(Box::new(MeanInRange::default()) as Box<dyn Check>))
        .check("FixedQuality", |_| Ok(Box::new(FixedQuality::default()) as Box<dyn Check>));
    Ok(())
}

/// Fills `example`, a 10-bin histogram over `[min, max)`, with every value
/// of every block.
#[derive(Debug)]
pub struct SkeletonTask {
    x_min: f64,
    x_max: f64,
    blocks_seen: u64,
}

impl SkeletonTask {
    pub fn from_config(config: &TaskRunnerConfig) -> Result<Self> {
        let x_min = config.parameters.parse::<f64>("min")?.unwrap_or(0.0);
        let x_max = config.parameters.parse::<f64>("max")?.unwrap_or(10.0);
        if x_min >= x_max {
            return Err(crate::errors::QcError::ConfigError(format!(
                "task '{}': min ({x_min}) must be below max ({x_max})",
                config.task_name
            )));
        }
        Ok(Self {
            x_min,
            x_max,
            blocks_seen: 0,
        })
    }
}

impl Task for SkeletonTask {
    fn initialize(&mut self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let histogram = Histogram1D::new(HISTOGRAM_NAME, "Example histogram", BINS, self.x_min, self.x_max);
        ctx.objects.start_publishing(histogram, None)?;
        ctx.objects.set_default_draw_options(HISTOGRAM_NAME, "hist")?;
        Ok(())
    }

    fn monitor_data(&mut self, ctx: &mut TaskContext<'_>, batch: &Batch) -> anyhow::Result<()> {
        let histogram = ctx.objects.histogram1d_mut(HISTOGRAM_NAME)?;
        for block in batch.iter() {
            for value in block.values() {
                histogram.fill(value);
            }
            self.blocks_seen += 1;
        }
        Ok(())
    }

    fn end_of_activity(&mut self, ctx: &mut TaskContext<'_>, activity: &Activity) -> anyhow::Result<()> {
        debug!(task = ctx.task_name(), run = activity.id, blocks = self.blocks_seen, "skeleton done");
        Ok(())
    }

    fn reset(&mut self, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        if let Ok(histogram) = ctx.objects.histogram1d_mut(HISTOGRAM_NAME) {
            histogram.reset();
        }
        self.blocks_seen = 0;
        Ok(())
    }
}

fn primary<'a>(objects: &ObjectMap<'a>) -> anyhow::Result<&'a MonitorObject> {
    objects
        .values()
        .next()
        .copied()
        .ok_or_else(|| anyhow!("no object to check"))
}

fn histogram<'a>(object: &'a MonitorObject) -> anyhow::Result<&'a Histogram1D> {
    object
        .payload()
        .as_histogram1d()
        .ok_or_else(|| anyhow!("{} is not a 1D histogram", object.name()))
}

/// Bad if any bin in `[firstBin, lastBin]` is empty, Good otherwise.
#[derive(Debug)]
pub struct BinsInRangeNonZero {
    first_bin: usize,
    last_bin: usize,
}

impl Default for BinsInRangeNonZero {
    fn default() -> Self {
        Self {
            first_bin: 1,
            last_bin: 7,
        }
    }
}

impl Check for BinsInRangeNonZero {
    fn configure(&mut self, config: &CheckConfig) -> anyhow::Result<()> {
        if let Some(first) = config.parameters.parse::<usize>("firstBin")? {
            self.first_bin = first;
        }
        if let Some(last) = config.parameters.parse::<usize>("lastBin")? {
            self.last_bin = last;
        }
        if self.first_bin > self.last_bin {
            return Err(anyhow!("firstBin {} > lastBin {}", self.first_bin, self.last_bin));
        }
        Ok(())
    }

    fn check(&mut self, objects: &ObjectMap<'_>) -> anyhow::Result<Quality> {
        let h = histogram(primary(objects)?)?;
        let last = self.last_bin.min(h.n_bins());
        let mut quality = Quality::GOOD;
        for bin in self.first_bin..=last {
            if h.bin_content(bin) == 0.0 {
                if !quality.is_worse_than(&Quality::GOOD) {
                    quality = Quality::BAD;
                }
                quality.add_reason(ReasonKind::Unknown, format!("empty bin {bin}"));
            }
        }
        Ok(quality)
    }

    fn beautify(&mut self, object: &mut MonitorObject, quality: &Quality) -> anyhow::Result<()> {
        let name = object.name().to_string();
        let h = object
            .payload_mut()
            .as_histogram1d_mut()
            .ok_or_else(|| anyhow!("{name} is not a 1D histogram"))?;
        h.fill_color = Some(color_for(quality).to_string());
        Ok(())
    }

    fn accepted_type(&self) -> &str {
        "TH1"
    }
}

const MEAN_ANNOTATION_PREFIX: &str = "mean check:";

/// Good if the histogram mean lies in `[min, max]`, Bad otherwise, Null
/// when the histogram is empty.
#[derive(Debug, Default)]
pub struct MeanInRange {
    min: f64,
    max: f64,
}

impl Check for MeanInRange {
    fn configure(&mut self, config: &CheckConfig) -> anyhow::Result<()> {
        self.min = config
            .parameters
            .parse::<f64>("min")?
            .context("MeanInRange needs a `min` parameter")?;
        self.max = config
            .parameters
            .parse::<f64>("max")?
            .context("MeanInRange needs a `max` parameter")?;
        Ok(())
    }

    fn check(&mut self, objects: &ObjectMap<'_>) -> anyhow::Result<Quality> {
        let h = histogram(primary(objects)?)?;
        let Some(mean) = h.mean() else {
            return Ok(Quality::NULL.with_reason(ReasonKind::Unknown, "empty histogram"));
        };
        if (self.min..=self.max).contains(&mean) {
            Ok(Quality::GOOD)
        } else {
            Ok(Quality::BAD.with_reason(
                ReasonKind::Unknown,
                format!("mean {mean:.3} outside [{}, {}]", self.min, self.max),
            ))
        }
    }

    fn beautify(&mut self, object: &mut MonitorObject, quality: &Quality) -> anyhow::Result<()> {
        if let Some(h) = object.payload_mut().as_histogram1d_mut() {
            h.annotations.retain(|a| !a.starts_with(MEAN_ANNOTATION_PREFIX));
            h.annotations.push(format!("{MEAN_ANNOTATION_PREFIX} {quality}"));
        }
        Ok(())
    }

    fn accepted_type(&self) -> &str {
        "TH1"
    }
}

/// Always returns the configured `quality` parameter (default Good).
#[derive(Debug)]
pub struct FixedQuality {
    quality: Quality,
}

impl Default for FixedQuality {
    fn default() -> Self {
        Self { quality: Quality::GOOD }
    }
}

impl Check for FixedQuality {
    fn configure(&mut self, config: &CheckConfig) -> anyhow::Result<()> {
        if let Some(raw) = config.parameters.at_optional("quality", "default", "default") {
            self.quality = raw.parse::<Quality>().map_err(|e| anyhow!(e))?;
        }
        Ok(())
    }

    fn check(&mut self, _objects: &ObjectMap<'_>) -> anyhow::Result<Quality> {
        Ok(self.quality.clone())
    }
}

fn color_for(quality: &Quality) -> &'static str {
    if quality.is_null() {
        "gray"
    } else if quality == &Quality::GOOD {
        "green"
    } else if quality == &Quality::MEDIUM {
        "orange"
    } else {
        "red"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Payload;

    fn object(h: Histogram1D) -> MonitorObject {
        MonitorObject::new(HISTOGRAM_NAME, Payload::from(h), "skeleton", "SkeletonTask", "TST")
    }

    fn check_one(check: &mut dyn Check, mo: &MonitorObject) -> Quality {
        let mut map = ObjectMap::new();
        map.insert(mo.name().to_string(), mo);
        check.check(&map).expect("check runs")
    }

    #[test]
    fn empty_bins_are_bad_with_one_reason_each() {
        let mut h = Histogram1D::new(HISTOGRAM_NAME, "", BINS, 0.0, 10.0);
        for x in [0.5, 1.5, 2.5, 4.5, 5.5, 6.5] {
            h.fill(x);
        }
        let mo = object(h);
        let mut check = BinsInRangeNonZero::default();
        let quality = check_one(&mut check, &mo);
        assert_eq!(quality, Quality::BAD);
        let texts: Vec<&str> = quality.reasons().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["empty bin 4"]);
    }

    #[test]
    fn full_range_is_good_and_beautified_green() -> anyhow::Result<()> {
        let mut h = Histogram1D::new(HISTOGRAM_NAME, "", BINS, 0.0, 10.0);
        for i in 0..BINS {
            h.fill(i as f64 + 0.5);
        }
        let mut mo = object(h);
        let mut check = BinsInRangeNonZero::default();
        let quality = check_one(&mut check, &mo);
        assert_eq!(quality, Quality::GOOD);
        check.beautify(&mut mo, &quality)?;
        assert_eq!(
            mo.payload().as_histogram1d().and_then(|h| h.fill_color.clone()),
            Some("green".to_string())
        );
        Ok(())
    }

    #[test]
    fn mean_in_range_requires_its_bounds() {
        let mut check = MeanInRange::default();
        assert!(check.configure(&CheckConfig::new("m", MODULE_NAME, "MeanInRange")).is_err());
    }

    #[test]
    fn fixed_quality_reads_its_parameter() -> anyhow::Result<()> {
        let mut check = FixedQuality::default();
        check.configure(&CheckConfig::new("f", MODULE_NAME, "FixedQuality").with_parameter("quality", "medium"))?;
        let mo = object(Histogram1D::new(HISTOGRAM_NAME, "", BINS, 0.0, 10.0));
        assert_eq!(check_one(&mut check, &mo), Quality::MEDIUM);
        Ok(())
    }
}
