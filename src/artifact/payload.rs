// src/artifact/payload.rs

//! Payloads wrapped by monitoring objects.
//!
//! The core only needs a narrow capability set from a payload: a name, a
//! runtime class name, serialization and cloning. Known kinds are modelled as
//! variants; anything else travels as [`Payload::Opaque`] bytes tagged with
//! its class name.

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Fixed-width 1D histogram. Bins are numbered from 1 to `n_bins`;
/// bin 0 is the underflow and bin `n_bins + 1` the overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    pub name: String,
    pub title: String,
    pub x_min: f64,
    pub x_max: f64,
    contents: Vec<f64>,
    entries: u64,
    /// Visual hints set by checkers when beautifying.
    #[serde(default)]
    pub fill_color: Option<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl Histogram1D {
    pub fn new(name: impl Into<String>, title: impl Into<String>, n_bins: usize, x_min: f64, x_max: f64) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            x_min,
            x_max,
            contents: vec![0.0; n_bins + 2],
            entries: 0,
            fill_color: None,
            annotations: Vec::new(),
        }
    }

    pub fn n_bins(&self) -> usize {
        self.contents.len().saturating_sub(2)
    }

    /// Bin index for `x`, including underflow (0) and overflow (`n_bins + 1`).
    pub fn find_bin(&self, x: f64) -> usize {
        let n = self.n_bins();
        if x < self.x_min {
            return 0;
        }
        if x >= self.x_max {
            return n + 1;
        }
        let width = (self.x_max - self.x_min) / n as f64;
        (((x - self.x_min) / width) as usize + 1).min(n)
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        let bin = self.find_bin(x);
        self.contents[bin] += weight;
        self.entries += 1;
    }

    /// Content of `bin`; out-of-range bins read as 0.
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    /// Set the content of `bin`; out-of-range bins are ignored.
    pub fn set_bin_content(&mut self, bin: usize, value: f64) {
        if let Some(slot) = self.contents.get_mut(bin) {
            *slot = value;
        }
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Mean of the in-range bin centres weighted by their content.
    pub fn mean(&self) -> Option<f64> {
        let n = self.n_bins();
        if n == 0 {
            return None;
        }
        let width = (self.x_max - self.x_min) / n as f64;
        let (mut sum, mut weight) = (0.0, 0.0);
        for bin in 1..=n {
            let content = self.contents[bin];
            let centre = self.x_min + (bin as f64 - 0.5) * width;
            sum += centre * content;
            weight += content;
        }
        (weight > 0.0).then(|| sum / weight)
    }

    pub fn reset(&mut self) {
        self.contents.iter_mut().for_each(|c| *c = 0.0);
        self.entries = 0;
    }
}

/// Fixed-width 2D histogram, same bin numbering as [`Histogram1D`] on each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram2D {
    pub name: String,
    pub title: String,
    pub x_bins: usize,
    pub x_min: f64,
    pub x_max: f64,
    pub y_bins: usize,
    pub y_min: f64,
    pub y_max: f64,
    contents: Vec<f64>,
    entries: u64,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl Histogram2D {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        x_bins: usize,
        x_min: f64,
        x_max: f64,
        y_bins: usize,
        y_min: f64,
        y_max: f64,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            x_bins,
            x_min,
            x_max,
            y_bins,
            y_min,
            y_max,
            contents: vec![0.0; (x_bins + 2) * (y_bins + 2)],
            entries: 0,
            annotations: Vec::new(),
        }
    }

    fn axis_bin(v: f64, n: usize, min: f64, max: f64) -> usize {
        if v < min {
            0
        } else if v >= max {
            n + 1
        } else {
            (((v - min) / ((max - min) / n as f64)) as usize + 1).min(n)
        }
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        let ix = Self::axis_bin(x, self.x_bins, self.x_min, self.x_max);
        let iy = Self::axis_bin(y, self.y_bins, self.y_min, self.y_max);
        self.contents[iy * (self.x_bins + 2) + ix] += 1.0;
        self.entries += 1;
    }

    pub fn bin_content(&self, ix: usize, iy: usize) -> f64 {
        if ix > self.x_bins + 1 || iy > self.y_bins + 1 {
            return 0.0;
        }
        self.contents[iy * (self.x_bins + 2) + ix]
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn reset(&mut self) {
        self.contents.iter_mut().for_each(|c| *c = 0.0);
        self.entries = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Histogram1D(Histogram1D),
    Histogram2D(Histogram2D),
    Text {
        name: String,
        text: String,
    },
    Opaque {
        name: String,
        class_name: String,
        bytes: Vec<u8>,
    },
}

impl Payload {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Payload::Text {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn opaque(name: impl Into<String>, class_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Payload::Opaque {
            name: name.into(),
            class_name: class_name.into(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Payload::Histogram1D(h) => &h.name,
            Payload::Histogram2D(h) => &h.name,
            Payload::Text { name, .. } | Payload::Opaque { name, .. } => name,
        }
    }

    /// Runtime class name used for checker type compatibility.
    pub fn class_name(&self) -> &str {
        match self {
            Payload::Histogram1D(_) => "TH1F",
            Payload::Histogram2D(_) => "TH2F",
            Payload::Text { .. } => "TObjString",
            Payload::Opaque { class_name, .. } => class_name,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn as_histogram1d(&self) -> Option<&Histogram1D> {
        match self {
            Payload::Histogram1D(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_histogram1d_mut(&mut self) -> Option<&mut Histogram1D> {
        match self {
            Payload::Histogram1D(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_histogram2d(&self) -> Option<&Histogram2D> {
        match self {
            Payload::Histogram2D(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_histogram2d_mut(&mut self) -> Option<&mut Histogram2D> {
        match self {
            Payload::Histogram2D(h) => Some(h),
            _ => None,
        }
    }

    /// Clear accumulated content; opaque payloads are left untouched.
    pub fn reset(&mut self) {
        match self {
            Payload::Histogram1D(h) => h.reset(),
            Payload::Histogram2D(h) => h.reset(),
            Payload::Text { text, .. } => text.clear(),
            Payload::Opaque { .. } => {}
        }
    }
}

impl From<Histogram1D> for Payload {
    fn from(h: Histogram1D) -> Self {
        Payload::Histogram1D(h)
    }
}

impl From<Histogram2D> for Payload {
    fn from(h: Histogram2D) -> Self {
        Payload::Histogram2D(h)
    }
}
