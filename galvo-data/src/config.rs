use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Evenly spaced positions along one mirror axis, in normalized
/// deflection units (clamped to [-1, 1] by the encoder).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisSweep {
    pub start: f64,
    pub end: f64,
    pub points: usize,
}

impl AxisSweep {
    pub fn new(start: f64, end: f64, points: usize) -> AxisSweep {
        AxisSweep { start, end, points }
    }

    /// Position of grid index `i`. A single-point sweep stays at `start`.
    pub fn position(&self, i: usize) -> f64 {
        if self.points < 2 {
            return self.start;
        }
        let step = (self.end - self.start) / ((self.points - 1) as f64);
        self.start + (i as f64) * step
    }

    pub fn positions(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.points).map(|i| self.position(i))
    }
}

/// Order in which the sweep visits grid cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SweepPattern {
    /// Every row left to right.
    Raster,
    /// Alternate rows reversed; the orchestrator flips odd rows of the
    /// grid back after extraction.
    Serpentine,
}

/// Immutable parameters of one scan. Created at `start()`, discarded when
/// the scan ends.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScanConfig {
    pub x: AxisSweep,
    pub y: AxisSweep,
    /// Settle time after each position frame before advancing.
    pub dwell: Duration,
    /// Samples past a trigger edge at which the analog value is taken as
    /// representative of the pixel.
    pub sample_offset: usize,
    pub pattern: SweepPattern,
    /// Digitizer sample spacing in microseconds.
    pub sample_interval_us: u32,
}

impl ScanConfig {
    pub fn point_count(&self) -> usize {
        self.x.points * self.y.points
    }

    pub fn rows(&self) -> usize {
        self.y.points
    }

    pub fn cols(&self) -> usize {
        self.x.points
    }
}
