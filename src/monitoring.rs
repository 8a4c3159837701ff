//! In this module, we implement the display side of a frame: statistics over a
//! grid snapshot and the sink each snapshot is presented to.

use tracing::debug;

use crate::{histogram::Histogram, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    /// Cells with non-zero exposure
    pub occupied: usize,
    pub peak: f32,
    pub total: f64,
}

impl FrameStats {
    pub fn from_histogram(hist: &Histogram) -> Self {
        hist.cells()
            .iter()
            .filter(|&&v| v > 0.0)
            .fold(Self::default(), |acc, &v| Self {
                occupied: acc.occupied + 1,
                peak: acc.peak.max(v),
                total: acc.total + f64::from(v),
            })
    }
}

/// Where completed frames go once per display tick (a texture upload, in a windowed build)
pub trait FrameSink {
    fn present(&mut self, generation: u64, frame: &Histogram) -> Result<()>;
}

/// Headless sink, logs the statistics of every new frame
#[derive(Debug, Default)]
pub struct LogSink {
    last_generation: u64,
    frames: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct frames presented so far
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for LogSink {
    fn present(&mut self, generation: u64, frame: &Histogram) -> Result<()> {
        if generation == self.last_generation {
            return Ok(());
        }
        let skipped = generation.saturating_sub(self.last_generation + 1);
        self.last_generation = generation;
        self.frames += 1;
        let stats = FrameStats::from_histogram(frame);
        debug!(
            generation,
            skipped,
            occupied = stats.occupied,
            peak = stats.peak,
            total = stats.total,
            "Frame"
        );
        Ok(())
    }
}
