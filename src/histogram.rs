//! The 256x256 density grid and its hand-off between the producer and the display.
//!
//! The producer folds every block into a private back grid and then swaps it with the
//! published front grid under a lock. The display copies the front grid out under the
//! same lock, so it only ever sees complete blocks.

use std::{
    mem,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;

use crate::{buffer::SampleBuffer, complex::IqByte, Result, GRID_CELLS, MAX_EXPOSURE};

/// Row-major grid of exposure values in `[0, MAX_EXPOSURE]`
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    cells: Box<[f32]>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            cells: vec![0f32; GRID_CELLS].into_boxed_slice(),
        }
    }

    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    /// Exposure of one cell, `None` outside the grid
    pub fn cell(&self, index: usize) -> Option<f32> {
        self.cells.get(index).copied()
    }

    pub fn clear(&mut self) {
        self.cells.fill(0.0);
    }

    /// Expose the cell addressed by every IQ pair in `block` at `intensity`,
    /// clamped to `[0, MAX_EXPOSURE]`. Repeated hits on a cell don't compound, so
    /// the grid shows which cells the block occupied. A trailing odd byte is ignored.
    pub fn fold(&mut self, block: &[u8], intensity: f32) {
        let exposure = intensity.clamp(0.0, MAX_EXPOSURE);
        for pair in block.chunks_exact(2) {
            self.cells[IqByte::from_pair(pair).cell_index()] = exposure;
        }
    }

    /// Copy of the grid as a single channel `f64` sample buffer
    pub fn to_buffer(&self) -> Result<SampleBuffer> {
        let wide: Vec<f64> = self.cells.iter().map(|&v| f64::from(v)).collect();
        SampleBuffer::new(GRID_CELLS, 1, &wide)
    }
}

/// The published grid, written by the producer and read by the display
#[derive(Debug, Default)]
pub struct SharedHistogram {
    front: Mutex<Histogram>,
    generation: AtomicU64,
}

impl SharedHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a completed grid. `back` receives the previously published one.
    pub fn publish(&self, back: &mut Histogram) {
        let mut front = self.front.lock();
        mem::swap(&mut *front, back);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Copy the latest published grid into `out`, returning its generation
    pub fn snapshot_into(&self, out: &mut Histogram) -> u64 {
        let front = self.front.lock();
        out.cells.copy_from_slice(&front.cells);
        self.generation.load(Ordering::Acquire)
    }

    /// Number of grids published so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLOCK_LENGTH;
    use approx::assert_relative_eq;

    #[test]
    fn test_fold_single_pair() {
        let mut hist = Histogram::new();
        hist.fold(&[10, 20], 0.03);
        assert_relative_eq!(hist.cell(20 * 256 + 10).unwrap(), 0.03);
        let lit = hist.cells().iter().filter(|&&v| v != 0.0).count();
        assert_eq!(lit, 1);
    }

    #[test]
    fn test_fold_repeated_pair_does_not_compound() {
        let mut hist = Histogram::new();
        let block: Vec<u8> = [10u8, 20].repeat(BLOCK_LENGTH / 2);
        hist.fold(&block, 0.03);
        assert_relative_eq!(hist.cell(20 * 256 + 10).unwrap(), 0.03);
        assert_eq!(hist.cells().iter().filter(|&&v| v != 0.0).count(), 1);
    }

    #[test]
    fn test_fold_clamps() {
        let mut hist = Histogram::new();
        hist.fold(&[1, 2, 1, 2, 1, 2], 300.0);
        assert_eq!(hist.cell(2 * 256 + 1).unwrap(), MAX_EXPOSURE);
        hist.fold(&[1, 2], 255.0);
        assert_eq!(hist.cell(2 * 256 + 1).unwrap(), MAX_EXPOSURE);
        hist.fold(&[3, 4], -5.0);
        assert_eq!(hist.cell(4 * 256 + 3).unwrap(), 0.0);
    }

    #[test]
    fn test_cell_out_of_grid() {
        let hist = Histogram::new();
        assert_eq!(hist.cell(GRID_CELLS - 1), Some(0.0));
        assert_eq!(hist.cell(GRID_CELLS), None);
    }

    #[test]
    fn test_fold_ignores_odd_tail() {
        let mut hist = Histogram::new();
        hist.fold(&[0, 0, 7], 1.0);
        assert_eq!(hist.cell(0).unwrap(), 1.0);
        assert_eq!(hist.cells().iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_publish_swaps() {
        let shared = SharedHistogram::new();
        let mut back = Histogram::new();
        back.fold(&[255, 255], 1.0);
        shared.publish(&mut back);
        assert_eq!(shared.generation(), 1);
        // Back now holds the old, empty front
        assert_eq!(back.cell(65535).unwrap(), 0.0);

        let mut out = Histogram::new();
        assert_eq!(shared.snapshot_into(&mut out), 1);
        assert_eq!(out.cell(65535).unwrap(), 1.0);
    }

    #[test]
    fn test_to_buffer() {
        let mut hist = Histogram::new();
        hist.fold(&[1, 0], 2.5);
        let buf = hist.to_buffer().unwrap();
        assert_eq!(buf.len(), GRID_CELLS);
        assert_eq!(buf.get::<f64>(1).unwrap(), 2.5);
    }
}
