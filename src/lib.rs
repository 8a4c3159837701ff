pub mod args;
pub mod buffer;
pub mod capture;
pub mod complex;
pub mod error;
pub mod exfil;
pub mod histogram;
pub mod monitoring;
pub mod params;
pub mod pipeline;

pub use error::{Error, Result};

// Both IQ components are 8-bit, so the grid covers every possible pair
pub const GRID_SIDE: usize = 256;
pub const GRID_CELLS: usize = GRID_SIDE * GRID_SIDE;
// Exposure is clamped to the range of an 8-bit pixel
pub const MAX_EXPOSURE: f32 = 255.0;

/// Bytes per block handed over by the receiver (16 USB transfers of 16 KiB)
pub const BLOCK_LENGTH: usize = 16 * 16384;
/// Receiver sample rate in Hz
pub const SAMPLE_RATE: u32 = 2_000_000;

pub const DEFAULT_FREQ_MHZ: f64 = 124.2;
pub const DEFAULT_INTENSITY: f32 = 0.03;
