//! Runtime parameters shared between the input handler and the producer.
//!
//! Each value is its own atomic cell. The producer reads them once per block and
//! there is no consistency between cells beyond "as of sometime recently".

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::{Error, Result, DEFAULT_FREQ_MHZ, DEFAULT_INTENSITY};

// Exposure step for a single key press
pub const EXPOSURE_STEP: f32 = 0.01;
// Retune steps in MHz
pub const FINE_STEP_MHZ: f64 = 0.1;
pub const COARSE_STEP_MHZ: f64 = 10.0;

/// Round a frequency to the nearest 0.1 MHz
pub fn round_freq_mhz(mhz: f64) -> f64 {
    (mhz * 10.0).round() / 10.0
}

/// Frequency in MHz to the integer Hz the receiver takes.
/// Fails for frequencies that are not positive or don't fit in a `u32`.
pub fn mhz_to_hz(mhz: f64) -> Result<u32> {
    let hz = (mhz * 1e6).round();
    if !hz.is_finite() || hz <= 0.0 || hz > f64::from(u32::MAX) {
        return Err(Error::InvalidArgument(format!(
            "frequency {mhz} MHz not representable in Hz"
        )));
    }
    Ok(hz as u32)
}

#[derive(Debug)]
pub struct RuntimeParams {
    paused: AtomicBool,
    // f32 bits
    intensity: AtomicU32,
    // f64 bits, already rounded
    freq_mhz: AtomicU64,
    // How many more raw blocks the producer should hand to the capture ring
    capture_remaining: AtomicUsize,
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self::new(DEFAULT_FREQ_MHZ, DEFAULT_INTENSITY)
    }
}

impl RuntimeParams {
    pub fn new(freq_mhz: f64, intensity: f32) -> Self {
        Self {
            paused: AtomicBool::new(false),
            intensity: AtomicU32::new(intensity.to_bits()),
            freq_mhz: AtomicU64::new(round_freq_mhz(freq_mhz).to_bits()),
            capture_remaining: AtomicUsize::new(0),
        }
    }

    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    /// Flip the paused flag, returning the new state
    pub fn toggle_paused(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn intensity(&self) -> f32 {
        f32::from_bits(self.intensity.load(Ordering::Relaxed))
    }

    pub fn set_intensity(&self, intensity: f32) {
        self.intensity.store(intensity.to_bits(), Ordering::Relaxed);
    }

    /// Nudge the per-sample exposure increment, returning the new value.
    /// Negative increments are allowed, the folded cells clamp at zero.
    pub fn adjust_intensity(&self, delta: f32) -> f32 {
        let mut current = self.intensity.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + delta).to_bits();
            match self.intensity.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return f32::from_bits(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// The most recently requested center frequency in MHz
    pub fn freq_mhz(&self) -> f64 {
        f64::from_bits(self.freq_mhz.load(Ordering::Acquire))
    }

    /// Request a new center frequency, returning the rounded value
    pub fn set_freq_mhz(&self, mhz: f64) -> f64 {
        let rounded = round_freq_mhz(mhz);
        self.freq_mhz.store(rounded.to_bits(), Ordering::Release);
        rounded
    }

    /// Arm the capture of the next `blocks` processed blocks
    pub fn request_capture(&self, blocks: usize) {
        self.capture_remaining.store(blocks, Ordering::Relaxed);
    }

    /// Claim one block of an armed capture, false when none is pending
    pub fn take_capture_slot(&self) -> bool {
        self.capture_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn capture_pending(&self) -> usize {
        self.capture_remaining.load(Ordering::Relaxed)
    }
}
