//! The accumulation pipeline.
//!
//! One producer thread reads blocks from an [`IqSource`] and folds each one into the
//! density grid, publishing the grid once the whole block is in. The display side
//! only ever talks to [`Pipeline`]: it takes snapshots of the published grid and
//! forwards user commands, which land in [`RuntimeParams`].
//!
//! A receiver failure (rejected retune, short read, read error) ends the producer.
//! The pipeline then stays faulted: snapshots and retunes return the failure, and
//! [`Pipeline::stop`] hands it back to the owner.

use std::{
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::{
    capture::IqSource,
    histogram::{Histogram, SharedHistogram},
    params::{mhz_to_hz, round_freq_mhz, RuntimeParams, COARSE_STEP_MHZ, FINE_STEP_MHZ},
    Error, Result, BLOCK_LENGTH,
};

/// Raw blocks handed from the producer to the capture writer
pub type CapturedBlock = Vec<u8>;

/// Producer-side state: folds raw blocks and publishes the result
pub struct Accumulator {
    back: Histogram,
    shared: Arc<SharedHistogram>,
    params: Arc<RuntimeParams>,
    capture: Option<rtrb::Producer<CapturedBlock>>,
    dropped: usize,
}

impl Accumulator {
    pub fn new(shared: Arc<SharedHistogram>, params: Arc<RuntimeParams>) -> Self {
        Self {
            back: Histogram::new(),
            shared,
            params,
            capture: None,
            dropped: 0,
        }
    }

    pub fn with_capture(mut self, producer: rtrb::Producer<CapturedBlock>) -> Self {
        self.capture = Some(producer);
        self
    }

    /// Handle one raw block of interleaved IQ bytes.
    ///
    /// While paused the block is discarded. Otherwise the grid is cleared, the block
    /// folded in with the current intensity and the grid published, so each frame
    /// shows the density of exactly one block. Returns whether the block was used.
    pub fn on_block(&mut self, block: &[u8]) -> bool {
        if self.params.paused() {
            return false;
        }
        let intensity = self.params.intensity();
        self.back.clear();
        self.back.fold(block, intensity);
        self.shared.publish(&mut self.back);
        self.capture_block(block);
        true
    }

    fn capture_block(&mut self, block: &[u8]) {
        let producer = match self.capture.as_mut() {
            Some(p) => p,
            None => return,
        };
        if !self.params.take_capture_slot() {
            return;
        }
        if producer.push(block.to_vec()).is_err() {
            self.dropped += 1;
            warn!(dropped = self.dropped, "Capture ring full, dropping block");
        }
    }

    /// Captured blocks lost to a full ring
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bytes per block, must be a non-zero number of IQ pairs
    pub block_length: usize,
    /// Capture ring capacity in blocks
    pub capture_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            block_length: BLOCK_LENGTH,
            capture_capacity: 256,
        }
    }
}

enum State {
    Idle,
    Running {
        stop: Arc<AtomicBool>,
        handle: JoinHandle<Result<()>>,
    },
}

pub struct Pipeline {
    config: PipelineConfig,
    params: Arc<RuntimeParams>,
    shared: Arc<SharedHistogram>,
    fault: Arc<Mutex<Option<String>>>,
    capture_rx: Option<rtrb::Consumer<CapturedBlock>>,
    state: State,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, params: Arc<RuntimeParams>) -> Result<Self> {
        if config.block_length == 0 || config.block_length % 2 != 0 {
            return Err(Error::InvalidArgument(format!(
                "block length must be a non-zero even number of bytes, got {}",
                config.block_length
            )));
        }
        if config.capture_capacity == 0 {
            return Err(Error::InvalidArgument(
                "capture ring capacity must be at least one block".to_owned(),
            ));
        }
        Ok(Self {
            config,
            params,
            shared: Arc::new(SharedHistogram::new()),
            fault: Arc::new(Mutex::new(None)),
            capture_rx: None,
            state: State::Idle,
        })
    }

    pub fn params(&self) -> &Arc<RuntimeParams> {
        &self.params
    }

    pub fn is_running(&self) -> bool {
        match &self.state {
            State::Idle => false,
            State::Running { handle, .. } => !handle.is_finished(),
        }
    }

    /// The receiver failure that ended acquisition, if any
    pub fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }

    fn check_fault(&self) -> Result<()> {
        match self.fault() {
            Some(cause) => Err(Error::HardwareFailure(cause)),
            None => Ok(()),
        }
    }

    /// Spawn the producer on `source`. Fails with `InvalidState` if already running.
    pub fn start<S: IqSource + 'static>(&mut self, source: S) -> Result<()> {
        if let State::Running { .. } = self.state {
            return Err(Error::InvalidState("pipeline already running".to_owned()));
        }
        *self.fault.lock() = None;

        let (capture_tx, capture_rx) = rtrb::RingBuffer::new(self.config.capture_capacity);
        self.capture_rx = Some(capture_rx);
        let accumulator =
            Accumulator::new(self.shared.clone(), self.params.clone()).with_capture(capture_tx);

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let params = self.params.clone();
        let fault = self.fault.clone();
        let block_length = self.config.block_length;
        info!("Starting acquisition from {} source", source.name());
        let handle = thread::Builder::new()
            .name("producer".to_owned())
            .spawn(move || {
                let res = produce(source, accumulator, &params, &thread_stop, block_length);
                if let Err(e) = &res {
                    error!("Acquisition failed: {e}");
                    *fault.lock() = Some(e.to_string());
                }
                res
            })?;
        self.state = State::Running { stop, handle };
        Ok(())
    }

    /// Signal the producer, wait for the block in flight and return to idle.
    /// Returns the failure that ended acquisition, if there was one. No-op when idle.
    pub fn stop(&mut self) -> Result<()> {
        let (stop, handle) = match mem::replace(&mut self.state, State::Idle) {
            State::Idle => return Ok(()),
            State::Running { stop, handle } => (stop, handle),
        };
        stop.store(true, Ordering::Release);
        let res = handle
            .join()
            .map_err(|_| Error::HardwareFailure("producer thread panicked".to_owned()))?;
        info!("Acquisition stopped");
        res
    }

    /// Copy the latest complete grid into `out`, returning its generation.
    /// Refuses once acquisition has failed.
    pub fn snapshot(&self, out: &mut Histogram) -> Result<u64> {
        self.check_fault()?;
        Ok(self.shared.snapshot_into(out))
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation()
    }

    /// Flip pause, returning whether the pipeline is now paused
    pub fn toggle_pause(&self) -> bool {
        let paused = self.params.toggle_paused();
        info!(paused, "Pause toggled");
        paused
    }

    pub fn adjust_exposure(&self, delta: f32) -> f32 {
        let intensity = self.params.adjust_intensity(delta);
        info!("Intensity: {intensity:.2}");
        intensity
    }

    /// Request a new center frequency, rounded to 0.1 MHz. The producer applies it
    /// before its next read. Frequencies the receiver can't be handed in Hz are
    /// refused with `InvalidArgument` and leave the current one in place.
    pub fn set_frequency(&self, mhz: f64) -> Result<f64> {
        self.check_fault()?;
        mhz_to_hz(round_freq_mhz(mhz))?;
        Ok(self.params.set_freq_mhz(mhz))
    }

    /// Move the center frequency by `steps` fine (0.1 MHz) or coarse (10 MHz) steps
    pub fn retune(&self, steps: i32, coarse: bool) -> Result<f64> {
        let step = if coarse { COARSE_STEP_MHZ } else { FINE_STEP_MHZ };
        self.set_frequency(self.params.freq_mhz() + f64::from(steps) * step)
    }

    /// Arm a raw capture of the next `blocks` processed blocks
    pub fn request_capture(&self, blocks: usize) {
        self.params.request_capture(blocks);
    }

    /// Next captured block waiting in the ring
    pub fn pop_captured(&mut self) -> Option<CapturedBlock> {
        self.capture_rx.as_mut()?.pop().ok()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// The producer loop: apply retunes, read a block, fold it, until told to stop
fn produce<S: IqSource>(
    mut source: S,
    mut accumulator: Accumulator,
    params: &RuntimeParams,
    stop: &AtomicBool,
    block_length: usize,
) -> Result<()> {
    let mut block = vec![0u8; block_length];
    let mut tuned = params.freq_mhz();
    source.set_center_freq(mhz_to_hz(tuned)?)?;
    info!("Tuned to {tuned:.1} MHz");
    while !stop.load(Ordering::Acquire) {
        let requested = params.freq_mhz();
        if requested != tuned {
            info!("Setting freq to {requested:.1} MHz");
            source.set_center_freq(mhz_to_hz(requested)?)?;
            tuned = requested;
        }
        let n = source.read_block(&mut block)?;
        if n < block_length {
            return Err(Error::HardwareFailure(format!(
                "short read of {n}/{block_length} bytes, samples lost"
            )));
        }
        accumulator.on_block(&block);
    }
    Ok(())
}
