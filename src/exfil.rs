//! This module is responsible for getting data out of the running session and onto disk
//!
//! Files are raw element bytes with no header: `.cu8` captures are interleaved I/Q
//! bytes, `.gray` snapshots are 256x256 row-major 8-bit pixels.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};
use tracing::info;

use crate::{
    buffer::{SampleBuffer, SampleKind},
    histogram::Histogram,
    Result,
};

/// Convert a chrono DateTime into a filename-safe timestamp
pub fn file_timestamp(time: &DateTime<Utc>) -> String {
    format!(
        "{}{:02}{:02}T{:02}{:02}{:02}",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}

/// Collects raw blocks drained from the capture ring and writes them out once
/// `blocks` of them are in
pub struct CaptureWriter {
    dir: PathBuf,
    blocks: usize,
    collected: usize,
    buffer: Option<SampleBuffer>,
}

impl CaptureWriter {
    pub fn new(dir: impl Into<PathBuf>, blocks: usize) -> Self {
        Self {
            dir: dir.into(),
            blocks,
            collected: 0,
            buffer: None,
        }
    }

    /// Blocks waiting to be written
    pub fn collected(&self) -> usize {
        self.collected
    }

    /// Add a block, returning the written path when this completes a capture
    pub fn push(&mut self, block: &[u8]) -> Result<Option<PathBuf>> {
        let chunk = SampleBuffer::new(block.len() / 2, 2, block)?;
        match self.buffer.as_mut() {
            Some(buffer) => buffer.append(&chunk)?,
            None => self.buffer = Some(chunk),
        }
        self.collected += 1;
        if self.collected >= self.blocks {
            return self.flush();
        }
        Ok(None)
    }

    /// Write whatever has been collected so far
    pub fn flush(&mut self) -> Result<Option<PathBuf>> {
        let buffer = match self.buffer.take() {
            Some(b) => b,
            None => return Ok(None),
        };
        self.collected = 0;
        let path = self
            .dir
            .join(format!("iq-{}.cu8", file_timestamp(&Utc::now())));
        buffer.save(&path)?;
        info!(
            "Captured {} IQ samples to {}",
            buffer.len(),
            path.display()
        );
        Ok(Some(path))
    }
}

/// Save a grid as an 8-bit grayscale image, returning the written path
pub fn save_density(hist: &Histogram, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let path = dir
        .as_ref()
        .join(format!("density-{}.gray", file_timestamp(&Utc::now())));
    hist.to_buffer()?.convert(SampleKind::U8).save(&path)?;
    info!("Saved density snapshot to {}", path.display());
    Ok(path)
}
