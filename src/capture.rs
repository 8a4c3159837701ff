//! This module contains the acquisition side: where raw IQ blocks come from.
//!
//! The receiver is only ever seen through [`IqSource`]: a blocking read of one block
//! of interleaved unsigned 8-bit I/Q bytes, and a retune command.

use std::{
    f64::consts::TAU,
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use tracing::{debug, info};

use crate::{Error, Result, SAMPLE_RATE};

pub trait IqSource: Send {
    /// Block until `buf` holds a full block, returning the number of bytes read.
    /// Anything less than `buf.len()` is treated as a lost block by the caller.
    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Tune the receiver, in Hz
    fn set_center_freq(&mut self, hz: u32) -> Result<()>;

    fn name(&self) -> &str;
}

/// Replays a raw `cu8` recording, rewinding at the end of the file
pub struct FileSource {
    path: PathBuf,
    reader: BufReader<File>,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>, block_length: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len < block_length as u64 {
            return Err(Error::InvalidArgument(format!(
                "{} holds {len} bytes, less than one {block_length} byte block",
                path.display()
            )));
        }
        info!("Replaying IQ from {} ({len} bytes)", path.display());
        Ok(Self {
            path,
            reader: BufReader::with_capacity(1 << 20, file),
        })
    }

    fn hw_err(&self, e: std::io::Error) -> Error {
        Error::HardwareFailure(format!("read from {}: {e}", self.path.display()))
    }
}

impl IqSource for FileSource {
    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        let mut rewound = false;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..]).map_err(|e| self.hw_err(e))?;
            if n == 0 {
                // A second EOF in a row means the file shrank underneath us
                if rewound {
                    break;
                }
                self.reader
                    .seek(SeekFrom::Start(0))
                    .map_err(|e| self.hw_err(e))?;
                rewound = true;
                continue;
            }
            rewound = false;
            filled += n;
        }
        Ok(filled)
    }

    fn set_center_freq(&mut self, hz: u32) -> Result<()> {
        debug!("Ignoring retune to {hz} Hz on a recording");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

// Tuning range of an R820T tuner
pub const TUNER_MIN_HZ: u32 = 24_000_000;
pub const TUNER_MAX_HZ: u32 = 1_766_000_000;
// Peak deviation from the 127.5 midpoint
const TONE_AMPLITUDE: f64 = 100.0;

/// Synthesizes a single carrier at a fixed absolute frequency.
///
/// Tuned within half the sample rate of the carrier the constellation is a ring,
/// otherwise the receiver sees nothing and every sample sits at the midpoint.
pub struct ToneSource {
    tone_hz: f64,
    center_hz: f64,
    phase: f64,
    paced: bool,
}

impl ToneSource {
    pub fn new(tone_mhz: f64, center_mhz: f64) -> Self {
        Self {
            tone_hz: tone_mhz * 1e6,
            center_hz: center_mhz * 1e6,
            phase: 0.0,
            paced: false,
        }
    }

    /// Sleep for the block's air time on every read, like a real receiver
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    fn quantize(v: f64) -> u8 {
        (127.5 + v).round().clamp(0.0, 255.0) as u8
    }
}

impl IqSource for ToneSource {
    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize> {
        let offset = self.tone_hz - self.center_hz;
        let in_band = offset.abs() < SAMPLE_RATE as f64 / 2.0;
        let step = TAU * offset / SAMPLE_RATE as f64;
        for pair in buf.chunks_exact_mut(2) {
            let (i, q) = if in_band {
                (
                    TONE_AMPLITUDE * self.phase.cos(),
                    TONE_AMPLITUDE * self.phase.sin(),
                )
            } else {
                (0.0, 0.0)
            };
            pair[0] = Self::quantize(i);
            pair[1] = Self::quantize(q);
            self.phase = (self.phase + step) % TAU;
        }
        if self.paced {
            let samples = (buf.len() / 2) as u64;
            thread::sleep(Duration::from_micros(
                samples * 1_000_000 / SAMPLE_RATE as u64,
            ));
        }
        Ok(buf.len())
    }

    fn set_center_freq(&mut self, hz: u32) -> Result<()> {
        if !(TUNER_MIN_HZ..=TUNER_MAX_HZ).contains(&hz) {
            return Err(Error::HardwareFailure(format!(
                "center frequency {hz} Hz outside tuner range"
            )));
        }
        self.center_hz = f64::from(hz);
        Ok(())
    }

    fn name(&self) -> &str {
        "tone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use crate::params::mhz_to_hz;

    #[test]
    fn test_file_source_rewinds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5, 6]).unwrap();
        file.flush().unwrap();
        let mut source = FileSource::open(file.path(), 4).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(source.read_block(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(source.read_block(&mut buf).unwrap(), 4);
        assert_eq!(buf, [5, 6, 1, 2]);
    }

    #[test]
    fn test_file_source_too_short() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1, 2]).unwrap();
        file.flush().unwrap();
        assert!(matches!(
            FileSource::open(file.path(), 4),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_tone_in_band_is_a_ring() {
        let mut source = ToneSource::new(100.25, 100.0);
        let mut buf = vec![0u8; 4096];
        assert_eq!(source.read_block(&mut buf).unwrap(), 4096);
        for pair in buf.chunks_exact(2) {
            let i = pair[0] as f64 - 127.5;
            let q = pair[1] as f64 - 127.5;
            let r = (i * i + q * q).sqrt();
            assert!((r - TONE_AMPLITUDE).abs() < 1.5, "radius {r}");
        }
    }

    #[test]
    fn test_tone_out_of_band_is_silent() {
        let mut source = ToneSource::new(100.25, 100.0);
        source.set_center_freq(mhz_to_hz(300.0).unwrap()).unwrap();
        let mut buf = vec![0u8; 64];
        source.read_block(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 128));
    }

    #[test]
    fn test_tone_rejects_out_of_range() {
        let mut source = ToneSource::new(100.25, 100.0);
        assert!(matches!(
            source.set_center_freq(mhz_to_hz(2000.0).unwrap()),
            Err(Error::HardwareFailure(_))
        ));
    }
}
