//! A tagged container of interleaved numeric samples.
//!
//! Used as the wire representation of captured IQ blocks and as the general
//! numeric-array type whenever sample data has to be held, copied or converted
//! outside of the per-sample accumulation loop.

use std::{io::Write, path::Path};

use byte_slice_cast::AsByteSlice;
use num_traits::{NumCast, ToPrimitive};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    U8,
    F64,
}

impl SampleKind {
    /// Width of one element in bytes
    pub fn size_of(self) -> usize {
        match self {
            SampleKind::U8 => std::mem::size_of::<u8>(),
            SampleKind::F64 => std::mem::size_of::<f64>(),
        }
    }
}

/// Owned storage for one of the two element representations
#[derive(Clone, Debug, PartialEq)]
pub enum SampleData {
    U8(Vec<u8>),
    F64(Vec<f64>),
}

impl SampleData {
    pub fn kind(&self) -> SampleKind {
        match self {
            SampleData::U8(_) => SampleKind::U8,
            SampleData::F64(_) => SampleKind::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleData::U8(v) => v.len(),
            SampleData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn truncated(&self, n: usize) -> Self {
        match self {
            SampleData::U8(v) => SampleData::U8(v[..n].to_vec()),
            SampleData::F64(v) => SampleData::F64(v[..n].to_vec()),
        }
    }
}

/// Element types a [`SampleBuffer`] can hold
pub trait Element: Copy + ToPrimitive + NumCast + 'static {
    const KIND: SampleKind;

    fn wrap(data: Vec<Self>) -> SampleData;
    fn slice(data: &SampleData) -> Option<&[Self]>;
    fn slice_mut(data: &mut SampleData) -> Option<&mut [Self]>;
}

impl Element for u8 {
    const KIND: SampleKind = SampleKind::U8;

    fn wrap(data: Vec<Self>) -> SampleData {
        SampleData::U8(data)
    }

    fn slice(data: &SampleData) -> Option<&[Self]> {
        match data {
            SampleData::U8(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn slice_mut(data: &mut SampleData) -> Option<&mut [Self]> {
        match data {
            SampleData::U8(v) => Some(v.as_mut_slice()),
            _ => None,
        }
    }
}

impl Element for f64 {
    const KIND: SampleKind = SampleKind::F64;

    fn wrap(data: Vec<Self>) -> SampleData {
        SampleData::F64(data)
    }

    fn slice(data: &SampleData) -> Option<&[Self]> {
        match data {
            SampleData::F64(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    fn slice_mut(data: &mut SampleData) -> Option<&mut [Self]> {
        match data {
            SampleData::F64(v) => Some(v.as_mut_slice()),
            _ => None,
        }
    }
}

/// Narrow a float to a byte, clamping to [0, 255] and truncating. NaN maps to 0.
fn saturate(v: f64) -> u8 {
    num_traits::cast(v.clamp(0.0, 255.0)).unwrap_or(0)
}

/// `length` frames of `channels` interleaved elements of a single [`SampleKind`].
///
/// Cloning produces a deep copy with independent storage.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    length: usize,
    channels: usize,
    data: SampleData,
}

impl SampleBuffer {
    /// Copy `length * channels` elements out of `source` into a new buffer
    pub fn new<T: Element>(length: usize, channels: usize, source: &[T]) -> Result<Self> {
        if channels < 1 {
            return Err(Error::InvalidArgument(format!(
                "channel count must be at least 1, got {channels}"
            )));
        }
        let n = length.checked_mul(channels).ok_or_else(|| {
            Error::InvalidArgument(format!("{length} frames of {channels} channels overflows"))
        })?;
        if source.len() < n {
            return Err(Error::InvalidArgument(format!(
                "source holds {} elements, {n} required",
                source.len()
            )));
        }
        Ok(Self {
            length,
            channels,
            data: T::wrap(source[..n].to_vec()),
        })
    }

    pub fn kind(&self) -> SampleKind {
        self.data.kind()
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn byte_size(&self) -> usize {
        self.length * self.channels * self.kind().size_of()
    }

    pub fn data(&self) -> &SampleData {
        &self.data
    }

    /// Typed view of the elements, `None` if `T` isn't this buffer's kind
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::slice(&self.data)
    }

    /// Raw element bytes in native endianness
    pub fn as_bytes(&self) -> &[u8] {
        match &self.data {
            SampleData::U8(v) => v.as_byte_slice(),
            SampleData::F64(v) => v.as_byte_slice(),
        }
    }

    /// New buffer holding the first `round(len * percentage)` frames
    pub fn reduce(&self, percentage: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&percentage) {
            return Err(Error::InvalidArgument(format!(
                "percentage must be within [0, 1], got {percentage}"
            )));
        }
        let length = ((self.length as f64 * percentage).round() as usize).min(self.length);
        Ok(Self {
            length,
            channels: self.channels,
            data: self.data.truncated(length * self.channels),
        })
    }

    /// New buffer with every element converted to `kind`.
    ///
    /// Bytes widen to floats unchanged (0..=255). Floats narrow by clamping to
    /// [0, 255] and truncating.
    pub fn convert(&self, kind: SampleKind) -> Self {
        let data = match (&self.data, kind) {
            (SampleData::U8(v), SampleKind::F64) => {
                SampleData::F64(v.iter().map(|&x| <f64 as From<u8>>::from(x)).collect())
            }
            (SampleData::F64(v), SampleKind::U8) => {
                SampleData::U8(v.iter().map(|&x| saturate(x)).collect())
            }
            (data, _) => data.clone(),
        };
        Self {
            length: self.length,
            channels: self.channels,
            data,
        }
    }

    fn check_offset(&self, offset: usize) -> Result<()> {
        let len = self.data.len();
        if offset >= len {
            return Err(Error::OutOfRange { offset, len });
        }
        Ok(())
    }

    /// Element at a flat interleaved index; `T` must match the buffer's kind
    pub fn get<T: Element>(&self, offset: usize) -> Result<T> {
        self.check_offset(offset)?;
        let slice = T::slice(&self.data).ok_or(Error::TypeMismatch {
            expected: self.kind(),
            found: T::KIND,
        })?;
        Ok(slice[offset])
    }

    /// Element at a flat interleaved index, widened to `f64` whatever the kind
    pub fn get_f64(&self, offset: usize) -> Result<f64> {
        self.check_offset(offset)?;
        let v = match &self.data {
            SampleData::U8(v) => v[offset].to_f64(),
            SampleData::F64(v) => Some(v[offset]),
        };
        Ok(v.unwrap_or_default())
    }

    pub fn set<T: Element>(&mut self, offset: usize, value: T) -> Result<()> {
        self.check_offset(offset)?;
        let kind = self.kind();
        let slice = T::slice_mut(&mut self.data).ok_or(Error::TypeMismatch {
            expected: kind,
            found: T::KIND,
        })?;
        slice[offset] = value;
        Ok(())
    }

    /// Replace this buffer's contents (shape included) with a copy of `src`'s
    pub fn set_data(&mut self, src: &SampleBuffer) -> Result<()> {
        if self.kind() != src.kind() {
            return Err(Error::TypeMismatch {
                expected: self.kind(),
                found: src.kind(),
            });
        }
        self.length = src.length;
        self.channels = src.channels;
        self.data.clone_from(&src.data);
        Ok(())
    }

    /// Concatenate `src`'s frames onto the end of this buffer
    pub fn append(&mut self, src: &SampleBuffer) -> Result<()> {
        if self.kind() != src.kind() {
            return Err(Error::TypeMismatch {
                expected: self.kind(),
                found: src.kind(),
            });
        }
        if self.channels != src.channels {
            return Err(Error::ShapeMismatch {
                expected: self.channels,
                found: src.channels,
            });
        }
        match (&mut self.data, &src.data) {
            (SampleData::U8(dst), SampleData::U8(src)) => dst.extend_from_slice(src),
            (SampleData::F64(dst), SampleData::F64(src)) => dst.extend_from_slice(src),
            _ => unreachable!("kinds checked above"),
        }
        self.length += src.length;
        Ok(())
    }

    /// Write the raw element bytes (no header) to `path`.
    ///
    /// The bytes go to a temporary file next to `path` which is renamed into
    /// place, so a failed save leaves nothing behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(self.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_u8(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn test_create_get_roundtrip() {
        for channels in 1..4 {
            for length in [0, 1, 5, 17] {
                let src = ramp_u8(length * channels);
                let buf = SampleBuffer::new(length, channels, &src).unwrap();
                assert_eq!(buf.len(), length);
                assert_eq!(buf.byte_size(), length * channels);
                for (i, v) in src.iter().enumerate() {
                    assert_eq!(buf.get::<u8>(i).unwrap(), *v);
                }
            }
        }
        let src = [0.5, -1.25, 3e9, 42.0];
        let buf = SampleBuffer::new(2, 2, &src).unwrap();
        assert_eq!(buf.kind(), SampleKind::F64);
        assert_eq!(buf.byte_size(), 32);
        for (i, v) in src.iter().enumerate() {
            assert_eq!(buf.get::<f64>(i).unwrap(), *v);
        }
    }

    #[test]
    fn test_create_copies_source() {
        let mut src = vec![1u8, 2, 3];
        let buf = SampleBuffer::new(3, 1, &src).unwrap();
        src[0] = 99;
        assert_eq!(buf.get::<u8>(0).unwrap(), 1);
    }

    #[test]
    fn test_create_invalid() {
        assert!(matches!(
            SampleBuffer::new(4, 0, &[0u8; 4]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            SampleBuffer::new(4, 2, &[0u8; 7]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_clone_is_independent() {
        let a = SampleBuffer::new(3, 1, &[1u8, 2, 3]).unwrap();
        let mut b = a.clone();
        b.set(0, 50u8).unwrap();
        assert_eq!(a.get::<u8>(0).unwrap(), 1);
        assert_eq!(b.get::<u8>(0).unwrap(), 50);
    }

    #[test]
    fn test_reduce() {
        let src: Vec<u8> = (0..20).collect();
        let buf = SampleBuffer::new(10, 2, &src).unwrap();
        let half = buf.reduce(0.5).unwrap();
        assert_eq!(half.len(), 5);
        assert_eq!(half.channels(), 2);
        assert_eq!(half.as_slice::<u8>().unwrap(), &src[..10]);
        // Source untouched
        assert_eq!(buf.len(), 10);

        assert_eq!(buf.reduce(0.0).unwrap().len(), 0);
        assert_eq!(buf.reduce(1.0).unwrap(), buf);
        assert_eq!(buf.reduce(0.25).unwrap().len(), 3);
        assert!(matches!(buf.reduce(1.5), Err(Error::InvalidArgument(_))));
        assert!(matches!(buf.reduce(-0.1), Err(Error::InvalidArgument(_))));
        assert!(matches!(buf.reduce(f64::NAN), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_convert_roundtrip() {
        let src: Vec<u8> = (0..=255).collect();
        let buf = SampleBuffer::new(128, 2, &src).unwrap();
        let wide = buf.convert(SampleKind::F64);
        assert_eq!(wide.kind(), SampleKind::F64);
        assert_eq!(wide.byte_size(), 256 * 8);
        assert_eq!(wide.get::<f64>(255).unwrap(), 255.0);
        let narrow = wide.convert(SampleKind::U8);
        assert_eq!(narrow, buf);
    }

    #[test]
    fn test_convert_saturates() {
        let buf = SampleBuffer::new(5, 1, &[-3.0, 12.9, 300.0, f64::NAN, 255.0]).unwrap();
        let narrow = buf.convert(SampleKind::U8);
        assert_eq!(narrow.as_slice::<u8>().unwrap(), &[0, 12, 255, 0, 255]);
    }

    #[test]
    fn test_access_errors() {
        let mut buf = SampleBuffer::new(2, 2, &[1u8, 2, 3, 4]).unwrap();
        assert!(matches!(
            buf.get::<u8>(4),
            Err(Error::OutOfRange { offset: 4, len: 4 })
        ));
        assert!(matches!(buf.set(4, 0u8), Err(Error::OutOfRange { .. })));
        assert!(matches!(buf.get::<f64>(0), Err(Error::TypeMismatch { .. })));
        assert!(matches!(buf.set(0, 1.0f64), Err(Error::TypeMismatch { .. })));
        assert_eq!(buf.get_f64(3).unwrap(), 4.0);
        buf.set(3, 9u8).unwrap();
        assert_eq!(buf.get::<u8>(3).unwrap(), 9);
    }

    #[test]
    fn test_append() {
        let mut dst = SampleBuffer::new(3, 2, &[1u8, 2, 3, 4, 5, 6]).unwrap();
        let src = SampleBuffer::new(2, 2, &[7u8, 8, 9, 10]).unwrap();
        dst.append(&src).unwrap();
        assert_eq!(dst.len(), 5);
        assert_eq!(dst.byte_size(), 10);
        assert_eq!(
            dst.as_slice::<u8>().unwrap(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]
        );
    }

    #[test]
    fn test_append_mismatch_leaves_dst() {
        let mut dst = SampleBuffer::new(3, 2, &[1u8, 2, 3, 4, 5, 6]).unwrap();
        let before = dst.clone();
        let wrong_kind = SampleBuffer::new(1, 2, &[1.0, 2.0]).unwrap();
        assert!(matches!(
            dst.append(&wrong_kind),
            Err(Error::TypeMismatch {
                expected: SampleKind::U8,
                found: SampleKind::F64
            })
        ));
        let wrong_shape = SampleBuffer::new(2, 1, &[1u8, 2]).unwrap();
        assert!(matches!(
            dst.append(&wrong_shape),
            Err(Error::ShapeMismatch {
                expected: 2,
                found: 1
            })
        ));
        assert_eq!(dst, before);
    }

    #[test]
    fn test_set_data() {
        let mut dst = SampleBuffer::new(1, 1, &[0u8]).unwrap();
        let src = SampleBuffer::new(3, 2, &ramp_u8(6)).unwrap();
        dst.set_data(&src).unwrap();
        assert_eq!(dst, src);

        let before = dst.clone();
        let floats = SampleBuffer::new(1, 1, &[1.0]).unwrap();
        assert!(matches!(
            dst.set_data(&floats),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(dst, before);
    }

    #[test]
    fn test_save_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("bytes.cu8");
        let buf = SampleBuffer::new(2, 2, &[1u8, 2, 3, 4]).unwrap();
        buf.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3, 4]);

        let path = dir.path().join("floats.f64");
        let buf = SampleBuffer::new(2, 1, &[1.5f64, -2.0]).unwrap();
        buf.save(&path).unwrap();
        let mut expected = 1.5f64.to_ne_bytes().to_vec();
        expected.extend_from_slice(&(-2.0f64).to_ne_bytes());
        assert_eq!(std::fs::read(&path).unwrap(), expected);
    }

    #[test]
    fn test_save_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.cu8");
        let buf = SampleBuffer::new(1, 1, &[1u8]).unwrap();
        assert!(matches!(buf.save(&path), Err(Error::Io(_))));
        assert!(!path.exists());
    }
}
