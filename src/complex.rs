use crate::GRID_SIDE;

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// The type of raw sample data out of the receiver (offset binary, 127.5 is zero)
pub type IqByte = Complex<u8>;

impl IqByte {
    /// Reinterpret an interleaved `[I, Q]` byte pair, `pair` holds at least two bytes
    pub(crate) fn from_pair(pair: &[u8]) -> Self {
        Self {
            re: pair[0],
            im: pair[1],
        }
    }

    /// Row-major grid cell addressed by this sample, the quadrature component picks the row
    pub fn cell_index(&self) -> usize {
        self.im as usize * GRID_SIDE + self.re as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_index() {
        assert_eq!(IqByte::new(10, 20).cell_index(), 20 * 256 + 10);
        assert_eq!(IqByte::new(0, 0).cell_index(), 0);
        assert_eq!(IqByte::new(255, 255).cell_index(), 65535);
    }

    #[test]
    fn test_from_pair() {
        assert_eq!(IqByte::from_pair(&[3, 200]), IqByte::new(3, 200));
    }
}
