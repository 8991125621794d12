#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row-major image of raw ADC counts, one cell per grid point.
///
/// Cells start at zero, which doubles as the padding value when the
/// extractor recovers fewer pixels than expected.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelGrid {
    rows: usize,
    cols: usize,
    data: Vec<i16>,
}

impl PixelGrid {
    pub fn new(rows: usize, cols: usize) -> PixelGrid {
        PixelGrid {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> i16 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: i16) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[i16] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Flip one row in place. Used to undo serpentine sweep ordering.
    pub fn reverse_row(&mut self, row: usize) {
        self.data[row * self.cols..(row + 1) * self.cols].reverse();
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.data
    }
}
