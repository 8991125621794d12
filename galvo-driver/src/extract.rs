use log::warn;

use crate::constants::TRIGGER_BIT;
use galvo_data::PixelGrid;

/// Pixel bookkeeping from one extraction pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtractReport {
    pub expected: usize,
    /// Trigger edges with a reachable offset sample.
    pub found: usize,
}

impl ExtractReport {
    pub fn is_short(&self) -> bool {
        self.found < self.expected
    }

    pub fn is_over(&self) -> bool {
        self.found > self.expected
    }
}

/// Correlates the recorded stream with beam positions.
///
/// A pixel boundary is a rising edge of the trigger bit on the digital
/// channel; only 0-to-1 transitions count, so a trigger pulse several
/// samples wide still marks one pixel. The pixel value is the analog
/// sample `sample_offset` after the edge, compensating the settle latency
/// between the mirror step and the signal. Boundaries fill the grid in the
/// order found, row-major; a sweep that visited cells in any other order
/// is the caller's job to unshuffle.
///
/// Count drift is tolerated: missing pixels stay at the zero padding value
/// and extras are discarded, with both reflected in the report.
pub fn extract(
    analog: &[i16],
    digital: &[u8],
    rows: usize,
    cols: usize,
    sample_offset: usize,
) -> (PixelGrid, ExtractReport) {
    let expected = rows * cols;
    let mut grid = PixelGrid::new(rows, cols);
    let mut found = 0usize;

    let span = analog.len().min(digital.len());
    let mut previous_high = false;
    for i in 0..span {
        let high = digital[i] & TRIGGER_BIT != 0;
        if high && !previous_high {
            // An edge whose settled sample never arrived is a missing
            // pixel, not a fatal condition.
            if let Some(&value) = analog.get(i + sample_offset) {
                if found < expected {
                    grid.set(found / cols, found % cols, value);
                }
                found += 1;
            }
        }
        previous_high = high;
    }

    let report = ExtractReport { expected, found };
    if report.is_short() {
        warn!(
            "{} of {} pixels recovered, padding the remainder",
            found, expected
        );
    } else if report.is_over() {
        warn!(
            "{} trigger edges for {} pixels, truncating extras",
            found, expected
        );
    }
    (grid, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds aligned streams with rising edges at `edges`, each pulse
    /// `pulse_width` samples wide, and `analog[i] = i` so offsets are easy
    /// to check.
    fn synthetic(len: usize, edges: &[usize], pulse_width: usize) -> (Vec<i16>, Vec<u8>) {
        let analog: Vec<i16> = (0..len as i16).collect();
        let mut digital = vec![0u8; len];
        for &e in edges {
            for d in digital.iter_mut().skip(e).take(pulse_width) {
                *d |= TRIGGER_BIT;
            }
        }
        (analog, digital)
    }

    #[test]
    fn test_exact_edge_count_fills_grid_row_major() {
        // 2x3 grid, arbitrary spacing between edges.
        let edges = [0, 7, 19, 30, 44, 59];
        let (analog, digital) = synthetic(80, &edges, 1);
        let (grid, report) = extract(&analog, &digital, 2, 3, 4);

        assert_eq!(report, ExtractReport { expected: 6, found: 6 });
        for (i, &e) in edges.iter().enumerate() {
            assert_eq!(grid.get(i / 3, i % 3), (e + 4) as i16);
        }
    }

    #[test]
    fn test_wide_pulses_count_once() {
        let edges = [5, 25, 45, 65];
        let (analog, digital) = synthetic(100, &edges, 10);
        let (_, report) = extract(&analog, &digital, 2, 2, 2);
        assert_eq!(report.found, 4);
    }

    #[test]
    fn test_short_count_pads_with_zeros() {
        // 3x3 grid but only six edges: three padded cells.
        let edges = [2, 12, 22, 32, 42, 52];
        let (analog, digital) = synthetic(70, &edges, 1);
        let (grid, report) = extract(&analog, &digital, 3, 3, 3);

        assert!(report.is_short());
        assert_eq!(report.expected - report.found, 3);
        assert_eq!(grid.get(2, 0), 0);
        assert_eq!(grid.get(2, 1), 0);
        assert_eq!(grid.get(2, 2), 0);
        assert_eq!(grid.get(0, 0), 5);
    }

    #[test]
    fn test_over_count_truncates_extras() {
        let edges = [1, 11, 21, 31, 41, 51];
        let (analog, digital) = synthetic(70, &edges, 1);
        let (grid, report) = extract(&analog, &digital, 2, 2, 2);

        assert!(report.is_over());
        assert_eq!(report.found, 6);
        // Only the first four edges landed in the grid.
        assert_eq!(grid.get(1, 1), 33);
    }

    #[test]
    fn test_edge_without_offset_sample_is_missing() {
        // Last edge is 2 samples from the end, offset is 5.
        let edges = [0, 10, 28];
        let (analog, digital) = synthetic(30, &edges, 1);
        let (_, report) = extract(&analog, &digital, 1, 3, 5);
        assert_eq!(report.found, 2);
    }

    #[test]
    fn test_trigger_high_at_start_counts_as_edge() {
        let (analog, digital) = synthetic(20, &[0], 3);
        let (grid, report) = extract(&analog, &digital, 1, 1, 6);
        assert_eq!(report.found, 1);
        assert_eq!(grid.get(0, 0), 6);
    }

    #[test]
    fn test_empty_stream_yields_padded_grid() {
        let (grid, report) = extract(&[], &[], 2, 2, 50);
        assert_eq!(report.found, 0);
        assert!(grid.as_slice().iter().all(|&v| v == 0));
    }
}
