use std::io;
use std::time::Duration;

use thiserror::Error;

/// Fatal failures of the scan core.
///
/// Conditions the scan survives (overflow, pixel-count drift, suspected
/// frame fragmentation) are [`ScanWarning`]s instead.
#[derive(Debug, Error)]
pub enum GalvoError {
    #[error("coordinate ({0}, {1}) is not finite")]
    InvalidCoordinate(f64, f64),

    #[error("transport accepted {written} of {expected} frame bytes")]
    ShortWrite { expected: usize, written: usize },

    #[error("frame of {0} bytes does not match the protocol variant")]
    FrameLength(usize),

    #[error("a scan is already in progress")]
    ScanInProgress,

    #[error("hardware handles were lost by a previous fatal error")]
    HardwareUnavailable,

    #[error("{activity} activity did not terminate within {timeout:?}")]
    JoinTimeout {
        activity: &'static str,
        timeout: Duration,
    },

    #[error("{0} activity panicked")]
    ActivityPanic(&'static str),

    #[error("digitizer is not configured")]
    DigitizerNotConfigured,

    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Non-fatal diagnostics accumulated over one scan and reported to the
/// caller alongside the result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanWarning {
    /// A frame transfer took long enough that the transport may have split
    /// it across packet boundaries.
    PossibleFragmentation { elapsed: Duration },
    /// The digitizer flagged sample loss in this many blocks.
    DeviceOverflow { blocks: usize },
    /// The extractor recovered a different number of pixels than the grid
    /// holds; the grid was padded or truncated accordingly.
    SampleCountMismatch { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_condition() {
        let e = GalvoError::InvalidCoordinate(f64::NAN, 0.0);
        assert!(e.to_string().contains("not finite"));

        let e = GalvoError::ShortWrite {
            expected: 40,
            written: 12,
        };
        assert!(e.to_string().contains("12 of 40"));

        let e = GalvoError::JoinTimeout {
            activity: "motion sweep",
            timeout: Duration::from_secs(2),
        };
        assert!(e.to_string().contains("motion sweep"));
    }
}
