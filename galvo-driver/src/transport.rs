use std::io::Write;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serialport::{ClearBuffer, SerialPort};

use crate::constants::{DEFAULT_UPDATE_HZ, FRAGMENTATION_THRESHOLD, MAX_BAUD, MIN_BAUD};
use crate::error::GalvoError;

/// Outcome of one frame transfer.
#[derive(Clone, Debug)]
pub struct SendReport {
    pub bytes_written: usize,
    pub elapsed: Duration,
    /// The transfer took long enough that the transport may have split the
    /// frame across packet boundaries. Diagnostic, not a failure: USB-class
    /// transports give no atomicity guarantee to verify against.
    pub fragmentation_suspected: bool,
}

/// Low-latency frame transport to the mirror driver.
///
/// The driver board listens on an FTDI-style bit-bang port, which presents
/// itself as a serial device whose pin update rate is the baud rate
/// divided by sixteen.
pub struct FrameLink {
    port: Box<dyn SerialPort>,
    min_packet: usize,
}

impl FrameLink {
    /// Opens `port_name` at the default 200 kHz pin update rate.
    pub fn open(port_name: &str) -> Result<FrameLink, GalvoError> {
        FrameLink::open_with_rate(port_name, DEFAULT_UPDATE_HZ)
    }

    /// Opens `port_name` driving the pins at `update_hz`.
    pub fn open_with_rate(port_name: &str, update_hz: u32) -> Result<FrameLink, GalvoError> {
        let baud_rate = (update_hz.saturating_mul(16)).clamp(MIN_BAUD, MAX_BAUD);
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;
        debug!("frame link open on {port_name} at {baud_rate} baud");
        Ok(FrameLink::from_port(port))
    }

    /// Wraps an already open port. Used by tests with pty pairs.
    pub fn from_port(port: Box<dyn SerialPort>) -> FrameLink {
        FrameLink {
            port,
            min_packet: 0,
        }
    }

    /// Pads every transfer with trailing zeros up to `min_packet` bytes,
    /// for transports that refuse writes below a minimum packet size.
    pub fn with_min_packet(mut self, min_packet: usize) -> FrameLink {
        self.min_packet = min_packet;
        self
    }

    /// Delivers one frame as a single write.
    ///
    /// Pending transmit bytes are purged first so a stale partial frame
    /// can never prefix this one; each send must reach the device as
    /// exactly one frame, not a byte-shifted concatenation of two.
    pub fn send(&mut self, frame: &[u8]) -> Result<SendReport, GalvoError> {
        self.port.clear(ClearBuffer::Output)?;

        let padded;
        let payload = if frame.len() < self.min_packet {
            padded = {
                let mut p = frame.to_vec();
                p.resize(self.min_packet, 0x00);
                p
            };
            &padded[..]
        } else {
            frame
        };

        let started = Instant::now();
        let bytes_written = self.port.write(payload)?;
        let elapsed = started.elapsed();

        if bytes_written < frame.len() {
            return Err(GalvoError::ShortWrite {
                expected: frame.len(),
                written: bytes_written,
            });
        }

        let fragmentation_suspected = elapsed > FRAGMENTATION_THRESHOLD;
        if fragmentation_suspected {
            warn!("frame transfer took {elapsed:?}, possible fragmentation");
        }

        Ok(SendReport {
            bytes_written,
            elapsed,
            fragmentation_suspected,
        })
    }

    /// Parks every pin low. Sent after homing at the end of a sweep.
    pub fn drive_low(&mut self) -> Result<(), GalvoError> {
        self.port.write_all(&[0x00])?;
        Ok(())
    }
}
