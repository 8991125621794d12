//! Driver for a two-axis galvo scan head: encodes position frames onto a
//! bit-bang serial transport, records the digitizer's analog/digital
//! stream, and reconstructs a spatial image from trigger edges.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

mod constants;
mod digitizer;
mod error;
mod extract;
mod frame;
mod scan_threads;
pub mod sim;
mod stream;
mod time;
mod transport;

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{debug, info};

use crate::constants::{
    ANALOG_RANGE_MV, DIGITAL_THRESHOLD_MV, JOIN_TIMEOUT, POINT_OVERHEAD,
};
use crate::scan_threads::{run_acquisition, run_sweep};

pub use crate::digitizer::{ChannelConfig, Digitizer, SampleBlock, StreamConfig};
pub use crate::error::{GalvoError, ScanWarning};
pub use crate::extract::{extract, ExtractReport};
pub use crate::frame::{decode_frame, encode_frame};
pub use crate::stream::SampleStream;
pub use crate::transport::{FrameLink, SendReport};

use galvo_data::{PixelGrid, ProtocolVariant, ScanConfig, SweepPattern};

/// Externally visible scan state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Running,
    Aborting,
    Error,
}

/// The pair of hardware handles a scan takes ownership of: the frame
/// transport and the streaming digitizer.
pub struct ScanHardware {
    pub link: FrameLink,
    pub digitizer: Box<dyn Digitizer>,
}

struct ScanState {
    status: ScanStatus,
    grid: Option<PixelGrid>,
    warnings: Vec<ScanWarning>,
    error: Option<GalvoError>,
}

impl ScanState {
    fn idle() -> ScanState {
        ScanState {
            status: ScanStatus::Idle,
            grid: None,
            warnings: Vec::new(),
            error: None,
        }
    }
}

/// Orchestrates one scan at a time over a frame transport and a digitizer.
///
/// A scan runs two activities concurrently: a motion sweep issuing one
/// position frame per grid point, and an acquisition poll draining the
/// digitizer into a per-scan sample stream. The two are correlated only
/// through the digital trigger edges recorded in the stream; acquisition
/// starts strictly before motion and stops strictly after it, so every
/// sample generated during motion is captured.
pub struct ScanDriver {
    variant: ProtocolVariant,
    hardware: Option<ScanHardware>,
    state: Arc<Mutex<ScanState>>,
    abort: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<Option<ScanHardware>>>,
}

impl ScanDriver {
    pub fn new(
        link: FrameLink,
        digitizer: Box<dyn Digitizer>,
        variant: ProtocolVariant,
    ) -> ScanDriver {
        ScanDriver {
            variant,
            hardware: Some(ScanHardware { link, digitizer }),
            state: Arc::new(Mutex::new(ScanState::idle())),
            abort: Arc::new(AtomicBool::new(false)),
            supervisor: None,
        }
    }

    /// Begins a scan. Valid only while no scan is active.
    ///
    /// All per-scan state (stream, abort flag, warnings, grid) is
    /// allocated here and discarded at the end of the scan, so repeated
    /// scans cannot contaminate each other.
    pub fn start(&mut self, config: ScanConfig) -> Result<(), GalvoError> {
        self.reclaim();
        if self.supervisor.is_some() {
            return Err(GalvoError::ScanInProgress);
        }
        let hardware = self
            .hardware
            .take()
            .ok_or(GalvoError::HardwareUnavailable)?;

        let state = Arc::new(Mutex::new(ScanState {
            status: ScanStatus::Running,
            grid: None,
            warnings: Vec::new(),
            error: None,
        }));
        let abort = Arc::new(AtomicBool::new(false));
        self.state = state.clone();
        self.abort = abort.clone();

        let variant = self.variant;
        self.supervisor = Some(thread::spawn(move || {
            supervise(hardware, config, variant, state, abort)
        }));
        Ok(())
    }

    /// Requests the running scan to stop and blocks until both activities
    /// have actually terminated. Idempotent; a no-op when nothing runs.
    pub fn abort(&mut self) {
        if self.supervisor.is_none() {
            return;
        }
        {
            let mut st = self.state.lock().unwrap();
            if st.status == ScanStatus::Running {
                st.status = ScanStatus::Aborting;
            }
        }
        self.abort.store(true, Ordering::Relaxed);
        self.reclaim_blocking();
    }

    pub fn status(&mut self) -> ScanStatus {
        self.reclaim();
        self.state.lock().unwrap().status
    }

    /// Takes the finished grid. `None` until a scan has completed.
    pub fn result(&mut self) -> Option<PixelGrid> {
        self.reclaim();
        self.state.lock().unwrap().grid.take()
    }

    /// Diagnostics accumulated by the most recent scan.
    pub fn warnings(&self) -> Vec<ScanWarning> {
        self.state.lock().unwrap().warnings.clone()
    }

    /// Takes the fatal error that put the driver into `Error`, if any.
    pub fn take_error(&mut self) -> Option<GalvoError> {
        self.reclaim();
        self.state.lock().unwrap().error.take()
    }

    fn reclaim(&mut self) {
        if self
            .supervisor
            .as_ref()
            .is_some_and(|handle| handle.is_finished())
        {
            self.reclaim_blocking();
        }
    }

    fn reclaim_blocking(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            match handle.join() {
                Ok(Some(hardware)) => self.hardware = Some(hardware),
                Ok(None) => {
                    // Fatal join timeout: the handles are wedged inside a
                    // hardware call and cannot be reused.
                }
                Err(_) => {
                    let mut st = self.state.lock().unwrap();
                    st.status = ScanStatus::Error;
                    st.error = Some(GalvoError::ActivityPanic("scan supervisor"));
                }
            }
        }
    }
}

impl Drop for ScanDriver {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Upper bound on how long a well-behaved sweep can take.
fn sweep_budget(config: &ScanConfig) -> Duration {
    (config.dwell + POINT_OVERHEAD) * (config.point_count() as u32) + Duration::from_secs(1)
}

fn fail(state: &Mutex<ScanState>, warnings: Vec<ScanWarning>, error: GalvoError) {
    let mut st = state.lock().unwrap();
    st.status = ScanStatus::Error;
    st.warnings.extend(warnings);
    st.error = Some(error);
}

/// Runs one scan to completion: spawns both activities, joins them with
/// bounded waits, then extracts the pixel grid from the accumulated
/// stream. Returns the hardware handles for the next scan, or `None` when
/// a join timed out and the driver state is unknown.
fn supervise(
    hardware: ScanHardware,
    config: ScanConfig,
    variant: ProtocolVariant,
    state: Arc<Mutex<ScanState>>,
    abort: Arc<AtomicBool>,
) -> Option<ScanHardware> {
    let ScanHardware {
        link,
        mut digitizer,
    } = hardware;

    let stream_config = StreamConfig {
        sample_interval_us: config.sample_interval_us,
        channels: vec![ChannelConfig {
            enabled: true,
            range_mv: ANALOG_RANGE_MV,
        }],
        digital_threshold_mv: DIGITAL_THRESHOLD_MV,
        max_samples: None,
    };
    if let Err(e) = digitizer
        .configure(&stream_config)
        .and_then(|()| digitizer.start())
    {
        fail(&state, Vec::new(), e);
        return Some(ScanHardware { link, digitizer });
    }

    let stream = Arc::new(SampleStream::new());
    let acq_stop = Arc::new(AtomicBool::new(false));
    let (sweep_done_tx, sweep_done_rx) = bounded::<()>(1);
    let (acq_done_tx, acq_done_rx) = bounded::<()>(1);

    // Acquisition starts strictly before motion begins.
    let acq_handle = {
        let stream = stream.clone();
        let stop = acq_stop.clone();
        thread::spawn(move || run_acquisition(digitizer, stream, stop, acq_done_tx))
    };
    let sweep_handle = {
        let config = config.clone();
        let abort = abort.clone();
        thread::spawn(move || run_sweep(link, config, variant, abort, sweep_done_tx))
    };

    // Wait for the sweep within the whole-scan budget, tightening to the
    // hard join timeout once an abort has been signaled.
    let budget = sweep_budget(&config);
    let started = Instant::now();
    let mut abort_seen: Option<Instant> = None;
    let sweep_finished = loop {
        match sweep_done_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(()) => break true,
            Err(RecvTimeoutError::Disconnected) => break true,
            Err(RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                if abort_seen.is_none() && abort.load(Ordering::Relaxed) {
                    abort_seen = Some(now);
                }
                let timed_out = now.duration_since(started) > budget
                    || abort_seen.is_some_and(|seen| now.duration_since(seen) > JOIN_TIMEOUT);
                if timed_out {
                    break false;
                }
            }
        }
    };

    if !sweep_finished {
        // The motion activity is stuck inside a hardware call; treat the
        // driver state as unknown rather than reusing the handles.
        fail(
            &state,
            Vec::new(),
            GalvoError::JoinTimeout {
                activity: "motion sweep",
                timeout: JOIN_TIMEOUT,
            },
        );
        acq_stop.store(true, Ordering::Relaxed);
        let _ = acq_done_rx.recv_timeout(JOIN_TIMEOUT);
        return None;
    }

    let sweep = match sweep_handle.join() {
        Ok(outcome) => outcome,
        Err(_) => {
            fail(&state, Vec::new(), GalvoError::ActivityPanic("motion sweep"));
            acq_stop.store(true, Ordering::Relaxed);
            let _ = acq_done_rx.recv_timeout(JOIN_TIMEOUT);
            return None;
        }
    };

    // Acquisition stops strictly after motion has stopped, so every sample
    // generated during the sweep is captured.
    acq_stop.store(true, Ordering::Relaxed);
    if acq_done_rx.recv_timeout(JOIN_TIMEOUT).is_err() {
        fail(
            &state,
            sweep.warnings,
            GalvoError::JoinTimeout {
                activity: "acquisition poll",
                timeout: JOIN_TIMEOUT,
            },
        );
        return None;
    }
    let acq = match acq_handle.join() {
        Ok(outcome) => outcome,
        Err(_) => {
            fail(
                &state,
                sweep.warnings,
                GalvoError::ActivityPanic("acquisition poll"),
            );
            return None;
        }
    };

    let hardware = ScanHardware {
        link: sweep.link,
        digitizer: acq.digitizer,
    };

    let mut warnings = sweep.warnings;
    if let Err(e) = sweep.result {
        fail(&state, warnings, e);
        return Some(hardware);
    }
    if let Err(e) = acq.result {
        fail(&state, warnings, e);
        return Some(hardware);
    }

    let overflow_blocks = stream.overflow_blocks();
    if overflow_blocks > 0 {
        warnings.push(ScanWarning::DeviceOverflow {
            blocks: overflow_blocks,
        });
    }

    // Both activities have joined; this Arc is the sole remaining handle
    // and the buffers are stable.
    let (analog, digital) = match Arc::try_unwrap(stream) {
        Ok(stream) => stream.into_samples(),
        Err(stream) => stream.snapshot(),
    };
    debug!("scan stream holds {} sample pairs", analog.len());

    let (mut grid, report) = extract(
        &analog,
        &digital,
        config.rows(),
        config.cols(),
        config.sample_offset,
    );
    if report.found != report.expected {
        warnings.push(ScanWarning::SampleCountMismatch {
            expected: report.expected,
            found: report.found,
        });
    }
    if config.pattern == SweepPattern::Serpentine {
        for row in (1..grid.rows()).step_by(2) {
            grid.reverse_row(row);
        }
    }

    info!(
        "scan complete: {} of {} pixels recovered",
        report.found.min(report.expected),
        report.expected
    );

    let mut st = state.lock().unwrap();
    st.warnings = warnings;
    st.grid = Some(grid);
    st.status = ScanStatus::Idle;
    drop(st);

    Some(hardware)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TRIGGER_BIT;
    use crate::sim::ScriptedDigitizer;
    use crate::time::sleep_ms;
    use galvo_data::AxisSweep;
    use serialport::{SerialPort, TTYPort};

    /// Aligned analog/digital streams with one trigger edge per pixel,
    /// `period` samples apart, and the pixel's value held for the whole
    /// period so `analog[edge + offset]` is exact.
    fn scripted_stream(values: &[i16], period: usize, pulse_width: usize) -> (Vec<i16>, Vec<u8>) {
        let len = (values.len() + 1) * period;
        let mut analog = vec![0i16; len];
        let mut digital = vec![0u8; len];
        for (p, &v) in values.iter().enumerate() {
            for s in p * period..(p + 1) * period {
                analog[s] = v;
            }
            for d in digital.iter_mut().skip(p * period).take(pulse_width) {
                *d |= TRIGGER_BIT;
            }
        }
        (analog, digital)
    }

    fn driver_with_stream(analog: Vec<i16>, digital: Vec<u8>) -> (ScanDriver, TTYPort) {
        let (master, slave) = TTYPort::pair().expect("Unable to create ptty pair");
        let link = FrameLink::from_port(Box::new(slave) as Box<dyn SerialPort>);
        let digitizer = Box::new(ScriptedDigitizer::from_samples(analog, digital, 4096));
        (
            ScanDriver::new(link, digitizer, ProtocolVariant::Bits16),
            master,
        )
    }

    fn config(rows: usize, cols: usize, dwell_ms: u64, pattern: SweepPattern) -> ScanConfig {
        ScanConfig {
            x: AxisSweep::new(-0.1, 0.1, cols),
            y: AxisSweep::new(-0.1, 0.1, rows),
            dwell: Duration::from_millis(dwell_ms),
            sample_offset: 5,
            pattern,
            sample_interval_us: 10,
        }
    }

    fn wait_while_running(driver: &mut ScanDriver, timeout_ms: u64) -> ScanStatus {
        let started = Instant::now();
        loop {
            let status = driver.status();
            if status != ScanStatus::Running && status != ScanStatus::Aborting {
                return status;
            }
            assert!(
                started.elapsed() < Duration::from_millis(timeout_ms),
                "scan did not settle within {timeout_ms} ms"
            );
            sleep_ms(5);
        }
    }

    #[test]
    fn test_scan_three_by_three() {
        let values: Vec<i16> = (0..9).map(|i| 1000 + 10 * i).collect();
        let (analog, digital) = scripted_stream(&values, 20, 3);
        let (mut driver, _master) = driver_with_stream(analog, digital);

        driver.start(config(3, 3, 1, SweepPattern::Raster)).unwrap();
        assert_eq!(wait_while_running(&mut driver, 2000), ScanStatus::Idle);

        let grid = driver.result().expect("grid after completion");
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.cols(), 3);
        for (i, &v) in values.iter().enumerate() {
            assert_eq!(grid.get(i / 3, i % 3), v);
        }
        assert!(driver.warnings().is_empty());
        assert!(driver.take_error().is_none());
        // The grid was taken; a second call has nothing to hand out.
        assert!(driver.result().is_none());
    }

    #[test]
    fn test_serpentine_rows_are_unshuffled() {
        // Boundary order 10..=15; the sweep visits row 1 right-to-left, so
        // the orchestrator must flip it back.
        let values: Vec<i16> = (10..16).collect();
        let (analog, digital) = scripted_stream(&values, 20, 1);
        let (mut driver, _master) = driver_with_stream(analog, digital);

        driver
            .start(config(2, 3, 1, SweepPattern::Serpentine))
            .unwrap();
        assert_eq!(wait_while_running(&mut driver, 2000), ScanStatus::Idle);

        let grid = driver.result().unwrap();
        assert_eq!(grid.row(0), &[10, 11, 12]);
        assert_eq!(grid.row(1), &[15, 14, 13]);
    }

    #[test]
    fn test_short_stream_pads_and_warns() {
        // 3x3 scan but only six edges recorded.
        let values: Vec<i16> = (0..6).map(|i| 100 + i).collect();
        let (analog, digital) = scripted_stream(&values, 20, 1);
        let (mut driver, _master) = driver_with_stream(analog, digital);

        driver.start(config(3, 3, 1, SweepPattern::Raster)).unwrap();
        assert_eq!(wait_while_running(&mut driver, 2000), ScanStatus::Idle);

        let grid = driver.result().unwrap();
        assert_eq!(grid.row(2), &[0, 0, 0]);
        assert!(driver
            .warnings()
            .contains(&ScanWarning::SampleCountMismatch {
                expected: 9,
                found: 6
            }));
    }

    #[test]
    fn test_overflow_block_surfaces_as_warning() {
        // One pixel whose samples arrive in a block the device flagged as
        // overflowed; the scan must still finish and report the loss.
        let (analog, digital) = scripted_stream(&[500], 20, 1);
        let (master, slave) = TTYPort::pair().expect("Unable to create ptty pair");
        let link = FrameLink::from_port(Box::new(slave) as Box<dyn SerialPort>);
        let digitizer = Box::new(ScriptedDigitizer::from_blocks(vec![SampleBlock {
            analog,
            digital,
            overflow: true,
        }]));
        let mut driver = ScanDriver::new(link, digitizer, ProtocolVariant::Bits16);
        let _master = master;

        driver.start(config(1, 1, 1, SweepPattern::Raster)).unwrap();
        assert_eq!(wait_while_running(&mut driver, 2000), ScanStatus::Idle);

        assert!(driver
            .warnings()
            .contains(&ScanWarning::DeviceOverflow { blocks: 1 }));
        let grid = driver.result().unwrap();
        assert_eq!(grid.get(0, 0), 500);
    }

    #[test]
    fn test_abort_before_start_is_noop() {
        let (mut driver, _master) = driver_with_stream(Vec::new(), Vec::new());
        driver.abort();
        driver.abort();
        assert_eq!(driver.status(), ScanStatus::Idle);
        assert!(driver.result().is_none());
    }

    #[test]
    fn test_abort_is_idempotent_and_reclaims_hardware() {
        let (mut driver, _master) = driver_with_stream(Vec::new(), Vec::new());

        // Long enough that the abort lands mid-sweep.
        driver
            .start(config(20, 20, 5, SweepPattern::Raster))
            .unwrap();
        sleep_ms(20);
        driver.abort();
        driver.abort();

        let status = driver.status();
        assert_eq!(status, ScanStatus::Idle);
        // Aborted scans still produce a (padded) grid from whatever the
        // stream captured.
        let grid = driver.result().unwrap();
        assert_eq!(grid.rows(), 20);
        assert!(driver
            .warnings()
            .iter()
            .any(|w| matches!(w, ScanWarning::SampleCountMismatch { .. })));

        // The hardware must be back for the next scan.
        driver.start(config(1, 1, 1, SweepPattern::Raster)).unwrap();
        assert_ne!(wait_while_running(&mut driver, 2000), ScanStatus::Error);
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let (mut driver, _master) = driver_with_stream(Vec::new(), Vec::new());
        driver
            .start(config(10, 10, 5, SweepPattern::Raster))
            .unwrap();
        assert!(matches!(
            driver.start(config(1, 1, 1, SweepPattern::Raster)),
            Err(GalvoError::ScanInProgress)
        ));
        driver.abort();
    }

    #[test]
    fn test_transport_fault_surfaces_as_error() {
        let (master, slave) = TTYPort::pair().expect("Unable to create ptty pair");
        let link = FrameLink::from_port(Box::new(slave) as Box<dyn SerialPort>);
        let digitizer = Box::new(ScriptedDigitizer::from_blocks(Vec::new()));
        let mut driver = ScanDriver::new(link, digitizer, ProtocolVariant::Bits16);

        // Closing the master side makes every write to the slave fail.
        drop(master);
        driver.start(config(3, 3, 1, SweepPattern::Raster)).unwrap();
        assert_eq!(wait_while_running(&mut driver, 2000), ScanStatus::Error);
        assert!(driver.take_error().is_some());
        assert!(driver.result().is_none());
    }
}
