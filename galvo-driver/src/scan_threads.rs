use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::debug;

use crate::constants::POLL_INTERVAL;
use crate::digitizer::Digitizer;
use crate::error::{GalvoError, ScanWarning};
use crate::frame::encode_frame;
use crate::stream::SampleStream;
use crate::transport::FrameLink;
use galvo_data::{ProtocolVariant, ScanConfig, SweepPattern};

/// What the motion-sweep activity hands back through its join handle.
pub(crate) struct SweepOutcome {
    pub(crate) link: FrameLink,
    pub(crate) result: Result<(), GalvoError>,
    pub(crate) warnings: Vec<ScanWarning>,
}

/// What the acquisition-poll activity hands back through its join handle.
pub(crate) struct AcqOutcome {
    pub(crate) digitizer: Box<dyn Digitizer>,
    pub(crate) result: Result<(), GalvoError>,
}

/// Motion-sweep activity: one frame per grid point, paced by the dwell.
///
/// The abort flag is checked between grid points only, never mid-write, so
/// a half-sent frame can never be left on the wire. On the way out the
/// mirror is homed to (0, 0) and the pins parked low regardless of how the
/// sweep ended.
pub(crate) fn run_sweep(
    mut link: FrameLink,
    config: ScanConfig,
    variant: ProtocolVariant,
    abort: Arc<AtomicBool>,
    done_tx: Sender<()>,
) -> SweepOutcome {
    let mut warnings = Vec::new();
    let result = sweep_grid(&mut link, &config, variant, &abort, &mut warnings);

    // Best effort: the sweep result already reflects any transport fault.
    if let Ok(home) = encode_frame(0.0, 0.0, variant) {
        let _ = link.send(&home);
    }
    let _ = link.drive_low();

    let _ = done_tx.send(());
    SweepOutcome {
        link,
        result,
        warnings,
    }
}

fn sweep_grid(
    link: &mut FrameLink,
    config: &ScanConfig,
    variant: ProtocolVariant,
    abort: &AtomicBool,
    warnings: &mut Vec<ScanWarning>,
) -> Result<(), GalvoError> {
    let forward: Vec<f64> = config.x.positions().collect();
    let mut reversed = forward.clone();
    reversed.reverse();

    for (row, y) in config.y.positions().enumerate() {
        let flip = config.pattern == SweepPattern::Serpentine && row % 2 == 1;
        let xs = if flip { &reversed } else { &forward };
        for &x in xs {
            if abort.load(Ordering::Relaxed) {
                debug!("sweep aborted at row {row}");
                return Ok(());
            }
            let frame = encode_frame(x, y, variant)?;
            let report = link.send(&frame)?;
            if report.fragmentation_suspected {
                warnings.push(ScanWarning::PossibleFragmentation {
                    elapsed: report.elapsed,
                });
            }
            std::thread::sleep(config.dwell);
        }
        debug!("row {row} swept");
    }
    Ok(())
}

/// Acquisition-poll activity: drains the digitizer into the shared stream
/// until told to stop, then shuts the device down.
///
/// Paced much faster than any dwell so the stream keeps up with motion.
pub(crate) fn run_acquisition(
    mut digitizer: Box<dyn Digitizer>,
    stream: Arc<SampleStream>,
    stop: Arc<AtomicBool>,
    done_tx: Sender<()>,
) -> AcqOutcome {
    let mut result = Ok(());
    while !stop.load(Ordering::Relaxed) {
        match digitizer.poll() {
            Ok(blocks) => {
                for block in &blocks {
                    stream.push_block(block);
                }
            }
            Err(e) => {
                result = Err(e);
                break;
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    // One final drain so samples that landed between the last poll and the
    // stop request are not dropped.
    if result.is_ok() {
        if let Ok(blocks) = digitizer.poll() {
            for block in &blocks {
                stream.push_block(block);
            }
        }
    }

    if let Err(e) = digitizer.stop() {
        if result.is_ok() {
            result = Err(e);
        }
    }

    let _ = done_tx.send(());
    AcqOutcome { digitizer, result }
}
