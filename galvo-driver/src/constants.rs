use std::time::Duration;

// Pin assignment on the bit-bang port.
pub(crate) const PIN_DATA_Y: u8 = 1 << 0;
pub(crate) const PIN_DATA_X: u8 = 1 << 1;
pub(crate) const PIN_SYNC: u8 = 1 << 2;
pub(crate) const PIN_CLOCK: u8 = 1 << 3;
pub(crate) const PIN_ENABLE: u8 = 1 << 4;

// Enable/latch sequence clocked out before the data bits. Each pair is the
// clock-low pin state followed by the same state with the clock set.
pub(crate) const PREAMBLE_16: [u8; 6] = [
    PIN_SYNC | PIN_ENABLE,
    PIN_SYNC | PIN_CLOCK | PIN_ENABLE,
    PIN_ENABLE,
    PIN_CLOCK | PIN_ENABLE,
    PIN_DATA_Y | PIN_DATA_X | PIN_ENABLE,
    PIN_DATA_Y | PIN_DATA_X | PIN_CLOCK | PIN_ENABLE,
];

// The 18-bit board latches on a short enable burst with both data lines
// and sync held high.
pub(crate) const PREAMBLE_18: [u8; 2] = [
    PIN_DATA_Y | PIN_DATA_X | PIN_SYNC | PIN_ENABLE,
    PIN_DATA_Y | PIN_DATA_X | PIN_SYNC | PIN_CLOCK | PIN_ENABLE,
];

// De-asserts enable and parks every line low.
pub(crate) const POSTAMBLE: [u8; 2] = [PIN_CLOCK, 0x00];

// Both protocol variants produce 40-byte frames: 6 + 16*2 + 2 and
// 2 + 18*2 + 2.
pub(crate) const FRAME_LEN: usize = 40;

// Trigger input is D0 of the digital port.
pub(crate) const TRIGGER_BIT: u8 = 0x01;

// Digitizer front-end: photocurrent on channel A at +/-5 V, digital port
// thresholded at 1.5 V for the 3.3 V trigger line.
pub(crate) const ANALOG_RANGE_MV: u32 = 5_000;
pub(crate) const DIGITAL_THRESHOLD_MV: u32 = 1_500;

// Pin update rate for the async bit-bang transport; the UART baud rate is
// sixteen times this.
pub(crate) const DEFAULT_UPDATE_HZ: u32 = 200_000;
pub(crate) const MIN_BAUD: u32 = 9_600;
pub(crate) const MAX_BAUD: u32 = 12_000_000;

// A frame should leave the host in well under one USB microframe; anything
// slower than this suggests the transfer was split across packets.
pub(crate) const FRAGMENTATION_THRESHOLD: Duration = Duration::from_millis(5);

// Acquisition poll pacing, much shorter than any sensible dwell.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(5);

// Hard bound on waiting for an activity to terminate once told to stop.
pub(crate) const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

// Per-point allowance on top of the dwell when budgeting the whole sweep.
pub(crate) const POINT_OVERHEAD: Duration = Duration::from_millis(50);
