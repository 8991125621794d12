use crate::error::GalvoError;

/// Enable flag and input range for one analog channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub enabled: bool,
    /// Full-scale input range in millivolts.
    pub range_mv: u32,
}

/// Streaming parameters handed to the digitizer before a scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Spacing between samples in microseconds, analog and digital alike.
    pub sample_interval_us: u32,
    /// Analog channel setup, in channel order starting at A. Channels
    /// beyond the list stay disabled.
    pub channels: Vec<ChannelConfig>,
    /// Logic threshold for the digital port lines, in millivolts.
    pub digital_threshold_mv: u32,
    /// Stop automatically after this many samples; `None` runs until
    /// [`Digitizer::stop`].
    pub max_samples: Option<usize>,
}

/// One notification worth of samples, already copied out of the device's
/// reusable overview buffer. Analog and digital are aligned by index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleBlock {
    /// Raw ADC counts from the analog channel.
    pub analog: Vec<i16>,
    /// Bitmasks of the digital port lines D0-D7.
    pub digital: Vec<u8>,
    /// The device reported sample loss while filling this block.
    pub overflow: bool,
}

/// Boundary to the streaming digitizer.
///
/// The hardware notifies through a driver-owned callback that lends slices
/// of an overview buffer it overwrites in place; implementations copy those
/// slices out before returning, so `poll` hands back owned blocks and no
/// caller ever holds a reference into device memory.
pub trait Digitizer: Send {
    fn configure(&mut self, config: &StreamConfig) -> Result<(), GalvoError>;

    fn start(&mut self) -> Result<(), GalvoError>;

    /// Returns every block that arrived since the previous poll.
    fn poll(&mut self) -> Result<Vec<SampleBlock>, GalvoError>;

    /// Ceases streaming and releases driver-level resources. Idempotent;
    /// safe to call before `start`.
    fn stop(&mut self) -> Result<(), GalvoError>;

    /// Full-scale ADC count, for converting to physical units downstream.
    fn max_adc_value(&self) -> i16;
}
