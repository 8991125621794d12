//! Stand-ins for the streaming digitizer, used by the example binary and
//! the end-to-end tests. The real device sits behind the same [`Digitizer`]
//! trait.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::TRIGGER_BIT;
use crate::digitizer::{ChannelConfig, Digitizer, SampleBlock, StreamConfig};
use crate::error::GalvoError;

// Full-scale count of the 12-bit-resolution scope this simulates.
const SIM_MAX_ADC: i16 = 32512;

/// Synthesizes the stream a real scan would produce: one trigger pulse per
/// pixel period with the pixel's analog level (plus a little noise) held
/// for the whole period.
pub struct SimDigitizer {
    image: Vec<i16>,
    period: usize,
    pulse_width: usize,
    chunk: usize,
    noise_counts: i16,
    rng: StdRng,
    config: Option<StreamConfig>,
    running: bool,
    emitted: usize,
}

impl SimDigitizer {
    /// `image` holds the analog level of each pixel in sweep order;
    /// `period` is the number of samples between trigger edges.
    pub fn new(image: Vec<i16>, period: usize) -> SimDigitizer {
        assert!(period > 0);
        SimDigitizer {
            image,
            period,
            pulse_width: 1,
            chunk: 4096,
            noise_counts: 0,
            rng: StdRng::seed_from_u64(0x5ca1ab1e),
            config: None,
            running: false,
            emitted: 0,
        }
    }

    pub fn with_pulse_width(mut self, pulse_width: usize) -> SimDigitizer {
        self.pulse_width = pulse_width.clamp(1, self.period);
        self
    }

    pub fn with_chunk(mut self, chunk: usize) -> SimDigitizer {
        self.chunk = chunk.max(1);
        self
    }

    pub fn with_noise(mut self, noise_counts: i16) -> SimDigitizer {
        self.noise_counts = noise_counts;
        self
    }

    fn total_samples(&self) -> usize {
        // One period per pixel plus a tail so the last pixel's offset
        // sample exists.
        let full = (self.image.len() + 1) * self.period;
        match self.config.as_ref().and_then(|c| c.max_samples) {
            Some(n) => full.min(n),
            None => full,
        }
    }

    fn sample_at(&mut self, s: usize) -> (i16, u8) {
        let pixel = (s / self.period).min(self.image.len().saturating_sub(1));
        let phase = s % self.period;
        let digital = if phase < self.pulse_width && s / self.period < self.image.len() {
            TRIGGER_BIT
        } else {
            0
        };
        let noise = if self.noise_counts > 0 {
            self.rng.gen_range(-self.noise_counts..=self.noise_counts)
        } else {
            0
        };
        let analog = self.image.get(pixel).copied().unwrap_or(0).saturating_add(noise);
        (analog, digital)
    }
}

impl Digitizer for SimDigitizer {
    fn configure(&mut self, config: &StreamConfig) -> Result<(), GalvoError> {
        self.config = Some(config.clone());
        self.emitted = 0;
        Ok(())
    }

    fn start(&mut self) -> Result<(), GalvoError> {
        if self.config.is_none() {
            return Err(GalvoError::DigitizerNotConfigured);
        }
        self.running = true;
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<SampleBlock>, GalvoError> {
        if !self.running || self.emitted >= self.total_samples() {
            // Mirrors the device's auto-stop once the requested sample
            // count has been delivered.
            self.running = false;
            return Ok(Vec::new());
        }
        let end = (self.emitted + self.chunk).min(self.total_samples());
        let mut block = SampleBlock::default();
        for s in self.emitted..end {
            let (analog, digital) = self.sample_at(s);
            block.analog.push(analog);
            block.digital.push(digital);
        }
        self.emitted = end;
        Ok(vec![block])
    }

    fn stop(&mut self) -> Result<(), GalvoError> {
        self.running = false;
        Ok(())
    }

    fn max_adc_value(&self) -> i16 {
        SIM_MAX_ADC
    }
}

/// Replays pre-built blocks verbatim, ignoring every [`StreamConfig`]
/// field. Lets tests inject streams with edges at exactly known offsets.
pub struct ScriptedDigitizer {
    blocks: VecDeque<SampleBlock>,
    config: Option<StreamConfig>,
    running: bool,
}

impl ScriptedDigitizer {
    pub fn from_blocks(blocks: Vec<SampleBlock>) -> ScriptedDigitizer {
        ScriptedDigitizer {
            blocks: blocks.into(),
            config: None,
            running: false,
        }
    }

    /// Chunks one aligned sample pair into blocks of `chunk` samples.
    pub fn from_samples(analog: Vec<i16>, digital: Vec<u8>, chunk: usize) -> ScriptedDigitizer {
        assert_eq!(analog.len(), digital.len());
        assert!(chunk > 0);
        let blocks = analog
            .chunks(chunk)
            .zip(digital.chunks(chunk))
            .map(|(a, d)| SampleBlock {
                analog: a.to_vec(),
                digital: d.to_vec(),
                overflow: false,
            })
            .collect();
        ScriptedDigitizer::from_blocks(blocks)
    }
}

impl Digitizer for ScriptedDigitizer {
    fn configure(&mut self, config: &StreamConfig) -> Result<(), GalvoError> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), GalvoError> {
        if self.config.is_none() {
            return Err(GalvoError::DigitizerNotConfigured);
        }
        self.running = true;
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<SampleBlock>, GalvoError> {
        if !self.running {
            return Ok(Vec::new());
        }
        Ok(self.blocks.drain(..).collect())
    }

    fn stop(&mut self) -> Result<(), GalvoError> {
        self.running = false;
        Ok(())
    }

    fn max_adc_value(&self) -> i16 {
        SIM_MAX_ADC
    }
}
