use std::collections::VecDeque;
use std::f64::consts::TAU;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::drivers::CaptureError;
/// One row of the acquisition stream: a session-relative timestamp and one
/// value per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub values: Vec<f64>,
}
impl Sample {
    pub fn new(timestamp: f64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }
}
/// Block of rows delivered atomically by the acquisition device.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBlock {
    pub samples: Vec<Sample>,
}
impl SampleBlock {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
    /// Build a block from a start time and evenly spaced rows.
    pub fn from_rows(start_time: f64, sample_rate_hz: f64, rows: Vec<Vec<f64>>) -> Self {
        let dt = 1.0 / sample_rate_hz;
        let samples = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| Sample::new(start_time + i as f64 * dt, values))
            .collect();
        Self { samples }
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }
    pub fn validate(&self, expected_channels: usize) -> Result<(), CaptureError> {
        if self.samples.is_empty() {
            return Err(CaptureError::AcquisitionFault(
                "device delivered an empty block".into(),
            ));
        }
        if let Some(bad) = self
            .samples
            .iter()
            .find(|s| s.values.len() != expected_channels)
        {
            return Err(CaptureError::ShapeMismatch {
                expected: expected_channels,
                actual: bad.values.len(),
            });
        }
        if self
            .samples
            .windows(2)
            .any(|pair| pair[1].timestamp <= pair[0].timestamp)
        {
            return Err(CaptureError::AcquisitionFault(
                "timestamps within block are not increasing".into(),
            ));
        }
        Ok(())
    }
}
/// Anything that can hand out sample blocks; `Ok(None)` means the session ended.
pub trait BlockSource {
    fn next_block(&mut self) -> Result<Option<SampleBlock>, CaptureError>;
    /// Release the device. Called once when the pipeline stops.
    fn release(&mut self) {}
}
/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<Result<SampleBlock, CaptureError>>,
}
impl ManualSource {
    pub fn new(blocks: impl IntoIterator<Item = SampleBlock>) -> Self {
        Self {
            queue: blocks.into_iter().map(Ok).collect(),
        }
    }
    /// Queue a device error after the blocks already queued.
    pub fn push_fault(&mut self, reason: &str) {
        self.queue
            .push_back(Err(CaptureError::AcquisitionFault(reason.to_string())));
    }
}
impl BlockSource for ManualSource {
    fn next_block(&mut self) -> Result<Option<SampleBlock>, CaptureError> {
        self.queue.pop_front().transpose()
    }
}
#[derive(Clone, Debug)]
pub struct SimulationSettings {
    pub sample_rate_hz: f64,
    pub analog_channels: usize,
    pub min_block: usize,
    pub max_block: usize,
    /// Period of the pulse train on the analog channels.
    pub pulse_period_secs: f64,
    pub pulse_width_secs: f64,
    pub noise: f64,
    pub counter_bits: u32,
    pub counts_per_rev: f64,
    /// Encoder rotation; the sign flips every `reverse_every_secs`.
    pub revs_per_sec: f64,
    pub reverse_every_secs: f64,
    /// Stop after this many seconds of data.
    pub duration_secs: Option<f64>,
    /// Report a device fault after this many blocks.
    pub fault_after_blocks: Option<usize>,
    pub seed: u64,
}
impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 1000.0,
            analog_channels: 3,
            min_block: 80,
            max_block: 120,
            pulse_period_secs: 2.5,
            pulse_width_secs: 0.4,
            noise: 0.02,
            counter_bits: 32,
            counts_per_rev: 2048.0,
            revs_per_sec: 0.5,
            reverse_every_secs: 3.0,
            duration_secs: Some(10.0),
            fault_after_blocks: None,
            seed: 7,
        }
    }
}
/// Synthetic device: pulse trains on the analog inputs plus a quadrature
/// counter reported in its unsigned wrap-around representation.
pub struct SimulatedDaq {
    settings: SimulationSettings,
    rng: StdRng,
    next_index: u64,
    blocks_sent: usize,
    counts: f64,
}
impl SimulatedDaq {
    pub fn new(settings: SimulationSettings) -> Result<Self, CaptureError> {
        if settings.sample_rate_hz <= 0.0 {
            return Err(CaptureError::InvalidSampleRate);
        }
        if settings.min_block == 0 || settings.min_block > settings.max_block {
            return Err(CaptureError::ConfigInvalid(format!(
                "simulated block size range {}..={} is empty",
                settings.min_block, settings.max_block
            )));
        }
        let rng = StdRng::seed_from_u64(settings.seed);
        Ok(Self {
            settings,
            rng,
            next_index: 0,
            blocks_sent: 0,
            counts: 0.0,
        })
    }
    pub fn channel_count(&self) -> usize {
        self.settings.analog_channels + 1
    }
    fn analog_value(&mut self, t: f64, channel: usize) -> f64 {
        let s = &self.settings;
        let phase = (t + channel as f64 * s.pulse_width_secs * 0.5) % s.pulse_period_secs;
        let level = if phase < s.pulse_width_secs { 1.0 } else { 0.0 };
        let ripple = 0.05 * (TAU * 7.0 * t).sin();
        let noise = if s.noise > 0.0 {
            self.rng.gen_range(-s.noise..=s.noise)
        } else {
            0.0
        };
        level + ripple + noise
    }
    fn counter_value(&mut self, t: f64) -> f64 {
        let s = &self.settings;
        let direction = if ((t / s.reverse_every_secs) as u64) % 2 == 0 {
            1.0
        } else {
            -1.0
        };
        self.counts += direction * s.revs_per_sec * s.counts_per_rev / s.sample_rate_hz;
        let modulus = 2f64.powi(s.counter_bits as i32);
        self.counts.round().rem_euclid(modulus)
    }
}
impl BlockSource for SimulatedDaq {
    fn next_block(&mut self) -> Result<Option<SampleBlock>, CaptureError> {
        if let Some(limit) = self.settings.fault_after_blocks {
            if self.blocks_sent >= limit {
                return Err(CaptureError::AcquisitionFault(
                    "simulated device stopped responding".into(),
                ));
            }
        }
        let rate = self.settings.sample_rate_hz;
        let start = self.next_index as f64 / rate;
        if let Some(duration) = self.settings.duration_secs {
            if start >= duration {
                return Ok(None);
            }
        }
        let size = self
            .rng
            .gen_range(self.settings.min_block..=self.settings.max_block);
        let mut samples = Vec::with_capacity(size);
        for _ in 0..size {
            let t = self.next_index as f64 / rate;
            let mut values = Vec::with_capacity(self.channel_count());
            for channel in 0..self.settings.analog_channels {
                values.push(self.analog_value(t, channel));
            }
            values.push(self.counter_value(t));
            samples.push(Sample::new(t, values));
            self.next_index += 1;
        }
        self.blocks_sent += 1;
        Ok(Some(SampleBlock::new(samples)))
    }
    fn release(&mut self) {
        log::info!(
            "simulated DAQ released after {} blocks ({} samples)",
            self.blocks_sent,
            self.next_index
        );
    }
}
