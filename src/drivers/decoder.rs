//! Turns raw device blocks into engineering values.
//!
//! The last channel of every raw row is the encoder counter as the device
//! reports it: an unsigned fixed-width register holding a signed running
//! count. Decoding unwraps it, converts counts to degrees and replaces the
//! counter column with the angular change over the block divided by
//! `delta_divisor`. Analog channels pass through untouched; the rounding,
//! inversion and stacking offsets used for the shared plot live in
//! [`display_values`] so captured data never carries them.
use serde::{Deserialize, Serialize};
use crate::drivers::source::{Sample, SampleBlock};
use crate::drivers::CaptureError;
/// Where the per-block angular delta starts from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    /// First row of the block. Rotation between the previous block's last row
    /// and this block's first row is not counted.
    #[default]
    WithinBlock,
    /// Last row of the previous block when there is one.
    AcrossBlocks,
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub counter_bits: u32,
    pub counts_per_rev: f64,
    pub delta_divisor: f64,
    pub delta_mode: DeltaMode,
}
impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            counter_bits: 32,
            counts_per_rev: 2048.0,
            delta_divisor: 10.0,
            delta_mode: DeltaMode::WithinBlock,
        }
    }
}
impl EncoderSettings {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.counter_bits == 0 || self.counter_bits > 52 {
            return Err(CaptureError::ConfigInvalid(format!(
                "counter width {} bits is not representable",
                self.counter_bits
            )));
        }
        if self.counts_per_rev <= 0.0 {
            return Err(CaptureError::ConfigInvalid(
                "counts per revolution must be positive".into(),
            ));
        }
        if self.delta_divisor == 0.0 {
            return Err(CaptureError::ConfigInvalid(
                "angular delta divisor must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
/// Reinterpret an unsigned `bits`-wide register value as two's complement.
pub fn unwrap_count(raw: f64, bits: u32) -> f64 {
    let full = 2f64.powi(bits as i32);
    if raw >= full / 2.0 {
        raw - full
    } else {
        raw
    }
}
pub fn counts_to_degrees(count: f64, counts_per_rev: f64) -> f64 {
    count * 360.0 / counts_per_rev
}
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBlock {
    /// Same timestamps as the raw block; counter column replaced by the
    /// synthetic angular value.
    pub samples: Vec<Sample>,
    /// Unwrapped encoder position of every row, in degrees.
    pub positions_deg: Vec<f64>,
}
impl DecodedBlock {
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
#[derive(Clone, Debug)]
pub struct BlockDecoder {
    channel_count: usize,
    settings: EncoderSettings,
}
impl BlockDecoder {
    pub fn new(channel_count: usize, settings: EncoderSettings) -> Result<Self, CaptureError> {
        if channel_count < 2 {
            return Err(CaptureError::ConfigInvalid(format!(
                "need at least one analog channel and the counter, got {channel_count} channels"
            )));
        }
        settings.validate()?;
        Ok(Self {
            channel_count,
            settings,
        })
    }
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }
    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }
    fn position_deg(&self, raw_count: f64) -> f64 {
        let count = unwrap_count(raw_count, self.settings.counter_bits);
        counts_to_degrees(count, self.settings.counts_per_rev)
    }
    /// Decode one raw block. `prev_last_raw` is the last raw row of the
    /// previous block; it is only consulted in [`DeltaMode::AcrossBlocks`].
    /// Output depends on nothing but the arguments.
    pub fn decode(
        &self,
        raw: &SampleBlock,
        prev_last_raw: Option<&Sample>,
    ) -> Result<DecodedBlock, CaptureError> {
        raw.validate(self.channel_count)?;
        let counter = self.channel_count - 1;
        let positions_deg: Vec<f64> = raw
            .samples
            .iter()
            .map(|s| self.position_deg(s.values[counter]))
            .collect();
        let first = match (self.settings.delta_mode, prev_last_raw) {
            (DeltaMode::AcrossBlocks, Some(prev)) if prev.values.len() == self.channel_count => {
                self.position_deg(prev.values[counter])
            }
            _ => positions_deg[0],
        };
        let last = positions_deg[positions_deg.len() - 1];
        let synthetic = (last - first) / self.settings.delta_divisor;
        let samples = raw
            .samples
            .iter()
            .map(|s| {
                let mut values = s.values.clone();
                values[counter] = synthetic;
                Sample::new(s.timestamp, values)
            })
            .collect();
        Ok(DecodedBlock {
            samples,
            positions_deg,
        })
    }
}
/// Presentation transform for the shared plot: channel 0 inverted and
/// rounded, the other analog channels rounded, every channel lifted by
/// `2 * (channel_count - index)` so traces stack without overlapping. The
/// synthetic encoder channel (last) is offset but not rounded.
pub fn display_values(values: &[f64]) -> Vec<f64> {
    let channel_count = values.len();
    values
        .iter()
        .enumerate()
        .map(|(idx, &v)| {
            let shaped = if idx + 1 == channel_count {
                v
            } else if idx == 0 {
                (-v).round()
            } else {
                v.round()
            };
            shaped + 2.0 * (channel_count - idx) as f64
        })
        .collect()
}
