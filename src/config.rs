// src/config.rs
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::drivers::{BufferSizing, CaptureConfig, CaptureError, EncoderSettings};

/// Largest ring accepted, in rows.
pub const MAX_BUFFER_ROWS: usize = 10_000_000;

/// Hardware settings per physical channel. Handed to the device driver as-is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub label: String,
    pub physical: String,
    pub min_volts: f64,
    pub max_volts: f64,
    pub terminal: String,
}

impl ChannelSettings {
    fn analog(idx: usize) -> Self {
        Self {
            label: format!("AI{idx}"),
            physical: format!("Dev1/ai{idx}"),
            min_volts: -10.0,
            max_volts: 10.0,
            terminal: "rse".to_owned(),
        }
    }

    fn encoder() -> Self {
        Self {
            label: "Encoder".to_owned(),
            physical: "Dev1/ctr0".to_owned(),
            min_volts: 0.0,
            max_volts: 0.0,
            terminal: "x4".to_owned(),
        }
    }
}

/// One acquisition session. The last channel is always the encoder counter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sample_rate_hz: f64,
    pub channels: Vec<ChannelSettings>,
    /// Visible span of the scrolling plot.
    pub plot_span_secs: f64,
    /// Nominal time between device callbacks.
    pub callback_span_secs: f64,
    /// Explicit ring size in rows; derived from the spans when absent.
    pub buffer_size: Option<usize>,
    pub encoder: EncoderSettings,
    pub capture: CaptureConfig,
    pub raw_log_path: Option<PathBuf>,
    pub capture_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut channels: Vec<ChannelSettings> = (0..3).map(ChannelSettings::analog).collect();
        channels.push(ChannelSettings::encoder());
        Self {
            sample_rate_hz: 1000.0,
            channels,
            plot_span_secs: 5.0,
            callback_span_secs: 0.1,
            buffer_size: None,
            encoder: EncoderSettings::default(),
            capture: CaptureConfig::default(),
            raw_log_path: None,
            capture_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CaptureError> {
        let config: SessionConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel_labels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.label.clone()).collect()
    }

    pub fn sizing(&self) -> BufferSizing {
        BufferSizing {
            sample_rate_hz: self.sample_rate_hz,
            plot_span_secs: self.plot_span_secs,
            capture_span_secs: self.capture.capture_span_secs,
            callback_span_secs: self.callback_span_secs,
        }
    }

    pub fn buffer_rows(&self) -> usize {
        self.buffer_size.unwrap_or_else(|| self.sizing().capacity())
    }

    /// Everything is checked before acquisition starts.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(self.sample_rate_hz > 0.0) || !self.sample_rate_hz.is_finite() {
            return Err(CaptureError::InvalidSampleRate);
        }
        if self.channels.len() < 2 {
            return Err(CaptureError::ConfigInvalid(format!(
                "need at least one analog channel plus the encoder, got {}",
                self.channels.len()
            )));
        }
        if !(self.plot_span_secs > 0.0) || !(self.callback_span_secs > 0.0) {
            return Err(CaptureError::ConfigInvalid(
                "plot and callback spans must be positive".into(),
            ));
        }
        let rows = self.buffer_rows();
        if rows > MAX_BUFFER_ROWS {
            return Err(CaptureError::ConfigInvalid(format!(
                "ring of {rows} rows exceeds the limit of {MAX_BUFFER_ROWS}"
            )));
        }
        self.encoder.validate()?;
        self.capture
            .validate(self.sample_rate_hz, self.buffer_rows(), self.channel_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::Slope;

    #[test]
    fn default_config_is_valid_and_sized_from_spans() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.channel_count(), 4);
        assert_eq!(config.channel_labels()[3], "Encoder");
        assert_eq!(config.buffer_rows(), 5000);
    }

    #[test]
    fn json_overrides_defaults() {
        let config = SessionConfig::from_json(
            r#"{
                "sample_rate_hz": 2000.0,
                "capture": { "level": 1.5, "slope": "falling", "capture_span_secs": 2.0 },
                "encoder": { "counts_per_rev": 1024.0, "delta_mode": "across_blocks" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.capture.slope, Slope::Falling);
        assert_eq!(config.capture.channel, 0);
        assert_eq!(config.encoder.counter_bits, 32);
        assert_eq!(config.buffer_rows(), 12000);
    }

    #[test]
    fn undersized_buffer_is_rejected() {
        let mut config = SessionConfig::default();
        config.buffer_size = Some(2999);
        assert!(matches!(config.validate(), Err(CaptureError::ConfigInvalid(_))));
        config.buffer_size = Some(3000);
        config.validate().unwrap();
    }

    #[test]
    fn oversized_buffer_is_rejected_before_allocation() {
        let explicit = SessionConfig::from_json(r#"{ "buffer_size": 10000000000000 }"#);
        assert!(matches!(explicit, Err(CaptureError::ConfigInvalid(_))));

        let derived = SessionConfig::from_json(r#"{ "plot_span_secs": 1e12 }"#);
        assert!(matches!(derived, Err(CaptureError::ConfigInvalid(_))));

        let config = SessionConfig {
            callback_span_secs: f64::INFINITY,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(CaptureError::ConfigInvalid(_))));
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(SessionConfig::from_json("{ nope"), Err(CaptureError::Json(_))));
    }
}
