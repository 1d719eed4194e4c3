use serde::{Deserialize, Serialize};
use crate::drivers::buffer::SampleRing;
use crate::drivers::capture::CaptureRecord;
use crate::drivers::source::Sample;
use crate::drivers::CaptureError;
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slope {
    Rising,
    Falling,
}
impl Slope {
    /// Rising: `prev < level <= curr`. Falling: `prev > level >= curr`.
    pub fn crosses(self, prev: f64, curr: f64, level: f64) -> bool {
        match self {
            Slope::Rising => prev < level && level <= curr,
            Slope::Falling => prev > level && level >= curr,
        }
    }
}
/// Trigger settings owned by the UI; the pipeline reads a copy per block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub level: f64,
    pub slope: Slope,
    pub capture_span_secs: f64,
    /// Channel the condition is evaluated on.
    pub channel: usize,
}
impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            level: 0.5,
            slope: Slope::Rising,
            capture_span_secs: 1.0,
            channel: 0,
        }
    }
}
impl CaptureConfig {
    /// The ring must hold three capture windows, and the watched channel must
    /// be an analog input.
    pub fn validate(
        &self,
        sample_rate_hz: f64,
        buffer_rows: usize,
        channel_count: usize,
    ) -> Result<(), CaptureError> {
        if !(self.capture_span_secs > 0.0) {
            return Err(CaptureError::ConfigInvalid(
                "capture span must be positive".into(),
            ));
        }
        if !self.level.is_finite() {
            return Err(CaptureError::ConfigInvalid(
                "trigger level must be finite".into(),
            ));
        }
        if self.channel + 1 >= channel_count {
            return Err(CaptureError::ConfigInvalid(format!(
                "trigger channel {} is not an analog input (channels: {channel_count})",
                self.channel
            )));
        }
        let required = (self.capture_span_secs * 3.0 * sample_rate_hz).ceil() as usize;
        if buffer_rows < required {
            return Err(CaptureError::ConfigInvalid(format!(
                "buffer of {buffer_rows} rows cannot hold a {}s capture three times ({required} rows)",
                self.capture_span_secs
            )));
        }
        Ok(())
    }
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TriggerPhase {
    /// No block seen since the last reset.
    Idle,
    Armed,
    /// Waiting for `rows` samples starting at `moment` to be buffered.
    Capturing { moment: f64, rows: usize },
}
#[derive(Clone, Debug, PartialEq)]
pub enum TriggerEvent {
    Triggered { moment: f64 },
    Completed(CaptureRecord),
    /// The trigger row left the ring before the window filled.
    Lost { moment: f64 },
}
/// Level/slope trigger with fixed-length capture windows.
#[derive(Debug)]
pub struct TriggerMachine {
    phase: TriggerPhase,
    prev_last: Option<Sample>,
    captures: u64,
}
impl Default for TriggerMachine {
    fn default() -> Self {
        Self::new()
    }
}
impl TriggerMachine {
    pub fn new() -> Self {
        Self {
            phase: TriggerPhase::Idle,
            prev_last: None,
            captures: 0,
        }
    }
    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }
    pub fn is_armed(&self) -> bool {
        self.phase == TriggerPhase::Armed
    }
    pub fn trigger_moment(&self) -> Option<f64> {
        match self.phase {
            TriggerPhase::Capturing { moment, .. } => Some(moment),
            _ => None,
        }
    }
    pub fn prev_last(&self) -> Option<&Sample> {
        self.prev_last.as_ref()
    }
    pub fn captures(&self) -> u64 {
        self.captures
    }
    pub fn reset(&mut self) {
        self.phase = TriggerPhase::Idle;
        self.prev_last = None;
    }
    /// Drop a pending capture. Returns its trigger moment if one was pending.
    pub fn abort(&mut self) -> Option<f64> {
        let pending = self.trigger_moment();
        if pending.is_some() {
            self.phase = TriggerPhase::Armed;
        }
        pending
    }
    /// Evaluate one decoded block. `ring` must already contain the block.
    pub fn evaluate(
        &mut self,
        block: &[Sample],
        config: &CaptureConfig,
        ring: &SampleRing,
    ) -> Vec<TriggerEvent> {
        let mut events = Vec::new();
        if self.phase == TriggerPhase::Idle {
            self.prev_last = None;
            self.phase = TriggerPhase::Armed;
            log::debug!("trigger armed");
        }
        if self.phase == TriggerPhase::Armed {
            if let Some(moment) = self.first_crossing(block, config) {
                let rows = ring.rows_for(config.capture_span_secs).max(1);
                self.phase = TriggerPhase::Capturing { moment, rows };
                log::info!("trigger fired at t={moment:.4}s, capturing {rows} rows");
                events.push(TriggerEvent::Triggered { moment });
            }
        }
        if let TriggerPhase::Capturing { moment, rows } = self.phase {
            if ring.oldest().map_or(true, |s| s.timestamp > moment) {
                log::warn!("capture at t={moment:.4}s lost: trigger row already evicted");
                self.phase = TriggerPhase::Armed;
                events.push(TriggerEvent::Lost { moment });
            } else if let Some(window) = ring.window_from(moment, rows) {
                self.captures += 1;
                self.phase = TriggerPhase::Armed;
                events.push(TriggerEvent::Completed(CaptureRecord::from_samples(
                    moment, &window,
                )));
            }
        }
        if let Some(last) = block.last() {
            self.prev_last = Some(last.clone());
        }
        events
    }
    fn first_crossing(&self, block: &[Sample], config: &CaptureConfig) -> Option<f64> {
        let channel = config.channel;
        let mut prev = self
            .prev_last
            .as_ref()
            .and_then(|s| s.values.get(channel).copied());
        for sample in block {
            let curr = sample.values.get(channel).copied()?;
            if let Some(p) = prev {
                if config.slope.crosses(p, curr, config.level) {
                    return Some(sample.timestamp);
                }
            }
            prev = Some(curr);
        }
        None
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn ring_with(samples: &[Sample], capacity: usize) -> SampleRing {
        let mut ring = SampleRing::with_capacity(10.0, capacity).unwrap();
        ring.ingest(samples);
        ring
    }
    /// Rows at 10 Hz starting at sample index `start`.
    fn block(start: usize, values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new((start + i) as f64 / 10.0, vec![v, 0.0]))
            .collect()
    }
    fn config(slope: Slope, span: f64) -> CaptureConfig {
        CaptureConfig {
            level: 0.5,
            slope,
            capture_span_secs: span,
            channel: 0,
        }
    }
    #[test]
    fn rising_crossing_fires_on_upper_sample() {
        let mut machine = TriggerMachine::new();
        let data = block(0, &[0.3, 0.7]);
        let ring = ring_with(&data, 100);
        let events = machine.evaluate(&data, &config(Slope::Rising, 2.0), &ring);
        assert_eq!(events, vec![TriggerEvent::Triggered { moment: 0.1 }]);
        assert_eq!(machine.trigger_moment(), Some(0.1));
    }
    #[test]
    fn falling_does_not_fire_on_rising_data() {
        let mut machine = TriggerMachine::new();
        let data = block(0, &[0.3, 0.7]);
        let ring = ring_with(&data, 100);
        assert!(machine
            .evaluate(&data, &config(Slope::Falling, 2.0), &ring)
            .is_empty());
        assert!(machine.is_armed());
    }
    #[test]
    fn level_equality_counts_as_crossing() {
        assert!(Slope::Rising.crosses(0.4, 0.5, 0.5));
        assert!(!Slope::Rising.crosses(0.5, 0.6, 0.5));
        assert!(Slope::Falling.crosses(0.6, 0.5, 0.5));
        assert!(!Slope::Falling.crosses(0.5, 0.4, 0.5));
    }
    #[test]
    fn crossing_across_block_boundary_uses_previous_last_sample() {
        let mut machine = TriggerMachine::new();
        let cfg = config(Slope::Rising, 0.5);
        let mut ring = SampleRing::with_capacity(10.0, 100).unwrap();
        let first = block(0, &[0.1, 0.2]);
        ring.ingest(&first);
        assert!(machine.evaluate(&first, &cfg, &ring).is_empty());
        let second = block(2, &[0.9, 0.9]);
        ring.ingest(&second);
        let events = machine.evaluate(&second, &cfg, &ring);
        assert_eq!(events, vec![TriggerEvent::Triggered { moment: 0.2 }]);
    }
    #[test]
    fn first_block_of_session_has_no_predecessor() {
        let mut machine = TriggerMachine::new();
        let data = block(0, &[0.9, 0.9]);
        let ring = ring_with(&data, 100);
        assert!(machine
            .evaluate(&data, &config(Slope::Rising, 0.5), &ring)
            .is_empty());
        assert_eq!(machine.prev_last().unwrap().timestamp, data[1].timestamp);
    }
    #[test]
    fn capture_is_exact_and_machine_rearms() {
        let mut machine = TriggerMachine::new();
        let cfg = config(Slope::Rising, 0.5);
        let mut ring = SampleRing::with_capacity(10.0, 100).unwrap();
        let first = block(0, &[0.0, 1.0, 1.0]);
        ring.ingest(&first);
        assert_eq!(
            machine.evaluate(&first, &cfg, &ring),
            vec![TriggerEvent::Triggered { moment: 0.1 }]
        );
        let second = block(3, &[0.0, 0.0, 1.0, 1.0]);
        ring.ingest(&second);
        let events = machine.evaluate(&second, &cfg, &ring);
        let record = match &events[..] {
            [TriggerEvent::Completed(record)] => record,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(record.rows(), 5);
        assert_eq!(record.trigger_moment(), 0.1);
        assert_eq!(record.timestamps()[0], 0.1);
        assert!((record.timestamps()[4] - 0.5).abs() < 1e-9);
        assert!(machine.is_armed());
        assert_eq!(machine.captures(), 1);
        // The crossing at 0.5 in the completing block is not honored.
        let third = block(7, &[0.0, 1.0]);
        ring.ingest(&third);
        assert_eq!(
            machine.evaluate(&third, &cfg, &ring),
            vec![TriggerEvent::Triggered { moment: 0.8 }]
        );
    }
    #[test]
    fn only_first_crossing_per_block_is_honored() {
        let mut machine = TriggerMachine::new();
        let data = block(0, &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let ring = ring_with(&data, 100);
        let events = machine.evaluate(&data, &config(Slope::Rising, 10.0), &ring);
        assert_eq!(events, vec![TriggerEvent::Triggered { moment: 0.1 }]);
    }
    #[test]
    fn evicted_trigger_row_reports_loss() {
        let mut machine = TriggerMachine::new();
        let cfg = config(Slope::Rising, 0.5);
        let mut ring = SampleRing::with_capacity(10.0, 3).unwrap();
        let first = block(0, &[0.0, 1.0]);
        ring.ingest(&first);
        machine.evaluate(&first, &cfg, &ring);
        let second = block(2, &[1.0, 1.0, 1.0]);
        ring.ingest(&second);
        assert_eq!(
            machine.evaluate(&second, &cfg, &ring),
            vec![TriggerEvent::Lost { moment: 0.1 }]
        );
        assert!(machine.is_armed());
    }
    #[test]
    fn abort_discards_pending_window() {
        let mut machine = TriggerMachine::new();
        let data = block(0, &[0.0, 1.0]);
        let ring = ring_with(&data, 100);
        machine.evaluate(&data, &config(Slope::Rising, 2.0), &ring);
        assert_eq!(machine.abort(), Some(0.1));
        assert_eq!(machine.abort(), None);
        machine.reset();
        assert_eq!(machine.phase(), TriggerPhase::Idle);
    }
    #[test]
    fn validate_requires_three_windows_of_buffer() {
        let cfg = config(Slope::Rising, 1.0);
        assert!(cfg.validate(1000.0, 3000, 2).is_ok());
        assert!(matches!(
            cfg.validate(1000.0, 2999, 2),
            Err(CaptureError::ConfigInvalid(_))
        ));
        let counter = CaptureConfig { channel: 1, ..cfg };
        assert!(counter.validate(1000.0, 3000, 2).is_err());
    }
}
