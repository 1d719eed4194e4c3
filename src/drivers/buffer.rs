use std::collections::VecDeque;
use crate::drivers::source::Sample;
use crate::drivers::CaptureError;
/// Spans the ring must cover. The capture span is tripled so a window that
/// starts near the newest row survives until it is complete.
#[derive(Clone, Copy, Debug)]
pub struct BufferSizing {
    pub sample_rate_hz: f64,
    pub plot_span_secs: f64,
    pub capture_span_secs: f64,
    pub callback_span_secs: f64,
}
impl BufferSizing {
    pub fn capacity(&self) -> usize {
        let span = self
            .plot_span_secs
            .max(self.capture_span_secs * 3.0)
            .max(self.callback_span_secs * 3.0);
        (span * self.sample_rate_hz).ceil() as usize
    }
}
/// Bounded FIFO of decoded rows in arrival (= timestamp) order.
pub struct SampleRing {
    rows: VecDeque<Sample>,
    sample_rate_hz: f64,
    capacity: usize,
}
impl SampleRing {
    pub fn with_capacity(sample_rate_hz: f64, capacity: usize) -> Result<Self, CaptureError> {
        if sample_rate_hz <= 0.0 {
            return Err(CaptureError::InvalidSampleRate);
        }
        if capacity == 0 {
            return Err(CaptureError::ConfigInvalid(
                "ring buffer capacity must be positive".into(),
            ));
        }
        let mut rows = VecDeque::new();
        rows.try_reserve(capacity).map_err(|e| {
            CaptureError::ConfigInvalid(format!("cannot allocate ring of {capacity} rows: {e}"))
        })?;
        Ok(Self {
            rows,
            sample_rate_hz,
            capacity,
        })
    }
    pub fn from_sizing(sizing: BufferSizing) -> Result<Self, CaptureError> {
        Self::with_capacity(sizing.sample_rate_hz, sizing.capacity())
    }
    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn clear(&mut self) {
        self.rows.clear();
    }
    pub fn newest(&self) -> Option<&Sample> {
        self.rows.back()
    }
    pub fn oldest(&self) -> Option<&Sample> {
        self.rows.front()
    }
    /// Append rows at the tail, then drop from the head until the ring fits.
    /// Returns how many rows were evicted.
    pub fn ingest<'a>(&mut self, samples: impl IntoIterator<Item = &'a Sample>) -> usize {
        let mut evicted = 0;
        for sample in samples {
            if self.rows.len() == self.capacity {
                self.rows.pop_front();
                evicted += 1;
            }
            self.rows.push_back(sample.clone());
        }
        evicted
    }
    /// Number of rows covering `span_secs` at the configured rate.
    pub fn rows_for(&self, span_secs: f64) -> usize {
        (span_secs * self.sample_rate_hz).round().max(0.0) as usize
    }
    /// The newest `round(span * rate)` rows, oldest first, clamped to what is
    /// buffered.
    pub fn range_last_seconds(&self, span_secs: f64) -> Vec<Sample> {
        let take = self.rows_for(span_secs).min(self.rows.len());
        self.rows
            .iter()
            .skip(self.rows.len() - take)
            .cloned()
            .collect()
    }
    /// Position of the first row stamped at or after `timestamp`.
    pub fn position_of(&self, timestamp: f64) -> Option<usize> {
        let idx = self.rows.partition_point(|s| s.timestamp < timestamp);
        (idx < self.rows.len()).then_some(idx)
    }
    /// `count` rows starting at the row stamped `start`, or `None` while the
    /// ring does not hold all of them yet.
    pub fn window_from(&self, start: f64, count: usize) -> Option<Vec<Sample>> {
        let idx = self.position_of(start)?;
        if idx + count > self.rows.len() {
            return None;
        }
        Some(self.rows.range(idx..idx + count).cloned().collect())
    }
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.rows.iter()
    }
}
