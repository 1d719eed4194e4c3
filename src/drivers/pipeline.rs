use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use crate::config::SessionConfig;
use crate::drivers::buffer::SampleRing;
use crate::drivers::capture::CaptureSink;
use crate::drivers::decoder::BlockDecoder;
use crate::drivers::error::CaptureError;
use crate::drivers::plot::{render_window, PlotSink};
use crate::drivers::source::{BlockSource, Sample, SampleBlock};
use crate::drivers::trigger::{CaptureConfig, TriggerEvent, TriggerMachine, TriggerPhase};
use crate::recorder::RawLogSink;
/// Capture settings shared with the UI. Writers are validated against the
/// session's buffer; the pipeline takes one snapshot per block.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<CaptureConfig>>,
    sample_rate_hz: f64,
    buffer_rows: usize,
    channel_count: usize,
}
impl ConfigHandle {
    pub fn snapshot(&self) -> CaptureConfig {
        self.inner.read().clone()
    }
    pub fn set(&self, config: CaptureConfig) -> Result<(), CaptureError> {
        config.validate(self.sample_rate_hz, self.buffer_rows, self.channel_count)?;
        *self.inner.write() = config;
        Ok(())
    }
}
/// Cooperative stop flag, checked between blocks.
#[derive(Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);
impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureSummary {
    pub trigger_moment: f64,
    pub rows: usize,
}
/// What happened while processing one block.
#[derive(Debug, Default)]
pub struct BlockReport {
    pub rows: usize,
    pub evicted: usize,
    pub triggered_at: Option<f64>,
    pub captured: Option<CaptureSummary>,
    pub lost: Option<f64>,
    /// Non-fatal sink errors; acquisition carried on regardless.
    pub sink_failures: Vec<CaptureError>,
}
#[derive(Debug, Default)]
pub struct StopReport {
    pub blocks: u64,
    pub captures: u64,
    /// Trigger moment of a window that was still filling at shutdown.
    pub discarded_capture: Option<f64>,
    pub close_failures: Vec<CaptureError>,
}
/// Owns the whole per-block chain: decode, buffer, trigger, capture, plot,
/// raw log. Nothing else mutates the ring or trigger state.
pub struct AcquisitionPipeline {
    decoder: BlockDecoder,
    ring: SampleRing,
    trigger: TriggerMachine,
    config: ConfigHandle,
    labels: Vec<String>,
    plot_span_secs: f64,
    capture_sink: Box<dyn CaptureSink>,
    plot_sink: Option<Box<dyn PlotSink>>,
    raw_log: Option<Box<dyn RawLogSink>>,
    prev_last_raw: Option<Sample>,
    blocks: u64,
    stop: StopHandle,
    discarded_capture: Option<f64>,
    closed: bool,
}
impl AcquisitionPipeline {
    pub fn new(
        session: &SessionConfig,
        capture_sink: Box<dyn CaptureSink>,
    ) -> Result<Self, CaptureError> {
        session.validate()?;
        let channel_count = session.channel_count();
        let buffer_rows = session.buffer_rows();
        let decoder = BlockDecoder::new(channel_count, session.encoder.clone())?;
        let ring = SampleRing::with_capacity(session.sample_rate_hz, buffer_rows)?;
        let config = ConfigHandle {
            inner: Arc::new(RwLock::new(session.capture.clone())),
            sample_rate_hz: session.sample_rate_hz,
            buffer_rows,
            channel_count,
        };
        log::info!(
            "pipeline ready: {channel_count} channels at {} Hz, ring of {buffer_rows} rows",
            session.sample_rate_hz
        );
        Ok(Self {
            decoder,
            ring,
            trigger: TriggerMachine::new(),
            config,
            labels: session.channel_labels(),
            plot_span_secs: session.plot_span_secs,
            capture_sink,
            plot_sink: None,
            raw_log: None,
            prev_last_raw: None,
            blocks: 0,
            stop: StopHandle::default(),
            discarded_capture: None,
            closed: false,
        })
    }
    pub fn with_plot_sink(mut self, sink: Box<dyn PlotSink>) -> Self {
        self.plot_sink = Some(sink);
        self
    }
    pub fn with_raw_log(mut self, log: Box<dyn RawLogSink>) -> Self {
        self.raw_log = Some(log);
        self
    }
    pub fn config_handle(&self) -> ConfigHandle {
        self.config.clone()
    }
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
    pub fn ring(&self) -> &SampleRing {
        &self.ring
    }
    pub fn trigger_phase(&self) -> TriggerPhase {
        self.trigger.phase()
    }
    pub fn blocks(&self) -> u64 {
        self.blocks
    }
    /// Trigger moment of the window thrown away by `shutdown`, if any.
    pub fn discarded_capture(&self) -> Option<f64> {
        self.discarded_capture
    }
    /// Start of a session: empty ring, trigger back to idle. A pipeline
    /// serves one session; once shut down its sinks are closed and it
    /// refuses to start again.
    pub fn initialize(&mut self) -> Result<(), CaptureError> {
        if self.closed {
            return Err(CaptureError::AcquisitionFault(
                "pipeline already stopped, build a new one for the next session".into(),
            ));
        }
        self.ring.clear();
        self.trigger.reset();
        self.prev_last_raw = None;
        self.blocks = 0;
        Ok(())
    }
    /// Process one block delivered by the device.
    pub fn on_block(&mut self, raw: SampleBlock) -> Result<BlockReport, CaptureError> {
        if self.closed {
            return Err(CaptureError::AcquisitionFault(
                "block delivered after the pipeline stopped".into(),
            ));
        }
        if let (Some(prev), Some(first)) = (&self.prev_last_raw, raw.first()) {
            if first.timestamp <= prev.timestamp {
                return Err(CaptureError::AcquisitionFault(format!(
                    "block starting at t={} overlaps previous block ending at t={}",
                    first.timestamp, prev.timestamp
                )));
            }
        }
        let config = self.config.snapshot();
        let decoded = self.decoder.decode(&raw, self.prev_last_raw.as_ref())?;
        let mut report = BlockReport {
            rows: decoded.len(),
            evicted: self.ring.ingest(&decoded.samples),
            ..BlockReport::default()
        };
        for event in self.trigger.evaluate(&decoded.samples, &config, &self.ring) {
            match event {
                TriggerEvent::Triggered { moment } => report.triggered_at = Some(moment),
                TriggerEvent::Lost { moment } => report.lost = Some(moment),
                TriggerEvent::Completed(record) => {
                    let summary = CaptureSummary {
                        trigger_moment: record.trigger_moment(),
                        rows: record.rows(),
                    };
                    match self.capture_sink.emit(record) {
                        Ok(()) => report.captured = Some(summary),
                        Err(e) => {
                            log::error!(
                                "capture at t={:.4}s not persisted: {e}",
                                summary.trigger_moment
                            );
                            report.sink_failures.push(as_sink_failure("capture", e));
                        }
                    }
                }
            }
        }
        // 异步写入的失败在后续块里补报
        for e in self.capture_sink.take_failures() {
            log::error!("{e}");
            report.sink_failures.push(as_sink_failure("capture", e));
        }
        if let Some(plot) = self.plot_sink.as_mut() {
            let update = render_window(&self.ring, self.plot_span_secs, &self.labels);
            if let Err(e) = plot.update(update) {
                log::warn!("plot update dropped: {e}");
                report.sink_failures.push(as_sink_failure("plot", e));
            }
        }
        if let Some(raw_log) = self.raw_log.as_mut() {
            if let Err(e) = raw_log.append(&raw) {
                log::error!("raw log append failed: {e}");
                report.sink_failures.push(as_sink_failure("raw log", e));
            }
        }
        self.prev_last_raw = raw.samples.last().cloned();
        self.blocks += 1;
        Ok(report)
    }
    /// Halt: discard a half-filled capture window (reported, never persisted)
    /// and close the sinks. Safe to call more than once; later calls repeat
    /// the counts and the discarded moment.
    pub fn shutdown(&mut self) -> StopReport {
        let mut report = StopReport {
            blocks: self.blocks,
            captures: self.trigger.captures(),
            discarded_capture: self.discarded_capture,
            ..StopReport::default()
        };
        if self.closed {
            return report;
        }
        self.closed = true;
        self.discarded_capture = self.trigger.abort();
        report.discarded_capture = self.discarded_capture;
        if let Some(moment) = report.discarded_capture {
            log::warn!("stopping mid-capture: window triggered at t={moment:.4}s discarded");
        }
        if let Some(raw_log) = self.raw_log.as_mut() {
            if let Err(e) = raw_log.close() {
                report.close_failures.push(as_sink_failure("raw log", e));
            }
        }
        if let Err(e) = self.capture_sink.close() {
            report.close_failures.push(as_sink_failure("capture", e));
        }
        for e in self.capture_sink.take_failures() {
            report.close_failures.push(as_sink_failure("capture", e));
        }
        for e in &report.close_failures {
            log::error!("{e}");
        }
        log::info!(
            "pipeline stopped after {} blocks, {} captures",
            report.blocks,
            report.captures
        );
        report
    }
    pub fn run<S: BlockSource>(&mut self, source: &mut S) -> Result<StopReport, CaptureError> {
        self.run_with(source, |_| {})
    }
    /// Pull blocks until the source ends, a stop is requested or a fatal
    /// error occurs. The source is released and sinks closed in every case.
    /// On error, a window cut short is still available from
    /// `discarded_capture`. Runs once per pipeline.
    pub fn run_with<S, F>(&mut self, source: &mut S, mut on_report: F) -> Result<StopReport, CaptureError>
    where
        S: BlockSource,
        F: FnMut(&BlockReport),
    {
        if let Err(e) = self.initialize() {
            source.release();
            return Err(e);
        }
        let outcome = loop {
            if self.stop.is_stop_requested() {
                log::info!("stop requested");
                break Ok(());
            }
            let block = match source.next_block() {
                Ok(Some(block)) => block,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            match self.on_block(block) {
                Ok(report) => on_report(&report),
                Err(e) => break Err(e),
            }
        };
        let report = self.shutdown();
        source.release();
        match outcome {
            Ok(()) => Ok(report),
            Err(e) => {
                log::error!("acquisition aborted: {e}");
                Err(e)
            }
        }
    }
}
fn as_sink_failure(sink: &'static str, e: CaptureError) -> CaptureError {
    match e {
        CaptureError::SinkFailure { .. } => e,
        other => CaptureError::sink(sink, other),
    }
}
