// src/main.rs
mod config;
mod drivers;
mod engine;
mod recorder;
mod types;
use std::path::PathBuf;
use anyhow::{Context, Result};
use config::SessionConfig;
use drivers::{
    render_plot_png, AcquisitionPipeline, CaptureSink, CsvCaptureSink, MemoryCaptureSink,
    PlotStyle, PlotUpdate, QueuedCaptureSink, SimulatedDaq, SimulationSettings,
};
use recorder::CsvRecorder;
use types::EngineMessage;
const DEFAULT_RUN_SECONDS: f64 = 12.0;
fn load_config() -> Result<SessionConfig> {
    match std::env::args().nth(1) {
        Some(path) => SessionConfig::load(&path)
            .with_context(|| format!("failed to load session config from {path}")),
        None => Ok(SessionConfig::default()),
    }
}
fn simulation_for(config: &SessionConfig) -> SimulationSettings {
    let run_seconds = std::env::var("DAQSCOPE_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_RUN_SECONDS);
    let block = (config.callback_span_secs * config.sample_rate_hz).round().max(1.0) as usize;
    SimulationSettings {
        sample_rate_hz: config.sample_rate_hz,
        analog_channels: config.channel_count() - 1,
        min_block: (block * 4 / 5).max(1),
        max_block: block * 6 / 5 + 1,
        counter_bits: config.encoder.counter_bits,
        counts_per_rev: config.encoder.counts_per_rev,
        duration_secs: Some(run_seconds),
        ..SimulationSettings::default()
    }
}
// 入口函数
fn main() -> Result<()> {
    env_logger::init();
    let config = load_config()?;
    config.validate().context("session config rejected")?;
    let labels = config.channel_labels();

    let capture_sink: Box<dyn CaptureSink> = match &config.capture_dir {
        Some(dir) => Box::new(QueuedCaptureSink::spawn(
            CsvCaptureSink::new(dir, labels.clone())
                .with_context(|| format!("cannot create capture directory {}", dir.display()))?,
        )),
        None => Box::new(MemoryCaptureSink::new()),
    };
    let mut pipeline = AcquisitionPipeline::new(&config, capture_sink)?;
    if let Some(path) = &config.raw_log_path {
        let recorder = CsvRecorder::create(path, &labels)
            .with_context(|| format!("cannot open raw log {}", path.display()))?;
        pipeline = pipeline.with_raw_log(Box::new(recorder));
    }
    let source = SimulatedDaq::new(simulation_for(&config))?;
    let mut engine = engine::spawn_acquisition(pipeline, source);

    let mut last_plot: Option<PlotUpdate> = None;
    let mut fault = None;
    for message in engine.messages().iter() {
        match message {
            EngineMessage::Log(line) => log::info!("{line}"),
            EngineMessage::Plot(update) => last_plot = Some(update),
            EngineMessage::Triggered(t) => log::info!("triggered at t={t:.3}s"),
            EngineMessage::Captured(summary) => log::info!(
                "captured {} rows from t={:.3}s",
                summary.rows,
                summary.trigger_moment
            ),
            EngineMessage::CaptureLost(t) => log::warn!("capture from t={t:.3}s lost"),
            EngineMessage::SinkFailure(reason) => log::warn!("{reason}"),
            EngineMessage::Stopped {
                blocks,
                captures,
                discarded_capture,
            } => {
                println!("💾 {blocks} blocks processed, {captures} captures");
                if let Some(t) = discarded_capture {
                    println!("⚠️ capture triggered at t={t:.3}s was cut short and discarded");
                }
                break;
            }
            EngineMessage::Fault {
                reason,
                discarded_capture,
            } => {
                if let Some(t) = discarded_capture {
                    println!("⚠️ capture triggered at t={t:.3}s was cut short and discarded");
                }
                fault = Some(reason);
                break;
            }
        }
    }
    engine.join();

    if let Some(update) = last_plot {
        let png = render_plot_png(&update, PlotStyle::default())?;
        let path = config
            .capture_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daqscope_snapshot.png");
        std::fs::write(&path, png).with_context(|| format!("cannot write {}", path.display()))?;
        println!("📈 plot snapshot saved: {}", path.display());
    }
    if let Some(reason) = fault {
        anyhow::bail!("acquisition fault: {reason}");
    }
    Ok(())
}
