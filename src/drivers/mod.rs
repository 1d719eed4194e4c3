// src/drivers/mod.rs
// 采集核心：解码 -> 环形缓冲 -> 触发 -> 捕获/绘图
pub mod buffer;
pub mod capture;
pub mod decoder;
pub mod error;
pub mod pipeline;
pub mod plot;
pub mod source;
pub mod trigger;
// 公开导出这些模块里的结构体，方便外部调用
pub use buffer::{BufferSizing, SampleRing};
pub use capture::{CaptureRecord, CaptureSink, CsvCaptureSink, MemoryCaptureSink, QueuedCaptureSink};
pub use decoder::{display_values, BlockDecoder, DecodedBlock, DeltaMode, EncoderSettings};
pub use error::CaptureError;
pub use pipeline::{
    AcquisitionPipeline, BlockReport, CaptureSummary, ConfigHandle, StopHandle, StopReport,
};
pub use plot::{render_plot_png, render_window, LatestPlot, PlotSink, PlotStyle, PlotUpdate};
pub use source::{BlockSource, ManualSource, Sample, SampleBlock, SimulatedDaq, SimulationSettings};
pub use trigger::{CaptureConfig, Slope, TriggerEvent, TriggerMachine, TriggerPhase};
