// src/types.rs
use crate::drivers::{CaptureConfig, CaptureSummary, PlotUpdate};

// UI 发给采集线程的命令
#[derive(Clone, Debug)]
pub enum EngineCommand {
    SetCapture(CaptureConfig),
    Stop,
}

// 采集线程发给 UI 的消息
#[derive(Clone, Debug)]
pub enum EngineMessage {
    Log(String),
    Plot(PlotUpdate),
    Triggered(f64),
    Captured(CaptureSummary),
    CaptureLost(f64),
    SinkFailure(String),
    /// Session over. `discarded_capture` is the trigger moment of a window
    /// cut short by the stop.
    Stopped {
        blocks: u64,
        captures: u64,
        discarded_capture: Option<f64>,
    },
    /// Session aborted. A window cut short by the fault is reported the
    /// same way as on a normal stop.
    Fault {
        reason: String,
        discarded_capture: Option<f64>,
    },
}
