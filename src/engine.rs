// src/engine.rs
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use crate::drivers::{AcquisitionPipeline, BlockSource, CaptureError, PlotSink, PlotUpdate};
use crate::types::*;

/// Forwards plot updates to the UI channel.
struct MessagePlotSink(Sender<EngineMessage>);

impl PlotSink for MessagePlotSink {
    fn update(&mut self, update: PlotUpdate) -> Result<(), CaptureError> {
        self.0
            .send(EngineMessage::Plot(update))
            .map_err(|_| CaptureError::sink("plot", "ui channel closed"))
    }
}

pub struct EngineHandle {
    tx_cmd: Sender<EngineCommand>,
    rx: Receiver<EngineMessage>,
    worker: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn send(&self, cmd: EngineCommand) {
        // 线程已退出时命令无意义，忽略即可
        self.tx_cmd.send(cmd).ok();
    }

    pub fn messages(&self) -> &Receiver<EngineMessage> {
        &self.rx
    }

    /// Wait for the acquisition thread to finish.
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("acquisition thread panicked");
            }
        }
    }
}

/// Run `pipeline` over `source` on a dedicated thread. Commands are applied
/// between blocks; the pipeline was validated before it got here.
pub fn spawn_acquisition<S>(pipeline: AcquisitionPipeline, mut source: S) -> EngineHandle
where
    S: BlockSource + Send + 'static,
{
    let (tx, rx) = channel();
    let (tx_cmd, rx_cmd) = channel::<EngineCommand>();
    let mut pipeline = pipeline.with_plot_sink(Box::new(MessagePlotSink(tx.clone())));

    let worker = thread::spawn(move || {
        tx.send(EngineMessage::Log("acquisition started".to_owned())).ok();
        let config = pipeline.config_handle();
        let stop = pipeline.stop_handle();

        let outcome = pipeline.run_with(&mut source, |report| {
            // 1. 处理 UI 命令
            while let Ok(cmd) = rx_cmd.try_recv() {
                match cmd {
                    EngineCommand::SetCapture(next) => match config.set(next) {
                        Ok(()) => {
                            tx.send(EngineMessage::Log("capture settings updated".to_owned())).ok();
                        }
                        Err(e) => {
                            tx.send(EngineMessage::Log(format!("capture settings rejected: {e}"))).ok();
                        }
                    },
                    EngineCommand::Stop => stop.request_stop(),
                }
            }

            // 2. 转发本块结果
            if let Some(moment) = report.triggered_at {
                tx.send(EngineMessage::Triggered(moment)).ok();
            }
            if let Some(summary) = report.captured {
                tx.send(EngineMessage::Captured(summary)).ok();
            }
            if let Some(moment) = report.lost {
                tx.send(EngineMessage::CaptureLost(moment)).ok();
            }
            for failure in &report.sink_failures {
                tx.send(EngineMessage::SinkFailure(failure.to_string())).ok();
            }
        });

        match outcome {
            Ok(report) => {
                for failure in &report.close_failures {
                    tx.send(EngineMessage::SinkFailure(failure.to_string())).ok();
                }
                tx.send(EngineMessage::Stopped {
                    blocks: report.blocks,
                    captures: report.captures,
                    discarded_capture: report.discarded_capture,
                })
                .ok();
            }
            Err(e) => {
                tx.send(EngineMessage::Fault {
                    reason: e.to_string(),
                    discarded_capture: pipeline.discarded_capture(),
                })
                .ok();
            }
        }
    });

    EngineHandle {
        tx_cmd,
        rx,
        worker: Some(worker),
    }
}
