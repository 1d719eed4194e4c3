// src/recorder.rs
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::drivers::{CaptureError, SampleBlock};

/// Continuous log of raw device rows, independent of triggered capture.
pub trait RawLogSink: Send {
    fn append(&mut self, block: &SampleBlock) -> Result<(), CaptureError>;
    fn close(&mut self) -> Result<(), CaptureError>;
}

pub struct CsvRecorder {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    rows_written: u64,
}

impl CsvRecorder {
    pub fn create(path: impl AsRef<Path>, channel_labels: &[String]) -> Result<Self, CaptureError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut w = BufWriter::new(File::create(&path)?);
        // 表头: Timestamp, <channel labels>
        write!(w, "Timestamp")?;
        for label in channel_labels {
            write!(w, ",{label}")?;
        }
        writeln!(w)?;
        log::info!("raw recording started: {}", path.display());
        Ok(Self { writer: Some(w), path, rows_written: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn is_recording(&self) -> bool {
        self.writer.is_some()
    }

    fn write_block(w: &mut BufWriter<File>, block: &SampleBlock) -> std::io::Result<()> {
        for sample in &block.samples {
            write!(w, "{:.6}", sample.timestamp)?;
            for val in &sample.values {
                write!(w, ",{val}")?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

impl RawLogSink for CsvRecorder {
    fn append(&mut self, block: &SampleBlock) -> Result<(), CaptureError> {
        let w = self
            .writer
            .as_mut()
            .ok_or_else(|| CaptureError::sink("raw log", "recorder already closed"))?;
        Self::write_block(w, block).map_err(|e| CaptureError::sink("raw log", e))?;
        self.rows_written += block.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        if let Some(mut w) = self.writer.take() {
            w.flush().map_err(|e| CaptureError::sink("raw log", e))?;
            log::info!("raw recording saved: {} rows in {}", self.rows_written, self.path.display());
        }
        Ok(())
    }
}

impl Drop for CsvRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("{e}");
        }
    }
}
