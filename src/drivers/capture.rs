use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use ndarray::{s, Array2, ArrayView1, ArrayView2};
use parking_lot::Mutex;
use crate::drivers::source::Sample;
use crate::drivers::CaptureError;
/// Finished capture window: column 0 holds timestamps, columns 1..=M the
/// channel values.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRecord {
    trigger_moment: f64,
    matrix: Array2<f64>,
}
impl CaptureRecord {
    pub fn from_samples(trigger_moment: f64, samples: &[Sample]) -> Self {
        let channels = samples.first().map_or(0, |s| s.values.len());
        let mut matrix = Array2::<f64>::zeros((samples.len(), channels + 1));
        for (mut row, sample) in matrix.rows_mut().into_iter().zip(samples) {
            row[0] = sample.timestamp;
            for (cell, value) in row.iter_mut().skip(1).zip(&sample.values) {
                *cell = *value;
            }
        }
        Self {
            trigger_moment,
            matrix,
        }
    }
    pub fn trigger_moment(&self) -> f64 {
        self.trigger_moment
    }
    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }
    pub fn channels(&self) -> usize {
        self.matrix.ncols().saturating_sub(1)
    }
    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }
    pub fn timestamps(&self) -> ArrayView1<'_, f64> {
        self.matrix.column(0)
    }
    pub fn channel(&self, index: usize) -> ArrayView1<'_, f64> {
        self.matrix.column(index + 1)
    }
    pub fn channel_values(&self) -> ArrayView2<'_, f64> {
        self.matrix.slice(s![.., 1..])
    }
    pub fn into_matrix(self) -> Array2<f64> {
        self.matrix
    }
}
/// Receiver of finished captures. Errors are reported to the pipeline, which
/// logs them and keeps acquiring.
pub trait CaptureSink: Send {
    fn emit(&mut self, record: CaptureRecord) -> Result<(), CaptureError>;
    fn close(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }
    /// Failures that happened after `emit` returned, e.g. on a writer thread.
    /// Each one is handed out once.
    fn take_failures(&mut self) -> Vec<CaptureError> {
        Vec::new()
    }
}
/// Binds captures to a shared in-memory list.
#[derive(Clone, Default)]
pub struct MemoryCaptureSink {
    records: Arc<Mutex<Vec<CaptureRecord>>>,
}
impl MemoryCaptureSink {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn records(&self) -> Vec<CaptureRecord> {
        self.records.lock().clone()
    }
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}
impl CaptureSink for MemoryCaptureSink {
    fn emit(&mut self, record: CaptureRecord) -> Result<(), CaptureError> {
        self.records.lock().push(record);
        Ok(())
    }
}
/// Writes each capture to its own CSV file.
pub struct CsvCaptureSink {
    directory: PathBuf,
    channel_labels: Vec<String>,
    written: usize,
}
impl CsvCaptureSink {
    pub fn new(directory: impl AsRef<Path>, channel_labels: Vec<String>) -> Result<Self, CaptureError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            channel_labels,
            written: 0,
        })
    }
    pub fn written(&self) -> usize {
        self.written
    }
    fn write_record(&self, path: &Path, record: &CaptureRecord) -> std::io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        write!(w, "Timestamp")?;
        for idx in 0..record.channels() {
            match self.channel_labels.get(idx) {
                Some(label) => write!(w, ",{label}")?,
                None => write!(w, ",Ch{idx}")?,
            }
        }
        writeln!(w)?;
        for row in record.matrix().rows() {
            write!(w, "{:.6}", row[0])?;
            for value in row.iter().skip(1) {
                write!(w, ",{value}")?;
            }
            writeln!(w)?;
        }
        w.flush()
    }
}
impl CaptureSink for CsvCaptureSink {
    fn emit(&mut self, record: CaptureRecord) -> Result<(), CaptureError> {
        let filename = format!(
            "capture_{:04}_{:.3}s.csv",
            self.written,
            record.trigger_moment()
        );
        let path = self.directory.join(filename);
        self.write_record(&path, &record)
            .map_err(|e| CaptureError::sink("capture csv", format!("{}: {e}", path.display())))?;
        self.written += 1;
        log::info!("capture saved to {}", path.display());
        Ok(())
    }
}
/// Moves a sink onto its own thread so slow persistence never holds up block
/// processing. Records queue without bound; failures are logged, counted
/// and handed back through `take_failures`.
pub struct QueuedCaptureSink {
    tx: Option<Sender<CaptureRecord>>,
    worker: Option<JoinHandle<()>>,
    failures: Arc<Mutex<usize>>,
    failure_rx: Receiver<CaptureError>,
}
impl QueuedCaptureSink {
    pub fn spawn<S: CaptureSink + 'static>(mut inner: S) -> Self {
        let (tx, rx) = mpsc::channel::<CaptureRecord>();
        let (failure_tx, failure_rx) = mpsc::channel::<CaptureError>();
        let failures = Arc::new(Mutex::new(0));
        let worker_failures = Arc::clone(&failures);
        let worker = thread::spawn(move || {
            let report = |e: CaptureError| {
                *worker_failures.lock() += 1;
                // 接收端已销毁时无人关心
                failure_tx.send(e).ok();
            };
            for record in rx {
                let moment = record.trigger_moment();
                if let Err(e) = inner.emit(record) {
                    log::error!("queued capture dropped: {e}");
                    report(CaptureError::sink(
                        "capture queue",
                        format!("capture at t={moment:.4}s not persisted: {e}"),
                    ));
                }
            }
            if let Err(e) = inner.close() {
                log::error!("capture sink close failed: {e}");
                report(CaptureError::sink("capture queue", format!("close failed: {e}")));
            }
        });
        Self {
            tx: Some(tx),
            worker: Some(worker),
            failures,
            failure_rx,
        }
    }
    pub fn failures(&self) -> usize {
        *self.failures.lock()
    }
}
impl CaptureSink for QueuedCaptureSink {
    fn emit(&mut self, record: CaptureRecord) -> Result<(), CaptureError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| CaptureError::sink("capture queue", "queue already closed"))?;
        tx.send(record)
            .map_err(|_| CaptureError::sink("capture queue", "worker thread exited"))
    }
    /// Drains everything queued, then joins the worker.
    fn close(&mut self) -> Result<(), CaptureError> {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| CaptureError::sink("capture queue", "worker thread panicked"))?;
        }
        Ok(())
    }
    fn take_failures(&mut self) -> Vec<CaptureError> {
        self.failure_rx.try_iter().collect()
    }
}
impl Drop for QueuedCaptureSink {
    fn drop(&mut self) {
        if let Err(e) = CaptureSink::close(self) {
            log::error!("{e}");
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    fn samples() -> Vec<Sample> {
        (0..4)
            .map(|i| Sample::new(1.0 + i as f64 * 0.5, vec![i as f64, 10.0 - i as f64]))
            .collect()
    }
    #[test]
    fn record_lays_out_timestamp_then_channels() {
        let record = CaptureRecord::from_samples(1.0, &samples());
        assert_eq!(record.rows(), 4);
        assert_eq!(record.channels(), 2);
        assert_eq!(record.matrix().dim(), (4, 3));
        assert_eq!(record.timestamps().to_vec(), vec![1.0, 1.5, 2.0, 2.5]);
        assert_eq!(record.channel(1).to_vec(), vec![10.0, 9.0, 8.0, 7.0]);
        assert_eq!(record.channel_values().dim(), (4, 2));
    }
    #[test]
    fn csv_sink_writes_one_file_per_record() {
        let dir = std::env::temp_dir().join(format!("daqscope-capture-{}", std::process::id()));
        let mut sink = CsvCaptureSink::new(&dir, vec!["AI0".into(), "Encoder".into()]).unwrap();
        sink.emit(CaptureRecord::from_samples(1.0, &samples())).unwrap();
        assert_eq!(sink.written(), 1);
        let path = dir.join("capture_0000_1.000s.csv");
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Timestamp,AI0,Encoder"));
        assert_eq!(lines.next(), Some("1.000000,0,10"));
        assert_eq!(text.lines().count(), 5);
        fs::remove_dir_all(&dir).ok();
    }
    struct SlowFailing {
        seen: Arc<Mutex<Vec<f64>>>,
    }
    impl CaptureSink for SlowFailing {
        fn emit(&mut self, record: CaptureRecord) -> Result<(), CaptureError> {
            thread::sleep(Duration::from_millis(5));
            self.seen.lock().push(record.trigger_moment());
            if record.trigger_moment() > 2.0 {
                return Err(CaptureError::sink("test", "disk full"));
            }
            Ok(())
        }
    }
    #[test]
    fn queued_sink_delivers_everything_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut queued = QueuedCaptureSink::spawn(SlowFailing { seen: seen.clone() });
        for moment in [1.0, 2.0, 3.0] {
            queued
                .emit(CaptureRecord::from_samples(moment, &samples()))
                .unwrap();
        }
        queued.close().unwrap();
        assert_eq!(*seen.lock(), vec![1.0, 2.0, 3.0]);
        assert_eq!(queued.failures(), 1);
        let reported = queued.take_failures();
        assert_eq!(reported.len(), 1);
        assert!(!reported[0].is_fatal());
        assert!(reported[0].to_string().contains("t=3.0000s"));
        assert!(queued.take_failures().is_empty());
        assert!(queued
            .emit(CaptureRecord::from_samples(4.0, &samples()))
            .is_err());
    }
}
