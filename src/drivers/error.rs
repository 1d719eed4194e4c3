use thiserror::Error;
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("block shape mismatch: expected {expected} channels, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("{sink} sink failed: {reason}")]
    SinkFailure { sink: &'static str, reason: String },
    #[error("acquisition fault: {0}")]
    AcquisitionFault(String),
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}
impl CaptureError {
    pub fn sink(sink: &'static str, reason: impl ToString) -> Self {
        CaptureError::SinkFailure {
            sink,
            reason: reason.to_string(),
        }
    }
    /// Sink failures lose a capture or a log row but never the signal, so the
    /// pipeline keeps running on them. Everything else ends the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CaptureError::SinkFailure { .. })
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for CaptureError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        CaptureError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for CaptureError {
    fn from(value: image::ImageError) -> Self {
        CaptureError::Plot(value.to_string())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn only_sink_failures_are_recoverable() {
        assert!(!CaptureError::sink("capture", "disk full").is_fatal());
        assert!(CaptureError::ShapeMismatch {
            expected: 2,
            actual: 3
        }
        .is_fatal());
        assert!(CaptureError::AcquisitionFault("device lost".into()).is_fatal());
        assert!(CaptureError::ConfigInvalid("buffer".into()).is_fatal());
    }
}
