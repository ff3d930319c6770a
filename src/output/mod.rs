//! Output surfaces: the tab-separated time series and the JSON summary.

mod snapshot;
mod summary;
mod tabular;

pub use snapshot::SnapshotWriter;
pub use summary::{Summary, SummaryDoc};
pub use tabular::TabularLog;

/// Error type for output failures.
///
/// The sampler logs these and keeps monitoring.
#[derive(Debug)]
pub enum SinkError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "I/O error: {}", e),
            SinkError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            SinkError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Json(e)
    }
}
