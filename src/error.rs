use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    /// Raised at a checkpoint after the progress observer declined to continue
    /// or the cancellation token was set. Not a failure.
    #[error("report generation cancelled")]
    Cancelled,

    #[error("asset error: {0}")]
    Asset(String),

    #[error("pdf error: {0}")]
    Pdf(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid checklist document: {0}")]
    Model(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReportError::Cancelled)
    }
}

impl From<lopdf::Error> for ReportError {
    fn from(value: lopdf::Error) -> Self {
        ReportError::Pdf(value.to_string())
    }
}
