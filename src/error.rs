use thiserror::Error;

/// Per-job failure taxonomy. Every variant is fatal to its own job and is
/// never retried; the batch layer records it and moves on to the next input.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("browser session failed to start: {0}")]
    SessionStart(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("no usable upload control after trying {tried} selectors")]
    UploadNotFound { tried: usize },

    #[error("translation rejected by the site: {0}")]
    TranslationRejected(String),

    #[error("could not extract a translated image: {0}")]
    ExtractionExhausted(String),
}

impl JobError {
    /// Stable identifier used in manifests and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::SessionStart(_) => "session_start",
            JobError::Navigation(_) => "navigation",
            JobError::UploadNotFound { .. } => "upload_not_found",
            JobError::TranslationRejected(_) => "translation_rejected",
            JobError::ExtractionExhausted(_) => "extraction_exhausted",
        }
    }
}
