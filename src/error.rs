use thiserror::Error;

/// Errors produced by the pipeline stages.
///
/// `Fetch` and `Interpretation` are fatal to a run; `Transcription` is
/// recovered per clip; `Resolution` and `Submission` are reported to the
/// caller together with the content report assembled so far.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("transcription failed for {url}: {reason}")]
    Transcription { url: String, reason: String },

    #[error("could not interpret task: {0}")]
    Interpretation(String),

    #[error("no value for required field `{field}`: {reason}")]
    Resolution { field: String, reason: String },

    #[error("submission to {url} returned status {status} after {attempts} attempt(s)")]
    Submission {
        url: String,
        status: u16,
        attempts: u32,
        body: String,
    },

    #[error("submission to {url} failed after {attempts} attempt(s): {reason}")]
    SubmissionTransport {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// The pipeline stage this error belongs to, for diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Fetch { .. } => "fetch",
            PipelineError::Transcription { .. } => "transcription",
            PipelineError::Interpretation(_) => "interpretation",
            PipelineError::Resolution { .. } => "resolution",
            PipelineError::Submission { .. } | PipelineError::SubmissionTransport { .. } => {
                "submission"
            }
            PipelineError::Http(_) => "http",
            PipelineError::Serde(_) => "serialization",
            PipelineError::Io(_) => "io",
        }
    }
}
