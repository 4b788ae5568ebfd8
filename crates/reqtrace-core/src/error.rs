//! Error taxonomy for the analysis pipeline and search engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unknown job, or a status/result that is not (or no longer) stored.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing required input, empty query, undecodable upload.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A bounded stage lost its race against the wall-clock timer.
    #[error("{0} timed out")]
    Timeout(String),

    /// LLM output that cannot be read as the required schema.
    #[error("upstream response malformed: {0}")]
    UpstreamFormat(String),

    /// Missing credentials or a failed remote call.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Test-case table that carries no rows at all.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Validation(_) => "bad_request",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::UpstreamFormat(_) => "upstream_format",
            PipelineError::UpstreamUnavailable(_) => "upstream_unavailable",
            PipelineError::MalformedInput(_) => "malformed_input",
            PipelineError::Serialization(_) | PipelineError::Internal(_) => "internal",
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_stage() {
        let err = PipelineError::Timeout("Analysis".into());
        assert_eq!(err.to_string(), "Analysis timed out");
        assert_eq!(err.code(), "timeout");
    }

    #[test]
    fn internal_wraps_anyhow_transparently() {
        let err: PipelineError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(err.code(), "internal");
    }
}
