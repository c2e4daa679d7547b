use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Malformed coordinates, blank text, bad payloads. Rejected before extraction.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Recovered locally: the signal is dropped and the analysis continues degraded.
    #[error("Extractor unavailable ({extractor}): {reason}")]
    ExtractorUnavailable {
        extractor: &'static str,
        reason: String,
    },

    /// Recovered locally: fail-open, the report is treated as novel.
    #[error("Duplicate index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Pipeline fault: {0}")]
    PipelineFault(String),
}

impl AnalysisError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        AnalysisError::InvalidInput(msg.into())
    }

    pub fn fault(msg: impl Into<String>) -> Self {
        AnalysisError::PipelineFault(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = AnalysisError::ExtractorUnavailable {
            extractor: "image",
            reason: "timed out after 50ms".into(),
        };
        assert_eq!(
            err.to_string(),
            "Extractor unavailable (image): timed out after 50ms"
        );
    }
}
