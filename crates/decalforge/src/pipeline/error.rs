use thiserror::Error;

use crate::error::{FetchError, PackagingError, ProcessingError, ProviderError, SerializationError};

/// A stage failure. [`PipelineError::stage`] is what gets recorded on the
/// job; the full error only goes to the log.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Image generation failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Asset fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Texture processing failed: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Descriptor generation failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    #[error("Pipeline task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Provider(_) => "provider",
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Processing(_) => "texture",
            PipelineError::Serialization(_) => "config",
            PipelineError::Packaging(_) => "package",
            PipelineError::Aborted(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let err: PipelineError = ProviderError::Unsupported {
            provider: "replicate".to_string(),
        }
        .into();
        assert_eq!(err.stage(), "provider");

        let err: PipelineError = FetchError::InvalidLocation("x".to_string()).into();
        assert_eq!(err.stage(), "fetch");

        let err: PipelineError = PackagingError::Timeout { secs: 30 }.into();
        assert_eq!(err.stage(), "package");
        assert!(err.to_string().contains("30s"));
    }
}
