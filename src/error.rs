use std::path::PathBuf;
use thiserror::Error;

/// Stage-level failures. Each one aborts the whole run and renders as a
/// single message for the end user.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to initialise pipeline: {0:#}")]
    Setup(anyhow::Error),

    #[error("Error extracting comments: {0:#}")]
    Extraction(anyhow::Error),

    #[error("Error translating comments: {0:#}")]
    Translation(anyhow::Error),

    #[error("Error analyzing sentiment: {0:#}")]
    Analysis(anyhow::Error),

    #[error("Analysis run aborted: {0}")]
    Aborted(String),

    #[error("Artifact I/O failed for {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_include_context_chain() {
        let err = PipelineError::Translation(
            anyhow::anyhow!("file is empty").context("reading comments.txt"),
        );
        assert_eq!(
            err.to_string(),
            "Error translating comments: reading comments.txt: file is empty"
        );
    }
}
