use thiserror::Error;

/// Failures of the vision-inference collaborator.
///
/// The client only distinguishes "could not reach the model" from "the model
/// answered but not in the expected shape". Neither variant ever reaches the
/// HTTP boundary; the orchestrators substitute fixed fallback content.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference backend unavailable: {0}")]
    Unavailable(String),
    #[error("model output did not contain a parseable result: {0}")]
    Format(String),
}

/// Failure of the image-processing collaborator. A single variant: non-2xx,
/// transport failure, and malformed payloads are all treated the same by the
/// per-stage recovery policy.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("image processing service unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for PreprocessError {
    fn from(e: reqwest::Error) -> Self {
        PreprocessError::Unavailable(e.to_string())
    }
}
