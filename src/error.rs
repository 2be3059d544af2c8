//! Error types for the chaser-tc library.

use thiserror::Error;

/// Main error type for the chaser-tc library.
///
/// Recoverable per-stage conditions (low-quality sprite, empty detection,
/// degenerate assignment, rejected submission) are not errors; they are
/// [`crate::models::AttemptOutcome`] values consumed by the retry loop.
/// This enum covers the unrecoverable cases that abort the solve.
#[derive(Error, Debug)]
pub enum TuringError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] rquest::Error),

    /// Browser driver call failed
    #[error("Page driver error: {0}")]
    Driver(String),

    /// Image decoding or processing error
    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    /// Recognition model error
    #[error("Recognition error: {0}")]
    Recognition(String),

    /// All attempts exhausted without the challenge being accepted
    #[error("Captcha not solved after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Result type alias for chaser-tc operations.
pub type Result<T> = std::result::Result<T, TuringError>;
