//! Error taxonomy for the answer pipeline.
//!
//! Content blocking is not represented here: a blocked question is answered
//! through the normal success channel with a canned message.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TutorError>;

#[derive(Debug, Clone, Error)]
pub enum TutorError {
    /// The selector resolved to a directory that is missing or holds no weights.
    #[error("Local model not found for '{selector}': {}", path.display())]
    ModelNotFound { selector: String, path: PathBuf },

    /// Weights exist but llama.cpp refused to load them.
    #[error("Failed to load model from {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TutorError {
    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }

    pub fn is_model_not_found(&self) -> bool {
        matches!(self, Self::ModelNotFound { .. })
    }
}

impl From<std::io::Error> for TutorError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TutorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
