//! Error types for the audit engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Common(#[from] locaudit_common::Error),

    #[error("Language detector failed: {0}")]
    ClassificationFailure(String),

    #[error("Dimension mismatch: baseline {baseline} vs current {current}")]
    DimensionMismatch { baseline: String, current: String },

    #[error("Failed to write baseline for {key}: {reason}")]
    BaselineWrite { key: String, reason: String },

    #[error("Failed to write diff artifact {path}: {reason}")]
    ArtifactWrite { path: String, reason: String },

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl EngineError {
    /// Configuration errors abort the run before any page is processed
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Common(e) if e.is_fatal())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::Common(locaudit_common::Error::Yaml(e))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
