use crate::config::ConfigError;
use thiserror::Error;

/// Failures raised while loading or comparing scoring artifacts.
///
/// These never reach the caller of the public scoring functions: a scorer
/// that hits one of them logs it and reports a similarity of `0.0`.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid DOM artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed DOM tree: {0}")]
    MalformedTree(String),

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Image dimensions differ: {0:?} vs {1:?}")]
    DimensionMismatch((u32, u32), (u32, u32)),
}

/// Request-level failures. Everything anticipated (render failures, bad
/// artifacts, unknown brands) degrades instead of ending up here.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Non-finite {field}: {value}")]
    NonFiniteScore { field: &'static str, value: f64 },

    #[error("URL scoring failed: {0}")]
    UrlScoring(#[from] crate::collaborator::CollaboratorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Artifact workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
