// Contracts for the services the engine depends on but does not own:
// page rendering and lexical URL scoring.

use crate::model::DomTree;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Rendering {url} failed: {reason}")]
    Render { url: String, reason: String },

    #[error("Scoring {url} failed: {reason}")]
    UrlScore { url: String, reason: String },
}

impl CollaboratorError {
    pub fn render(url: &Url, reason: impl ToString) -> Self {
        CollaboratorError::Render {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn url_score(url: &Url, reason: impl ToString) -> Self {
        CollaboratorError::UrlScore {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Artifacts produced by rendering one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub dom: DomTree,
    /// `None` when the renderer does not capture screenshots.
    pub screenshot: Option<PathBuf>,
}

/// Renders a URL into a DOM snapshot and, optionally, a screenshot.
///
/// `dest` is a request-scoped file stem (no extension); implementations that
/// write artifacts place them next to it. An `Err` means the page could not
/// be rendered at all, which is distinct from an empty page.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url, dest: &Path) -> Result<RenderedPage, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UrlVerdict {
    pub url_score: f64,
    pub detected_brand: Option<String>,
}

/// Lexical URL classifier.
#[async_trait]
pub trait UrlScorer: Send + Sync {
    async fn score_url(&self, url: &Url) -> Result<UrlVerdict, CollaboratorError>;
}
