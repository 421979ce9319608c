pub mod error;
pub mod render;
pub mod url_score;

pub use error::ScanError;
pub use render::{CommandRenderer, HttpRenderer, SnapshotRenderer};
pub use url_score::{FixedUrlScorer, HttpUrlScorer};

use phishdetect_core::config::{RendererConfig, RendererKind, UrlScorerConfig};
use phishdetect_core::{Renderer, UrlScorer};
use std::sync::Arc;

/// Build the renderer selected in configuration.
pub fn renderer_from_config(config: &RendererConfig) -> error::Result<Arc<dyn Renderer>> {
    let renderer: Arc<dyn Renderer> = match config.kind {
        RendererKind::Command => Arc::new(CommandRenderer::new(&config.command, config.timeout_secs)?),
        RendererKind::Http => Arc::new(HttpRenderer::new(config.timeout_secs, &config.user_agent)?),
        RendererKind::Snapshot => {
            let dir = config
                .snapshot_dir
                .as_ref()
                .ok_or_else(|| ScanError::Other("renderer.snapshot_dir is not set".to_string()))?;
            Arc::new(SnapshotRenderer::new(dir.clone()))
        }
    };
    Ok(renderer)
}

/// A fixed score wins over the configured scoring service.
pub fn url_scorer_from_config(
    config: &UrlScorerConfig,
    fixed_score: Option<f64>,
) -> error::Result<Arc<dyn UrlScorer>> {
    if let Some(score) = fixed_score {
        return Ok(Arc::new(FixedUrlScorer::new(score)));
    }

    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(HttpUrlScorer::new(endpoint, config.timeout_secs)?)),
        None => Err(ScanError::Other(
            "no URL scorer: pass --url-score or set url_scorer.endpoint".to_string(),
        )),
    }
}
