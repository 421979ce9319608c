//! End-to-end evaluation of one URL.
//!
//! URL scoring, rendering of the page under test, brand resolution, the
//! reference gate, rendering of the reference and the final decision, in
//! that order. Artifacts live in a per-request directory so concurrent
//! evaluations never touch each other's files.

use crate::collaborator::{Renderer, UrlScorer};
use crate::engine::{DecisionEngine, DecisionInputs, ReferenceOutcome, ReferencePlan};
use crate::error::{EngineError, Result};
use crate::model::FusionResult;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

pub struct Evaluator {
    engine: Arc<DecisionEngine>,
    renderer: Arc<dyn Renderer>,
    url_scorer: Arc<dyn UrlScorer>,
}

impl Clone for Evaluator {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            renderer: Arc::clone(&self.renderer),
            url_scorer: Arc::clone(&self.url_scorer),
        }
    }
}

impl Evaluator {
    pub fn new(
        engine: DecisionEngine,
        renderer: Arc<dyn Renderer>,
        url_scorer: Arc<dyn UrlScorer>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            renderer,
            url_scorer,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub async fn evaluate(&self, url: &str, brand: Option<&str>) -> Result<FusionResult> {
        let url = Url::parse(url).map_err(|e| EngineError::InvalidUrl(format!("{}: {}", url, e)))?;
        info!("Evaluating {}", url);

        let verdict = self.url_scorer.score_url(&url).await?;
        debug!(
            "URL score {:.4}, detected brand {:?}",
            verdict.url_score, verdict.detected_brand
        );

        let artifacts = &self.engine.config().artifacts;
        let workspace = ArtifactWorkspace::create(&artifacts.resolved_root(), artifacts.keep_screenshots)?;

        let test = match self.renderer.render(&url, &workspace.stem("test")).await {
            Ok(page) => Some(page),
            Err(e) => {
                warn!("Test page unavailable, degrading: {}", e);
                None
            }
        };

        let brand = self.engine.resolve_brand(
            brand,
            verdict.detected_brand.as_deref(),
            test.as_ref().map(|page| &page.dom),
        );

        let reference = match (&test, self.engine.reference_plan(brand.as_deref(), &url)) {
            (Some(_), ReferencePlan::Fetch(reference_url)) => {
                debug!("Rendering reference {}", reference_url);
                Some(self.renderer.render(&reference_url, &workspace.stem("reference")).await)
            }
            _ => None,
        };

        let outcome = match &reference {
            Some(Ok(page)) => ReferenceOutcome::Rendered(page),
            Some(Err(e)) => {
                warn!("Reference unavailable, degrading: {}", e);
                ReferenceOutcome::Failed
            }
            None => ReferenceOutcome::NotRequested,
        };

        self.engine.decide(DecisionInputs {
            url: &url,
            url_score: verdict.url_score,
            brand: brand.as_deref(),
            detected_brand: None,
            test: test.as_ref(),
            reference: outcome,
        })
    }
}

/// A uniquely named directory for one request's artifacts, removed on drop.
pub struct ArtifactWorkspace {
    dir: PathBuf,
    keep_screenshots: bool,
}

impl ArtifactWorkspace {
    pub fn create(root: &Path, keep_screenshots: bool) -> std::io::Result<Self> {
        let dir = root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)?;
        debug!("Created artifact workspace {}", dir.display());
        Ok(Self { dir, keep_screenshots })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Artifact stem inside the workspace; renderers add the extension.
    pub fn stem(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn remove_all_but_screenshots(&self) -> std::io::Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_screenshot = path.extension().is_some_and(|ext| ext == "png");
            if path.is_file() && !is_screenshot {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

impl Drop for ArtifactWorkspace {
    fn drop(&mut self) {
        let cleanup = if self.keep_screenshots {
            self.remove_all_but_screenshots()
        } else {
            fs::remove_dir_all(&self.dir)
        };

        if let Err(e) = cleanup {
            warn!("Failed to clean up {}: {}", self.dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{CollaboratorError, RenderedPage, UrlVerdict};
    use crate::config::EngineConfig;
    use crate::model::{DomNode, DomTree, ReferenceStatus, Verdict};
    use async_trait::async_trait;
    use image::{GrayImage, Luma};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeRenderer {
        pages: HashMap<String, DomTree>,
        screenshots: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeRenderer {
        fn new(pages: &[(&str, &str)], screenshots: bool) -> Self {
            let form = DomNode::with_children(
                "body",
                vec![DomNode::with_children("form", vec![DomNode::new("input")])],
            );
            Self {
                pages: pages
                    .iter()
                    .map(|(host, title)| {
                        (host.to_string(), DomTree::new(form.clone(), Some(title.to_string())))
                    })
                    .collect(),
                screenshots,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, url: &Url, dest: &Path) -> std::result::Result<RenderedPage, CollaboratorError> {
            let host = url.host_str().unwrap_or_default().to_string();
            self.calls.lock().unwrap().push(host.clone());

            let dom = self
                .pages
                .get(&host)
                .cloned()
                .ok_or_else(|| CollaboratorError::render(url, "unreachable"))?;

            let screenshot = if self.screenshots {
                let path = dest.with_extension("png");
                GrayImage::from_fn(32, 32, |x, y| Luma([((x * 8) ^ (y * 8)) as u8]))
                    .save(&path)
                    .map_err(|e| CollaboratorError::render(url, e))?;
                Some(path)
            } else {
                None
            };

            Ok(RenderedPage { dom, screenshot })
        }
    }

    struct FakeScorer {
        score: Option<f64>,
        brand: Option<&'static str>,
    }

    #[async_trait]
    impl UrlScorer for FakeScorer {
        async fn score_url(&self, url: &Url) -> std::result::Result<UrlVerdict, CollaboratorError> {
            let url_score = self.score.ok_or_else(|| CollaboratorError::url_score(url, "offline"))?;
            Ok(UrlVerdict {
                url_score,
                detected_brand: self.brand.map(String::from),
            })
        }
    }

    fn evaluator(
        root: &Path,
        renderer: Arc<FakeRenderer>,
        score: Option<f64>,
        keep_screenshots: bool,
    ) -> Evaluator {
        evaluator_with_scorer(root, renderer, FakeScorer { score, brand: None }, keep_screenshots)
    }

    fn evaluator_with_scorer(
        root: &Path,
        renderer: Arc<FakeRenderer>,
        scorer: FakeScorer,
        keep_screenshots: bool,
    ) -> Evaluator {
        let mut config = EngineConfig::default();
        config.artifacts.root = root.to_path_buf();
        config.artifacts.keep_screenshots = keep_screenshots;
        Evaluator::new(DecisionEngine::new(config), renderer, Arc::new(scorer))
    }

    fn entries(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect()
    }

    #[tokio::test]
    async fn test_unknown_brand_defers_to_url_score() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(&[("example.org", "Welcome")], false));
        let result = evaluator(root.path(), renderer.clone(), Some(0.2), false)
            .evaluate("https://example.org/", None)
            .await
            .unwrap();

        assert_eq!(result.reference, ReferenceStatus::UnknownBrand);
        assert_eq!(result.hybrid_score, 0.2);
        assert_eq!(result.final_label, Verdict::Legitimate);
        assert_eq!(renderer.calls(), vec!["example.org"]);
    }

    #[tokio::test]
    async fn test_url_scorer_brand_overrides_caller_brand() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(
            &[("paypa1.com", "Welcome"), ("www.paypal.com", "PayPal")],
            false,
        ));
        let scorer = FakeScorer {
            score: Some(0.3),
            brand: Some("PayPal"),
        };
        let result = evaluator_with_scorer(root.path(), renderer.clone(), scorer, false)
            .evaluate("https://paypa1.com/signin", Some("google"))
            .await
            .unwrap();

        assert_eq!(result.brand, "paypal");
        assert_eq!(result.reference, ReferenceStatus::OffDomain);
        assert_eq!(result.hybrid_score, 0.6);
        assert_eq!(renderer.calls(), vec!["paypa1.com"]);
    }

    #[tokio::test]
    async fn test_off_domain_brand_skips_reference() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(
            &[("paypa1.com", "PayPal: Log in"), ("www.paypal.com", "PayPal")],
            false,
        ));
        let result = evaluator(root.path(), renderer.clone(), Some(0.3), false)
            .evaluate("https://paypa1.com/signin", None)
            .await
            .unwrap();

        assert_eq!(result.brand, "paypal");
        assert_eq!(result.reference, ReferenceStatus::OffDomain);
        assert_eq!(result.hybrid_score, 0.6);
        assert_eq!(result.final_label, Verdict::Phishing);
        assert_eq!(renderer.calls(), vec!["paypa1.com"]);
    }

    #[tokio::test]
    async fn test_on_domain_brand_is_scored() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(
            &[("accounts.google.com", "Sign in - Google Accounts"), ("www.google.com", "Google")],
            true,
        ));
        let result = evaluator(root.path(), renderer.clone(), Some(0.9), false)
            .evaluate("https://accounts.google.com/signin", None)
            .await
            .unwrap();

        assert_eq!(result.reference, ReferenceStatus::Scored);
        assert!(result.domain_match);
        assert_eq!(result.dom_score, 1.0);
        assert_eq!(result.visual_score, 1.0);
        assert_eq!(result.similarity_score, 1.0);
        assert!((result.hybrid_score - 0.09).abs() < 1e-12);
        assert_eq!(renderer.calls(), vec!["accounts.google.com", "www.google.com"]);
    }

    #[tokio::test]
    async fn test_reference_failure_degrades() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(&[("accounts.google.com", "Google")], false));
        let result = evaluator(root.path(), renderer, Some(0.4), false)
            .evaluate("https://accounts.google.com", None)
            .await
            .unwrap();

        assert_eq!(result.reference, ReferenceStatus::RenderFailed);
        assert_eq!(result.dom_score, 0.0);
        assert_eq!(result.hybrid_score, 0.4);
    }

    #[tokio::test]
    async fn test_test_render_failure_uses_caller_brand() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(&[], false));
        let result = evaluator(root.path(), renderer, Some(0.1), false)
            .evaluate("https://paypa1.com", Some("PayPal"))
            .await
            .unwrap();

        assert_eq!(result.reference, ReferenceStatus::TestRenderFailed);
        assert_eq!(result.brand, "paypal");
        assert_eq!(result.hybrid_score, 0.6);
    }

    #[tokio::test]
    async fn test_url_scorer_failure_is_request_error() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(&[("example.org", "Welcome")], false));
        let result = evaluator(root.path(), renderer, None, false)
            .evaluate("https://example.org", None)
            .await;
        assert!(matches!(result, Err(EngineError::UrlScoring(_))));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(&[], false));
        let result = evaluator(root.path(), renderer, Some(0.5), false)
            .evaluate("not a url", None)
            .await;
        assert!(matches!(result, Err(EngineError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_workspace_removed_after_request() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(
            &[("accounts.google.com", "Google"), ("www.google.com", "Google")],
            true,
        ));
        evaluator(root.path(), renderer, Some(0.5), false)
            .evaluate("https://accounts.google.com", None)
            .await
            .unwrap();
        assert!(entries(root.path()).is_empty());
    }

    #[tokio::test]
    async fn test_keep_screenshots() {
        let root = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer::new(
            &[("accounts.google.com", "Google"), ("www.google.com", "Google")],
            true,
        ));
        evaluator(root.path(), renderer, Some(0.5), true)
            .evaluate("https://accounts.google.com", None)
            .await
            .unwrap();

        let workspaces = entries(root.path());
        assert_eq!(workspaces.len(), 1);
        let mut kept: Vec<String> = entries(&workspaces[0])
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        kept.sort();
        assert_eq!(kept, vec!["reference.png", "test.png"]);
    }

    #[test]
    fn test_workspaces_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = ArtifactWorkspace::create(root.path(), false).unwrap();
        let b = ArtifactWorkspace::create(root.path(), false).unwrap();
        assert_ne!(a.path(), b.path());
        fs::write(a.stem("test").with_extension("json"), "{}").unwrap();

        drop(a);
        assert_eq!(entries(root.path()), vec![b.path().to_path_buf()]);
    }
}
