//! Decision engine.
//!
//! Resolves the brand, decides whether a brand reference may be used, runs
//! both similarity scorers against already-rendered artifacts and fuses the
//! result with the URL score. No I/O beyond reading the artifacts it is
//! handed; fetching those is the [`crate::evaluate::Evaluator`]'s job.

use crate::brand::{detect_brand, domain_matches, normalize_brand};
use crate::collaborator::RenderedPage;
use crate::config::EngineConfig;
use crate::dom::DomComparator;
use crate::error::{EngineError, Result};
use crate::fusion::{FusionStrategy, Signals, blend_similarity, strategy_from_config};
use crate::model::{DomTree, FusionResult, ReferenceStatus, Verdict, clamp_unit};
use crate::visual;
use tracing::{debug, info};
use url::Url;

/// Whether a brand reference should be rendered for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferencePlan {
    Fetch(Url),
    Skip(ReferenceStatus),
}

/// What the caller managed to obtain for the brand reference.
#[derive(Debug, Clone, Copy)]
pub enum ReferenceOutcome<'a> {
    Rendered(&'a RenderedPage),
    Failed,
    NotRequested,
}

pub struct DecisionInputs<'a> {
    pub url: &'a Url,
    pub url_score: f64,
    /// Brand supplied by the caller.
    pub brand: Option<&'a str>,
    /// Brand reported by the URL scorer.
    pub detected_brand: Option<&'a str>,
    /// `None` when the page under test could not be rendered.
    pub test: Option<&'a RenderedPage>,
    pub reference: ReferenceOutcome<'a>,
}

pub struct DecisionEngine {
    config: EngineConfig,
    keywords: Vec<String>,
    comparator: DomComparator,
    strategy: Box<dyn FusionStrategy>,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let strategy = strategy_from_config(&config.fusion);
        let comparator = DomComparator::new(config.dom.decay, config.dom.max_depth);
        let keywords = config.brands.keyword_list();
        Self {
            config,
            keywords,
            comparator,
            strategy,
        }
    }

    /// Replace the fusion strategy selected by configuration.
    pub fn with_strategy(mut self, strategy: Box<dyn FusionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// The URL scorer's brand first, then the caller's, then a keyword scan
    /// of the test page title.
    pub fn resolve_brand(
        &self,
        supplied: Option<&str>,
        detected: Option<&str>,
        test_dom: Option<&DomTree>,
    ) -> Option<String> {
        if let Some(brand) = detected.and_then(normalize_brand) {
            debug!("Using URL scorer brand '{}'", brand);
            return Some(brand);
        }

        if let Some(brand) = supplied.and_then(normalize_brand) {
            debug!("Using caller brand '{}'", brand);
            return Some(brand);
        }

        let title = test_dom.and_then(|dom| dom.title.as_deref())?;
        let brand = detect_brand(title, &self.keywords).map(String::from);
        match &brand {
            Some(brand) => debug!("Detected brand '{}' from title '{}'", brand, title),
            None => debug!("No brand keyword in title '{}'", title),
        }
        brand
    }

    /// A reference is only rendered when the brand is known and the tested
    /// host carries the brand name.
    pub fn reference_plan(&self, brand: Option<&str>, url: &Url) -> ReferencePlan {
        let Some(brand) = brand.filter(|b| !b.is_empty()) else {
            return ReferencePlan::Skip(ReferenceStatus::UnknownBrand);
        };

        if !domain_matches(brand, url) {
            debug!("Brand '{}' not in host of {}, skipping reference", brand, url);
            return ReferencePlan::Skip(ReferenceStatus::OffDomain);
        }

        match self.config.brands.reference_url(brand) {
            Ok(reference) => ReferencePlan::Fetch(reference),
            Err(e) => {
                info!("No usable reference for '{}': {}", brand, e);
                ReferencePlan::Skip(ReferenceStatus::RenderFailed)
            }
        }
    }

    /// Score and fuse one request's artifacts.
    pub fn decide(&self, inputs: DecisionInputs<'_>) -> Result<FusionResult> {
        let Some(test) = inputs.test else {
            let brand = self.resolve_brand(inputs.brand, inputs.detected_brand, None);
            return self.fuse_scores(
                inputs.url,
                inputs.url_score,
                brand.as_deref(),
                0.0,
                0.0,
                ReferenceStatus::TestRenderFailed,
            );
        };

        let brand = self.resolve_brand(inputs.brand, inputs.detected_brand, Some(&test.dom));

        let (dom_score, visual_score, status) =
            match self.reference_plan(brand.as_deref(), inputs.url) {
                ReferencePlan::Skip(status) => (0.0, 0.0, status),
                ReferencePlan::Fetch(_) => match inputs.reference {
                    ReferenceOutcome::Rendered(reference) => {
                        let (dom, visual) = self.score_pair(test, reference);
                        (dom, visual, ReferenceStatus::Scored)
                    }
                    ReferenceOutcome::Failed | ReferenceOutcome::NotRequested => {
                        (0.0, 0.0, ReferenceStatus::RenderFailed)
                    }
                },
            };

        self.fuse_scores(
            inputs.url,
            inputs.url_score,
            brand.as_deref(),
            dom_score,
            visual_score,
            status,
        )
    }

    fn score_pair(&self, test: &RenderedPage, reference: &RenderedPage) -> (f64, f64) {
        let dom = self.comparator.score_trees(&test.dom, &reference.dom);
        let visual = match (&test.screenshot, &reference.screenshot) {
            (Some(a), Some(b)) => visual::score_files(a, b),
            _ => {
                debug!("Screenshot missing, visual score is 0");
                0.0
            }
        };
        (dom, visual)
    }

    /// The fusion step alone, over already computed scores.
    pub fn fuse_scores(
        &self,
        url: &Url,
        url_score: f64,
        brand: Option<&str>,
        dom_score: f64,
        visual_score: f64,
        reference: ReferenceStatus,
    ) -> Result<FusionResult> {
        let url_score = clamp_unit(finite("url_score", url_score)?);
        let dom_score = clamp_unit(finite("dom_score", dom_score)?);
        let mut visual_score = clamp_unit(finite("visual_score", visual_score)?);

        let brand = brand.and_then(normalize_brand).unwrap_or_default();
        let domain_match = domain_matches(&brand, url);

        let fusion = &self.config.fusion;
        let similarity_score = if dom_score == 0.0 {
            visual_score = 0.0;
            0.0
        } else {
            blend_similarity(dom_score, visual_score, fusion.dom_weight, fusion.visual_weight)
        };

        let signals = Signals {
            url_score,
            dom_score,
            visual_score,
            similarity_score,
            domain_match,
            brand_known: !brand.is_empty(),
        };

        let raw = self.strategy.fuse(&signals);
        let hybrid_score = clamp_unit(finite("hybrid_score", raw)?);
        let final_label = if hybrid_score > fusion.threshold {
            Verdict::Phishing
        } else {
            Verdict::Legitimate
        };

        info!(
            "{} brand='{}' match={} url={:.4} dom={:.4} visual={:.4} -> {:.4} {} ({})",
            url, brand, domain_match, url_score, dom_score, visual_score, hybrid_score, final_label, reference
        );

        Ok(FusionResult {
            url: url.to_string(),
            brand,
            domain_match,
            url_score,
            dom_score,
            visual_score,
            similarity_score,
            hybrid_score,
            threshold: fusion.threshold,
            final_label,
            reference,
            strategy: self.strategy.name().to_string(),
        })
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::NonFiniteScore { field, value })
    }
}
