// Pluggable fusion of URL, DOM and visual signals

use crate::boost::GradientBoostedFusion;
use crate::config::{FusionConfig, StrategyKind};
use serde::{Deserialize, Serialize};

/// The normalised inputs a fusion strategy decides on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Signals {
    pub url_score: f64,
    pub dom_score: f64,
    pub visual_score: f64,
    /// Weighted blend of `dom_score` and `visual_score`; `0.0` on degraded input.
    pub similarity_score: f64,
    pub domain_match: bool,
    pub brand_known: bool,
}

impl Signals {
    /// No usable brand reference: nothing structural was measured.
    pub fn is_degraded(&self) -> bool {
        self.dom_score == 0.0
    }
}

/// Turns [`Signals`] into a phishing probability. Implementations must be
/// stateless across calls so independent requests can share one instance.
pub trait FusionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Phishing probability; the engine clamps it into `[0, 1]`.
    fn fuse(&self, signals: &Signals) -> f64;
}

/// Rule-based fusion with explicit overrides for degraded input and
/// first-party domains.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicFusion {
    pub first_party_url_weight: f64,
    pub off_domain_url_weight: f64,
    pub off_domain_similarity_weight: f64,
    pub brand_floor: f64,
}

impl Default for HeuristicFusion {
    fn default() -> Self {
        Self::from_config(&FusionConfig::default())
    }
}

impl HeuristicFusion {
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            first_party_url_weight: config.first_party_url_weight,
            off_domain_url_weight: config.off_domain_url_weight,
            off_domain_similarity_weight: config.off_domain_similarity_weight,
            brand_floor: config.brand_floor,
        }
    }
}

impl FusionStrategy for HeuristicFusion {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn fuse(&self, signals: &Signals) -> f64 {
        if signals.is_degraded() {
            // A known brand served off its own domain with nothing to
            // compare against is suspicious on its own
            if signals.brand_known && !signals.domain_match {
                return signals.url_score.max(self.brand_floor);
            }
            return signals.url_score;
        }

        if signals.domain_match {
            signals.url_score * self.first_party_url_weight
        } else {
            signals.url_score * self.off_domain_url_weight
                + signals.similarity_score * self.off_domain_similarity_weight
        }
    }
}

/// Weighted blend of the DOM and visual similarity scores.
pub fn blend_similarity(dom_score: f64, visual_score: f64, dom_weight: f64, visual_weight: f64) -> f64 {
    dom_score * dom_weight + visual_score * visual_weight
}

/// Build the strategy selected in configuration.
pub fn strategy_from_config(config: &FusionConfig) -> Box<dyn FusionStrategy> {
    match config.strategy {
        StrategyKind::Heuristic => Box::new(HeuristicFusion::from_config(config)),
        StrategyKind::Classifier => Box::new(GradientBoostedFusion::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(url: f64, dom: f64, visual: f64, domain_match: bool, brand_known: bool) -> Signals {
        let similarity = if dom == 0.0 { 0.0 } else { blend_similarity(dom, visual, 0.5, 0.5) };
        Signals {
            url_score: url,
            dom_score: dom,
            visual_score: visual,
            similarity_score: similarity,
            domain_match,
            brand_known,
        }
    }

    #[test]
    fn test_degraded_known_brand_off_domain_has_floor() {
        let fusion = HeuristicFusion::default();
        assert_eq!(fusion.fuse(&signals(0.3, 0.0, 0.0, false, true)), 0.6);
        assert_eq!(fusion.fuse(&signals(0.9, 0.0, 0.0, false, true)), 0.9);
    }

    #[test]
    fn test_degraded_unknown_brand_defers_to_url() {
        let fusion = HeuristicFusion::default();
        assert_eq!(fusion.fuse(&signals(0.2, 0.0, 0.0, false, false)), 0.2);
    }

    #[test]
    fn test_degraded_on_domain_defers_to_url() {
        let fusion = HeuristicFusion::default();
        assert_eq!(fusion.fuse(&signals(0.4, 0.0, 0.7, true, true)), 0.4);
    }

    #[test]
    fn test_first_party_discount() {
        let fusion = HeuristicFusion::default();
        let p = fusion.fuse(&signals(0.9, 0.3, 0.1, true, true));
        assert!((p - 0.09).abs() < 1e-12);
        // similarity is ignored
        let q = fusion.fuse(&signals(0.9, 0.99, 0.99, true, true));
        assert_eq!(p, q);
    }

    #[test]
    fn test_off_domain_mimicry() {
        let fusion = HeuristicFusion::default();
        let s = signals(0.8, 0.9, 0.85, false, true);
        assert!((s.similarity_score - 0.875).abs() < 1e-12);
        assert!((fusion.fuse(&s) - 0.86).abs() < 1e-12);
    }

    #[test]
    fn test_strategy_from_config() {
        let mut config = FusionConfig::default();
        assert_eq!(strategy_from_config(&config).name(), "heuristic");
        config.strategy = StrategyKind::Classifier;
        assert_eq!(strategy_from_config(&config).name(), "classifier");
    }
}
