//! Engine configuration.
//!
//! Everything the engine needs (weights, keyword set, artifact location,
//! collaborator settings) is carried by an [`EngineConfig`] handed to the
//! engine at construction time. Every field has a default, so an empty
//! TOML file is a valid configuration.

use crate::brand::default_keywords;
use crate::dom::{DEFAULT_DECAY, DEFAULT_MAX_DEPTH};
use crate::model::MAX_TREE_DEPTH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dom: DomConfig,
    pub fusion: FusionConfig,
    pub brands: BrandConfig,
    pub artifacts: ArtifactConfig,
    pub renderer: RendererConfig,
    pub url_scorer: UrlScorerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomConfig {
    pub decay: f64,
    pub max_depth: usize,
}

impl Default for DomConfig {
    fn default() -> Self {
        Self {
            decay: DEFAULT_DECAY,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Heuristic,
    Classifier,
}

impl StrategyKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "heuristic" | "rules" => Some(StrategyKind::Heuristic),
            "classifier" | "boosted" | "xgboost" => Some(StrategyKind::Classifier),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub strategy: StrategyKind,
    pub dom_weight: f64,
    pub visual_weight: f64,
    pub first_party_url_weight: f64,
    pub off_domain_url_weight: f64,
    pub off_domain_similarity_weight: f64,
    pub brand_floor: f64,
    pub threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Heuristic,
            dom_weight: 0.5,
            visual_weight: 0.5,
            first_party_url_weight: 0.1,
            off_domain_url_weight: 0.2,
            off_domain_similarity_weight: 0.8,
            brand_floor: 0.6,
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandConfig {
    /// Scan order for title auto-detection.
    pub keywords: Vec<String>,
    /// Appended after `keywords`.
    pub extra_keywords: Vec<String>,
    /// Reference page URL; `{brand}` is substituted.
    pub reference_template: String,
    /// Per-brand reference URLs that override the template.
    pub references: BTreeMap<String, String>,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            extra_keywords: Vec::new(),
            reference_template: "https://www.{brand}.com".to_string(),
            references: BTreeMap::new(),
        }
    }
}

impl BrandConfig {
    /// The full keyword list, lower-cased, in scan order.
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .iter()
            .chain(&self.extra_keywords)
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }

    pub fn reference_url(&self, brand: &str) -> Result<Url, ConfigError> {
        let raw = match self.references.get(brand) {
            Some(url) => url.clone(),
            None => self.reference_template.replace("{brand}", brand),
        };
        Url::parse(&raw)
            .map_err(|e| ConfigError::Invalid(format!("reference URL '{}' for {}: {}", raw, brand, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Each evaluation gets its own sub-directory here.
    pub root: PathBuf,
    /// Leave screenshots behind after the request completes.
    pub keep_screenshots: bool,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("phishdetect"),
            keep_screenshots: false,
        }
    }
}

impl ArtifactConfig {
    pub fn resolved_root(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.root.to_string_lossy()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// External headless-browser script.
    #[default]
    Command,
    /// Static HTML fetch; no screenshot.
    Http,
    /// Pre-rendered artifacts on disk.
    Snapshot,
}

impl RendererKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "command" | "browser" => Some(RendererKind::Command),
            "http" => Some(RendererKind::Http),
            "snapshot" => Some(RendererKind::Snapshot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub kind: RendererKind,
    /// Program and leading arguments; the URL and output path are appended.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub snapshot_dir: Option<PathBuf>,
    pub user_agent: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            kind: RendererKind::Command,
            command: vec!["node".to_string(), "scripts/render.js".to_string()],
            timeout_secs: 60,
            snapshot_dir: None,
            user_agent: format!("PhishDetect/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlScorerConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for UrlScorerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fusion = &self.fusion;
        let unit_fields = [
            ("fusion.dom_weight", fusion.dom_weight),
            ("fusion.visual_weight", fusion.visual_weight),
            ("fusion.first_party_url_weight", fusion.first_party_url_weight),
            ("fusion.off_domain_url_weight", fusion.off_domain_url_weight),
            ("fusion.off_domain_similarity_weight", fusion.off_domain_similarity_weight),
            ("fusion.brand_floor", fusion.brand_floor),
            ("fusion.threshold", fusion.threshold),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }

        if !(self.dom.decay.is_finite() && self.dom.decay > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "dom.decay must be positive, got {}",
                self.dom.decay
            )));
        }

        // Loaded trees stop at MAX_TREE_DEPTH; the comparator must see one
        // level below its cap to count children there.
        if self.dom.max_depth >= MAX_TREE_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "dom.max_depth must be below {}, got {}",
                MAX_TREE_DEPTH, self.dom.max_depth
            )));
        }

        if self.brands.keyword_list().is_empty() {
            return Err(ConfigError::Invalid("brands.keywords is empty".to_string()));
        }

        if !self.brands.reference_template.contains("{brand}") {
            return Err(ConfigError::Invalid(
                "brands.reference_template must contain {brand}".to_string(),
            ));
        }

        if self.renderer.kind == RendererKind::Command && self.renderer.command.is_empty() {
            return Err(ConfigError::Invalid("renderer.command is empty".to_string()));
        }

        if self.renderer.kind == RendererKind::Snapshot && self.renderer.snapshot_dir.is_none() {
            return Err(ConfigError::Invalid(
                "renderer.snapshot_dir is required for the snapshot renderer".to_string(),
            ));
        }

        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<EngineConfig, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    pub fn load_str(content: &str) -> Result<EngineConfig, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: EngineConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.config`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}
