pub mod boost;
pub mod brand;
pub mod collaborator;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod evaluate;
pub mod fusion;
pub mod model;
pub mod report;
pub mod visual;

use colored::Colorize;

pub use collaborator::{CollaboratorError, RenderedPage, Renderer, UrlScorer, UrlVerdict};
pub use config::{ConfigLoader, EngineConfig};
pub use engine::DecisionEngine;
pub use error::{EngineError, ScoreError};
pub use evaluate::Evaluator;
pub use model::{DomNode, DomTree, FusionResult, ReferenceStatus, Verdict};

const BANNER: &str = r#"
       _     _     _         _      _            _
 _ __ | |__ (_)___| |__   __| | ___| |_ ___  ___| |_
| '_ \| '_ \| / __| '_ \ / _` |/ _ \ __/ _ \/ __| __|
| |_) | | | | \__ \ | | | (_| |  __/ ||  __/ (__| |_
| .__/|_| |_|_|___/_| |_|\__,_|\___|\__\___|\___|\__|
|_|"#;

pub fn print_banner() {
    eprintln!("{}", BANNER.bright_cyan().bold());
    eprintln!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_white(),
        "URL + DOM + visual phishing detection".dimmed()
    );
}
