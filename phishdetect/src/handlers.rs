use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use phishdetect_core::brand::{domain_matches, normalize_brand};
use phishdetect_core::config::{ConfigLoader, EngineConfig, RendererKind, StrategyKind};
use phishdetect_core::dom::DomComparator;
use phishdetect_core::model::{FusionResult, ReferenceStatus, Verdict};
use phishdetect_core::report::{
    FailedEvaluation, ReportFormat, generate_batch_csv_report, generate_batch_json_report,
    generate_batch_text_report, generate_json_report, generate_text_report, save_report,
};
use phishdetect_core::{DecisionEngine, Evaluator, visual};
use phishdetect_scanner::{renderer_from_config, url_scorer_from_config};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

/// `warn` by default, `info` with `-v`, `debug` with `-vv`. `RUST_LOG` wins.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load and parse URLs from a file
pub fn load_urls_from_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if Url::parse(line).is_ok_and(|url| url.has_host()) {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("{} Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

/// clap value parser for scores in `[0, 1]`.
pub fn parse_score(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is outside [0, 1]", value))
    }
}

pub fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let expanded = PathBuf::from(ConfigLoader::expand_path(&path.to_string_lossy()));
            ConfigLoader::load(&expanded)
                .with_context(|| format!("Failed to load config {}", expanded.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Apply per-invocation flags on top of the file configuration.
pub fn apply_overrides(config: &mut EngineConfig, args: &ArgMatches) -> Result<()> {
    if let Some(strategy) = args.try_get_one::<String>("strategy").ok().flatten() {
        config.fusion.strategy = StrategyKind::from_str(strategy)
            .ok_or_else(|| anyhow!("Unknown fusion strategy '{}'", strategy))?;
    }

    if let Some(kind) = args.try_get_one::<String>("renderer").ok().flatten() {
        config.renderer.kind = RendererKind::from_str(kind)
            .ok_or_else(|| anyhow!("Unknown renderer '{}'", kind))?;
    }

    if let Some(dir) = args.try_get_one::<PathBuf>("snapshot-dir").ok().flatten() {
        config.renderer.kind = RendererKind::Snapshot;
        config.renderer.snapshot_dir = Some(dir.clone());
    }

    config.validate()?;
    Ok(())
}

fn build_evaluator(config: EngineConfig, url_score: Option<f64>) -> Result<Evaluator> {
    let renderer = renderer_from_config(&config.renderer)?;
    let url_scorer = url_scorer_from_config(&config.url_scorer, url_score)?;
    Ok(Evaluator::new(DecisionEngine::new(config), renderer, url_scorer))
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message);
    spinner
}

fn colored_label(result: &FusionResult) -> String {
    match result.final_label {
        Verdict::Phishing => format!("✗ {}", result.final_label).red().bold().to_string(),
        Verdict::Legitimate => format!("✓ {}", result.final_label).green().bold().to_string(),
    }
}

fn report_format(args: &ArgMatches) -> ReportFormat {
    args.get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text)
}

fn emit(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            save_report(content, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("{} Report saved to {}", "✓".green().bold(), path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

pub async fn handle_evaluate(args: &ArgMatches, mut config: EngineConfig) -> Result<()> {
    apply_overrides(&mut config, args)?;

    let url = args
        .get_one::<Url>("url")
        .ok_or_else(|| anyhow!("--url is required"))?;
    let brand = args.get_one::<String>("brand").map(String::as_str);
    let url_score = args.get_one::<f64>("url-score").copied();

    let evaluator = build_evaluator(config, url_score)?;
    let progress = spinner(format!("Evaluating {}", url));
    let result = evaluator.evaluate(url.as_str(), brand).await;
    progress.finish_and_clear();
    let result = result?;

    let content = match report_format(args) {
        ReportFormat::Json => format!("{}\n", generate_json_report(&result)?),
        _ => generate_text_report(&result),
    };

    let output = args.get_one::<PathBuf>("output");
    if output.is_none() {
        println!("{}\n", colored_label(&result));
    }
    emit(&content, output)
}

pub async fn handle_batch(args: &ArgMatches, mut config: EngineConfig) -> Result<()> {
    apply_overrides(&mut config, args)?;

    let hosts_file = args
        .get_one::<PathBuf>("hosts-file")
        .ok_or_else(|| anyhow!("--hosts-file is required"))?;
    let urls = load_urls_from_file(hosts_file).map_err(|e| anyhow!(e))?;
    let threads = args.get_one::<usize>("threads").copied().unwrap_or(4).max(1);
    let url_score = args.get_one::<f64>("url-score").copied();

    println!(
        "{} Evaluating {} URL(s) with {} worker(s)\n",
        "→".blue(),
        urls.len().to_string().bright_white(),
        threads
    );

    let evaluator = build_evaluator(config, url_score)?;
    let semaphore = Arc::new(Semaphore::new(threads));
    let progress = ProgressBar::new(urls.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let tasks = urls.into_iter().map(|url| {
        let evaluator = evaluator.clone();
        let semaphore = Arc::clone(&semaphore);
        let progress = progress.clone();
        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            debug!("Worker picked up {}", url);
            let outcome = evaluator.evaluate(&url, None).await;
            progress.set_message(url.clone());
            progress.inc(1);
            (url, outcome)
        })
    });

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for joined in join_all(tasks).await {
        let (url, outcome) = joined.context("Evaluation task panicked")?;
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => failures.push(FailedEvaluation {
                url,
                error: e.to_string(),
            }),
        }
    }
    progress.finish_and_clear();

    let content = match report_format(args) {
        ReportFormat::Json => format!("{}\n", generate_batch_json_report(&results, &failures)?),
        ReportFormat::Csv => generate_batch_csv_report(&results),
        ReportFormat::Text => generate_batch_text_report(&results, &failures),
    };
    emit(&content, args.get_one::<PathBuf>("output"))?;

    let phishing = results.iter().filter(|r| r.is_phishing()).count();
    println!(
        "\n{} {} phishing, {} legitimate, {} failed",
        "✓".green().bold(),
        phishing.to_string().red().bold(),
        results.len() - phishing,
        failures.len()
    );
    Ok(())
}

pub fn handle_dom(args: &ArgMatches, config: &EngineConfig) -> Result<()> {
    let test = args
        .get_one::<PathBuf>("test")
        .ok_or_else(|| anyhow!("--test is required"))?;
    let reference = args
        .get_one::<PathBuf>("reference")
        .ok_or_else(|| anyhow!("--reference is required"))?;

    let comparator = DomComparator::new(config.dom.decay, config.dom.max_depth);
    let score = comparator.score_files(test, reference);
    println!("{} {:.4}", "DOM similarity:".bright_white().bold(), score);
    Ok(())
}

pub fn handle_visual(args: &ArgMatches) -> Result<()> {
    let test = args
        .get_one::<PathBuf>("test")
        .ok_or_else(|| anyhow!("--test is required"))?;
    let reference = args
        .get_one::<PathBuf>("reference")
        .ok_or_else(|| anyhow!("--reference is required"))?;

    let score = visual::score_files(test, reference);
    println!("{} {:.4}", "Visual similarity:".bright_white().bold(), score);
    Ok(())
}

pub fn handle_fuse(args: &ArgMatches, mut config: EngineConfig) -> Result<()> {
    apply_overrides(&mut config, args)?;

    let url = args
        .get_one::<Url>("url")
        .ok_or_else(|| anyhow!("--url is required"))?;
    let url_score = args
        .get_one::<f64>("url-score")
        .copied()
        .ok_or_else(|| anyhow!("--url-score is required"))?;
    let dom_score = args.get_one::<f64>("dom-score").copied().unwrap_or(0.0);
    let visual_score = args.get_one::<f64>("visual-score").copied().unwrap_or(0.0);
    let brand = args.get_one::<String>("brand").map(String::as_str);

    let reference = match brand.and_then(normalize_brand) {
        _ if dom_score > 0.0 => ReferenceStatus::Scored,
        None => ReferenceStatus::UnknownBrand,
        Some(brand) if domain_matches(&brand, url) => ReferenceStatus::RenderFailed,
        Some(_) => ReferenceStatus::OffDomain,
    };

    let engine = DecisionEngine::new(config);
    let result = engine.fuse_scores(url, url_score, brand, dom_score, visual_score, reference)?;

    match report_format(args) {
        ReportFormat::Json => println!("{}", generate_json_report(&result)?),
        _ => {
            println!("{}\n", colored_label(&result));
            print!("{}", generate_text_report(&result));
        }
    }
    Ok(())
}

pub fn handle_config(config: &EngineConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
