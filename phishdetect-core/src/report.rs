// Report generation for evaluation results

use crate::model::{FusionResult, round4_value};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }
}

/// A URL that could not be evaluated at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEvaluation {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub phishing: usize,
    pub legitimate: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[FusionResult], failures: &[FailedEvaluation]) -> Self {
        let phishing = results.iter().filter(|r| r.is_phishing()).count();
        Self {
            total: results.len() + failures.len(),
            phishing,
            legitimate: results.len() - phishing,
            failed: failures.len(),
        }
    }
}

pub fn generate_text_report(result: &FusionResult) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push('\n');
    report.push_str(&format!("URL:          {}\n", result.url));
    report.push_str(&format!("Verdict:      {}\n", result.final_label.as_str().to_uppercase()));
    report.push_str(&format!(
        "Probability:  {:.4}  (threshold {})\n",
        round4_value(result.hybrid_score),
        result.threshold
    ));
    report.push_str(RULE);
    report.push_str("\n\n");

    let brand = if result.brand.is_empty() { "(unknown)" } else { result.brand.as_str() };
    report.push_str(&format!("Brand:        {}\n", brand));
    report.push_str(&format!(
        "Domain match: {}\n",
        if result.domain_match { "yes" } else { "no" }
    ));
    report.push_str(&format!("Reference:    {}\n", describe_reference(result)));
    report.push_str(&format!("Strategy:     {}\n\n", result.strategy));

    report.push_str("Signals:\n");
    report.push_str(&format!("  URL         {:.4}\n", round4_value(result.url_score)));
    report.push_str(&format!("  DOM         {:.4}\n", round4_value(result.dom_score)));
    report.push_str(&format!("  Visual      {:.4}\n", round4_value(result.visual_score)));
    report.push_str(&format!("  Similarity  {:.4}\n", round4_value(result.similarity_score)));

    report
}

fn describe_reference(result: &FusionResult) -> &'static str {
    use crate::model::ReferenceStatus::*;
    match result.reference {
        Scored => "compared against brand reference",
        UnknownBrand => "skipped, no brand identified",
        OffDomain => "skipped, brand not in host",
        RenderFailed => "brand reference unavailable",
        TestRenderFailed => "page could not be rendered",
    }
}

pub fn generate_json_report(result: &FusionResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

pub fn generate_batch_text_report(results: &[FusionResult], failures: &[FailedEvaluation]) -> String {
    let summary = BatchSummary::from_results(results, failures);
    let mut report = String::new();

    report.push_str(RULE);
    report.push('\n');
    report.push_str("                         PHISHDETECT BATCH REPORT\n");
    report.push_str(RULE);
    report.push_str("\n\n");

    report.push_str(&format!(
        "Generated:    {}\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("URLs:         {}\n", summary.total));
    report.push_str(&format!("Phishing:     {}\n", summary.phishing));
    report.push_str(&format!("Legitimate:   {}\n", summary.legitimate));
    if summary.failed > 0 {
        report.push_str(&format!("Failed:       {}\n", summary.failed));
    }
    report.push('\n');

    if !results.is_empty() {
        report.push_str(&format!(
            "{:<11} {:>6} {:>6} {:>6} {:>6}  {:<12} {}\n",
            "VERDICT", "PROB", "URL", "DOM", "VIS", "BRAND", "TARGET"
        ));
        report.push_str(&"─".repeat(80));
        report.push('\n');

        let mut sorted: Vec<&FusionResult> = results.iter().collect();
        sorted.sort_by(|a, b| b.hybrid_score.total_cmp(&a.hybrid_score));

        for result in sorted {
            report.push_str(&format!(
                "{:<11} {:>6.4} {:>6.4} {:>6.4} {:>6.4}  {:<12} {}\n",
                result.final_label.as_str(),
                round4_value(result.hybrid_score),
                round4_value(result.url_score),
                round4_value(result.dom_score),
                round4_value(result.visual_score),
                if result.brand.is_empty() { "-" } else { result.brand.as_str() },
                result.url
            ));
        }
        report.push('\n');
    }

    if !failures.is_empty() {
        report.push_str("Failed evaluations:\n");
        for failure in failures {
            report.push_str(&format!("  ✗ {}: {}\n", failure.url, failure.error));
        }
        report.push('\n');
    }

    report
}

pub fn generate_batch_json_report(
    results: &[FusionResult],
    failures: &[FailedEvaluation],
) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "PhishDetect",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
            },
            "summary": BatchSummary::from_results(results, failures),
            "results": results,
            "failures": failures,
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_batch_csv_report(results: &[FusionResult]) -> String {
    let mut report = String::from(
        "url,brand,domain_match,url_score,dom_score,visual_score,similarity_score,hybrid_score,final_label,reference\n",
    );

    for result in results {
        report.push_str(&format!(
            "{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{},{}\n",
            csv_field(&result.url),
            csv_field(&result.brand),
            result.domain_match,
            round4_value(result.url_score),
            round4_value(result.dom_score),
            round4_value(result.visual_score),
            round4_value(result.similarity_score),
            round4_value(result.hybrid_score),
            result.final_label,
            result.reference
        ));
    }

    report
}

fn csv_field(value: &str) -> String {
    if value.contains(|c| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
