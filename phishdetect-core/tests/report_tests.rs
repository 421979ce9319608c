// Tests for report generation functionality

use phishdetect_core::model::{FusionResult, ReferenceStatus, Verdict};
use phishdetect_core::report::{
    BatchSummary, FailedEvaluation, ReportFormat, generate_batch_csv_report,
    generate_batch_json_report, generate_batch_text_report, generate_json_report,
    generate_text_report, save_report,
};
use tempfile::TempDir;

fn result(url: &str, brand: &str, hybrid: f64, label: Verdict, reference: ReferenceStatus) -> FusionResult {
    FusionResult {
        url: url.to_string(),
        brand: brand.to_string(),
        domain_match: false,
        url_score: 0.31234,
        dom_score: 0.0,
        visual_score: 0.0,
        similarity_score: 0.0,
        hybrid_score: hybrid,
        threshold: 0.5,
        final_label: label,
        reference,
        strategy: "heuristic".to_string(),
    }
}

fn sample_results() -> Vec<FusionResult> {
    vec![
        result("https://example.org/", "", 0.2, Verdict::Legitimate, ReferenceStatus::UnknownBrand),
        result("https://paypa1.com/login", "paypal", 0.6, Verdict::Phishing, ReferenceStatus::OffDomain),
    ]
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert_eq!(ReportFormat::from_str("text"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("json"), Some(ReportFormat::Json));
    assert_eq!(ReportFormat::from_str("csv"), Some(ReportFormat::Csv));
}

#[test]
fn test_report_format_from_str_case_insensitive() {
    assert_eq!(ReportFormat::from_str("TEXT"), Some(ReportFormat::Text));
    assert_eq!(ReportFormat::from_str("Json"), Some(ReportFormat::Json));
}

#[test]
fn test_report_format_from_str_invalid() {
    assert!(ReportFormat::from_str("pdf").is_none());
    assert!(ReportFormat::from_str("").is_none());
}

// ============================================================================
// Single Result Reports
// ============================================================================

#[test]
fn test_text_report_contents() {
    let report = generate_text_report(&sample_results()[1]);
    assert!(report.contains("https://paypa1.com/login"));
    assert!(report.contains("PHISHING"));
    assert!(report.contains("0.6000"));
    assert!(report.contains("paypal"));
    assert!(report.contains("brand not in host"));
    assert!(report.contains("0.3123"));
}

#[test]
fn test_text_report_unknown_brand() {
    let report = generate_text_report(&sample_results()[0]);
    assert!(report.contains("(unknown)"));
    assert!(report.contains("LEGITIMATE"));
}

#[test]
fn test_json_report_has_all_fields() {
    let json = generate_json_report(&sample_results()[1]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    for field in [
        "url",
        "brand",
        "domain_match",
        "url_score",
        "dom_score",
        "visual_score",
        "similarity_score",
        "hybrid_score",
        "threshold",
        "final_label",
    ] {
        assert!(value.get(field).is_some(), "missing field {}", field);
    }
    assert_eq!(value["url_score"], 0.3123);
    assert_eq!(value["final_label"], "Phishing");
}

// ============================================================================
// Batch Reports
// ============================================================================

#[test]
fn test_batch_summary_counts() {
    let failures = vec![FailedEvaluation {
        url: "https://down.example".to_string(),
        error: "URL scoring failed".to_string(),
    }];
    let summary = BatchSummary::from_results(&sample_results(), &failures);
    assert_eq!(summary.total, 3);
    assert_eq!(summary.phishing, 1);
    assert_eq!(summary.legitimate, 1);
    assert_eq!(summary.failed, 1);
}

#[test]
fn test_batch_text_report_orders_by_probability() {
    let report = generate_batch_text_report(&sample_results(), &[]);
    let phishing = report.find("paypa1.com").unwrap();
    let legit = report.find("example.org").unwrap();
    assert!(phishing < legit);
    assert!(report.contains("Phishing:     1"));
    assert!(!report.contains("Failed evaluations"));
}

#[test]
fn test_batch_text_report_lists_failures() {
    let failures = vec![FailedEvaluation {
        url: "https://down.example".to_string(),
        error: "boom".to_string(),
    }];
    let report = generate_batch_text_report(&[], &failures);
    assert!(report.contains("Failed evaluations"));
    assert!(report.contains("https://down.example: boom"));
}

#[test]
fn test_batch_json_report_structure() {
    let json = generate_batch_json_report(&sample_results(), &[]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["report"]["metadata"]["generator"], "PhishDetect");
    assert_eq!(value["report"]["summary"]["phishing"], 1);
    assert_eq!(value["report"]["results"].as_array().unwrap().len(), 2);
}

#[test]
fn test_batch_csv_report() {
    let mut results = sample_results();
    results[0].url = "https://example.org/?a=1,2".to_string();
    let csv = generate_batch_csv_report(&results);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("url,brand,"));
    assert!(lines[1].starts_with("\"https://example.org/?a=1,2\","));
    assert!(lines[2].ends_with("Phishing,off_domain"));
}

#[test]
fn test_save_report() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("report.txt");
    save_report("hello", &path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
}
