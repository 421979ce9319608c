use crate::error::{Result, ScanError};
use async_trait::async_trait;
use phishdetect_core::{CollaboratorError, UrlScorer, UrlVerdict};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Always reports the same score, e.g. one supplied on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedUrlScorer {
    score: f64,
    brand: Option<String>,
}

impl FixedUrlScorer {
    pub fn new(score: f64) -> Self {
        Self { score, brand: None }
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }
}

#[async_trait]
impl UrlScorer for FixedUrlScorer {
    async fn score_url(&self, _url: &Url) -> std::result::Result<UrlVerdict, CollaboratorError> {
        Ok(UrlVerdict {
            url_score: self.score,
            detected_brand: self.brand.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    url_score: f64,
    #[serde(default)]
    detected_brand: Option<String>,
}

/// Client for a lexical URL classification service.
///
/// Sends `POST {"url": ...}` and expects
/// `{"url_score": float, "detected_brand": string?}` back.
#[derive(Debug, Clone)]
pub struct HttpUrlScorer {
    client: Client,
    endpoint: Url,
}

impl HttpUrlScorer {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client, endpoint })
    }

    async fn request(&self, url: &Url) -> Result<UrlVerdict> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&ScoreRequest { url: url.as_str() })
            .send()
            .await?
            .error_for_status()?;

        let body: ScoreResponse = response.json().await?;
        if !body.url_score.is_finite() {
            return Err(ScanError::ParseError(format!("url_score {}", body.url_score)));
        }

        let detected_brand = body
            .detected_brand
            .map(|b| b.trim().to_lowercase())
            .filter(|b| !b.is_empty());

        debug!("{} scored {:.4} (brand {:?})", url, body.url_score, detected_brand);
        Ok(UrlVerdict {
            url_score: body.url_score.clamp(0.0, 1.0),
            detected_brand,
        })
    }
}

#[async_trait]
impl UrlScorer for HttpUrlScorer {
    async fn score_url(&self, url: &Url) -> std::result::Result<UrlVerdict, CollaboratorError> {
        self.request(url).await.map_err(|e| e.into_url_score_error(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    fn target() -> Url {
        Url::parse("https://paypa1.com/login").unwrap()
    }

    #[tokio::test]
    async fn test_fixed_scorer() {
        let scorer = FixedUrlScorer::new(0.42).with_brand("paypal");
        let verdict = scorer.score_url(&target()).await.unwrap();
        assert_eq!(verdict.url_score, 0.42);
        assert_eq!(verdict.detected_brand.as_deref(), Some("paypal"));
    }

    #[tokio::test]
    async fn test_http_scorer_parses_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/predict"))
            .and(body_json(serde_json::json!({"url": "https://paypa1.com/login"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"url_score": 0.73, "detected_brand": " PayPal "})),
            )
            .mount(&mock_server)
            .await;

        let scorer = HttpUrlScorer::new(&format!("{}/predict", mock_server.uri()), 5).unwrap();
        let verdict = scorer.score_url(&target()).await.unwrap();
        assert_eq!(verdict.url_score, 0.73);
        assert_eq!(verdict.detected_brand.as_deref(), Some("paypal"));
    }

    #[tokio::test]
    async fn test_http_scorer_clamps_and_handles_missing_brand() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"url_score": 1.5})))
            .mount(&mock_server)
            .await;

        let scorer = HttpUrlScorer::new(&mock_server.uri(), 5).unwrap();
        let verdict = scorer.score_url(&target()).await.unwrap();
        assert_eq!(verdict.url_score, 1.0);
        assert_eq!(verdict.detected_brand, None);
    }

    #[tokio::test]
    async fn test_http_scorer_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let scorer = HttpUrlScorer::new(&mock_server.uri(), 5).unwrap();
        let result = scorer.score_url(&target()).await;
        assert!(matches!(result, Err(CollaboratorError::UrlScore { .. })));
    }

    #[tokio::test]
    async fn test_http_scorer_malformed_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("nope"))
            .mount(&mock_server)
            .await;

        let scorer = HttpUrlScorer::new(&mock_server.uri(), 5).unwrap();
        assert!(scorer.score_url(&target()).await.is_err());
    }

    #[test]
    fn test_http_scorer_invalid_endpoint() {
        assert!(matches!(HttpUrlScorer::new("not a url", 5), Err(ScanError::InvalidUrl(_))));
    }
}
