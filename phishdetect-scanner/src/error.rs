use phishdetect_core::CollaboratorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Renderer failed: {0}")]
    RenderFailed(String),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

impl ScanError {
    pub fn into_render_error(self, url: &url::Url) -> CollaboratorError {
        CollaboratorError::render(url, self)
    }

    pub fn into_url_score_error(self, url: &url::Url) -> CollaboratorError {
        CollaboratorError::url_score(url, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_errors_carry_their_url() {
        let url = url::Url::parse("https://paypa1.com/login").unwrap();

        let render = ScanError::Timeout(3).into_render_error(&url);
        assert!(matches!(render, CollaboratorError::Render { .. }));
        assert_eq!(
            render.to_string(),
            "Rendering https://paypa1.com/login failed: Timed out after 3s"
        );

        let score = ScanError::ParseError("missing score".to_string()).into_url_score_error(&url);
        assert!(matches!(score, CollaboratorError::UrlScore { .. }));
        assert!(score.to_string().ends_with("Parse error: missing score"));
    }
}
