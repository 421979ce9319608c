use crate::error::{Result, ScanError};
use async_trait::async_trait;
use phishdetect_core::{CollaboratorError, DomTree, RenderedPage, Renderer};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

/// Drives an external headless-browser script.
///
/// The script is invoked as `<command...> <url> <output.json>` and must
/// write the DOM envelope to `output.json` and, optionally, a screenshot to
/// the sibling `output.png`. The child is killed if it outlives the timeout.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout_secs: u64,
}

impl CommandRenderer {
    pub fn new(command: &[String], timeout_secs: u64) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ScanError::Other("renderer command is empty".to_string()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout_secs,
        })
    }

    async fn run(&self, url: &Url, dest: &Path) -> Result<RenderedPage> {
        let dom_path = dest.with_extension("json");
        let screenshot_path = dest.with_extension("png");
        debug!("Running {} {:?} for {}", self.program, self.args, url);

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(url.as_str())
            .arg(&dom_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ScanError::Timeout(self.timeout_secs))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("").trim();
            return Err(ScanError::RenderFailed(format!("{} {}", output.status, detail)));
        }

        let json = tokio::fs::read_to_string(&dom_path).await.map_err(|e| {
            ScanError::RenderFailed(format!("no DOM artifact at {}: {}", dom_path.display(), e))
        })?;
        let dom = DomTree::from_json_str(&json).map_err(|e| ScanError::ParseError(e.to_string()))?;

        let screenshot = existing(screenshot_path).await;
        if screenshot.is_none() {
            warn!("Renderer produced no screenshot for {}", url);
        }

        info!("Rendered {}", url);
        Ok(RenderedPage { dom, screenshot })
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, url: &Url, dest: &Path) -> std::result::Result<RenderedPage, CollaboratorError> {
        self.run(url, dest).await.map_err(|e| e.into_render_error(url))
    }
}

/// Fetches the raw HTML and builds the DOM from it. No JavaScript runs and
/// no screenshot is taken, so visual similarity is always `0.0`.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client })
    }

    async fn fetch(&self, url: &Url, dest: &Path) -> Result<RenderedPage> {
        debug!("Fetching {}", url);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::RenderFailed(format!("HTTP {}", status)));
        }

        let body = response.text().await?;
        let dom = DomTree::from_html(&body);

        // Keep the DOM next to the other request artifacts
        let json = dom.to_json_string().map_err(|e| ScanError::ParseError(e.to_string()))?;
        tokio::fs::write(dest.with_extension("json"), json).await?;

        Ok(RenderedPage { dom, screenshot: None })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &Url, dest: &Path) -> std::result::Result<RenderedPage, CollaboratorError> {
        self.fetch(url, dest).await.map_err(|e| e.into_render_error(url))
    }
}

/// Serves pre-rendered artifacts named after the URL host:
/// `<dir>/<host>.json` and, optionally, `<dir>/<host>.png`.
#[derive(Debug, Clone)]
pub struct SnapshotRenderer {
    dir: PathBuf,
}

impl SnapshotRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn load(&self, url: &Url) -> Result<RenderedPage> {
        let host = url
            .host_str()
            .ok_or_else(|| ScanError::InvalidUrl(format!("{} has no host", url)))?;

        let dom_path = self.dir.join(format!("{}.json", host));
        let json = tokio::fs::read_to_string(&dom_path).await.map_err(|e| {
            ScanError::RenderFailed(format!("no snapshot at {}: {}", dom_path.display(), e))
        })?;
        let dom = DomTree::from_json_str(&json).map_err(|e| ScanError::ParseError(e.to_string()))?;
        let screenshot = existing(self.dir.join(format!("{}.png", host))).await;

        debug!("Loaded snapshot for {}", host);
        Ok(RenderedPage { dom, screenshot })
    }
}

#[async_trait]
impl Renderer for SnapshotRenderer {
    async fn render(&self, url: &Url, _dest: &Path) -> std::result::Result<RenderedPage, CollaboratorError> {
        self.load(url).await.map_err(|e| e.into_render_error(url))
    }
}

async fn existing(path: PathBuf) -> Option<PathBuf> {
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Some(path),
        _ => None,
    }
}
