use crate::error::{BrowserError, Result};
use std::time::Duration;

/// One page load: where to go and what to wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    /// CSS selectors; the page is ready once any one of them matches
    pub wait_for: Vec<String>,
    pub timeout: Duration,
}

impl PageRequest {
    /// Build a request for an absolute `http(s)` URL.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| BrowserError::Navigation(format!("Invalid URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BrowserError::Navigation(format!(
                "Unsupported scheme in {url}"
            )));
        }

        Ok(Self {
            url: parsed.to_string(),
            wait_for: Vec::new(),
            timeout,
        })
    }

    #[must_use]
    pub fn wait_for(mut self, selector: impl Into<String>) -> Self {
        self.wait_for.push(selector.into());
        self
    }
}

/// Loads pages and returns their rendered HTML.
///
/// Implementations hold one exclusive session; callers issue requests one
/// at a time.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Navigate to `request.url`, wait for a ready selector, return the HTML.
    ///
    /// Fails with [`BrowserError::Timeout`] when no selector appears within
    /// `request.timeout`.
    async fn fetch(&self, request: &PageRequest) -> Result<String>;
}
