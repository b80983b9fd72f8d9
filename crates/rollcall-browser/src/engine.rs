use crate::error::{BrowserError, Result};
use crate::fetcher::{PageFetcher, PageRequest};
use crate::fingerprint::Fingerprint;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::stream::StreamExt;
use rollcall_core::BrowserConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Session {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// Browser automation engine: one Chromium process, one tab.
pub struct BrowserEngine {
    session: Mutex<Option<Session>>,
    fingerprint: Fingerprint,
}

impl BrowserEngine {
    /// Launch Chromium according to `config` and open a blank tab.
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let fingerprint = Fingerprint::randomized(config.window_width, config.window_height);

        let mut builder = LaunchConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.window_width, fingerprint.window_height)
            .args(fingerprint.launch_args());
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let launch = builder.build().map_err(BrowserError::Chromium)?;

        let (browser, mut handler) = Browser::launch(launch)
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;

        // Drive the CDP connection; the task ends when the browser goes away.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Chromium(e.to_string()))?;

        tracing::info!(
            "Browser launched (headless={}, {}x{})",
            config.headless,
            fingerprint.window_width,
            fingerprint.window_height
        );

        Ok(Self {
            session: Mutex::new(Some(Session {
                browser,
                page,
                handler,
            })),
            fingerprint,
        })
    }

    /// User agent the session presents.
    pub fn user_agent(&self) -> &str {
        &self.fingerprint.user_agent
    }

    /// Close the browser. Later fetches fail with `SessionClosed`.
    pub async fn close(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };

        if let Err(e) = session.browser.close().await {
            tracing::warn!("Failed to close browser cleanly: {}", e);
        }
        if let Err(e) = session.browser.wait().await {
            tracing::warn!("Failed to wait for browser exit: {}", e);
        }
        session.handler.abort();
        tracing::info!("Browser closed");
    }

    async fn wait_for_any(page: &Page, selectors: &[String], deadline: Instant) -> Result<()> {
        if selectors.is_empty() {
            return Ok(());
        }

        loop {
            for selector in selectors {
                if page.find_element(selector.as_str()).await.is_ok() {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "none of [{}] appeared",
                    selectors.join(", ")
                )));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }
}

fn map_cdp_error(err: CdpError, session: &Session) -> BrowserError {
    if session.handler.is_finished() {
        return BrowserError::SessionClosed;
    }
    match err {
        CdpError::Timeout => BrowserError::Timeout(err.to_string()),
        other => BrowserError::Navigation(other.to_string()),
    }
}

#[async_trait::async_trait]
impl PageFetcher for BrowserEngine {
    async fn fetch(&self, request: &PageRequest) -> Result<String> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(BrowserError::SessionClosed)?;
        if session.handler.is_finished() {
            return Err(BrowserError::SessionClosed);
        }

        let deadline = Instant::now() + request.timeout;
        tracing::debug!("Navigating to {}", request.url);

        match tokio::time::timeout_at(deadline, session.page.goto(request.url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(map_cdp_error(e, session)),
            Err(_) => {
                return Err(BrowserError::Timeout(format!(
                    "navigation to {} exceeded {:?}",
                    request.url, request.timeout
                )))
            }
        }

        Self::wait_for_any(&session.page, &request.wait_for, deadline).await?;

        session
            .page
            .content()
            .await
            .map_err(|e| map_cdp_error(e, session))
    }
}
