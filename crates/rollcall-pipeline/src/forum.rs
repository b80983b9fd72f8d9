//! Profile extraction from the forum through a page fetcher.

use crate::extractor::{ExtractionFailure, FailureKind, ProfileExtractor};
use crate::parser::{needs_recent_post, ProfilePageParser, POST_READY_SELECTOR, PROFILE_READY_SELECTOR};
use rollcall_browser::{BrowserError, PageFetcher, PageRequest};
use rollcall_core::{AppConfig, Column, Identifier, LocalClock, ProfileRecord};
use std::sync::Arc;
use std::time::Duration;

/// Page-load timing for [`ForumExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForumTimings {
    /// Budget for the profile page
    pub navigation_timeout: Duration,
    /// Budget for the recent-post page
    pub post_timeout: Duration,
    /// Pause before loading the recent-post page
    pub post_page_pause: Duration,
}

impl ForumTimings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(config.browser.navigation_timeout_secs),
            post_timeout: Duration::from_secs(config.browser.post_timeout_secs),
            post_page_pause: Duration::from_millis(config.scraping.post_page_pause_ms),
        }
    }
}

impl Default for ForumTimings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Loads a profile page, and for active posters their newest post.
pub struct ForumExtractor<F: PageFetcher + ?Sized> {
    fetcher: Arc<F>,
    parser: ProfilePageParser,
    timings: ForumTimings,
}

impl<F: PageFetcher + ?Sized> ForumExtractor<F> {
    pub fn new(fetcher: Arc<F>, parser: ProfilePageParser, timings: ForumTimings) -> Self {
        Self {
            fetcher,
            parser,
            timings,
        }
    }

    /// Build from application config.
    pub fn from_config(
        fetcher: Arc<F>,
        config: &AppConfig,
        clock: LocalClock,
    ) -> Result<Self, url::ParseError> {
        let parser = ProfilePageParser::new(&config.browser.base_url, clock)?;
        Ok(Self::new(fetcher, parser, ForumTimings::from_config(config)))
    }

    async fn attach_recent_post(
        &self,
        nickname: &str,
        record: &mut ProfileRecord,
    ) -> Result<(), ExtractionFailure> {
        tokio::time::sleep(self.timings.post_page_pause).await;

        let request = PageRequest::new(&self.parser.posts_url(nickname), self.timings.post_timeout)?
            .wait_for(POST_READY_SELECTOR);

        match self.fetcher.fetch(&request).await {
            Ok(html) => {
                let post = self.parser.parse_recent_post(&html);
                record.set(Column::LastPost, post.url);
                record.set(Column::LastPostTime, post.time);
                Ok(())
            }
            Err(BrowserError::SessionClosed) => Err(BrowserError::SessionClosed.into()),
            Err(e) => {
                tracing::debug!("No recent post for {}: {}", nickname, e);
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl<F: PageFetcher + ?Sized> ProfileExtractor for ForumExtractor<F> {
    async fn extract(&self, identifier: &Identifier) -> Result<ProfileRecord, ExtractionFailure> {
        let nickname = identifier.as_str();
        tracing::debug!("Scraping profile {}", nickname);

        let request = PageRequest::new(
            &self.parser.profile_url(nickname),
            self.timings.navigation_timeout,
        )?
        .wait_for(PROFILE_READY_SELECTOR);

        let html = self.fetcher.fetch(&request).await.map_err(|e| {
            let failure = ExtractionFailure::from(e);
            match failure.kind {
                FailureKind::Timeout => tracing::warn!("Timeout while scraping {}", nickname),
                _ => tracing::warn!("Browser error while scraping {}: {}", nickname, failure),
            }
            failure
        })?;

        let mut record = self.parser.parse_profile(&html, nickname);
        if needs_recent_post(&record) {
            self.attach_recent_post(nickname, &mut record).await?;
        }

        tracing::info!(
            "Extracted: Gender={}, City={}, Posts={}, Status={}",
            record.get(Column::Gender),
            record.get(Column::City),
            record.get(Column::Posts),
            record.get(Column::Status)
        );

        Ok(record)
    }
}
