//! Headless browser session for loading forum pages.
//!
//! One Chromium process with a single tab, exposed through the
//! [`PageFetcher`] trait so the extractor can run against a fake in tests.

pub mod engine;
pub mod error;
pub mod fetcher;
pub mod fingerprint;

pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use fetcher::{PageFetcher, PageRequest};
pub use fingerprint::Fingerprint;
