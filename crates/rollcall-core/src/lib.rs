//! Rollcall Core - Foundation crate for the Rollcall profile harvester.
//!
//! This crate provides the shared domain types, the local clock used for
//! timestamps, error handling and configuration management that all other
//! Rollcall crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Work-queue and profile types (`Identifier`, `Target`, `ProfileRecord`, `Column`)
//! - [`clock`] - Fixed-offset local clock and the timestamp formats written to the store
//!
//! # Example
//!
//! ```rust
//! use rollcall_core::{AppConfig, Column, ProfileRecord};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.scraping.batch_size, 20);
//!
//! let mut record = ProfileRecord::new("alice");
//! record.set(Column::City, "Lahore");
//! assert_eq!(record.get(Column::City), "Lahore");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use clock::LocalClock;
pub use config::{
    AppConfig, BrowserConfig, DuplicatePolicy, GeneralConfig, ScrapingConfig, StoreConfig,
};
pub use error::{ConfigError, ConfigResult, Result, RollcallError};
pub use types::{
    clean_value, AccountStatus, Column, Identifier, ProfileRecord, RowHandle, Target,
    TargetStatus, COLUMN_COUNT,
};
