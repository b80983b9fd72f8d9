//! Shared types used across Rollcall.
//!
//! This module defines the work-queue and profile types: target identifiers,
//! row handles, the target status state machine, the Profiles column layout
//! and the profile record itself.

use crate::error::RollcallError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for a profile identifier (the forum nickname).
///
/// Identifiers are trimmed and must be non-empty. Equality is exact; use
/// [`Identifier::lookup_key`] for the case-insensitive key used by the
/// existing-records cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    /// Create a new `Identifier` from a string.
    ///
    /// # Errors
    /// Returns error if the identifier is blank after trimming.
    pub fn new(id: impl Into<String>) -> Result<Self, RollcallError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(RollcallError::Validation(
                "identifier must not be blank".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased key for case-insensitive lookups.
    #[must_use]
    pub fn lookup_key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a row in one of the store's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowHandle(i64);

impl RowHandle {
    /// Wrap a raw row number.
    #[must_use]
    pub fn new(row: i64) -> Self {
        Self(row)
    }

    /// Raw row number.
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a target in the work queue.
///
/// The pipeline only ever moves `Pending` to `Done` or `Error`, or back to
/// `Pending` when a run is interrupted mid-target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetStatus {
    /// Waiting to be processed
    Pending,
    /// Processed: a new profile row or a duplicate
    Done,
    /// Processing failed; needs an operator reset to run again
    Error,
}

impl TargetStatus {
    /// Parse an exact status label as stored in the work queue.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Pending" => Some(Self::Pending),
            "Done" => Some(Self::Done),
            "Error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Normalize a free-form status label.
    ///
    /// Anything mentioning done/complete is `Done`; error, unverified or
    /// banned is `Error`; everything else falls back to `Pending`.
    #[must_use]
    pub fn normalize(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        if lower.contains("done") || lower.contains("complete") {
            Self::Done
        } else if lower.contains("error") || lower.contains("unverified") || lower.contains("banned")
        {
            Self::Error
        } else {
            Self::Pending
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Done => write!(f, "Done"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// One unit of work read from the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Nickname to scrape
    pub identifier: Identifier,
    /// Row of this target in the work queue
    pub queue_row: RowHandle,
    /// Status at the time the queue was read
    pub status: TargetStatus,
    /// Free-form remarks
    pub remarks: String,
    /// Where the target came from; copied into the profile's SOURCE column
    pub source: String,
}

/// Account status shown on a profile page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Normal, verified account
    Verified,
    /// Account flagged as unverified
    Unverified,
    /// Suspended account
    Banned,
}

impl AccountStatus {
    /// Parse a status label; unknown labels yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "verified" | "normal" => Some(Self::Verified),
            "unverified" => Some(Self::Unverified),
            "banned" => Some(Self::Banned),
            _ => None,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => write!(f, "Verified"),
            Self::Unverified => write!(f, "Unverified"),
            Self::Banned => write!(f, "Banned"),
        }
    }
}

/// Columns of the Profiles table, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    /// Forum nickname (the identifier)
    NickName,
    /// Comma-separated tags from the Tags table
    Tags,
    /// City
    City,
    /// Male/Female
    Gender,
    /// Yes/No
    Married,
    /// Age
    Age,
    /// Join date
    Joined,
    /// Follower count
    Followers,
    /// Account status
    Status,
    /// Post count
    Posts,
    /// Bio text
    Intro,
    /// Target source
    Source,
    /// When the record was captured
    DateTimeScrap,
    /// URL of the most recent post
    LastPost,
    /// Date of the most recent post
    LastPostTime,
    /// Avatar image URL
    Image,
    /// Profile page URL
    ProfileLink,
    /// Public posts page URL
    PostUrl,
}

/// Number of columns in a profile row.
pub const COLUMN_COUNT: usize = 18;

impl Column {
    /// All columns in storage order.
    pub const ALL: [Column; COLUMN_COUNT] = [
        Column::NickName,
        Column::Tags,
        Column::City,
        Column::Gender,
        Column::Married,
        Column::Age,
        Column::Joined,
        Column::Followers,
        Column::Status,
        Column::Posts,
        Column::Intro,
        Column::Source,
        Column::DateTimeScrap,
        Column::LastPost,
        Column::LastPostTime,
        Column::Image,
        Column::ProfileLink,
        Column::PostUrl,
    ];

    /// Position of this column in a row.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Spreadsheet-style header.
    #[must_use]
    pub fn header(self) -> &'static str {
        match self {
            Self::NickName => "NICK NAME",
            Self::Tags => "TAGS",
            Self::City => "CITY",
            Self::Gender => "GENDER",
            Self::Married => "MARRIED",
            Self::Age => "AGE",
            Self::Joined => "JOINED",
            Self::Followers => "FOLLOWERS",
            Self::Status => "STATUS",
            Self::Posts => "POSTS",
            Self::Intro => "INTRO",
            Self::Source => "SOURCE",
            Self::DateTimeScrap => "DATETIME SCRAP",
            Self::LastPost => "LAST POST",
            Self::LastPostTime => "LAST POST TIME",
            Self::Image => "IMAGE",
            Self::ProfileLink => "PROFILE LINK",
            Self::PostUrl => "POST URL",
        }
    }

    /// Column name in the database schema.
    #[must_use]
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::NickName => "nick_name",
            Self::Tags => "tags",
            Self::City => "city",
            Self::Gender => "gender",
            Self::Married => "married",
            Self::Age => "age",
            Self::Joined => "joined",
            Self::Followers => "followers",
            Self::Status => "status",
            Self::Posts => "posts",
            Self::Intro => "intro",
            Self::Source => "source",
            Self::DateTimeScrap => "datetime_scrap",
            Self::LastPost => "last_post",
            Self::LastPostTime => "last_post_time",
            Self::Image => "image",
            Self::ProfileLink => "profile_link",
            Self::PostUrl => "post_url",
        }
    }

    /// Look a column up by its database name.
    #[must_use]
    pub fn from_sql_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.sql_name() == name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())
    }
}

/// Normalize a scraped value.
///
/// Non-breaking spaces become spaces, whitespace runs collapse to one space,
/// and placeholder values the forum shows for missing data become empty.
#[must_use]
pub fn clean_value(raw: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));

    let value = raw.replace('\u{a0}', " ");
    let value = whitespace.replace_all(value.trim(), " ");

    const PLACEHOLDERS: [&str; 9] = [
        "no city",
        "not set",
        "[no posts]",
        "n/a",
        "[no post url]",
        "[error]",
        "no set",
        "none",
        "null",
    ];
    if PLACEHOLDERS.contains(&value.to_lowercase().as_str()) {
        return String::new();
    }
    value.into_owned()
}

/// Structured result of one successful extraction.
///
/// All values are strings, kept in [`Column`] order; absent values are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    values: Vec<String>,
}

impl ProfileRecord {
    /// Create an empty record for a nickname.
    #[must_use]
    pub fn new(nickname: &str) -> Self {
        let mut record = Self {
            values: vec![String::new(); COLUMN_COUNT],
        };
        record.set(Column::NickName, nickname);
        record
    }

    /// Build a record from stored row values.
    ///
    /// Short rows are padded with empty values and extra cells are dropped.
    #[must_use]
    pub fn from_row(row: &[String]) -> Self {
        let mut values: Vec<String> = row
            .iter()
            .take(COLUMN_COUNT)
            .map(|v| v.trim().to_string())
            .collect();
        values.resize(COLUMN_COUNT, String::new());
        Self { values }
    }

    /// Value of a column.
    #[must_use]
    pub fn get(&self, column: Column) -> &str {
        &self.values[column.index()]
    }

    /// Set a column, normalizing the value with [`clean_value`].
    ///
    /// The nickname is only trimmed: it is the record's identity, and a
    /// nickname such as "none" is not a placeholder.
    pub fn set(&mut self, column: Column, value: impl AsRef<str>) {
        let value = value.as_ref();
        self.values[column.index()] = match column {
            Column::NickName => value.trim().to_string(),
            _ => clean_value(value),
        };
    }

    /// The record's nickname.
    #[must_use]
    pub fn nickname(&self) -> &str {
        self.get(Column::NickName)
    }

    /// Lowercased nickname, the key into the existing-records cache.
    #[must_use]
    pub fn lookup_key(&self) -> String {
        self.nickname().to_lowercase()
    }

    /// Parsed account status, if the STATUS column holds a known label.
    #[must_use]
    pub fn account_status(&self) -> Option<AccountStatus> {
        AccountStatus::parse(self.get(Column::Status))
    }

    /// Values in column order.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Consume the record into row values.
    #[must_use]
    pub fn into_row(self) -> Vec<String> {
        self.values
    }
}
