//! Failure classification for downloader error text
//!
//! yt-dlp reports failures as free text, so classification is an ordered table of
//! `(ErrorKind, pattern)` pairs. The first matching row wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::utils::error::TubeloaderError;

/// Classified category of a download failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Restricted,
    Format,
    RateLimit,
    DiskSpace,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Restricted => "restricted",
            ErrorKind::Format => "format",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::DiskSpace => "disk_space",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether a failure of this kind may succeed on another attempt.
    ///
    /// Only content restrictions are permanent. Format errors are often caused by a
    /// stale extractor and disk space is transient, so both are retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Restricted)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = TubeloaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(ErrorKind::Network),
            "restricted" => Ok(ErrorKind::Restricted),
            "format" => Ok(ErrorKind::Format),
            "rate_limit" => Ok(ErrorKind::RateLimit),
            "disk_space" => Ok(ErrorKind::DiskSpace),
            "unknown" => Ok(ErrorKind::Unknown),
            other => Err(TubeloaderError::OperationFailed(format!(
                "unknown error kind '{}'",
                other
            ))),
        }
    }
}

static DEFAULT_RULES: Lazy<Vec<(ErrorKind, Regex)>> = Lazy::new(|| {
    vec![
        (
            ErrorKind::Network,
            Regex::new(
                r"(?i)(timed? ?out|timeout|connection|network|unreachable|reset by peer|name resolution|getaddrinfo|\bssl\b|broken pipe|http error 5\d\d|\b50[234]\b)",
            )
            .unwrap(),
        ),
        (
            ErrorKind::Restricted,
            Regex::new(
                r"(?i)(private video|video unavailable|this video is unavailable|removed|copyright|members[- ]only|join this channel|confirm your age|not available in your country|account .*terminated)",
            )
            .unwrap(),
        ),
        (
            ErrorKind::Format,
            Regex::new(
                r"(?i)(no video formats|requested format is not available|unsupported url|no formats found)",
            )
            .unwrap(),
        ),
        (
            ErrorKind::RateLimit,
            Regex::new(r"(?i)(\b429\b|too many requests|rate[- ]limit|not a bot)").unwrap(),
        ),
        (
            ErrorKind::DiskSpace,
            Regex::new(r"(?i)(no space left|disk full|disk quota exceeded|not enough space)")
                .unwrap(),
        ),
    ]
});

/// Ordered pattern table mapping error text to an [`ErrorKind`]
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<(ErrorKind, Regex)>,
}

impl ErrorClassifier {
    /// Build a classifier from a custom rule table, checked in order
    pub fn new(rules: Vec<(ErrorKind, Regex)>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, error_text: &str) -> ErrorKind {
        first_match(&self.rules, error_text)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.clone())
    }
}

/// Classify with the built-in rule table
pub fn classify_error(error_text: &str) -> ErrorKind {
    first_match(&DEFAULT_RULES, error_text)
}

fn first_match(rules: &[(ErrorKind, Regex)], error_text: &str) -> ErrorKind {
    rules
        .iter()
        .find(|(_, pattern)| pattern.is_match(error_text))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}
