//! Error types for the PIN authorization flow

use std::time::Duration;

use thiserror::Error;

/// Result type alias for the PIN authorization flow
pub type Result<T> = std::result::Result<T, Error>;

/// PIN authorization errors
#[derive(Error, Debug)]
pub enum Error {
    /// Connection refused, DNS failure or request timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx status or unreadable response body
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed XML or unexpected document shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Polling deadline or attempt limit reached without a grant
    #[error(
        "Timed out waiting for authorization after {attempts} poll attempt(s) ({elapsed:?}){}",
        last_error_suffix(.last_error)
    )]
    Timeout {
        /// Poll requests issued
        attempts: u32,
        /// Wall-clock time spent polling
        elapsed: Duration,
        /// Most recent transient error, if the last ticks failed
        last_error: Option<String>,
    },

    /// The caller cancelled the flow
    #[error("Authorization cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short stable label for reporting
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Transport(_) => "transport",
            Self::Parse(_) => "parse",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::Config(_) => "config",
        }
    }

    /// Whether a poll tick that failed with this error may be retried
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Transport(_) | Self::Parse(_)
        )
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    last_error
        .as_ref()
        .map(|e| format!("; last error: {e}"))
        .unwrap_or_default()
}
