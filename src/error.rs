//! Typed failures for every stage of the posting pipeline.
//!
//! Per-URL problems ([`Rejection`]) and publishing problems ([`PublishError`])
//! are ordinary values the worker inspects and moves past. Only
//! [`IterationError`] reaches the worker's consecutive-error counter.

use std::path::PathBuf;
use thiserror::Error;

/// Problems found while loading or validating a [`crate::config::BotConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures of the append-only published-URL ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read ledger {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to append to ledger {path:?}: {source}")]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Why a URL did not yield a usable article.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("request failed: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Http(u16),

    #[error("page has no title")]
    EmptyTitle,

    #[error("page has no article text")]
    EmptyBody,

    #[error("only {words} words of article text")]
    TooShort { words: usize },

    #[error("no article links found on source page")]
    NoLinks,

    #[error("cancelled")]
    Cancelled,
}

/// Failure classes reported by the blog platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Expired or revoked credentials; cached credentials must be dropped.
    #[error("authorization rejected: {0}")]
    Auth(String),

    #[error("platform returned HTTP {status}: {message}")]
    Platform { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl PublishError {
    pub fn is_auth(&self) -> bool {
        matches!(self, PublishError::Auth(_))
    }
}

/// Failures talking to the generative-text endpoint.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    Parse(String),
}

/// Token file and OAuth refresh failures, handled by the controller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("token file {path:?} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("token has no refresh token")]
    NoRefreshToken,

    #[error("token refresh failed: {0}")]
    Refresh(String),
}

/// An unclassified fault inside one worker iteration.
#[derive(Debug, Error)]
pub enum IterationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("iteration panicked: {0}")]
    Panic(String),
}
