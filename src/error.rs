// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the message mirror.
//!
//! Errors are categorized by where they come from (user input, a remote
//! repository, the local SQLite store, configuration) and carry enough
//! context to identify the repository or path involved.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Validation` | No | Empty message, malformed target registration |
//! | `RemoteUnavailable` | Yes | Network error, timeout, rate limit, auth failure |
//! | `RemoteConflict` | Yes | Stale revision token (concurrent external edit) |
//! | `RemoteNotFound` | No | Repository or path does not exist |
//! | `LocalStore` | No | SQLite errors (fatal for the current request) |
//! | `Config` | No | Missing credential, missing/corrupt registry document |
//! | `Io` | No | Filesystem errors around the registry document |
//! | `Serialization` | No | Malformed JSON |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Remote errors are never retried inside a fan-out. A retryable error means
//! a later `push` has a reasonable chance of succeeding for that repository.

use thiserror::Error;

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Errors that can occur while storing, mirroring, or reading messages.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Caller supplied invalid input.
    ///
    /// Surfaced immediately; never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A remote repository could not be reached or refused the request.
    ///
    /// Covers transport failures, timeouts, rate limiting, auth failures
    /// and an open circuit breaker. Isolated per repository during fan-out.
    #[error("Remote unavailable ({repository}): {message}")]
    RemoteUnavailable { repository: String, message: String },

    /// The remote file changed underneath us (stale revision token).
    ///
    /// No automatic merge; the next push fetches a fresh token.
    #[error("Remote conflict ({repository}): stale revision for {path}")]
    RemoteConflict { repository: String, path: String },

    /// The remote repository or path does not exist.
    #[error("Remote not found ({repository}): {path}")]
    RemoteNotFound { repository: String, path: String },

    /// SQLite error in the message store or commit ledger.
    ///
    /// Fatal for the enclosing request.
    #[error("Local store error: {0}")]
    LocalStore(#[from] sqlx::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Create a remote-unavailable error for a repository key.
    pub fn remote(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            repository: repository.into(),
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if a later push could succeed where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteUnavailable { .. } => true,
            Self::RemoteConflict { .. } => true,
            Self::RemoteNotFound { .. } => false,
            Self::Validation(_) => false,
            Self::LocalStore(_) => false,
            Self::Config(_) => false,
            Self::Io(_) => false,
            Self::Serialization(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error came from a remote repository.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable { .. } | Self::RemoteConflict { .. } | Self::RemoteNotFound { .. }
        )
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::RemoteUnavailable { .. } => "remote_unavailable",
            Self::RemoteConflict { .. } => "remote_conflict",
            Self::RemoteNotFound { .. } => "remote_not_found",
            Self::LocalStore(_) => "local_store",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}
