//! Error types for the MergeWatch core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Delegate(#[from] DelegateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from running `git` against the working copy.
///
/// A command that runs and exits non-zero is *not* an error at this level;
/// its exit code and output are returned to the caller for inspection.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary could not be found.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// The working copy path does not exist or is not a git repository.
    #[error("git working copy not found at '{0}'")]
    WorkingCopyNotFound(String),

    /// A `git2` library error while inspecting repository state.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper (spawn failures and the like).
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Change source errors
// ---------------------------------------------------------------------------

/// Errors from listing open changes on the hosting platform.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    /// JSON deserialization failure.
    #[error("GitHub response parse error: {0}")]
    ParseError(String),
}

// ---------------------------------------------------------------------------
// Delegate errors
// ---------------------------------------------------------------------------

/// Errors from invoking the external conflict-resolution agent.
///
/// These never decide the resolution verdict on their own; the worker only
/// looks at repository state after the agent returns.
#[derive(Debug, Error)]
pub enum DelegateError {
    /// The agent binary could not be found.
    #[error("agent binary not found: {0}")]
    BinaryNotFound(String),

    /// The agent could not be spawned or awaited.
    #[error("agent I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Worker pool errors
// ---------------------------------------------------------------------------

/// Errors from submitting work to the [`crate::pool::WorkerPool`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been shut down and no longer accepts work.
    #[error("worker pool is closed; PR #{0} was not queued")]
    Closed(u64),
}
