//! Error types for `quickdraw`
//!
//! One enum per domain plus a top-level error that maps onto process exit
//! codes. Duel timeouts and stale signals are not errors and never appear
//! here; they are ordinary resolution branches of a session.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `quickdraw` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Chat gateway error (send or restriction failed)
    pub const CHAT_ERROR: i32 = 4;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `quickdraw` operations.
#[derive(Debug, Error)]
pub enum QuickdrawError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Chat gateway error
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Duel session fault
    #[error(transparent)]
    Duel(#[from] DuelError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl QuickdrawError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Chat(_) => ExitCode::CHAT_ERROR,
            Self::Duel(_) => ExitCode::ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

// ============================================================================
// Chat Gateway Errors
// ============================================================================

/// Failures reported by a [`ChatGateway`](crate::chat::ChatGateway).
#[derive(Debug, Error)]
pub enum ChatError {
    /// Sending an announcement to the chat failed
    #[error("failed to send message to chat {chat}: {reason}")]
    SendFailed {
        /// Chat context the message was addressed to
        chat: i64,
        /// Transport-provided reason
        reason: String,
    },

    /// Applying a restriction failed
    #[error("failed to restrict user {user} in chat {chat}: {reason}")]
    RestrictFailed {
        /// Chat context
        chat: i64,
        /// User that should have been restricted
        user: i64,
        /// Transport-provided reason
        reason: String,
    },

    /// The gateway has been shut down
    #[error("gateway closed")]
    Closed,

    /// I/O error in the underlying transport
    #[error("gateway I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Duel Errors
// ============================================================================

/// Unexpected faults inside a duel session's lifecycle.
///
/// These never reach callers of `accept`/`act`; the session logs them and
/// finishes with [`DuelOutcome::Faulted`](crate::duel::DuelOutcome::Faulted).
#[derive(Debug, Error)]
pub enum DuelError {
    /// A collaborator call failed
    #[error("chat collaborator failed: {0}")]
    Chat(#[from] ChatError),

    /// The lifecycle panicked
    #[error("session lifecycle panicked: {0}")]
    Panicked(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `quickdraw` operations.
pub type Result<T> = std::result::Result<T, QuickdrawError>;

// ============================================================================
// Tests
// ============================================================================
