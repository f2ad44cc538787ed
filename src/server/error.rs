//! Error types for language server session management
//!
//! Provides structured error types with context preservation for the
//! different failure scenarios of session startup, operation and shutdown.

use std::path::PathBuf;
use std::time::Duration;

use crate::io::process::ProcessError;
use crate::lsp::LspError;

// ============================================================================
// Session Errors
// ============================================================================

/// Error types for language server session management
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// LSP client errors (initialization, requests)
    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),

    /// Process management errors (spawn, stop, communication)
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document tracking errors
    #[error("Document error: {0}")]
    Document(#[from] crate::lsp::documents::DocumentError),

    /// Operation attempted while the session was not ready
    #[error("Session not ready: current state is {state}")]
    NotReady { state: String },

    /// Session operation timeout
    #[error("Session operation timeout: {operation} took longer than {timeout:?}")]
    OperationTimeout {
        operation: String,
        timeout: Duration,
    },

    /// Session startup failed
    #[error("Session startup failed: {reason}")]
    StartupFailed { reason: String },

    /// Session shutdown failed
    #[error("Session shutdown failed: {reason}")]
    ShutdownFailed { reason: String },
}

impl SessionError {
    /// Create a not-ready error from the observed state
    pub fn not_ready(state: impl std::fmt::Display) -> Self {
        Self::NotReady {
            state: state.to_string(),
        }
    }

    /// Create an operation timeout error
    pub fn operation_timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::OperationTimeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a startup failure error with context
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Create a shutdown failure error with context
    pub fn shutdown_failed(reason: impl Into<String>) -> Self {
        Self::ShutdownFailed {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration validation and building errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Missing required configuration field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// Invalid server command
    #[error("Invalid server command: {command:?} - {reason}")]
    InvalidCommand { command: String, reason: String },

    /// Invalid timeout value
    #[error("Invalid timeout: {timeout:?} - {reason}")]
    InvalidTimeout { timeout: Duration, reason: String },

    /// Invalid server arguments
    #[error("Invalid server arguments: {args:?} - {reason}")]
    InvalidArguments { args: Vec<String>, reason: String },

    /// Root path validation error
    #[error("Root path validation failed: {root_path}")]
    RootPathValidation {
        root_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root URI could not be parsed
    #[error("Invalid root URI: {uri} - {reason}")]
    InvalidRootUri { uri: String, reason: String },
}

impl ConfigError {
    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an invalid command error
    pub fn invalid_command(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid timeout error
    pub fn invalid_timeout(timeout: Duration, reason: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            timeout,
            reason: reason.into(),
        }
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(args: Vec<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            args,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation_helpers() {
        let startup_error = SessionError::startup_failed("server exited during handshake");
        assert!(matches!(startup_error, SessionError::StartupFailed { .. }));

        let config_error = ConfigError::missing_field("root_path");
        assert!(matches!(config_error, ConfigError::MissingField { .. }));
        assert!(config_error.to_string().contains("root_path"));
    }

    #[test]
    fn test_error_conversion() {
        let config_error = ConfigError::missing_field("command");
        let session_error: SessionError = config_error.into();
        assert!(matches!(session_error, SessionError::Config(_)));
    }
}
