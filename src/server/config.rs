//! Configuration for language server sessions
//!
//! Provides ServerConfig with a builder pattern, validation, and the LSP
//! handshake settings used when a session starts.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use lsp_types::Uri;

use crate::server::error::ConfigError;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default timeout for LSP initialization (30 seconds)
///
/// Language servers often index the workspace before answering the
/// initialize request, so this is deliberately generous.
pub const DEFAULT_INITIALIZATION_TIMEOUT_SECS: u64 = 30;

/// Default timeout for individual LSP requests (5 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Maximum allowed initialization timeout (5 minutes)
pub const MAX_INITIALIZATION_TIMEOUT_SECS: u64 = 300;

// ============================================================================
// Core Configuration Types
// ============================================================================

/// Complete language server session configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Project root, also the working directory of the server process
    pub root_path: PathBuf,

    /// Server executable (name in PATH or absolute path)
    pub command: String,

    /// Command-line arguments for the server
    pub args: Vec<String>,

    /// LSP handshake and request settings
    pub lsp: LspConfig,

    /// File to append the server's stderr output to (optional)
    pub stderr_log_path: Option<PathBuf>,

    /// Optional stderr line handler for process monitoring
    pub stderr_handler: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("root_path", &self.root_path)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("lsp", &self.lsp)
            .field("stderr_log_path", &self.stderr_log_path)
            .field(
                "stderr_handler",
                &self.stderr_handler.as_ref().map(|_| "Fn(String)"),
            )
            .finish()
    }
}

/// LSP client configuration
#[derive(Debug, Clone)]
pub struct LspConfig {
    /// Root URI for LSP initialization (derived from root_path if absent)
    pub root_uri: Option<String>,

    /// Timeout for LSP initialization
    pub initialization_timeout: Duration,

    /// Timeout for individual LSP requests
    pub request_timeout: Duration,

    /// Client name announced during the handshake
    pub client_name: String,

    /// Client version announced during the handshake
    pub client_version: String,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            root_uri: None,
            initialization_timeout: Duration::from_secs(DEFAULT_INITIALIZATION_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create a builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// The root URI used for initialization
    ///
    /// Falls back to a `file://` URI built from the root path.
    pub fn root_uri(&self) -> Result<Uri, ConfigError> {
        let raw = self
            .lsp
            .root_uri
            .clone()
            .unwrap_or_else(|| format!("file://{}", self.root_path.to_string_lossy()));

        Uri::from_str(&raw).map_err(|e| ConfigError::InvalidRootUri {
            uri: raw,
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for ServerConfig with validation and defaults
#[derive(Default)]
pub struct ServerConfigBuilder {
    root_path: Option<PathBuf>,
    command: Option<String>,
    args: Vec<String>,
    root_uri: Option<String>,
    initialization_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    client_name: Option<String>,
    client_version: Option<String>,
    stderr_log_path: Option<PathBuf>,
    stderr_handler: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl ServerConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the project root (required)
    pub fn root_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_path = Some(path.into());
        self
    }

    /// Set the server executable (required)
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Add a command-line argument for the server
    pub fn add_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple command-line arguments for the server
    pub fn add_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|arg| arg.into()));
        self
    }

    /// Override the root URI sent during initialization
    pub fn root_uri(mut self, uri: impl Into<String>) -> Self {
        self.root_uri = Some(uri.into());
        self
    }

    /// Set the LSP initialization timeout
    pub fn initialization_timeout(mut self, timeout: Duration) -> Self {
        self.initialization_timeout = Some(timeout);
        self
    }

    /// Set the per-request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the client name announced during the handshake
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Set the client version announced during the handshake
    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = Some(version.into());
        self
    }

    /// Append the server's stderr output to a log file
    pub fn stderr_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr_log_path = Some(path.into());
        self
    }

    /// Set the stderr line handler for process monitoring
    pub fn stderr_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Arc::new(handler));
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        let root_path = self
            .root_path
            .ok_or_else(|| ConfigError::missing_field("root_path"))?;

        let command = self
            .command
            .ok_or_else(|| ConfigError::missing_field("command"))?;

        let defaults = LspConfig::default();
        let lsp = LspConfig {
            root_uri: self.root_uri,
            initialization_timeout: self
                .initialization_timeout
                .unwrap_or(defaults.initialization_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            client_name: self.client_name.unwrap_or(defaults.client_name),
            client_version: self.client_version.unwrap_or(defaults.client_version),
        };

        Self::validate_root_path(&root_path)?;
        Self::validate_command(&command)?;
        Self::validate_arguments(&self.args)?;
        Self::validate_timeouts(&lsp)?;

        Ok(ServerConfig {
            root_path,
            command,
            args: self.args,
            lsp,
            stderr_log_path: self.stderr_log_path,
            stderr_handler: self.stderr_handler,
        })
    }

    /// Validate the root path exists and is a directory
    fn validate_root_path(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            return Err(ConfigError::RootPathValidation {
                root_path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Root path does not exist",
                ),
            });
        }

        if !path.is_dir() {
            return Err(ConfigError::RootPathValidation {
                root_path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "Root path is not a directory",
                ),
            });
        }

        Ok(())
    }

    /// Validate the server command string
    ///
    /// The executable is not resolved here: it may live in PATH or be
    /// installed between configuration and session start. Spawn failures
    /// carry their own error.
    fn validate_command(command: &str) -> Result<(), ConfigError> {
        if command.is_empty() {
            return Err(ConfigError::invalid_command(
                command,
                "Command cannot be empty",
            ));
        }

        if command.contains('\0') {
            return Err(ConfigError::invalid_command(
                command,
                "Command contains null character",
            ));
        }

        Ok(())
    }

    /// Validate command-line arguments
    fn validate_arguments(args: &[String]) -> Result<(), ConfigError> {
        for arg in args {
            if arg.contains('\0') {
                return Err(ConfigError::invalid_arguments(
                    args.to_vec(),
                    "Arguments cannot contain null characters",
                ));
            }
        }

        Ok(())
    }

    /// Validate timeout values
    fn validate_timeouts(lsp: &LspConfig) -> Result<(), ConfigError> {
        if lsp.initialization_timeout.is_zero() {
            return Err(ConfigError::invalid_timeout(
                lsp.initialization_timeout,
                "Initialization timeout must be greater than zero",
            ));
        }

        if lsp.request_timeout.is_zero() {
            return Err(ConfigError::invalid_timeout(
                lsp.request_timeout,
                "Request timeout must be greater than zero",
            ));
        }

        if lsp.initialization_timeout > Duration::from_secs(MAX_INITIALIZATION_TIMEOUT_SECS) {
            return Err(ConfigError::invalid_timeout(
                lsp.initialization_timeout,
                "Initialization timeout too long (max 5 minutes)",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
