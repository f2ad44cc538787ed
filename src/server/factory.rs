//! Session creation seam
//!
//! The pool creates sessions through the [`SessionFactory`] trait so tests
//! can substitute lightweight fakes for real server processes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::server::config::ServerConfigBuilder;
use crate::server::error::SessionError;
use crate::server::session::{Session, SessionState};

/// A session as the pool sees it: liveness plus teardown
#[async_trait]
pub trait PooledSession: Send + Sync + 'static {
    /// Whether the session can still serve requests
    fn is_alive(&self) -> bool;

    /// Best-effort teardown
    async fn stop(&self);
}

/// Creates a session for a project root
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: PooledSession;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create and fully initialize a session rooted at `root`
    async fn create(&self, root: &Path) -> Result<Self::Session, Self::Error>;
}

#[async_trait]
impl PooledSession for Session {
    fn is_alive(&self) -> bool {
        self.state() == SessionState::Ready && self.client().is_connected()
    }

    async fn stop(&self) {
        Session::stop(self).await;
    }
}

// ============================================================================
// Stdio Factory
// ============================================================================

/// Factory spawning one stdio language server per project root
#[derive(Debug, Clone)]
pub struct StdioSessionFactory {
    command: String,
    args: Vec<String>,
    initialization_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    stderr_log_dir: Option<PathBuf>,
}

impl StdioSessionFactory {
    /// Create a factory for the given server executable
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            initialization_timeout: None,
            request_timeout: None,
            stderr_log_dir: None,
        }
    }

    /// Add command-line arguments passed to every spawned server
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|arg| arg.into()));
        self
    }

    /// Override the initialization timeout for spawned sessions
    pub fn initialization_timeout(mut self, timeout: Duration) -> Self {
        self.initialization_timeout = Some(timeout);
        self
    }

    /// Override the per-request timeout for spawned sessions
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Write each server's stderr to `<dir>/<root-name>-stderr.log`
    pub fn stderr_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stderr_log_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl SessionFactory for StdioSessionFactory {
    type Session = Session;
    type Error = SessionError;

    async fn create(&self, root: &Path) -> Result<Session, SessionError> {
        let mut builder = ServerConfigBuilder::new()
            .root_path(root)
            .command(&self.command)
            .add_args(self.args.iter().cloned());

        if let Some(timeout) = self.initialization_timeout {
            builder = builder.initialization_timeout(timeout);
        }
        if let Some(timeout) = self.request_timeout {
            builder = builder.request_timeout(timeout);
        }
        if let Some(dir) = &self.stderr_log_dir {
            let root_name = root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "workspace".to_string());
            builder = builder.stderr_log(dir.join(format!("{root_name}-stderr.log")));
        }

        Session::start(builder.build()?).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_stdio_factory_propagates_spawn_failure() {
        let temp_dir = tempdir().unwrap();
        let factory = StdioSessionFactory::new("definitely-not-a-language-server");

        let result = factory.create(temp_dir.path()).await;
        assert!(matches!(result, Err(SessionError::Process(_))));
    }

    #[tokio::test]
    async fn test_stdio_factory_rejects_missing_root() {
        let factory = StdioSessionFactory::new("rust-analyzer");
        let result = factory.create(Path::new("/does/not/exist")).await;
        assert!(matches!(result, Err(SessionError::Config(_))));
    }

    #[test]
    fn test_stderr_log_path_uses_root_name() {
        let factory = StdioSessionFactory::new("rust-analyzer").stderr_log_dir("/var/log/lsp");
        assert_eq!(factory.stderr_log_dir.as_deref(), Some(Path::new("/var/log/lsp")));
    }
}
