//! Language server session management
//!
//! A session owns one language server process and the LSP client talking
//! to it. Construction performs the whole startup sequence: process spawn,
//! transport wiring, initialize handshake. A session that constructed
//! successfully is ready for requests.
//!
//! State machine: Created -> Initializing -> Ready -> ShuttingDown -> Dead.
//! Transport and process failures are fatal and move the session straight
//! to Dead; per-request timeouts and server errors stay with the caller
//! and leave the session state untouched.

use async_trait::async_trait;
use lsp_types::{
    ApplyWorkspaceEditResponse, CodeActionOrCommand, CompletionItem, Diagnostic,
    DocumentSymbolResponse, FormattingOptions, Hover, Location, Position, PrepareRenameResponse,
    Range, SignatureHelp, SymbolInformation, TextEdit, Uri, WorkspaceEdit,
};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::io::process::{
    ChildProcessManager, ProcessExitEvent, ProcessExitHandler, ProcessManager, StderrMonitor,
    StopMode,
};
use crate::lsp::documents::DocumentStore;
use crate::lsp::{LspClient, LspError};
use crate::server::config::ServerConfig;
use crate::server::error::SessionError;

/// How long stop() waits for the process to exit after SIGTERM
const GRACEFUL_EXIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the process to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// Session State
// ============================================================================

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session object exists, process not yet spawned
    Created,
    /// Process spawned, initialize handshake in flight
    Initializing,
    /// Handshake complete, accepting requests
    Ready,
    /// Orderly shutdown in progress
    ShuttingDown,
    /// Terminal state, by orderly shutdown or fatal failure
    Dead,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::ShuttingDown => "shutting-down",
            SessionState::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// Marks the session dead when the server process exits underneath it
struct ExitWatcher {
    state: Arc<StdMutex<SessionState>>,
}

#[async_trait]
impl ProcessExitHandler for ExitWatcher {
    async fn on_process_exit(&self, event: ProcessExitEvent) {
        // Intentional .unwrap() - poisoned mutex indicates another thread
        // panicked while holding the lock, unrecoverable state
        let mut state = self.state.lock().unwrap();
        match *state {
            SessionState::ShuttingDown | SessionState::Dead => {
                debug!("Server process exited during shutdown: {:?}", event.status);
            }
            _ => {
                warn!(
                    "Server process exited unexpectedly (status: {:?}), session is dead",
                    event.status
                );
            }
        }
        *state = SessionState::Dead;
    }
}

// ============================================================================
// Session
// ============================================================================

/// One running language server and the client connected to it
///
/// All operations take `&self`; sessions are shared behind an `Arc` by the
/// pool and by concurrent callers.
pub struct Session {
    /// Session configuration
    config: ServerConfig,

    /// Process manager for the language server
    process: Mutex<ChildProcessManager>,

    /// LSP client (present and initialized after construction)
    client: Arc<LspClient>,

    /// Open document tracking and diagnostics
    documents: Arc<DocumentStore>,

    /// Shared lifecycle state
    state: Arc<StdMutex<SessionState>>,

    /// Session start timestamp
    started_at: Instant,
}

impl Session {
    /// Start a language server session
    ///
    /// Spawns the process, wires the transport and completes the LSP
    /// initialize handshake. On success the session is in the Ready state.
    pub async fn start(config: ServerConfig) -> Result<Self, SessionError> {
        info!("Starting language server session");
        debug!("Root path: {:?}", config.root_path);
        debug!("Command: {} {:?}", config.command, config.args);

        let state = Arc::new(StdMutex::new(SessionState::Created));
        let root_uri = config.root_uri()?;

        let mut process = ChildProcessManager::new(
            config.command.clone(),
            config.args.clone(),
            Some(config.root_path.clone()),
        );

        if let Some(handler) = build_stderr_handler(&config) {
            process.on_stderr_line(handler);
        }
        process.on_exit(Arc::new(ExitWatcher {
            state: Arc::clone(&state),
        }));

        set_state(&state, SessionState::Initializing);
        process.start().await?;

        let transport = process.create_stdio_transport()?;
        let client = Arc::new(LspClient::new(transport, config.lsp.request_timeout));
        let documents = Arc::new(DocumentStore::new());

        // Diagnostics flow in as notifications at the server's own pace
        let documents_clone = Arc::clone(&documents);
        client
            .rpc()
            .on_notification(move |notification| {
                if notification.method == "textDocument/publishDiagnostics" {
                    if let Some(params) = notification.params {
                        documents_clone.publish_value(params);
                    }
                }
            })
            .await;

        // Progress token creation is accepted; everything else the server
        // asks of us is rejected so it never waits on a reply
        client
            .rpc()
            .on_request(|request| {
                if request.method == "window/workDoneProgress/create" {
                    Ok(serde_json::Value::Null)
                } else {
                    Err(crate::lsp::protocol::JsonRpcErrorObject {
                        code: crate::lsp::protocol::error_codes::METHOD_NOT_FOUND,
                        message: format!("Method not handled by client: {}", request.method),
                        data: None,
                    })
                }
            })
            .await;

        // A dead transport is unrecoverable for this session
        let state_clone = Arc::clone(&state);
        client
            .rpc()
            .on_disconnect(move || {
                let mut state = state_clone.lock().unwrap();
                if *state != SessionState::ShuttingDown && *state != SessionState::Dead {
                    warn!("Transport closed unexpectedly, session is dead");
                }
                *state = SessionState::Dead;
            })
            .await;

        let init_result = client
            .initialize(
                root_uri,
                &config.lsp.client_name,
                &config.lsp.client_version,
                config.lsp.initialization_timeout,
            )
            .await;

        if let Err(e) = init_result {
            warn!("LSP initialization failed: {}", e);
            set_state(&state, SessionState::Dead);
            process.kill_sync();
            return Err(SessionError::Lsp(e));
        }

        set_state(&state, SessionState::Ready);
        info!("Language server session ready");

        Ok(Self {
            config,
            process: Mutex::new(process),
            client,
            documents,
            state,
            started_at: Instant::now(),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Check whether the session accepts requests
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Session uptime
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Session configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The typed LSP client, for operations this facade does not cover
    pub fn client(&self) -> &LspClient {
        &self.client
    }

    /// Open document tracking and diagnostics
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Build a `file://` URI for a path, resolving relative paths against
    /// the session root
    pub fn uri_for(&self, path: &Path) -> Result<Uri, SessionError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.root_path.join(path)
        };
        let raw = format!("file://{}", absolute.to_string_lossy());
        Uri::from_str(&raw).map_err(|e| {
            SessionError::startup_failed(format!("Cannot build URI for {:?}: {}", path, e))
        })
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        let state = self.state();
        if state == SessionState::Ready {
            Ok(())
        } else {
            Err(SessionError::not_ready(state))
        }
    }

    // ========================================================================
    // Document synchronization
    // ========================================================================

    /// Open a document on the server
    pub async fn open_document(
        &self,
        uri: Uri,
        language_id: &str,
        text: String,
    ) -> Result<(), SessionError> {
        self.ensure_ready()?;
        Ok(self.documents.open(&self.client, uri, language_id, text).await?)
    }

    /// Replace an open document's content
    pub async fn change_document(&self, uri: Uri, text: String) -> Result<i32, SessionError> {
        self.ensure_ready()?;
        Ok(self.documents.change(&self.client, uri, text).await?)
    }

    /// Close an open document
    pub async fn close_document(&self, uri: Uri) -> Result<(), SessionError> {
        self.ensure_ready()?;
        Ok(self.documents.close(&self.client, uri).await?)
    }

    /// Latest diagnostics published for a document
    ///
    /// Non-blocking; diagnostics published after this call are not seen.
    pub fn diagnostics(&self, uri: &Uri) -> Vec<Diagnostic> {
        self.documents.diagnostics(uri)
    }

    // ========================================================================
    // Language features
    // ========================================================================

    /// Hover information at a position
    pub async fn hover(&self, uri: Uri, position: Position) -> Result<Option<Hover>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.hover(uri, position).await?)
    }

    /// Definition locations for the symbol at a position
    pub async fn definition(
        &self,
        uri: Uri,
        position: Position,
    ) -> Result<Vec<Location>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.definition(uri, position).await?)
    }

    /// References to the symbol at a position
    pub async fn references(
        &self,
        uri: Uri,
        position: Position,
        include_declaration: bool,
    ) -> Result<Vec<Location>, SessionError> {
        self.ensure_ready()?;
        Ok(self
            .client
            .references(uri, position, include_declaration)
            .await?)
    }

    /// Symbol outline of a document
    pub async fn document_symbols(
        &self,
        uri: Uri,
    ) -> Result<Option<DocumentSymbolResponse>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.document_symbols(uri).await?)
    }

    /// Workspace-wide symbol query
    pub async fn workspace_symbols(
        &self,
        query: &str,
    ) -> Result<Vec<SymbolInformation>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.workspace_symbols(query).await?)
    }

    /// Completions at a position
    pub async fn completion(
        &self,
        uri: Uri,
        position: Position,
    ) -> Result<Vec<CompletionItem>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.completion(uri, position).await?)
    }

    /// Signature help at a position
    pub async fn signature_help(
        &self,
        uri: Uri,
        position: Position,
    ) -> Result<Option<SignatureHelp>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.signature_help(uri, position).await?)
    }

    /// Code actions for a range
    pub async fn code_actions(
        &self,
        uri: Uri,
        range: Range,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<Vec<CodeActionOrCommand>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.code_actions(uri, range, diagnostics).await?)
    }

    /// Whole-document formatting edits
    pub async fn format_document(
        &self,
        uri: Uri,
        options: FormattingOptions,
    ) -> Result<Option<Vec<TextEdit>>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.format_document(uri, options).await?)
    }

    /// Formatting edits for a range
    pub async fn format_range(
        &self,
        uri: Uri,
        range: Range,
        options: FormattingOptions,
    ) -> Result<Option<Vec<TextEdit>>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.format_range(uri, range, options).await?)
    }

    /// Check whether the symbol at a position can be renamed
    pub async fn prepare_rename(
        &self,
        uri: Uri,
        position: Position,
    ) -> Result<Option<PrepareRenameResponse>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.prepare_rename(uri, position).await?)
    }

    /// Workspace edit renaming the symbol at a position
    ///
    /// `Ok(None)` when the server does not support rename.
    pub async fn rename(
        &self,
        uri: Uri,
        position: Position,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.rename(uri, position, new_name).await?)
    }

    /// Ask the server to apply a workspace edit
    pub async fn apply_edit(
        &self,
        edit: WorkspaceEdit,
        label: Option<String>,
    ) -> Result<ApplyWorkspaceEditResponse, SessionError> {
        self.ensure_ready()?;
        Ok(self.client.apply_edit(edit, label).await?)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop the session
    ///
    /// Best effort: LSP shutdown and exit, SIGTERM, then SIGKILL if the
    /// process lingers. Always leaves the session Dead; errors along the
    /// way are logged, not returned.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SessionState::Dead || *state == SessionState::ShuttingDown {
                debug!("Session already {}, nothing to stop", state);
                return;
            }
            *state = SessionState::ShuttingDown;
        }
        info!("Stopping language server session");

        match self.client.shutdown().await {
            Ok(()) => debug!("LSP shutdown handshake completed"),
            Err(LspError::RequestTimeout { .. }) => warn!("LSP shutdown request timed out"),
            Err(e) => warn!("LSP shutdown error: {}", e),
        }

        let pid = {
            let mut process = self.process.lock().await;
            let pid = process.get_state().pid();
            if process.is_running() {
                if let Err(e) = process.stop(StopMode::Graceful).await {
                    warn!("Graceful process stop failed: {}", e);
                }
            }
            pid
        };

        // The exit watcher marks the session Dead once the process is
        // actually reaped; give it a moment before escalating.
        let deadline = Instant::now() + GRACEFUL_EXIT_TIMEOUT;
        while self.state() != SessionState::Dead && Instant::now() < deadline {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        #[cfg(unix)]
        if self.state() != SessionState::Dead {
            if let Some(pid) = pid {
                warn!("Process {} did not exit after SIGTERM, force killing", pid);
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGKILL);
                }
            }
        }
        #[cfg(not(unix))]
        let _ = pid;

        set_state(&self.state, SessionState::Dead);
        info!("Language server session stopped");
    }
}

/// Drop fallback - force cleanup if stop() was not called
impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(mut process) = self.process.try_lock() {
            if process.is_running() {
                eprintln!(
                    "Warning: Session dropped without calling stop() - force killing process"
                );
                process.kill_sync();
            }
        }
    }
}

fn set_state(state: &Arc<StdMutex<SessionState>>, new_state: SessionState) {
    let mut state = state.lock().unwrap();
    debug!("Session state: {} -> {}", state, new_state);
    *state = new_state;
}

/// Combine the stderr log file and the configured handler into one closure
fn build_stderr_handler(config: &ServerConfig) -> Option<impl Fn(String) + Send + Sync + 'static> {
    let log_file = config.stderr_log_path.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(StdMutex::new(file)),
            Err(e) => {
                warn!("Cannot open stderr log {:?}: {}", path, e);
                None
            }
        }
    });
    let user_handler = config.stderr_handler.clone();

    if log_file.is_none() && user_handler.is_none() {
        return None;
    }

    Some(move |line: String| {
        if let Some(file) = &log_file {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let mut file = file.lock().unwrap();
            let _ = writeln!(file, "[{}] {}", timestamp, line);
        }
        if let Some(handler) = &user_handler {
            handler(line);
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
