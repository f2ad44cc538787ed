//! High-level LSP client
//!
//! Provides a typed, high-level API for Language Server Protocol
//! communication using the lsp-types crate for full type safety.
//!
//! Union-shaped results are decoded into one canonical form before they
//! reach callers: definition lookups always yield `Vec<Location>` (links
//! are collapsed onto their selection range) and completions always yield
//! the item list regardless of whether the server sent a bare array.

use crate::io::transport::Transport;
use crate::lsp::protocol::{JsonRpcClient, JsonRpcError};
use lsp_types::{
    ApplyWorkspaceEditParams, ApplyWorkspaceEditResponse, ClientCapabilities, ClientInfo,
    CodeActionContext, CodeActionOrCommand, CodeActionParams, CompletionItem, CompletionParams,
    CompletionResponse, Diagnostic, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DocumentFormattingParams, DocumentRangeFormattingParams,
    DocumentSymbolParams, DocumentSymbolResponse, FormattingOptions, GotoDefinitionParams,
    GotoDefinitionResponse, Hover, HoverParams, InitializeParams, InitializeResult,
    InitializedParams, Location, PartialResultParams, Position, PrepareRenameResponse, Range,
    ReferenceContext, ReferenceParams, RenameParams, SignatureHelp, SignatureHelpParams,
    SymbolInformation, TextDocumentClientCapabilities, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams, TextEdit, Uri,
    VersionedTextDocumentIdentifier, WorkDoneProgressParams, WorkspaceClientCapabilities,
    WorkspaceEdit, WorkspaceFolder, WorkspaceSymbolParams,
};
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// LSP Client Errors
// ============================================================================

/// LSP client errors
#[derive(Debug, thiserror::Error)]
pub enum LspError {
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("LSP client not initialized")]
    NotInitialized,

    #[error("LSP protocol error: {0}")]
    Protocol(String),

    #[error("LSP request timeout: {method}")]
    RequestTimeout { method: String },
}

// ============================================================================
// High-level LSP Client
// ============================================================================

/// High-level LSP client that handles LSP protocol over any transport
///
/// All operations take `&self` so the client can be shared behind an `Arc`
/// by concurrent callers.
pub struct LspClient {
    /// JSON-RPC client for communication
    rpc: JsonRpcClient,

    /// Timeout applied to every request after initialization
    request_timeout: Duration,

    /// Initialization state
    initialized: AtomicBool,

    /// Server capabilities from initialization
    server_capabilities: Mutex<Option<lsp_types::ServerCapabilities>>,
}

impl LspClient {
    /// Create a new LSP client over a transport
    pub fn new<T: Transport + 'static>(transport: T, request_timeout: Duration) -> Self {
        Self {
            rpc: JsonRpcClient::new(transport),
            request_timeout,
            initialized: AtomicBool::new(false),
            server_capabilities: Mutex::new(None),
        }
    }

    /// Access the underlying JSON-RPC client for handler registration
    pub fn rpc(&self) -> &JsonRpcClient {
        &self.rpc
    }

    /// Check if the client completed the initialize handshake
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Check if the connection is active
    pub fn is_connected(&self) -> bool {
        self.rpc.is_connected()
    }

    /// Get a copy of the server capabilities announced at initialization
    pub fn server_capabilities(&self) -> Option<lsp_types::ServerCapabilities> {
        // Intentional .unwrap() - poisoned mutex indicates another thread
        // panicked while holding the lock, unrecoverable state
        self.server_capabilities.lock().unwrap().clone()
    }

    fn ensure_initialized(&self) -> Result<(), LspError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(LspError::NotInitialized)
        }
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, LspError>
    where
        P: serde::Serialize,
        R: for<'de> serde::Deserialize<'de>,
    {
        self.ensure_initialized()?;
        self.raw_request(method, params, self.request_timeout).await
    }

    async fn raw_request<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        timeout: Duration,
    ) -> Result<R, LspError>
    where
        P: serde::Serialize,
        R: for<'de> serde::Deserialize<'de>,
    {
        match self.rpc.request_with_timeout(method, params, timeout).await {
            Ok(result) => Ok(result),
            Err(JsonRpcError::Timeout(_)) => Err(LspError::RequestTimeout {
                method: method.to_string(),
            }),
            Err(e) => Err(LspError::JsonRpc(e)),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initialize the LSP connection
    ///
    /// Sends the `initialize` request followed by the `initialized`
    /// notification. Must complete before any other operation.
    pub async fn initialize(
        &self,
        root_uri: Uri,
        client_name: &str,
        client_version: &str,
        timeout: Duration,
    ) -> Result<InitializeResult, LspError> {
        if self.is_initialized() {
            return Err(LspError::Protocol("Client already initialized".to_string()));
        }

        info!("Initializing LSP client");

        let root_name = root_uri
            .path()
            .as_str()
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("workspace")
            .to_string();

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_uri.clone()),
            capabilities: client_capabilities(),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_uri,
                name: root_name,
            }]),
            client_info: Some(ClientInfo {
                name: client_name.to_string(),
                version: Some(client_version.to_string()),
            }),
            ..Default::default()
        };

        let result: InitializeResult = self.raw_request("initialize", Some(params), timeout).await?;

        debug!("LSP server capabilities: {:?}", result.capabilities);
        *self.server_capabilities.lock().unwrap() = Some(result.capabilities.clone());

        self.rpc
            .notify("initialized", Some(InitializedParams {}))
            .await?;

        self.initialized.store(true, Ordering::SeqCst);
        info!("LSP client initialized successfully");

        Ok(result)
    }

    /// Shutdown the LSP connection
    ///
    /// Sends the `shutdown` request followed by the `exit` notification.
    pub async fn shutdown(&self) -> Result<(), LspError> {
        if !self.is_initialized() {
            return Ok(());
        }

        info!("Shutting down LSP client");

        let _: () = self.request("shutdown", None::<Value>).await?;
        self.rpc.notify("exit", None::<Value>).await?;

        self.initialized.store(false, Ordering::SeqCst);
        info!("LSP client shutdown complete");

        Ok(())
    }

    // ========================================================================
    // Document synchronization notifications
    // ========================================================================

    /// Notify the server that a document was opened
    pub async fn did_open(
        &self,
        uri: Uri,
        language_id: &str,
        version: i32,
        text: String,
    ) -> Result<(), LspError> {
        self.ensure_initialized()?;
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri,
                language_id: language_id.to_string(),
                version,
                text,
            },
        };
        self.rpc.notify("textDocument/didOpen", Some(params)).await?;
        Ok(())
    }

    /// Notify the server of a full-text document change
    pub async fn did_change(&self, uri: Uri, version: i32, text: String) -> Result<(), LspError> {
        self.ensure_initialized()?;
        let params = DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier { uri, version },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text,
            }],
        };
        self.rpc
            .notify("textDocument/didChange", Some(params))
            .await?;
        Ok(())
    }

    /// Notify the server that a document was closed
    pub async fn did_close(&self, uri: Uri) -> Result<(), LspError> {
        self.ensure_initialized()?;
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
        };
        self.rpc
            .notify("textDocument/didClose", Some(params))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Language features
    // ========================================================================

    /// Request hover information at a position
    pub async fn hover(&self, uri: Uri, position: Position) -> Result<Option<Hover>, LspError> {
        let params = HoverParams {
            text_document_position_params: text_document_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        self.request("textDocument/hover", Some(params)).await
    }

    /// Request the definition locations for the symbol at a position
    ///
    /// The three wire shapes (single location, location array, location
    /// links) are all decoded to a flat `Vec<Location>`.
    pub async fn definition(&self, uri: Uri, position: Position) -> Result<Vec<Location>, LspError> {
        let params = GotoDefinitionParams {
            text_document_position_params: text_document_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let response: Option<GotoDefinitionResponse> =
            self.request("textDocument/definition", Some(params)).await?;
        Ok(response.map(locations_from_definition).unwrap_or_default())
    }

    /// Request all references to the symbol at a position
    pub async fn references(
        &self,
        uri: Uri,
        position: Position,
        include_declaration: bool,
    ) -> Result<Vec<Location>, LspError> {
        let params = ReferenceParams {
            text_document_position: text_document_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: ReferenceContext {
                include_declaration,
            },
        };
        let response: Option<Vec<Location>> =
            self.request("textDocument/references", Some(params)).await?;
        Ok(response.unwrap_or_default())
    }

    /// Request the symbol outline of a document
    pub async fn document_symbols(
        &self,
        uri: Uri,
    ) -> Result<Option<DocumentSymbolResponse>, LspError> {
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        self.request("textDocument/documentSymbol", Some(params))
            .await
    }

    /// Query symbols across the whole workspace
    pub async fn workspace_symbols(
        &self,
        query: &str,
    ) -> Result<Vec<SymbolInformation>, LspError> {
        let params = WorkspaceSymbolParams {
            query: query.to_string(),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let response: Option<Vec<SymbolInformation>> =
            self.request("workspace/symbol", Some(params)).await?;
        Ok(response.unwrap_or_default())
    }

    /// Request completions at a position, flattened to the item list
    pub async fn completion(
        &self,
        uri: Uri,
        position: Position,
    ) -> Result<Vec<CompletionItem>, LspError> {
        let params = CompletionParams {
            text_document_position: text_document_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: None,
        };
        let response: Option<CompletionResponse> =
            self.request("textDocument/completion", Some(params)).await?;
        Ok(match response {
            Some(CompletionResponse::Array(items)) => items,
            Some(CompletionResponse::List(list)) => list.items,
            None => Vec::new(),
        })
    }

    /// Request signature help at a position
    pub async fn signature_help(
        &self,
        uri: Uri,
        position: Position,
    ) -> Result<Option<SignatureHelp>, LspError> {
        let params = SignatureHelpParams {
            context: None,
            text_document_position_params: text_document_position(uri, position),
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        self.request("textDocument/signatureHelp", Some(params))
            .await
    }

    /// Request code actions for a range
    pub async fn code_actions(
        &self,
        uri: Uri,
        range: Range,
        diagnostics: Vec<Diagnostic>,
    ) -> Result<Vec<CodeActionOrCommand>, LspError> {
        let params = CodeActionParams {
            text_document: TextDocumentIdentifier { uri },
            range,
            context: CodeActionContext {
                diagnostics,
                only: None,
                trigger_kind: None,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let response: Option<Vec<CodeActionOrCommand>> =
            self.request("textDocument/codeAction", Some(params)).await?;
        Ok(response.unwrap_or_default())
    }

    /// Request whole-document formatting edits
    pub async fn format_document(
        &self,
        uri: Uri,
        options: FormattingOptions,
    ) -> Result<Option<Vec<TextEdit>>, LspError> {
        let params = DocumentFormattingParams {
            text_document: TextDocumentIdentifier { uri },
            options,
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        self.request("textDocument/formatting", Some(params)).await
    }

    /// Request formatting edits for a range
    pub async fn format_range(
        &self,
        uri: Uri,
        range: Range,
        options: FormattingOptions,
    ) -> Result<Option<Vec<TextEdit>>, LspError> {
        let params = DocumentRangeFormattingParams {
            text_document: TextDocumentIdentifier { uri },
            range,
            options,
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        self.request("textDocument/rangeFormatting", Some(params))
            .await
    }

    /// Check whether the symbol at a position can be renamed
    ///
    /// Servers without rename support reject the method; that is reported
    /// as `Ok(None)` rather than an error.
    pub async fn prepare_rename(
        &self,
        uri: Uri,
        position: Position,
    ) -> Result<Option<PrepareRenameResponse>, LspError> {
        let params = text_document_position(uri, position);
        let result: Result<Option<PrepareRenameResponse>, LspError> =
            self.request("textDocument/prepareRename", Some(params)).await;
        soften_method_not_found(result)
    }

    /// Compute the workspace edit for renaming the symbol at a position
    ///
    /// Servers without rename support reject the method; that is reported
    /// as `Ok(None)` rather than an error. Any other server error is
    /// propagated.
    pub async fn rename(
        &self,
        uri: Uri,
        position: Position,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>, LspError> {
        let params = RenameParams {
            text_document_position: text_document_position(uri, position),
            new_name: new_name.to_string(),
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        let result: Result<Option<WorkspaceEdit>, LspError> =
            self.request("textDocument/rename", Some(params)).await;
        soften_method_not_found(result)
    }

    /// Ask the server to apply a workspace edit on the client's behalf
    pub async fn apply_edit(
        &self,
        edit: WorkspaceEdit,
        label: Option<String>,
    ) -> Result<ApplyWorkspaceEditResponse, LspError> {
        let params = ApplyWorkspaceEditParams { label, edit };
        self.request("workspace/applyEdit", Some(params)).await
    }
}

fn text_document_position(uri: Uri, position: Position) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri },
        position,
    }
}

/// Map a method-not-found rejection to an absent result
fn soften_method_not_found<R>(
    result: Result<Option<R>, LspError>,
) -> Result<Option<R>, LspError> {
    match result {
        Err(LspError::JsonRpc(e)) if e.is_method_not_found() => Ok(None),
        other => other,
    }
}

/// Collapse the three definition response shapes into a location list
///
/// Location links point at both the full target range and the selection
/// range of the defining identifier; the selection range is what callers
/// want to jump to.
fn locations_from_definition(response: GotoDefinitionResponse) -> Vec<Location> {
    match response {
        GotoDefinitionResponse::Scalar(location) => vec![location],
        GotoDefinitionResponse::Array(locations) => locations,
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .map(|link| Location {
                uri: link.target_uri,
                range: link.target_selection_range,
            })
            .collect(),
    }
}

/// Capabilities announced to the server during initialization
fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        workspace: Some(WorkspaceClientCapabilities {
            workspace_folders: Some(true),
            apply_edit: Some(true),
            ..Default::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            hover: Some(lsp_types::HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![
                    lsp_types::MarkupKind::Markdown,
                    lsp_types::MarkupKind::PlainText,
                ]),
            }),
            definition: Some(lsp_types::GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(true),
            }),
            references: Some(lsp_types::ReferenceClientCapabilities {
                dynamic_registration: Some(false),
            }),
            document_symbol: Some(lsp_types::DocumentSymbolClientCapabilities {
                dynamic_registration: Some(false),
                symbol_kind: None,
                hierarchical_document_symbol_support: Some(true),
                tag_support: None,
            }),
            completion: Some(lsp_types::CompletionClientCapabilities {
                completion_item: Some(lsp_types::CompletionItemCapability {
                    snippet_support: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transport::{MockTransport, MockTransportController};
    use crate::lsp::framing::encode_frame;
    use std::str::FromStr;
    use std::sync::Arc;

    fn test_uri() -> Uri {
        Uri::from_str("file:///work/src/main.rs").unwrap()
    }

    fn response(id: u64, result: Value) -> Vec<u8> {
        encode_frame(
            &serde_json::to_string(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result,
            }))
            .unwrap(),
        )
    }

    /// Spawns a client and drives the initialize handshake against the mock
    async fn initialized_client() -> (Arc<LspClient>, MockTransportController) {
        let transport = MockTransport::new();
        let controller = transport.controller();
        let client = Arc::new(LspClient::new(transport, Duration::from_secs(5)));

        let init = tokio::spawn({
            let client = Arc::clone(&client);
            async move {
                client
                    .initialize(
                        Uri::from_str("file:///work").unwrap(),
                        "test-client",
                        "0.0.0",
                        Duration::from_secs(5),
                    )
                    .await
            }
        });

        controller.wait_for_sent(1).await;
        controller.push_response(response(1, serde_json::json!({"capabilities": {}})));
        init.await.unwrap().unwrap();

        // initialize request + initialized notification
        controller.wait_for_sent(2).await;
        (client, controller)
    }

    #[tokio::test]
    async fn test_operations_require_initialization() {
        let transport = MockTransport::new();
        let client = LspClient::new(transport, Duration::from_secs(5));

        let result = client.hover(test_uri(), Position::new(0, 0)).await;
        assert!(matches!(result, Err(LspError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let (client, controller) = initialized_client().await;

        assert!(client.is_initialized());
        assert!(client.server_capabilities().is_some());

        let sent = controller.sent_messages();
        assert!(sent[0].contains(r#""method":"initialize""#));
        assert!(sent[0].contains(r#""rootUri":"file:///work""#));
        assert!(sent[1].contains(r#""method":"initialized""#));
    }

    #[tokio::test]
    async fn test_hover_null_result() {
        let (client, controller) = initialized_client().await;

        let request = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.hover(test_uri(), Position::new(3, 7)).await }
        });
        controller.wait_for_sent(3).await;
        controller.push_response(response(2, Value::Null));

        assert_eq!(request.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_definition_link_normalization() {
        let (client, controller) = initialized_client().await;

        let request = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.definition(test_uri(), Position::new(1, 4)).await }
        });
        controller.wait_for_sent(3).await;

        // Server replies with location links
        controller.push_response(response(
            2,
            serde_json::json!([{
                "targetUri": "file:///work/src/lib.rs",
                "targetRange": {
                    "start": {"line": 10, "character": 0},
                    "end": {"line": 20, "character": 1},
                },
                "targetSelectionRange": {
                    "start": {"line": 10, "character": 7},
                    "end": {"line": 10, "character": 12},
                },
            }]),
        ));

        let locations = request.await.unwrap().unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri.as_str(), "file:///work/src/lib.rs");
        assert_eq!(locations[0].range.start, Position::new(10, 7));
        assert_eq!(locations[0].range.end, Position::new(10, 12));
    }

    #[tokio::test]
    async fn test_definition_scalar_normalization() {
        let (client, controller) = initialized_client().await;

        let request = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.definition(test_uri(), Position::new(1, 4)).await }
        });
        controller.wait_for_sent(3).await;

        controller.push_response(response(
            2,
            serde_json::json!({
                "uri": "file:///work/src/lib.rs",
                "range": {
                    "start": {"line": 5, "character": 0},
                    "end": {"line": 5, "character": 3},
                },
            }),
        ));

        let locations = request.await.unwrap().unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].range.start, Position::new(5, 0));
    }

    #[tokio::test]
    async fn test_completion_list_flattening() {
        let (client, controller) = initialized_client().await;

        let request = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.completion(test_uri(), Position::new(2, 8)).await }
        });
        controller.wait_for_sent(3).await;

        controller.push_response(response(
            2,
            serde_json::json!({
                "isIncomplete": true,
                "items": [{"label": "push"}, {"label": "pop"}],
            }),
        ));

        let items = request.await.unwrap().unwrap();
        let labels: Vec<_> = items.iter().map(|item| item.label.as_str()).collect();
        assert_eq!(labels, ["push", "pop"]);
    }

    #[tokio::test]
    async fn test_rename_soft_fails_on_method_not_found() {
        let (client, controller) = initialized_client().await;

        let request = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.rename(test_uri(), Position::new(4, 2), "renamed").await }
        });
        controller.wait_for_sent(3).await;

        controller.push_response(encode_frame(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"unhandled method"}}"#,
        ));

        assert!(request.await.unwrap().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rename_propagates_other_server_errors() {
        let (client, controller) = initialized_client().await;

        let request = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.rename(test_uri(), Position::new(4, 2), "renamed").await }
        });
        controller.wait_for_sent(3).await;

        controller.push_response(encode_frame(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32602,"message":"not a renameable symbol"}}"#,
        ));

        let error = request.await.unwrap().unwrap_err();
        assert!(matches!(
            error,
            LspError::JsonRpc(JsonRpcError::Server { code: -32602, .. })
        ));
    }

    #[tokio::test]
    async fn test_references_null_becomes_empty() {
        let (client, controller) = initialized_client().await;

        let request = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.references(test_uri(), Position::new(0, 0), true).await }
        });
        controller.wait_for_sent(3).await;
        controller.push_response(response(2, Value::Null));

        assert!(request.await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_sends_request_then_exit() {
        let (client, controller) = initialized_client().await;

        let request = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.shutdown().await }
        });
        controller.wait_for_sent(3).await;
        controller.push_response(response(2, Value::Null));
        request.await.unwrap().unwrap();

        controller.wait_for_sent(4).await;
        let sent = controller.sent_messages();
        assert!(sent[2].contains(r#""method":"shutdown""#));
        assert!(sent[3].contains(r#""method":"exit""#));
        assert!(!client.is_initialized());
    }
}
