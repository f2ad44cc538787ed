//! Open document tracking and diagnostics storage
//!
//! Keeps a shadow copy of every document the server has been told about,
//! so version numbers and full-text sync stay consistent, and stores the
//! latest published diagnostics per document.
//!
//! Diagnostics arrive asynchronously via `textDocument/publishDiagnostics`
//! after the server finishes analysis. Reading diagnostics right after an
//! open or change can therefore observe an empty or stale set; callers that
//! need settled diagnostics must wait on their own clock.

use crate::lsp::client::{LspClient, LspError};
use lsp_types::{Diagnostic, PublishDiagnosticsParams, Uri};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Shadow state for one open document
#[derive(Debug, Clone)]
struct OpenDocument {
    version: i32,
    text: String,
}

#[derive(Default)]
struct StoreInner {
    documents: HashMap<Uri, OpenDocument>,
    diagnostics: HashMap<Uri, Vec<Diagnostic>>,
}

/// Document store errors
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Document not open: {uri}")]
    NotOpen { uri: String },

    #[error("Document already open: {uri}")]
    AlreadyOpen { uri: String },

    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),
}

/// Tracks open documents and their server-published diagnostics
///
/// The store does not own a client; each synchronizing operation takes the
/// client to notify, mirroring how sessions compose the two.
#[derive(Default)]
pub struct DocumentStore {
    inner: Mutex<StoreInner>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document on the server and start tracking it
    ///
    /// The first version is always 1.
    pub async fn open(
        &self,
        client: &LspClient,
        uri: Uri,
        language_id: &str,
        text: String,
    ) -> Result<(), DocumentError> {
        {
            // Intentional .unwrap() - poisoned mutex indicates another thread
            // panicked while holding the lock, unrecoverable state
            let inner = self.inner.lock().unwrap();
            if inner.documents.contains_key(&uri) {
                return Err(DocumentError::AlreadyOpen {
                    uri: uri.as_str().to_string(),
                });
            }
        }

        client
            .did_open(uri.clone(), language_id, 1, text.clone())
            .await?;

        let mut inner = self.inner.lock().unwrap();
        inner
            .documents
            .insert(uri.clone(), OpenDocument { version: 1, text });
        debug!("Opened document {}", uri.as_str());
        Ok(())
    }

    /// Replace an open document's content, bumping the version
    pub async fn change(
        &self,
        client: &LspClient,
        uri: Uri,
        text: String,
    ) -> Result<i32, DocumentError> {
        let version = {
            let inner = self.inner.lock().unwrap();
            let document = inner.documents.get(&uri).ok_or_else(|| DocumentError::NotOpen {
                uri: uri.as_str().to_string(),
            })?;
            document.version + 1
        };

        client.did_change(uri.clone(), version, text.clone()).await?;

        let mut inner = self.inner.lock().unwrap();
        if let Some(document) = inner.documents.get_mut(&uri) {
            document.version = version;
            document.text = text;
        }
        debug!("Changed document {} to version {}", uri.as_str(), version);
        Ok(version)
    }

    /// Close a document on the server and drop its state
    ///
    /// Stored diagnostics are dropped with the document.
    pub async fn close(&self, client: &LspClient, uri: Uri) -> Result<(), DocumentError> {
        {
            let inner = self.inner.lock().unwrap();
            if !inner.documents.contains_key(&uri) {
                return Err(DocumentError::NotOpen {
                    uri: uri.as_str().to_string(),
                });
            }
        }

        client.did_close(uri.clone()).await?;

        let mut inner = self.inner.lock().unwrap();
        inner.documents.remove(&uri);
        inner.diagnostics.remove(&uri);
        debug!("Closed document {}", uri.as_str());
        Ok(())
    }

    /// Record a `publishDiagnostics` notification, replacing wholesale
    ///
    /// Diagnostics for documents the store never opened are kept too; the
    /// server may analyze files the client did not open explicitly.
    pub fn publish(&self, params: PublishDiagnosticsParams) {
        let mut inner = self.inner.lock().unwrap();
        debug!(
            "Diagnostics for {}: {} items",
            params.uri.as_str(),
            params.diagnostics.len()
        );
        inner.diagnostics.insert(params.uri, params.diagnostics);
    }

    /// Record a raw `publishDiagnostics` payload from the wire
    pub fn publish_value(&self, params: serde_json::Value) {
        match serde_json::from_value::<PublishDiagnosticsParams>(params) {
            Ok(params) => self.publish(params),
            Err(e) => warn!("Malformed publishDiagnostics params: {}", e),
        }
    }

    /// Latest known diagnostics for a document, without blocking
    pub fn diagnostics(&self, uri: &Uri) -> Vec<Diagnostic> {
        self.inner
            .lock()
            .unwrap()
            .diagnostics
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    /// Current shadow text of an open document
    pub fn text(&self, uri: &Uri) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .documents
            .get(uri)
            .map(|document| document.text.clone())
    }

    /// Current version of an open document
    pub fn version(&self, uri: &Uri) -> Option<i32> {
        self.inner
            .lock()
            .unwrap()
            .documents
            .get(uri)
            .map(|document| document.version)
    }

    /// Check whether a document is currently open
    pub fn is_open(&self, uri: &Uri) -> bool {
        self.inner.lock().unwrap().documents.contains_key(uri)
    }

    /// URIs of all currently open documents
    pub fn open_documents(&self) -> Vec<Uri> {
        self.inner.lock().unwrap().documents.keys().cloned().collect()
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
    use lsp_types::Position;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    fn doc_uri() -> Uri {
        Uri::from_str("file:///work/src/main.rs").unwrap()
    }

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
        controller.push_response(encode_frame(
            r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#,
        ));
        init.await.unwrap().unwrap();
        controller.wait_for_sent(2).await;
        (client, controller)
    }

    #[tokio::test]
    async fn test_open_change_close_versions() {
        let (client, controller) = initialized_client().await;
        let store = DocumentStore::new();

        store
            .open(&client, doc_uri(), "rust", "fn main() {}".to_string())
            .await
            .unwrap();
        assert_eq!(store.version(&doc_uri()), Some(1));
        assert_eq!(store.text(&doc_uri()).as_deref(), Some("fn main() {}"));

        let version = store
            .change(&client, doc_uri(), "fn main() { run(); }".to_string())
            .await
            .unwrap();
        assert_eq!(version, 2);

        store.close(&client, doc_uri()).await.unwrap();
        assert!(!store.is_open(&doc_uri()));

        controller.wait_for_sent(5).await;
        let sent = controller.sent_messages();
        assert!(sent[2].contains(r#""method":"textDocument/didOpen""#));
        assert!(sent[2].contains(r#""version":1"#));
        assert!(sent[3].contains(r#""method":"textDocument/didChange""#));
        assert!(sent[3].contains(r#""version":2"#));
        assert!(sent[4].contains(r#""method":"textDocument/didClose""#));
    }

    #[tokio::test]
    async fn test_double_open_rejected() {
        let (client, _controller) = initialized_client().await;
        let store = DocumentStore::new();

        store
            .open(&client, doc_uri(), "rust", String::new())
            .await
            .unwrap();
        let result = store.open(&client, doc_uri(), "rust", String::new()).await;
        assert!(matches!(result, Err(DocumentError::AlreadyOpen { .. })));
    }

    #[tokio::test]
    async fn test_change_unopened_rejected() {
        let (client, _controller) = initialized_client().await;
        let store = DocumentStore::new();

        let result = store.change(&client, doc_uri(), "text".to_string()).await;
        assert!(matches!(result, Err(DocumentError::NotOpen { .. })));
    }

    #[test]
    fn test_diagnostics_replaced_wholesale_and_dropped_on_close() {
        let store = DocumentStore::new();
        let uri = doc_uri();

        let diagnostic = |message: &str| Diagnostic {
            range: lsp_types::Range::new(Position::new(0, 0), Position::new(0, 1)),
            message: message.to_string(),
            ..Default::default()
        };

        store.publish(PublishDiagnosticsParams {
            uri: uri.clone(),
            diagnostics: vec![diagnostic("first"), diagnostic("second")],
            version: None,
        });
        assert_eq!(store.diagnostics(&uri).len(), 2);

        // New publication replaces, never merges
        store.publish(PublishDiagnosticsParams {
            uri: uri.clone(),
            diagnostics: vec![diagnostic("third")],
            version: None,
        });
        let current = store.diagnostics(&uri);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].message, "third");

        // Empty publication clears
        store.publish(PublishDiagnosticsParams {
            uri: uri.clone(),
            diagnostics: vec![],
            version: None,
        });
        assert!(store.diagnostics(&uri).is_empty());
    }

    #[test]
    fn test_publish_value_ignores_malformed_params() {
        let store = DocumentStore::new();
        store.publish_value(serde_json::json!({"not": "diagnostics"}));
        assert!(store.diagnostics(&doc_uri()).is_empty());
    }

    #[test]
    fn test_diagnostics_for_unknown_document_empty() {
        let store = DocumentStore::new();
        assert!(store.diagnostics(&doc_uri()).is_empty());
    }
}
