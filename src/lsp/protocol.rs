//! JSON-RPC 2.0 protocol layer
//!
//! Implements JSON-RPC 2.0 request/response correlation over a framed
//! transport, notification dispatch, and server-to-client request handling.
//!
//! Inbound messages are classified structurally: a `method` field plus a
//! non-null `id` is a server-to-client request, a `method` without an `id`
//! is a notification, and an `id` without a `method` is a response. Parsing
//! into typed structs first would misclassify server requests, because every
//! response field is optional.

use crate::log_lsp_message;
use crate::lsp::framing::LspFraming;
use crate::io::transport::Transport;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{Level, debug, error, trace, warn};

/// Default timeout applied by [`JsonRpcClient::request`]
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// JSON-RPC Types
// ============================================================================

/// JSON-RPC 2.0 request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier
    pub id: Value,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request identifier (matches the request)
    pub id: Value,

    /// Result (present if successful)
    ///
    /// A JSON `null` result (shutdown, empty hover) must stay
    /// distinguishable from an absent `result` field, so present-but-null
    /// deserializes to `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,

    /// Error (present if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

/// JSON-RPC 2.0 notification message (no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Method name
    pub method: String,

    /// Optional parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Keeps a field that is present in the JSON, even as `null`, as `Some`
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Error code
    pub code: i32,

    /// Error message
    pub message: String,

    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// JSON-RPC Errors
// ============================================================================

/// JSON-RPC error codes as defined in the specification
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// JSON-RPC client error type
#[derive(Debug, thiserror::Error)]
pub enum JsonRpcError {
    #[error("JSON-RPC server error ({code}): {message}")]
    Server {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection closed")]
    ChannelClosed,

    #[error("Request was cancelled before a response arrived")]
    RequestCancelled,

    #[error("Serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),

    #[error("Missing result in response")]
    MissingResult,
}

impl JsonRpcError {
    /// Check whether this is a server error with the given code
    pub fn is_server_error(&self, expected_code: i32) -> bool {
        matches!(self, JsonRpcError::Server { code, .. } if *code == expected_code)
    }

    /// Check whether the server rejected the method as unknown
    pub fn is_method_not_found(&self) -> bool {
        self.is_server_error(error_codes::METHOD_NOT_FOUND)
    }
}

// ============================================================================
// JSON-RPC Client
// ============================================================================

/// Type alias for notification handler to reduce complexity
pub type NotificationHandler = Arc<dyn Fn(JsonRpcNotification) + Send + Sync>;

/// Handler for server-to-client requests; returns a result or an error object
pub type RequestHandler =
    Arc<dyn Fn(&JsonRpcRequest) -> Result<Value, JsonRpcErrorObject> + Send + Sync>;

/// Handler invoked once when the connection goes down
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Handlers {
    notification: Mutex<Option<NotificationHandler>>,
    request: Mutex<Option<RequestHandler>>,
    disconnect: Mutex<Option<DisconnectHandler>>,
}

type PendingRequests = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// JSON-RPC client with request/response correlation
///
/// All methods take `&self`; the client is designed to be shared behind an
/// `Arc` by several callers issuing concurrent requests.
pub struct JsonRpcClient {
    /// Channel for sending outbound messages (requests and notifications)
    outbound_sender: mpsc::UnboundedSender<String>,

    /// Request ID counter, starts at 1
    request_id: AtomicU64,

    /// Pending requests waiting for responses
    pending_requests: PendingRequests,

    /// Handlers shared with the transport task
    handlers: Arc<Handlers>,

    /// Cleared by the transport task when the connection ends
    connected: Arc<AtomicBool>,
}

impl JsonRpcClient {
    /// Create a new JSON-RPC client, spawning the transport handler task
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        let framed_transport = Arc::new(Mutex::new(LspFraming::new(transport)));
        let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
        let pending_requests: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let handlers = Arc::new(Handlers::default());
        let connected = Arc::new(AtomicBool::new(true));

        // Transport handler task for bidirectional communication
        let transport_clone = Arc::clone(&framed_transport);
        let pending_clone = Arc::clone(&pending_requests);
        let handlers_clone = Arc::clone(&handlers);
        let connected_clone = Arc::clone(&connected);
        let reply_sender = outbound_sender.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    // Outbound messages (prioritized)
                    outbound = outbound_receiver.recv() => {
                        match outbound {
                            Some(message) => {
                                let mut transport = transport_clone.lock().await;
                                if let Err(e) = transport.send(&message).await {
                                    error!("Failed to send message: {}", e);
                                    break;
                                }
                            }
                            // Client dropped, nothing left to send
                            None => break,
                        }
                    }
                    // Inbound messages
                    result = async {
                        let mut transport = transport_clone.lock().await;
                        transport.receive().await
                    } => {
                        match result {
                            Ok(message) => {
                                Self::process_inbound_message(
                                    message,
                                    &pending_clone,
                                    &handlers_clone,
                                    &reply_sender,
                                )
                                .await;
                            }
                            Err(e) => {
                                error!("Failed to receive message: {}", e);
                                break;
                            }
                        }
                    }
                }
            }

            connected_clone.store(false, Ordering::SeqCst);
            Self::fail_pending(&pending_clone).await;
            if let Some(handler) = handlers_clone.disconnect.lock().await.clone() {
                handler();
            }
            trace!("Transport handler task finished");
        });

        Self {
            outbound_sender,
            request_id: AtomicU64::new(1),
            pending_requests,
            handlers,
            connected,
        }
    }

    /// Set the handler for server notifications
    pub async fn on_notification<F>(&self, handler: F)
    where
        F: Fn(JsonRpcNotification) + Send + Sync + 'static,
    {
        *self.handlers.notification.lock().await = Some(Arc::new(handler));
    }

    /// Set the handler for server-to-client requests
    ///
    /// Without a handler, every server request is answered with a
    /// method-not-found error so the server is never left waiting.
    pub async fn on_request<F>(&self, handler: F)
    where
        F: Fn(&JsonRpcRequest) -> Result<Value, JsonRpcErrorObject> + Send + Sync + 'static,
    {
        *self.handlers.request.lock().await = Some(Arc::new(handler));
    }

    /// Set the handler invoked when the connection goes down
    pub async fn on_disconnect<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.handlers.disconnect.lock().await = Some(Arc::new(handler));
    }

    /// Route one inbound message to the pending map or a handler
    async fn process_inbound_message(
        message: String,
        pending_requests: &PendingRequests,
        handlers: &Arc<Handlers>,
        reply_sender: &mpsc::UnboundedSender<String>,
    ) {
        let value: Value = match serde_json::from_str(&message) {
            Ok(value) => value,
            Err(e) => {
                warn!("Received unparseable message ({}): {}", e, message);
                return;
            }
        };

        let has_id = value.get("id").is_some_and(|id| !id.is_null());
        let has_method = value.get("method").is_some();

        match (has_method, has_id) {
            // Server-to-client request
            (true, true) => match serde_json::from_value::<JsonRpcRequest>(value) {
                Ok(request) => {
                    Self::handle_server_request(request, handlers, reply_sender).await;
                }
                Err(e) => warn!("Malformed server request: {}", e),
            },
            // Notification
            (true, false) => match serde_json::from_value::<JsonRpcNotification>(value) {
                Ok(notification) => {
                    log_lsp_message!(
                        Level::TRACE,
                        "inbound",
                        notification.method.as_str(),
                        notification.params
                    );
                    let handler = handlers.notification.lock().await.clone();
                    if let Some(handler) = handler {
                        handler(notification);
                    }
                }
                Err(e) => warn!("Malformed notification: {}", e),
            },
            // Response
            (false, true) => match serde_json::from_value::<JsonRpcResponse>(value) {
                Ok(response) => {
                    Self::correlate_response(response, pending_requests).await;
                }
                Err(e) => warn!("Malformed response: {}", e),
            },
            (false, false) => {
                warn!("Message is neither request, response nor notification: {}", message);
            }
        }
    }

    /// Deliver a response to the waiter registered under its id
    async fn correlate_response(response: JsonRpcResponse, pending_requests: &PendingRequests) {
        let Some(id) = response.id.as_u64() else {
            debug!("Received response with non-numeric id: {:?}", response.id);
            return;
        };

        let sender = pending_requests.lock().await.remove(&id);
        match sender {
            Some(sender) => {
                if sender.send(response).is_err() {
                    // Waiter already gave up (timeout), response is dropped
                    debug!("Response receiver dropped for request {}", id);
                }
            }
            None => {
                // Late response after timeout cleanup, dropped silently
                debug!("Received response for unknown request {}", id);
            }
        }
    }

    /// Answer a server-to-client request via the registered handler
    async fn handle_server_request(
        request: JsonRpcRequest,
        handlers: &Arc<Handlers>,
        reply_sender: &mpsc::UnboundedSender<String>,
    ) {
        log_lsp_message!(Level::TRACE, "inbound", request.method.as_str(), request.params);

        let handler = handlers.request.lock().await.clone();
        let outcome = match handler {
            Some(handler) => handler(&request),
            None => Err(JsonRpcErrorObject {
                code: error_codes::METHOD_NOT_FOUND,
                message: format!("Method not handled by client: {}", request.method),
                data: None,
            }),
        };

        let response = match outcome {
            Ok(result) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: Some(result),
                error: None,
            },
            Err(error) => JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: request.id,
                result: None,
                error: Some(error),
            },
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                if reply_sender.send(json).is_err() {
                    debug!("Could not send reply to server request, connection closing");
                }
            }
            Err(e) => error!("Failed to serialize reply to server request: {}", e),
        }
    }

    /// Drop all pending waiters so their requests fail immediately
    async fn fail_pending(pending_requests: &PendingRequests) {
        let mut pending = pending_requests.lock().await;
        if !pending.is_empty() {
            debug!("Failing {} pending requests on disconnect", pending.len());
        }
        pending.clear();
    }

    /// Send a JSON-RPC request with the default timeout
    pub async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R, JsonRpcError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        self.request_with_timeout(method, params, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    /// Send a JSON-RPC request with a custom timeout
    pub async fn request_with_timeout<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        timeout: Duration,
    ) -> Result<R, JsonRpcError>
    where
        P: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let (response_sender, response_receiver) = oneshot::channel();

        {
            let mut pending = self.pending_requests.lock().await;
            pending.insert(id, response_sender);
        }

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Value::Number(serde_json::Number::from(id)),
            method: method.to_string(),
            params: params
                .map(|p| serde_json::to_value(p).map_err(JsonRpcError::Serialization))
                .transpose()?,
        };

        let request_json = serde_json::to_string(&request).map_err(JsonRpcError::Serialization)?;
        log_lsp_message!(Level::TRACE, "outbound", method, &request.params);

        if self.outbound_sender.send(request_json).is_err() {
            self.pending_requests.lock().await.remove(&id);
            return Err(JsonRpcError::ChannelClosed);
        }

        let started = std::time::Instant::now();
        let response = match tokio::time::timeout(timeout, response_receiver).await {
            Ok(Ok(response)) => response,
            // Sender dropped: connection went down and fail_pending cleared us
            Ok(Err(_)) => return Err(JsonRpcError::ChannelClosed),
            Err(_) => {
                // Deregister so a late response is dropped, not misdelivered
                self.pending_requests.lock().await.remove(&id);
                return Err(JsonRpcError::Timeout(timeout));
            }
        };
        crate::log_timing!(Level::TRACE, method, started.elapsed());

        if let Some(error) = response.error {
            return Err(JsonRpcError::Server {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        match response.result {
            Some(result) => {
                serde_json::from_value(result).map_err(JsonRpcError::Deserialization)
            }
            None => Err(JsonRpcError::MissingResult),
        }
    }

    /// Send a JSON-RPC notification
    pub async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<(), JsonRpcError>
    where
        P: Serialize,
    {
        let notification = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: params
                .map(|p| serde_json::to_value(p).map_err(JsonRpcError::Serialization))
                .transpose()?,
        };

        let notification_json =
            serde_json::to_string(&notification).map_err(JsonRpcError::Serialization)?;
        log_lsp_message!(Level::TRACE, "outbound", method, &notification.params);

        self.outbound_sender
            .send(notification_json)
            .map_err(|_| JsonRpcError::ChannelClosed)
    }

    /// Check if the connection is still up
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outbound_sender.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
