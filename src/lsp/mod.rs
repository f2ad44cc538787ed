//! Language Server Protocol client stack
//!
//! Layered from the wire up:
//!
//! - **framing**: `Content-Length`-delimited message extraction
//! - **protocol**: JSON-RPC 2.0 request/response correlation
//! - **client**: typed LSP operations over the correlator
//! - **documents**: didOpen/didChange/didClose shadow plus pushed diagnostics
//!
//! Process lifetime and pooling live in [`crate::server`]; this module only
//! speaks the protocol over a [`crate::io::Transport`].

pub mod client;
pub mod documents;
pub mod framing;
pub mod protocol;

// Re-export main types for convenience
pub use client::{LspClient, LspError};
pub use documents::DocumentStore;
pub use framing::{FrameDecoder, FramingError, LspFraming};
pub use protocol::{JsonRpcClient, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
