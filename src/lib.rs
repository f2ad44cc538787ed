//! Generic, pooled Language Server Protocol client for automated callers.
//!
//! The crate drives arbitrary external LSP servers over stdio without being a
//! language server itself. It is layered bottom-up:
//!
//! - [`io`]: transport and child process management, protocol-agnostic
//! - [`lsp`]: Content-Length framing, JSON-RPC correlation, typed client,
//!   document synchronization with a diagnostics shadow
//! - [`server`]: one [`server::Session`] per spawned server process, shared
//!   across concurrent callers through a refcounted [`server::SessionPool`]
//! - [`text`]: pure helpers turning fuzzy line/symbol descriptors into exact
//!   protocol positions and applying server-returned text edits
//!
//! ```no_run
//! use lsp_driver::server::{SessionPool, StdioSessionFactory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = StdioSessionFactory::new("rust-analyzer");
//! let pool = SessionPool::new(factory);
//!
//! let session = pool.acquire(std::path::Path::new("/path/to/project")).await?;
//! // issue hover/definition/rename requests through the session...
//! pool.release(std::path::Path::new("/path/to/project")).await;
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod io;
pub mod logging;
pub mod lsp;
pub mod server;
pub mod text;

#[cfg(test)]
mod test_utils;

// Re-export the types most callers touch.
pub use lsp::client::{LspClient, LspError};
pub use lsp::documents::DocumentStore;
pub use server::{ServerConfig, ServerConfigBuilder, Session, SessionError, SessionPool};
pub use text::edits::apply_text_edits;
pub use text::position::{LineTarget, resolve_line, resolve_symbol_position};
