//! I/O layer - Generic abstractions for process management and transport
//!
//! This module provides fundamental I/O abstractions that are not specific to
//! any protocol:
//!
//! - **Transport**: Pure byte-chunk layer for bidirectional exchange
//! - **Process**: External process lifecycle management with stdio integration
//!
//! The framing and JSON-RPC layers in [`crate::lsp`] sit on top of these.

pub mod process;
pub mod transport;

// Re-export main types for convenience
pub use process::{
    ChildProcessManager, ProcessError, ProcessExitEvent, ProcessExitHandler, ProcessManager,
    ProcessState, StderrMonitor, StopMode,
};
pub use transport::{MockTransport, MockTransportController, StdioTransport, Transport};
