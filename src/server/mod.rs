//! Language server session layer
//!
//! Session lifecycle management on top of the io and lsp layers: validated
//! configuration, a state-machine session owning one server process, a
//! factory seam for creating sessions, and a pool that shares sessions per
//! project root.

pub mod config;
pub mod error;
pub mod factory;
pub mod pool;
pub mod session;

pub use config::{LspConfig, ServerConfig, ServerConfigBuilder};
pub use error::{ConfigError, SessionError};
pub use factory::{PooledSession, SessionFactory, StdioSessionFactory};
pub use pool::{PoolError, SessionPool};
pub use session::{Session, SessionState};
