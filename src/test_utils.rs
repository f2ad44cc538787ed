//! Test utilities and global setup
//!
//! Centralized test logging configuration plus a shell-script stand-in for a
//! real language server, used by the session lifecycle tests.

/// Test logging utilities
#[cfg(feature = "test-logging")]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects `RUST_LOG` with sensible defaults and uses the test writer so
    /// log output stays attached to the test that produced it. Typical use is
    /// a `#[ctor::ctor]` block at the top of a test module:
    ///
    /// ```rust
    /// #[cfg(feature = "test-logging")]
    /// #[ctor::ctor]
    /// fn init_test_logging() {
    ///     crate::test_utils::logging::init();
    /// }
    /// ```
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("debug,tokio=info"));

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(true)
                .compact()
                .try_init()
                .ok();
        });
    }
}

/// Fake language server scripts for session tests
///
/// Real servers are not available in unit tests, so the session tests spawn
/// `sh` running a generated script that speaks just enough of the protocol to
/// get through initialization.
pub mod fake_server {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    use crate::lsp::framing::encode_frame;

    /// Write a script that answers the `initialize` request and returns its path
    ///
    /// The script reads a prefix of the incoming request before replying, so
    /// the response can never race ahead of the client registering the
    /// pending request. With `keep_alive` the script then idles like a real
    /// server; without it the script exits shortly after responding, which
    /// lets tests observe unexpected-exit handling. The short sleep before a
    /// non-keep-alive exit leaves the pipe open long enough for the client's
    /// `initialized` notification to be written.
    pub fn script_responding_to_initialize(dir: &Path, keep_alive: bool) -> PathBuf {
        let response = encode_frame(r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#);
        let frame_path = dir.join("initialize-response.bin");
        fs::write(&frame_path, response).unwrap();

        let tail = if keep_alive { "sleep 30" } else { "sleep 1" };
        let script = format!(
            "#!/bin/sh\nhead -c 30 >/dev/null\ncat '{}'\n{}\n",
            frame_path.display(),
            tail
        );

        let script_path = dir.join("fake-server.sh");
        fs::write(&script_path, script).unwrap();
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755)).unwrap();
        script_path
    }
}
