//! Transport layer - Pure I/O abstraction for byte exchange
//!
//! A transport moves opaque byte chunks in both directions without knowledge
//! of message framing or process management. Chunks carry no boundary
//! guarantees: a single LSP frame may arrive split across many chunks and a
//! chunk may span several frames. Reassembly is the framing layer's job.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{Notify, mpsc};
use tracing::{error, trace};

/// Read buffer size for the stdout reader task
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Core transport trait for bidirectional byte exchange
#[async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a chunk of bytes
    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Receive the next available chunk of bytes
    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), Self::Error>;

    /// Check if transport is still active
    fn is_connected(&self) -> bool;
}

// ============================================================================
// Stdio Transport Implementation
// ============================================================================

/// Error types for stdio transport
#[derive(Debug, thiserror::Error)]
pub enum StdioTransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport is disconnected")]
    Disconnected,

    #[error("Channel error: {0}")]
    Channel(String),
}

/// Transport implementation over a child process's stdin/stdout pipes
pub struct StdioTransport {
    /// Channel for sending chunks to stdin
    stdin_sender: Option<mpsc::UnboundedSender<Vec<u8>>>,

    /// Channel for receiving chunks from stdout
    stdout_receiver: Option<mpsc::UnboundedReceiver<Vec<u8>>>,

    /// Connection status
    connected: bool,
}

impl StdioTransport {
    /// Create a new StdioTransport from child process streams
    pub fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        let (stdin_sender, stdin_receiver) = mpsc::unbounded_channel();
        let (stdout_sender, stdout_receiver) = mpsc::unbounded_channel();

        tokio::spawn(Self::stdin_writer_task(stdin, stdin_receiver));
        tokio::spawn(Self::stdout_reader_task(stdout, stdout_sender));

        Self {
            stdin_sender: Some(stdin_sender),
            stdout_receiver: Some(stdout_receiver),
            connected: true,
        }
    }

    /// Background task that writes chunks to stdin
    async fn stdin_writer_task(
        mut stdin: ChildStdin,
        mut receiver: mpsc::UnboundedReceiver<Vec<u8>>,
    ) {
        while let Some(chunk) = receiver.recv().await {
            trace!("StdioTransport: writing {} bytes to stdin", chunk.len());

            if let Err(e) = stdin.write_all(&chunk).await {
                error!("Failed to write to stdin: {}", e);
                break;
            }

            if let Err(e) = stdin.flush().await {
                error!("Failed to flush stdin: {}", e);
                break;
            }
        }

        trace!("StdioTransport: stdin writer task finished");
    }

    /// Background task that forwards raw stdout chunks
    ///
    /// Reads whatever the pipe yields instead of lines: LSP frames are not
    /// newline-terminated, and a line-based reader would hold the final
    /// message of a burst hostage until the server writes again.
    async fn stdout_reader_task(mut stdout: ChildStdout, sender: mpsc::UnboundedSender<Vec<u8>>) {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => {
                    trace!("StdioTransport: stdout reader reached EOF");
                    break;
                }
                Ok(n) => {
                    trace!("StdioTransport: read {} bytes from stdout", n);

                    if sender.send(buf[..n].to_vec()).is_err() {
                        trace!("StdioTransport: stdout receiver dropped, stopping reader");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to read from stdout: {}", e);
                    break;
                }
            }
        }

        trace!("StdioTransport: stdout reader task finished");
    }
}

#[async_trait]
impl Transport for StdioTransport {
    type Error = StdioTransportError;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let sender = self
            .stdin_sender
            .as_ref()
            .ok_or(StdioTransportError::Disconnected)?;

        sender
            .send(bytes.to_vec())
            .map_err(|e| StdioTransportError::Channel(e.to_string()))?;

        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error> {
        if !self.connected {
            return Err(StdioTransportError::Disconnected);
        }

        let receiver = self
            .stdout_receiver
            .as_mut()
            .ok_or(StdioTransportError::Disconnected)?;

        receiver
            .recv()
            .await
            .ok_or(StdioTransportError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        self.stdin_sender.take();
        self.stdout_receiver.take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

// ============================================================================
// Mock Transport Implementation
// ============================================================================

/// Error type for mock transport
#[derive(Debug, thiserror::Error)]
pub enum MockTransportError {
    #[error("Transport is disconnected")]
    Disconnected,
}

#[derive(Default)]
struct MockTransportState {
    sent: Mutex<Vec<Vec<u8>>>,
    responses: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
    sent_notify: Notify,
    response_notify: Notify,
}

/// Mock transport for testing
///
/// Records everything sent and serves injected response chunks. `receive`
/// parks until a response is pushed or the transport closes, so protocol
/// tests can interleave request submission and response injection without
/// racing the background reader.
pub struct MockTransport {
    state: Arc<MockTransportState>,
}

/// Test-side handle for a [`MockTransport`]
///
/// Lets a test inspect sent bytes and inject responses after the transport
/// itself has been consumed by a client.
#[derive(Clone)]
pub struct MockTransportController {
    state: Arc<MockTransportState>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockTransportState::default()),
        }
    }

    /// Create a mock transport with predefined response chunks
    pub fn with_responses(responses: Vec<Vec<u8>>) -> Self {
        let transport = Self::new();
        {
            let mut queue = transport.state.responses.lock().unwrap();
            queue.extend(responses);
        }
        transport
    }

    /// Get a controller handle for driving this transport from a test
    pub fn controller(&self) -> MockTransportController {
        MockTransportController {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransportController {
    /// Queue a response chunk for the next `receive` call
    pub fn push_response(&self, bytes: Vec<u8>) {
        self.state.responses.lock().unwrap().push_back(bytes);
        self.state.response_notify.notify_waiters();
    }

    /// All chunks sent through the transport so far, as UTF-8 strings
    pub fn sent_messages(&self) -> Vec<String> {
        self.state
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect()
    }

    /// Wait until at least `count` chunks have been sent
    pub async fn wait_for_sent(&self, count: usize) {
        loop {
            let notified = self.state.sent_notify.notified();
            if self.state.sent.lock().unwrap().len() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Mark the transport as closed, waking any parked receiver
    pub fn disconnect(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.response_notify.notify_waiters();
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn send(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(MockTransportError::Disconnected);
        }

        self.state.sent.lock().unwrap().push(bytes.to_vec());
        self.state.sent_notify.notify_waiters();
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>, Self::Error> {
        loop {
            let notified = self.state.response_notify.notified();

            if let Some(chunk) = self.state.responses.lock().unwrap().pop_front() {
                return Ok(chunk);
            }
            if self.state.closed.load(Ordering::SeqCst) {
                return Err(MockTransportError::Disconnected);
            }

            notified.await;
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.response_notify.notify_waiters();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.state.closed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_stdio_transport_echo() {
        let mut child = Command::new("echo")
            .arg("hello world")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("Failed to spawn echo command");

        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();

        let mut transport = StdioTransport::new(stdin, stdout);

        let output = transport.receive().await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output).trim(), "hello world");

        assert!(transport.is_connected());

        transport.close().await.unwrap();
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_mock_transport_send_receive() {
        let mut transport = MockTransport::with_responses(vec![
            b"response1".to_vec(),
            b"response2".to_vec(),
        ]);
        let controller = transport.controller();

        transport.send(b"message1").await.unwrap();
        transport.send(b"message2").await.unwrap();

        assert_eq!(transport.receive().await.unwrap(), b"response1");
        assert_eq!(transport.receive().await.unwrap(), b"response2");

        assert_eq!(controller.sent_messages(), vec!["message1", "message2"]);
    }

    #[tokio::test]
    async fn test_mock_transport_parks_until_response() {
        let mut transport = MockTransport::new();
        let controller = transport.controller();

        let receiver = tokio::spawn(async move { transport.receive().await });

        // Give the receiver a chance to park before injecting
        tokio::task::yield_now().await;
        controller.push_response(b"late".to_vec());

        let chunk = receiver.await.unwrap().unwrap();
        assert_eq!(chunk, b"late");
    }

    #[tokio::test]
    async fn test_mock_transport_disconnect() {
        let mut transport = MockTransport::new();

        assert!(transport.is_connected());

        transport.close().await.unwrap();

        assert!(!transport.is_connected());
        assert!(transport.send(b"test").await.is_err());
        assert!(transport.receive().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_transport_wait_for_sent() {
        let mut transport = MockTransport::new();
        let controller = transport.controller();

        transport.send(b"one").await.unwrap();
        controller.wait_for_sent(1).await;

        assert_eq!(controller.sent_messages().len(), 1);
    }
}
