//! LSP message framing layer
//!
//! Handles LSP-specific message framing using Content-Length headers
//! as specified in the Language Server Protocol specification.
//!
//! LSP message framing format:
//! Content-Length: <length>\r\n\r\n<content>
//!
//! `Content-Length` counts UTF-8 bytes of the payload, not characters, so
//! the decoder operates on a byte buffer and tolerates chunk boundaries
//! anywhere, including mid-header and mid-body.

use crate::io::transport::Transport;
use std::collections::VecDeque;
use tracing::trace;

/// Maximum message size to prevent memory exhaustion
const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Error types for LSP framing
///
/// A complete header block that lacks a parseable `Content-Length` is an
/// error rather than something to skip past: resynchronizing inside a
/// length-prefixed stream is guesswork, so the owning session treats any
/// framing error as fatal and tears the connection down.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Missing Content-Length header in: {header:?}")]
    MissingContentLength { header: String },

    #[error("Invalid Content-Length value: {value:?}")]
    InvalidContentLength { value: String },

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Message body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

// ============================================================================
// Frame Decoder
// ============================================================================

/// Incremental decoder for the length-prefixed wire format
///
/// Feed it raw bytes with [`FrameDecoder::extend`] and drain complete
/// messages with [`FrameDecoder::next_message`]. Bytes belonging to an
/// incomplete header or body stay buffered until more data arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received bytes to the buffer
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Try to extract the next complete message from the buffer
    ///
    /// Returns `Ok(None)` if more data is needed.
    pub fn next_message(&mut self) -> Result<Option<String>, FramingError> {
        let header_end = match find_subsequence(&self.buffer, b"\r\n\r\n") {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let header = String::from_utf8_lossy(&self.buffer[..header_end]).into_owned();
        let content_start = header_end + 4;
        let content_length = parse_content_length(&header)?;

        let available = self.buffer.len() - content_start;
        if available < content_length {
            trace!(
                "FrameDecoder: incomplete body - need {} more bytes",
                content_length - available
            );
            return Ok(None);
        }

        let body = self.buffer[content_start..content_start + content_length].to_vec();
        self.buffer.drain(..content_start + content_length);

        let message = String::from_utf8(body)?;
        trace!("FrameDecoder: parsed complete message ({} bytes)", content_length);
        Ok(Some(message))
    }
}

/// Frame an outgoing message with its Content-Length header
pub fn encode_frame(message: &str) -> Vec<u8> {
    let mut frame = format!("Content-Length: {}\r\n\r\n", message.len()).into_bytes();
    frame.extend_from_slice(message.as_bytes());
    frame
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_content_length(header: &str) -> Result<usize, FramingError> {
    for line in header.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                let length =
                    value
                        .parse::<usize>()
                        .map_err(|_| FramingError::InvalidContentLength {
                            value: value.to_string(),
                        })?;

                if length > MAX_MESSAGE_SIZE {
                    return Err(FramingError::MessageTooLarge {
                        size: length,
                        max: MAX_MESSAGE_SIZE,
                    });
                }

                return Ok(length);
            }
        }
    }

    Err(FramingError::MissingContentLength {
        header: header.to_string(),
    })
}

// ============================================================================
// Framed Transport Wrapper
// ============================================================================

/// Error types for the framed transport wrapper
#[derive(Debug, thiserror::Error)]
pub enum LspFramingError<T: std::error::Error + Send + Sync + 'static> {
    #[error("Transport error: {0}")]
    Transport(T),

    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// LSP message framing wrapper
///
/// Wraps any transport so that `send`/`receive` move whole JSON messages
/// while the underlying transport keeps moving opaque byte chunks.
pub struct LspFraming<T: Transport> {
    /// Underlying transport
    transport: T,

    /// Incremental frame decoder over received chunks
    decoder: FrameDecoder,

    /// Queue of complete messages ready to be returned
    message_queue: VecDeque<String>,
}

impl<T: Transport> LspFraming<T> {
    /// Create a new LSP framing wrapper around a transport
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            decoder: FrameDecoder::new(),
            message_queue: VecDeque::new(),
        }
    }

    /// Send one framed message
    pub async fn send(&mut self, message: &str) -> Result<(), LspFramingError<T::Error>> {
        trace!(
            "LspFraming: sending framed message ({} bytes content)",
            message.len()
        );

        self.transport
            .send(&encode_frame(message))
            .await
            .map_err(LspFramingError::Transport)
    }

    /// Receive the next complete message
    pub async fn receive(&mut self) -> Result<String, LspFramingError<T::Error>> {
        loop {
            if let Some(message) = self.message_queue.pop_front() {
                return Ok(message);
            }

            let chunk = self
                .transport
                .receive()
                .await
                .map_err(LspFramingError::Transport)?;

            self.decoder.extend(&chunk);
            while let Some(message) = self.decoder.next_message()? {
                self.message_queue.push_back(message);
            }
        }
    }

    /// Close the underlying transport
    pub async fn close(&mut self) -> Result<(), LspFramingError<T::Error>> {
        self.transport
            .close()
            .await
            .map_err(LspFramingError::Transport)
    }

    /// Check if the underlying transport is still active
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transport::MockTransport;

    fn frame(message: &str) -> Vec<u8> {
        encode_frame(message)
    }

    #[test]
    fn test_decoder_whole_message() {
        let message = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let mut decoder = FrameDecoder::new();
        decoder.extend(&frame(message));

        assert_eq!(decoder.next_message().unwrap().as_deref(), Some(message));
        assert_eq!(decoder.next_message().unwrap(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_arbitrary_byte_splits() {
        let messages = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
            r#"{"jsonrpc":"2.0","id":2,"result":{"ok":true}}"#,
            r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{}}"#,
        ];

        let mut stream = Vec::new();
        for message in &messages {
            stream.extend_from_slice(&frame(message));
        }

        // Feed the stream one byte at a time: every header and body is split
        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        for byte in stream {
            decoder.extend(&[byte]);
            while let Some(message) = decoder.next_message().unwrap() {
                decoded.push(message);
            }
        }

        assert_eq!(decoded, messages);
    }

    #[test]
    fn test_decoder_multibyte_utf8_payload() {
        // Content-Length counts bytes; "héllo" is 6 bytes but 5 characters
        let message = r#"{"text":"héllo"}"#;
        let encoded = frame(message);
        assert!(
            String::from_utf8_lossy(&encoded)
                .starts_with(&format!("Content-Length: {}", message.len()))
        );

        // Split inside the two-byte é sequence
        let split_at = encoded.len() - 6;
        let mut decoder = FrameDecoder::new();
        decoder.extend(&encoded[..split_at]);
        assert_eq!(decoder.next_message().unwrap(), None);
        decoder.extend(&encoded[split_at..]);
        assert_eq!(decoder.next_message().unwrap().as_deref(), Some(message));
    }

    #[test]
    fn test_decoder_missing_content_length() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"Content-Type: application/json\r\n\r\n{}");

        let result = decoder.next_message();
        assert!(matches!(
            result,
            Err(FramingError::MissingContentLength { .. })
        ));
    }

    #[test]
    fn test_decoder_invalid_content_length() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(b"Content-Length: banana\r\n\r\n{}");

        let result = decoder.next_message();
        assert!(matches!(
            result,
            Err(FramingError::InvalidContentLength { .. })
        ));
    }

    #[test]
    fn test_decoder_message_too_large() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_SIZE + 1).as_bytes());

        let result = decoder.next_message();
        match result {
            Err(FramingError::MessageTooLarge { size, max }) => {
                assert_eq!(size, MAX_MESSAGE_SIZE + 1);
                assert_eq!(max, MAX_MESSAGE_SIZE);
            }
            other => panic!("Expected MessageTooLarge, got: {other:?}"),
        }
    }

    #[test]
    fn test_decoder_extra_headers() {
        let message = r#"{"jsonrpc":"2.0","id":7,"result":null}"#;
        let framed = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            message.len(),
            message
        );

        let mut decoder = FrameDecoder::new();
        decoder.extend(framed.as_bytes());
        assert_eq!(decoder.next_message().unwrap().as_deref(), Some(message));
    }

    #[tokio::test]
    async fn test_lsp_framing_send() {
        let transport = MockTransport::new();
        let controller = transport.controller();
        let mut framing = LspFraming::new(transport);

        let message = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        framing.send(message).await.unwrap();

        let sent = controller.sent_messages();
        assert_eq!(sent.len(), 1);

        let expected = format!("Content-Length: {}\r\n\r\n{}", message.len(), message);
        assert_eq!(sent[0], expected);
    }

    #[tokio::test]
    async fn test_lsp_framing_receive_partial_chunks() {
        let message = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let encoded = frame(message);
        let (first, second) = encoded.split_at(17);

        let transport =
            MockTransport::with_responses(vec![first.to_vec(), second.to_vec()]);
        let mut framing = LspFraming::new(transport);

        let received = framing.receive().await.unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn test_lsp_framing_multiple_messages_one_chunk() {
        let message1 = r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#;
        let message2 = r#"{"jsonrpc":"2.0","id":2,"method":"shutdown"}"#;

        let mut combined = frame(message1);
        combined.extend_from_slice(&frame(message2));

        let transport = MockTransport::with_responses(vec![combined]);
        let mut framing = LspFraming::new(transport);

        assert_eq!(framing.receive().await.unwrap(), message1);
        assert_eq!(framing.receive().await.unwrap(), message2);
    }

    #[tokio::test]
    async fn test_lsp_framing_propagates_framing_error() {
        let transport = MockTransport::with_responses(vec![
            b"Content-Length: invalid\r\n\r\n{}".to_vec(),
        ]);
        let mut framing = LspFraming::new(transport);

        let result = framing.receive().await;
        assert!(matches!(
            result,
            Err(LspFramingError::Framing(FramingError::InvalidContentLength { .. }))
        ));
    }
}
