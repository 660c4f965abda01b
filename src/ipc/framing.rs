//! Hex length-prefixed message framing for the SWANK wire protocol.
//!
//! # Wire Format
//!
//! ```text
//! <6 hex digits: payload byte length><payload>
//! 000015(:return (:ok "3") 7)
//! ```
//!
//! TCP gives no framing guarantee, so [`FrameReader`] accepts arbitrary
//! chunks: a header may be split across reads, and a single read may carry
//! several frames. A header that is not valid hexadecimal is fatal for the
//! connection.

use std::collections::VecDeque;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Width of the length header in bytes.
pub const HEADER_LEN: usize = 6;

/// Largest payload a 6-digit hex header can describe.
pub const MAX_FRAME_LEN: usize = 0xff_ffff;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The 6 header bytes are not a hex number.
    #[error("Invalid frame header {0:?}")]
    InvalidHeader(String),

    /// A complete payload is not valid UTF-8.
    #[error("Frame payload is not valid UTF-8")]
    InvalidUtf8,

    /// A fatal error was already reported; the stream is unusable.
    #[error("Frame stream is poisoned by an earlier error")]
    Poisoned,
}

/// A frame whose payload is still arriving.
#[derive(Debug)]
struct PartialFrame {
    declared: usize,
    payload: Vec<u8>,
}

impl PartialFrame {
    fn missing(&self) -> usize {
        self.declared - self.payload.len()
    }
}

/// Incremental frame reassembler.
///
/// ```ignore
/// let mut frames = FrameReader::new();
/// frames.feed(&chunk)?;
/// while let Some(payload) = frames.take_frame()? {
///     handle(payload);
/// }
/// ```
#[derive(Debug, Default)]
pub struct FrameReader {
    header: Vec<u8>,
    current: Option<PartialFrame>,
    complete: VecDeque<Vec<u8>>,
    poisoned: bool,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of bytes. Every frame completed by this chunk becomes
    /// available through [`take_frame`](Self::take_frame).
    pub fn feed(&mut self, mut bytes: &[u8]) -> Result<(), FrameError> {
        if self.poisoned {
            return Err(FrameError::Poisoned);
        }

        while !bytes.is_empty() {
            let Some(frame) = self.current.as_mut() else {
                let wanted = HEADER_LEN - self.header.len();
                let take = wanted.min(bytes.len());
                self.header.extend_from_slice(&bytes[..take]);
                bytes = &bytes[take..];

                if self.header.len() == HEADER_LEN {
                    let declared = self.parse_header()?;
                    self.header.clear();
                    self.start_frame(declared);
                }
                continue;
            };

            let take = frame.missing().min(bytes.len());
            frame.payload.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if frame.missing() == 0 {
                self.finish_frame();
            }
        }
        Ok(())
    }

    pub fn has_complete_frame(&self) -> bool {
        !self.complete.is_empty()
    }

    /// Remove and return the oldest complete payload.
    pub fn take_frame(&mut self) -> Result<Option<String>, FrameError> {
        match self.complete.pop_front() {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| FrameError::InvalidUtf8),
            None => Ok(None),
        }
    }

    /// Bytes of the frame currently being assembled, if any.
    pub fn pending_bytes(&self) -> usize {
        self.header.len() + self.current.as_ref().map_or(0, |f| f.payload.len())
    }

    fn parse_header(&mut self) -> Result<usize, FrameError> {
        let text = String::from_utf8_lossy(&self.header).into_owned();
        let valid = text.bytes().all(|b| b.is_ascii_hexdigit());
        match usize::from_str_radix(&text, 16) {
            Ok(declared) if valid => Ok(declared),
            _ => {
                self.poisoned = true;
                Err(FrameError::InvalidHeader(text))
            }
        }
    }

    fn start_frame(&mut self, declared: usize) {
        self.current = Some(PartialFrame {
            declared,
            payload: Vec::with_capacity(declared),
        });
        if declared == 0 {
            self.finish_frame();
        }
    }

    fn finish_frame(&mut self) {
        if let Some(frame) = self.current.take() {
            self.complete.push_back(frame.payload);
        }
    }
}

/// Write an already framed message and flush it.
pub async fn write_frame<W>(writer: &mut W, framed: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::codec::{encode, frame};
    use crate::models::Value;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    /// Test timeout to prevent hanging tests.
    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn drain(reader: &mut FrameReader) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(payload) = reader.take_frame().unwrap() {
            out.push(payload);
        }
        out
    }

    #[test]
    fn test_single_frame() {
        let mut reader = FrameReader::new();
        reader.feed(b"000003(x)").unwrap();
        assert!(reader.has_complete_frame());
        assert_eq!(drain(&mut reader), vec!["(x)"]);
        assert!(!reader.has_complete_frame());
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let value = Value::List(vec![
            Value::keyword("return"),
            Value::List(vec![Value::keyword("ok"), Value::string("héllo \"wörld\"")]),
            Value::Int(12),
        ]);
        let payload = encode(&value);
        let framed = frame(&payload).unwrap();

        let mut reader = FrameReader::new();
        for byte in framed.as_bytes() {
            assert!(!reader.has_complete_frame());
            reader.feed(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(drain(&mut reader), vec![payload]);
        assert_eq!(reader.pending_bytes(), 0);
    }

    #[test]
    fn test_many_frames_in_one_feed() {
        let mut reader = FrameReader::new();
        reader.feed(b"000001a000002bc000000000003def").unwrap();
        assert_eq!(drain(&mut reader), vec!["a", "bc", "", "def"]);
    }

    #[test]
    fn test_split_across_header_boundary() {
        let mut reader = FrameReader::new();
        reader.feed(b"0000").unwrap();
        reader.feed(b"03ab").unwrap();
        assert!(!reader.has_complete_frame());
        assert_eq!(reader.pending_bytes(), 2);
        reader.feed(b"c00").unwrap();
        assert_eq!(drain(&mut reader), vec!["abc"]);
        assert_eq!(reader.pending_bytes(), 2);
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let mut reader = FrameReader::new();
        let payload = "x".repeat(0x1A);
        reader.feed(format!("00001A{}", payload).as_bytes()).unwrap();
        assert_eq!(drain(&mut reader), vec![payload]);
    }

    #[test]
    fn test_invalid_header_is_fatal() {
        let mut reader = FrameReader::new();
        let err = reader.feed(b"zz0003(x)").unwrap_err();
        assert_eq!(err, FrameError::InvalidHeader("zz0003".to_string()));
        assert_eq!(reader.feed(b"000001a").unwrap_err(), FrameError::Poisoned);
    }

    #[test]
    fn test_signed_header_rejected() {
        let mut reader = FrameReader::new();
        assert!(matches!(
            reader.feed(b"+00003abc"),
            Err(FrameError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_payload() {
        let mut reader = FrameReader::new();
        reader.feed(b"000002\xff\xfe").unwrap();
        assert_eq!(reader.take_frame(), Err(FrameError::InvalidUtf8));
    }

    #[tokio::test]
    async fn test_write_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let framed = frame("(:emacs-pong 1 2)").unwrap();

        write_frame(&mut client, &framed).await.expect("Write failed");
        drop(client);

        let mut received = Vec::new();
        timeout(TEST_TIMEOUT, server.read_to_end(&mut received))
            .await
            .expect("Test timed out")
            .expect("Read failed");

        let mut reader = FrameReader::new();
        reader.feed(&received).unwrap();
        assert_eq!(drain(&mut reader), vec!["(:emacs-pong 1 2)"]);
    }
}
