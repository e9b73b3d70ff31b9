//! Streaming adapter for the audit assistant.
//!
//! The `/routes/chat/query/stream` endpoint emits the answer as raw UTF-8
//! text chunks. Chunk boundaries land anywhere, including inside a
//! multi-byte character, so the adapter buffers bytes and only yields the
//! longest valid prefix.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::Stream;

use crate::error::BrainError;

/// Stream adapter that converts raw response bytes into text chunks.
pub struct ChatStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    partial: Vec<u8>,
}

impl ChatStream {
    pub(crate) fn new(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            partial: Vec::new(),
        }
    }
}

impl Stream for ChatStream {
    type Item = Result<String, BrainError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.partial.extend_from_slice(&bytes);
                    if let Some(item) = take_valid_prefix(&mut this.partial) {
                        return Poll::Ready(Some(item));
                    }
                    // Nothing decodable yet, keep polling
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(BrainError::Http(e))));
                }
                Poll::Ready(None) => {
                    if !this.partial.is_empty() {
                        this.partial.clear();
                        return Poll::Ready(Some(Err(BrainError::Stream(
                            "response ended mid UTF-8 sequence".to_string(),
                        ))));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Take the longest valid UTF-8 prefix out of the buffer. An incomplete
/// trailing sequence stays buffered for the next chunk; an invalid byte
/// fails the stream.
fn take_valid_prefix(buffer: &mut Vec<u8>) -> Option<Result<String, BrainError>> {
    if buffer.is_empty() {
        return None;
    }
    match std::str::from_utf8(buffer) {
        Ok(text) => {
            let text = text.to_string();
            buffer.clear();
            Some(Ok(text))
        }
        Err(e) if e.error_len().is_some() => {
            let at = e.valid_up_to();
            buffer.clear();
            Some(Err(BrainError::Stream(format!(
                "invalid UTF-8 in stream at byte {}",
                at
            ))))
        }
        Err(e) => {
            let valid = e.valid_up_to();
            if valid == 0 {
                return None;
            }
            let text = String::from_utf8_lossy(&buffer[..valid]).into_owned();
            buffer.drain(..valid);
            Some(Ok(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn byte_chunks(chunks: &[&[u8]]) -> Vec<Result<Bytes, reqwest::Error>> {
        chunks.iter().map(|c| Ok(Bytes::copy_from_slice(c))).collect()
    }

    #[tokio::test]
    async fn test_yields_text_chunks() {
        let data = byte_chunks(&[b"Your fuel surcharge", b" looks high."]);
        let mut stream = ChatStream::new(futures::stream::iter(data));

        assert_eq!(stream.next().await.unwrap().unwrap(), "Your fuel surcharge");
        assert_eq!(stream.next().await.unwrap().unwrap(), " looks high.");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_reassembles_split_multibyte_character() {
        // "café!" split inside the two-byte 'é'
        let data = byte_chunks(&[b"caf\xC3", b"\xA9!"]);
        let mut stream = ChatStream::new(futures::stream::iter(data));

        assert_eq!(stream.next().await.unwrap().unwrap(), "caf");
        assert_eq!(stream.next().await.unwrap().unwrap(), "\u{e9}!");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_byte_fails_the_stream() {
        let data = byte_chunks(&[b"ok\xFFnope"]);
        let mut stream = ChatStream::new(futures::stream::iter(data));

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, BrainError::Stream(_)));
    }

    #[tokio::test]
    async fn test_truncated_tail_reports_error_then_ends() {
        let data = byte_chunks(&[b"caf\xC3"]);
        let mut stream = ChatStream::new(futures::stream::iter(data));

        assert_eq!(stream.next().await.unwrap().unwrap(), "caf");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, BrainError::Stream(_)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_stream_ends_immediately() {
        let data = byte_chunks(&[]);
        let mut stream = ChatStream::new(futures::stream::iter(data));
        assert!(stream.next().await.is_none());
    }
}
