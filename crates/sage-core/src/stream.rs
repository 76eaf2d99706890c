//! Channel-backed chunk stream handed to callers of `complete_stream`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{Chunk, SageError};

/// One decoded line is held at most; the producer waits for the consumer.
const CHANNEL_CAPACITY: usize = 1;

/// Producer half, owned by the background task that reads the response body.
#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<Chunk>,
}

impl ChunkSender {
    /// Delivers a chunk. Returns `false` once the consumer has gone away.
    pub async fn send(&self, chunk: Chunk) -> bool {
        self.tx.send(chunk).await.is_ok()
    }

    /// Resolves when the consumer drops its [`ChunkStream`].
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Ordered sequence of [`Chunk`]s from one streaming call.
///
/// Dropping the stream before its terminal chunk stops the producer and
/// releases the underlying HTTP body.
#[derive(Debug)]
pub struct ChunkStream {
    inner: ReceiverStream<Chunk>,
}

impl ChunkStream {
    /// Creates a connected sender/stream pair.
    pub fn channel() -> (ChunkSender, ChunkStream) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (ChunkSender { tx }, ChunkStream { inner: ReceiverStream::new(rx) })
    }

    /// Builds an already-filled stream, handy for test doubles.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // Capacity covers every chunk, so this cannot fail.
            let _ = tx.try_send(chunk);
        }
        ChunkStream { inner: ReceiverStream::new(rx) }
    }

    /// Waits for the next chunk. `None` means the producer is gone.
    pub async fn next_chunk(&mut self) -> Option<Chunk> {
        self.inner.next().await
    }

    /// Drains the stream and concatenates its content.
    ///
    /// Fails with the stream's error chunk, or with
    /// [`SageError::IncompleteStream`] if the channel closes before a terminal chunk.
    pub async fn collect_content(mut self) -> Result<String, SageError> {
        let mut content = String::new();
        while let Some(chunk) = self.next_chunk().await {
            match chunk {
                Chunk::Content(text) => content.push_str(&text),
                Chunk::Done => return Ok(content),
                Chunk::Error(e) => return Err(e),
            }
        }
        Err(SageError::IncompleteStream)
    }
}

impl Stream for ChunkStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collects_until_done() {
        let stream = ChunkStream::from_chunks(vec![
            Chunk::Content("Hel".into()),
            Chunk::Content("lo".into()),
            Chunk::Done,
        ]);
        assert_eq!(stream.collect_content().await, Ok("Hello".to_string()));
    }

    #[tokio::test]
    async fn closed_channel_without_terminal_is_incomplete() {
        let stream = ChunkStream::from_chunks(vec![Chunk::Content("partial".into())]);
        assert_eq!(stream.collect_content().await, Err(SageError::IncompleteStream));
    }

    #[tokio::test]
    async fn sender_notices_dropped_consumer() {
        let (tx, stream) = ChunkStream::channel();
        drop(stream);
        tx.closed().await;
        assert!(!tx.send(Chunk::Done).await);
    }
}
