//! Line-oriented stream driver shared by all adapters.
//!
//! A background task owns the response body, splits it into lines, feeds each
//! line to a provider-specific [`LineDecoder`], and forwards the resulting
//! chunks in order. The task ends after the first terminal chunk, when the
//! consumer drops its stream, or when the caller cancels; the body is dropped
//! with the task on every path.

use futures::{Stream, StreamExt};
use sage_core::{Chunk, ChunkSender, ChunkStream, SageError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Per-provider state machine over the lines of a streamed body.
pub(crate) trait LineDecoder: Send + 'static {
    /// Decodes one non-blank line (without its line terminator).
    fn decode_line(&mut self, line: &str) -> Vec<Chunk>;
}

/// Returns the payload of an SSE `data:` line.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|data| data.strip_prefix(' ').unwrap_or(data))
}

/// Returns the name carried by an SSE `event:` line.
pub(crate) fn sse_event(line: &str) -> Option<&str> {
    line.strip_prefix("event:").map(str::trim)
}

/// Starts the reader task for an accepted streaming response.
pub(crate) fn spawn_decoder<D: LineDecoder>(
    response: reqwest::Response,
    decoder: D,
    cancel: Option<CancellationToken>,
) -> ChunkStream {
    let (tx, stream) = ChunkStream::channel();
    let body = response
        .bytes_stream()
        .map(|result| result.map_err(|e| SageError::StreamRead(e.to_string())));
    tokio::spawn(pump(body, decoder, tx, cancel));
    stream
}

enum Flow {
    Continue,
    Stop,
}

/// Drives `decoder` over `body` until a terminal chunk has been delivered.
pub(crate) async fn pump<S, B, D>(body: S, mut decoder: D, tx: ChunkSender, cancel: Option<CancellationToken>)
where
    S: Stream<Item = Result<B, SageError>>,
    B: AsRef<[u8]>,
    D: LineDecoder,
{
    let mut body = std::pin::pin!(body);
    let cancel = cancel.unwrap_or_default();
    let mut lines = LineBuffer::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = tx.closed() => {
                debug!("stream consumer went away, releasing body");
                return;
            }
            _ = cancel.cancelled() => {
                tx.send(Chunk::Error(SageError::Cancelled)).await;
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for line in lines.push(bytes.as_ref()) {
                    if let Flow::Stop = forward(&mut decoder, &line, &tx).await {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                tx.send(Chunk::Error(e)).await;
                return;
            }
            None => {
                if let Some(line) = lines.finish() {
                    if let Flow::Stop = forward(&mut decoder, &line, &tx).await {
                        return;
                    }
                }
                debug!("stream body ended without a completion marker");
                tx.send(Chunk::Error(SageError::IncompleteStream)).await;
                return;
            }
        }
    }
}

async fn forward<D: LineDecoder>(decoder: &mut D, line: &str, tx: &ChunkSender) -> Flow {
    if line.trim().is_empty() {
        return Flow::Continue;
    }

    for chunk in decoder.decode_line(line) {
        if matches!(&chunk, Chunk::Content(text) if text.is_empty()) {
            continue;
        }
        let terminal = chunk.is_terminal();
        if !tx.send(chunk).await || terminal {
            return Flow::Stop;
        }
    }
    Flow::Continue
}

/// Accumulates raw bytes and yields complete lines.
///
/// Splitting happens on bytes so multi-byte characters cut across network
/// reads are reassembled before decoding.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(to_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Returns the trailing unterminated line, if any.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(to_line(&rest))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::{run, run_body};
    use super::*;

    /// Echoes every line; `!done` and `!fail` are terminal.
    struct Echo;

    impl LineDecoder for Echo {
        fn decode_line(&mut self, line: &str) -> Vec<Chunk> {
            match line {
                "!done" => vec![Chunk::Done],
                "!fail" => vec![Chunk::Error(SageError::StreamDecode("fail".into()))],
                "!empty" => vec![Chunk::Content(String::new())],
                other => vec![Chunk::Content(other.to_string())],
            }
        }
    }

    #[test]
    fn sse_prefixes() {
        assert_eq!(sse_data("data: {}"), Some("{}"));
        assert_eq!(sse_data("data:{}"), Some("{}"));
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_event("event: message_stop"), Some("message_stop"));
        assert_eq!(sse_event("data: x"), None);
    }

    #[test]
    fn line_buffer_reassembles_split_reads() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"hel").is_empty());
        assert_eq!(buf.push(b"lo\r\nwor"), vec!["hello".to_string()]);
        assert_eq!(buf.push(b"ld\n"), vec!["world".to_string()]);
        assert_eq!(buf.finish(), None);

        // "é" is two bytes; split it across reads.
        let bytes = "caf\u{e9}\n".as_bytes();
        assert!(buf.push(&bytes[..4]).is_empty());
        assert_eq!(buf.push(&bytes[4..]), vec!["caf\u{e9}".to_string()]);
    }

    #[tokio::test]
    async fn stops_at_first_terminal_chunk() {
        let chunks = run(Echo, &["a\nb\n!done\nc\n!done\n"]).await;
        assert_eq!(
            chunks,
            vec![Chunk::Content("a".into()), Chunk::Content("b".into()), Chunk::Done]
        );
    }

    #[tokio::test]
    async fn blank_lines_and_empty_content_are_dropped() {
        let chunks = run(Echo, &["\n\r\na\n!empty\n\n!done\n"]).await;
        assert_eq!(chunks, vec![Chunk::Content("a".into()), Chunk::Done]);
    }

    #[tokio::test]
    async fn exhausted_body_is_incomplete() {
        let chunks = run(Echo, &["a\n", "b"]).await;
        assert_eq!(
            chunks,
            vec![
                Chunk::Content("a".into()),
                Chunk::Content("b".into()),
                Chunk::Error(SageError::IncompleteStream),
            ]
        );
    }

    #[tokio::test]
    async fn unterminated_final_line_can_finish_the_stream() {
        let chunks = run(Echo, &["a\n!done"]).await;
        assert_eq!(chunks, vec![Chunk::Content("a".into()), Chunk::Done]);
    }

    #[tokio::test]
    async fn read_error_ends_stream() {
        let body = vec![
            Ok(b"a\n".to_vec()),
            Err(SageError::StreamRead("connection reset".into())),
            Ok(b"b\n!done\n".to_vec()),
        ];
        let chunks = run_body(Echo, body).await;
        assert_eq!(
            chunks,
            vec![
                Chunk::Content("a".into()),
                Chunk::Error(SageError::StreamRead("connection reset".into())),
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_ends_a_stalled_stream() {
        let token = CancellationToken::new();
        let (tx, stream) = ChunkStream::channel();
        let body = futures::stream::iter(vec![Ok::<_, SageError>(b"a\n".to_vec())])
            .chain(futures::stream::pending());
        let task = tokio::spawn(pump(body, Echo, tx, Some(token.clone())));

        let mut stream = stream;
        assert_eq!(stream.next_chunk().await, Some(Chunk::Content("a".into())));
        token.cancel();
        assert_eq!(stream.next_chunk().await, Some(Chunk::Error(SageError::Cancelled)));
        assert_eq!(stream.next_chunk().await, None);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_the_reader() {
        let (tx, stream) = ChunkStream::channel();
        let body = futures::stream::pending::<Result<Vec<u8>, SageError>>();
        let task = tokio::spawn(pump(body, Echo, tx, None));

        drop(stream);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reader task should exit once the consumer is gone")
            .unwrap();
    }
}
