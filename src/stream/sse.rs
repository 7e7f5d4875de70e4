//! Line framing for the upstream event stream.
//!
//! The relay works line by line rather than frame by frame: every input
//! line maps to zero or more output lines, and blank separator lines are
//! passed through as they arrive so the client sees the upstream cadence.

use bytes::Bytes;
use futures_util::Stream;
use memchr::memchr_iter;

use super::PendingQueue;

/// Prefix of an event line.
pub const DATA_PREFIX: &str = "data:";
const DONE_PAYLOAD: &str = "[DONE]";

/// What a single protocol line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    Blank,
    /// The `data: [DONE]` sentinel.
    Done,
    /// An event line; holds the payload after the prefix.
    Data(&'a str),
    /// Comments, `event:` fields and anything else.
    Other,
}

/// Classify one line (without its terminator).
#[must_use]
pub fn classify_line(line: &str) -> LineKind<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    match trimmed.strip_prefix(DATA_PREFIX) {
        Some(payload) => {
            let payload = payload.trim_start();
            if payload == DONE_PAYLOAD {
                LineKind::Done
            } else {
                LineKind::Data(payload)
            }
        }
        None => LineKind::Other,
    }
}

// ---------------------------------------------------------------------------
// LineSplitter: incremental line splitter
// ---------------------------------------------------------------------------

/// Incremental splitter from raw body chunks to lines.
///
/// Lines are cut on `\n` with a trailing `\r` stripped. Splitting happens on
/// bytes, so a multi-byte character split across chunks is reassembled
/// before the line is decoded.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
    read_offset: usize,
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every complete line.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw bytes and append complete lines into a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        let scan_start = self.buffer.len();
        self.buffer.extend_from_slice(chunk);
        let mut processed_up_to = self.read_offset;
        for rel_pos in memchr_iter(b'\n', &self.buffer[scan_start..]) {
            let line_end = scan_start + rel_pos;
            out.push(decode_line(&self.buffer[processed_up_to..line_end]));
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Take the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = &self.buffer[self.read_offset..];
        let line = (!rest.is_empty()).then(|| decode_line(rest));
        self.buffer.clear();
        self.read_offset = 0;
        line
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Split an upstream body into lines.
///
/// A transport error is yielded once and ends the stream; whatever partial
/// line was pending at that point is discarded.
pub fn sse_line_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            LineSplitter::new(),
            Vec::<String>::with_capacity(8),
            PendingQueue::<String>::with_capacity(8),
            false,
        ),
        |(mut stream, mut splitter, mut parsed, mut pending, mut ended)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((Ok(line), (stream, splitter, parsed, pending, ended)));
                }
                if ended {
                    return None;
                }

                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        splitter.feed_into(&bytes, &mut parsed);
                        pending.extend_from_vec(&mut parsed);
                    }
                    Some(Err(err)) => {
                        ended = true;
                        splitter.finish();
                        return Some((Err(err), (stream, splitter, parsed, pending, ended)));
                    }
                    None => {
                        ended = true;
                        if let Some(line) = splitter.finish() {
                            return Some((Ok(line), (stream, splitter, parsed, pending, ended)));
                        }
                    }
                }
            }
        },
    )
}
