pub mod envelope;
pub mod sse;
pub mod synth;
pub mod transcoder;

pub use envelope::{decode_envelope, encode_envelope_line, Envelope};
pub use sse::{classify_line, sse_line_stream, LineKind, LineSplitter};
pub use transcoder::{StreamTranscoder, TranscodeStats, TranscoderState};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use smallvec::SmallVec;
use std::pin::Pin;
use std::time::Instant;

use crate::observability::log_stream_complete;

/// FIFO with a reusable inline backing store.
pub(crate) struct PendingQueue<T> {
    items: SmallVec<[T; 8]>,
    head: usize,
}

impl<T: Default> PendingQueue<T> {
    #[inline]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let mut items = SmallVec::new();
        items.reserve(capacity);
        Self { items, head: 0 }
    }

    #[inline]
    pub(crate) fn pop_front(&mut self) -> Option<T> {
        if self.head >= self.items.len() {
            return None;
        }
        let item = std::mem::take(&mut self.items[self.head]);
        self.head += 1;
        if self.head == self.items.len() {
            self.items.clear();
            self.head = 0;
        }
        Some(item)
    }

    #[inline]
    pub(crate) fn push(&mut self, item: T) {
        self.items.push(item);
    }

    #[inline]
    pub(crate) fn extend_from_vec(&mut self, parsed: &mut Vec<T>) {
        if parsed.is_empty() {
            return;
        }
        self.items.reserve(parsed.len());
        self.items.extend(parsed.drain(..));
    }
}

/// Log context of one relayed stream.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub request_seq: u64,
    pub model: String,
    pub started: Instant,
}

struct RelayState<E> {
    lines: Pin<Box<dyn Stream<Item = Result<String, E>> + Send>>,
    transcoder: StreamTranscoder,
    scratch: Vec<String>,
    pending: PendingQueue<Bytes>,
    context: StreamContext,
    finished: bool,
}

impl<E> RelayState<E> {
    fn queue_scratch(&mut self) {
        for line in self.scratch.drain(..) {
            let mut framed = line.into_bytes();
            framed.push(b'\n');
            self.pending.push(Bytes::from(framed));
        }
    }

    fn complete(&mut self) {
        self.finished = true;
        log_stream_complete(
            self.context.request_seq,
            &self.context.model,
            self.transcoder.stats(),
            self.context.started,
        );
    }
}

/// Run an upstream body through the transcoder.
///
/// Each output line becomes its own body chunk, so hyper writes it to the
/// client before the next upstream line is pulled. A transport error ends
/// the stream with that error; the client sees a truncated response.
pub fn relay_transcoded_lines<S, E>(
    byte_stream: S,
    transcoder: StreamTranscoder,
    context: StreamContext,
) -> impl Stream<Item = Result<Bytes, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = RelayState {
        lines: Box::pin(sse_line_stream(byte_stream)),
        transcoder,
        scratch: Vec::with_capacity(8),
        pending: PendingQueue::with_capacity(8),
        context,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }

            match state.lines.next().await {
                Some(Ok(line)) => {
                    state
                        .transcoder
                        .transform_line_into(&line, &mut state.scratch);
                    state.queue_scratch();
                }
                Some(Err(err)) => {
                    tracing::warn!(
                        request_seq = state.context.request_seq,
                        error = %err,
                        "upstream stream failed mid-response"
                    );
                    state.complete();
                    return Some((Err(err), state));
                }
                None => {
                    state.transcoder.finish_into(&mut state.scratch);
                    state.queue_scratch();
                    state.complete();
                }
            }
        }
    })
}
