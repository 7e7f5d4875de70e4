use memchr::memmem;
use std::sync::LazyLock;

use super::envelope::{decode_envelope, encode_envelope_line, Envelope};
use super::sse::{classify_line, LineKind};
use super::synth::{
    content_envelope, finish_envelope, placeholder_envelope, text_envelope, tool_call_envelope,
    EnvelopeTemplate,
};
use crate::fc::parser::{parse_invocation, TOOL_CALL_CLOSE, TOOL_CALL_OPEN};

/// Default cap on a buffered invocation span.
pub const DEFAULT_MAX_BUFFER: usize = 512 * 1024;

static OPEN_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(TOOL_CALL_OPEN.as_bytes()));
static CLOSE_FINDER: LazyLock<memmem::Finder<'static>> =
    LazyLock::new(|| memmem::Finder::new(TOOL_CALL_CLOSE.as_bytes()));

#[inline]
fn find_open(text: &str) -> Option<usize> {
    OPEN_FINDER.find(text.as_bytes())
}

/// End offset of the first close marker that may involve bytes appended
/// after `previous_len`.
#[inline]
fn find_close_end_since(buffer: &str, previous_len: usize) -> Option<usize> {
    let scan_start = previous_len.saturating_sub(TOOL_CALL_CLOSE.len().saturating_sub(1));
    CLOSE_FINDER
        .find(buffer.as_bytes().get(scan_start..).unwrap_or_default())
        .map(|rel| scan_start + rel + TOOL_CALL_CLOSE.len())
}

/// Length of the longest suffix of `text` that is a proper prefix of the
/// open marker, i.e. text that may still turn into a marker.
#[inline]
fn open_prefix_suffix_len(text: &str) -> usize {
    let tail_start = text.len().saturating_sub(TOOL_CALL_OPEN.len() - 1);
    let Some(rel_lt) = text.as_bytes()[tail_start..].iter().position(|&b| b == b'<') else {
        return 0;
    };
    let mut start = tail_start + rel_lt;
    while start < text.len() {
        let candidate = &text.as_bytes()[start..];
        if TOOL_CALL_OPEN.as_bytes().starts_with(candidate) {
            return text.len() - start;
        }
        start += 1;
    }
    0
}

/// Counters reported when a transcoded stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    pub lines_in: u64,
    pub lines_out: u64,
    pub tool_calls: u64,
    pub parse_failures: u64,
    pub overflows: u64,
}

/// Per-stream buffering state.
#[derive(Debug, Default)]
pub struct TranscoderState {
    buffer: String,
    buffering: bool,
    /// Trailing passthrough text that may be the start of an open marker.
    held: String,
    template: EnvelopeTemplate,
    call_index: u32,
}

impl TranscoderState {
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Index the next flushed tool call will get.
    #[must_use]
    pub fn call_index(&self) -> u32 {
        self.call_index
    }

    fn take_buffer(&mut self) -> String {
        self.buffering = false;
        std::mem::take(&mut self.buffer)
    }

    /// Everything not yet written out: the open span, or held-back text.
    fn take_unsent(&mut self) -> String {
        if self.buffering {
            self.take_buffer()
        } else {
            std::mem::take(&mut self.held)
        }
    }
}

/// Rewrites `<tool_call>` markup in streamed content into structured
/// tool-call events, one input line at a time.
///
/// Every content-bearing input event produces at least one output event:
/// while a span is being buffered, empty-content placeholders keep the
/// client's progress cadence. Lines the transcoder does not need to touch
/// are forwarded byte for byte.
pub struct StreamTranscoder {
    state: TranscoderState,
    max_buffer_bytes: usize,
    done: bool,
    stats: TranscodeStats,
}

impl Default for StreamTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER)
    }
}

impl StreamTranscoder {
    #[must_use]
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            state: TranscoderState::default(),
            max_buffer_bytes,
            done: false,
            stats: TranscodeStats::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &TranscoderState {
        &self.state
    }

    #[must_use]
    pub fn stats(&self) -> &TranscodeStats {
        &self.stats
    }

    /// True once the `[DONE]` sentinel has been seen.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Transform one input line into output lines.
    pub fn transform_line(&mut self, line: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.transform_line_into(line, &mut out);
        out
    }

    /// Transform one input line, appending output lines to `out`.
    pub fn transform_line_into(&mut self, line: &str, out: &mut Vec<String>) {
        let before = out.len();
        self.stats.lines_in += 1;

        if self.done {
            out.push(line.to_string());
        } else {
            match classify_line(line) {
                LineKind::Blank | LineKind::Other => out.push(line.to_string()),
                LineKind::Done => {
                    self.drain_buffer(out);
                    if out.len() > before {
                        out.push(String::new());
                    }
                    out.push(line.to_string());
                    self.done = true;
                }
                LineKind::Data(payload) => match decode_envelope(payload) {
                    Ok(envelope) => self.on_envelope(line, envelope, out),
                    Err(err) => {
                        tracing::debug!(error = %err, "forwarding undecodable event line");
                        out.push(line.to_string());
                    }
                },
            }
        }

        self.stats.lines_out += (out.len() - before) as u64;
    }

    /// Drain state at end of input.
    pub fn finish(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        self.finish_into(&mut out);
        out
    }

    /// Drain state at end of input into `out`.
    ///
    /// An unterminated span is emitted as ordinary content so nothing the
    /// model wrote is lost when the upstream ends without a sentinel.
    pub fn finish_into(&mut self, out: &mut Vec<String>) {
        let before = out.len();
        if !self.done {
            self.drain_buffer(out);
        }
        self.stats.lines_out += (out.len() - before) as u64;
    }

    fn drain_buffer(&mut self, out: &mut Vec<String>) {
        if self.state.buffering {
            tracing::warn!(
                buffered_bytes = self.state.buffer.len(),
                "stream ended inside a tool call; emitting it as content"
            );
        }
        let text = self.state.take_unsent();
        if text.is_empty() {
            return;
        }
        let envelope = text_envelope(&self.state.template, &text);
        let turn_start = out.len();
        emit(&envelope, out, turn_start);
    }

    fn on_envelope(&mut self, line: &str, envelope: Envelope, out: &mut Vec<String>) {
        let Some(choice) = envelope.first_choice() else {
            out.push(line.to_string());
            return;
        };
        self.state.template.observe(&envelope);

        let content = choice.delta.content.as_deref().unwrap_or_default();
        if !self.state.buffering
            && self.state.held.is_empty()
            && find_open(content).is_none()
            && open_prefix_suffix_len(content) == 0
        {
            out.push(line.to_string());
            return;
        }

        let finish_reason = choice.finish_reason.clone();
        let turn_start = out.len();
        let mut flushed_call = false;
        let mut rest = std::mem::take(&mut self.state.held);
        rest.push_str(content);

        loop {
            if self.state.buffering {
                let previous_len = self.state.buffer.len();
                self.state.buffer.push_str(&rest);
                rest.clear();

                if let Some(close_end) = find_close_end_since(&self.state.buffer, previous_len) {
                    rest = self.state.buffer.split_off(close_end);
                    flushed_call |= self.flush_invocation(out, turn_start);
                    continue;
                }
                if self.state.buffer.len() > self.max_buffer_bytes {
                    let text = self.state.take_buffer();
                    self.stats.overflows += 1;
                    tracing::warn!(
                        buffered_bytes = text.len(),
                        limit = self.max_buffer_bytes,
                        "tool call buffer overflow; emitting it as content"
                    );
                    emit(&content_envelope(&envelope, &text, None), out, turn_start);
                }
                break;
            }

            match find_open(&rest) {
                Some(pos) => {
                    if pos > 0 {
                        emit(&content_envelope(&envelope, &rest[..pos], None), out, turn_start);
                    }
                    rest.drain(..pos);
                    self.state.buffering = true;
                }
                None => {
                    let ready = rest.len() - open_prefix_suffix_len(&rest);
                    if ready > 0 {
                        emit(&content_envelope(&envelope, &rest[..ready], None), out, turn_start);
                    }
                    self.state.held = rest.split_off(ready);
                    break;
                }
            }
        }

        if let Some(reason) = finish_reason {
            if self.state.buffering {
                tracing::warn!(
                    buffered_bytes = self.state.buffer.len(),
                    finish_reason = %reason,
                    "turn finished inside a tool call; emitting it as content"
                );
            }
            let text = self.state.take_unsent();
            if !flushed_call || !text.is_empty() {
                emit(&content_envelope(&envelope, &text, Some(reason)), out, turn_start);
            }
        }

        if out.len() == turn_start {
            emit(&placeholder_envelope(&self.state.template), out, turn_start);
        }
    }

    /// Flush the buffered span; returns whether it became a tool call.
    fn flush_invocation(&mut self, out: &mut Vec<String>, turn_start: usize) -> bool {
        let span = self.state.take_buffer();
        match parse_invocation(&span) {
            Ok(invocation) => {
                let template = &self.state.template;
                tracing::debug!(
                    name = %invocation.name,
                    args = invocation.args.len(),
                    index = self.state.call_index,
                    "rewrote tool call"
                );
                emit(
                    &tool_call_envelope(template, &invocation, self.state.call_index),
                    out,
                    turn_start,
                );
                emit(&finish_envelope(template), out, turn_start);
                self.state.call_index += 1;
                self.stats.tool_calls += 1;
                true
            }
            Err(err) => {
                self.stats.parse_failures += 1;
                tracing::warn!(error = %err, span_bytes = span.len(), "emitting unparsable tool call as content");
                emit(&text_envelope(&self.state.template, &span), out, turn_start);
                false
            }
        }
    }
}

/// Append an encoded envelope; events after the first in a turn get a blank
/// separator line so each one is its own frame.
fn emit(envelope: &Envelope, out: &mut Vec<String>, turn_start: usize) {
    match encode_envelope_line(envelope) {
        Ok(line) => {
            if out.len() > turn_start {
                out.push(String::new());
            }
            out.push(line);
        }
        Err(err) => tracing::error!(error = %err, "failed to encode event"),
    }
}
