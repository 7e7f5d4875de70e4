//! Builders for the envelopes the transcoder writes on its own behalf.

use super::envelope::{
    Choice, Delta, Envelope, ToolCallEvent, ToolCallFunction, FINISH_REASON_TOOL_CALLS,
    TOOL_CALL_TYPE_FUNCTION,
};
use crate::fc::ParsedInvocation;
use crate::util::next_call_id;

/// Metadata of the most recently observed upstream envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvelopeTemplate {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub stop_reason: Option<serde_json::Value>,
}

impl EnvelopeTemplate {
    /// Refresh from an envelope with at least one choice.
    pub fn observe(&mut self, envelope: &Envelope) {
        self.id.clone_from(&envelope.id);
        self.object.clone_from(&envelope.object);
        self.created = envelope.created;
        self.model.clone_from(&envelope.model);
        self.stop_reason = envelope
            .first_choice()
            .and_then(|choice| choice.stop_reason.clone());
    }

    fn envelope(&self, choice: Choice) -> Envelope {
        Envelope {
            id: self.id.clone(),
            object: self.object.clone(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![choice],
            usage: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Copy of `source` whose first choice carries `text` as content.
///
/// `finish_reason` replaces the source's; pass `None` for mid-turn text.
#[must_use]
pub fn content_envelope(source: &Envelope, text: &str, finish_reason: Option<String>) -> Envelope {
    let mut envelope = source.clone();
    if let Some(choice) = envelope.first_choice_mut() {
        choice.delta.content = Some(text.to_string());
        choice.delta.tool_calls.clear();
        if finish_reason.is_none() {
            choice.stop_reason = None;
        }
        choice.finish_reason = finish_reason;
    }
    envelope
}

/// Plain content event built from the template alone.
#[must_use]
pub fn text_envelope(template: &EnvelopeTemplate, text: &str) -> Envelope {
    template.envelope(Choice {
        delta: Delta {
            content: Some(text.to_string()),
            ..Delta::default()
        },
        ..Choice::default()
    })
}

/// Empty-content event that keeps the client's event cadence while a span
/// is being buffered.
#[must_use]
pub fn placeholder_envelope(template: &EnvelopeTemplate) -> Envelope {
    text_envelope(template, "")
}

/// Event carrying exactly one complete tool call.
#[must_use]
pub fn tool_call_envelope(
    template: &EnvelopeTemplate,
    invocation: &ParsedInvocation,
    call_index: u32,
) -> Envelope {
    template.envelope(Choice {
        delta: Delta {
            tool_calls: vec![ToolCallEvent {
                id: next_call_id(),
                type_: TOOL_CALL_TYPE_FUNCTION.to_string(),
                index: call_index,
                function: ToolCallFunction {
                    name: invocation.name.clone(),
                    arguments: invocation.arguments_json(),
                },
            }],
            ..Delta::default()
        },
        ..Choice::default()
    })
}

/// Closing event of a turn that ended in a tool call.
#[must_use]
pub fn finish_envelope(template: &EnvelopeTemplate) -> Envelope {
    template.envelope(Choice {
        finish_reason: Some(FINISH_REASON_TOOL_CALLS.to_string()),
        stop_reason: template.stop_reason.clone(),
        ..Choice::default()
    })
}
