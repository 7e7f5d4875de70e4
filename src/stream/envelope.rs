//! Chat-completion chunk envelope carried by one `data:` line.
//!
//! Field order mirrors what OpenAI-compatible servers (vLLM, SGLang) emit so
//! a decoded line re-encodes to the same shape. Unknown fields are kept in
//! the `extra` maps and written back after the known ones.

use serde::{Deserialize, Deserializer, Serialize};

/// `finish_reason` announcing that the turn ended in tool calls.
pub const FINISH_REASON_TOOL_CALLS: &str = "tool_calls";
/// `type` tag of every synthesized tool call.
pub const TOOL_CALL_TYPE_FUNCTION: &str = "function";

/// Keep an explicit `null` distinguishable from an absent field.
fn present_value<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

/// One streaming chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A choice within a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub logprobs: Option<serde_json::Value>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// vLLM reports the matched stop token or string here; it may be an
    /// integer, a string or `null`, and is often absent.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_reason: Option<serde_json::Value>,
    #[serde(default)]
    pub token_ids: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Delta content within a choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallEvent>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A complete tool call in a single delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub index: u32,
    pub function: ToolCallFunction,
}

/// Function part of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON object serialized as a string.
    pub arguments: String,
}

/// Token accounting block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    /// The first choice, which carries everything this relay looks at.
    #[must_use]
    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }

    #[must_use]
    pub fn first_choice_mut(&mut self) -> Option<&mut Choice> {
        self.choices.first_mut()
    }
}

/// Decode an envelope from a `data:` payload.
///
/// # Errors
///
/// Returns the serde error when the payload is not a chunk object; callers
/// forward the line unchanged in that case.
pub fn decode_envelope(payload: &str) -> Result<Envelope, serde_json::Error> {
    serde_json::from_str(payload)
}

/// Encode an envelope as a `data:` line (without trailing newline).
///
/// # Errors
///
/// Returns the serde error if serialization fails.
pub fn encode_envelope_line(envelope: &Envelope) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(envelope)?;
    let mut out = String::with_capacity(6 + json.len());
    out.push_str("data: ");
    out.push_str(&json);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_LINE: &str = r#"{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1234567890,"model":"glm-4.6","choices":[{"index":0,"delta":{"content":"Hello","reasoning_content":null},"logprobs":null,"finish_reason":null,"token_ids":null}]}"#;

    #[test]
    fn canonical_line_round_trips_byte_for_byte() {
        let envelope = decode_envelope(CONTENT_LINE).unwrap();
        assert_eq!(
            encode_envelope_line(&envelope).unwrap(),
            format!("data: {CONTENT_LINE}")
        );
    }

    #[test]
    fn finish_line_with_stop_reason_round_trips() {
        let line = r#"{"id":"chatcmpl-1","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"","reasoning_content":null},"logprobs":null,"finish_reason":"stop","stop_reason":151336,"token_ids":null}]}"#;
        let envelope = decode_envelope(line).unwrap();
        assert_eq!(
            envelope.choices[0].stop_reason,
            Some(serde_json::json!(151_336))
        );
        assert_eq!(encode_envelope_line(&envelope).unwrap(), format!("data: {line}"));
    }

    #[test]
    fn explicit_null_stop_reason_is_kept() {
        let line = r#"{"id":"x","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"a","reasoning_content":null},"logprobs":null,"finish_reason":null,"stop_reason":null,"token_ids":null}]}"#;
        let envelope = decode_envelope(line).unwrap();
        assert_eq!(envelope.choices[0].stop_reason, Some(serde_json::Value::Null));
        assert_eq!(encode_envelope_line(&envelope).unwrap(), format!("data: {line}"));
    }

    #[test]
    fn usage_only_chunk_round_trips() {
        let line = r#"{"id":"x","object":"chat.completion.chunk","created":1,"model":"m","choices":[],"usage":{"prompt_tokens":10,"total_tokens":15,"completion_tokens":5}}"#;
        let envelope = decode_envelope(line).unwrap();
        assert!(envelope.choices.is_empty());
        assert_eq!(envelope.usage.as_ref().map(|u| u.total_tokens), Some(15));
        assert_eq!(encode_envelope_line(&envelope).unwrap(), format!("data: {line}"));
    }

    #[test]
    fn unknown_fields_are_retained() {
        let line = r#"{"id":"x","object":"chat.completion.chunk","created":1,"model":"m","choices":[{"index":0,"delta":{"content":"a","reasoning_content":null,"vendor":1},"logprobs":null,"finish_reason":null,"token_ids":null,"matched":"y"}],"system_fingerprint":"fp"}"#;
        let envelope = decode_envelope(line).unwrap();
        assert_eq!(envelope.extra["system_fingerprint"], "fp");
        assert_eq!(envelope.choices[0].extra["matched"], "y");
        assert_eq!(envelope.choices[0].delta.extra["vendor"], 1);
        assert_eq!(encode_envelope_line(&envelope).unwrap(), format!("data: {line}"));
    }

    #[test]
    fn tool_calls_encode_in_openai_shape() {
        let envelope = Envelope {
            id: "x".into(),
            object: "chat.completion.chunk".into(),
            created: 1,
            model: "m".into(),
            choices: vec![Choice {
                delta: Delta {
                    tool_calls: vec![ToolCallEvent {
                        id: "chatcmpl-tool-1".into(),
                        type_: TOOL_CALL_TYPE_FUNCTION.into(),
                        index: 0,
                        function: ToolCallFunction {
                            name: "grep".into(),
                            arguments: r#"{"pattern":"test"}"#.into(),
                        },
                    }],
                    ..Delta::default()
                },
                ..Choice::default()
            }],
            ..Envelope::default()
        };
        let line = encode_envelope_line(&envelope).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(line.strip_prefix("data: ").unwrap()).unwrap();
        let call = &json["choices"][0]["delta"]["tool_calls"][0];
        assert_eq!(call["type"], "function");
        assert_eq!(call["function"]["name"], "grep");
        assert_eq!(call["function"]["arguments"], r#"{"pattern":"test"}"#);
        assert!(json["choices"][0]["delta"]["content"].is_null());
    }

    #[test]
    fn non_object_payload_fails_to_decode() {
        assert!(decode_envelope("[1,2]").is_err());
        assert!(decode_envelope("not json").is_err());
    }
}
