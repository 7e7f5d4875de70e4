//! Parser for the `<tool_call>` invocation micro-language.
//!
//! Some models stream tool invocations as plain content in this shape:
//!
//! ```text
//! <tool_call>NAME<arg_key>KEY</arg_key><arg_value>VALUE</arg_value>...</tool_call>
//! ```
//!
//! Parsing is a sequential marker scan. Every closing marker matches its
//! nearest occurrence, so values may contain text that looks like other
//! markers as long as it is not the value's own closing marker.

use memchr::memmem;

use crate::error::RelayError;
use crate::util::push_json_string_escaped;

pub const TOOL_CALL_OPEN: &str = "<tool_call>";
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";
pub const ARG_KEY_OPEN: &str = "<arg_key>";
pub const ARG_KEY_CLOSE: &str = "</arg_key>";
pub const ARG_VALUE_OPEN: &str = "<arg_value>";
pub const ARG_VALUE_CLOSE: &str = "</arg_value>";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One `<arg_key>`/`<arg_value>` pair, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationArg {
    pub key: String,
    pub value: String,
}

/// A parsed invocation span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInvocation {
    pub name: String,
    /// Pairs as written; duplicate keys are kept here.
    pub args: Vec<InvocationArg>,
}

impl ParsedInvocation {
    /// Canonical argument object as a JSON string.
    #[must_use]
    pub fn arguments_json(&self) -> String {
        arguments_json(&self.args)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[inline]
fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    memmem::find(&haystack.as_bytes()[from..], needle.as_bytes()).map(|rel| from + rel)
}

/// Parse a buffered invocation span.
///
/// The outer `<tool_call>` / `</tool_call>` markers are optional so callers
/// can pass either the full span or its body.
///
/// # Errors
///
/// Returns [`RelayError::InvocationParse`] when the body is empty, the name
/// is empty, or an argument pair is not closed properly.
pub fn parse_invocation(span: &str) -> Result<ParsedInvocation, RelayError> {
    let body = span.trim();
    let body = body.strip_prefix(TOOL_CALL_OPEN).unwrap_or(body);
    let body = body.strip_suffix(TOOL_CALL_CLOSE).unwrap_or(body);
    if body.trim().is_empty() {
        return Err(RelayError::InvocationParse("empty tool call".into()));
    }

    let first_key = find_from(body, ARG_KEY_OPEN, 0);
    let name = body[..first_key.unwrap_or(body.len())].trim();
    if name.is_empty() {
        return Err(RelayError::InvocationParse(
            "tool call has empty name".into(),
        ));
    }

    let mut args = Vec::new();
    let mut cursor = first_key;
    while let Some(key_open) = cursor {
        let key_start = key_open + ARG_KEY_OPEN.len();
        let key_end = find_from(body, ARG_KEY_CLOSE, key_start).ok_or_else(|| {
            RelayError::InvocationParse(format!("unterminated {ARG_KEY_OPEN} in '{name}'"))
        })?;
        let key = body[key_start..key_end].trim();

        let after_key = key_end + ARG_KEY_CLOSE.len();
        let value_open = body.len() - body[after_key..].trim_start().len();
        if !body[value_open..].starts_with(ARG_VALUE_OPEN) {
            return Err(RelayError::InvocationParse(format!(
                "argument '{key}' of '{name}' has no {ARG_VALUE_OPEN}"
            )));
        }
        let value_start = value_open + ARG_VALUE_OPEN.len();
        let value_end = find_from(body, ARG_VALUE_CLOSE, value_start).ok_or_else(|| {
            RelayError::InvocationParse(format!(
                "unterminated {ARG_VALUE_OPEN} for argument '{key}' of '{name}'"
            ))
        })?;

        args.push(InvocationArg {
            key: key.to_string(),
            value: body[value_start..value_end].to_string(),
        });
        cursor = find_from(body, ARG_KEY_OPEN, value_end + ARG_VALUE_CLOSE.len());
    }

    Ok(ParsedInvocation {
        name: name.to_string(),
        args,
    })
}

/// Serialize pairs as a JSON object of string values.
///
/// Keys keep the position of their first occurrence; a repeated key takes
/// the last value written for it.
#[must_use]
pub fn arguments_json(args: &[InvocationArg]) -> String {
    let mut merged: Vec<(&str, &str)> = Vec::with_capacity(args.len());
    for arg in args {
        if let Some(slot) = merged.iter_mut().find(|(key, _)| *key == arg.key) {
            slot.1 = arg.value.as_str();
        } else {
            merged.push((arg.key.as_str(), arg.value.as_str()));
        }
    }

    let payload_len: usize = merged.iter().map(|(k, v)| k.len() + v.len() + 6).sum();
    let mut out = String::with_capacity(2 + payload_len);
    out.push('{');
    for (i, (key, value)) in merged.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_json_string_escaped(&mut out, key);
        out.push(':');
        push_json_string_escaped(&mut out, value);
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(key: &str, value: &str) -> InvocationArg {
        InvocationArg {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn parses_two_args() {
        let parsed = parse_invocation(
            "<tool_call>grep<arg_key>include</arg_key><arg_value>*.go</arg_value><arg_key>pattern</arg_key><arg_value>chat.*template</arg_value></tool_call>",
        )
        .unwrap();
        assert_eq!(parsed.name, "grep");
        assert_eq!(
            parsed.args,
            vec![arg("include", "*.go"), arg("pattern", "chat.*template")]
        );
    }

    #[test]
    fn parses_name_only() {
        let parsed = parse_invocation("<tool_call>list_files</tool_call>").unwrap();
        assert_eq!(parsed.name, "list_files");
        assert!(parsed.args.is_empty());
        assert_eq!(parsed.arguments_json(), "{}");
    }

    #[test]
    fn empty_body_is_error() {
        assert!(matches!(
            parse_invocation("<tool_call></tool_call>"),
            Err(RelayError::InvocationParse(_))
        ));
        assert!(parse_invocation("<tool_call> \n </tool_call>").is_err());
    }

    #[test]
    fn empty_name_is_error() {
        let err = parse_invocation(
            "<tool_call><arg_key>k</arg_key><arg_value>v</arg_value></tool_call>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn name_and_keys_are_trimmed_values_are_not() {
        let parsed = parse_invocation(
            "<tool_call>\n  write_file \n<arg_key> path </arg_key>\n<arg_value>  a.txt\n</arg_value></tool_call>",
        )
        .unwrap();
        assert_eq!(parsed.name, "write_file");
        assert_eq!(parsed.args, vec![arg("path", "  a.txt\n")]);
    }

    #[test]
    fn value_may_contain_other_markers() {
        let parsed = parse_invocation(
            "<tool_call>echo<arg_key>text</arg_key><arg_value>see <arg_key>x</arg_key> and </tool_call> here</arg_value></tool_call>",
        )
        .unwrap();
        assert_eq!(
            parsed.args,
            vec![arg("text", "see <arg_key>x</arg_key> and </tool_call> here")]
        );
    }

    #[test]
    fn special_characters_survive() {
        let parsed = parse_invocation(
            "<tool_call>grep<arg_key>pattern</arg_key><arg_value>chat.*template|ChatTemplate|\"q\"\\n</arg_value></tool_call>",
        )
        .unwrap();
        let json: serde_json::Value = serde_json::from_str(&parsed.arguments_json()).unwrap();
        assert_eq!(json["pattern"], "chat.*template|ChatTemplate|\"q\"\\n");
    }

    #[test]
    fn unterminated_key_is_error() {
        assert!(parse_invocation("<tool_call>f<arg_key>k<arg_value>v</arg_value></tool_call>").is_err());
    }

    #[test]
    fn key_without_value_is_error() {
        assert!(parse_invocation("<tool_call>f<arg_key>k</arg_key>dangling</tool_call>").is_err());
    }

    #[test]
    fn unterminated_value_is_error() {
        assert!(parse_invocation("<tool_call>f<arg_key>k</arg_key><arg_value>v</tool_call>").is_err());
    }

    #[test]
    fn whitespace_between_key_and_value_is_allowed() {
        let parsed =
            parse_invocation("<tool_call>f<arg_key>k</arg_key>\n  <arg_value>v</arg_value></tool_call>")
                .unwrap();
        assert_eq!(parsed.args, vec![arg("k", "v")]);
    }

    #[test]
    fn body_without_outer_markers() {
        let parsed = parse_invocation("view<arg_key>file_path</arg_key><arg_value>/a.rs</arg_value>").unwrap();
        assert_eq!(parsed.name, "view");
        assert_eq!(parsed.args, vec![arg("file_path", "/a.rs")]);
    }

    #[test]
    fn duplicate_keys_last_write_wins_in_first_position() {
        let json = arguments_json(&[arg("a", "1"), arg("b", "2"), arg("a", "3")]);
        assert_eq!(json, r#"{"a":"3","b":"2"}"#);
    }

    #[test]
    fn arguments_keep_insertion_order() {
        let json = arguments_json(&[arg("zeta", "1"), arg("alpha", "2")]);
        assert_eq!(json, r#"{"zeta":"1","alpha":"2"}"#);
    }

    #[test]
    fn arguments_json_is_valid_json_with_escapes() {
        let json = arguments_json(&[arg("content", "line1\nline2\t\"quoted\"")]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["content"], "line1\nline2\t\"quoted\"");
    }
}
