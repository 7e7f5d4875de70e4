use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

const HEX: &[u8; 16] = b"0123456789abcdef";
const CALL_ID_PREFIX: &str = "chatcmpl-tool-";

static CALL_ID_SEED: LazyLock<u128> = LazyLock::new(|| {
    let seed_hi = u128::from(fastrand::u64(..));
    let seed_lo = u128::from(fastrand::u64(..));
    (seed_hi << 64) | seed_lo
});
static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Fresh tool-call id: a fixed prefix plus 32 hex digits.
///
/// The suffix is a per-process random seed XOR a monotonic counter, so ids
/// never repeat within the process and do not look sequential across runs.
#[inline]
pub(crate) fn next_call_id() -> String {
    let seq = CALL_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let id = uuid::Uuid::from_u128(*CALL_ID_SEED ^ u128::from(seq));
    let mut out = String::with_capacity(CALL_ID_PREFIX.len() + 32);
    out.push_str(CALL_ID_PREFIX);
    out.push_str(id.simple().encode_lower(&mut uuid::Uuid::encode_buffer()));
    out
}

#[inline]
pub(crate) fn push_json_string_escaped(out: &mut String, value: &str) {
    let bytes = value.as_bytes();
    if bytes.iter().all(|&b| b >= 0x20 && b != b'"' && b != b'\\') {
        out.push('"');
        out.push_str(value);
        out.push('"');
        return;
    }

    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c <= '\u{1f}' => {
                let control = c as u8;
                out.push_str("\\u00");
                out.push(char::from(HEX[(control >> 4) as usize]));
                out.push(char::from(HEX[(control & 0x0f) as usize]));
            }
            _ => out.push(ch),
        }
    }
    out.push('"');
}
