//! Masks credentials and email addresses in event payloads.
//!
//! Applied once, before an event is committed, so the log, the recorder and
//! live subscribers only ever see the masked payload.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use sentinel_protocol::McpEvent;
use serde_json::Value;

const MASK: &str = "***";
const KEPT_PREFIX: usize = 8;

static API_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:api[_-]?key|apikey|access[_-]?token|secret[_-]?key)\s*[:=]\s*["']?[a-zA-Z0-9_\-]{32,}["']?"#,
    )
    .expect("api key pattern compiles")
});

static SK_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sk-[a-zA-Z0-9]{32,}").expect("sk key pattern compiles"));

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[\w.-]+@[\w.-]+\.\w+\b").expect("email pattern compiles")
});

static BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:token|bearer)\s*[:=]\s*["']?[a-zA-Z0-9_\-.]{20,}["']?"#)
        .expect("bearer pattern compiles")
});

fn keep_prefix(caps: &Captures<'_>) -> String {
    let prefix: String = caps[0].chars().take(KEPT_PREFIX).collect();
    format!("{prefix}{MASK}")
}

fn mask_email(caps: &Captures<'_>) -> String {
    let email = &caps[0];
    let local = email.split('@').next().unwrap_or_default();
    let prefix: String = local.chars().take(3).collect();
    format!("{prefix}{MASK}@{MASK}")
}

/// Masked copy of `text`, or `None` when nothing matched.
pub fn redact_str(text: &str) -> Option<String> {
    let masked = API_KEY.replace_all(text, keep_prefix);
    let masked = SK_KEY.replace_all(&masked, keep_prefix);
    let masked = EMAIL.replace_all(&masked, mask_email);
    let masked = BEARER.replace_all(&masked, keep_prefix);
    (masked != text).then(|| masked.into_owned())
}

/// Walks `value` and masks every string leaf. Returns the number of leaves
/// that changed.
pub fn redact_value(value: &mut Value) -> usize {
    match value {
        Value::String(text) => match redact_str(text) {
            Some(masked) => {
                *text = masked;
                1
            }
            None => 0,
        },
        Value::Array(items) => items.iter_mut().map(redact_value).sum(),
        Value::Object(fields) => fields.values_mut().map(redact_value).sum(),
        _ => 0,
    }
}

/// Masks the event's payload in place.
pub fn redact_event(event: &mut McpEvent) -> usize {
    event.payload.as_mut().map_or(0, redact_value)
}
