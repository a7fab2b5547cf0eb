//! Recursive payload scrubbing for client-bound upstream events.
//!
//! Upstream payloads can embed transport internals (connection headers,
//! authorization material, socket state) that must never reach a client.
//! `sanitize_payload` walks a deep copy of the payload and strips the
//! known-sensitive key set plus any string value equal to the service
//! credential. The walk is shape-agnostic: the same code path covers any
//! nesting of objects, arrays, and scalars, and it cannot fail — at the
//! depth cap the remaining subtree is dropped instead.

use serde_json::{Map, Value};
use tracing::warn;

/// Keys stripped (case-insensitively) from every sanitized event.
const SENSITIVE_KEYS: &[&str] = &[
    "headers",
    "authorization",
    "auth",
    "api_key",
    "apikey",
    "token",
    "credential",
    "credentials",
    "secret",
    "cookie",
    "ssl",
    "tls",
    "socket",
    "_socket",
    "connection",
    "request",
];

/// Placeholder left where a credential value appeared outside an object
/// entry (object entries are removed outright).
const REDACTED: &str = "[redacted]";

/// Beyond this depth the subtree is dropped rather than walked further.
const MAX_DEPTH: usize = 64;

pub fn sanitize_payload(payload: &Value, credential: &str) -> Value {
    scrub(payload, credential, 0)
}

fn scrub(value: &Value, credential: &str, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        warn!("payload nesting exceeds sanitization depth cap, subtree dropped");
        return Value::Null;
    }

    match value {
        Value::Object(map) => {
            let mut clean = Map::with_capacity(map.len());
            for (key, child) in map {
                if is_sensitive_key(key) {
                    continue;
                }
                if child.as_str() == Some(credential) {
                    continue;
                }
                clean.insert(key.clone(), scrub(child, credential, depth + 1));
            }
            Value::Object(clean)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| {
                    if item.as_str() == Some(credential) {
                        Value::String(REDACTED.to_string())
                    } else {
                        scrub(item, credential, depth + 1)
                    }
                })
                .collect(),
        ),
        Value::String(s) if s == credential => Value::String(REDACTED.to_string()),
        other => other.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEYS
        .iter()
        .any(|sensitive| key.eq_ignore_ascii_case(sensitive))
}
