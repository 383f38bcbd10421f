//! Content-addressed cache keys.
//!
//! A fingerprint is the SHA-256 digest of the canonical form of
//! `{"body": <body>, "endpoint": <endpoint>}`. Canonicalization sorts object
//! keys recursively, so two bodies that differ only in key insertion order
//! derive the same key.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursion bound for canonical serialization. Nodes beyond this depth are
/// replaced with [`CYCLE_SENTINEL`] so derivation terminates for any shape.
const MAX_CANONICAL_DEPTH: usize = 128;

const CYCLE_SENTINEL: &str = "[Circular]";

/// Derive the cache fingerprint for an (endpoint, request body) pair.
///
/// The output is a 64-character lowercase hex string, safe to use as a file
/// name and as a SQL key. Derivation is total: it never fails, whatever the
/// shape of `body`.
pub fn fingerprint(endpoint: &str, body: &Value) -> String {
    let mut canonical = String::new();
    canonical.push_str("{\"body\":");
    write_canonical(body, 0, &mut canonical);
    canonical.push_str(",\"endpoint\":");
    write_string(endpoint, &mut canonical);
    canonical.push('}');

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, depth: usize, out: &mut String) {
    if depth >= MAX_CANONICAL_DEPTH {
        write_string(CYCLE_SENTINEL, out);
        return;
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, depth + 1, out);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();

            out.push('{');
            for (index, key) in keys.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                // Object lookup cannot miss: keys came from this map.
                if let Some(field) = fields.get(key.as_str()) {
                    write_canonical(field, depth + 1, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            control if control < '\u{20}' => {
                out.push_str(&format!("\\u{:04x}", control as u32));
            }
            other => out.push(other),
        }
    }
    out.push('"');
}
