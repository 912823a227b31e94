//! Deterministic names for external resources
//!
//! Providers find their resources again by name, so every name here is a
//! pure function of the request.

use chrono::{DateTime, Utc};

/// Longest identifier accepted by every supported backend
pub const DEFAULT_IDENTIFIER_LENGTH: usize = 40;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Build `<prefix>-<name>`, lowercased, restricted to `[a-z0-9-]`,
/// starting with a letter and at most `max_len` characters.
pub fn infra_name(prefix: &str, name: &str, max_len: usize) -> String {
    let raw = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}-{}", prefix, name)
    };
    let mut sanitized = sanitize(&raw);
    if !sanitized.starts_with(|c: char| c.is_ascii_lowercase()) {
        sanitized.insert(0, 'r');
    }
    truncate(&sanitized, max_len)
}

/// Like [`infra_name`] with the creation timestamp appended.
///
/// The timestamp is never truncated away, so two snapshots of the same
/// request taken at different times keep distinct names.
pub fn timestamped_infra_name(
    prefix: &str,
    name: &str,
    created_at: DateTime<Utc>,
    max_len: usize,
) -> String {
    let stamp = created_at.format(TIMESTAMP_FORMAT).to_string();
    let base_len = max_len.saturating_sub(stamp.len() + 1).max(1);
    let base = infra_name(prefix, name, base_len);
    format!("{}-{}", base, stamp)
}

fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = false;
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

fn truncate(name: &str, max_len: usize) -> String {
    let cut: String = name.chars().take(max_len).collect();
    cut.trim_end_matches('-').to_string()
}
