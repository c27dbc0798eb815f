//! Outbound header handling for the HTTP forwarding hooks.
//!
//! Values are sanitized before they can reach an upstream: CR/LF are
//! stripped, values are capped at 4 KiB, and names must match
//! `[A-Za-z0-9-]+`. When base-header overwrite is disabled, a plugin's
//! changes to existing headers are discarded and only additions survive.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum accepted header value length after sanitization
pub const MAX_HEADER_VALUE_LEN: usize = 4096;

/// An ordered, case-insensitive header map (names stored lowercase).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSet(BTreeMap<String, String>);

impl HeaderSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header if its name is valid; the value is sanitized.
    /// Returns false when the name was rejected.
    pub fn insert(&mut self, name: &str, value: &str) -> bool {
        if !is_valid_header_name(name) {
            return false;
        }
        self.0
            .insert(name.to_ascii_lowercase(), sanitize_header_value(value));
        true
    }

    /// Look up a header by name, case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Remove a header by name
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    /// Whether the header is present
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterate over `(name, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, value) in iter {
            set.insert(&name, &value);
        }
        set
    }
}

/// Strip CR/LF and truncate to [`MAX_HEADER_VALUE_LEN`].
pub fn sanitize_header_value(value: &str) -> String {
    let mut cleaned: String = value.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    if cleaned.len() > MAX_HEADER_VALUE_LEN {
        let mut cut = MAX_HEADER_VALUE_LEN;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
    }
    cleaned
}

fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Merge the header set a `http_pre_forwarding_call` hook returned with
/// the base set the gateway computed.
///
/// With `overwrite_allowed` the hook's set wins wholesale (still
/// sanitized). Without it, base headers are restored and only the hook's
/// additions are honored.
pub fn merge_hook_headers(
    base: &HeaderSet,
    from_hook: HeaderSet,
    overwrite_allowed: bool,
) -> HeaderSet {
    if overwrite_allowed {
        return from_hook;
    }
    let mut merged = base.clone();
    for (name, value) in from_hook.iter() {
        if !base.contains(name) {
            merged.insert(name, value);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn crlf_stripped_and_length_capped() {
        let value = sanitize_header_value("evil\r\nX-Injected: yes");
        assert!(!value.contains('\r') && !value.contains('\n'));
        assert_eq!(value, "evilX-Injected: yes");

        let long = "x".repeat(MAX_HEADER_VALUE_LEN + 100);
        assert_eq!(sanitize_header_value(&long).len(), MAX_HEADER_VALUE_LEN);
    }

    #[test]
    fn invalid_names_rejected() {
        let mut set = HeaderSet::new();
        assert!(!set.insert("X Tenant Id", "acme"));
        assert!(!set.insert("", "v"));
        assert!(set.insert("X-Tenant-Id", "acme"));
        assert_eq!(set.get("x-tenant-id"), Some("acme"));
    }

    #[test]
    fn base_headers_protected_without_overwrite() {
        let mut base = HeaderSet::new();
        base.insert("Authorization", "Bearer base");
        base.insert("Content-Type", "application/json");

        let mut hook = HeaderSet::new();
        hook.insert("Authorization", "Bearer stolen");
        hook.insert("X-Extra", "added");

        let merged = merge_hook_headers(&base, hook.clone(), false);
        assert_eq!(merged.get("authorization"), Some("Bearer base"));
        assert_eq!(merged.get("x-extra"), Some("added"));

        let overwritten = merge_hook_headers(&base, hook, true);
        assert_eq!(overwritten.get("authorization"), Some("Bearer stolen"));
        assert!(overwritten.get("content-type").is_none());
    }
}
