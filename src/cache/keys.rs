//! Cache key derivation.
//!
//! A key is `prefix + sanitize(request-uri)`, where the request URI is the
//! path plus the query string when one is present. Sanitizing replaces every
//! character outside `[A-Za-z0-9]` with `_` so keys stay valid for any store.
//! Methods other than GET put their name between prefix and URI; a sanitized
//! URI always starts with `_`, so those keys never meet a GET key.

use std::fmt;

use axum::http::{Method, Uri};

/// Placeholder written in place of any character a store might reject.
const REPLACEMENT: char = '_';

/// A derived cache key. Only lives for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Namespaced key derivation for one caching filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStrategy {
    prefix: String,
}

impl KeyStrategy {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the key for a request. Scheme and authority are ignored so a
    /// request reaches the same entry whatever host name it came in on.
    pub fn compute(&self, method: &Method, uri: &Uri) -> CacheKey {
        let path = uri.path();
        let query = uri.query();
        let tag = if *method == Method::GET {
            ""
        } else {
            method.as_str()
        };

        let mut key = String::with_capacity(
            self.prefix.len() + tag.len() + path.len() + query.map_or(0, |q| q.len() + 1),
        );
        key.push_str(&self.prefix);
        push_sanitized(&mut key, tag);
        push_sanitized(&mut key, path);
        if let Some(query) = query {
            key.push(REPLACEMENT);
            push_sanitized(&mut key, query);
        }
        CacheKey(key)
    }

    /// Pattern matching every key in this namespace.
    pub fn namespace_pattern(&self) -> String {
        format!("{}*", self.prefix)
    }
}

fn push_sanitized(out: &mut String, raw: &str) {
    out.extend(raw.chars().map(|ch| {
        if ch.is_ascii_alphanumeric() {
            ch
        } else {
            REPLACEMENT
        }
    }));
}

/// Apply the key sanitizing rule to an arbitrary string.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    push_sanitized(&mut out, raw);
    out
}
