//! Cacheability policy: which requests may consult and populate the cache.

use std::collections::BTreeSet;

use axum::http::Method;
use regex::Regex;

/// Paths longer than this are never cached.
pub const MAX_CACHEABLE_PATH_LEN: usize = 2048;

/// Path filter for a caching filter.
#[derive(Debug, Clone, Default)]
pub enum PathPredicate {
    /// Every path is eligible.
    #[default]
    Any,
    /// The whole path must match the expression.
    Pattern(Regex),
}

impl PathPredicate {
    /// Compile `pattern` with full-match semantics.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(Self::Pattern)
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPredicate::Any => true,
            PathPredicate::Pattern(regex) => regex.is_match(path),
        }
    }
}

/// Decides per request whether the cache takes part in the exchange.
#[derive(Debug, Clone)]
pub struct CacheabilityPolicy {
    methods: BTreeSet<String>,
    path: PathPredicate,
}

impl Default for CacheabilityPolicy {
    fn default() -> Self {
        Self::new([Method::GET], PathPredicate::Any)
    }
}

impl CacheabilityPolicy {
    pub fn new(methods: impl IntoIterator<Item = Method>, path: PathPredicate) -> Self {
        Self {
            methods: methods
                .into_iter()
                .map(|method| method.as_str().to_string())
                .collect(),
            path,
        }
    }

    pub fn should_cache(&self, method: &Method, path: &str) -> bool {
        if !self.methods.contains(method.as_str()) {
            return false;
        }
        if !is_well_formed(path) {
            return false;
        }
        self.path.matches(path)
    }
}

fn is_well_formed(path: &str) -> bool {
    path.starts_with('/') && path.len() <= MAX_CACHEABLE_PATH_LEN
}
