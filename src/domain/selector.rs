//! Selectors partition the cache by tenant and double as invalidation tags.

use std::fmt;

use super::error::SelectorError;

/// A validated tenant/namespace discriminator.
///
/// Only ASCII alphanumerics and `-`, `_`, `+`, `.` are accepted. Since `/` is
/// never part of a selector, the boundary between selector and request path in
/// a [`CacheKey`] is always unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector(String);

impl Selector {
    pub fn parse(raw: &str) -> Result<Self, SelectorError> {
        if raw.is_empty() {
            return Err(SelectorError::Empty);
        }

        if let Some(character) = raw.chars().find(|c| !is_selector_char(*c)) {
            return Err(SelectorError::InvalidCharacter { character });
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the cache key for a request path served under this selector.
    pub fn cache_key(&self, path: &str) -> CacheKey {
        CacheKey::new(self, path)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Selector {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_selector_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.')
}

/// Key under which a cached entry is stored: `/` + selector + path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(selector: &Selector, path: &str) -> Self {
        let mut key = String::with_capacity(1 + selector.0.len() + path.len());
        key.push('/');
        key.push_str(selector.as_str());
        key.push_str(path);
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key used against the object store: the cache key minus one trailing `/`.
    pub fn lookup_key(&self) -> String {
        self.0.strip_suffix('/').unwrap_or(&self.0).to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A path looks like a directory when its last segment has no extension-like dot.
pub fn is_directory_candidate(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    !last_segment.contains('.')
}
