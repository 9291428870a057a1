//! Correlation keys for requests.
//!
//! Every normalized request carries a [`RequestKey`]. Requests that share a key
//! are routed into the same keyed response channel, so the key is the unit of
//! grouping and of replay.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `RequestKey` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid request key: {0}")]
pub struct ParseRequestKeyError(String);

/// Correlation key of a normalized request.
///
/// Defaults to the request's resource (its URL) unless the caller supplies an
/// explicit key. Grouping uses exact string equality; no URL canonicalization
/// happens here.
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `From::from()` and `new()`: No validation (for internal use with trusted input)
///
/// Normalization always produces non-empty keys.
///
/// # Examples
///
/// ```
/// use composable_fetch_core::key::RequestKey;
///
/// let key = RequestKey::new("http://api.test/users");
/// assert_eq!(key.as_str(), "http://api.test/users");
///
/// let parsed: RequestKey = "users".parse().unwrap();
/// assert_eq!(parsed, RequestKey::new("users"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    /// Create a new `RequestKey` from a string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the key into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestKey {
    type Err = ParseRequestKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseRequestKeyError("Request key cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for RequestKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RequestKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RequestKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for RequestKey {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RequestKey {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_key() {
        let key = RequestKey::new("r1");
        assert_eq!(key.as_str(), "r1");
    }

    #[test]
    fn from_string() {
        let key = RequestKey::from("r1");
        assert_eq!(key.as_str(), "r1");

        let key2 = RequestKey::from("r2".to_string());
        assert_eq!(key2.as_str(), "r2");
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if parse fails
    fn parse_from_str() {
        let key: RequestKey = "http://api.test/resource".parse().expect("parse should succeed");
        assert_eq!(key, RequestKey::new("http://api.test/resource"));
    }

    #[test]
    fn parse_empty_string_fails() {
        assert!("".parse::<RequestKey>().is_err());
    }

    #[test]
    fn compares_with_str() {
        let key = RequestKey::new("r1");
        assert_eq!(key, "r1");
        assert!(key != *"r2");
    }

    #[test]
    fn hash_lookup_by_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(RequestKey::new("r1"), 1);
        assert_eq!(map.get("r1"), Some(&1));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&RequestKey::new("r1")).unwrap();
        assert_eq!(json, "\"r1\"");
    }
}
