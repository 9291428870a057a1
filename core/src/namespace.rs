//! Isolation namespaces.
//!
//! A [`Namespace`] is the ordered list of [`ScopeId`]s a request has been tagged
//! with by successive isolation wraps. It is copy-on-write: tagging returns a new
//! namespace and leaves the original untouched, so one base request can be
//! isolated into several independent scopes without aliasing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of one isolation scope.
///
/// # Examples
///
/// ```
/// use composable_fetch_core::namespace::ScopeId;
///
/// let scope = ScopeId::new("sidebar");
/// assert_eq!(scope.as_str(), "sidebar");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    /// Create a new scope identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the scope identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScopeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Ordered, immutable sequence of scopes attached to a request.
///
/// Clones share storage; [`Namespace::with_scope`] always allocates a fresh
/// sequence.
///
/// # Examples
///
/// ```
/// use composable_fetch_core::namespace::{Namespace, ScopeId};
///
/// let base = Namespace::empty();
/// let outer = base.with_scope(ScopeId::new("foo"));
/// let inner = outer.with_scope(ScopeId::new("bar"));
///
/// assert!(base.is_empty());
/// assert_eq!(outer.len(), 1);
/// assert!(inner.contains(&ScopeId::new("foo")));
/// assert!(inner.contains(&ScopeId::new("bar")));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<ScopeId>", into = "Vec<ScopeId>")]
pub struct Namespace(Arc<[ScopeId]>);

impl Namespace {
    /// The namespace of an untagged request.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Return a new namespace with `scope` appended at the end.
    #[must_use]
    pub fn with_scope(&self, scope: ScopeId) -> Self {
        let mut scopes = Vec::with_capacity(self.0.len() + 1);
        scopes.extend(self.0.iter().cloned());
        scopes.push(scope);
        Self(Arc::from(scopes))
    }

    /// Whether `scope` appears anywhere in the sequence.
    #[must_use]
    pub fn contains(&self, scope: &ScopeId) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    /// Iterate scopes in wrap order (outermost first).
    pub fn iter(&self) -> impl Iterator<Item = &ScopeId> {
        self.0.iter()
    }

    /// Number of scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no scope has been applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scopes as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[ScopeId] {
        &self.0
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl From<Vec<ScopeId>> for Namespace {
    fn from(scopes: Vec<ScopeId>) -> Self {
        Self(Arc::from(scopes))
    }
}

impl From<Namespace> for Vec<ScopeId> {
    fn from(namespace: Namespace) -> Self {
        namespace.0.to_vec()
    }
}

impl FromIterator<ScopeId> for Namespace {
    fn from_iter<I: IntoIterator<Item = ScopeId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
