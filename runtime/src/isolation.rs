//! Scope isolation.
//!
//! Isolation is a tag-and-filter pair: the sink side appends a scope to every
//! outgoing request's namespace, and the source side only shows the handles
//! whose request carries that scope. Both sides must use the same
//! [`ScopeId`].
//!
//! Tagging never mutates the caller's request; it produces a tagged copy.

use crate::source::{ChannelFilter, ResponseSource};
use composable_fetch_core::{RequestInput, ScopeId};
use futures::stream::{Stream, StreamExt};

/// Tagged copy of `input` with `scope` appended to its namespace.
#[must_use]
pub fn tag_request(input: RequestInput, scope: &ScopeId) -> RequestInput {
    input.with_scope(scope.clone())
}

/// Tag every request of `requests` with `scope`.
pub fn tag_sink<S>(requests: S, scope: ScopeId) -> impl Stream<Item = RequestInput>
where
    S: Stream<Item = RequestInput>,
{
    requests.map(move |input| tag_request(input, &scope))
}

/// Tag every request of a fallible request stream; errors pass through.
pub fn tag_fallible_sink<S, E>(requests: S, scope: ScopeId) -> impl Stream<Item = Result<RequestInput, E>>
where
    S: Stream<Item = Result<RequestInput, E>>,
{
    requests.map(move |item| item.map(|input| tag_request(input, &scope)))
}

/// A view of `source` restricted to channels tagged with `scope`.
#[must_use]
pub fn filter_source<R>(source: &ResponseSource<R>, scope: ScopeId) -> ResponseSource<R>
where
    R: Clone + Send + Sync + 'static,
{
    tracing::trace!(scope = %scope, "Isolating response source");
    source.with_filter(ChannelFilter::Scope(scope))
}
