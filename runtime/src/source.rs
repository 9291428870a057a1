//! The response source and its accessors.
//!
//! A [`ResponseSource`] is the observable output of a fetch driver: a live
//! stream of [`KeyedChannel`]s, one per distinct key. It is a read-only view;
//! cloning it, filtering it, or isolating it never creates channels or issues
//! requests.
//!
//! # Filtering
//!
//! ```text
//! source ─┬─ by_key("r1")        → channels whose key is "r1"
//!         ├─ by_url("u2")        → channels with a request for "u2"
//!         └─ isolate_source(s)   → ResponseSource restricted to scope s
//!                 └─ by_key / by_url / isolate_source ... (nests)
//! ```
//!
//! Filters apply to each request, not to the channel as a whole. A channel is
//! visible once it holds a handle whose request passes every filter, and it is
//! yielded as a view that only shows such handles. A key shared by two scopes
//! therefore shows each scope its own responses.
//!
//! All accessors return streams of channels. Flattening into responses is a
//! separate, explicit step ([`ResponseSource::merge_all`],
//! [`KeyedChannel::responses`]).

use crate::channel::{flatten_handles, KeyedChannel, ResponseStream};
use crate::isolation;
use crate::replay::{ChannelState, ReplayChannel};
use composable_fetch_core::{FetchError, RequestInput, RequestKey, RequestRecord, ScopeId};
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;

/// Stream of keyed channels.
pub type ChannelStream<R> = BoxStream<'static, Result<KeyedChannel<R>, FetchError>>;

/// Predicate over the requests of keyed channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    /// Request key equals the given key
    Key(RequestKey),
    /// Request's extracted resource equals the given resource
    Url(String),
    /// Request's namespace contains the given scope
    Scope(ScopeId),
}

impl ChannelFilter {
    /// Whether `request` passes this filter.
    #[must_use]
    pub fn matches(&self, request: &RequestRecord) -> bool {
        match self {
            Self::Key(key) => request.key() == key,
            Self::Url(resource) => request.resource() == resource,
            Self::Scope(scope) => request.namespace().contains(scope),
        }
    }

    /// Whether this filter can differ between requests sharing a key.
    #[must_use]
    pub const fn is_per_request(&self) -> bool {
        !matches!(self, Self::Key(_))
    }

    fn rejects_key(&self, key: &RequestKey) -> bool {
        matches!(self, Self::Key(wanted) if wanted != key)
    }
}

/// Live stream of keyed channels with filtering and isolation accessors.
pub struct ResponseSource<R> {
    channels: ReplayChannel<KeyedChannel<R>>,
    filters: Arc<[ChannelFilter]>,
}

impl<R> Clone for ResponseSource<R> {
    fn clone(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            filters: Arc::clone(&self.filters),
        }
    }
}

impl<R> ResponseSource<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(channels: ReplayChannel<KeyedChannel<R>>) -> Self {
        Self {
            channels,
            filters: Arc::from(Vec::new()),
        }
    }

    pub(crate) fn with_filter(&self, filter: ChannelFilter) -> Self {
        let mut filters = self.filters.to_vec();
        filters.push(filter);
        Self {
            channels: self.channels.clone(),
            filters: Arc::from(filters),
        }
    }

    /// The view of `channel` through `filters`, if any retained handle is
    /// visible.
    fn visible(filters: &Arc<[ChannelFilter]>, channel: KeyedChannel<R>) -> Option<KeyedChannel<R>> {
        if filters.iter().any(|filter| filter.rejects_key(channel.key())) {
            return None;
        }
        if !filters.iter().any(ChannelFilter::is_per_request) {
            return Some(channel);
        }
        let view = channel.narrow(Arc::clone(filters));
        let origin = view.first_retained()?;
        Some(view.with_origin(origin))
    }

    fn stream_with(&self, extra: Option<ChannelFilter>) -> ChannelStream<R> {
        let mut filters = self.filters.to_vec();
        filters.extend(extra);
        if filters.is_empty() {
            return self.channels.subscribe().boxed();
        }

        let filters: Arc<[ChannelFilter]> = Arc::from(filters);
        let per_request = filters.iter().any(ChannelFilter::is_per_request);
        let keyed = {
            let filters = Arc::clone(&filters);
            self.channels.subscribe().filter(move |item| {
                future::ready(match item {
                    Ok(channel) => !filters.iter().any(|filter| filter.rejects_key(channel.key())),
                    Err(_) => true,
                })
            })
        };
        if !per_request {
            return keyed.boxed();
        }

        // Each channel waits for its first visible handle; channels are
        // yielded in the order those handles arrive.
        keyed
            .map(move |item| match item {
                Ok(channel) => channel.narrow(Arc::clone(&filters)).revealed(),
                Err(error) => stream::once(future::ready(Err(error))).boxed(),
            })
            .flatten_unordered(None)
            .boxed()
    }

    /// Subscribe to every channel visible through this source.
    ///
    /// Replays the channels already created (per the driver's replay policy),
    /// then yields new ones as their keys are first seen. Through an isolated
    /// view a channel is yielded when its first in-scope handle arrives. Ends
    /// when the request stream completes; yields the failure and ends if it
    /// fails.
    #[must_use]
    pub fn subscribe(&self) -> ChannelStream<R> {
        self.stream_with(None)
    }

    /// Channels whose key is exactly `key`.
    ///
    /// Yields at most one channel, since keys map one-to-one to channels.
    #[must_use]
    pub fn by_key(&self, key: impl Into<RequestKey>) -> ChannelStream<R> {
        self.stream_with(Some(ChannelFilter::Key(key.into())))
    }

    /// Channels holding a request that targets `resource`, each narrowed to
    /// those requests.
    ///
    /// Matches the extracted resource (nested request URL or plain URL) of
    /// every request, not the key, so requests with an overridden key still
    /// match, including later requests on a key first opened for another
    /// resource.
    #[must_use]
    pub fn by_url(&self, resource: impl Into<String>) -> ChannelStream<R> {
        self.stream_with(Some(ChannelFilter::Url(resource.into())))
    }

    /// A narrower source that only shows channels tagged with `scope`.
    ///
    /// The result supports every accessor of this type, so isolation nests.
    #[must_use]
    pub fn isolate_source(&self, scope: impl Into<ScopeId>) -> Self {
        isolation::filter_source(self, scope.into())
    }

    /// Tag every request of `requests` with `scope`.
    ///
    /// Pair with [`ResponseSource::isolate_source`] using the same scope.
    pub fn isolate_sink<S>(&self, requests: S, scope: impl Into<ScopeId>) -> BoxStream<'static, RequestInput>
    where
        S: Stream<Item = RequestInput> + Send + 'static,
    {
        isolation::tag_sink(requests, scope.into()).boxed()
    }

    /// Flatten every visible channel into one stream of outcomes, in settle
    /// order.
    ///
    /// An upstream failure appears once for the source and once per channel
    /// that was open when it happened.
    #[must_use]
    pub fn merge_all(&self) -> ResponseStream<R> {
        flatten_handles(
            self.subscribe()
                .map(|item| match item {
                    Ok(channel) => channel.subscribe().boxed(),
                    // Yield the source failure once; channels carry their own.
                    Err(error) => stream::once(future::ready(Err(error))).boxed(),
                })
                .flatten_unordered(None),
        )
    }

    /// Snapshot of the visible channels currently retained for replay.
    #[must_use]
    pub fn channels(&self) -> Vec<KeyedChannel<R>> {
        self.channels
            .snapshot()
            .into_iter()
            .filter_map(|channel| Self::visible(&self.filters, channel))
            .collect()
    }

    /// The visible, retained channel for `key`, if any.
    #[must_use]
    pub fn channel(&self, key: &str) -> Option<KeyedChannel<R>> {
        self.channels
            .snapshot()
            .into_iter()
            .filter(|channel| channel.key().as_str() == key)
            .find_map(|channel| Self::visible(&self.filters, channel))
    }

    /// Filters applied by this view, outermost first.
    #[must_use]
    pub fn filters(&self) -> &[ChannelFilter] {
        &self.filters
    }

    /// State of the underlying source.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.channels.state()
    }
}

impl<R: Clone> fmt::Debug for ResponseSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSource")
            .field("filters", &self.filters)
            .field("channels", &self.channels)
            .finish()
    }
}
