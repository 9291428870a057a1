//! Keyed response channels.
//!
//! A channel holds every handle sharing one key. Requests on the same key may
//! still differ in resource and namespace, so a channel can be narrowed into a
//! view that only shows the handles whose own request passes a set of
//! [`ChannelFilter`]s. Views share the underlying channel; they never copy or
//! re-key it.

use crate::handle::ResponseHandle;
use crate::replay::{ChannelState, ReplayChannel};
use crate::source::ChannelFilter;
use composable_fetch_core::{FetchError, RequestKey, RequestRecord};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;

/// Stream of response handles from one keyed channel.
pub type HandleStream<R> = BoxStream<'static, Result<ResponseHandle<R>, FetchError>>;

/// Flattened stream of response outcomes.
pub type ResponseStream<R> = BoxStream<'static, Result<R, FetchError>>;

/// Handles are retained per request shape so a narrowed view can replay its
/// own latest handle.
fn same_shape<R>(held: &ResponseHandle<R>, pushed: &ResponseHandle<R>) -> bool
where
    R: Clone + Send + Sync + 'static,
{
    let (held, pushed) = (held.request(), pushed.request());
    held.resource() == pushed.resource() && held.namespace() == pushed.namespace()
}

/// Multicast channel of every response handle sharing one key.
///
/// The key is fixed at creation. A new subscriber immediately receives the
/// most recent visible handle (if any), then every later one in request order.
/// Only the multiplexer can push into a channel.
pub struct KeyedChannel<R> {
    key: RequestKey,
    origin: Arc<RequestRecord>,
    handles: ReplayChannel<ResponseHandle<R>>,
    filters: Arc<[ChannelFilter]>,
}

impl<R> Clone for KeyedChannel<R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            origin: Arc::clone(&self.origin),
            handles: self.handles.clone(),
            filters: Arc::clone(&self.filters),
        }
    }
}

impl<R> KeyedChannel<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub(crate) fn open(origin: Arc<RequestRecord>) -> Self {
        Self {
            key: origin.key().clone(),
            origin,
            handles: ReplayChannel::latest_per(same_shape::<R>),
            filters: Arc::from(Vec::new()),
        }
    }

    pub(crate) fn push(&self, handle: ResponseHandle<R>) -> bool {
        self.handles.push(handle)
    }

    pub(crate) fn complete(&self) -> bool {
        self.handles.complete()
    }

    pub(crate) fn fail(&self, error: FetchError) -> bool {
        self.handles.fail(error)
    }

    /// A view of this channel showing only handles whose request passes
    /// every filter. The view's request is left as the channel's until
    /// [`KeyedChannel::with_origin`] sets it.
    pub(crate) fn narrow(&self, filters: Arc<[ChannelFilter]>) -> Self {
        Self {
            key: self.key.clone(),
            origin: Arc::clone(&self.origin),
            handles: self.handles.clone(),
            filters,
        }
    }

    pub(crate) fn with_origin(mut self, origin: Arc<RequestRecord>) -> Self {
        self.origin = origin;
        self
    }

    fn admits(&self, handle: &ResponseHandle<R>) -> bool {
        self.filters.iter().all(|filter| filter.matches(handle.request()))
    }

    /// Resolves to this view, anchored on its first visible request, once a
    /// visible handle exists. Ends empty if the channel terminates first.
    pub(crate) fn revealed(&self) -> BoxStream<'static, Result<Self, FetchError>> {
        let view = self.clone();
        self.subscribe()
            .filter_map(|item| future::ready(item.ok()))
            .take(1)
            .map(move |handle| Ok(view.clone().with_origin(handle.request_arc())))
            .boxed()
    }

    /// The earliest retained visible handle's request, if any.
    pub(crate) fn first_retained(&self) -> Option<Arc<RequestRecord>> {
        self.handles
            .snapshot()
            .into_iter()
            .find(|handle| self.admits(handle))
            .map(|handle| handle.request_arc())
    }

    /// The key every handle in this channel shares.
    #[must_use]
    pub const fn key(&self) -> &RequestKey {
        &self.key
    }

    /// The first request seen for this key, or for a filtered view, the first
    /// request visible through it.
    #[must_use]
    pub fn request(&self) -> &RequestRecord {
        &self.origin
    }

    /// Filters narrowing this view; empty for the full channel.
    #[must_use]
    pub fn filters(&self) -> &[ChannelFilter] {
        &self.filters
    }

    /// Subscribe to the visible handles of this channel.
    #[must_use]
    pub fn subscribe(&self) -> HandleStream<R> {
        if self.filters.is_empty() {
            return self.handles.subscribe_latest(|_| true).boxed();
        }
        let view = self.clone();
        self.handles
            .subscribe_latest(|handle| self.admits(handle))
            .filter(move |item| {
                future::ready(match item {
                    Ok(handle) => view.admits(handle),
                    Err(_) => true,
                })
            })
            .boxed()
    }

    /// The most recently pushed visible handle.
    #[must_use]
    pub fn latest(&self) -> Option<ResponseHandle<R>> {
        if self.filters.is_empty() {
            return self.handles.latest();
        }
        self.handles
            .snapshot()
            .into_iter()
            .rev()
            .find(|handle| self.admits(handle))
    }

    /// Number of handles pushed so far for this key, across every request
    /// shape.
    #[must_use]
    pub fn handle_count(&self) -> u64 {
        self.handles.pushed()
    }

    /// Channel state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.handles.state()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handles.subscriber_count()
    }

    /// Flatten this channel into response outcomes, yielded as they settle.
    ///
    /// Starts from the replayed handle. Ends once the channel has terminated
    /// and every handle it delivered has settled.
    #[must_use]
    pub fn responses(&self) -> ResponseStream<R> {
        flatten_handles(self.subscribe())
    }
}

pub(crate) fn flatten_handles<R, S>(handles: S) -> ResponseStream<R>
where
    R: Clone + Send + Sync + 'static,
    S: stream::Stream<Item = Result<ResponseHandle<R>, FetchError>> + Send + 'static,
{
    handles
        .map(|item| match item {
            Ok(handle) => handle.response().into_stream().boxed(),
            Err(error) => stream::once(future::ready(Err(error))).boxed(),
        })
        .flatten_unordered(None)
        .boxed()
}

impl<R: Clone> fmt::Debug for KeyedChannel<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedChannel")
            .field("key", &self.key)
            .field("resource", &self.origin.resource())
            .field("namespace", self.origin.namespace())
            .field("filters", &self.filters)
            .field("handles", &self.handles)
            .finish()
    }
}
