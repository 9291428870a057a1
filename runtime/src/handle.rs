//! Response handles.
//!
//! A [`ResponseHandle`] is the single-value result cell for one transport call.
//! It is backed by a [`Shared`] future: however many clones await it, the
//! transport outcome is produced once and every awaiter (before or after
//! settlement) sees the same terminal value.

use chrono::{DateTime, Utc};
use composable_fetch_core::{FetchError, RequestKey, RequestRecord};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

/// Future resolving to the outcome of one request.
pub type ResponseFuture<R> = Shared<BoxFuture<'static, Result<R, FetchError>>>;

/// Deferred result of one transport call, tagged with its request.
///
/// Exactly one terminal outcome is ever produced: the transport's response, or
/// [`FetchError::Transport`]. Cloning a handle never re-issues the call.
///
/// # Example
///
/// ```ignore
/// let handle = channel.latest().unwrap();
/// println!("{} issued at {}", handle.request().resource(), handle.issued_at());
/// let response = handle.await?;
/// ```
pub struct ResponseHandle<R> {
    request: Arc<RequestRecord>,
    issued_at: DateTime<Utc>,
    outcome: ResponseFuture<R>,
}

impl<R> Clone for ResponseHandle<R> {
    fn clone(&self) -> Self {
        Self {
            request: Arc::clone(&self.request),
            issued_at: self.issued_at,
            outcome: self.outcome.clone(),
        }
    }
}

impl<R> ResponseHandle<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Wrap a pending outcome.
    ///
    /// The outcome is lazy until something polls it; the invoker drives it on
    /// a spawned task so the request proceeds without readers.
    pub fn new(
        request: Arc<RequestRecord>,
        issued_at: DateTime<Utc>,
        outcome: BoxFuture<'static, Result<R, FetchError>>,
    ) -> Self {
        Self {
            request,
            issued_at,
            outcome: outcome.shared(),
        }
    }

    /// The request this handle answers.
    #[must_use]
    pub fn request(&self) -> &RequestRecord {
        &self.request
    }

    /// Shared pointer to the originating request.
    #[must_use]
    pub fn request_arc(&self) -> Arc<RequestRecord> {
        Arc::clone(&self.request)
    }

    /// Correlation key of the originating request.
    #[must_use]
    pub fn key(&self) -> &RequestKey {
        self.request.key()
    }

    /// When the transport call was issued.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// A future for the outcome. Can be called any number of times.
    #[must_use]
    pub fn response(&self) -> ResponseFuture<R> {
        self.outcome.clone()
    }

    /// The outcome, if the call has already settled.
    #[must_use]
    pub fn peek(&self) -> Option<&Result<R, FetchError>> {
        self.outcome.peek()
    }

    /// Whether the call has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }
}

impl<R> IntoFuture for ResponseHandle<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Output = Result<R, FetchError>;
    type IntoFuture = ResponseFuture<R>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome
    }
}

impl<R> IntoFuture for &ResponseHandle<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Output = Result<R, FetchError>;
    type IntoFuture = ResponseFuture<R>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome.clone()
    }
}

impl<R: Clone> fmt::Debug for ResponseHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("key", self.request.key())
            .field("resource", &self.request.resource())
            .field("issued_at", &self.issued_at)
            .field("settled", &self.outcome.peek().is_some())
            .finish()
    }
}
