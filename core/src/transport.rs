//! The transport boundary.
//!
//! A [`Transport`] performs the actual request for one resource. The
//! multiplexer treats its result as opaque: whatever `Response` the transport
//! produces is handed to subscribers unchanged.
//!
//! # Implementations
//!
//! - `HttpTransport` (runtime crate, `http` feature) - reqwest-backed HTTP client
//! - `MockTransport` / `ManualTransport` (testing crate) - for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use composable_fetch_core::transport::{Transport, TransportFuture};
//! use composable_fetch_core::request::RequestOptions;
//!
//! struct StaticTransport;
//!
//! impl Transport for StaticTransport {
//!     type Response = String;
//!
//!     fn perform(&self, resource: &str, _options: Option<&RequestOptions>) -> TransportFuture<String> {
//!         let body = format!("hello from {resource}");
//!         Box::pin(async move { Ok(body) })
//!     }
//! }
//! ```

pub use crate::error::TransportError;
use crate::request::RequestOptions;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Future returned by [`Transport::perform`].
pub type TransportFuture<R> = BoxFuture<'static, Result<R, TransportError>>;

/// External asynchronous operation that fetches one resource.
///
/// `perform` is called exactly once per request routed through the
/// multiplexer. It must not block; the work happens when the returned future
/// is polled. Retries, deduplication and timeouts are not the caller's concern
/// here: dedup happens by key above this layer, timeouts belong to the
/// transport itself.
pub trait Transport: Send + Sync + 'static {
    /// Opaque result of a successful request
    type Response: Clone + Send + Sync + 'static;

    /// Start fetching `resource` with the given options.
    ///
    /// Anything that must outlive this call (the resource string, cloned
    /// options) should be moved into the returned future.
    fn perform(
        &self,
        resource: &str,
        options: Option<&RequestOptions>,
    ) -> TransportFuture<Self::Response>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    type Response = T::Response;

    fn perform(
        &self,
        resource: &str,
        options: Option<&RequestOptions>,
    ) -> TransportFuture<Self::Response> {
        (**self).perform(resource, options)
    }
}
