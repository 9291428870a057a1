//! Transport invocation.
//!
//! [`TransportInvoker`] turns one normalized request into one
//! [`ResponseHandle`]. It issues exactly one transport call per `invoke`; it never
//! retries or deduplicates.

use crate::handle::ResponseHandle;
use crate::metrics::DriverMetrics;
use composable_fetch_core::environment::{Clock, SystemClock};
use composable_fetch_core::{FetchError, RequestRecord, Transport};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Instant;

/// Issues transport calls and wraps their outcomes in handles.
pub struct TransportInvoker<T: Transport> {
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    metrics: DriverMetrics,
}

impl<T: Transport> Clone for TransportInvoker<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T: Transport> TransportInvoker<T> {
    /// Invoker using the system clock and no metrics.
    #[must_use]
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            metrics: DriverMetrics::disabled(),
        }
    }

    /// Replace the clock used to stamp handles.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record transport outcomes through `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: DriverMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Call the transport for `request` and return a pending handle.
    ///
    /// Returns immediately. The transport future is driven on a spawned task,
    /// so the call proceeds even if nobody ever reads the handle, and
    /// unsubscribing never cancels it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn invoke(&self, request: impl Into<Arc<RequestRecord>>) -> ResponseHandle<T::Response> {
        let request = request.into();
        let issued_at = self.clock.now();
        let call = self
            .transport
            .perform(request.resource(), request.transport_options());

        let key = request.key().clone();
        let metrics = self.metrics.clone();
        let started = Instant::now();
        let outcome = async move {
            let result = call.await;
            metrics.record_transport_settled(started.elapsed(), result.is_err());
            match result {
                Ok(response) => {
                    tracing::trace!(key = %key, "Transport call settled");
                    Ok(response)
                }
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "Transport call failed");
                    Err(FetchError::Transport(error))
                }
            }
        }
        .boxed();

        let handle = ResponseHandle::new(request, issued_at, outcome);
        tokio::spawn(handle.response());
        handle
    }
}
