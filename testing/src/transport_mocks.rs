//! In-memory transports for driver tests
//!
//! - [`MockTransport`]: settles every call by itself, echoing the URL
//! - [`ManualTransport`]: every call stays pending until the test settles it

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use composable_fetch_core::{RequestOptions, Transport, TransportError, TransportFuture};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// One call observed by a test transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Resource passed to the transport
    pub resource: String,
    /// Options passed to the transport
    pub options: Option<RequestOptions>,
}

/// Canned response produced by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    /// Requested URL
    pub url: String,
    /// Always `200`
    pub status: u16,
    /// Always `"OK"`
    pub status_text: String,
    /// Always `true`
    pub ok: bool,
    /// URL path without its leading slash
    pub data: String,
}

impl MockResponse {
    /// The response [`MockTransport`] returns for `url`.
    ///
    /// `http://localhost:8080/hello?x=1` carries `data == "hello"`. A resource
    /// without a scheme is treated as a bare path.
    #[must_use]
    pub fn echo(url: &str) -> Self {
        Self {
            url: url.to_string(),
            status: 200,
            status_text: "OK".to_string(),
            ok: true,
            data: path_of(url).trim_start_matches('/').to_string(),
        }
    }
}

fn path_of(url: &str) -> &str {
    let rest = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |slash| &rest[slash..]),
        None => url,
    };
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RecordedCall>,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, TransportError>,
}

/// Transport that answers every call with [`MockResponse::echo`].
///
/// Records every call. Individual resources can be configured to settle after
/// a delay or to fail.
///
/// # Example
///
/// ```
/// use composable_fetch_testing::MockTransport;
/// use composable_fetch_core::TransportError;
/// use std::time::Duration;
///
/// let transport = MockTransport::new()
///     .with_delay("http://api.test/slow", Duration::from_millis(50))
///     .with_failure("http://api.test/down", TransportError::Timeout);
/// assert_eq!(transport.call_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Transport with no delays or failures configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle calls for `resource` only after `delay`.
    #[must_use]
    pub fn with_delay(self, resource: impl Into<String>, delay: Duration) -> Self {
        self.state.lock().unwrap().delays.insert(resource.into(), delay);
        self
    }

    /// Fail calls for `resource` with `error`.
    #[must_use]
    pub fn with_failure(self, resource: impl Into<String>, error: TransportError) -> Self {
        self.state.lock().unwrap().failures.insert(resource.into(), error);
        self
    }

    /// Every call so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Resources of every call so far, in call order.
    #[must_use]
    pub fn resources(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|call| call.resource.clone())
            .collect()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Number of calls for `resource`.
    #[must_use]
    pub fn calls_for(&self, resource: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.resource == resource)
            .count()
    }
}

impl Transport for MockTransport {
    type Response = MockResponse;

    fn perform(&self, resource: &str, options: Option<&RequestOptions>) -> TransportFuture<MockResponse> {
        let (delay, failure) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(RecordedCall {
                resource: resource.to_string(),
                options: options.cloned(),
            });
            (state.delays.get(resource).copied(), state.failures.get(resource).cloned())
        };
        let response = MockResponse::echo(resource);

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match failure {
                Some(error) => Err(error),
                None => Ok(response),
            }
        })
    }
}

/// A call held open by [`ManualTransport`].
#[derive(Debug)]
struct PendingCall<R> {
    call: RecordedCall,
    settle: oneshot::Sender<Result<R, TransportError>>,
}

/// Transport whose calls settle only when the test says so.
///
/// Useful for checking ordering: issue several requests, then settle them in
/// any order. A call whose settler is dropped fails with
/// [`TransportError::Other`].
#[derive(Debug)]
pub struct ManualTransport<R = MockResponse> {
    pending: Arc<Mutex<Vec<PendingCall<R>>>>,
    issued: Arc<Mutex<Vec<RecordedCall>>>,
}

impl<R> Clone for ManualTransport<R> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            issued: Arc::clone(&self.issued),
        }
    }
}

impl<R> Default for ManualTransport<R> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(Vec::new())),
            issued: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<R> ManualTransport<R> {
    /// Transport with no calls yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resources of the calls still pending, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|pending| pending.call.resource.clone())
            .collect()
    }

    /// Every call ever issued, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.issued.lock().unwrap().clone()
    }

    /// Number of calls ever issued.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.issued.lock().unwrap().len()
    }

    fn settle(&self, resource: &str, outcome: Result<R, TransportError>) -> bool {
        let pending = {
            let mut calls = self.pending.lock().unwrap();
            match calls.iter().position(|pending| pending.call.resource == resource) {
                Some(index) => calls.remove(index),
                None => return false,
            }
        };
        pending.settle.send(outcome).is_ok()
    }

    /// Resolve the oldest pending call for `resource`.
    ///
    /// Returns `false` if there is no such call or nobody awaits it.
    pub fn resolve(&self, resource: &str, response: R) -> bool {
        self.settle(resource, Ok(response))
    }

    /// Reject the oldest pending call for `resource`.
    pub fn reject(&self, resource: &str, error: TransportError) -> bool {
        self.settle(resource, Err(error))
    }
}

impl ManualTransport<MockResponse> {
    /// Resolve the oldest pending call for `resource` with its echo response.
    pub fn resolve_echo(&self, resource: &str) -> bool {
        self.resolve(resource, MockResponse::echo(resource))
    }
}

impl<R> Transport for ManualTransport<R>
where
    R: Clone + Send + Sync + 'static,
{
    type Response = R;

    fn perform(&self, resource: &str, options: Option<&RequestOptions>) -> TransportFuture<R> {
        let call = RecordedCall {
            resource: resource.to_string(),
            options: options.cloned(),
        };
        let (settle, settled) = oneshot::channel();
        self.issued.lock().unwrap().push(call.clone());
        self.pending.lock().unwrap().push(PendingCall { call, settle });

        Box::pin(async move {
            settled
                .await
                .unwrap_or_else(|_| Err(TransportError::Other("call abandoned".to_string())))
        })
    }
}
