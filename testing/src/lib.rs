//! # Composable Fetch Testing
//!
//! Testing utilities and helpers for Composable Fetch.
//!
//! This crate provides:
//! - Test transports ([`MockTransport`], [`ManualTransport`])
//! - A deterministic clock
//! - A Given-When-Then harness for drivers ([`DriverTest`])
//! - Stream helpers and tracing setup for tests
//! - Property-based testing strategies for request shapes
//!
//! ## Example
//!
//! ```ignore
//! use composable_fetch_testing::{MockTransport, test_clock};
//! use composable_fetch_runtime::FetchDriver;
//!
//! #[tokio::test]
//! async fn test_late_subscriber_sees_cached_response() {
//!     let transport = MockTransport::new();
//!     let driver = FetchDriver::new(transport.clone()).with_clock(Arc::new(test_clock()));
//!     let (sink, source) = driver.open();
//!
//!     sink.send("http://api.test/users")?;
//!     let channel = source.by_key("http://api.test/users").next().await;
//!     assert_eq!(transport.call_count(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use composable_fetch_core::environment::Clock;

mod transport_mocks;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    pub use crate::transport_mocks::{ManualTransport, MockResponse, MockTransport, RecordedCall};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making handle timestamps reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_fetch_testing::mocks::FixedClock;
    /// use composable_fetch_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers and utilities.
pub mod helpers {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
    #![allow(clippy::missing_panics_doc)]

    use composable_fetch_core::{FetchError, RequestInput};
    use composable_fetch_runtime::{ChannelStream, KeyedChannel};
    use futures::stream::{Stream, StreamExt};
    use std::future::Future;
    use std::time::Duration;

    /// How long helpers wait before declaring a test stuck.
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Install a tracing subscriber that writes through the test harness.
    ///
    /// Honors `RUST_LOG`; defaults to `debug`. Safe to call from every test.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    }

    /// Await `future`, failing the test after [`TEST_TIMEOUT`].
    pub async fn within_timeout<F: Future>(future: F) -> F::Output {
        tokio::time::timeout(TEST_TIMEOUT, future).await.unwrap()
    }

    /// Collect a finite stream, failing the test if it does not end in time.
    pub async fn collect_within<S: Stream>(stream: S) -> Vec<S::Item> {
        within_timeout(stream.collect()).await
    }

    /// Collect the keys of every channel on a finite channel stream.
    ///
    /// Panics if the stream yields a failure.
    pub async fn collect_keys<R>(channels: ChannelStream<R>) -> Vec<String>
    where
        R: Clone + Send + Sync + 'static,
    {
        collect_within(channels)
            .await
            .into_iter()
            .map(|channel| channel.unwrap().key().to_string())
            .collect()
    }

    /// Wait for the next channel on a live channel stream.
    pub async fn next_channel<R>(channels: &mut ChannelStream<R>) -> KeyedChannel<R>
    where
        R: Clone + Send + Sync + 'static,
    {
        within_timeout(channels.next()).await.unwrap().unwrap()
    }

    /// Wait for the next item of any stream.
    pub async fn next_item<S>(stream: &mut S) -> Option<S::Item>
    where
        S: Stream + Unpin,
    {
        within_timeout(stream.next()).await
    }

    /// A request stream that yields `inputs` and then fails with `error`.
    pub fn failing_requests(
        inputs: Vec<RequestInput>,
        error: &'static str,
    ) -> impl Stream<Item = Result<RequestInput, &'static str>> + Send {
        async_stream::stream! {
            for input in inputs {
                yield Ok(input);
            }
            yield Err(error);
        }
    }

    /// Unwrap every successful outcome, sorted for order-insensitive checks.
    pub fn sorted_ok<R: Ord>(outcomes: Vec<Result<R, FetchError>>) -> Vec<R> {
        let mut values: Vec<R> = outcomes.into_iter().map(Result::unwrap).collect();
        values.sort();
        values
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use composable_fetch_core::{NativeRequest, RequestDescriptor, RequestInput, ScopeId};
    use proptest::prelude::*;

    /// Non-empty URL-like resources.
    pub fn resource() -> impl Strategy<Value = String> {
        "(https?://[a-z]{1,8}\\.test)?/[a-z0-9]{1,12}(/[a-z0-9]{1,8}){0,2}"
    }

    /// Non-empty explicit keys.
    pub fn key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,15}"
    }

    /// Scope identifiers.
    pub fn scope() -> impl Strategy<Value = ScopeId> {
        "[a-z]{1,8}".prop_map(ScopeId::new)
    }

    /// Descriptors with a resource, optionally nested and optionally keyed.
    pub fn descriptor() -> impl Strategy<Value = RequestDescriptor> {
        (resource(), any::<bool>(), proptest::option::of(key())).prop_map(|(url, nested, key)| {
            let descriptor = if nested {
                RequestDescriptor::from_native(NativeRequest::new(url))
            } else {
                RequestDescriptor::new(url)
            };
            match key {
                Some(key) => descriptor.with_key(key),
                None => descriptor,
            }
        })
    }

    /// Any valid request input.
    pub fn request_input() -> impl Strategy<Value = RequestInput> {
        prop_oneof![
            resource().prop_map(RequestInput::Url),
            descriptor().prop_map(RequestInput::Descriptor),
        ]
    }

    /// A request sequence drawn from a small key space, so keys repeat.
    pub fn keyed_requests(max_len: usize) -> impl Strategy<Value = Vec<(String, String)>> {
        proptest::collection::vec(("k[0-3]", "/r[0-3]"), 1..=max_len)
    }
}

// Re-export commonly used items
pub use driver_test::DriverTest;
pub use helpers::init_test_tracing;
pub use mocks::{FixedClock, ManualTransport, MockResponse, MockTransport, RecordedCall, test_clock};
