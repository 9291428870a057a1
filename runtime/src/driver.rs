//! Driver façade.
//!
//! [`FetchDriver`] wires a transport, a clock and a configuration into a
//! running multiplexer. Requests reach it either as a stream
//! ([`FetchDriver::drive`]) or through a [`RequestSink`] ([`FetchDriver::open`]);
//! either way the caller gets back the [`ResponseSource`].
//!
//! # Example
//!
//! ```rust,ignore
//! let driver = FetchDriver::new(transport);
//! let (sink, source) = driver.open();
//!
//! sink.send("http://api.test/users")?;
//! let channel = source.by_url("http://api.test/users").next().await;
//! ```

use crate::config::DriverConfig;
use crate::invoker::TransportInvoker;
use crate::metrics::DriverMetrics;
use crate::multiplexer::KeyedMultiplexer;
use crate::source::ResponseSource;
use composable_fetch_core::environment::{Clock, SystemClock};
use composable_fetch_core::{
    normalize, normalize_value, FetchError, Namespace, RequestInput, RequestKey, RequestRecord, ScopeId, Transport,
};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::stream::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tracing::Instrument;

/// Builds and starts keyed multiplexers over one transport.
pub struct FetchDriver<T: Transport> {
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    config: DriverConfig,
}

impl<T: Transport> Clone for FetchDriver<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport> FetchDriver<T> {
    /// Driver with the default configuration and the system clock.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::shared(Arc::new(transport))
    }

    /// Driver over a transport shared with other drivers.
    #[must_use]
    pub fn shared(transport: Arc<T>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            config: DriverConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the clock used to stamp response handles.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Start a multiplexer consuming `requests`.
    ///
    /// Returns immediately; the stream is consumed on a spawned task. The
    /// source completes when `requests` ends.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn drive<S>(&self, requests: S) -> ResponseSource<T::Response>
    where
        S: Stream<Item = RequestInput> + Send + 'static,
    {
        self.spawn(requests.map(Ok))
    }

    /// Start a multiplexer consuming a fallible request stream.
    ///
    /// The first `Err` fails the source and every open channel with
    /// [`FetchError::Upstream`]; nothing after it is consumed.
    pub fn drive_fallible<S, E>(&self, requests: S) -> ResponseSource<T::Response>
    where
        S: Stream<Item = Result<RequestInput, E>> + Send + 'static,
        E: Display,
    {
        self.spawn(requests.map(|item| item.map_err(FetchError::upstream)))
    }

    /// Start a multiplexer fed by the returned [`RequestSink`].
    ///
    /// The source completes once every clone of the sink is dropped or
    /// [`RequestSink::close`] is called.
    #[must_use]
    pub fn open(&self) -> (RequestSink, ResponseSource<T::Response>) {
        let (sender, receiver) = mpsc::unbounded();
        let source = self.spawn(receiver);
        (
            RequestSink {
                sender,
                scopes: Namespace::empty(),
            },
            source,
        )
    }

    fn spawn<S>(&self, requests: S) -> ResponseSource<T::Response>
    where
        S: Stream<Item = Result<RequestInput, FetchError>> + Send + 'static,
    {
        let metrics = DriverMetrics::new(self.config.label.clone(), self.config.metrics_enabled);
        let invoker = TransportInvoker::new(Arc::clone(&self.transport))
            .with_clock(Arc::clone(&self.clock))
            .with_metrics(metrics.clone());
        let (mux, source) = KeyedMultiplexer::new(invoker, self.config.source_replay, metrics);

        let span = tracing::info_span!("fetch_driver", label = %self.config.label);
        tokio::spawn(mux.run(requests).instrument(span));
        source
    }
}

/// Producer side of a driver started with [`FetchDriver::open`].
///
/// Cloneable; every clone feeds the same multiplexer. A scoped sink (see
/// [`RequestSink::scoped`]) tags everything it sends.
#[derive(Clone, Debug)]
pub struct RequestSink {
    sender: UnboundedSender<Result<RequestInput, FetchError>>,
    scopes: Namespace,
}

impl RequestSink {
    /// Normalize and submit one request.
    ///
    /// Returns the key the request was routed under.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidRequestShape`] if normalization fails; nothing is
    ///   submitted.
    /// - [`FetchError::SourceClosed`] if the driver no longer accepts requests.
    pub fn send(&self, input: impl Into<RequestInput>) -> Result<RequestKey, FetchError> {
        self.submit(normalize(input.into())?)
    }

    /// Normalize and submit dynamically typed input.
    ///
    /// # Errors
    ///
    /// Same as [`RequestSink::send`].
    pub fn send_value(&self, value: serde_json::Value) -> Result<RequestKey, FetchError> {
        self.submit(normalize_value(value)?)
    }

    fn submit(&self, record: RequestRecord) -> Result<RequestKey, FetchError> {
        let record = self
            .scopes
            .iter()
            .fold(record, |record, scope| record.with_scope(scope.clone()));
        let key = record.key().clone();
        self.sender
            .unbounded_send(Ok(RequestInput::Record(record)))
            .map_err(|_| FetchError::SourceClosed)?;
        Ok(key)
    }

    /// Fail the request stream with `error` and stop accepting requests.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::SourceClosed`] if the stream had already ended.
    pub fn fail(&self, error: impl Display) -> Result<(), FetchError> {
        self.sender
            .unbounded_send(Err(FetchError::upstream(error)))
            .map_err(|_| FetchError::SourceClosed)?;
        self.sender.close_channel();
        Ok(())
    }

    /// Complete the request stream for every clone of this sink.
    pub fn close(&self) {
        self.sender.close_channel();
    }

    /// Whether the driver stopped accepting requests.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// A sink that appends `scope` to every request it sends.
    ///
    /// Pair with [`ResponseSource::isolate_source`] using the same scope.
    #[must_use]
    pub fn scoped(&self, scope: impl Into<ScopeId>) -> Self {
        Self {
            sender: self.sender.clone(),
            scopes: self.scopes.with_scope(scope.into()),
        }
    }

    /// Scopes this sink applies, outermost first.
    #[must_use]
    pub const fn scopes(&self) -> &Namespace {
        &self.scopes
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::replay::ChannelState;
    use composable_fetch_core::{RequestOptions, TransportError, TransportFuture};
    use futures::stream;

    struct Echo;

    impl Transport for Echo {
        type Response = String;

        fn perform(&self, resource: &str, _options: Option<&RequestOptions>) -> TransportFuture<String> {
            let body = resource.to_string();
            Box::pin(async move { Ok::<_, TransportError>(body) })
        }
    }

    #[tokio::test]
    async fn drive_completes_with_the_input() {
        let driver = FetchDriver::new(Echo);
        let source = driver.drive(stream::iter(vec![RequestInput::from("u1"), RequestInput::from("u2")]));

        let channels: Vec<_> = source.subscribe().collect().await;
        assert_eq!(channels.len(), 2);
        assert_eq!(source.state(), ChannelState::Completed);
    }

    #[tokio::test]
    async fn sink_rejects_invalid_shapes_synchronously() {
        let driver = FetchDriver::new(Echo);
        let (sink, _source) = driver.open();

        let error = sink.send_value(serde_json::json!(42)).unwrap_err();
        assert!(matches!(error, FetchError::InvalidRequestShape(_)));
        assert_eq!(sink.send("u1").unwrap(), "u1");
    }

    #[tokio::test]
    async fn closed_sink_reports_source_closed() {
        let driver = FetchDriver::new(Echo);
        let (sink, source) = driver.open();
        sink.close();

        assert!(sink.is_closed());
        assert_eq!(sink.send("u1"), Err(FetchError::SourceClosed));
        let channels: Vec<_> = source.subscribe().collect().await;
        assert!(channels.is_empty());
    }

    #[tokio::test]
    async fn scoped_sinks_accumulate_scopes() {
        let driver = FetchDriver::new(Echo);
        let (sink, _source) = driver.open();
        let inner = sink.scoped("outer").scoped("inner");

        let scopes: Vec<&str> = inner.scopes().iter().map(ScopeId::as_str).collect();
        assert_eq!(scopes, vec!["outer", "inner"]);
        assert!(sink.scopes().is_empty());
    }

    #[tokio::test]
    async fn fallible_stream_failure_is_upstream() {
        let driver = FetchDriver::new(Echo);
        let requests = stream::iter(vec![Ok(RequestInput::from("u1")), Err("socket reset")]);
        let source = driver.drive_fallible(requests);

        let items: Vec<_> = source.subscribe().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].as_ref().unwrap_err(), &FetchError::upstream("socket reset"));
    }
}
