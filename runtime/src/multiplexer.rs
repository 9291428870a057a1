//! The keyed multiplexer.
//!
//! Consumes the request stream, creates one [`KeyedChannel`] per distinct key,
//! invokes the transport once per request and pushes the resulting handle onto
//! its channel. New channels are published on the response source the first
//! time their key is seen.
//!
//! The key-to-channel map is owned by the task running [`KeyedMultiplexer::run`];
//! nothing else can create or push into channels.

use crate::channel::KeyedChannel;
use crate::config::SourceReplay;
use crate::handle::ResponseHandle;
use crate::invoker::TransportInvoker;
use crate::metrics::DriverMetrics;
use crate::replay::ReplayChannel;
use crate::source::ResponseSource;
use composable_fetch_core::{normalize, FetchError, RequestInput, RequestKey, RequestRecord, Transport};
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) struct KeyedMultiplexer<T: Transport> {
    invoker: TransportInvoker<T>,
    channels: HashMap<RequestKey, KeyedChannel<T::Response>>,
    source: ReplayChannel<KeyedChannel<T::Response>>,
    metrics: DriverMetrics,
}

impl<T: Transport> KeyedMultiplexer<T> {
    /// Multiplexer plus the response source it publishes to.
    pub(crate) fn new(
        invoker: TransportInvoker<T>,
        replay: SourceReplay,
        metrics: DriverMetrics,
    ) -> (Self, ResponseSource<T::Response>) {
        let source = match replay {
            SourceReplay::All => ReplayChannel::unbounded(),
            SourceReplay::Latest => ReplayChannel::with_depth(1),
        };
        let mux = Self {
            invoker,
            channels: HashMap::new(),
            source: source.clone(),
            metrics,
        };
        (mux, ResponseSource::new(source))
    }

    /// Route one normalized request: find or create its channel, call the
    /// transport, push the handle.
    #[tracing::instrument(skip(self, record), fields(key = %record.key()), name = "route_request")]
    pub(crate) fn route(&mut self, record: RequestRecord) -> ResponseHandle<T::Response> {
        let record = Arc::new(record);
        let channel = match self.channels.get(record.key()) {
            Some(channel) => channel.clone(),
            None => self.open_channel(&record),
        };

        let handle = self.invoker.invoke(Arc::clone(&record));
        channel.push(handle.clone());
        self.metrics.record_request();
        tracing::trace!(handles = channel.handle_count(), "Handle pushed");
        handle
    }

    fn open_channel(&mut self, record: &Arc<RequestRecord>) -> KeyedChannel<T::Response> {
        let channel = KeyedChannel::open(Arc::clone(record));
        self.channels.insert(record.key().clone(), channel.clone());
        tracing::debug!(
            resource = record.resource(),
            namespace = ?record.namespace(),
            "Opened keyed channel"
        );
        // Publish before the first handle is pushed, so a subscriber reacting to
        // the channel still sees that handle through replay.
        self.source.push(channel.clone());
        self.metrics.record_channel_created(self.channels.len());
        channel
    }

    /// Normalize and route one input.
    pub(crate) fn accept(&mut self, input: RequestInput) -> Result<ResponseHandle<T::Response>, FetchError> {
        let record = normalize(input)?;
        Ok(self.route(record))
    }

    /// Number of keyed channels created so far.
    pub(crate) fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The request stream completed: complete every channel and the source.
    ///
    /// Handles already issued keep settling.
    pub(crate) fn complete(self) {
        for channel in self.channels.values() {
            channel.complete();
        }
        self.source.complete();
        self.metrics.record_open_channels(0);
        tracing::info!(channels = self.channel_count(), "Request stream completed");
    }

    /// The request stream failed: fail every channel and the source.
    pub(crate) fn abort(self, error: FetchError) {
        let error = match error {
            upstream @ FetchError::Upstream(_) => upstream,
            other => FetchError::upstream(other),
        };
        tracing::error!(error = %error, channels = self.channel_count(), "Request stream failed");
        self.metrics.record_upstream_failure();
        for channel in self.channels.values() {
            channel.fail(error.clone());
        }
        self.source.fail(error);
        self.metrics.record_open_channels(0);
    }

    /// Drive the multiplexer until the request stream ends.
    ///
    /// Inputs that fail normalization are logged, counted and skipped; they
    /// never reach the transport and never terminate the driver. An `Err`
    /// item terminates every channel with an upstream failure.
    pub(crate) async fn run<S>(mut self, requests: S)
    where
        S: Stream<Item = Result<RequestInput, FetchError>>,
    {
        let mut requests = std::pin::pin!(requests);
        while let Some(item) = requests.next().await {
            match item {
                Ok(input) => {
                    if let Err(error) = self.accept(input) {
                        self.metrics.record_rejection();
                        tracing::warn!(error = %error, "Rejected request");
                    }
                }
                Err(error) => {
                    self.abort(error);
                    return;
                }
            }
        }
        self.complete();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::replay::ChannelState;
    use composable_fetch_core::{RequestDescriptor, RequestOptions, TransportError, TransportFuture};
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoTransport {
        calls: Mutex<Vec<String>>,
    }

    impl Transport for EchoTransport {
        type Response = String;

        fn perform(&self, resource: &str, _options: Option<&RequestOptions>) -> TransportFuture<String> {
            self.calls.lock().unwrap().push(resource.to_string());
            let body = resource.to_string();
            Box::pin(async move { Ok::<_, TransportError>(body) })
        }
    }

    fn mux() -> (KeyedMultiplexer<EchoTransport>, ResponseSource<String>, Arc<EchoTransport>) {
        let transport = Arc::new(EchoTransport::default());
        let invoker = TransportInvoker::new(Arc::clone(&transport));
        let (mux, source) = KeyedMultiplexer::new(invoker, SourceReplay::All, DriverMetrics::disabled());
        (mux, source, transport)
    }

    #[tokio::test]
    async fn one_channel_per_key() {
        let (mut mux, source, transport) = mux();
        mux.accept("u1".into()).unwrap();
        mux.accept(RequestDescriptor::new("u2").with_key("u1").into()).unwrap();
        mux.accept("u3".into()).unwrap();

        assert_eq!(mux.channel_count(), 2);
        assert_eq!(transport.calls.lock().unwrap().len(), 3);

        let channel = source.channel("u1").unwrap();
        assert_eq!(channel.handle_count(), 2);
        // The channel keeps the first request it saw.
        assert_eq!(channel.request().resource(), "u1");
    }

    #[tokio::test]
    async fn invalid_inputs_are_rejected_without_a_transport_call() {
        let (mut mux, source, transport) = mux();
        let error = mux.accept(RequestDescriptor::default().into()).unwrap_err();
        assert!(matches!(error, FetchError::InvalidRequestShape(_)));
        assert!(transport.calls.lock().unwrap().is_empty());
        assert!(source.channels().is_empty());
    }

    #[tokio::test]
    async fn completion_reaches_every_channel() {
        let (mut mux, source, _) = mux();
        let handle = mux.accept("u1".into()).unwrap();
        mux.complete();

        assert_eq!(source.state(), ChannelState::Completed);
        assert_eq!(source.channel("u1").unwrap().state(), ChannelState::Completed);
        assert_eq!(handle.await, Ok("u1".to_string()));
    }

    #[tokio::test]
    async fn abort_wraps_local_errors_as_upstream() {
        let (mut mux, source, _) = mux();
        mux.accept("u1".into()).unwrap();
        mux.abort(FetchError::SourceClosed);

        let expected = FetchError::upstream(FetchError::SourceClosed);
        assert_eq!(source.state(), ChannelState::Failed(expected.clone()));
        assert_eq!(source.channel("u1").unwrap().state(), ChannelState::Failed(expected));
    }
}
