//! # Composable Fetch Runtime
//!
//! Runtime for the Composable Fetch multiplexer.
//!
//! This crate turns a stream of heterogeneous requests into a stream of keyed
//! response channels. Each request is normalized, issued once through a
//! [`Transport`](composable_fetch_core::Transport), and its response handle is
//! pushed onto the channel for its key. Channels replay their latest handle, so
//! a late subscriber sees the cached response without a second transport call.
//!
//! ## Core Components
//!
//! - **`FetchDriver`**: Starts a multiplexer over a request stream or a sink
//! - **`KeyedChannel`**: Replaying multicast channel of handles sharing a key
//! - **`ResponseSource`**: Stream of keyed channels with `by_key` / `by_url`
//!   filters and scope isolation
//! - **`ResponseHandle`**: Shared, awaitable outcome of one transport call
//!
//! ## Example
//!
//! ```ignore
//! use composable_fetch_runtime::FetchDriver;
//! use futures::StreamExt;
//!
//! let driver = FetchDriver::new(transport);
//! let source = driver.drive(futures::stream::iter(vec![
//!     "http://api.test/users".into(),
//!     "http://api.test/posts".into(),
//! ]));
//!
//! let mut users = source.by_url("http://api.test/users");
//! while let Some(Ok(channel)) = users.next().await {
//!     let mut responses = channel.responses();
//!     let first = responses.next().await;
//! }
//! ```

/// Keyed response channels
pub mod channel;

/// Driver configuration
pub mod config;

/// Driver façade and request sink
pub mod driver;

/// Shared response handles
pub mod handle;

/// HTTP transport backed by reqwest
#[cfg(feature = "http")]
pub mod http;

/// Transport invocation
pub mod invoker;

/// Scope isolation
pub mod isolation;

/// Prometheus metrics for observability
pub mod metrics;

mod multiplexer;

/// Multicast channels with replay
pub mod replay;

/// Response source and filtering accessors
pub mod source;

pub use channel::{HandleStream, KeyedChannel, ResponseStream};
pub use config::{DriverConfig, SourceReplay};
pub use driver::{FetchDriver, RequestSink};
pub use handle::{ResponseFuture, ResponseHandle};
pub use invoker::TransportInvoker;
pub use replay::{ChannelState, ReplayChannel, ReplayStream};
pub use source::{ChannelFilter, ChannelStream, ResponseSource};

#[cfg(feature = "http")]
pub use http::{HttpResponse, HttpTransport};
