//! # Composable Fetch Core
//!
//! Core types for the Composable Fetch request multiplexer.
//!
//! This crate holds everything that does not need a runtime: the accepted
//! request shapes and their normalization, correlation keys, isolation
//! namespaces, the transport boundary, and the error taxonomy. The tokio-driven
//! multiplexer lives in `composable-fetch-runtime`.
//!
//! ## Core Concepts
//!
//! - **Request input**: a bare resource string, a structured descriptor, or an
//!   already-normalized record
//! - **Request record**: canonical request with a derived [`RequestKey`]
//! - **Namespace**: copy-on-write list of isolation scopes on a record
//! - **Transport**: injected async operation that performs one request
//!
//! ## Example
//!
//! ```
//! use composable_fetch_core::{normalize, RequestDescriptor, RequestInput};
//!
//! let record = normalize(RequestInput::from("http://api.test/resource")).unwrap();
//! assert_eq!(record.key(), "http://api.test/resource");
//!
//! let record = normalize(RequestDescriptor::new("u1").with_key("r1").into()).unwrap();
//! assert_eq!(record.key(), "r1");
//! assert_eq!(record.resource(), "u1");
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Error taxonomy
pub mod error;

/// Correlation keys
pub mod key;

/// Isolation namespaces
pub mod namespace;

/// Request shapes and normalization
pub mod request;

/// Transport boundary
pub mod transport;

pub use error::{FetchError, TransportError};
pub use key::RequestKey;
pub use namespace::{Namespace, ScopeId};
pub use request::{
    NativeRequest, RequestDescriptor, RequestInput, RequestOptions, RequestRecord, normalize,
    normalize_value,
};
pub use transport::{Transport, TransportFuture};

/// Environment module - Dependency injection traits
///
/// External dependencies that are not the transport itself are abstracted
/// behind traits and injected into the driver.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Used to stamp response handles with the time their request was issued.
    ///
    /// # Examples
    ///
    /// ```
    /// use composable_fetch_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
