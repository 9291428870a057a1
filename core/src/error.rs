//! Error taxonomy shared by every layer of the fetch pipeline.
//!
//! Errors are `Clone` because a terminal failure is replayed to every current and
//! future subscriber of the channel that carries it.

use thiserror::Error;

/// Failure reported by a [`Transport`](crate::transport::Transport).
///
/// A transport that receives an HTTP error status should still return `Ok`: the
/// status is part of the response, which this crate never interprets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be issued or the connection failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The transport gave up waiting for a response
    #[error("Request timed out")]
    Timeout,

    /// Any other transport-specific failure
    #[error("Transport error: {0}")]
    Other(String),
}

/// Errors surfaced by request normalization and the response multiplexer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The input was neither a resource string nor a well-formed request object
    ///
    /// Returned to the producer of the request; other in-flight requests are
    /// unaffected.
    #[error("Invalid request shape: {0}")]
    InvalidRequestShape(String),

    /// The transport rejected this request
    ///
    /// Terminal failure of exactly one response handle.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request stream itself failed
    ///
    /// Delivered to the response source and to every open keyed channel.
    #[error("Request stream failed: {0}")]
    Upstream(String),

    /// The request stream has already completed or failed
    #[error("Request stream is closed")]
    SourceClosed,
}

impl FetchError {
    /// Build an [`FetchError::InvalidRequestShape`] from any message.
    #[must_use]
    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        Self::InvalidRequestShape(reason.into())
    }

    /// Build an [`FetchError::Upstream`] from any displayable error.
    #[must_use]
    pub fn upstream(error: impl std::fmt::Display) -> Self {
        Self::Upstream(error.to_string())
    }

    /// Whether this failure belongs to a single request rather than the stream.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::InvalidRequestShape(_) | Self::Transport(_))
    }
}
