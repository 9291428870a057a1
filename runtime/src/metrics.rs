//! Prometheus metrics for observability and monitoring.
//!
//! Every driver records its traffic through [`DriverMetrics`], labelled with the
//! driver's configured label:
//! - Requests routed and rejected
//! - Keyed channels created and currently open
//! - Transport failures and call duration
//! - Upstream (request stream) failures
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_fetch_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut exporter = MetricsExporter::new();
//! exporter.start()?;
//!
//! // Later, from whatever endpoint the application serves:
//! let body = exporter.render().unwrap_or_default();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics exporter.
///
/// Installs the global Prometheus recorder and renders the scrape payload. It
/// does not bind a listener; serving [`MetricsExporter::render`] is left to
/// the application.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl MetricsExporter {
    /// Exporter with no recorder installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed, payload available via render()");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "fetch_driver_requests_total",
        "Total number of requests routed to a keyed channel"
    );
    describe_counter!(
        "fetch_driver_requests_rejected_total",
        "Total number of inputs rejected by normalization"
    );
    describe_counter!(
        "fetch_driver_channels_created_total",
        "Total number of keyed channels created"
    );
    describe_gauge!(
        "fetch_driver_open_channels",
        "Keyed channels currently accepting responses"
    );
    describe_counter!(
        "fetch_driver_transport_failures_total",
        "Total number of transport calls that failed"
    );
    describe_histogram!(
        "fetch_driver_transport_duration_seconds",
        "Time from issuing a transport call until it settled"
    );
    describe_counter!(
        "fetch_driver_upstream_failures_total",
        "Total number of request streams that failed"
    );
}

/// Per-driver metrics recorder.
///
/// Cheap to clone; a disabled recorder does nothing.
#[derive(Debug, Clone)]
pub struct DriverMetrics {
    label: String,
    enabled: bool,
}

impl DriverMetrics {
    /// Recorder labelling every metric with `driver = label`.
    #[must_use]
    pub fn new(label: impl Into<String>, enabled: bool) -> Self {
        Self {
            label: label.into(),
            enabled,
        }
    }

    /// Recorder that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new("", false)
    }

    /// The driver label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Record a request routed to its channel.
    pub fn record_request(&self) {
        if self.enabled {
            counter!("fetch_driver_requests_total", "driver" => self.label.clone()).increment(1);
        }
    }

    /// Record an input rejected by normalization.
    pub fn record_rejection(&self) {
        if self.enabled {
            counter!("fetch_driver_requests_rejected_total", "driver" => self.label.clone())
                .increment(1);
        }
    }

    /// Record a new keyed channel; `open` is the number now open.
    pub fn record_channel_created(&self, open: usize) {
        if self.enabled {
            counter!("fetch_driver_channels_created_total", "driver" => self.label.clone())
                .increment(1);
            self.record_open_channels(open);
        }
    }

    /// Set the open channel gauge.
    pub fn record_open_channels(&self, open: usize) {
        if self.enabled {
            // Precision loss acceptable for metrics (channel counts < 2^52)
            #[allow(clippy::cast_precision_loss)]
            gauge!("fetch_driver_open_channels", "driver" => self.label.clone()).set(open as f64);
        }
    }

    /// Record a settled transport call.
    pub fn record_transport_settled(&self, duration: Duration, failed: bool) {
        if self.enabled {
            histogram!("fetch_driver_transport_duration_seconds", "driver" => self.label.clone())
                .record(duration.as_secs_f64());
            if failed {
                counter!("fetch_driver_transport_failures_total", "driver" => self.label.clone())
                    .increment(1);
            }
        }
    }

    /// Record a failed request stream.
    pub fn record_upstream_failure(&self) {
        if self.enabled {
            counter!("fetch_driver_upstream_failures_total", "driver" => self.label.clone())
                .increment(1);
        }
    }
}
