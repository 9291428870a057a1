//! Driver configuration.
//!
//! Configuration values are supplied by the application; every field has a
//! default suitable for most uses.

/// How much of the channel history the outer response source replays to a new
/// subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceReplay {
    /// Every keyed channel created so far, in creation order.
    ///
    /// Lets `by_key` / `by_url` find channels for keys requested before the
    /// subscription.
    #[default]
    All,

    /// Only the most recently created channel.
    Latest,
}

/// Fetch driver configuration.
///
/// Keyed channels always replay exactly the last response handle; that depth
/// is not configurable.
///
/// # Example
///
/// ```
/// use composable_fetch_runtime::config::{DriverConfig, SourceReplay};
///
/// let config = DriverConfig::new("catalog")
///     .with_source_replay(SourceReplay::Latest)
///     .with_metrics(false);
/// assert_eq!(config.label, "catalog");
/// ```
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Name used for the tracing span and as the `driver` metric label.
    ///
    /// Default: `"fetch"`
    pub label: String,

    /// Replay policy of the outer response source.
    ///
    /// Default: [`SourceReplay::All`]
    pub source_replay: SourceReplay,

    /// Whether to emit metrics.
    ///
    /// Default: `true`
    pub metrics_enabled: bool,
}

impl DriverConfig {
    /// Default configuration with a custom label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Set the source replay policy.
    #[must_use]
    pub const fn with_source_replay(mut self, source_replay: SourceReplay) -> Self {
        self.source_replay = source_replay;
        self
    }

    /// Enable or disable metrics.
    #[must_use]
    pub const fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            label: "fetch".to_string(),
            source_replay: SourceReplay::All,
            metrics_enabled: true,
        }
    }
}
