use serde::{Deserialize, Serialize};

/// Server-side revision policy for client-requested monitoring parameters.
///
/// OPC UA allows the server to revise requested sampling intervals and queue
/// sizes; the revised values are reported back through the create/modify
/// results. Deserializable so hosts can load it from their configuration
/// tree alongside the rest of their settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MonitorLimits {
    /// Floor applied to requested sampling intervals. Zero keeps
    /// report-on-change items unthrottled.
    #[serde(default = "MonitorLimits::min_sampling_interval_ms_default")]
    pub min_sampling_interval_ms: f64,
    /// Cap applied to requested queue sizes. Zero means uncapped.
    #[serde(default = "MonitorLimits::max_queue_size_default")]
    pub max_queue_size: u32,
    /// Maximum monitored items attached to a single node. Zero means
    /// unlimited.
    #[serde(default)]
    pub max_monitored_items_per_node: usize,
}

impl MonitorLimits {
    fn min_sampling_interval_ms_default() -> f64 {
        0.0
    }

    fn max_queue_size_default() -> u32 {
        1_000
    }

    /// Revise a requested sampling interval. Negative requests mean "server
    /// default" and resolve to the configured minimum.
    pub fn revise_sampling_interval(&self, requested_ms: f64) -> f64 {
        requested_ms.max(0.0).max(self.min_sampling_interval_ms)
    }

    /// Revise a requested queue size against the configured cap.
    pub fn revise_queue_size(&self, requested: u32) -> u32 {
        if self.max_queue_size > 0 {
            requested.min(self.max_queue_size)
        } else {
            requested
        }
    }
}

impl Default for MonitorLimits {
    fn default() -> Self {
        Self {
            min_sampling_interval_ms: Self::min_sampling_interval_ms_default(),
            max_queue_size: Self::max_queue_size_default(),
            max_monitored_items_per_node: 0,
        }
    }
}
