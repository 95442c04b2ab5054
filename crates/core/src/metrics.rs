//! Bridge metrics
//!
//! Counters are plain prometheus-client metrics. They are cheap to clone and
//! share their state, so the same handles are stored in the bridge components
//! and registered with an embedding application's registry.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};

/// Live metric handles for one bridge coordinator
#[derive(Debug, Clone, Default)]
pub struct BridgeMetrics {
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub requests_dispatched: Counter,
    pub responses_resolved: Counter,
    pub responses_rejected: Counter,
    pub timeouts: Counter,
    pub transport_failures: Counter,
    pub malformed_frames: Counter,
    pub late_responses: Counter,
    pub pending_requests: Gauge,
}

/// Point in time copy of [`BridgeMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub requests_dispatched: u64,
    pub responses_resolved: u64,
    pub responses_rejected: u64,
    pub timeouts: u64,
    pub transport_failures: u64,
    pub malformed_frames: u64,
    pub late_responses: u64,
    pub pending_requests: i64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every metric under the `lyttleutils_bridge` prefix
    pub fn register(&self, registry: &mut Registry) {
        let bridge = registry.sub_registry_with_prefix("lyttleutils_bridge");

        bridge.register("cache_hits", "Lookups answered from the resolution cache", self.cache_hits.clone());
        bridge.register("cache_misses", "Lookups that required a bridge request", self.cache_misses.clone());
        bridge.register(
            "requests_dispatched",
            "Requests handed to the transport",
            self.requests_dispatched.clone(),
        );
        bridge.register(
            "responses_resolved",
            "Requests answered with a value",
            self.responses_resolved.clone(),
        );
        bridge.register(
            "responses_rejected",
            "Requests the remote side could not resolve",
            self.responses_rejected.clone(),
        );
        bridge.register("timeouts", "Requests that missed their deadline", self.timeouts.clone());
        bridge.register(
            "transport_failures",
            "Requests that could not be dispatched",
            self.transport_failures.clone(),
        );
        bridge.register("malformed_frames", "Received frames that failed to decode", self.malformed_frames.clone());
        bridge.register(
            "late_responses",
            "Responses that arrived after their request finished",
            self.late_responses.clone(),
        );
        bridge.register("pending_requests", "Requests awaiting a response", self.pending_requests.clone());
    }

    pub fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
            requests_dispatched: self.requests_dispatched.get(),
            responses_resolved: self.responses_resolved.get(),
            responses_rejected: self.responses_rejected.get(),
            timeouts: self.timeouts.get(),
            transport_failures: self.transport_failures.get(),
            malformed_frames: self.malformed_frames.get(),
            late_responses: self.late_responses.get(),
            pending_requests: self.pending_requests.get(),
        }
    }

    /// Render the metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> anyhow::Result<String> {
        let mut registry = Registry::default();
        self.register(&mut registry);

        let mut output = String::new();
        encode(&mut output, &registry)?;
        Ok(output)
    }
}

impl BridgeStats {
    /// Share of lookups served from the cache, 0.0 when nothing was looked up
    pub fn cache_hit_ratio(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}
