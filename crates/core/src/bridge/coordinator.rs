//! Bridge coordinator
//!
//! The façade plugin code calls. A resolution walks
//! `cache check -> register -> dispatch -> wait`, and every way that walk can
//! fail ends in the caller's fallback value rather than an error.

use super::cache::ResolutionCache;
use super::correlator::RequestCorrelator;
use super::transport::{BridgeChannel, TransportAdapter};
use super::{instant_after, ResolutionOutcome, ResolutionRequest, TargetContext};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::metrics::{BridgeMetrics, BridgeStats};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What one maintenance sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_requests: usize,
    pub evicted_entries: usize,
}

/// Resolves placeholders on the far side of the bridge
pub struct BridgeCoordinator {
    config: BridgeConfig,
    cache: ResolutionCache,
    correlator: RequestCorrelator,
    transport: TransportAdapter,
    metrics: Arc<BridgeMetrics>,
}

impl BridgeCoordinator {
    pub fn new(config: BridgeConfig, channel: Arc<dyn BridgeChannel>) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(BridgeMetrics::new());
        tracing::debug!(
            channel = %config.channel,
            timeout_ms = config.request_timeout_ms,
            ttl_ms = config.cache_ttl_ms,
            "Creating bridge coordinator"
        );

        Ok(Self {
            cache: ResolutionCache::new(config.cache_capacity, config.cache_ttl()),
            correlator: RequestCorrelator::new(),
            transport: TransportAdapter::new(channel, config.max_frame_size, Arc::clone(&metrics)),
            metrics,
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> BridgeStats {
        self.metrics.snapshot()
    }

    /// Resolve `key` for `target`, returning `fallback` on any failure.
    ///
    /// Suspends only while waiting for the remote side, never longer than
    /// `timeout`. A failed dispatch returns immediately.
    pub async fn resolve(&self, key: &str, target: &TargetContext, timeout: Duration, fallback: &str) -> String {
        match self.try_resolve(key, target, timeout).await {
            Ok(value) => value,
            Err(error) => {
                if error.is_internal_defect() {
                    tracing::error!(key, %target, %error, "Placeholder resolution hit an internal defect");
                } else {
                    tracing::debug!(key, %target, %error, "Placeholder resolution fell back");
                }
                fallback.to_owned()
            }
        }
    }

    /// [`resolve`](Self::resolve) with the configured timeout and fallback
    pub async fn resolve_default(&self, key: &str, target: &TargetContext) -> String {
        self.resolve(key, target, self.config.request_timeout(), &self.config.fallback)
            .await
    }

    /// Resolve `key` for `target` and report why it failed, if it did
    #[tracing::instrument(level = "trace", skip(self, target), fields(target = %target))]
    pub async fn try_resolve(&self, key: &str, target: &TargetContext, timeout: Duration) -> Result<String> {
        if let Some(value) = self.cache.get(key, target) {
            self.metrics.cache_hits.inc();
            return Ok(value);
        }
        self.metrics.cache_misses.inc();

        if !self.transport.is_open() {
            self.metrics.transport_failures.inc();
            tracing::debug!(key, "Bridge channel is closed, not dispatching");
            return Err(BridgeError::TransportUnavailable("bridge channel is closed".to_owned()));
        }

        let request = ResolutionRequest::new(key, target.clone());
        let id = request.id();
        let deadline = instant_after(Instant::now(), timeout);

        let pending = self.correlator.register(request, deadline)?;
        self.update_pending_gauge();

        if let Err(error) = self.transport.send(pending.request()) {
            self.correlator.fail(id);
            self.update_pending_gauge();
            self.metrics.transport_failures.inc();
            tracing::warn!(request_id = %id, key, %error, "Failed to dispatch bridge request");
            return Err(error);
        }
        self.metrics.requests_dispatched.inc();

        let outcome = match tokio::time::timeout_at(deadline, pending.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.correlator.expire(id);
                ResolutionOutcome::TimedOut
            }
        };
        self.update_pending_gauge();

        match outcome {
            ResolutionOutcome::Resolved(value) => {
                self.metrics.responses_resolved.inc();
                self.cache
                    .put(key, target.clone(), value.as_str(), self.config.cache_ttl());
                Ok(value)
            }
            ResolutionOutcome::Rejected => {
                self.metrics.responses_rejected.inc();
                Err(BridgeError::Unresolved(key.to_owned()))
            }
            ResolutionOutcome::TimedOut => {
                self.metrics.timeouts.inc();
                Err(BridgeError::Timeout(timeout))
            }
            ResolutionOutcome::TransportFailed => {
                self.metrics.transport_failures.inc();
                Err(BridgeError::TransportUnavailable("bridge shut down".to_owned()))
            }
        }
    }

    /// Receive path: decode `data` and complete matching requests.
    ///
    /// Returns how many pending requests were completed.
    pub fn handle_inbound(&self, data: &[u8]) -> usize {
        let mut completed = 0;
        for response in self.transport.receive(data) {
            if self.correlator.complete(response) {
                completed += 1;
            } else {
                self.metrics.late_responses.inc();
            }
        }

        self.update_pending_gauge();
        completed
    }

    pub fn invalidate(&self, key: &str, target: &TargetContext) -> bool {
        self.cache.invalidate(key, target)
    }

    /// Forget everything cached for `target`, e.g. when the player leaves
    pub fn invalidate_target(&self, target: &TargetContext) -> usize {
        let removed = self.cache.invalidate_target(target);
        tracing::debug!(%target, removed, "Invalidated cached placeholders");
        removed
    }

    /// Expire overdue requests and purge expired cache entries
    pub fn run_maintenance(&self) -> SweepReport {
        let report = SweepReport {
            expired_requests: self.correlator.expire_overdue(Instant::now()),
            evicted_entries: self.cache.purge_expired(),
        };
        self.update_pending_gauge();

        if report != SweepReport::default() {
            tracing::debug!(
                expired_requests = report.expired_requests,
                evicted_entries = report.evicted_entries,
                "Bridge maintenance sweep"
            );
        }

        report
    }

    /// Feed every message from `receiver` into [`handle_inbound`](Self::handle_inbound)
    pub fn spawn_inbound(self: &Arc<Self>, mut receiver: mpsc::Receiver<Bytes>, token: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    message = receiver.recv() => match message {
                        Some(data) => {
                            coordinator.handle_inbound(&data);
                        }
                        None => {
                            tracing::debug!("Bridge inbound channel closed");
                            break;
                        }
                    },
                }
            }
        })
    }

    /// Run [`run_maintenance`](Self::run_maintenance) every sweep interval
    pub fn spawn_maintenance(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut interval = tokio::time::interval(self.config.sweep_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        coordinator.run_maintenance();
                    }
                }
            }
        })
    }

    /// Fail every pending request; waiting callers receive their fallback
    pub fn shutdown(&self) -> usize {
        let failed = self.correlator.fail_all();
        self.update_pending_gauge();
        tracing::info!(failed, "Bridge coordinator shut down");
        failed
    }

    fn update_pending_gauge(&self) {
        let pending = i64::try_from(self.correlator.pending_count()).unwrap_or(i64::MAX);
        self.metrics.pending_requests.set(pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ChannelEnd, MemoryChannel, ResolutionResponse};
    use proto::{BridgeCodec, Frame, RequestFrame, ResponseFrame};

    fn coordinator() -> (BridgeCoordinator, ChannelEnd) {
        let (backend, proxy) = MemoryChannel::pair(64);
        let coordinator = BridgeCoordinator::new(BridgeConfig::default(), Arc::new(backend.channel)).unwrap();
        (coordinator, proxy)
    }

    fn decode_request(payload: &[u8]) -> RequestFrame {
        let mut codec = BridgeCodec::new();
        codec.add_data(payload);
        match codec.decode_next().unwrap() {
            Some(Frame::Request(request)) => request,
            other => panic!("expected a request frame, got {:?}", other),
        }
    }

    fn encode_response(id: uuid::Uuid, value: Option<&str>) -> Bytes {
        let frame = Frame::from(ResponseFrame {
            id,
            success: value.is_some(),
            value: value.unwrap_or_default().to_owned(),
        });
        BridgeCodec::new().encode_frame(&frame).unwrap()
    }

    /// Answer the next request the proxy end receives
    async fn answer(coordinator: &BridgeCoordinator, proxy: &mut ChannelEnd, value: Option<&str>) -> RequestFrame {
        let payload = proxy.inbound.recv().await.unwrap();
        let request = decode_request(&payload);
        coordinator.handle_inbound(&encode_response(request.id, value));
        request
    }

    #[tokio::test]
    async fn test_resolves_then_serves_from_cache() {
        let (coordinator, mut proxy) = coordinator();
        let target = TargetContext::new("player-123");
        let timeout = Duration::from_secs(2);

        let (value, request) = tokio::join!(
            coordinator.resolve("rank", &target, timeout, ""),
            answer(&coordinator, &mut proxy, Some("Gold"))
        );
        assert_eq!(value, "Gold");
        assert_eq!(request.key, "rank");
        assert_eq!(request.target, "player-123");

        assert_eq!(coordinator.resolve("rank", &target, timeout, "").await, "Gold");
        assert!(proxy.inbound.try_recv().is_err());

        let stats = coordinator.stats();
        assert_eq!(stats.requests_dispatched, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.responses_resolved, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_fallback_and_discards_late_response() {
        let (coordinator, mut proxy) = coordinator();
        let target = TargetContext::new("player-123");

        let started = Instant::now();
        let value = coordinator
            .resolve("rank", &target, Duration::from_secs(2), "")
            .await;
        assert_eq!(value, "");
        assert!(started.elapsed() >= Duration::from_secs(2));

        let request = decode_request(&proxy.inbound.try_recv().unwrap());
        assert!(!coordinator.correlator().is_pending(request.id));
        assert_eq!(coordinator.handle_inbound(&encode_response(request.id, Some("Gold"))), 0);
        assert!(!coordinator
            .correlator()
            .complete(ResolutionResponse::resolved(request.id, "Gold")));

        let stats = coordinator.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.late_responses, 1);
        assert_eq!(stats.pending_requests, 0);
        assert!(coordinator.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_returns_fallback_immediately() {
        let (coordinator, proxy) = coordinator();
        drop(proxy);

        let started = Instant::now();
        let value = coordinator
            .resolve("rank", &"player-123".into(), Duration::from_secs(2), "N/A")
            .await;

        assert_eq!(value, "N/A");
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(coordinator.correlator().pending_count(), 0);
        assert_eq!(coordinator.stats().transport_failures, 1);
    }

    struct Unplugged {
        sent: std::sync::atomic::AtomicUsize,
    }

    impl BridgeChannel for Unplugged {
        fn send(&self, _payload: Bytes) -> Result<()> {
            self.sent.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn is_open(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_fails_before_dispatch() {
        let channel = Arc::new(Unplugged {
            sent: Default::default(),
        });
        let coordinator = BridgeCoordinator::new(BridgeConfig::default(), Arc::clone(&channel) as _).unwrap();

        let result = coordinator
            .try_resolve("rank", &"player-123".into(), Duration::from_secs(2))
            .await;

        assert!(matches!(result, Err(BridgeError::TransportUnavailable(msg)) if msg.contains("closed")));
        assert_eq!(channel.sent.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(coordinator.correlator().pending_count(), 0);

        let stats = coordinator.stats();
        assert_eq!(stats.requests_dispatched, 0);
        assert_eq!(stats.transport_failures, 1);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_overflow() {
        let (coordinator, mut proxy) = coordinator();
        let target = TargetContext::new("player-123");

        let (value, _) = tokio::join!(
            coordinator.resolve("rank", &target, Duration::MAX, "FB"),
            answer(&coordinator, &mut proxy, Some("Gold"))
        );
        assert_eq!(value, "Gold");

        drop(proxy);
        let value = coordinator
            .resolve("balance", &target, Duration::MAX, "FB")
            .await;
        assert_eq!(value, "FB");
    }

    #[tokio::test]
    async fn test_truncated_response_does_not_block_the_next() {
        let (coordinator, mut proxy) = coordinator();
        let target = TargetContext::new("player-123");

        let reply = async {
            let request = decode_request(&proxy.inbound.recv().await.unwrap());
            let cut = encode_response(uuid::Uuid::new_v4(), Some("Silver"));
            assert_eq!(coordinator.handle_inbound(&cut[..20]), 0);
            coordinator.handle_inbound(&encode_response(request.id, Some("Gold")))
        };

        let (value, completed) = tokio::join!(
            coordinator.resolve("rank", &target, Duration::from_secs(2), "FB"),
            reply
        );

        assert_eq!(completed, 1);
        assert_eq!(value, "Gold");
        assert_eq!(coordinator.stats().malformed_frames, 1);
    }

    #[tokio::test]
    async fn test_rejected_response_is_not_cached() {
        let (coordinator, mut proxy) = coordinator();
        let target = TargetContext::new("player-123");

        let (result, _) = tokio::join!(
            coordinator.try_resolve("rank", &target, Duration::from_secs(2)),
            answer(&coordinator, &mut proxy, None)
        );

        assert!(matches!(result, Err(BridgeError::Unresolved(key)) if key == "rank"));
        assert!(coordinator.cache().is_empty());
        assert_eq!(coordinator.stats().responses_rejected, 1);
    }

    #[tokio::test]
    async fn test_resolve_default_uses_configured_fallback() {
        let (backend, proxy) = MemoryChannel::pair(1);
        drop(proxy);
        let config = BridgeConfig {
            fallback: "?".to_string(),
            ..BridgeConfig::default()
        };
        let coordinator = BridgeCoordinator::new(config, Arc::new(backend.channel)).unwrap();

        assert_eq!(coordinator.resolve_default("rank", &TargetContext::global()).await, "?");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distinct_keys() {
        let (backend, mut proxy) = MemoryChannel::pair(64);
        let coordinator = Arc::new(BridgeCoordinator::new(BridgeConfig::default(), Arc::new(backend.channel)).unwrap());
        let token = CancellationToken::new();
        let inbound = coordinator.spawn_inbound(backend.inbound, token.clone());

        let responder = tokio::spawn(async move {
            while let Some(payload) = proxy.inbound.recv().await {
                let request = decode_request(&payload);
                let value = format!("{}@{}", request.key, request.target);
                proxy
                    .channel
                    .send(encode_response(request.id, Some(&value)))
                    .unwrap();
            }
        });

        let lookups = (0..32).map(|i| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                let key = format!("key_{}", i);
                let target = TargetContext::new(format!("player-{}", i % 4));
                let value = coordinator
                    .resolve(&key, &target, Duration::from_secs(5), "")
                    .await;
                (key, target, value)
            })
        });

        for lookup in futures::future::join_all(lookups).await {
            let (key, target, value) = lookup.unwrap();
            assert_eq!(value, format!("{}@{}", key, target));
        }

        assert_eq!(coordinator.stats().requests_dispatched, 32);
        token.cancel();
        inbound.await.unwrap();
        responder.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_sweeps_abandoned_requests_and_expired_values() {
        let (coordinator, _proxy) = coordinator();
        let target = TargetContext::new("player-123");

        // Caller gives up before the bridge deadline
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            coordinator.resolve("rank", &target, Duration::from_secs(1), ""),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(coordinator.correlator().pending_count(), 1);

        coordinator
            .cache()
            .put("balance", target.clone(), "100", Duration::from_millis(500));

        tokio::time::advance(Duration::from_secs(2)).await;
        let report = coordinator.run_maintenance();

        assert_eq!(
            report,
            SweepReport {
                expired_requests: 1,
                evicted_entries: 1,
            }
        );
        assert_eq!(coordinator.stats().pending_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_task_stops_on_cancel() {
        let (coordinator, _proxy) = coordinator();
        let coordinator = Arc::new(coordinator);
        coordinator
            .cache()
            .put("rank", TargetContext::global(), "Gold", Duration::from_millis(1500));

        let token = CancellationToken::new();
        let handle = coordinator.spawn_maintenance(token.clone());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(coordinator.cache().is_empty());

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_fails_waiting_callers() {
        let (coordinator, _proxy) = coordinator();
        let target = TargetContext::new("player-123");

        let resolve = coordinator.try_resolve("rank", &target, Duration::from_secs(30));
        let shutdown = async {
            while coordinator.correlator().pending_count() == 0 {
                tokio::task::yield_now().await;
            }
            coordinator.shutdown()
        };

        let (result, failed) = tokio::join!(resolve, shutdown);
        assert_eq!(failed, 1);
        assert!(matches!(result, Err(BridgeError::TransportUnavailable(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (backend, _proxy) = MemoryChannel::pair(1);
        let config = BridgeConfig {
            cache_ttl_ms: 0,
            ..BridgeConfig::default()
        };

        assert!(matches!(
            BridgeCoordinator::new(config, Arc::new(backend.channel)),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_invalidation() {
        let (coordinator, _proxy) = coordinator();
        let target = TargetContext::new("player-123");
        coordinator.cache().put_default("rank", target.clone(), "Gold");
        coordinator.cache().put_default("balance", target.clone(), "100");

        assert!(coordinator.invalidate("rank", &target));
        assert_eq!(coordinator.invalidate_target(&target), 1);
        assert!(coordinator.cache().is_empty());
    }
}
