//! Proxy side of the bridge
//!
//! Decodes request frames, resolves them against the local registry and
//! writes a response frame for each.

use super::transport::{drain_frames, BridgeChannel};
use super::TargetContext;
use crate::metrics::BridgeMetrics;
use crate::placeholder::ResolverRegistry;
use bytes::Bytes;
use parking_lot::Mutex;
use proto::{BridgeCodec, Frame, RequestFrame, ResponseFrame};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct BridgeResponder {
    registry: Arc<ResolverRegistry>,
    channel: Arc<dyn BridgeChannel>,
    codec: Mutex<BridgeCodec>,
    metrics: BridgeMetrics,
}

impl BridgeResponder {
    pub fn new(registry: Arc<ResolverRegistry>, channel: Arc<dyn BridgeChannel>, max_frame_size: usize) -> Self {
        Self {
            registry,
            channel,
            codec: Mutex::new(BridgeCodec::with_max_frame_size(max_frame_size)),
            metrics: BridgeMetrics::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ResolverRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// Answer every request frame in `data`, returning how many were answered
    pub async fn handle_inbound(&self, data: &[u8]) -> usize {
        let requests: Vec<RequestFrame> = drain_frames(&self.codec, data, &self.metrics)
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Request(request) => Some(request),
                Frame::Response(response) => {
                    tracing::debug!(request_id = %response.id, "Ignoring response frame on the request path");
                    None
                }
            })
            .collect();

        let mut answered = 0;
        for request in requests {
            if self.answer(request).await {
                answered += 1;
            }
        }
        answered
    }

    async fn answer(&self, request: RequestFrame) -> bool {
        let target = TargetContext::new(request.target);
        let value = self.registry.resolve_key(&request.key, &target).await;

        if value.is_some() {
            self.metrics.responses_resolved.inc();
        } else {
            self.metrics.responses_rejected.inc();
            tracing::debug!(key = %request.key, %target, "No local resolver answered bridge request");
        }

        let response = ResponseFrame {
            id: request.id,
            success: value.is_some(),
            value: value.unwrap_or_default(),
        };

        let payload = match self.encode(response) {
            Some(payload) => payload,
            None => return false,
        };

        match self.channel.send(payload) {
            Ok(()) => true,
            Err(error) => {
                self.metrics.transport_failures.inc();
                tracing::warn!(request_id = %request.id, %error, "Failed to send bridge response");
                false
            }
        }
    }

    /// Encode `response`, degrading to an unsuccessful answer if the value
    /// does not fit in a frame
    fn encode(&self, response: ResponseFrame) -> Option<Bytes> {
        let codec = self.codec.lock();
        let id = response.id;

        match codec.encode_frame(&Frame::from(response)) {
            Ok(payload) => Some(payload),
            Err(error) => {
                tracing::warn!(request_id = %id, %error, "Bridge response does not fit, answering unresolved");
                let failure = Frame::from(ResponseFrame {
                    id,
                    success: false,
                    value: String::new(),
                });
                codec.encode_frame(&failure).ok()
            }
        }
    }

    /// Answer every message from `receiver` until cancelled or the channel closes
    pub fn spawn(self: &Arc<Self>, mut receiver: mpsc::Receiver<Bytes>, token: CancellationToken) -> JoinHandle<()> {
        let responder = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    message = receiver.recv() => match message {
                        Some(data) => {
                            responder.handle_inbound(&data).await;
                        }
                        None => {
                            tracing::debug!("Bridge responder channel closed");
                            break;
                        }
                    },
                }
            }
        })
    }
}
