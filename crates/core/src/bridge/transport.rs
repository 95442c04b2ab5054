//! Transport between backend servers and the proxy
//!
//! The concrete delivery mechanism (plugin messaging through a connected
//! player, a socket, a message broker) sits behind [`BridgeChannel`]. The
//! adapter only turns requests into frames and received bytes back into
//! responses.

use super::{ResolutionRequest, ResolutionResponse};
use crate::error::{BridgeError, Result};
use crate::metrics::BridgeMetrics;
use bytes::Bytes;
use parking_lot::Mutex;
use proto::{BridgeCodec, Frame};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Opaque duplex byte channel to the other side of the bridge.
///
/// `send` must not block: it is called from the resolving task and may be
/// called from the server's main thread.
pub trait BridgeChannel: Send + Sync {
    /// Hand one encoded message to the channel
    fn send(&self, payload: Bytes) -> Result<()>;

    /// Whether the channel can currently accept messages
    fn is_open(&self) -> bool {
        true
    }
}

/// In-process channel backed by a bounded tokio `mpsc` queue.
///
/// Used when both ends of the bridge live in the same process and by tests.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    sender: mpsc::Sender<Bytes>,
}

/// One end of a [`MemoryChannel`] pair
#[derive(Debug)]
pub struct ChannelEnd {
    /// Writes to the opposite end
    pub channel: MemoryChannel,
    /// Messages written by the opposite end
    pub inbound: mpsc::Receiver<Bytes>,
}

impl MemoryChannel {
    /// Create two connected ends, each queue holding up to `capacity` messages
    pub fn pair(capacity: usize) -> (ChannelEnd, ChannelEnd) {
        let (left_tx, left_rx) = mpsc::channel(capacity);
        let (right_tx, right_rx) = mpsc::channel(capacity);

        (
            ChannelEnd {
                channel: MemoryChannel { sender: right_tx },
                inbound: left_rx,
            },
            ChannelEnd {
                channel: MemoryChannel { sender: left_tx },
                inbound: right_rx,
            },
        )
    }
}

impl BridgeChannel for MemoryChannel {
    fn send(&self, payload: Bytes) -> Result<()> {
        self.sender.try_send(payload).map_err(|error| match error {
            TrySendError::Full(_) => BridgeError::TransportUnavailable("bridge channel is full".to_owned()),
            TrySendError::Closed(_) => BridgeError::TransportUnavailable("bridge channel is closed".to_owned()),
        })
    }

    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Serializes requests onto a [`BridgeChannel`] and decodes responses
pub struct TransportAdapter {
    channel: Arc<dyn BridgeChannel>,
    codec: Mutex<BridgeCodec>,
    metrics: Arc<BridgeMetrics>,
}

impl TransportAdapter {
    pub fn new(channel: Arc<dyn BridgeChannel>, max_frame_size: usize, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            channel,
            codec: Mutex::new(BridgeCodec::with_max_frame_size(max_frame_size)),
            metrics,
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Encode `request` and hand it to the channel
    pub fn send(&self, request: &ResolutionRequest) -> Result<()> {
        let frame = Frame::from(request.to_frame());
        let payload = self.codec.lock().encode_frame(&frame).map_err(|error| {
            BridgeError::TransportUnavailable(format!("cannot encode request {}: {}", request.id(), error))
        })?;

        self.channel.send(payload)?;
        tracing::trace!(request_id = %request.id(), key = request.key(), "Dispatched bridge request");
        Ok(())
    }

    /// Decode one received message and return every response in it.
    ///
    /// Malformed and truncated frames are logged and dropped. Request frames
    /// are not expected on this side and are ignored.
    pub fn receive(&self, data: &[u8]) -> Vec<ResolutionResponse> {
        drain_frames(&self.codec, data, &self.metrics)
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Response(response) => Some(ResolutionResponse::from(response)),
                Frame::Request(request) => {
                    tracing::debug!(request_id = %request.id, "Ignoring request frame on the response path");
                    None
                }
            })
            .collect()
    }
}

/// Decode `data` as one whole message and collect every frame in it.
///
/// A channel message never continues in the next one, so bytes left over
/// after the last complete frame are a truncated frame. They are counted as
/// malformed and discarded.
pub(crate) fn drain_frames(codec: &Mutex<BridgeCodec>, data: &[u8], metrics: &BridgeMetrics) -> Vec<Frame> {
    let mut codec = codec.lock();
    codec.add_data(data);

    let mut frames = Vec::new();
    loop {
        // Every error consumes input, so this terminates
        match codec.decode_next() {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => break,
            Err(error) => {
                metrics.malformed_frames.inc();
                let error = BridgeError::MalformedResponse(error);
                tracing::warn!(%error, "Dropping malformed bridge frame");
            }
        }
    }

    let leftover = codec.buffer_size();
    if leftover > 0 {
        metrics.malformed_frames.inc();
        tracing::warn!(leftover, "Dropping truncated bridge frame");
        codec.clear_buffer();
    }

    frames
}
