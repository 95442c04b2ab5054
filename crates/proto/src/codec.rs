//! Length prefixed codec for bridge frames
//!
//! Each frame on the channel is prefixed with its length as a big endian `u32`.
//! Plugin messaging delivers whole messages, so push API callers decode one
//! message at a time and discard whatever `buffer_size` still reports after
//! the last complete frame. The prefix keeps the codec usable over plain byte
//! streams as well (see the `tokio_util` impls below).

use crate::error::{ProtocolError, Result};
use crate::frame::Frame;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default upper bound for a single frame body
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Codec for encoding and decoding bridge frames
#[derive(Debug)]
pub struct BridgeCodec {
    /// Largest accepted frame body
    max_frame_size: usize,
    /// Decoder buffer for the push based API
    buffer: BytesMut,
}

impl Clone for BridgeCodec {
    fn clone(&self) -> Self {
        Self {
            max_frame_size: self.max_frame_size,
            buffer: BytesMut::new(),
        }
    }
}

impl BridgeCodec {
    /// Create a codec with the default frame limit
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom frame limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            buffer: BytesMut::with_capacity(1024),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a frame including its length prefix
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        write_frame(frame, self.max_frame_size, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Add received data to the decoder buffer
    pub fn add_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode one frame from the buffer.
    ///
    /// A malformed body is consumed so the next call starts at the following
    /// frame. An oversized length prefix cannot be skipped safely and clears the
    /// whole buffer.
    pub fn decode_next(&mut self) -> Result<Option<Frame>> {
        match read_frame(&mut self.buffer, self.max_frame_size) {
            Err(error @ ProtocolError::FrameTooLarge { .. }) => {
                self.buffer.clear();
                Err(error)
            }
            other => other,
        }
    }

    /// Decode every complete frame, stopping at the first error
    pub fn decode_all(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();

        while let Some(frame) = self.decode_next()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Get the current buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }
}

impl Default for BridgeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BridgeCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        read_frame(src, self.max_frame_size)
    }
}

impl Encoder<Frame> for BridgeCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        write_frame(&frame, self.max_frame_size, dst)
    }
}

fn write_frame(frame: &Frame, max_frame_size: usize, dst: &mut BytesMut) -> Result<()> {
    let len = frame.encoded_len();
    if len > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    dst.reserve(LENGTH_PREFIX + len);
    // len <= max_frame_size, which callers keep well below u32::MAX
    dst.put_u32(len as u32);
    frame.encode(dst)
}

fn read_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    if src.len() < LENGTH_PREFIX {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: max_frame_size,
        });
    }

    if src.len() < LENGTH_PREFIX + len {
        src.reserve(LENGTH_PREFIX + len - src.len());
        return Ok(None);
    }

    src.advance(LENGTH_PREFIX);
    let body = src.split_to(len).freeze();
    Frame::decode(body).map(Some)
}
