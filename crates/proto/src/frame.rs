//! Bridge frame definitions
//!
//! Every frame starts with a one byte kind followed by the body. Strings are
//! length prefixed (big endian) UTF-8, identifiers are raw 16 byte UUIDs.
//!
//! ```text
//! request  := 0x01 id:[16] key:str16 target:str16
//! response := 0x02 id:[16] success:u8 value:str32
//! ```

use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Plugin messaging channel the bridge registers on
pub const CHANNEL_NAME: &str = "lyttleutils:placeholder";

/// Frame kind byte for resolution requests
pub const REQUEST_KIND: u8 = 0x01;

/// Frame kind byte for resolution responses
pub const RESPONSE_KIND: u8 = 0x02;

const ID_LEN: usize = 16;

/// Outbound resolution request as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub id: Uuid,
    pub key: String,
    pub target: String,
}

/// Inbound resolution response as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub id: Uuid,
    pub success: bool,
    pub value: String,
}

/// A decoded bridge frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request(RequestFrame),
    Response(ResponseFrame),
}

impl Frame {
    /// Kind byte written in front of the body
    pub fn kind(&self) -> u8 {
        match self {
            Self::Request(_) => REQUEST_KIND,
            Self::Response(_) => RESPONSE_KIND,
        }
    }

    /// Identifier carried by the frame
    pub fn id(&self) -> Uuid {
        match self {
            Self::Request(request) => request.id,
            Self::Response(response) => response.id,
        }
    }

    /// Number of bytes `encode` will write
    pub fn encoded_len(&self) -> usize {
        1 + ID_LEN
            + match self {
                Self::Request(request) => 2 + request.key.len() + 2 + request.target.len(),
                Self::Response(response) => 1 + 4 + response.value.len(),
            }
    }

    /// Write kind and body (without the outer length prefix)
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.reserve(self.encoded_len());
        buf.put_u8(self.kind());

        match self {
            Self::Request(request) => {
                buf.put_slice(request.id.as_bytes());
                put_str16(buf, "key", &request.key)?;
                put_str16(buf, "target", &request.target)?;
            }
            Self::Response(response) => {
                buf.put_slice(response.id.as_bytes());
                buf.put_u8(u8::from(response.success));
                put_str32(buf, "value", &response.value)?;
            }
        }

        Ok(())
    }

    /// Decode kind and body. The whole buffer must be consumed.
    pub fn decode(mut body: Bytes) -> Result<Self> {
        ensure_remaining(&body, 1)?;
        let kind = body.get_u8();

        let frame = match kind {
            REQUEST_KIND => {
                let id = get_uuid(&mut body)?;
                let key = get_str16(&mut body, "key")?;
                let target = get_str16(&mut body, "target")?;
                Self::Request(RequestFrame { id, key, target })
            }
            RESPONSE_KIND => {
                let id = get_uuid(&mut body)?;
                ensure_remaining(&body, 1)?;
                let success = body.get_u8() != 0;
                let value = get_str32(&mut body, "value")?;
                Self::Response(ResponseFrame { id, success, value })
            }
            other => return Err(ProtocolError::UnknownKind(other)),
        };

        if body.has_remaining() {
            return Err(ProtocolError::TrailingBytes(body.remaining()));
        }

        Ok(frame)
    }
}

impl From<RequestFrame> for Frame {
    fn from(frame: RequestFrame) -> Self {
        Self::Request(frame)
    }
}

impl From<ResponseFrame> for Frame {
    fn from(frame: ResponseFrame) -> Self {
        Self::Response(frame)
    }
}

fn ensure_remaining(buf: &Bytes, expected: usize) -> Result<()> {
    if buf.remaining() < expected {
        return Err(ProtocolError::Truncated {
            expected,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

fn put_str16(buf: &mut BytesMut, field: &'static str, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| ProtocolError::StringTooLong {
        field,
        len: value.len(),
        max: u16::MAX as usize,
    })?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_str32(buf: &mut BytesMut, field: &'static str, value: &str) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| ProtocolError::StringTooLong {
        field,
        len: value.len(),
        max: u32::MAX as usize,
    })?;
    buf.put_u32(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn get_uuid(buf: &mut Bytes) -> Result<Uuid> {
    ensure_remaining(buf, ID_LEN)?;
    let mut raw = [0u8; ID_LEN];
    buf.copy_to_slice(&mut raw);
    Ok(Uuid::from_bytes(raw))
}

fn get_str16(buf: &mut Bytes, field: &'static str) -> Result<String> {
    ensure_remaining(buf, 2)?;
    let len = buf.get_u16() as usize;
    get_utf8(buf, field, len)
}

fn get_str32(buf: &mut Bytes, field: &'static str) -> Result<String> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_u32() as usize;
    get_utf8(buf, field, len)
}

fn get_utf8(buf: &mut Bytes, field: &'static str, len: usize) -> Result<String> {
    ensure_remaining(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(field))
}
