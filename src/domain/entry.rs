//! Cached entry and its single-buffer encoding.
//!
//! Layout: `content-type bytes ++ 0x00 ++ body bytes`. The content-type is
//! either the hard-coded default or metadata reported by the object store, so
//! it never carries a NUL; the body may contain anything.

use bytes::{BufMut, Bytes, BytesMut};

use super::error::DecodeError;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const DELIMITER: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub content_type: String,
    pub body: Bytes,
}

impl CachedEntry {
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Build an entry from object-store output, falling back to the default content-type.
    pub fn from_object(content_type: Option<String>, body: Bytes) -> Self {
        Self {
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            body,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.content_type.len() + 1 + self.body.len());
        buf.put_slice(self.content_type.as_bytes());
        buf.put_u8(DELIMITER);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Split at the first NUL. The body is a zero-copy slice of `raw`.
    pub fn decode(raw: &Bytes) -> Result<Self, DecodeError> {
        let split = raw
            .iter()
            .position(|byte| *byte == DELIMITER)
            .ok_or(DecodeError::MissingDelimiter)?;

        let content_type = std::str::from_utf8(&raw[..split])
            .map_err(|_| DecodeError::ContentType)?
            .to_string();

        Ok(Self {
            content_type,
            body: raw.slice(split + 1..),
        })
    }
}
