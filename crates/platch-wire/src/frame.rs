use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Frame header: magic (2) + name length (2) + payload length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "PC" (0x50 0x43).
pub const MAGIC: [u8; 2] = [0x50, 0x43];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Maximum channel name length in bytes.
pub const MAX_CHANNEL_NAME: usize = 255;

/// One transport unit: a channel name plus an encoded payload.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The channel this message belongs to.
    pub channel: String,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(channel: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + name + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.channel.len() + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬──────────┬──────────┬────────────┬─────────────────┐
/// │ Magic (2B) │ NameLen  │ PayLen   │ Name       │ Payload          │
/// │ 0x50 0x43  │ (2B LE)  │ (4B LE)  │ (UTF-8)    │ (PayLen bytes)   │
/// │ "PC"       │          │          │            │                  │
/// └────────────┴──────────┴──────────┴────────────┴─────────────────┘
/// ```
pub fn encode_frame(channel: &str, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if channel.is_empty() || channel.len() > MAX_CHANNEL_NAME {
        return Err(WireError::InvalidChannelName {
            len: channel.len(),
            max: MAX_CHANNEL_NAME,
        });
    }
    if payload.len() > u32::MAX as usize {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + channel.len() + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u16_le(channel.len() as u16);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(channel.as_bytes());
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    // Check magic
    if src[0..2] != MAGIC {
        return Err(WireError::InvalidMagic);
    }

    let name_len = u16::from_le_bytes(src[2..4].try_into().unwrap()) as usize;
    let payload_len = u32::from_le_bytes(src[4..8].try_into().unwrap()) as usize;

    if name_len == 0 || name_len > MAX_CHANNEL_NAME {
        return Err(WireError::InvalidChannelName {
            len: name_len,
            max: MAX_CHANNEL_NAME,
        });
    }
    if payload_len > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + name_len + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let name_bytes = src.split_to(name_len);
    let channel =
        std::str::from_utf8(&name_bytes).map_err(|_| WireError::ChannelNameUtf8)?.to_string();
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame { channel, payload }))
}

/// Configuration for the frame codec.
///
/// I/O deadlines are the transport's business; set them on the stream
/// before handing it to a reader or writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let payload = b"hello, platch!";

        encode_frame("demo.methods", payload, &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + "demo.methods".len() + payload.len());

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(frame.channel, "demo.methods");
        assert_eq!(frame.payload.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x50, 0x43, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame("c", b"hello", &mut buf).unwrap();
        buf.truncate(buf.len() - 2);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn decode_invalid_magic() {
        let mut buf = BytesMut::from(&[0xFF, 0xFF, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(WireError::InvalidMagic)));
    }

    #[test]
    fn decode_payload_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(&MAGIC);
        buf.put_u16_le(1);
        buf.put_u32_le(1024 * 1024 * 32); // 32 MiB
        buf.put_u8(b'c');

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(WireError::PayloadTooLarge { .. })));
    }

    #[test]
    fn empty_channel_name_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_frame("", b"x", &mut buf).unwrap_err();
        assert!(matches!(err, WireError::InvalidChannelName { .. }));

        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u16_le(0);
        wire.put_u32_le(0);
        let err = decode_frame(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, WireError::InvalidChannelName { .. }));
    }

    #[test]
    fn oversized_channel_name_rejected() {
        let name = "c".repeat(MAX_CHANNEL_NAME + 1);
        let mut buf = BytesMut::new();
        let err = encode_frame(&name, b"x", &mut buf).unwrap_err();
        assert!(matches!(err, WireError::InvalidChannelName { .. }));
    }

    #[test]
    fn non_utf8_channel_name_rejected() {
        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u16_le(2);
        wire.put_u32_le(0);
        wire.put_slice(&[0xFF, 0xFE]);
        let err = decode_frame(&mut wire, DEFAULT_MAX_PAYLOAD).unwrap_err();
        assert!(matches!(err, WireError::ChannelNameUtf8));
    }

    #[test]
    fn multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame("first", b"one", &mut buf).unwrap();
        encode_frame("second", b"two", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f1.channel, "first");
        assert_eq!(f1.payload.as_ref(), b"one");

        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(f2.channel, "second");
        assert_eq!(f2.payload.as_ref(), b"two");

        assert!(buf.is_empty());
    }

    #[test]
    fn empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame("c", b"", &mut buf).unwrap();

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.channel, "c");
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn frame_wire_size() {
        let frame = Frame::new("ch", Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 2 + 4);
    }
}
