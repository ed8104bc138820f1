use thiserror::Error;

/// Two-byte magic at the start of every frame.
pub const FRAME_MAGIC: [u8; 2] = [0x11, 0x68];

/// Header is magic plus a big-endian payload size.
pub const FRAME_HEADER_LEN: usize = 4;

/// Payload sizes must satisfy `1 <= size < MAX_PAYLOAD_LEN`.
pub const MAX_PAYLOAD_LEN: usize = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad frame magic 0x{0:02x}{1:02x}")]
    BadMagic(u8, u8),

    #[error("bad frame payload size {0}")]
    BadSize(u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u16,
}

impl FrameHeader {
    /// Validates the magic and the size bounds of a raw header.
    pub fn parse(bytes: [u8; FRAME_HEADER_LEN]) -> Result<Self, FrameError> {
        if bytes[0] != FRAME_MAGIC[0] || bytes[1] != FRAME_MAGIC[1] {
            return Err(FrameError::BadMagic(bytes[0], bytes[1]));
        }
        let payload_len = u16::from_be_bytes([bytes[2], bytes[3]]);
        if payload_len == 0 || payload_len as usize >= MAX_PAYLOAD_LEN {
            return Err(FrameError::BadSize(payload_len));
        }
        Ok(Self { payload_len })
    }
}

/// Wraps a payload in a framed byte vector ready to write to the stream.
///
/// Panics if the payload violates the size bounds; all packet encoders in
/// this crate stay far below `MAX_PAYLOAD_LEN`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    assert!(!payload.is_empty() && payload.len() < MAX_PAYLOAD_LEN);
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
