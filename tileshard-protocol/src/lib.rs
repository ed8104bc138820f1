//! Wire protocol: frame header, opcode table, and typed packets.
//!
//! Every frame on the TCP stream is `0x11 0x68 | size:u16 BE | payload`,
//! where the payload starts with a one-byte opcode. This crate owns the
//! closed set of packets in both directions and their byte layouts.

use thiserror::Error;
use tileshard_stream_codec::{DecodeStringError, ShortInput};

mod client;
mod frame;
pub mod opcode;
mod server;
#[cfg(test)]
mod tests;

pub use crate::client::{ClientPacket, ClientPacketKind};
pub use crate::frame::{
    encode_frame, FrameError, FrameHeader, FRAME_HEADER_LEN, FRAME_MAGIC, MAX_PAYLOAD_LEN,
};
pub use crate::server::{ServerPacket, ServerPacketKind, SpatialEntry};

/// Version the server speaks; handshakes with any other version are rejected.
pub const PROTOCOL_VERSION: u16 = 1;

/// Magic the client must present in its handshake payload.
pub const CLIENT_MAGIC: u32 = 0x5449_4c45;

/// Magic the server presents in its handshake acceptance.
pub const SERVER_MAGIC: u32 = 0x5348_5244;

/// Handshake rejection reason codes.
pub mod reject_code {
    pub const BAD_VERSION: u8 = 0x01;
    pub const BAD_MAGIC: u8 = 0x02;
    pub const SERVER_FULL: u8 = 0x03;
}

#[derive(Debug, Error)]
pub enum ReadPacketError {
    #[error("{0}")]
    ShortInput(#[from] ShortInput),

    #[error("{0}")]
    BadString(#[from] DecodeStringError),

    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    #[error("unexpected trailing data")]
    TrailingData,
}
