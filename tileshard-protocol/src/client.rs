use tileshard_stream_codec::WireCodec;

use crate::opcode::{chat, connection, movement};
use crate::ReadPacketError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientPacketKind {
    HandshakeRequest,
    MoveRequest,
    TurnRequest,
    WarpRequest,
    ChatSend,
    PongResponse,
    DisconnectRequest,
}

impl ClientPacketKind {
    pub fn opcode(self) -> u8 {
        match self {
            Self::HandshakeRequest => connection::C_HANDSHAKE_REQUEST,
            Self::MoveRequest => movement::C_MOVE_REQUEST,
            Self::TurnRequest => movement::C_TURN_REQUEST,
            Self::WarpRequest => movement::C_WARP_REQUEST,
            Self::ChatSend => chat::C_MESSAGE_SEND,
            Self::PongResponse => connection::C_PONG_RESPONSE,
            Self::DisconnectRequest => connection::C_DISCONNECT_REQUEST,
        }
    }
}

impl TryFrom<u8> for ClientPacketKind {
    type Error = ReadPacketError;

    fn try_from(value: u8) -> Result<Self, ReadPacketError> {
        match value {
            connection::C_HANDSHAKE_REQUEST => Ok(Self::HandshakeRequest),
            movement::C_MOVE_REQUEST => Ok(Self::MoveRequest),
            movement::C_TURN_REQUEST => Ok(Self::TurnRequest),
            movement::C_WARP_REQUEST => Ok(Self::WarpRequest),
            chat::C_MESSAGE_SEND => Ok(Self::ChatSend),
            connection::C_PONG_RESPONSE => Ok(Self::PongResponse),
            connection::C_DISCONNECT_REQUEST => Ok(Self::DisconnectRequest),
            x => Err(ReadPacketError::InvalidOpcode(x)),
        }
    }
}

/// Everything a client may send after the TCP stream is framed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientPacket {
    HandshakeRequest { version: u16, client_magic: u32 },
    MoveRequest { direction: u8, facing: u8 },
    TurnRequest { direction: u8 },
    WarpRequest { map_id: u16, x: i16, y: i16 },
    ChatSend { channel: u8, text: String },
    PongResponse { timestamp: u32 },
    DisconnectRequest,
}

impl ClientPacket {
    pub fn kind(&self) -> ClientPacketKind {
        match self {
            Self::HandshakeRequest { .. } => ClientPacketKind::HandshakeRequest,
            Self::MoveRequest { .. } => ClientPacketKind::MoveRequest,
            Self::TurnRequest { .. } => ClientPacketKind::TurnRequest,
            Self::WarpRequest { .. } => ClientPacketKind::WarpRequest,
            Self::ChatSend { .. } => ClientPacketKind::ChatSend,
            Self::PongResponse { .. } => ClientPacketKind::PongResponse,
            Self::DisconnectRequest => ClientPacketKind::DisconnectRequest,
        }
    }
}

impl WireCodec for ClientPacket {
    type DecodeError = ReadPacketError;

    fn decode(r: &mut &[u8]) -> Result<Self, ReadPacketError> {
        match ClientPacketKind::try_from(u8::decode(r)?)? {
            ClientPacketKind::HandshakeRequest => Ok(Self::HandshakeRequest {
                version: u16::decode(r)?,
                client_magic: u32::decode(r)?,
            }),
            ClientPacketKind::MoveRequest => Ok(Self::MoveRequest {
                direction: u8::decode(r)?,
                facing: u8::decode(r)?,
            }),
            ClientPacketKind::TurnRequest => Ok(Self::TurnRequest {
                direction: u8::decode(r)?,
            }),
            ClientPacketKind::WarpRequest => Ok(Self::WarpRequest {
                map_id: u16::decode(r)?,
                x: i16::decode(r)?,
                y: i16::decode(r)?,
            }),
            ClientPacketKind::ChatSend => Ok(Self::ChatSend {
                channel: u8::decode(r)?,
                text: String::decode(r)?,
            }),
            ClientPacketKind::PongResponse => Ok(Self::PongResponse {
                timestamp: u32::decode(r)?,
            }),
            ClientPacketKind::DisconnectRequest => Ok(Self::DisconnectRequest),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.kind().opcode().encode(out);
        match self {
            Self::HandshakeRequest {
                version,
                client_magic,
            } => {
                version.encode(out);
                client_magic.encode(out);
            }
            Self::MoveRequest { direction, facing } => {
                direction.encode(out);
                facing.encode(out);
            }
            Self::TurnRequest { direction } => {
                direction.encode(out);
            }
            Self::WarpRequest { map_id, x, y } => {
                map_id.encode(out);
                x.encode(out);
                y.encode(out);
            }
            Self::ChatSend { channel, text } => {
                channel.encode(out);
                text.encode(out);
            }
            Self::PongResponse { timestamp } => {
                timestamp.encode(out);
            }
            Self::DisconnectRequest => (),
        }
    }
}
