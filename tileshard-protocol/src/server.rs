use tileshard_stream_codec::{take, ShortInput, WireCodec};

use crate::opcode::{batch, chat, connection, local_player, map, remote_player, system};
use crate::ReadPacketError;

/// One entry of an `S_Player_Spatial` batch: 13 bytes on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpatialEntry {
    pub player_id: u64,
    pub x: i16,
    pub y: i16,
    pub facing: u8,
}

impl WireCodec for SpatialEntry {
    type DecodeError = ShortInput;

    fn decode(r: &mut &[u8]) -> Result<Self, ShortInput> {
        Ok(Self {
            player_id: u64::decode(r)?,
            x: i16::decode(r)?,
            y: i16::decode(r)?,
            facing: u8::decode(r)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.player_id.encode(out);
        self.x.encode(out);
        self.y.encode(out);
        self.facing.encode(out);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerPacketKind {
    HandshakeAccepted,
    HandshakeRejected,
    Welcome,
    PositionCorrection,
    FacingCorrection,
    TileData,
    PlayerSpatial,
    LeftGame,
    ChatBroadcast,
    PingRequest,
    ServerShutdown,
}

impl ServerPacketKind {
    pub fn opcode(self) -> u8 {
        match self {
            Self::HandshakeAccepted => connection::S_HANDSHAKE_ACCEPTED,
            Self::HandshakeRejected => connection::S_HANDSHAKE_REJECTED,
            Self::Welcome => local_player::S_WELCOME,
            Self::PositionCorrection => local_player::S_POSITION_CORRECTION,
            Self::FacingCorrection => local_player::S_FACING_CORRECTION,
            Self::TileData => map::S_TILE_DATA,
            Self::PlayerSpatial => batch::S_PLAYER_SPATIAL,
            Self::LeftGame => remote_player::S_LEFT_GAME,
            Self::ChatBroadcast => chat::S_MESSAGE_BROADCAST,
            Self::PingRequest => connection::S_PING_REQUEST,
            Self::ServerShutdown => system::S_SERVER_SHUTDOWN,
        }
    }
}

impl TryFrom<u8> for ServerPacketKind {
    type Error = ReadPacketError;

    fn try_from(value: u8) -> Result<Self, ReadPacketError> {
        match value {
            connection::S_HANDSHAKE_ACCEPTED => Ok(Self::HandshakeAccepted),
            connection::S_HANDSHAKE_REJECTED => Ok(Self::HandshakeRejected),
            local_player::S_WELCOME => Ok(Self::Welcome),
            local_player::S_POSITION_CORRECTION => Ok(Self::PositionCorrection),
            local_player::S_FACING_CORRECTION => Ok(Self::FacingCorrection),
            map::S_TILE_DATA => Ok(Self::TileData),
            batch::S_PLAYER_SPATIAL => Ok(Self::PlayerSpatial),
            remote_player::S_LEFT_GAME => Ok(Self::LeftGame),
            chat::S_MESSAGE_BROADCAST => Ok(Self::ChatBroadcast),
            connection::S_PING_REQUEST => Ok(Self::PingRequest),
            system::S_SERVER_SHUTDOWN => Ok(Self::ServerShutdown),
            x => Err(ReadPacketError::InvalidOpcode(x)),
        }
    }
}

/// Everything the server may send to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerPacket {
    HandshakeAccepted {
        server_version: u16,
        server_magic: u32,
    },
    /// The rejection reason rides along as `[code:u8][len:u8][reason]`.
    HandshakeRejected {
        code: u8,
        reason: String,
    },
    Welcome {
        player_id: u64,
        x: i16,
        y: i16,
        facing: u8,
    },
    PositionCorrection {
        x: i16,
        y: i16,
        facing: u8,
    },
    FacingCorrection {
        facing: u8,
    },
    /// Row-major rectangle of tile kinds for client-side map sync.
    TileData {
        origin_x: i16,
        origin_y: i16,
        width: u8,
        height: u8,
        tiles: Vec<u8>,
    },
    PlayerSpatial(Vec<SpatialEntry>),
    LeftGame {
        player_id: u64,
    },
    ChatBroadcast {
        sender_id: u64,
        channel: u8,
        text: String,
    },
    PingRequest {
        timestamp: u32,
    },
    ServerShutdown {
        reason: u8,
    },
}

impl ServerPacket {
    pub fn kind(&self) -> ServerPacketKind {
        match self {
            Self::HandshakeAccepted { .. } => ServerPacketKind::HandshakeAccepted,
            Self::HandshakeRejected { .. } => ServerPacketKind::HandshakeRejected,
            Self::Welcome { .. } => ServerPacketKind::Welcome,
            Self::PositionCorrection { .. } => ServerPacketKind::PositionCorrection,
            Self::FacingCorrection { .. } => ServerPacketKind::FacingCorrection,
            Self::TileData { .. } => ServerPacketKind::TileData,
            Self::PlayerSpatial(_) => ServerPacketKind::PlayerSpatial,
            Self::LeftGame { .. } => ServerPacketKind::LeftGame,
            Self::ChatBroadcast { .. } => ServerPacketKind::ChatBroadcast,
            Self::PingRequest { .. } => ServerPacketKind::PingRequest,
            Self::ServerShutdown { .. } => ServerPacketKind::ServerShutdown,
        }
    }
}

impl WireCodec for ServerPacket {
    type DecodeError = ReadPacketError;

    fn decode(r: &mut &[u8]) -> Result<Self, ReadPacketError> {
        match ServerPacketKind::try_from(u8::decode(r)?)? {
            ServerPacketKind::HandshakeAccepted => Ok(Self::HandshakeAccepted {
                server_version: u16::decode(r)?,
                server_magic: u32::decode(r)?,
            }),
            ServerPacketKind::HandshakeRejected => {
                let code = u8::decode(r)?;
                let len = u8::decode(r)? as usize;
                let bytes = take(r, len)?;
                let reason = String::from_utf8_lossy(bytes).into_owned();
                Ok(Self::HandshakeRejected { code, reason })
            }
            ServerPacketKind::Welcome => Ok(Self::Welcome {
                player_id: u64::decode(r)?,
                x: i16::decode(r)?,
                y: i16::decode(r)?,
                facing: u8::decode(r)?,
            }),
            ServerPacketKind::PositionCorrection => Ok(Self::PositionCorrection {
                x: i16::decode(r)?,
                y: i16::decode(r)?,
                facing: u8::decode(r)?,
            }),
            ServerPacketKind::FacingCorrection => Ok(Self::FacingCorrection {
                facing: u8::decode(r)?,
            }),
            ServerPacketKind::TileData => {
                let origin_x = i16::decode(r)?;
                let origin_y = i16::decode(r)?;
                let width = u8::decode(r)?;
                let height = u8::decode(r)?;
                let tiles = take(r, width as usize * height as usize)?.to_vec();
                Ok(Self::TileData {
                    origin_x,
                    origin_y,
                    width,
                    height,
                    tiles,
                })
            }
            ServerPacketKind::PlayerSpatial => {
                let count = u8::decode(r)?;
                let mut entries = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    entries.push(SpatialEntry::decode(r)?);
                }
                Ok(Self::PlayerSpatial(entries))
            }
            ServerPacketKind::LeftGame => Ok(Self::LeftGame {
                player_id: u64::decode(r)?,
            }),
            ServerPacketKind::ChatBroadcast => Ok(Self::ChatBroadcast {
                sender_id: u64::decode(r)?,
                channel: u8::decode(r)?,
                text: String::decode(r)?,
            }),
            ServerPacketKind::PingRequest => Ok(Self::PingRequest {
                timestamp: u32::decode(r)?,
            }),
            ServerPacketKind::ServerShutdown => Ok(Self::ServerShutdown {
                reason: u8::decode(r)?,
            }),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.kind().opcode().encode(out);
        match self {
            Self::HandshakeAccepted {
                server_version,
                server_magic,
            } => {
                server_version.encode(out);
                server_magic.encode(out);
            }
            Self::HandshakeRejected { code, reason } => {
                code.encode(out);
                let bytes = reason.as_bytes();
                let len = bytes.len().min(u8::MAX as usize);
                (len as u8).encode(out);
                out.extend_from_slice(&bytes[..len]);
            }
            Self::Welcome {
                player_id,
                x,
                y,
                facing,
            } => {
                player_id.encode(out);
                x.encode(out);
                y.encode(out);
                facing.encode(out);
            }
            Self::PositionCorrection { x, y, facing } => {
                x.encode(out);
                y.encode(out);
                facing.encode(out);
            }
            Self::FacingCorrection { facing } => {
                facing.encode(out);
            }
            Self::TileData {
                origin_x,
                origin_y,
                width,
                height,
                tiles,
            } => {
                debug_assert_eq!(tiles.len(), *width as usize * *height as usize);
                origin_x.encode(out);
                origin_y.encode(out);
                width.encode(out);
                height.encode(out);
                out.extend_from_slice(tiles);
            }
            Self::PlayerSpatial(entries) => {
                debug_assert!(entries.len() <= u8::MAX as usize);
                (entries.len() as u8).encode(out);
                for entry in entries {
                    entry.encode(out);
                }
            }
            Self::LeftGame { player_id } => {
                player_id.encode(out);
            }
            Self::ChatBroadcast {
                sender_id,
                channel,
                text,
            } => {
                sender_id.encode(out);
                channel.encode(out);
                text.encode(out);
            }
            Self::PingRequest { timestamp } => {
                timestamp.encode(out);
            }
            Self::ServerShutdown { reason } => {
                reason.encode(out);
            }
        }
    }
}
