use tileshard_stream_codec::WireCodec;

use crate::opcode::{self, PayloadLen};
use crate::{
    encode_frame, ClientPacket, FrameHeader, ReadPacketError, ServerPacket, SpatialEntry,
    FRAME_MAGIC,
};

fn client_round_trip(packet: ClientPacket) {
    let mut out = Vec::new();
    packet.encode(&mut out);
    assert!(
        opcode::payload_len_ok(out[0], out.len()),
        "{:?} payload length {} disagrees with the opcode table",
        packet.kind(),
        out.len(),
    );
    let mut r = out.as_slice();
    let decoded = ClientPacket::decode(&mut r).unwrap();
    assert!(r.is_empty(), "{:?} left trailing bytes", packet.kind());
    assert_eq!(decoded, packet);
}

fn server_round_trip(packet: ServerPacket) {
    let mut out = Vec::new();
    packet.encode(&mut out);
    assert!(
        opcode::payload_len_ok(out[0], out.len()),
        "{:?} payload length {} disagrees with the opcode table",
        packet.kind(),
        out.len(),
    );
    let mut r = out.as_slice();
    let decoded = ServerPacket::decode(&mut r).unwrap();
    assert!(r.is_empty(), "{:?} left trailing bytes", packet.kind());
    assert_eq!(decoded, packet);
}

#[test]
fn client_packets_round_trip() {
    client_round_trip(ClientPacket::HandshakeRequest {
        version: crate::PROTOCOL_VERSION,
        client_magic: crate::CLIENT_MAGIC,
    });
    client_round_trip(ClientPacket::MoveRequest {
        direction: 2,
        facing: 2,
    });
    client_round_trip(ClientPacket::TurnRequest { direction: 1 });
    client_round_trip(ClientPacket::WarpRequest {
        map_id: 7,
        x: -3,
        y: 1200,
    });
    client_round_trip(ClientPacket::ChatSend {
        channel: 0,
        text: "anyone around?".to_owned(),
    });
    client_round_trip(ClientPacket::PongResponse { timestamp: 0x0102_0304 });
    client_round_trip(ClientPacket::DisconnectRequest);
}

#[test]
fn server_packets_round_trip() {
    server_round_trip(ServerPacket::HandshakeAccepted {
        server_version: crate::PROTOCOL_VERSION,
        server_magic: crate::SERVER_MAGIC,
    });
    server_round_trip(ServerPacket::HandshakeRejected {
        code: crate::reject_code::BAD_VERSION,
        reason: "unsupported protocol version".to_owned(),
    });
    server_round_trip(ServerPacket::Welcome {
        player_id: 0xfeed_f00d_dead_beef,
        x: 5,
        y: 5,
        facing: 2,
    });
    server_round_trip(ServerPacket::PositionCorrection { x: 5, y: 4, facing: 2 });
    server_round_trip(ServerPacket::FacingCorrection { facing: 3 });
    server_round_trip(ServerPacket::TileData {
        origin_x: -5,
        origin_y: -5,
        width: 3,
        height: 2,
        tiles: vec![1, 1, 2, 3, 1, 1],
    });
    server_round_trip(ServerPacket::PlayerSpatial(vec![
        SpatialEntry {
            player_id: 1,
            x: 5,
            y: 4,
            facing: 2,
        },
        SpatialEntry {
            player_id: 2,
            x: 11,
            y: 0,
            facing: 0,
        },
    ]));
    server_round_trip(ServerPacket::PlayerSpatial(Vec::new()));
    server_round_trip(ServerPacket::LeftGame { player_id: 2 });
    server_round_trip(ServerPacket::ChatBroadcast {
        sender_id: 9,
        channel: 0,
        text: "hello".to_owned(),
    });
    server_round_trip(ServerPacket::PingRequest { timestamp: 42 });
    server_round_trip(ServerPacket::ServerShutdown { reason: 1 });
}

#[test]
fn unknown_opcode_is_rejected() {
    let mut r: &[u8] = &[0xcc, 0x00];
    assert!(matches!(
        ClientPacket::decode(&mut r),
        Err(ReadPacketError::InvalidOpcode(0xcc)),
    ));
}

#[test]
fn truncated_packet_is_rejected() {
    // A Welcome cut off after the player id.
    let mut full = Vec::new();
    ServerPacket::Welcome {
        player_id: 1,
        x: 5,
        y: 5,
        facing: 2,
    }
    .encode(&mut full);
    let mut r = &full[..9];
    assert!(matches!(
        ServerPacket::decode(&mut r),
        Err(ReadPacketError::ShortInput(_)),
    ));
}

#[test]
fn framed_packet_layout() {
    let mut payload = Vec::new();
    ClientPacket::MoveRequest {
        direction: 2,
        facing: 2,
    }
    .encode(&mut payload);
    let frame = encode_frame(&payload);

    assert_eq!(frame.len(), 4 + payload.len());
    assert_eq!(&frame[..2], &FRAME_MAGIC);
    let header = FrameHeader::parse(frame[..4].try_into().unwrap()).unwrap();
    assert_eq!(header.payload_len as usize, payload.len());
    assert_eq!(&frame[4..], payload.as_slice());
}

#[test]
fn spatial_entry_is_13_bytes() {
    let mut out = Vec::new();
    SpatialEntry {
        player_id: 1,
        x: 2,
        y: 3,
        facing: 0,
    }
    .encode(&mut out);
    assert_eq!(out.len(), 13);
}
