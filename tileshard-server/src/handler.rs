use std::sync::Arc;

use tileshard_net::{ClientSession, SessionHandler, SessionRegistry};
use tileshard_protocol::ClientPacket;

use crate::action::{Action, ActionQueue};

const MAX_CHAT_LEN: usize = 240;

/// Bridges session callbacks into the action queue. Runs on network
/// workers; validates what it can cheaply (ranges, lengths) and leaves the
/// rest to the tick thread.
pub(crate) struct PacketBridge {
    pub(crate) actions: ActionQueue,
    pub(crate) sessions: Arc<SessionRegistry>,
}

impl SessionHandler for PacketBridge {
    fn on_live(&self, session: &Arc<ClientSession>) {
        // No account identity travels in the handshake; guest accounts are
        // keyed by remote address, so a reconnect from the same address
        // resumes the same saved position.
        self.actions.push(Action::Login {
            client_id: session.client_id(),
            username: format!("guest-{}", session.addr().ip()),
        });
    }

    fn on_packet(&self, session: &Arc<ClientSession>, packet: ClientPacket) {
        let client_id = session.client_id();
        match packet {
            ClientPacket::MoveRequest { direction, facing } => {
                if direction > 3 || facing > 3 {
                    log::warn!("invalid direction/facing from client {client_id}");
                    return;
                }
                self.actions.push(Action::Move {
                    client_id,
                    direction,
                    facing,
                });
            }
            ClientPacket::TurnRequest { direction } => {
                if direction > 3 {
                    log::warn!("invalid turn direction from client {client_id}");
                    return;
                }
                self.actions.push(Action::Turn {
                    client_id,
                    facing: direction,
                });
            }
            ClientPacket::WarpRequest { map_id: _, x, y } => {
                // One map per shard; the map id is accepted and ignored.
                self.actions.push(Action::Warp { client_id, x, y });
            }
            ClientPacket::ChatSend { channel, text } => {
                if text.is_empty() || text.len() > MAX_CHAT_LEN {
                    log::warn!("chat message with bad length from client {client_id}");
                    return;
                }
                self.actions.push(Action::Chat {
                    client_id,
                    channel,
                    text,
                });
            }
            ClientPacket::HandshakeRequest { .. } => {
                log::debug!("Client {}: redundant handshake ignored", session.addr());
            }
            // The session consumes these itself.
            ClientPacket::PongResponse { .. } | ClientPacket::DisconnectRequest => {}
        }
    }

    fn on_close(&self, session: &Arc<ClientSession>, was_live: bool) {
        self.sessions.remove(session.client_id());
        if was_live {
            self.actions.push(Action::Logout {
                client_id: session.client_id(),
            });
        }
    }
}
