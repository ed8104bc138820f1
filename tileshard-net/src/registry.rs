use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tileshard_protocol::{encode_frame, ServerPacket};
use tileshard_stream_codec::WireCodec;

use crate::session::ClientSession;

/// client_id -> session map shared by the accept loop, the session tasks
/// and the tick thread.
///
/// Broadcast helpers snapshot the map under a short lock, release it, then
/// queue on each session; the lock is never held across serialisation or
/// session queueing.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<u64, Arc<ClientSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<ClientSession>) {
        let mut sessions = self.sessions.lock().unwrap();
        let previous = sessions.insert(session.client_id(), session);
        debug_assert!(previous.is_none(), "client id reused while still registered");
    }

    pub fn remove(&self, client_id: u64) -> Option<Arc<ClientSession>> {
        self.sessions.lock().unwrap().remove(&client_id)
    }

    pub fn get(&self, client_id: u64) -> Option<Arc<ClientSession>> {
        self.sessions.lock().unwrap().get(&client_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Number of sessions past the handshake.
    pub fn live_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_live())
            .count()
    }

    fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    /// Serialises the packet once and queues the shared frame on every live
    /// session.
    pub fn broadcast_all(&self, packet: &ServerPacket) {
        let frame = shared_frame(packet);
        for session in self.snapshot() {
            if session.is_live() {
                session.queue_frame(Arc::clone(&frame));
            }
        }
    }

    /// As [`broadcast_all`](Self::broadcast_all), excluding one client.
    pub fn broadcast_others(&self, exclude_client_id: u64, packet: &ServerPacket) {
        let frame = shared_frame(packet);
        for session in self.snapshot() {
            if session.is_live() && session.client_id() != exclude_client_id {
                session.queue_frame(Arc::clone(&frame));
            }
        }
    }

    /// Snapshot-then-call iteration for callers that need per-session
    /// decisions (interest-scoped sends, shutdown notices).
    pub fn for_each(&self, mut f: impl FnMut(&Arc<ClientSession>)) {
        for session in self.snapshot() {
            f(&session);
        }
    }

    /// Asks every session to close. Used on server shutdown after the
    /// shutdown notice is queued.
    pub fn close_all(&self) {
        for session in self.snapshot() {
            session.begin_close();
        }
    }
}

/// One serialisation shared across all receiving sessions.
pub fn shared_frame(packet: &ServerPacket) -> Arc<[u8]> {
    let mut payload = Vec::new();
    packet.encode(&mut payload);
    encode_frame(&payload).into()
}
