use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tileshard_protocol::{
    encode_frame, opcode, reject_code, ClientPacket, FrameError, FrameHeader, ServerPacket,
    CLIENT_MAGIC, FRAME_HEADER_LEN, PROTOCOL_VERSION, SERVER_MAGIC,
};
use tileshard_stream_codec::WireCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

use crate::admission::Admission;
use crate::bandwidth::BandwidthMonitor;

/// A client has this long after accept to complete the handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Keep-alive ping cadence; a session missing [`MAX_MISSED_PINGS`] replies
/// in a row is reaped.
pub const PING_INTERVAL: Duration = Duration::from_secs(10);
pub const MAX_MISSED_PINGS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    AwaitingHandshake = 0,
    Live = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::AwaitingHandshake,
            1 => Self::Live,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Callbacks from a session's read task into the rest of the server. All
/// methods run on network workers; implementations bridge into the tick
/// thread via the action queue and must not block.
pub trait SessionHandler: Send + Sync + 'static {
    /// The handshake completed and the acceptance was queued.
    fn on_live(&self, session: &Arc<ClientSession>);

    /// A complete, length-validated packet arrived on a live session.
    fn on_packet(&self, session: &Arc<ClientSession>, packet: ClientPacket);

    /// The session is closing. `was_live` distinguishes a logged-in client
    /// (needs a logout) from one that never finished its handshake.
    fn on_close(&self, session: &Arc<ClientSession>, was_live: bool);
}

/// One TCP connection.
///
/// Holds no game state and no reference to its player beyond the id; the
/// player finds its session through the registry and vice versa, so neither
/// owns the other. The outbound path is an unbounded queue drained by a
/// single writer task, which guarantees per-session packet ordering.
#[derive(Debug)]
pub struct ClientSession {
    client_id: u64,
    addr: SocketAddr,
    state: AtomicU8,
    outbound: mpsc::UnboundedSender<Arc<[u8]>>,
    /// Flipped to true exactly once; read and write loops select on it.
    closing: watch::Sender<bool>,
    /// Set on the tick thread once the login action runs.
    player_id: AtomicU64,
    /// Latest measured round-trip time, read by the tick thread for move
    /// cooldown compensation.
    ping_rtt_ms: AtomicU32,
    missed_pings: AtomicU32,
}

impl ClientSession {
    /// Creates the session and hands back the receiving end of its outbound
    /// queue for a writer task (or a test) to drain.
    pub fn new(
        client_id: u64,
        addr: SocketAddr,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Arc<[u8]>>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closing, _) = watch::channel(false);
        let session = Arc::new(Self {
            client_id,
            addr,
            state: AtomicU8::new(SessionState::AwaitingHandshake as u8),
            outbound,
            closing,
            player_id: AtomicU64::new(0),
            ping_rtt_ms: AtomicU32::new(0),
            missed_pings: AtomicU32::new(0),
        });
        (session, outbound_rx)
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Live
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Transition out of `AwaitingHandshake`. Called by the session driver
    /// once the handshake is accepted; tests use it to stand up live
    /// sessions without a socket.
    pub fn set_live(&self) {
        self.set_state(SessionState::Live);
    }

    /// Requests shutdown. The read and write loops observe the signal,
    /// flush, and wind the session down; safe to call from any thread and
    /// more than once.
    pub fn begin_close(&self) {
        if self.state() != SessionState::Closed {
            self.set_state(SessionState::Closing);
        }
        let _ = self.closing.send(true);
    }

    pub fn subscribe_close(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    pub fn player_id(&self) -> Option<u64> {
        match self.player_id.load(Ordering::Relaxed) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn set_player_id(&self, player_id: u64) {
        self.player_id.store(player_id, Ordering::Relaxed);
    }

    pub fn ping_rtt_ms(&self) -> u32 {
        self.ping_rtt_ms.load(Ordering::Relaxed)
    }

    /// Serialises the packet once and appends it to the outbound queue.
    pub fn queue_packet(&self, packet: &ServerPacket) {
        let mut payload = Vec::new();
        packet.encode(&mut payload);
        self.queue_frame(encode_frame(&payload).into());
    }

    /// Appends an already-framed packet; broadcasts serialise once and share
    /// the frame across sessions.
    pub fn queue_frame(&self, frame: Arc<[u8]>) {
        // A dropped receiver means the session is going away; drop silently.
        let _ = self.outbound.send(frame);
    }
}

#[derive(Debug, Error)]
enum ReadFrameError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Frame(#[from] FrameError),
}

/// Reads one `magic | size | payload` frame. Strictly: four header bytes,
/// validate, then exactly `size` payload bytes.
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    bandwidth: &BandwidthMonitor,
) -> Result<Vec<u8>, ReadFrameError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let header = FrameHeader::parse(header)?;
    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;
    bandwidth.record_incoming(FRAME_HEADER_LEN + payload.len());
    Ok(payload)
}

/// Drains a session's outbound queue into the socket, one write in flight at
/// a time. Bytes are counted at the moment the write completes. On the
/// closing signal, already-queued frames are flushed before shutdown so
/// rejections and shutdown notices still reach the client.
pub async fn run_writer<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut outbound_rx: mpsc::UnboundedReceiver<Arc<[u8]>>,
    bandwidth: Arc<BandwidthMonitor>,
    session: Arc<ClientSession>,
) {
    let mut closing = session.subscribe_close();
    loop {
        tokio::select! {
            biased;

            maybe_frame = outbound_rx.recv() => match maybe_frame {
                Some(frame) => {
                    if !write_frame(&mut writer, &frame, &bandwidth, &session).await {
                        break;
                    }
                }
                None => break,
            },

            _ = async { let _ = closing.wait_for(|closing| *closing).await; } => {
                while let Ok(frame) = outbound_rx.try_recv() {
                    if !write_frame(&mut writer, &frame, &bandwidth, &session).await {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
    bandwidth: &BandwidthMonitor,
    session: &ClientSession,
) -> bool {
    match writer.write_all(frame).await {
        Ok(()) => {
            bandwidth.record_outgoing(frame.len());
            true
        }
        Err(e) => {
            log::debug!("Client {}: write failed: {e}", session.addr());
            session.begin_close();
            false
        }
    }
}

/// Drives one session from accept to close.
///
/// Phase one awaits the handshake frame under [`HANDSHAKE_TIMEOUT`]; phase
/// two is the live loop multiplexing frame reads with the keep-alive timer
/// and the closing signal. Every exit path fires `on_close` exactly once
/// and releases the admission slot.
pub async fn run_session<R: AsyncRead + Unpin>(
    mut reader: R,
    session: Arc<ClientSession>,
    handler: Arc<dyn SessionHandler>,
    admission: Arc<Admission>,
    bandwidth: Arc<BandwidthMonitor>,
) {
    let addr = session.addr();

    let live = handshake(&mut reader, &session, &admission, &bandwidth).await;
    if live {
        session.set_live();
        handler.on_live(&session);
        live_loop(&mut reader, &session, &*handler, &bandwidth).await;
    }

    session.begin_close();
    handler.on_close(&session, live);
    admission.remove_connection(addr.ip());
    session.set_state(SessionState::Closed);
    log::info!("Client {addr}: session closed");
}

/// Returns true when the session may go live.
async fn handshake<R: AsyncRead + Unpin>(
    reader: &mut R,
    session: &Arc<ClientSession>,
    admission: &Admission,
    bandwidth: &BandwidthMonitor,
) -> bool {
    let addr = session.addr();

    let payload = match timeout(HANDSHAKE_TIMEOUT, read_frame(reader, bandwidth)).await {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            log::debug!("Client {addr}: dropped before handshake: {e}");
            admission.record_failure(addr.ip());
            return false;
        }
        Err(_) => {
            log::info!("Client {addr}: handshake timed out");
            admission.record_failure(addr.ip());
            return false;
        }
    };

    let mut r = payload.as_slice();
    let packet = match ClientPacket::decode(&mut r) {
        Ok(packet) if r.is_empty() => packet,
        _ => {
            log::debug!("Client {addr}: malformed handshake frame");
            admission.record_failure(addr.ip());
            return false;
        }
    };

    let (version, client_magic) = match packet {
        ClientPacket::HandshakeRequest {
            version,
            client_magic,
        } => (version, client_magic),
        other => {
            log::debug!("Client {addr}: expected handshake, got {:?}", other.kind());
            admission.record_failure(addr.ip());
            return false;
        }
    };

    if version != PROTOCOL_VERSION {
        log::info!("Client {addr}: rejected, protocol version {version}");
        session.queue_packet(&ServerPacket::HandshakeRejected {
            code: reject_code::BAD_VERSION,
            reason: "unsupported protocol version".to_owned(),
        });
        admission.record_failure(addr.ip());
        return false;
    }
    if client_magic != CLIENT_MAGIC {
        log::info!("Client {addr}: rejected, bad magic 0x{client_magic:08x}");
        session.queue_packet(&ServerPacket::HandshakeRejected {
            code: reject_code::BAD_MAGIC,
            reason: "bad client magic".to_owned(),
        });
        admission.record_failure(addr.ip());
        return false;
    }

    session.queue_packet(&ServerPacket::HandshakeAccepted {
        server_version: PROTOCOL_VERSION,
        server_magic: SERVER_MAGIC,
    });
    log::info!("Client {addr}: handshake accepted");
    true
}

async fn live_loop<R: AsyncRead + Unpin>(
    reader: &mut R,
    session: &Arc<ClientSession>,
    handler: &dyn SessionHandler,
    bandwidth: &BandwidthMonitor,
) {
    let addr = session.addr();
    let started = Instant::now();
    let mut closing = session.subscribe_close();
    let mut ping = interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick fires immediately; skip it.
    ping.tick().await;

    loop {
        if session.state() != SessionState::Live {
            break;
        }

        tokio::select! {
            biased;

            _ = async { let _ = closing.wait_for(|closing| *closing).await; } => break,

            result = read_frame(reader, bandwidth) => {
                let payload = match result {
                    Ok(payload) => payload,
                    Err(ReadFrameError::Io(e)) => {
                        log::debug!("Client {addr}: read failed: {e}");
                        break;
                    }
                    Err(ReadFrameError::Frame(e)) => {
                        log::debug!("Client {addr}: framing error: {e}");
                        break;
                    }
                };
                if !handle_payload(session, handler, started, &payload) {
                    break;
                }
            }

            _ = ping.tick() => {
                let missed = session.missed_pings.fetch_add(1, Ordering::Relaxed) + 1;
                if missed > MAX_MISSED_PINGS {
                    log::info!("Client {addr}: missed {MAX_MISSED_PINGS} keep-alive replies");
                    break;
                }
                let timestamp = started.elapsed().as_millis() as u32;
                session.queue_packet(&ServerPacket::PingRequest { timestamp });
            }
        }
    }
}

/// Returns false when the session should close.
fn handle_payload(
    session: &Arc<ClientSession>,
    handler: &dyn SessionHandler,
    started: Instant,
    payload: &[u8],
) -> bool {
    let addr = session.addr();

    // Wrong-length payloads are rejected before decoding.
    if !opcode::payload_len_ok(payload[0], payload.len()) {
        log::debug!(
            "Client {addr}: bad payload length {} for opcode 0x{:02x}",
            payload.len(),
            payload[0],
        );
        return false;
    }

    let mut r = payload;
    let packet = match ClientPacket::decode(&mut r) {
        Ok(packet) => packet,
        Err(e) => {
            log::debug!("Client {addr}: dropping malformed packet: {e}");
            return false;
        }
    };
    if !r.is_empty() {
        log::debug!(
            "Client {addr}: dropping {:?} packet: {} unexpected trailing byte(s)",
            packet.kind(),
            r.len(),
        );
        return false;
    }

    match packet {
        // Keep-alive replies are the session's own business.
        ClientPacket::PongResponse { timestamp } => {
            session.missed_pings.store(0, Ordering::Relaxed);
            let now = started.elapsed().as_millis() as u32;
            session
                .ping_rtt_ms
                .store(now.saturating_sub(timestamp), Ordering::Relaxed);
            true
        }
        ClientPacket::DisconnectRequest => {
            log::info!("Client {addr}: requested disconnect");
            false
        }
        packet => {
            handler.on_packet(session, packet);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::sync::Mutex;

    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::time::sleep;

    use super::*;

    const TEST_ADDR: SocketAddr =
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 40000));

    /// Watchdog against deadlock regressions: a stuck session task fails
    /// the test fast instead of hanging the suite.
    async fn run_test_with_timeout(test: impl Future<Output = ()> + Send + 'static) {
        timeout(Duration::from_secs(60), tokio::spawn(test))
            .await
            .expect("test timed out")
            .unwrap();
    }

    #[derive(Default)]
    struct RecordingHandler {
        live: Mutex<Vec<u64>>,
        packets: Mutex<Vec<(u64, ClientPacket)>>,
        closed: Mutex<Vec<(u64, bool)>>,
    }

    impl SessionHandler for RecordingHandler {
        fn on_live(&self, session: &Arc<ClientSession>) {
            self.live.lock().unwrap().push(session.client_id());
        }

        fn on_packet(&self, session: &Arc<ClientSession>, packet: ClientPacket) {
            self.packets
                .lock()
                .unwrap()
                .push((session.client_id(), packet));
        }

        fn on_close(&self, session: &Arc<ClientSession>, was_live: bool) {
            self.closed
                .lock()
                .unwrap()
                .push((session.client_id(), was_live));
        }
    }

    struct Harness {
        client: DuplexStream,
        session: Arc<ClientSession>,
        handler: Arc<RecordingHandler>,
        admission: Arc<Admission>,
        outbound_rx: mpsc::UnboundedReceiver<Arc<[u8]>>,
        task: tokio::task::JoinHandle<()>,
    }

    fn spawn_session() -> Harness {
        let (client, server) = duplex(64 * 1024);
        let (session, outbound_rx) = ClientSession::new(1, TEST_ADDR);
        let handler = Arc::new(RecordingHandler::default());
        let admission = Arc::new(Admission::new());
        admission.add_connection(TEST_ADDR.ip());
        let task = tokio::spawn(run_session(
            server,
            Arc::clone(&session),
            Arc::clone(&handler) as Arc<dyn SessionHandler>,
            Arc::clone(&admission),
            Arc::new(BandwidthMonitor::new()),
        ));
        Harness {
            client,
            session,
            handler,
            admission,
            outbound_rx,
            task,
        }
    }

    async fn send_packet(client: &mut DuplexStream, packet: &ClientPacket) {
        let mut payload = Vec::new();
        packet.encode(&mut payload);
        client.write_all(&encode_frame(&payload)).await.unwrap();
    }

    fn decode_frame(frame: &[u8]) -> ServerPacket {
        let header = FrameHeader::parse(frame[..4].try_into().unwrap()).unwrap();
        assert_eq!(frame.len(), 4 + header.payload_len as usize);
        let mut r = &frame[4..];
        let packet = ServerPacket::decode(&mut r).unwrap();
        assert!(r.is_empty());
        packet
    }

    fn good_handshake() -> ClientPacket {
        ClientPacket::HandshakeRequest {
            version: PROTOCOL_VERSION,
            client_magic: CLIENT_MAGIC,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_then_move_reaches_handler() {
        run_test_with_timeout(async move {
            let mut harness = spawn_session();

            send_packet(&mut harness.client, &good_handshake()).await;
            let frame = harness.outbound_rx.recv().await.unwrap();
            assert_eq!(
                decode_frame(&frame),
                ServerPacket::HandshakeAccepted {
                    server_version: PROTOCOL_VERSION,
                    server_magic: SERVER_MAGIC,
                },
            );

            send_packet(
                &mut harness.client,
                &ClientPacket::MoveRequest {
                    direction: 2,
                    facing: 2,
                },
            )
            .await;

            sleep(Duration::from_millis(100)).await;
            assert_eq!(*harness.handler.live.lock().unwrap(), [1]);
            assert_eq!(
                harness.handler.packets.lock().unwrap().as_slice(),
                [(
                    1,
                    ClientPacket::MoveRequest {
                        direction: 2,
                        facing: 2,
                    },
                )],
            );
            assert!(harness.session.is_live());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out_without_logout() {
        run_test_with_timeout(async move {
            let harness = spawn_session();

            // No bytes sent: the handshake timer fires after 5 s.
            harness.task.await.unwrap();

            assert_eq!(harness.session.state(), SessionState::Closed);
            assert!(harness.handler.live.lock().unwrap().is_empty());
            // Never live, so no logout path.
            assert_eq!(*harness.handler.closed.lock().unwrap(), [(1, false)]);
            // The failure counter ticked and the admission slot was released.
            assert_eq!(harness.admission.failure_count(TEST_ADDR.ip()), 1);
            assert_eq!(harness.admission.connection_count(TEST_ADDR.ip()), 0);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn bad_version_is_rejected() {
        run_test_with_timeout(async move {
            let mut harness = spawn_session();

            send_packet(
                &mut harness.client,
                &ClientPacket::HandshakeRequest {
                    version: PROTOCOL_VERSION + 1,
                    client_magic: CLIENT_MAGIC,
                },
            )
            .await;

            let frame = harness.outbound_rx.recv().await.unwrap();
            assert!(matches!(
                decode_frame(&frame),
                ServerPacket::HandshakeRejected {
                    code: reject_code::BAD_VERSION,
                    ..
                },
            ));
            harness.task.await.unwrap();
            assert!(harness.handler.live.lock().unwrap().is_empty());
            assert_eq!(harness.admission.failure_count(TEST_ADDR.ip()), 1);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn framing_error_closes_a_live_session() {
        run_test_with_timeout(async move {
            let mut harness = spawn_session();
            send_packet(&mut harness.client, &good_handshake()).await;
            let _ = harness.outbound_rx.recv().await.unwrap();

            // Garbage magic.
            harness
                .client
                .write_all(&[0xde, 0xad, 0x00, 0x01, 0x00])
                .await
                .unwrap();

            harness.task.await.unwrap();
            assert_eq!(*harness.handler.closed.lock().unwrap(), [(1, true)]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_payload_length_closes_session() {
        run_test_with_timeout(async move {
            let mut harness = spawn_session();
            send_packet(&mut harness.client, &good_handshake()).await;
            let _ = harness.outbound_rx.recv().await.unwrap();

            // C_Move_Request must be exactly 3 payload bytes.
            harness
                .client
                .write_all(&encode_frame(&[opcode::movement::C_MOVE_REQUEST, 2]))
                .await
                .unwrap();

            harness.task.await.unwrap();
            assert!(harness.handler.packets.lock().unwrap().is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_request_closes_cleanly() {
        run_test_with_timeout(async move {
            let mut harness = spawn_session();
            send_packet(&mut harness.client, &good_handshake()).await;
            let _ = harness.outbound_rx.recv().await.unwrap();

            send_packet(&mut harness.client, &ClientPacket::DisconnectRequest).await;
            harness.task.await.unwrap();
            assert_eq!(*harness.handler.closed.lock().unwrap(), [(1, true)]);
            // A clean disconnect is not a handshake failure.
            assert_eq!(harness.admission.failure_count(TEST_ADDR.ip()), 0);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn begin_close_tears_down_a_live_session() {
        run_test_with_timeout(async move {
            let mut harness = spawn_session();
            send_packet(&mut harness.client, &good_handshake()).await;
            let _ = harness.outbound_rx.recv().await.unwrap();

            harness.session.begin_close();
            harness.task.await.unwrap();
            assert_eq!(harness.session.state(), SessionState::Closed);
            assert_eq!(*harness.handler.closed.lock().unwrap(), [(1, true)]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn missed_pings_reap_the_session() {
        run_test_with_timeout(async move {
            let mut harness = spawn_session();
            send_packet(&mut harness.client, &good_handshake()).await;
            let _ = harness.outbound_rx.recv().await.unwrap();

            // Swallow pings without replying.
            for _ in 0..MAX_MISSED_PINGS {
                let frame = harness.outbound_rx.recv().await.unwrap();
                assert!(matches!(
                    decode_frame(&frame),
                    ServerPacket::PingRequest { .. },
                ));
            }

            // The next interval crosses the miss threshold and reaps.
            harness.task.await.unwrap();
            assert_eq!(*harness.handler.closed.lock().unwrap(), [(1, true)]);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn pong_resets_the_miss_counter_and_measures_rtt() {
        run_test_with_timeout(async move {
            let mut harness = spawn_session();
            send_packet(&mut harness.client, &good_handshake()).await;
            let _ = harness.outbound_rx.recv().await.unwrap();

            for _ in 0..MAX_MISSED_PINGS + 2 {
                let frame = harness.outbound_rx.recv().await.unwrap();
                let ServerPacket::PingRequest { timestamp } = decode_frame(&frame) else {
                    panic!("expected a ping");
                };
                send_packet(&mut harness.client, &ClientPacket::PongResponse { timestamp })
                    .await;
                // Let the session process the pong before the next interval.
                sleep(Duration::from_millis(50)).await;
            }

            assert!(
                harness.session.is_live(),
                "replied pings keep the session alive",
            );
            harness.client.shutdown().await.unwrap();
            harness.task.await.unwrap();
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn writer_flushes_queued_frames_before_shutdown() {
        run_test_with_timeout(async move {
            let (session, outbound_rx) = ClientSession::new(1, TEST_ADDR);
            let (server, mut client) = duplex(64 * 1024);

            session.queue_packet(&ServerPacket::ServerShutdown { reason: 1 });
            session.begin_close();

            run_writer(
                server,
                outbound_rx,
                Arc::new(BandwidthMonitor::new()),
                Arc::clone(&session),
            )
            .await;

            let mut bytes = Vec::new();
            client.read_to_end(&mut bytes).await.unwrap();
            assert_eq!(
                decode_frame(&bytes),
                ServerPacket::ServerShutdown { reason: 1 },
            );
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn writer_counts_bytes_on_completion() {
        run_test_with_timeout(async move {
            let (session, outbound_rx) = ClientSession::new(1, TEST_ADDR);
            let (server, mut client) = duplex(64 * 1024);
            let bandwidth = Arc::new(BandwidthMonitor::new());

            session.queue_packet(&ServerPacket::FacingCorrection { facing: 1 });
            let writer_task = tokio::spawn(run_writer(
                server,
                outbound_rx,
                Arc::clone(&bandwidth),
                Arc::clone(&session),
            ));

            let mut frame = [0u8; 6];
            client.read_exact(&mut frame).await.unwrap();
            assert_eq!(bandwidth.snapshot().bytes_out_total, 6);

            session.begin_close();
            writer_task.await.unwrap();
        })
        .await;
    }
}
