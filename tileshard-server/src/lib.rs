//! The shard server: composes the network layer, the action queue, and the
//! tick worker into one runnable unit.
//!
//! Thread model: tokio tasks own sockets and per-session buffers; exactly
//! one dedicated thread owns the world and every player, consuming actions
//! the network side queues. The two sides share only session queues,
//! admission tables and stats counters.

mod action;
mod bots;
mod dashboard;
mod handler;
mod script;
mod stats;
mod store;
mod tick;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;

use tileshard_net::{
    run_session, run_writer, Admission, BandwidthMonitor, ClientSession, SessionHandler,
    SessionRegistry,
};
use tileshard_protocol::ServerPacket;
use tileshard_world::World;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use crate::action::{action_queue, Action, ActionQueue, ActionReceiver};
pub use crate::bots::BotManager;
pub use crate::script::{NullScript, ScriptHooks};
pub use crate::stats::{PhaseTimings, StatsSink, StatsSnapshot};
pub use crate::store::{
    spawn_save_worker, AccountStore, MemoryStore, PlayerAccount, SaveQueue, SaveRequest,
};
pub use crate::tick::{run_tick_loop, Shard, TICKS_PER_SECOND, TICK_INTERVAL};

use crate::handler::PacketBridge;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Game port.
    pub addr: SocketAddr,
    /// Debug dashboard port; `None` disables it.
    pub dashboard_addr: Option<SocketAddr>,
    pub map_width: i16,
    pub map_height: i16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 7777)),
            dashboard_addr: Some(SocketAddr::from(([0, 0, 0, 0], 8081))),
            map_width: 100,
            map_height: 100,
        }
    }
}

/// A running server. Dropping it without calling [`shutdown`](Self::shutdown)
/// leaves the tick thread running; the console owns the lifecycle.
pub struct GameServer {
    actions: ActionQueue,
    sessions: Arc<SessionRegistry>,
    admission: Arc<Admission>,
    bandwidth: Arc<BandwidthMonitor>,
    stats: Arc<StatsSink>,
    script: Arc<Mutex<Box<dyn ScriptHooks>>>,
    shutdown_tx: watch::Sender<bool>,
    tick_thread: Option<thread::JoinHandle<()>>,
    accept_task: JoinHandle<()>,
    dashboard_task: Option<JoinHandle<()>>,
    save_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl GameServer {
    /// Binds the listeners, spawns the network tasks and the tick thread.
    /// Must be called from within a tokio runtime.
    pub async fn start(
        config: ServerConfig,
        script: Box<dyn ScriptHooks>,
        store: Arc<dyn AccountStore>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Listening on {local_addr}");

        let sessions = Arc::new(SessionRegistry::new());
        let admission = Arc::new(Admission::new());
        let bandwidth = Arc::new(BandwidthMonitor::new());
        let stats = Arc::new(StatsSink::new());
        let script = Arc::new(Mutex::new(script));
        let (actions, action_rx) = action_queue();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (save_queue, save_task) = store::spawn_save_worker(Arc::clone(&store));

        // The world is built on the tick thread: the thread-owner checks
        // inside it bind to the first accessing thread.
        let (map_width, map_height) = (config.map_width, config.map_height);
        let tick_shutdown = shutdown_rx.clone();
        let tick_sessions = Arc::clone(&sessions);
        let tick_stats = Arc::clone(&stats);
        let tick_bandwidth = Arc::clone(&bandwidth);
        let tick_script = Arc::clone(&script);
        let tick_thread = thread::Builder::new()
            .name("tick".to_owned())
            .spawn(move || {
                let mut world = World::new(map_width, map_height);
                world.map_mut().create_border();
                let shard = Shard::new(
                    world,
                    tick_sessions,
                    tick_stats,
                    tick_bandwidth,
                    tick_script,
                    store,
                    Some(save_queue),
                );
                tick::run_tick_loop(shard, action_rx, tick_shutdown);
            })?;

        let bridge: Arc<dyn SessionHandler> = Arc::new(PacketBridge {
            actions: actions.clone(),
            sessions: Arc::clone(&sessions),
        });
        let accept_task = tokio::spawn(run_accept_loop(
            listener,
            Arc::clone(&sessions),
            Arc::clone(&admission),
            Arc::clone(&bandwidth),
            bridge,
            shutdown_rx.clone(),
        ));

        let dashboard_task = match config.dashboard_addr {
            Some(addr) => {
                let listener = TcpListener::bind(addr).await?;
                log::info!("Dashboard on http://{}", listener.local_addr()?);
                Some(tokio::spawn(dashboard::run_dashboard(
                    listener,
                    Arc::clone(&stats),
                    Arc::clone(&bandwidth),
                    shutdown_rx,
                )))
            }
            None => None,
        };

        Ok(Self {
            actions,
            sessions,
            admission,
            bandwidth,
            stats,
            script,
            shutdown_tx,
            tick_thread: Some(tick_thread),
            accept_task,
            dashboard_task,
            save_task,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queue handle for console-driven actions (bots, admin).
    pub fn actions(&self) -> &ActionQueue {
        &self.actions
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn stats_json(&self) -> String {
        self.stats.snapshot_json(self.bandwidth.snapshot())
    }

    pub fn bandwidth_stats(&self) -> String {
        self.bandwidth.format_stats()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    pub fn reload_scripts(&self) {
        self.script.lock().unwrap().reload();
    }

    /// Clean shutdown: notify clients, close sessions, stop the accept loop
    /// and the tick thread, flush the save queue.
    pub async fn shutdown(mut self) {
        log::info!("Shutting down server...");
        let _ = self.shutdown_tx.send(true);

        self.sessions
            .broadcast_all(&ServerPacket::ServerShutdown { reason: 1 });
        self.sessions.close_all();

        if let Some(tick_thread) = self.tick_thread.take() {
            // The tick loop exits within one tick of the signal.
            let _ = tokio::task::spawn_blocking(move || tick_thread.join()).await;
        }
        let _ = self.accept_task.await;
        if let Some(dashboard) = self.dashboard_task {
            let _ = dashboard.await;
        }
        // The tick thread dropped its SaveQueue; the worker drains what is
        // left and exits.
        let _ = self.save_task.await;
        log::info!("Server shutdown complete");
    }
}

async fn run_accept_loop(
    listener: TcpListener,
    sessions: Arc<SessionRegistry>,
    admission: Arc<Admission>,
    bandwidth: Arc<BandwidthMonitor>,
    handler: Arc<dyn SessionHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next_client_id: u64 = 1;
    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,

            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        log::error!("Accept failed: {e}");
                        continue;
                    }
                };
                let ip = addr.ip();
                log::info!("IP {ip} trying to connect");

                if !admission.can_connect(ip) {
                    log::info!("Rejected connection from {ip}");
                    admission.record_failure(ip);
                    drop(stream);
                    continue;
                }
                admission.add_connection(ip);

                let client_id = next_client_id;
                next_client_id += 1;

                let (session, outbound_rx) = ClientSession::new(client_id, addr);
                sessions.insert(Arc::clone(&session));

                let (read_half, write_half) = stream.into_split();
                tokio::spawn(run_writer(
                    write_half,
                    outbound_rx,
                    Arc::clone(&bandwidth),
                    Arc::clone(&session),
                ));
                tokio::spawn(run_session(
                    read_half,
                    session,
                    Arc::clone(&handler),
                    Arc::clone(&admission),
                    Arc::clone(&bandwidth),
                ));
            }
        }
    }
}
