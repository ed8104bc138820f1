use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tileshard_net::{shared_frame, BandwidthMonitor, ClientSession, SessionRegistry};
use tileshard_protocol::{ServerPacket, SpatialEntry};
use tileshard_world::{Facing, MoveResult, PlayerRegistry, World, VIEW_RANGE};
use tokio::sync::watch;

use crate::action::{Action, ActionReceiver};
use crate::bots::BotManager;
use crate::script::ScriptHooks;
use crate::stats::{PhaseTimings, StatsSink};
use crate::store::{AccountStore, PlayerAccount, SaveQueue, SaveRequest};

pub const TICK_INTERVAL: Duration = Duration::from_millis(50);
pub const TICKS_PER_SECOND: u32 = 20;

/// Default spawn position; logins scan outward from here for a free tile.
const SPAWN_POINT: (i16, i16) = (5, 5);

/// Everything the tick worker owns: world, players, bots, plus shared
/// handles it is allowed to touch (session queues, stats, script).
///
/// All game-state mutation happens through [`Shard::tick`] on the one thread
/// that owns this value; the owner checks inside the world types enforce
/// that in debug builds.
pub struct Shard {
    pub(crate) world: World,
    pub(crate) players: PlayerRegistry,
    pub(crate) bots: BotManager,
    pub(crate) sessions: Arc<SessionRegistry>,
    pub(crate) stats: Arc<StatsSink>,
    pub(crate) bandwidth: Arc<BandwidthMonitor>,
    pub(crate) script: Arc<Mutex<Box<dyn ScriptHooks>>>,
    pub(crate) store: Arc<dyn AccountStore>,
    pub(crate) save_queue: Option<SaveQueue>,
    /// player_id -> account user_id for players with a logged-in session.
    accounts: HashMap<u64, u64>,
    /// Applied moves this tick, handed to the script hook in phase three.
    move_events: Vec<(u64, i16, i16, u8)>,
    /// Retained drain buffer; cleared each tick, capacity kept.
    actions_buf: Vec<Action>,
}

impl Shard {
    pub fn new(
        world: World,
        sessions: Arc<SessionRegistry>,
        stats: Arc<StatsSink>,
        bandwidth: Arc<BandwidthMonitor>,
        script: Arc<Mutex<Box<dyn ScriptHooks>>>,
        store: Arc<dyn AccountStore>,
        save_queue: Option<SaveQueue>,
    ) -> Self {
        Self {
            world,
            players: PlayerRegistry::new(),
            bots: BotManager::new(),
            sessions,
            stats,
            bandwidth,
            script,
            store,
            save_queue,
            accounts: HashMap::new(),
            move_events: Vec::new(),
            actions_buf: Vec::new(),
        }
    }

    /// One tick: drain and execute actions, move a bot, broadcast dirty
    /// players, run script hooks, refresh counters.
    pub fn tick(&mut self, actions: &mut ActionReceiver, now: Instant) {
        let mut buf = std::mem::take(&mut self.actions_buf);
        buf.clear();
        actions.drain_into(&mut buf);

        let action_start = Instant::now();
        for action in buf.drain(..) {
            // A panicking action must not take the tick loop down; log it
            // and keep the cadence.
            let label = action_label(&action);
            if catch_unwind(AssertUnwindSafe(|| self.execute_action(action, now))).is_err() {
                log::error!("action {label} panicked; continuing tick");
            }
        }
        self.actions_buf = buf;
        let action_ms = ms_since(action_start);

        self.process_bot_movement(now);

        let mut timings = self.broadcast_dirty();
        timings.action_ms = action_ms;

        let events = std::mem::take(&mut self.move_events);
        if !events.is_empty() {
            let mut script = self.script.lock().unwrap();
            for (player_id, x, y, facing) in &events {
                script.on_player_moved(*player_id, *x, *y, *facing);
            }
        }
        self.move_events = events;
        self.move_events.clear();

        self.stats.set_phase_timings(timings);
        self.stats.set_connection_counts(
            self.sessions.live_count(),
            self.bots.count(),
            self.players.count(),
        );
        self.stats
            .set_visibility_tracked(self.world.visibility().tracked_count());
    }

    fn execute_action(&mut self, action: Action, now: Instant) {
        match action {
            Action::Login {
                client_id,
                username,
            } => self.handle_login(client_id, &username),
            Action::Logout { client_id } => self.handle_logout(client_id),
            Action::Move {
                client_id,
                direction,
                facing,
            } => self.handle_move(client_id, direction, facing, now),
            Action::Turn { client_id, facing } => self.handle_turn(client_id, facing, now),
            Action::Chat {
                client_id,
                channel,
                text,
            } => self.handle_chat(client_id, channel, &text),
            Action::Warp { client_id, x, y } => self.handle_warp(client_id, x, y),
            Action::SpawnBots { count, clustered } => self.spawn_bots(count, clustered),
            Action::RemoveBots => self.remove_bots(),
        }
    }

    fn handle_login(&mut self, client_id: u64, username: &str) {
        // Synchronous account read; writes go back through the save queue.
        let account = self.store.login_or_register(username);
        let (x, y) = self.spawn_position(&account);
        let player_id = match self.players.create_player(client_id, x, y, Facing::South) {
            Ok(player_id) => player_id,
            Err(e) => {
                log::error!("login for client {client_id} failed: {e}");
                return;
            }
        };
        self.players
            .get_mut(player_id)
            .unwrap()
            .set_name(username);
        self.accounts.insert(player_id, account.user_id);
        self.world.add_player(player_id, x, y);

        let visible: Vec<u64> = self
            .world
            .players_in_range(x, y, VIEW_RANGE)
            .into_iter()
            .filter(|&id| id != player_id)
            .collect();
        self.world.visibility_mut().initialize(player_id, &visible);

        if let Some(session) = self.sessions.get(client_id) {
            session.set_player_id(player_id);
            session.queue_packet(&ServerPacket::Welcome {
                player_id,
                x,
                y,
                facing: Facing::South.as_u8(),
            });

            let size = (VIEW_RANGE * 2 + 1) as u8;
            session.queue_packet(&ServerPacket::TileData {
                origin_x: x - VIEW_RANGE,
                origin_y: y - VIEW_RANGE,
                width: size,
                height: size,
                tiles: self.world.map().view_tiles(x, y, VIEW_RANGE),
            });

            if !visible.is_empty() {
                session.queue_packet(&ServerPacket::PlayerSpatial(
                    self.spatial_entries(&visible),
                ));
            }
        }

        // The dirty pass announces the newcomer to everyone in range.
        self.players.mark_dirty(player_id);
        log::info!("Client {client_id} logged in as player {player_id} at ({x}, {y})");
    }

    fn handle_logout(&mut self, client_id: u64) {
        let Some(player) = self.players.remove_by_client(client_id) else {
            return;
        };
        let player_id = player.id();
        self.despawn(player_id);
        let user_id = self.accounts.remove(&player_id);
        if let (Some(queue), Some(user_id)) = (&self.save_queue, user_id) {
            queue.queue(SaveRequest::Position {
                user_id,
                x: player.x(),
                y: player.y(),
                map_id: self.world.map().map_id(),
            });
        }
        log::info!("Player {player_id} logged out (client {client_id})");
    }

    /// Shared disconnect path: observers are told the player left, then the
    /// relation and spatial entries are erased. The registry entry is the
    /// caller's business.
    pub(crate) fn despawn(&mut self, player_id: u64) {
        if let Some(observers) = self.world.visibility().known_by(player_id) {
            let observers: Vec<u64> = observers.iter().copied().collect();
            let frame = shared_frame(&ServerPacket::LeftGame { player_id });
            for observer in observers {
                if let Some(session) = self.session_for_player(observer) {
                    session.queue_frame(Arc::clone(&frame));
                }
            }
        }
        self.world.visibility_mut().remove(player_id);
        self.world.remove_player(player_id);
    }

    fn handle_move(&mut self, client_id: u64, direction: u8, facing: u8, now: Instant) {
        let ping_ms = self
            .sessions
            .get(client_id)
            .map(|s| s.ping_rtt_ms())
            .unwrap_or(0);

        let world = &self.world;
        let Some(player) = self.players.by_client_mut(client_id) else {
            log::warn!("move from client {client_id} with no player");
            return;
        };
        let player_id = player.id();

        let result = player.attempt_move(direction, facing, world.map(), ping_ms, now, |x, y| {
            world.is_player_at(x, y, player_id)
        });
        let (x, y) = player.position();
        let server_facing = player.facing().as_u8();

        match result {
            MoveResult::Success => {
                // Keep the spatial index current inside the tick so later
                // actions this tick see the new occupancy.
                self.world.update_position(player_id, x, y);
                self.players.mark_dirty(player_id);
                self.move_events.push((player_id, x, y, server_facing));
            }
            MoveResult::OnCooldown => {
                // The client retries on its own schedule; silence is cheaper
                // than a correction per premature request.
            }
            MoveResult::InvalidDirection => {
                log::warn!("invalid move direction {direction} from client {client_id}");
            }
            MoveResult::WrongFacing | MoveResult::Blocked | MoveResult::OccupiedByPlayer => {
                // Rubber-band the client back to the authoritative state.
                if let Some(session) = self.sessions.get(client_id) {
                    session.queue_packet(&ServerPacket::PositionCorrection {
                        x,
                        y,
                        facing: server_facing,
                    });
                }
            }
        }
    }

    fn handle_turn(&mut self, client_id: u64, facing: u8, now: Instant) {
        let Some(player) = self.players.by_client_mut(client_id) else {
            log::warn!("turn from client {client_id} with no player");
            return;
        };
        let player_id = player.id();
        let turned = player.attempt_turn(facing, now);
        let server_facing = player.facing().as_u8();

        if turned {
            self.players.mark_dirty(player_id);
        } else if let Some(session) = self.sessions.get(client_id) {
            session.queue_packet(&ServerPacket::FacingCorrection {
                facing: server_facing,
            });
        }
    }

    fn handle_chat(&mut self, client_id: u64, channel: u8, text: &str) {
        let Some(player) = self.players.by_client(client_id) else {
            log::warn!("chat from client {client_id} with no player");
            return;
        };
        let sender_id = player.id();
        let (x, y) = player.position();

        let frame = shared_frame(&ServerPacket::ChatBroadcast {
            sender_id,
            channel,
            text: text.to_owned(),
        });
        for listener in self.world.players_in_range(x, y, VIEW_RANGE) {
            if let Some(session) = self.session_for_player(listener) {
                session.queue_frame(Arc::clone(&frame));
            }
        }
    }

    fn handle_warp(&mut self, client_id: u64, x: i16, y: i16) {
        let Some(player) = self.players.by_client(client_id) else {
            return;
        };
        let player_id = player.id();

        if self.world.map().blocked(x, y) || self.world.is_player_at(x, y, player_id) {
            let (px, py) = player.position();
            let facing = player.facing().as_u8();
            if let Some(session) = self.sessions.get(client_id) {
                session.queue_packet(&ServerPacket::PositionCorrection {
                    x: px,
                    y: py,
                    facing,
                });
            }
            return;
        }

        let player = self.players.get_mut(player_id).unwrap();
        player.set_position(x, y);
        self.world.update_position(player_id, x, y);
        self.players.mark_dirty(player_id);
        log::info!("Player {player_id} warped to ({x}, {y})");
    }

    /// Phase two of the tick: for every player flagged this tick, refresh
    /// the spatial index, diff visibility both ways, and fan the update out
    /// to everyone who can see it (the mover included, for rubber-banding).
    /// Every flag is consumed here; none survives to the next tick.
    fn broadcast_dirty(&mut self) -> PhaseTimings {
        let mut timings = PhaseTimings::default();
        let dirty = self.players.consume_dirty();
        self.stats.set_dirty_players(dirty.len());

        for player_id in dirty {
            let Some(player) = self.players.get(player_id) else {
                log::error!("dirty player {player_id} not in registry");
                continue;
            };
            let (x, y) = player.position();
            let facing = player.facing().as_u8();

            let spatial_start = Instant::now();
            self.world.update_position(player_id, x, y);
            timings.spatial_ms += ms_since(spatial_start);

            let visibility_start = Instant::now();
            let visible: Vec<u64> = self
                .world
                .players_in_range(x, y, VIEW_RANGE)
                .into_iter()
                .filter(|&id| id != player_id)
                .collect();
            let diff = self.world.visibility_mut().update(player_id, &visible);

            let mover_session = self.session_for_player(player_id);
            if let Some(session) = &mover_session {
                if !diff.entered.is_empty() {
                    session.queue_packet(&ServerPacket::PlayerSpatial(
                        self.spatial_entries(&diff.entered),
                    ));
                }
                for &left_id in &diff.left {
                    session.queue_packet(&ServerPacket::LeftGame { player_id: left_id });
                }
            }
            timings.visibility_ms += ms_since(visibility_start);

            // Observers the mover walked away from never show up in the
            // mover's own diff; without this they keep a ghost.
            let departure_start = Instant::now();
            let players = &self.players;
            let lost = self.world.visibility_mut().notify_observers_of_departure(
                player_id,
                x,
                y,
                VIEW_RANGE,
                |id| players.position_of(id),
            );
            if !lost.is_empty() {
                let frame = shared_frame(&ServerPacket::LeftGame { player_id });
                for observer in lost {
                    if let Some(session) = self.session_for_player(observer) {
                        session.queue_frame(Arc::clone(&frame));
                    }
                }
            }
            timings.departure_ms += ms_since(departure_start);

            // One spatial update to everyone now in range. add_known makes
            // known_by[player_id] match the geometric viewer set, so
            // stationary observers learn of newcomers too.
            let broadcast_start = Instant::now();
            let frame = shared_frame(&ServerPacket::PlayerSpatial(vec![SpatialEntry {
                player_id,
                x,
                y,
                facing,
            }]));
            for &viewer in &visible {
                self.world.visibility_mut().add_known(viewer, player_id);
                if let Some(session) = self.session_for_player(viewer) {
                    session.queue_frame(Arc::clone(&frame));
                }
            }
            if let Some(session) = &mover_session {
                session.queue_frame(frame);
            }
            timings.broadcast_ms += ms_since(broadcast_start);
        }

        timings
    }

    pub(crate) fn session_for_player(&self, player_id: u64) -> Option<Arc<ClientSession>> {
        let client_id = self.players.client_id_for_player(player_id)?;
        self.sessions.get(client_id)
    }

    pub(crate) fn spatial_entries(&self, ids: &[u64]) -> Vec<SpatialEntry> {
        ids.iter()
            .filter_map(|&id| {
                let player = self.players.get(id)?;
                Some(SpatialEntry {
                    player_id: id,
                    x: player.x(),
                    y: player.y(),
                    facing: player.facing().as_u8(),
                })
            })
            .collect()
    }

    /// The account's saved position when it is still usable, otherwise a
    /// fresh spawn.
    fn spawn_position(&self, account: &PlayerAccount) -> (i16, i16) {
        if account.map_id == self.world.map().map_id()
            && !self.world.map().blocked(account.x, account.y)
            && !self.world.is_player_at(account.x, account.y, 0)
        {
            return (account.x, account.y);
        }
        self.find_spawn()
    }

    /// First free, walkable tile scanning outward from the spawn point.
    fn find_spawn(&self) -> (i16, i16) {
        let (sx, sy) = SPAWN_POINT;
        for radius in 0..16i16 {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs().max(dy.abs()) != radius {
                        continue;
                    }
                    let (x, y) = (sx + dx, sy + dy);
                    if !self.world.map().blocked(x, y) && !self.world.is_player_at(x, y, 0) {
                        return (x, y);
                    }
                }
            }
        }
        // A completely packed spawn area; stack players and let movement
        // validation sort it out.
        (sx, sy)
    }
}

fn action_label(action: &Action) -> &'static str {
    match action {
        Action::Login { .. } => "Login",
        Action::Logout { .. } => "Logout",
        Action::Move { .. } => "Move",
        Action::Turn { .. } => "Turn",
        Action::Chat { .. } => "Chat",
        Action::Warp { .. } => "Warp",
        Action::SpawnBots { .. } => "SpawnBots",
        Action::RemoveBots => "RemoveBots",
    }
}

fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// The tick worker: a plain loop on a dedicated thread, paced by a
/// monotonic clock. Sleeps until the next tick boundary; an overrun skips
/// the sleep and is recorded.
pub fn run_tick_loop(
    mut shard: Shard,
    mut actions: ActionReceiver,
    shutdown: watch::Receiver<bool>,
) {
    log::info!("Game loop started ({TICKS_PER_SECOND} ticks/sec)");
    let mut next_tick = Instant::now() + TICK_INTERVAL;
    let mut last_roll = Instant::now();

    while !*shutdown.borrow() {
        let start = Instant::now();
        shard.tick(&mut actions, start);

        if start.duration_since(last_roll) >= Duration::from_secs(1) {
            shard.bandwidth.roll_second();
            last_roll = start;
        }
        shard.stats.record_tick(ms_since(start));

        let now = Instant::now();
        if now < next_tick {
            std::thread::sleep(next_tick - now);
        } else {
            shard.stats.record_overrun();
            // After a long stall, re-anchor instead of sprinting to catch
            // up a backlog of ticks.
            if now.duration_since(next_tick) > Duration::from_secs(1) {
                next_tick = now;
            }
        }
        next_tick += TICK_INTERVAL;
    }
    log::info!("Game loop ended");
}
