use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tileshard_world::Facing;

use crate::tick::Shard;

/// Synthetic client ids for bots live in the top half of the id space,
/// far above anything the accept loop's counter will ever hand out.
const BOT_CLIENT_ID_BASE: u64 = 1 << 63;

/// State for stress-test bots: fake players that move randomly to simulate
/// load. They go through the same validation and broadcast paths as real
/// players; they just have no session.
#[derive(Debug)]
pub struct BotManager {
    bot_ids: Vec<u64>,
    rng: StdRng,
    next_client_id: u64,
}

impl Default for BotManager {
    fn default() -> Self {
        Self {
            bot_ids: Vec::new(),
            rng: StdRng::from_entropy(),
            next_client_id: BOT_CLIENT_ID_BASE,
        }
    }
}

impl BotManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.bot_ids.len()
    }

    pub fn is_bot(&self, player_id: u64) -> bool {
        self.bot_ids.contains(&player_id)
    }
}

impl Shard {
    /// Spawns bots at free tiles. Clustered spawning packs them around the
    /// first real player to stress the visibility hot path; spread spawning
    /// scatters them across the whole map.
    pub(crate) fn spawn_bots(&mut self, count: usize, clustered: bool) {
        let anchor = if clustered {
            self.players
                .iter()
                .find(|p| !self.bots.is_bot(p.id()))
                .map(|p| p.position())
        } else {
            None
        };
        let (map_width, map_height) = (self.world.map().width(), self.world.map().height());

        let mut spawned = 0;
        for _ in 0..count {
            let mut position = None;
            for _ in 0..50 {
                let (x, y) = match anchor {
                    Some((ax, ay)) => (
                        ax + self.bots.rng.gen_range(-8..=8),
                        ay + self.bots.rng.gen_range(-8..=8),
                    ),
                    None => (
                        self.bots.rng.gen_range(1..map_width.max(3) - 1),
                        self.bots.rng.gen_range(1..map_height.max(3) - 1),
                    ),
                };
                if !self.world.map().blocked(x, y) && !self.world.is_player_at(x, y, 0) {
                    position = Some((x, y));
                    break;
                }
            }
            let Some((x, y)) = position else {
                log::warn!("no free tile for bot spawn; stopping at {spawned}");
                break;
            };

            let client_id = self.bots.next_client_id;
            self.bots.next_client_id += 1;
            let facing = Facing::from_u8(self.bots.rng.gen_range(0..4)).unwrap();
            let player_id = match self.players.create_player(client_id, x, y, facing) {
                Ok(player_id) => player_id,
                Err(e) => {
                    log::error!("bot spawn failed: {e}");
                    break;
                }
            };
            self.world.add_player(player_id, x, y);
            self.bots.bot_ids.push(player_id);
            // The dirty pass announces the bot to everyone in range.
            self.players.mark_dirty(player_id);
            spawned += 1;
        }
        log::info!(
            "Spawned {spawned} bots ({} total, clustered={clustered})",
            self.bots.count(),
        );
    }

    pub(crate) fn remove_bots(&mut self) {
        let bot_ids = std::mem::take(&mut self.bots.bot_ids);
        let removed = bot_ids.len();
        for player_id in bot_ids {
            self.despawn(player_id);
            self.players.remove_player(player_id);
        }
        log::info!("Removed {removed} bots");
    }

    /// Moves one random bot per tick through the normal movement path:
    /// turn to a random direction first if needed, then step.
    pub(crate) fn process_bot_movement(&mut self, now: Instant) {
        if self.bots.bot_ids.is_empty() {
            return;
        }
        let index = self.bots.rng.gen_range(0..self.bots.bot_ids.len());
        let player_id = self.bots.bot_ids[index];
        let direction = self.bots.rng.gen_range(0..4u8);

        let world = &self.world;
        let Some(player) = self.players.get_mut(player_id) else {
            log::error!("bot {player_id} missing from registry");
            self.bots.bot_ids.swap_remove(index);
            return;
        };

        let changed = if player.facing().as_u8() == direction {
            let result = player.attempt_move(direction, direction, world.map(), 0, now, |x, y| {
                world.is_player_at(x, y, player_id)
            });
            result == tileshard_world::MoveResult::Success
        } else {
            player.attempt_turn(direction, now)
        };

        if changed {
            let (x, y) = player.position();
            self.world.update_position(player_id, x, y);
            self.players.mark_dirty(player_id);
        }
    }
}
