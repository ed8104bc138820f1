use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::player::{Facing, Player};
use crate::thread_owner::ThreadOwner;

const ID_GENERATION_ATTEMPTS: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CreatePlayerError {
    #[error("client {client_id} already has player {player_id}")]
    ClientAlreadyBound { client_id: u64, player_id: u64 },

    #[error("player id space exhausted")]
    IdsExhausted,
}

/// Player lifecycle, id mappings and dirty tracking.
///
/// `client_to_player` and `player_to_client` are a pair: every mutation
/// touches both. Owns no spatial data (that's [`crate::World`]) and no
/// networking.
#[derive(Debug)]
pub struct PlayerRegistry {
    players: HashMap<u64, Player>,
    client_to_player: HashMap<u64, u64>,
    player_to_client: HashMap<u64, u64>,
    /// Players whose broadcastable state changed this tick.
    dirty: HashSet<u64>,
    rng: StdRng,
    next_fallback_id: u64,
    owner: ThreadOwner,
}

impl Default for PlayerRegistry {
    fn default() -> Self {
        Self {
            players: HashMap::new(),
            client_to_player: HashMap::new(),
            player_to_client: HashMap::new(),
            dirty: HashSet::new(),
            rng: StdRng::from_entropy(),
            next_fallback_id: 1,
            owner: ThreadOwner::default(),
        }
    }
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a player bound to a client connection. Rejects clients that
    /// already have a player; overwriting the mapping would orphan the old
    /// player and break lookups.
    pub fn create_player(
        &mut self,
        client_id: u64,
        x: i16,
        y: i16,
        facing: Facing,
    ) -> Result<u64, CreatePlayerError> {
        self.owner.check();
        if let Some(&player_id) = self.client_to_player.get(&client_id) {
            log::error!("create_player: client {client_id} already has player {player_id}");
            return Err(CreatePlayerError::ClientAlreadyBound {
                client_id,
                player_id,
            });
        }

        let player_id = self.generate_unique_id()?;
        let mut player = Player::new(player_id, x, y, facing);
        player.set_client_id(client_id);

        self.players.insert(player_id, player);
        self.client_to_player.insert(client_id, player_id);
        self.player_to_client.insert(player_id, client_id);

        log::trace!("Player {player_id} created for client {client_id}");
        Ok(player_id)
    }

    pub fn remove_player(&mut self, player_id: u64) -> Option<Player> {
        self.owner.check();
        if let Some(client_id) = self.player_to_client.remove(&player_id) {
            self.client_to_player.remove(&client_id);
        }
        self.dirty.remove(&player_id);
        let player = self.players.remove(&player_id);
        if player.is_some() {
            log::info!("Player {player_id} removed");
        }
        player
    }

    pub fn remove_by_client(&mut self, client_id: u64) -> Option<Player> {
        self.owner.check();
        let player_id = self.client_to_player.remove(&client_id)?;
        self.player_to_client.remove(&player_id);
        self.dirty.remove(&player_id);
        let player = self.players.remove(&player_id);
        log::info!("Player {player_id} removed (by client {client_id})");
        player
    }

    pub fn get(&self, player_id: u64) -> Option<&Player> {
        self.owner.check();
        self.players.get(&player_id)
    }

    pub fn get_mut(&mut self, player_id: u64) -> Option<&mut Player> {
        self.owner.check();
        self.players.get_mut(&player_id)
    }

    pub fn by_client(&self, client_id: u64) -> Option<&Player> {
        self.owner.check();
        self.players.get(self.client_to_player.get(&client_id)?)
    }

    pub fn by_client_mut(&mut self, client_id: u64) -> Option<&mut Player> {
        self.owner.check();
        let player_id = *self.client_to_player.get(&client_id)?;
        self.players.get_mut(&player_id)
    }

    pub fn player_id_for_client(&self, client_id: u64) -> Option<u64> {
        self.owner.check();
        self.client_to_player.get(&client_id).copied()
    }

    pub fn client_id_for_player(&self, player_id: u64) -> Option<u64> {
        self.owner.check();
        self.player_to_client.get(&player_id).copied()
    }

    /// Flags a player for broadcast this tick. Unknown ids are ignored.
    pub fn mark_dirty(&mut self, player_id: u64) {
        self.owner.check();
        if self.players.contains_key(&player_id) {
            self.dirty.insert(player_id);
        }
    }

    /// Returns and clears the dirty set in one step.
    pub fn consume_dirty(&mut self) -> Vec<u64> {
        self.owner.check();
        self.dirty.drain().collect()
    }

    pub fn has_dirty(&self) -> bool {
        self.owner.check();
        !self.dirty.is_empty()
    }

    pub fn dirty_count(&self) -> usize {
        self.owner.check();
        self.dirty.len()
    }

    pub fn count(&self) -> usize {
        self.owner.check();
        self.players.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.owner.check();
        self.players.values()
    }

    pub fn position_of(&self, player_id: u64) -> Option<(i16, i16)> {
        self.owner.check();
        self.players.get(&player_id).map(Player::position)
    }

    /// Uniform draw from [1, u64::MAX - 1] with collision retry, then a
    /// monotonic fallback scan.
    fn generate_unique_id(&mut self) -> Result<u64, CreatePlayerError> {
        for _ in 0..ID_GENERATION_ATTEMPTS {
            let id = self.rng.gen_range(1..u64::MAX);
            if !self.players.contains_key(&id) {
                return Ok(id);
            }
        }

        for _ in 0..ID_GENERATION_ATTEMPTS {
            let id = self.next_fallback_id;
            self.next_fallback_id += 1;
            if !self.players.contains_key(&id) {
                return Ok(id);
            }
        }

        log::error!("failed to generate a unique player id after retries and fallback");
        Err(CreatePlayerError::IdsExhausted)
    }
}
