use std::time::{Duration, Instant};

use crate::tile::TileMap;

/// Facing / movement direction. Y grows northward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Facing {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Facing {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::North),
            1 => Some(Self::East),
            2 => Some(Self::South),
            3 => Some(Self::West),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// One step in this direction.
    pub fn step(self, x: i16, y: i16) -> (i16, i16) {
        match self {
            Self::North => (x, y + 1),
            Self::East => (x + 1, y),
            Self::South => (x, y - 1),
            Self::West => (x - 1, y),
        }
    }
}

/// Why a movement attempt succeeded or failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveResult {
    Success,
    OnCooldown,
    WrongFacing,
    InvalidDirection,
    Blocked,
    OccupiedByPlayer,
}

/// Clients send moves every ~350 ms; the base cooldown sits lower to absorb
/// network variance, and the floor is the anti-speed-hack limit no amount of
/// reported ping can get under.
pub const BASE_MOVE_COOLDOWN: Duration = Duration::from_millis(280);
pub const MIN_MOVE_COOLDOWN: Duration = Duration::from_millis(200);
pub const MAX_PING_ADJUSTMENT: Duration = Duration::from_millis(100);
pub const TURN_COOLDOWN: Duration = Duration::from_millis(150);

/// A player entity: identity, position, facing, and movement validation.
///
/// Owns no map data and knows nothing about other players; collision is
/// asked of the [`TileMap`] and occupancy of a caller-supplied predicate.
/// Mutated only on the tick thread (the registry carrying these is
/// owner-checked), and the tick thread supplies the clock.
#[derive(Debug)]
pub struct Player {
    id: u64,
    client_id: u64,
    name: Option<String>,
    x: i16,
    y: i16,
    facing: Facing,
    last_move_at: Option<Instant>,
    last_turn_at: Option<Instant>,
}

impl Player {
    pub fn new(player_id: u64, x: i16, y: i16, facing: Facing) -> Self {
        Self {
            id: player_id,
            client_id: 0,
            name: None,
            x,
            y,
            facing,
            last_move_at: None,
            last_turn_at: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    /// Bound once during login setup.
    pub fn set_client_id(&mut self, client_id: u64) {
        self.client_id = client_id;
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn x(&self) -> i16 {
        self.x
    }

    pub fn y(&self) -> i16 {
        self.y
    }

    pub fn position(&self) -> (i16, i16) {
        (self.x, self.y)
    }

    /// Raw position set for teleport, spawn placement and forced movement.
    /// Does not validate walkability; normal movement goes through
    /// [`attempt_move`](Self::attempt_move).
    pub fn set_position(&mut self, x: i16, y: i16) {
        self.x = x;
        self.y = y;
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    /// Ignores invalid values silently.
    pub fn set_facing(&mut self, facing: u8) {
        if let Some(facing) = Facing::from_u8(facing) {
            self.facing = facing;
        }
    }

    /// Validates and applies one step of movement.
    ///
    /// Checks run in order, short-circuiting on the first failure:
    /// cooldown, facing (both the server's facing and the client's claimed
    /// facing must equal the direction), direction validity, tile blocking,
    /// tile occupancy. Success updates position and the move timestamp.
    pub fn attempt_move(
        &mut self,
        direction: u8,
        sent_facing: u8,
        map: &TileMap,
        client_ping_ms: u32,
        now: Instant,
        is_occupied: impl FnOnce(i16, i16) -> bool,
    ) -> MoveResult {
        if let Some(last) = self.last_move_at {
            if now.saturating_duration_since(last) < adjusted_cooldown(client_ping_ms) {
                return MoveResult::OnCooldown;
            }
        }

        if direction != self.facing.as_u8() || sent_facing != self.facing.as_u8() {
            return MoveResult::WrongFacing;
        }

        let Some(direction) = Facing::from_u8(direction) else {
            return MoveResult::InvalidDirection;
        };

        let (new_x, new_y) = direction.step(self.x, self.y);

        if map.blocked(new_x, new_y) {
            return MoveResult::Blocked;
        }

        if is_occupied(new_x, new_y) {
            return MoveResult::OccupiedByPlayer;
        }

        self.last_move_at = Some(now);
        self.x = new_x;
        self.y = new_y;
        MoveResult::Success
    }

    /// Turns to face a new direction. Rejects invalid directions, no-op
    /// turns, and turns inside the turn cooldown.
    pub fn attempt_turn(&mut self, new_facing: u8, now: Instant) -> bool {
        let Some(new_facing) = Facing::from_u8(new_facing) else {
            return false;
        };
        if new_facing == self.facing {
            return false;
        }
        if let Some(last) = self.last_turn_at {
            if now.saturating_duration_since(last) < TURN_COOLDOWN {
                return false;
            }
        }
        self.last_turn_at = Some(now);
        self.facing = new_facing;
        true
    }

    /// Time until the next move is allowed, for client prediction hints.
    pub fn time_until_can_move(&self, now: Instant) -> Duration {
        match self.last_move_at {
            Some(last) => {
                BASE_MOVE_COOLDOWN.saturating_sub(now.saturating_duration_since(last))
            }
            None => Duration::ZERO,
        }
    }
}

/// Cooldown adjusted for client ping: half the RTT is how late the packet
/// arrived, capped, and never allowed below the floor.
fn adjusted_cooldown(ping_ms: u32) -> Duration {
    let one_way = Duration::from_millis(u64::from(ping_ms) / 2).min(MAX_PING_ADJUSTMENT);
    (BASE_MOVE_COOLDOWN - one_way).max(MIN_MOVE_COOLDOWN)
}
