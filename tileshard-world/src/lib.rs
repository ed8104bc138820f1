//! Authoritative game state for one shard: terrain, entity positions,
//! visibility bookkeeping and player lifecycle.
//!
//! Everything in this crate is owned by the single tick thread. The
//! [`ThreadOwner`] embedded in each structure enforces that in debug builds;
//! network workers communicate with the tick thread through the action queue
//! instead of touching any of these types.

mod player;
mod registry;
mod spatial;
mod thread_owner;
mod tile;
mod visibility;
mod world;

pub use crate::player::{
    Facing, MoveResult, Player, BASE_MOVE_COOLDOWN, MAX_PING_ADJUSTMENT, MIN_MOVE_COOLDOWN,
    TURN_COOLDOWN,
};
pub use crate::registry::{CreatePlayerError, PlayerRegistry};
pub use crate::spatial::{SpatialHash, CELL_SIZE};
pub use crate::thread_owner::ThreadOwner;
pub use crate::tile::{tile_kind, TileMap, TileMapError};
pub use crate::visibility::{Diff, VisibilityTracker};
pub use crate::world::{World, VIEW_RANGE};
