use crate::spatial::SpatialHash;
use crate::thread_owner::ThreadOwner;
use crate::tile::{tile_kind, TileMap};
use crate::visibility::VisibilityTracker;

/// How far players can see, as a Chebyshev radius in tiles.
pub const VIEW_RANGE: i16 = 10;

/// The authoritative answer to "can I walk here", "who is near here" and
/// "who has been told about whom" for one shard.
///
/// [`TileMap`] is pure terrain and knows nothing about players; the
/// [`SpatialHash`] tracks positions and knows nothing about tiles; the
/// [`VisibilityTracker`] knows only ids. `World` coordinates the three.
#[derive(Debug)]
pub struct World {
    tilemap: TileMap,
    spatial: SpatialHash,
    visibility: VisibilityTracker,
    owner: ThreadOwner,
}

impl World {
    pub fn new(width: i16, height: i16) -> Self {
        Self::with_map(TileMap::new(width, height, tile_kind::GRASS))
    }

    pub fn with_map(tilemap: TileMap) -> Self {
        let mut spatial = SpatialHash::new();
        spatial.init_grid(tilemap.width(), tilemap.height());
        Self {
            tilemap,
            spatial,
            visibility: VisibilityTracker::new(),
            owner: ThreadOwner::default(),
        }
    }

    pub fn map(&self) -> &TileMap {
        self.owner.check();
        &self.tilemap
    }

    pub fn map_mut(&mut self) -> &mut TileMap {
        self.owner.check();
        &mut self.tilemap
    }

    pub fn visibility(&self) -> &VisibilityTracker {
        self.owner.check();
        &self.visibility
    }

    pub fn visibility_mut(&mut self) -> &mut VisibilityTracker {
        self.owner.check();
        &mut self.visibility
    }

    pub fn add_player(&mut self, player_id: u64, x: i16, y: i16) {
        self.owner.check();
        self.spatial.add(player_id, x, y);
    }

    /// Removes a player from spatial tracking only; visibility cleanup is a
    /// separate step so the caller can collect departure notifications first.
    pub fn remove_player(&mut self, player_id: u64) {
        self.owner.check();
        self.spatial.remove(player_id);
    }

    /// Returns whether the player changed spatial cells. Interest diffs must
    /// run either way; within-cell moves still cross view boundaries.
    pub fn update_position(&mut self, player_id: u64, new_x: i16, new_y: i16) -> bool {
        self.owner.check();
        self.spatial.update(player_id, new_x, new_y)
    }

    pub fn has_player(&self, player_id: u64) -> bool {
        self.owner.check();
        self.spatial.contains(player_id)
    }

    pub fn player_count(&self) -> usize {
        self.owner.check();
        self.spatial.count()
    }

    pub fn position_of(&self, player_id: u64) -> Option<(i16, i16)> {
        self.owner.check();
        self.spatial.position_of(player_id)
    }

    pub fn is_player_at(&self, x: i16, y: i16, exclude_id: u64) -> bool {
        self.owner.check();
        self.spatial.is_player_at(x, y, exclude_id)
    }

    /// Ids of players within the exact rectangular range of a position:
    /// coarse spatial filter plus a Chebyshev check.
    pub fn players_in_range(&self, x: i16, y: i16, range: i16) -> Vec<u64> {
        self.owner.check();
        let mut result = Vec::new();
        self.spatial.for_each_nearby(x, y, range, |id, px, py| {
            if Self::is_in_range(x, y, px, py, range) {
                result.push(id);
            }
        });
        result
    }

    pub fn players_in_view(&self, x: i16, y: i16) -> Vec<u64> {
        self.players_in_range(x, y, VIEW_RANGE)
    }

    pub fn is_in_view(&self, x1: i16, y1: i16, x2: i16, y2: i16) -> bool {
        Self::is_in_range(x1, y1, x2, y2, VIEW_RANGE)
    }

    /// Rectangular (Chebyshev) distance check.
    pub fn is_in_range(x1: i16, y1: i16, x2: i16, y2: i16, range: i16) -> bool {
        let dx = (i32::from(x1) - i32::from(x2)).abs();
        let dy = (i32::from(y1) - i32::from(y2)).abs();
        dx <= i32::from(range) && dy <= i32::from(range)
    }

    pub fn active_cell_count(&self) -> usize {
        self.owner.check();
        self.spatial.cell_count()
    }
}
