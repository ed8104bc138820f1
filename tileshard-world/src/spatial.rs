use std::collections::HashMap;

use crate::thread_owner::ThreadOwner;

/// Cell size in tiles. With a view range of 10 (21x21 view area) one cell
/// roughly covers the view diameter, so range queries touch at most a 3x3
/// block of cells.
pub const CELL_SIZE: i16 = 11;

type CellKey = i64;

fn make_cell_key(cx: i32, cy: i32) -> CellKey {
    ((cx as i64) << 32) | (cy as u32 as i64)
}

fn cell_key(x: i16, y: i16) -> CellKey {
    make_cell_key((x / CELL_SIZE) as i32, (y / CELL_SIZE) as i32)
}

fn split_cell_key(key: CellKey) -> (i32, i32) {
    ((key >> 32) as i32, key as i32)
}

/// Grid-bucket partitioning of dynamic entities for sub-linear "who is near
/// (x, y)" queries.
///
/// Range queries are a coarse filter: they return everything in the cells
/// overlapping the range. Callers that need the exact rectangular view must
/// apply a Chebyshev distance check on top.
///
/// A dense grid of buckets is kept in parallel once world bounds are known;
/// queries prefer it for O(1) bucket access and fall back to the sparse map
/// for out-of-bounds cells.
#[derive(Debug, Default)]
pub struct SpatialHash {
    /// cell key -> entity ids in that cell.
    cells: HashMap<CellKey, Vec<u64>>,
    /// entity id -> current cell key. Removal and movement always derive the
    /// old cell from here, never from the entity's current position.
    entity_cells: HashMap<u64, CellKey>,
    /// entity id -> authoritative position, refreshed on every update.
    positions: HashMap<u64, (i16, i16)>,
    grid: Vec<Vec<u64>>,
    grid_width: i32,
    grid_height: i32,
    use_grid: bool,
    owner: ThreadOwner,
}

impl SpatialHash {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sizes the dense grid for known world bounds. Call once at startup.
    pub fn init_grid(&mut self, world_width: i16, world_height: i16) {
        self.owner.check();
        self.grid_width = (world_width / CELL_SIZE) as i32 + 1;
        self.grid_height = (world_height / CELL_SIZE) as i32 + 1;
        self.grid = vec![Vec::new(); self.grid_width as usize * self.grid_height as usize];
        self.use_grid = true;
    }

    pub fn add(&mut self, entity_id: u64, x: i16, y: i16) {
        self.owner.check();
        let key = cell_key(x, y);
        self.cells.entry(key).or_default().push(entity_id);
        self.entity_cells.insert(entity_id, key);
        self.positions.insert(entity_id, (x, y));
        self.grid_insert(key, entity_id);
    }

    pub fn remove(&mut self, entity_id: u64) {
        self.owner.check();
        let Some(key) = self.entity_cells.remove(&entity_id) else {
            return;
        };
        self.cell_remove(key, entity_id);
        self.grid_remove(key, entity_id);
        self.positions.remove(&entity_id);
    }

    /// Moves an entity. Returns true iff the cell key changed; same-cell
    /// updates leave `cells` and `entity_cells` untouched.
    pub fn update(&mut self, entity_id: u64, new_x: i16, new_y: i16) -> bool {
        self.owner.check();
        let Some(&old_key) = self.entity_cells.get(&entity_id) else {
            return false;
        };
        self.positions.insert(entity_id, (new_x, new_y));

        let new_key = cell_key(new_x, new_y);
        if old_key == new_key {
            return false;
        }

        self.cell_remove(old_key, entity_id);
        self.grid_remove(old_key, entity_id);
        self.cells.entry(new_key).or_default().push(entity_id);
        self.entity_cells.insert(entity_id, new_key);
        self.grid_insert(new_key, entity_id);
        true
    }

    /// Coarse filter: every entity id in the cells overlapping the range.
    pub fn nearby_ids(&self, x: i16, y: i16, range: i16) -> Vec<u64> {
        self.owner.check();
        let mut result = Vec::new();
        self.for_each_nearby(x, y, range, |id, _, _| result.push(id));
        result
    }

    /// Zero-allocation iteration over the coarse filter for hot paths. The
    /// callback receives each candidate's id and current position.
    pub fn for_each_nearby(&self, x: i16, y: i16, range: i16, mut f: impl FnMut(u64, i16, i16)) {
        self.owner.check();
        let center_cx = (x / CELL_SIZE) as i32;
        let center_cy = (y / CELL_SIZE) as i32;
        // +1 cell to cover entities straddling cell boundaries.
        let cells_radius = (range / CELL_SIZE) as i32 + 1;

        for dcx in -cells_radius..=cells_radius {
            for dcy in -cells_radius..=cells_radius {
                let cx = center_cx + dcx;
                let cy = center_cy + dcy;
                // The map starts at (0, 0).
                if cx < 0 || cy < 0 {
                    continue;
                }
                let bucket = if self.use_grid && cx < self.grid_width && cy < self.grid_height {
                    &self.grid[(cy * self.grid_width + cx) as usize]
                } else {
                    match self.cells.get(&make_cell_key(cx, cy)) {
                        Some(ids) => ids,
                        None => continue,
                    }
                };
                for &id in bucket {
                    let (ex, ey) = self.positions[&id];
                    f(id, ex, ey);
                }
            }
        }
    }

    /// True if any entity other than `exclude_id` stands exactly on (x, y).
    pub fn is_player_at(&self, x: i16, y: i16, exclude_id: u64) -> bool {
        self.owner.check();
        let Some(ids) = self.cells.get(&cell_key(x, y)) else {
            return false;
        };
        ids.iter()
            .any(|&id| id != exclude_id && self.positions[&id] == (x, y))
    }

    pub fn contains(&self, entity_id: u64) -> bool {
        self.owner.check();
        self.entity_cells.contains_key(&entity_id)
    }

    pub fn position_of(&self, entity_id: u64) -> Option<(i16, i16)> {
        self.owner.check();
        self.positions.get(&entity_id).copied()
    }

    /// The cell an entity is currently bucketed in, as cell indices.
    pub fn cell_of(&self, entity_id: u64) -> Option<(i32, i32)> {
        self.owner.check();
        self.entity_cells.get(&entity_id).map(|&k| split_cell_key(k))
    }

    /// The cell indices a position hashes to.
    pub fn cell_for_position(x: i16, y: i16) -> (i32, i32) {
        split_cell_key(cell_key(x, y))
    }

    pub fn count(&self) -> usize {
        self.owner.check();
        self.entity_cells.len()
    }

    pub fn cell_count(&self) -> usize {
        self.owner.check();
        self.cells.len()
    }

    pub fn for_each(&self, mut f: impl FnMut(u64, i16, i16)) {
        self.owner.check();
        for (&id, &(x, y)) in &self.positions {
            f(id, x, y);
        }
    }

    pub fn clear(&mut self) {
        self.owner.check();
        self.cells.clear();
        self.entity_cells.clear();
        self.positions.clear();
        for bucket in &mut self.grid {
            bucket.clear();
        }
    }

    fn cell_remove(&mut self, key: CellKey, entity_id: u64) {
        if let Some(ids) = self.cells.get_mut(&key) {
            ids.retain(|&id| id != entity_id);
            // Drop empty cells so the sparse map does not grow forever.
            if ids.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    fn grid_insert(&mut self, key: CellKey, entity_id: u64) {
        if !self.use_grid {
            return;
        }
        let (cx, cy) = split_cell_key(key);
        if cx >= 0 && cx < self.grid_width && cy >= 0 && cy < self.grid_height {
            self.grid[(cy * self.grid_width + cx) as usize].push(entity_id);
        }
    }

    fn grid_remove(&mut self, key: CellKey, entity_id: u64) {
        if !self.use_grid {
            return;
        }
        let (cx, cy) = split_cell_key(key);
        if cx >= 0 && cx < self.grid_width && cy >= 0 && cy < self.grid_height {
            self.grid[(cy * self.grid_width + cx) as usize].retain(|&id| id != entity_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_cell_invariant(hash: &SpatialHash) {
        hash.for_each(|id, x, y| {
            assert_eq!(
                hash.cell_of(id).unwrap(),
                SpatialHash::cell_for_position(x, y),
                "entity {id} bucketed in the wrong cell",
            );
        });
    }

    #[test]
    fn add_update_remove_keep_cell_invariant() {
        let mut hash = SpatialHash::new();
        hash.add(1, 5, 5);
        hash.add(2, 30, 30);
        assert_cell_invariant(&hash);

        assert!(hash.update(1, 15, 5), "crossing a cell boundary");
        assert_cell_invariant(&hash);

        hash.remove(2);
        assert!(!hash.contains(2));
        assert_eq!(hash.count(), 1);
        assert_cell_invariant(&hash);
    }

    #[test]
    fn same_cell_update_is_a_no_op_on_maps() {
        let mut hash = SpatialHash::new();
        hash.add(1, 5, 5);
        let cell_before = hash.cell_of(1).unwrap();
        let cells_before = hash.cell_count();

        assert!(!hash.update(1, 6, 6));
        assert_eq!(hash.cell_of(1).unwrap(), cell_before);
        assert_eq!(hash.cell_count(), cells_before);
        // The authoritative position still advances.
        assert_eq!(hash.position_of(1), Some((6, 6)));
    }

    #[test]
    fn update_of_untracked_entity_is_false() {
        let mut hash = SpatialHash::new();
        assert!(!hash.update(99, 1, 1));
    }

    #[test]
    fn nearby_is_a_coarse_filter_over_cells() {
        let mut hash = SpatialHash::new();
        hash.add(1, 5, 5);
        hash.add(2, 12, 5); // Next cell over, still within the +1 radius.
        hash.add(3, 200, 200); // Far away.

        let mut ids = hash.nearby_ids(5, 5, 10);
        ids.sort_unstable();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn dense_grid_and_sparse_map_agree() {
        let mut sparse = SpatialHash::new();
        let mut dense = SpatialHash::new();
        dense.init_grid(100, 100);

        for (id, x, y) in [(1u64, 3, 3), (2, 14, 3), (3, 25, 25), (4, 99, 99)] {
            sparse.add(id, x, y);
            dense.add(id, x, y);
        }
        sparse.update(2, 15, 4);
        dense.update(2, 15, 4);

        for &(x, y) in &[(5i16, 5i16), (20, 20), (90, 90)] {
            let mut a = sparse.nearby_ids(x, y, 10);
            let mut b = dense.nearby_ids(x, y, 10);
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b, "query at ({x}, {y}) diverged");
        }
    }

    #[test]
    fn is_player_at_checks_exact_position() {
        let mut hash = SpatialHash::new();
        hash.add(1, 5, 5);
        hash.add(2, 5, 6);

        assert!(hash.is_player_at(5, 5, 0));
        assert!(!hash.is_player_at(5, 5, 1), "excluded occupant ignored");
        assert!(!hash.is_player_at(7, 7, 0));
    }

    #[test]
    fn is_player_at_sees_same_cell_moves() {
        let mut hash = SpatialHash::new();
        hash.add(1, 5, 5);
        // Same cell, so the bucket maps are untouched, but the position is
        // refreshed and occupancy must follow it.
        hash.update(1, 6, 5);
        assert!(!hash.is_player_at(5, 5, 0));
        assert!(hash.is_player_at(6, 5, 0));
    }

    #[test]
    fn for_each_nearby_reports_positions() {
        let mut hash = SpatialHash::new();
        hash.add(1, 5, 5);
        let mut seen = Vec::new();
        hash.for_each_nearby(5, 5, 10, |id, x, y| seen.push((id, x, y)));
        assert_eq!(seen, [(1, 5, 5)]);
    }
}
