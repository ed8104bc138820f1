use thiserror::Error;

/// Tile kinds shared with the client. One byte per tile so view rectangles
/// stream cheaply.
pub mod tile_kind {
    /// Empty / out of bounds.
    pub const VOID: u8 = 0x00;
    pub const DEFAULT: u8 = 0x01;
    pub const WALL: u8 = 0x02;
    pub const GRASS: u8 = 0x03;

    pub fn is_blocking(kind: u8) -> bool {
        matches!(kind, VOID | WALL)
    }
}

#[derive(Debug, Error)]
pub enum TileMapError {
    #[error("tile data length {got} does not match {width}x{height}")]
    SizeMismatch { width: i16, height: i16, got: usize },
}

/// Static terrain for one map: a row-major byte grid of tile kinds plus a
/// parallel blocking array. Every kind mutation updates both at the same
/// index.
#[derive(Debug)]
pub struct TileMap {
    width: i16,
    height: i16,
    map_id: u32,
    name: String,
    tiles: Vec<u8>,
    blocking: Vec<bool>,
}

impl TileMap {
    pub fn new(width: i16, height: i16, default_kind: u8) -> Self {
        assert!(width > 0 && height > 0);
        let len = width as usize * height as usize;
        let mut map = Self {
            width,
            height,
            map_id: 0,
            name: String::new(),
            tiles: vec![default_kind; len],
            blocking: vec![false; len],
        };
        map.recalculate_blocking();
        map
    }

    pub fn from_bytes(width: i16, height: i16, tile_data: Vec<u8>) -> Result<Self, TileMapError> {
        assert!(width > 0 && height > 0);
        if tile_data.len() != width as usize * height as usize {
            return Err(TileMapError::SizeMismatch {
                width,
                height,
                got: tile_data.len(),
            });
        }
        let len = tile_data.len();
        let mut map = Self {
            width,
            height,
            map_id: 0,
            name: String::new(),
            tiles: tile_data,
            blocking: vec![false; len],
        };
        map.recalculate_blocking();
        Ok(map)
    }

    pub fn width(&self) -> i16 {
        self.width
    }

    pub fn height(&self) -> i16 {
        self.height
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    pub fn set_map_id(&mut self, id: u32) {
        self.map_id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn in_bounds(&self, x: i16, y: i16) -> bool {
        x >= 0 && x < self.width && y >= 0 && y < self.height
    }

    /// Returns [`tile_kind::VOID`] when out of bounds.
    pub fn tile(&self, x: i16, y: i16) -> u8 {
        if !self.in_bounds(x, y) {
            return tile_kind::VOID;
        }
        self.tiles[self.index(x, y)]
    }

    /// Sets the kind and its derived blocking state. Out of bounds is a no-op.
    pub fn set_tile(&mut self, x: i16, y: i16, kind: u8) {
        if !self.in_bounds(x, y) {
            return;
        }
        let idx = self.index(x, y);
        self.tiles[idx] = kind;
        self.blocking[idx] = tile_kind::is_blocking(kind);
    }

    /// True for out-of-bounds positions and for blocking kinds.
    pub fn blocked(&self, x: i16, y: i16) -> bool {
        if !self.in_bounds(x, y) {
            return true;
        }
        self.blocking[self.index(x, y)]
    }

    /// Overrides the natural blocking of the tile kind (doors, dynamic
    /// obstacles). Out of bounds is a no-op.
    pub fn set_blocked(&mut self, x: i16, y: i16, blocked: bool) {
        if !self.in_bounds(x, y) {
            return;
        }
        let idx = self.index(x, y);
        self.blocking[idx] = blocked;
    }

    /// Rebuilds all blocking state from tile kinds. Call after bulk edits
    /// that bypass `set_tile`.
    pub fn recalculate_blocking(&mut self) {
        for (i, &kind) in self.tiles.iter().enumerate() {
            self.blocking[i] = tile_kind::is_blocking(kind);
        }
    }

    pub fn raw_tiles(&self) -> &[u8] {
        &self.tiles
    }

    pub fn load_from_bytes(&mut self, data: Vec<u8>) -> Result<(), TileMapError> {
        if data.len() != self.tiles.len() {
            return Err(TileMapError::SizeMismatch {
                width: self.width,
                height: self.height,
                got: data.len(),
            });
        }
        self.tiles = data;
        self.recalculate_blocking();
        Ok(())
    }

    /// Tile kinds for a rectangle, row by row. Out-of-bounds cells read as
    /// [`tile_kind::VOID`].
    pub fn region_tiles(
        &self,
        start_x: i16,
        start_y: i16,
        region_width: i16,
        region_height: i16,
    ) -> Vec<u8> {
        let mut region = Vec::with_capacity(region_width as usize * region_height as usize);
        for y in start_y..start_y + region_height {
            for x in start_x..start_x + region_width {
                region.push(self.tile(x, y));
            }
        }
        region
    }

    /// The `(2r+1)^2` rectangle centered on a position, for client view sync.
    pub fn view_tiles(&self, center_x: i16, center_y: i16, view_radius: i16) -> Vec<u8> {
        let size = view_radius * 2 + 1;
        self.region_tiles(center_x - view_radius, center_y - view_radius, size, size)
    }

    pub fn fill_region(
        &mut self,
        start_x: i16,
        start_y: i16,
        region_width: i16,
        region_height: i16,
        kind: u8,
    ) {
        for y in start_y..start_y + region_height {
            for x in start_x..start_x + region_width {
                self.set_tile(x, y, kind);
            }
        }
    }

    /// Walls around the map edge.
    pub fn create_border(&mut self) {
        for x in 0..self.width {
            self.set_tile(x, 0, tile_kind::WALL);
            self.set_tile(x, self.height - 1, tile_kind::WALL);
        }
        for y in 0..self.height {
            self.set_tile(0, y, tile_kind::WALL);
            self.set_tile(self.width - 1, y, tile_kind::WALL);
        }
    }

    fn index(&self, x: i16, y: i16) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_reads_void_and_blocks() {
        let map = TileMap::new(4, 4, tile_kind::GRASS);
        assert_eq!(map.tile(-1, 0), tile_kind::VOID);
        assert_eq!(map.tile(0, 4), tile_kind::VOID);
        assert!(map.blocked(-1, 0));
        assert!(map.blocked(4, 0));
        assert!(!map.blocked(1, 1));
    }

    #[test]
    fn set_tile_updates_blocking_at_same_index() {
        let mut map = TileMap::new(4, 4, tile_kind::GRASS);
        map.set_tile(2, 1, tile_kind::WALL);
        assert!(map.blocked(2, 1));
        assert!(!map.blocked(1, 2));
        map.set_tile(2, 1, tile_kind::DEFAULT);
        assert!(!map.blocked(2, 1));
    }

    #[test]
    fn blocked_override_survives_until_recalculate() {
        let mut map = TileMap::new(4, 4, tile_kind::GRASS);
        map.set_blocked(1, 1, true);
        assert!(map.blocked(1, 1));
        map.recalculate_blocking();
        assert!(!map.blocked(1, 1));
    }

    #[test]
    fn from_bytes_requires_matching_length() {
        assert!(TileMap::from_bytes(2, 2, vec![1, 1, 1]).is_err());
        let map = TileMap::from_bytes(2, 2, vec![1, 2, 3, 1]).unwrap();
        assert_eq!(map.tile(1, 0), tile_kind::WALL);
        assert!(map.blocked(1, 0));
    }

    #[test]
    fn border_blocks_edges() {
        let mut map = TileMap::new(5, 5, tile_kind::GRASS);
        map.create_border();
        assert!(map.blocked(0, 2));
        assert!(map.blocked(4, 2));
        assert!(map.blocked(2, 0));
        assert!(map.blocked(2, 4));
        assert!(!map.blocked(2, 2));
    }

    #[test]
    fn view_tiles_is_row_major_rectangle() {
        let mut map = TileMap::new(5, 5, tile_kind::GRASS);
        map.set_tile(2, 2, tile_kind::WALL);
        let view = map.view_tiles(2, 2, 1);
        assert_eq!(view.len(), 9);
        // Center of the 3x3 rectangle.
        assert_eq!(view[4], tile_kind::WALL);
    }

    #[test]
    fn view_tiles_pads_out_of_bounds_with_void() {
        let map = TileMap::new(3, 3, tile_kind::GRASS);
        let view = map.view_tiles(0, 0, 1);
        assert_eq!(view.len(), 9);
        // First row is entirely below the map.
        assert_eq!(&view[..3], &[tile_kind::VOID; 3]);
        assert_eq!(view[3], tile_kind::VOID); // (-1, 0)
        assert_eq!(view[4], tile_kind::GRASS); // (0, 0)
    }

    #[test]
    fn fill_region_sets_kinds_and_blocking() {
        let mut map = TileMap::new(6, 6, tile_kind::GRASS);
        map.fill_region(1, 1, 2, 3, tile_kind::WALL);
        for y in 1..4 {
            for x in 1..3 {
                assert!(map.blocked(x, y));
            }
        }
        assert!(!map.blocked(3, 1));
    }
}
