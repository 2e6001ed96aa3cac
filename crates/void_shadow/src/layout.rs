//! Atlas tile layout
//!
//! Square atlases are split into a 1x1, 2x2 or 4x4 grid of equal tiles.

/// Largest grid split supported by one atlas
pub const MAX_SPLIT: u32 = 4;

/// Most tiles one atlas can hold
pub const MAX_ATLAS_TILES: u32 = MAX_SPLIT * MAX_SPLIT;

/// Grid layout of one atlas for the current frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileLayout {
    pub atlas_size: u32,
    /// Tiles per row and per column
    pub split: u32,
    /// Tile edge in texels
    pub tile_size: u32,
}

impl TileLayout {
    /// Pick the smallest grid for `tile_count` tiles
    pub fn new(atlas_size: u32, tile_count: u32) -> Self {
        let split = match tile_count {
            0..=1 => 1,
            2..=4 => 2,
            _ => MAX_SPLIT,
        };
        Self {
            atlas_size,
            split,
            tile_size: atlas_size / split,
        }
    }

    /// Number of tiles the grid holds
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.split * self.split
    }

    /// Tile fits inside the grid
    #[inline]
    pub fn contains(&self, tile_index: u32) -> bool {
        tile_index < self.capacity()
    }

    /// Grid cell of a tile (column, row)
    #[inline]
    pub fn tile_offset(&self, tile_index: u32) -> (u32, u32) {
        (tile_index % self.split, tile_index / self.split)
    }

    /// Viewport of a tile in texels
    pub fn viewport(&self, tile_index: u32) -> TileViewport {
        let (column, row) = self.tile_offset(tile_index);
        TileViewport {
            x: column * self.tile_size,
            y: row * self.tile_size,
            size: self.tile_size,
        }
    }

    /// Tile scale in atlas UV space
    #[inline]
    pub fn tile_scale(&self) -> f32 {
        1.0 / self.split as f32
    }

    /// `(1/size, 1/size, size, size)`
    pub fn atlas_size_vector(&self) -> [f32; 4] {
        let size = self.atlas_size as f32;
        [1.0 / size, 1.0 / size, size, size]
    }
}

/// Square viewport of one tile, in texels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileViewport {
    pub x: u32,
    pub y: u32,
    pub size: u32,
}
