//! GPU Shadow Data Structures
//!
//! Rows written into the per-type structured buffers. All structures are
//! bytemuck Pod/Zeroable so the CPU copies upload without conversion; row
//! strides and field order are what the shading stage reads.

use glam::{Mat4, Vec3, Vec4};
use serde::{Serialize, Deserialize};

/// `sqrt(2)`, widens filter sizes to the texel diagonal
const SQRT_2: f32 = std::f32::consts::SQRT_2;

/// Structured buffers produced by the atlas renderer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadowBufferKind {
    /// Directional tile rows, `lights * cascades`
    DirectionalTiles,
    /// One culling row per cascade
    Cascades,
    SpotTiles,
    /// Six rows per point light
    PointTiles,
    /// `casters * directional lights`
    PerObjectTiles,
}

/// Atlas transform plus tile data for one tile
///
/// `tile_data` is `(minU, minV, size, normalBias)`: the tile rectangle shrunk
/// by half a texel for sample clamping, and the scaled normal bias. A row of
/// zeros marks a tile that was not rendered.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowTileRow {
    /// World to atlas UV + depth, column-major
    pub atlas_matrix: [[f32; 4]; 4],
    pub tile_data: [f32; 4],
}

impl ShadowTileRow {
    /// Stride in bytes
    pub const STRIDE: usize = 16 * 4 + 4 * 4;

    pub fn new(atlas_matrix: Mat4, offset: (u32, u32), scale: f32, atlas_size: u32, normal_bias: f32) -> Self {
        let border = 0.5 / atlas_size.max(1) as f32;
        Self {
            atlas_matrix: atlas_matrix.to_cols_array_2d(),
            tile_data: [
                offset.0 as f32 * scale + border,
                offset.1 as f32 * scale + border,
                scale - border * 2.0,
                normal_bias,
            ],
        }
    }

    /// Tile was skipped this frame
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tile_data[2] <= 0.0
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.atlas_matrix)
    }
}

/// Per-cascade culling data for directional lights
///
/// `culling_sphere` is `(center, radius²)` with the radius shrunk by one
/// filter width; `data` is `(1/radius², filterSize * sqrt(2), 0, 0)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CascadeRow {
    pub culling_sphere: [f32; 4],
    pub data: [f32; 4],
}

impl CascadeRow {
    /// Stride in bytes
    pub const STRIDE: usize = 8 * 4;

    /// Build from a cascade culling sphere
    pub fn new(center: Vec3, radius: f32, tile_size: u32, filter_size: f32) -> Self {
        let texel_size = 2.0 * radius / tile_size.max(1) as f32;
        let filter = texel_size * filter_size;
        let shrunk = (radius - filter).max(f32::EPSILON);
        let radius_sq = shrunk * shrunk;

        Self {
            culling_sphere: [center.x, center.y, center.z, radius_sq],
            data: [1.0 / radius_sq, filter * SQRT_2, 0.0, 0.0],
        }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(self.culling_sphere[0], self.culling_sphere[1], self.culling_sphere[2])
    }
}

/// Normal bias in world units for a square tile
///
/// `texel_size` is the clip-space (or world-space) size of one texel;
/// the result is `normalBias * texel_size * filterSize * sqrt(2)`.
#[inline]
pub fn normal_bias_scale(normal_bias: f32, texel_size: f32, filter_size: f32) -> f32 {
    normal_bias * texel_size * filter_size * SQRT_2
}

/// World to atlas-tile transform
///
/// Remaps clip space `[-1, 1]` to the tile's UV rectangle and depth to
/// `[0, 1]`. With a reversed depth buffer the depth row is negated first.
pub fn atlas_matrix(view_projection: Mat4, offset: (u32, u32), scale: f32, reversed_z: bool) -> Mat4 {
    let mut r0 = view_projection.row(0);
    let mut r1 = view_projection.row(1);
    let mut r2 = view_projection.row(2);
    let r3 = view_projection.row(3);

    if reversed_z {
        r2 = -r2;
    }

    let (ox, oy) = (offset.0 as f32, offset.1 as f32);
    r0 = ((r0 + r3) * 0.5 + r3 * ox) * scale;
    r1 = ((r1 + r3) * 0.5 + r3 * oy) * scale;
    r2 = (r2 + r3) * 0.5;

    rows(r0, r1, r2, r3)
}

fn rows(r0: Vec4, r1: Vec4, r2: Vec4, r3: Vec4) -> Mat4 {
    Mat4::from_cols(r0, r1, r2, r3).transpose()
}

/// CPU copies of every shadow structured buffer
///
/// Kept by the renderer after each frame so callers can inspect what was
/// uploaded.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ShadowBuffers {
    pub directional_tiles: Vec<ShadowTileRow>,
    pub cascades: Vec<CascadeRow>,
    pub spot_tiles: Vec<ShadowTileRow>,
    pub point_tiles: Vec<ShadowTileRow>,
    pub per_object_tiles: Vec<ShadowTileRow>,
}

impl ShadowBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all rows, keeping allocations
    pub fn clear(&mut self) {
        self.directional_tiles.clear();
        self.cascades.clear();
        self.spot_tiles.clear();
        self.point_tiles.clear();
        self.per_object_tiles.clear();
    }

    /// Tile rows of one tile buffer (empty for `Cascades`)
    pub fn tiles(&self, kind: ShadowBufferKind) -> &[ShadowTileRow] {
        match kind {
            ShadowBufferKind::DirectionalTiles => &self.directional_tiles,
            ShadowBufferKind::SpotTiles => &self.spot_tiles,
            ShadowBufferKind::PointTiles => &self.point_tiles,
            ShadowBufferKind::PerObjectTiles => &self.per_object_tiles,
            ShadowBufferKind::Cascades => &[],
        }
    }

    /// Buffer contents as bytes for upload
    pub fn bytes(&self, kind: ShadowBufferKind) -> &[u8] {
        match kind {
            ShadowBufferKind::Cascades => bytemuck::cast_slice(&self.cascades),
            _ => bytemuck::cast_slice(self.tiles(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_strides() {
        assert_eq!(core::mem::size_of::<ShadowTileRow>(), ShadowTileRow::STRIDE);
        assert_eq!(core::mem::size_of::<ShadowTileRow>(), 80);
        assert_eq!(core::mem::size_of::<CascadeRow>(), CascadeRow::STRIDE);
        assert_eq!(core::mem::size_of::<CascadeRow>(), 32);
    }

    #[test]
    fn test_atlas_matrix_maps_clip_to_tile() {
        let m = atlas_matrix(Mat4::IDENTITY, (1, 0), 0.5, false);

        let lo = m.project_point3(Vec3::new(-1.0, -1.0, -1.0));
        let hi = m.project_point3(Vec3::new(1.0, 1.0, 1.0));

        assert!((lo - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
        assert!((hi - Vec3::new(1.0, 0.5, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_atlas_matrix_reversed_z() {
        let m = atlas_matrix(Mat4::IDENTITY, (0, 0), 1.0, true);
        let near = m.project_point3(Vec3::new(0.0, 0.0, -1.0));
        let far = m.project_point3(Vec3::new(0.0, 0.0, 1.0));

        assert!((near.z - 1.0).abs() < 1e-6);
        assert!(far.z.abs() < 1e-6);
        assert!((near.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tile_row_border() {
        let row = ShadowTileRow::new(Mat4::IDENTITY, (1, 1), 0.5, 1024, 0.25);
        let border = 0.5 / 1024.0;

        assert!((row.tile_data[0] - (0.5 + border)).abs() < 1e-7);
        assert!((row.tile_data[1] - (0.5 + border)).abs() < 1e-7);
        assert!((row.tile_data[2] - (0.5 - 2.0 * border)).abs() < 1e-7);
        assert_eq!(row.tile_data[3], 0.25);
        assert!(!row.is_empty());
        assert!(ShadowTileRow::default().is_empty());
        assert_eq!(row.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_cascade_row() {
        let row = CascadeRow::new(Vec3::new(1.0, 2.0, 3.0), 10.0, 1000, 2.0);
        // texel = 0.02, filter = 0.04
        let shrunk = 10.0f32 - 0.04;

        assert_eq!(row.center(), Vec3::new(1.0, 2.0, 3.0));
        assert!((row.culling_sphere[3] - shrunk * shrunk).abs() < 1e-3);
        assert!((row.data[0] - 1.0 / (shrunk * shrunk)).abs() < 1e-7);
        assert!((row.data[1] - 0.04 * SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_normal_bias_scale() {
        let texel = 2.0 / 512.0;
        let bias = normal_bias_scale(1.0, texel, 2.0);
        assert!((bias - texel * 2.0 * SQRT_2).abs() < 1e-7);
        assert_eq!(normal_bias_scale(0.0, texel, 2.0), 0.0);
    }

    #[test]
    fn test_buffer_bytes() {
        let mut buffers = ShadowBuffers::new();
        buffers.spot_tiles.push(ShadowTileRow::default());
        buffers.spot_tiles.push(ShadowTileRow::default());
        buffers.cascades.push(CascadeRow::default());

        assert_eq!(buffers.bytes(ShadowBufferKind::SpotTiles).len(), 160);
        assert_eq!(buffers.bytes(ShadowBufferKind::Cascades).len(), 32);
        assert!(buffers.bytes(ShadowBufferKind::PointTiles).is_empty());

        buffers.clear();
        assert!(buffers.bytes(ShadowBufferKind::SpotTiles).is_empty());
    }

    #[test]
    fn test_buffer_serialization() {
        let mut buffers = ShadowBuffers::new();
        buffers.per_object_tiles.push(ShadowTileRow::new(Mat4::IDENTITY, (0, 0), 1.0, 512, 0.1));

        let json = serde_json::to_string(&buffers).unwrap();
        let restored: ShadowBuffers = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.per_object_tiles, buffers.per_object_tiles);
    }
}
