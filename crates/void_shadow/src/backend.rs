//! Shadow Backend Abstraction
//!
//! The atlas renderer never touches a graphics API. It drives a
//! [`ShadowBackend`], which binds atlases, draws tiles and uploads buffers on
//! whatever device the engine runs. [`ShadowCommandList`] records the same
//! calls for headless use and inspection.

use glam::Mat4;
use serde::{Serialize, Deserialize};

use crate::data::ShadowBufferKind;
use crate::layout::TileViewport;

/// Shadow atlas type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShadowKind {
    Directional,
    Spot,
    Point,
    PerObject,
}

impl ShadowKind {
    pub const ALL: [ShadowKind; 4] = [
        ShadowKind::Directional,
        ShadowKind::Spot,
        ShadowKind::Point,
        ShadowKind::PerObject,
    ];

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            ShadowKind::Directional => "Directional",
            ShadowKind::Spot => "Spot",
            ShadowKind::Point => "Point",
            ShadowKind::PerObject => "PerObject",
        }
    }

    /// Tile buffer holding this type's rows
    pub fn tile_buffer(self) -> ShadowBufferKind {
        match self {
            ShadowKind::Directional => ShadowBufferKind::DirectionalTiles,
            ShadowKind::Spot => ShadowBufferKind::SpotTiles,
            ShadowKind::Point => ShadowBufferKind::PointTiles,
            ShadowKind::PerObject => ShadowBufferKind::PerObjectTiles,
        }
    }
}

/// Texture bound as a type's shadow atlas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtlasTexture {
    /// Shared 1x1 placeholder, nothing was reserved
    Default,
    /// Square depth atlas of `size` texels
    Allocated { size: u32 },
}

impl AtlasTexture {
    /// Edge length in texels
    pub fn size(self) -> u32 {
        match self {
            AtlasTexture::Default => 1,
            AtlasTexture::Allocated { size } => size,
        }
    }
}

/// What a tile draw renders
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TileSource {
    /// Shadow casters seen by a light, for one split (cascade or cube face)
    Light {
        visible_light_index: usize,
        split_index: u32,
        /// Cascade culling-sphere shrink factor (0 for spot/point)
        culling_factor: f32,
    },
    /// One per-object caster's draw calls
    Caster {
        visible_caster_index: usize,
        visible_light_index: usize,
    },
}

/// One shadow map tile to render
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileDraw {
    pub kind: ShadowKind,
    pub tile_index: u32,
    pub viewport: TileViewport,
    pub view: Mat4,
    pub projection: Mat4,
    /// Global slope-scaled depth bias for the draw
    pub slope_scale_bias: f32,
    pub source: TileSource,
}

/// Shader-visible shadow state set once per frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowGlobals {
    /// Filter keyword for the directional atlas (-1 = default)
    pub directional_filter: i32,
    /// Filter keyword shared by spot and point atlases
    pub other_filter: i32,
    pub per_object_filter: i32,
    /// Shadow mask keyword: -1 none, 0 always, 1 distance
    pub shadow_mask: i32,
    /// Active cascades, -1 when no directional light was reserved
    pub cascade_count: i32,
    /// Cascade blend keyword (-1 = hard)
    pub cascade_blend: i32,
    /// `(1/maxDistance, 1/distanceFade, 1/(1-f²), 0)`
    pub distance_fade: [f32; 4],
}

impl Default for ShadowGlobals {
    fn default() -> Self {
        Self {
            directional_filter: -1,
            other_filter: -1,
            per_object_filter: -1,
            shadow_mask: -1,
            cascade_count: -1,
            cascade_blend: -1,
            distance_fade: [0.0; 4],
        }
    }
}

/// Device-side half of the shadow pass
pub trait ShadowBackend {
    /// Bind (and allocate if needed) a type's atlas as the render target
    fn bind_atlas(&mut self, kind: ShadowKind, atlas: AtlasTexture);

    /// Render one tile into the bound atlas
    fn draw_tile(&mut self, draw: &TileDraw);

    /// Upload a structured buffer
    fn upload_buffer(&mut self, buffer: ShadowBufferKind, bytes: &[u8]);

    /// Set a type's atlas size uniform `(1/size, 1/size, size, size)`
    fn set_atlas_size(&mut self, kind: ShadowKind, size: [f32; 4]);

    fn set_globals(&mut self, globals: &ShadowGlobals);
}

/// Recorded backend call
#[derive(Clone, Debug, PartialEq)]
pub enum ShadowCommand {
    BindAtlas {
        kind: ShadowKind,
        atlas: AtlasTexture,
    },
    DrawTile(TileDraw),
    UploadBuffer {
        buffer: ShadowBufferKind,
        bytes: Vec<u8>,
    },
    SetAtlasSize {
        kind: ShadowKind,
        size: [f32; 4],
    },
    SetGlobals(ShadowGlobals),
}

/// Backend that records every call in order
#[derive(Clone, Debug, Default)]
pub struct ShadowCommandList {
    commands: Vec<ShadowCommand>,
}

impl ShadowCommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[ShadowCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Tile draws in submission order
    pub fn draws(&self) -> impl Iterator<Item = &TileDraw> {
        self.commands.iter().filter_map(|c| match c {
            ShadowCommand::DrawTile(draw) => Some(draw),
            _ => None,
        })
    }

    /// Tile draws of one atlas
    pub fn draws_for(&self, kind: ShadowKind) -> impl Iterator<Item = &TileDraw> {
        self.draws().filter(move |d| d.kind == kind)
    }

    /// Last atlas bound for a type
    pub fn atlas(&self, kind: ShadowKind) -> Option<AtlasTexture> {
        self.commands.iter().rev().find_map(|c| match c {
            ShadowCommand::BindAtlas { kind: k, atlas } if *k == kind => Some(*atlas),
            _ => None,
        })
    }

    /// Last upload of a buffer
    pub fn uploaded(&self, buffer: ShadowBufferKind) -> Option<&[u8]> {
        self.commands.iter().rev().find_map(|c| match c {
            ShadowCommand::UploadBuffer { buffer: b, bytes } if *b == buffer => Some(bytes.as_slice()),
            _ => None,
        })
    }

    /// Last atlas size uniform set for a type
    pub fn atlas_size(&self, kind: ShadowKind) -> Option<[f32; 4]> {
        self.commands.iter().rev().find_map(|c| match c {
            ShadowCommand::SetAtlasSize { kind: k, size } if *k == kind => Some(*size),
            _ => None,
        })
    }

    /// Last globals set
    pub fn globals(&self) -> Option<&ShadowGlobals> {
        self.commands.iter().rev().find_map(|c| match c {
            ShadowCommand::SetGlobals(globals) => Some(globals),
            _ => None,
        })
    }
}

impl ShadowBackend for ShadowCommandList {
    fn bind_atlas(&mut self, kind: ShadowKind, atlas: AtlasTexture) {
        self.commands.push(ShadowCommand::BindAtlas { kind, atlas });
    }

    fn draw_tile(&mut self, draw: &TileDraw) {
        self.commands.push(ShadowCommand::DrawTile(*draw));
    }

    fn upload_buffer(&mut self, buffer: ShadowBufferKind, bytes: &[u8]) {
        self.commands.push(ShadowCommand::UploadBuffer {
            buffer,
            bytes: bytes.to_vec(),
        });
    }

    fn set_atlas_size(&mut self, kind: ShadowKind, size: [f32; 4]) {
        self.commands.push(ShadowCommand::SetAtlasSize { kind, size });
    }

    fn set_globals(&mut self, globals: &ShadowGlobals) {
        self.commands.push(ShadowCommand::SetGlobals(*globals));
    }
}
