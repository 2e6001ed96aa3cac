//! Shadow atlas renderer
//!
//! Turns a frame's reserved slots into rendered atlas tiles and the rows the
//! shading stage samples them with. Each shadow type has its own square
//! atlas split into a 1x1, 2x2 or 4x4 grid; a type with nothing reserved
//! binds the shared 1x1 placeholder instead of allocating.
//!
//! Per tile the renderer computes view and projection, picks the grid cell,
//! bakes the tile offset into an atlas matrix, derives the normal bias from
//! the texel size and filter width, and issues one draw through the
//! [`ShadowBackend`].

use glam::{Mat4, Vec3};
use serde::{Serialize, Deserialize};

use crate::backend::{AtlasTexture, ShadowBackend, ShadowGlobals, ShadowKind, TileDraw, TileSource};
use crate::camera::ShadowCamera;
use crate::caster::VisibleCaster;
use crate::cascade::ShadowCascades;
use crate::config::{ShadowMaskMode, ShadowSettings};
use crate::data::{atlas_matrix, normal_bias_scale, CascadeRow, ShadowBufferKind, ShadowBuffers, ShadowTileRow};
use crate::error::ShadowResult;
use crate::fitter::ShadowVolumeFitter;
use crate::layout::TileLayout;
use crate::light::VisibleLight;
use crate::reservation::{ShadowFrame, POINT_LIGHT_FACES};

/// Closest near plane used for spot and point projections
const MIN_NEAR_PLANE: f32 = 0.01;

/// Cube face directions and up vectors (+X, -X, +Y, -Y, +Z, -Z)
const CUBE_FACES: [(Vec3, Vec3); POINT_LIGHT_FACES as usize] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// Counters for the last rendered frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowFrameStats {
    pub directional_lights: u32,
    pub spot_lights: u32,
    pub point_lights: u32,
    pub casters: u32,
    /// Lights that fell back to baked shadows during reservation
    pub fallbacks: u32,
    pub casters_refused: u32,
    pub tiles_rendered: u32,
    /// Tiles beyond the atlas grid, never drawn
    pub tiles_dropped: u32,
    /// Per-object tiles whose fitted volume saw nothing
    pub empty_caster_tiles: u32,
}

/// Renders every shadow atlas for a frame
#[derive(Debug)]
pub struct ShadowAtlasRenderer {
    settings: ShadowSettings,
    buffers: ShadowBuffers,
    stats: ShadowFrameStats,
}

impl ShadowAtlasRenderer {
    /// Create a renderer with validated settings
    pub fn new(settings: ShadowSettings) -> ShadowResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            buffers: ShadowBuffers::new(),
            stats: ShadowFrameStats::default(),
        })
    }

    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// Swap settings (hot-reload); the old settings stay on error
    pub fn set_settings(&mut self, settings: ShadowSettings) -> ShadowResult<()> {
        settings.validate()?;
        if settings != self.settings {
            log::debug!("Shadow settings updated");
        }
        self.settings = settings;
        Ok(())
    }

    /// Rows written by the last `render`
    pub fn buffers(&self) -> &ShadowBuffers {
        &self.buffers
    }

    pub fn stats(&self) -> &ShadowFrameStats {
        &self.stats
    }

    /// Render all atlases for a reserved frame
    ///
    /// `lights` and `casters` are the same visible lists the frame was
    /// reserved against. Returns the globals that were also handed to the
    /// backend.
    pub fn render(
        &mut self,
        frame: &ShadowFrame,
        lights: &[VisibleLight],
        casters: &[VisibleCaster],
        camera: &ShadowCamera,
        backend: &mut dyn ShadowBackend,
    ) -> ShadowGlobals {
        self.buffers.clear();

        let reservation = frame.stats();
        self.stats = ShadowFrameStats {
            directional_lights: frame.directional_lights().len() as u32,
            spot_lights: frame.spot_lights().len() as u32,
            point_lights: frame.point_lights().len() as u32,
            casters: frame.casters().len() as u32,
            fallbacks: reservation.fallbacks,
            casters_refused: reservation.casters_refused,
            ..Default::default()
        };

        self.render_directional(frame, lights, camera, backend);
        self.render_spot(frame, lights, backend);
        self.render_point(frame, lights, backend);
        self.render_per_object(frame, lights, casters, camera, backend);

        let globals = self.globals(frame);
        backend.set_globals(&globals);

        log::debug!(
            "Shadow atlases: {} tiles rendered, {} dropped, {} fallbacks",
            self.stats.tiles_rendered,
            self.stats.tiles_dropped,
            self.stats.fallbacks,
        );

        globals
    }

    /// Shader-visible state derived from settings and the reserved frame
    pub fn globals(&self, frame: &ShadowFrame) -> ShadowGlobals {
        let settings = &self.settings;
        let shadow_mask = if frame.use_shadow_mask() {
            match settings.shadow_mask_mode {
                ShadowMaskMode::Shadowmask => 0,
                ShadowMaskMode::DistanceShadowmask => 1,
            }
        } else {
            -1
        };
        let cascade_count = if frame.directional_lights().is_empty() {
            -1
        } else {
            frame.cascade_count() as i32
        };

        ShadowGlobals {
            directional_filter: settings.directional.filter.keyword_index(),
            other_filter: settings.spot.filter.keyword_index().max(settings.point.filter.keyword_index()),
            per_object_filter: settings.per_object.filter.keyword_index(),
            shadow_mask,
            cascade_count,
            cascade_blend: settings.directional.cascade_blend.keyword_index(),
            distance_fade: settings.distance_fade_vector(),
        }
    }

    fn render_directional(
        &mut self,
        frame: &ShadowFrame,
        lights: &[VisibleLight],
        camera: &ShadowCamera,
        backend: &mut dyn ShadowBackend,
    ) {
        let kind = ShadowKind::Directional;
        let tile_count = frame.directional_tile_count();
        if tile_count == 0 {
            backend.bind_atlas(kind, AtlasTexture::Default);
            return;
        }

        let settings = &self.settings;
        let atlas_size = settings.directional.atlas_size;
        let layout = TileLayout::new(atlas_size, tile_count);
        backend.bind_atlas(kind, AtlasTexture::Allocated { size: atlas_size });

        let cascade_count = frame.cascade_count();
        let cascades = ShadowCascades::with_count(settings, camera, cascade_count);
        let filter_size = settings.directional.filter.filter_size();
        let culling_factor = settings.directional.culling_factor();

        let mut cascades_written = false;
        for (slot, shadowed) in frame.directional_lights().iter().enumerate() {
            let Some(light) = lights.get(shadowed.visible_light_index) else {
                log::warn!("Directional shadow slot {} points at missing light {}", slot, shadowed.visible_light_index);
                self.buffers.directional_tiles.extend((0..cascade_count).map(|_| ShadowTileRow::default()));
                self.stats.tiles_dropped += cascade_count;
                continue;
            };

            let tile_offset = slot as u32 * cascade_count;
            for cascade in 0..cascade_count {
                let split = cascades.compute_split(
                    cascade as usize,
                    camera,
                    light.forward(),
                    layout.tile_size,
                    shadowed.near_plane_offset,
                );

                // Culling spheres are the same for every light
                if !cascades_written {
                    self.buffers
                        .cascades
                        .push(CascadeRow::new(split.center, split.radius, layout.tile_size, filter_size));
                }

                let tile = tile_offset + cascade;
                if !layout.contains(tile) {
                    log::warn!("{} tile {} exceeds the {}x{} atlas grid", kind.name(), tile, layout.split, layout.split);
                    self.buffers.directional_tiles.push(ShadowTileRow::default());
                    self.stats.tiles_dropped += 1;
                    continue;
                }

                let offset = layout.tile_offset(tile);
                let matrix = atlas_matrix(split.view_projection(), offset, layout.tile_scale(), settings.reversed_z);
                let bias = normal_bias_scale(shadowed.normal_bias, split.texel_size, filter_size);
                self.buffers
                    .directional_tiles
                    .push(ShadowTileRow::new(matrix, offset, layout.tile_scale(), atlas_size, bias));

                log::trace!("{} light {} cascade {} -> tile {}", kind.name(), shadowed.visible_light_index, cascade, tile);
                backend.draw_tile(&TileDraw {
                    kind,
                    tile_index: tile,
                    viewport: layout.viewport(tile),
                    view: split.view,
                    projection: split.projection,
                    slope_scale_bias: shadowed.slope_scale_bias,
                    source: TileSource::Light {
                        visible_light_index: shadowed.visible_light_index,
                        split_index: cascade,
                        culling_factor,
                    },
                });
                self.stats.tiles_rendered += 1;
            }
            cascades_written = true;
        }

        backend.upload_buffer(ShadowBufferKind::DirectionalTiles, self.buffers.bytes(ShadowBufferKind::DirectionalTiles));
        backend.upload_buffer(ShadowBufferKind::Cascades, self.buffers.bytes(ShadowBufferKind::Cascades));
        backend.set_atlas_size(kind, layout.atlas_size_vector());
    }

    fn render_spot(&mut self, frame: &ShadowFrame, lights: &[VisibleLight], backend: &mut dyn ShadowBackend) {
        let kind = ShadowKind::Spot;
        let tile_count = frame.spot_tile_count();
        if tile_count == 0 {
            backend.bind_atlas(kind, AtlasTexture::Default);
            return;
        }

        let settings = &self.settings;
        let atlas_size = settings.spot.atlas_size;
        let layout = TileLayout::new(atlas_size, tile_count);
        let filter_size = settings.spot.filter.filter_size();
        backend.bind_atlas(kind, AtlasTexture::Allocated { size: atlas_size });

        for (tile, shadowed) in frame.spot_lights().iter().enumerate() {
            let tile = tile as u32;
            let Some(light) = lights.get(shadowed.visible_light_index) else {
                log::warn!("Spot shadow slot {} points at missing light {}", tile, shadowed.visible_light_index);
                self.buffers.spot_tiles.push(ShadowTileRow::default());
                self.stats.tiles_dropped += 1;
                continue;
            };

            let near = shadowed.near_plane_offset.max(MIN_NEAR_PLANE);
            let view = light.world_matrix().inverse();
            let projection = Mat4::perspective_rh_gl(
                light.spot_angle.max(f32::EPSILON),
                1.0,
                near,
                light.range.max(near + MIN_NEAR_PLANE),
            );

            // Spot texels grow with the cone, undo the projection's scale
            let texel_size = 2.0 / (layout.tile_size as f32 * projection.x_axis.x);
            let bias = normal_bias_scale(shadowed.normal_bias, texel_size, filter_size);

            let offset = layout.tile_offset(tile);
            let matrix = atlas_matrix(projection * view, offset, layout.tile_scale(), settings.reversed_z);
            self.buffers
                .spot_tiles
                .push(ShadowTileRow::new(matrix, offset, layout.tile_scale(), atlas_size, bias));

            log::trace!("{} light {} -> tile {}", kind.name(), shadowed.visible_light_index, tile);
            backend.draw_tile(&TileDraw {
                kind,
                tile_index: tile,
                viewport: layout.viewport(tile),
                view,
                projection,
                slope_scale_bias: shadowed.slope_scale_bias,
                source: TileSource::Light {
                    visible_light_index: shadowed.visible_light_index,
                    split_index: 0,
                    culling_factor: 0.0,
                },
            });
            self.stats.tiles_rendered += 1;
        }

        backend.upload_buffer(ShadowBufferKind::SpotTiles, self.buffers.bytes(ShadowBufferKind::SpotTiles));
        backend.set_atlas_size(kind, layout.atlas_size_vector());
    }

    fn render_point(&mut self, frame: &ShadowFrame, lights: &[VisibleLight], backend: &mut dyn ShadowBackend) {
        let kind = ShadowKind::Point;
        let tile_count = frame.point_tile_count();
        if tile_count == 0 {
            backend.bind_atlas(kind, AtlasTexture::Default);
            return;
        }

        let settings = &self.settings;
        let atlas_size = settings.point.atlas_size;
        let layout = TileLayout::new(atlas_size, tile_count);
        let filter_size = settings.point.filter.filter_size();
        backend.bind_atlas(kind, AtlasTexture::Allocated { size: atlas_size });

        // Every face shares the tile size, so texel and bias are per light
        let texel_size = 2.0 / layout.tile_size as f32;

        for (slot, shadowed) in frame.point_lights().iter().enumerate() {
            let Some(light) = lights.get(shadowed.visible_light_index) else {
                log::warn!("Point shadow slot {} points at missing light {}", slot, shadowed.visible_light_index);
                self.buffers.point_tiles.extend(CUBE_FACES.iter().map(|_| ShadowTileRow::default()));
                self.stats.tiles_dropped += POINT_LIGHT_FACES;
                continue;
            };

            let bias = normal_bias_scale(shadowed.normal_bias, texel_size, filter_size);
            let fov = point_light_fov(bias, texel_size * filter_size);
            let near = shadowed.near_plane_offset.max(MIN_NEAR_PLANE);
            let projection = Mat4::perspective_rh_gl(fov, 1.0, near, light.range.max(near + MIN_NEAR_PLANE));

            for (face, (direction, up)) in CUBE_FACES.iter().enumerate() {
                let face = face as u32;
                let tile = slot as u32 * POINT_LIGHT_FACES + face;
                if !layout.contains(tile) {
                    log::warn!("{} tile {} exceeds the {}x{} atlas grid", kind.name(), tile, layout.split, layout.split);
                    self.buffers.point_tiles.push(ShadowTileRow::default());
                    self.stats.tiles_dropped += 1;
                    continue;
                }

                let view = flip_vertical(Mat4::look_to_rh(light.position, *direction, *up));
                let offset = layout.tile_offset(tile);
                let matrix = atlas_matrix(projection * view, offset, layout.tile_scale(), settings.reversed_z);
                self.buffers
                    .point_tiles
                    .push(ShadowTileRow::new(matrix, offset, layout.tile_scale(), atlas_size, bias));

                log::trace!("{} light {} face {} -> tile {}", kind.name(), shadowed.visible_light_index, face, tile);
                backend.draw_tile(&TileDraw {
                    kind,
                    tile_index: tile,
                    viewport: layout.viewport(tile),
                    view,
                    projection,
                    slope_scale_bias: shadowed.slope_scale_bias,
                    source: TileSource::Light {
                        visible_light_index: shadowed.visible_light_index,
                        split_index: face,
                        culling_factor: 0.0,
                    },
                });
                self.stats.tiles_rendered += 1;
            }
        }

        backend.upload_buffer(ShadowBufferKind::PointTiles, self.buffers.bytes(ShadowBufferKind::PointTiles));
        backend.set_atlas_size(kind, layout.atlas_size_vector());
    }

    fn render_per_object(
        &mut self,
        frame: &ShadowFrame,
        lights: &[VisibleLight],
        casters: &[VisibleCaster],
        camera: &ShadowCamera,
        backend: &mut dyn ShadowBackend,
    ) {
        let kind = ShadowKind::PerObject;
        let tile_count = frame.per_object_tile_count();
        if tile_count == 0 {
            backend.bind_atlas(kind, AtlasTexture::Default);
            return;
        }

        let settings = &self.settings;
        let atlas_size = settings.per_object.atlas_size;
        let layout = TileLayout::new(atlas_size, tile_count);
        let filter_size = settings.per_object.filter.filter_size();
        let directional = frame.directional_lights();
        backend.bind_atlas(kind, AtlasTexture::Allocated { size: atlas_size });

        for (slot, shadowed_caster) in frame.casters().iter().enumerate() {
            let caster = casters.get(shadowed_caster.visible_caster_index);

            for (light_slot, shadowed_light) in directional.iter().enumerate() {
                let tile = (slot * directional.len() + light_slot) as u32;
                if !layout.contains(tile) {
                    log::warn!("{} tile {} exceeds the {}x{} atlas grid", kind.name(), tile, layout.split, layout.split);
                    self.buffers.per_object_tiles.push(ShadowTileRow::default());
                    self.stats.tiles_dropped += 1;
                    continue;
                }

                let light = lights.get(shadowed_light.visible_light_index);
                let volume = match (caster, light) {
                    (Some(caster), Some(light)) => {
                        ShadowVolumeFitter::fit(&caster.bounds, caster.up, light.forward(), camera)
                    }
                    _ => {
                        log::warn!(
                            "Per-object tile {} references missing caster {} or light {}",
                            tile,
                            shadowed_caster.visible_caster_index,
                            shadowed_light.visible_light_index,
                        );
                        None
                    }
                };

                let Some(volume) = volume else {
                    log::debug!("Per-object tile {} has no visible receivers, skipped", tile);
                    self.buffers.per_object_tiles.push(ShadowTileRow::default());
                    self.stats.empty_caster_tiles += 1;
                    continue;
                };

                let texel_size = volume.texel_size(layout.tile_size);
                let bias = normal_bias_scale(shadowed_light.normal_bias, texel_size, filter_size);
                let offset = layout.tile_offset(tile);
                let matrix = atlas_matrix(volume.view_projection(), offset, layout.tile_scale(), settings.reversed_z);
                self.buffers
                    .per_object_tiles
                    .push(ShadowTileRow::new(matrix, offset, layout.tile_scale(), atlas_size, bias));

                log::trace!(
                    "{} caster {} light {} -> tile {}",
                    kind.name(),
                    shadowed_caster.visible_caster_index,
                    shadowed_light.visible_light_index,
                    tile,
                );
                backend.draw_tile(&TileDraw {
                    kind,
                    tile_index: tile,
                    viewport: layout.viewport(tile),
                    view: volume.view,
                    projection: volume.projection,
                    slope_scale_bias: shadowed_light.slope_scale_bias,
                    source: TileSource::Caster {
                        visible_caster_index: shadowed_caster.visible_caster_index,
                        visible_light_index: shadowed_light.visible_light_index,
                    },
                });
                self.stats.tiles_rendered += 1;
            }
        }

        backend.upload_buffer(ShadowBufferKind::PerObjectTiles, self.buffers.bytes(ShadowBufferKind::PerObjectTiles));
        backend.set_atlas_size(kind, layout.atlas_size_vector());
    }
}

/// Cube face field of view widened so filtering does not sample across seams
pub fn point_light_fov(bias: f32, filter_size: f32) -> f32 {
    let fov_bias = (1.0 + bias + filter_size).atan() * 2.0 - std::f32::consts::FRAC_PI_2;
    std::f32::consts::FRAC_PI_2 + fov_bias
}

/// Negate the view's vertical row
fn flip_vertical(view: Mat4) -> Mat4 {
    let rows = [view.row(0), -view.row(1), view.row(2), view.row(3)];
    Mat4::from_cols(rows[0], rows[1], rows[2], rows[3]).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ShadowCommandList;
    use crate::bounds::Aabb;
    use crate::config::{AtlasSettings, FilterMode};
    use crate::light::LightBaking;

    fn bounds() -> Aabb {
        Aabb::from_center_extents(Vec3::ZERO, Vec3::ONE)
    }

    fn camera() -> ShadowCamera {
        ShadowCamera::perspective(Vec3::new(0.0, 3.0, 10.0), Vec3::ZERO, 60f32.to_radians(), 1.0, 0.1, 100.0)
    }

    fn reserve(frame: &mut ShadowFrame, lights: &[VisibleLight]) {
        for (i, light) in lights.iter().enumerate() {
            frame.reserve_light_shadows(light, i, lights);
        }
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = ShadowSettings {
            spot: AtlasSettings::new(1000, FilterMode::Pcf2x2),
            ..Default::default()
        };
        assert!(ShadowAtlasRenderer::new(settings).is_err());

        let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default()).unwrap();
        let bad = ShadowSettings {
            max_distance: -1.0,
            ..Default::default()
        };
        assert!(renderer.set_settings(bad).is_err());
        assert_eq!(renderer.settings().max_distance, 100.0);
    }

    #[test]
    fn test_empty_frame_binds_default_atlases() {
        let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default()).unwrap();
        let frame = ShadowFrame::new(4);
        let mut backend = ShadowCommandList::new();

        let globals = renderer.render(&frame, &[], &[], &camera(), &mut backend);

        for kind in ShadowKind::ALL {
            assert_eq!(backend.atlas(kind), Some(AtlasTexture::Default));
        }
        assert_eq!(backend.draws().count(), 0);
        assert_eq!(globals.cascade_count, -1);
        assert_eq!(globals.shadow_mask, -1);
        assert_eq!(backend.globals(), Some(&globals));
    }

    #[test]
    fn test_directional_tiles_and_cascades() {
        let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default()).unwrap();
        let lights = vec![
            VisibleLight::directional(Vec3::new(0.2, -1.0, 0.1)).with_caster_bounds(bounds()),
            VisibleLight::directional(Vec3::new(-0.4, -1.0, 0.3)).with_caster_bounds(bounds()),
        ];
        let mut frame = ShadowFrame::new(4);
        reserve(&mut frame, &lights);
        let mut backend = ShadowCommandList::new();

        let globals = renderer.render(&frame, &lights, &[], &camera(), &mut backend);

        assert_eq!(globals.cascade_count, 4);
        assert_eq!(renderer.buffers().directional_tiles.len(), 8);
        // One culling row per cascade, from the first light only
        assert_eq!(renderer.buffers().cascades.len(), 4);
        assert_eq!(backend.draws_for(ShadowKind::Directional).count(), 8);
        assert_eq!(
            backend.uploaded(ShadowBufferKind::DirectionalTiles).map(|b| b.len()),
            Some(8 * ShadowTileRow::STRIDE)
        );
        assert_eq!(backend.atlas_size(ShadowKind::Directional), Some([1.0 / 1024.0, 1.0 / 1024.0, 1024.0, 1024.0]));

        let second_light_first_cascade = backend.draws_for(ShadowKind::Directional).nth(4).unwrap();
        assert_eq!(second_light_first_cascade.tile_index, 4);
        assert_eq!(second_light_first_cascade.viewport.size, 256);
        match second_light_first_cascade.source {
            TileSource::Light { visible_light_index, split_index, culling_factor } => {
                assert_eq!(visible_light_index, 1);
                assert_eq!(split_index, 0);
                assert!((culling_factor - 0.7).abs() < 1e-6);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_cascade_rows_from_first_resolved_light() {
        let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default()).unwrap();
        let light = VisibleLight::directional(Vec3::new(0.2, -1.0, 0.1));
        let always = |_: usize| Some(bounds());
        let mut frame = ShadowFrame::new(4);

        // Slot 0 refers to a light the render call never sees
        frame.reserve_light_shadows(&light, 7, &always);
        frame.reserve_light_shadows(&light, 0, &always);
        let mut backend = ShadowCommandList::new();

        renderer.render(&frame, &[light], &[], &camera(), &mut backend);

        let buffers = renderer.buffers();
        assert_eq!(buffers.directional_tiles.len(), 8);
        assert!(buffers.directional_tiles[..4].iter().all(|row| row.is_empty()));
        assert!(buffers.directional_tiles[4..].iter().all(|row| !row.is_empty()));
        assert_eq!(buffers.cascades.len(), 4);
        assert_eq!(renderer.stats().tiles_dropped, 4);
        assert_eq!(
            backend.uploaded(ShadowBufferKind::Cascades).map(|b| b.len()),
            Some(4 * CascadeRow::STRIDE)
        );
    }

    #[test]
    fn test_spot_bias_uses_projection_scale() {
        let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default()).unwrap();
        let lights = vec![VisibleLight::spot(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y, 20.0, 90f32.to_radians())
            .with_caster_bounds(bounds())];
        let mut frame = ShadowFrame::new(4);
        reserve(&mut frame, &lights);
        let mut backend = ShadowCommandList::new();

        renderer.render(&frame, &lights, &[], &camera(), &mut backend);

        // 90 degree cone: m00 = 1, so texel = 2 / 1024
        let row = renderer.buffers().spot_tiles[0];
        let expected = normal_bias_scale(lights[0].shadows.normal_bias, 2.0 / 1024.0, 1.0);
        assert!((row.tile_data[3] - expected).abs() < 1e-6);

        // Light position lands at the tile's depth origin side, center of the cone at uv center
        let target = row.matrix().project_point3(Vec3::new(0.0, 0.0, 0.0));
        assert!((target.x - 0.5).abs() < 1e-4 && (target.y - 0.5).abs() < 1e-4, "{:?}", target);
    }

    #[test]
    fn test_point_faces() {
        let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default()).unwrap();
        let lights = vec![VisibleLight::point(Vec3::new(1.0, 2.0, 3.0), 10.0).with_caster_bounds(bounds())];
        let mut frame = ShadowFrame::new(4);
        reserve(&mut frame, &lights);
        let mut backend = ShadowCommandList::new();

        renderer.render(&frame, &lights, &[], &camera(), &mut backend);

        let draws: Vec<_> = backend.draws_for(ShadowKind::Point).collect();
        assert_eq!(draws.len(), 6);
        assert_eq!(renderer.buffers().point_tiles.len(), 6);
        // Six tiles need the 4x4 grid
        assert_eq!(draws[5].viewport, crate::layout::TileViewport { x: 256, y: 256, size: 256 });

        // The +X face sees points along +X from the light, with a flipped vertical axis
        let vp = draws[0].projection * draws[0].view;
        let ahead = vp.project_point3(Vec3::new(5.0, 2.5, 3.0));
        assert!(ahead.x.abs() < 1.0 && ahead.y.abs() < 1.0);
        let unflipped = draws[0].projection * Mat4::look_to_rh(lights[0].position, Vec3::X, Vec3::NEG_Y);
        let reference = unflipped.project_point3(Vec3::new(5.0, 2.5, 3.0));
        assert!((ahead.y + reference.y).abs() < 1e-5);
    }

    #[test]
    fn test_point_fov_widens() {
        assert!((point_light_fov(0.0, 0.0) - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!(point_light_fov(0.01, 0.02) > std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn test_per_object_tiles() {
        let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default()).unwrap();
        let lights = vec![VisibleLight::directional(Vec3::new(0.3, -1.0, 0.2)).with_caster_bounds(bounds())];
        let casters = vec![
            VisibleCaster { id: caster_id(1), bounds: bounds(), up: Vec3::Y },
            VisibleCaster {
                id: caster_id(2),
                bounds: Aabb::from_center_extents(Vec3::new(2.0, 0.0, 0.0), Vec3::splat(0.5)),
                up: Vec3::Y,
            },
        ];
        let mut frame = ShadowFrame::new(2);
        reserve(&mut frame, &lights);
        for i in 0..casters.len() {
            frame.reserve_per_object_caster(i);
        }
        let mut backend = ShadowCommandList::new();

        renderer.render(&frame, &lights, &casters, &camera(), &mut backend);

        let draws: Vec<_> = backend.draws_for(ShadowKind::PerObject).collect();
        assert_eq!(draws.len(), 2);
        assert!(matches!(draws[1].source, TileSource::Caster { visible_caster_index: 1, visible_light_index: 0 }));
        assert_eq!(renderer.buffers().per_object_tiles.len(), 2);
        assert!(renderer.buffers().per_object_tiles.iter().all(|r| !r.is_empty()));
        assert_eq!(renderer.stats().tiles_rendered, 2 + 2);
    }

    #[test]
    fn test_per_object_without_visible_receivers_is_skipped() {
        let mut renderer = ShadowAtlasRenderer::new(ShadowSettings::default()).unwrap();
        let lights = vec![VisibleLight::directional(Vec3::NEG_Y).with_caster_bounds(bounds())];
        let casters = vec![VisibleCaster {
            id: caster_id(1),
            bounds: Aabb::from_center_extents(Vec3::new(5000.0, 0.0, 0.0), Vec3::ONE),
            up: Vec3::Y,
        }];
        let mut frame = ShadowFrame::new(1);
        reserve(&mut frame, &lights);
        frame.reserve_per_object_caster(0);
        let mut backend = ShadowCommandList::new();

        renderer.render(&frame, &lights, &casters, &camera(), &mut backend);

        assert_eq!(backend.draws_for(ShadowKind::PerObject).count(), 0);
        assert_eq!(renderer.buffers().per_object_tiles, vec![ShadowTileRow::default()]);
        assert_eq!(renderer.stats().empty_caster_tiles, 1);
    }

    #[test]
    fn test_globals() {
        let settings = ShadowSettings {
            shadow_mask_mode: ShadowMaskMode::DistanceShadowmask,
            spot: AtlasSettings::new(1024, FilterMode::Pcf3x3),
            point: AtlasSettings::new(1024, FilterMode::Pcf5x5),
            per_object: AtlasSettings::new(512, FilterMode::Pcf7x7),
            ..Default::default()
        };
        let renderer = ShadowAtlasRenderer::new(settings).unwrap();
        let lights = vec![VisibleLight::spot(Vec3::ZERO, Vec3::NEG_Y, 5.0, 1.0)
            .with_caster_bounds(bounds())
            .with_baking(LightBaking::shadowmask(0))];
        let mut frame = ShadowFrame::new(4);
        reserve(&mut frame, &lights);

        let globals = renderer.globals(&frame);
        assert_eq!(globals.directional_filter, -1);
        assert_eq!(globals.other_filter, 1);
        assert_eq!(globals.per_object_filter, 2);
        assert_eq!(globals.shadow_mask, 1);
        assert_eq!(globals.cascade_count, -1);
        assert_eq!(globals.cascade_blend, -1);
        assert!((globals.distance_fade[0] - 0.01).abs() < 1e-7);
    }

    fn caster_id(raw: u32) -> crate::caster::CasterId {
        crate::caster::CasterId::from_raw(raw)
    }

    #[test]
    fn test_flip_vertical() {
        let m = flip_vertical(Mat4::IDENTITY);
        assert_eq!(m.transform_point3(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, -2.0, 3.0));
    }
}
