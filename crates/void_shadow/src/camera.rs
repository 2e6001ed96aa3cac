//! Camera description consumed by the shadow system
//!
//! Only the pieces shadows need: a world transform, the projection shape and
//! clip planes. Frustum corners are produced for arbitrary near/far slices so
//! that cascades and the per-object fitter can share them.

use glam::{Mat4, Quat, Vec3};

use crate::bounds::Frustum;

/// Camera projection shape
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CameraProjection {
    /// Vertical field of view in radians
    Perspective { fov_y: f32 },
    /// Half of the vertical view size in world units
    Orthographic { half_height: f32 },
}

/// Camera state for one frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShadowCamera {
    pub position: Vec3,
    pub rotation: Quat,
    pub projection: CameraProjection,
    /// Width / height
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl ShadowCamera {
    /// Perspective camera looking from `eye` toward `target`
    pub fn perspective(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: eye,
            rotation: look_rotation(target - eye, Vec3::Y),
            projection: CameraProjection::Perspective { fov_y },
            aspect,
            near,
            far,
        }
    }

    /// Orthographic camera looking from `eye` toward `target`
    pub fn orthographic(eye: Vec3, target: Vec3, half_height: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: eye,
            rotation: look_rotation(target - eye, Vec3::Y),
            projection: CameraProjection::Orthographic { half_height },
            aspect,
            near,
            far,
        }
    }

    /// Forward direction (-Z in camera space)
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Camera-to-world transform
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// World-to-camera transform
    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            CameraProjection::Perspective { fov_y } => {
                Mat4::perspective_rh_gl(fov_y, self.aspect, self.near, self.far)
            }
            CameraProjection::Orthographic { half_height } => {
                let half_width = half_height * self.aspect;
                Mat4::orthographic_rh_gl(-half_width, half_width, -half_height, half_height, self.near, self.far)
            }
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection())
    }

    /// World-space corners of the view volume between two view distances
    ///
    /// Order: near (bl, br, tr, tl), then far (bl, br, tr, tl).
    pub fn frustum_corners(&self, near: f32, far: f32) -> [Vec3; 8] {
        let (near_half, far_half) = match self.projection {
            CameraProjection::Perspective { fov_y } => {
                let tan = (fov_y * 0.5).tan();
                (tan * near, tan * far)
            }
            CameraProjection::Orthographic { half_height } => (half_height, half_height),
        };

        let quad = |half_h: f32, dist: f32| {
            let half_w = half_h * self.aspect;
            [
                Vec3::new(-half_w, -half_h, -dist),
                Vec3::new(half_w, -half_h, -dist),
                Vec3::new(half_w, half_h, -dist),
                Vec3::new(-half_w, half_h, -dist),
            ]
        };

        let n = quad(near_half, near);
        let f = quad(far_half, far);
        let world = self.world_matrix();

        [n[0], n[1], n[2], n[3], f[0], f[1], f[2], f[3]].map(|c| world.transform_point3(c))
    }
}

/// Rotation whose -Z axis points along `forward`
pub(crate) fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let forward = forward.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let up = if forward.cross(up).length_squared() < 1e-8 {
        if forward.y.abs() > 0.9 { Vec3::Z } else { Vec3::Y }
    } else {
        up
    };
    Quat::from_mat4(&Mat4::look_to_rh(Vec3::ZERO, forward, up).inverse())
}
