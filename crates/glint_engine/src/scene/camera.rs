//! Camera state seen by the renderer

use crate::foundation::math::{self, Mat4, Vec3};

/// Snapshot of a camera's placement and projection
#[derive(Debug, Clone, PartialEq)]
pub struct CameraState {
    /// Eye position
    pub position: Vec3,
    /// Viewing direction
    pub direction: Vec3,
    /// Up vector
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Far clip distance
    pub render_distance: f32,
    /// Size of the target the camera renders to
    pub target_size: (u32, u32),
}

impl CameraState {
    /// Camera at `position` looking along `direction`, +Y up
    pub fn new(position: Vec3, direction: Vec3, fov_y: f32, render_distance: f32, target_size: (u32, u32)) -> Self {
        Self {
            position,
            direction,
            up: Vec3::y(),
            fov_y,
            render_distance,
            target_size,
        }
    }

    /// View matrix
    pub fn view_matrix(&self) -> Mat4 {
        math::look_at(&self.position, &self.direction, &self.up)
    }

    /// Perspective projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        let (width, height) = self.target_size;
        math::perspective(self.fov_y, width, height, self.render_distance)
    }
}

impl Default for CameraState {
    fn default() -> Self {
        Self::new(Vec3::zeros(), -Vec3::z(), 60f32.to_radians(), 100.0, (800, 600))
    }
}
