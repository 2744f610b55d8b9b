//! # Perspective Camera
//!
//! Produces the view and projection matrices written into the per-frame
//! view-projection block. The aspect ratio is not stored: the renderer derives it
//! from the render-target extent each frame.

use crate::config::RendererConfig;
use crate::foundation::math::{utils, Mat4, Vec3};

/// Perspective camera looking at a target point
///
/// Right-handed, Y-up view space; the projection maps depth to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,
}

impl Camera {
    /// Create a perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov: utils::deg_to_rad(fov_degrees),
            near,
            far,
        }
    }

    /// Camera using the projection settings of a renderer configuration
    pub fn from_config(config: &RendererConfig, position: Vec3) -> Self {
        Self::perspective(
            position,
            config.field_of_view_degrees,
            config.near_plane,
            config.far_plane,
        )
    }

    /// Point the camera at `target`
    #[must_use]
    pub fn looking_at(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    /// World to view space
    pub fn view_matrix(&self) -> Mat4 {
        utils::look_at(self.position, self.target, self.up)
    }

    /// View to clip space for a viewport of the given aspect ratio (width / height)
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        utils::perspective(self.fov, aspect, self.near, self.far)
    }

    /// `projection * view`
    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}
