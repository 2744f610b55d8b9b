//! Placed mesh instance
//!
//! A [`RenderableEntity`] pairs a shared [`Mesh`] with the position, rotation and
//! scale it is drawn at. Several entities may share one mesh; each submission adds
//! one more instance to the frame's batches.

use std::sync::Arc;

use crate::foundation::math::{Mat4, Transform, Vec3};
use crate::render::mesh::Mesh;
use crate::render::{RenderResult, Renderer};

/// A mesh placed in the world
#[derive(Debug, Clone)]
pub struct RenderableEntity {
    /// Shared geometry
    pub mesh: Arc<Mesh>,
    /// World position
    pub position: Vec3,
    /// XYZ euler angles in radians
    pub rotation: Vec3,
    /// Uniform scale
    pub scale: f32,
    /// Whether the entity is submitted at all
    pub visible: bool,
}

impl RenderableEntity {
    /// Entity at the origin, unrotated, unit scale
    pub fn new(mesh: Arc<Mesh>) -> Self {
        Self {
            mesh,
            position: Vec3::zeros(),
            rotation: Vec3::zeros(),
            scale: 1.0,
            visible: true,
        }
    }

    /// Set the position
    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Set the euler rotation (radians)
    #[must_use]
    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the uniform scale
    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Translate, rotate X then Y then Z, then scale
    pub fn model_matrix(&self) -> Mat4 {
        Transform::from_euler(self.position, self.rotation, self.scale).to_matrix()
    }

    /// Queue this entity into the renderer's current frame, unless hidden
    pub fn submit(&self, renderer: &mut Renderer) -> RenderResult<()> {
        if !self.visible {
            return Ok(());
        }
        renderer.render_mesh(&self.mesh, &self.model_matrix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_default_model_is_identity() {
        let entity = RenderableEntity::new(Arc::new(Mesh::new("empty")));
        assert_relative_eq!(entity.model_matrix(), Mat4::identity());
    }

    #[test]
    fn test_model_matrix_scales_rotates_then_translates() {
        let entity = RenderableEntity::new(Arc::new(Mesh::new("empty")))
            .with_position(Vec3::new(0.0, 0.0, -3.0))
            .with_rotation(Vec3::new(0.0, FRAC_PI_2, 0.0))
            .with_scale(2.0);

        // +X scaled to 2, rotated a quarter turn around Y onto -Z, then moved back 3
        let moved = entity.model_matrix() * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(moved, Vec4::new(0.0, 0.0, -5.0, 1.0), epsilon = 1e-5);
    }
}
