//! Scene contents submitted each frame
//!
//! A [`Scene`] holds the placed entities and the lights. The frame loop calls
//! [`Scene::submit`] between `begin_frame` and `end_frame`.

mod renderable;

pub use renderable::RenderableEntity;

use crate::foundation::math::Vec3;
use crate::render::{DirectionalLight, PointLight, RenderResult, Renderer};

/// Entities and lights of one scene
#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Placed meshes
    pub entities: Vec<RenderableEntity>,
    /// Point lights with their positions
    pub point_lights: Vec<(PointLight, Vec3)>,
    /// Directional lights with the position they are seen from
    pub directional_lights: Vec<(DirectionalLight, Vec3)>,
}

impl Scene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity
    pub fn add_entity(&mut self, entity: RenderableEntity) {
        self.entities.push(entity);
    }

    /// Add a point light at `position`
    pub fn add_point_light(&mut self, light: PointLight, position: Vec3) {
        self.point_lights.push((light, position));
    }

    /// Add a directional light seen from `position`
    pub fn add_directional_light(&mut self, light: DirectionalLight, position: Vec3) {
        self.directional_lights.push((light, position));
    }

    /// Queue every light and visible entity into the renderer's current frame
    pub fn submit(&self, renderer: &mut Renderer) -> RenderResult<()> {
        for (light, position) in &self.point_lights {
            renderer.add_point_light(light, *position)?;
        }
        for (light, position) in &self.directional_lights {
            renderer.add_directional_light(light, *position)?;
        }
        for entity in &self.entities {
            entity.submit(renderer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererConfig;
    use crate::render::gpu::{BufferHandle, TextureHandle};
    use crate::render::material::{FlatColorData, Material, PipelineRegistry};
    use crate::render::mesh::{Mesh, SubMesh};
    use crate::render::{Camera, HeadlessDevice, RenderError};
    use std::sync::Arc;

    #[test]
    fn test_submit_skips_hidden_entities() {
        let device = Arc::new(HeadlessDevice::new());
        let mut registry = PipelineRegistry::new();
        registry.create_all(device.as_ref()).unwrap();
        let material = Material::flat_color(device.as_ref(), &registry, FlatColorData::default()).unwrap();
        let mut mesh = Mesh::new("quad");
        mesh.add_root(SubMesh::new("quad", BufferHandle(900), BufferHandle(901), material));
        let mesh = Arc::new(mesh);

        let mut scene = Scene::new();
        scene.add_entity(RenderableEntity::new(Arc::clone(&mesh)));
        scene.add_entity(RenderableEntity::new(Arc::clone(&mesh)).with_position(Vec3::new(1.0, 0.0, 0.0)));
        let mut hidden = RenderableEntity::new(mesh);
        hidden.visible = false;
        scene.add_entity(hidden);
        scene.add_point_light(PointLight::default(), Vec3::new(0.0, 2.0, 0.0));

        let mut renderer = Renderer::new(device, RendererConfig::default()).unwrap();
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 3.0), 45.0, 0.1, 10.0);
        renderer.begin_frame(&camera, (64, 64)).unwrap();
        scene.submit(&mut renderer).unwrap();

        assert_eq!(renderer.current_batches().unwrap().instance_count(), 2);
        assert_eq!(renderer.current_scene_data().unwrap().point_light_count, 1);
        let stats = renderer.end_frame(TextureHandle(77)).unwrap();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.vertex_buffer_binds, 1);
    }

    #[test]
    fn test_submit_outside_frame_fails() {
        let device = Arc::new(HeadlessDevice::new());
        let mut renderer = Renderer::new(device, RendererConfig::default()).unwrap();
        let mut scene = Scene::new();
        scene.add_directional_light(DirectionalLight::default(), Vec3::new(1.0, 1.0, 1.0));
        assert!(matches!(scene.submit(&mut renderer), Err(RenderError::NoFrameInProgress)));
    }
}
