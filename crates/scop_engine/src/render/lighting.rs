//! Lighting system
//!
//! Lights are submitted per frame and packed into [`SceneData`], the uniform block
//! bound at set 2. The block has room for [`MAX_POINT_LIGHTS`] point lights and
//! [`MAX_DIRECTIONAL_LIGHTS`] directional lights; extra lights are dropped.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Vec3;

/// Point light slots in the scene data block
pub const MAX_POINT_LIGHTS: usize = 8;

/// Directional light slots in the scene data block
pub const MAX_DIRECTIONAL_LIGHTS: usize = 8;

/// Light emitting from a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// Light color
    pub color: Vec3,
    /// Distance attenuation factor
    pub attenuation: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec3::new(1.0, 1.0, 1.0),
            attenuation: 0.5,
        }
    }
}

impl PointLight {
    /// White light with default attenuation
    pub fn new(color: Vec3) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

/// Light arriving from a constant direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Light color
    pub color: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

/// Shader layout of one point light
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuPointLight {
    /// World position
    pub position: [f32; 3],
    /// Distance attenuation factor
    pub attenuation: f32,
    /// Color
    pub color: [f32; 3],
    _padding: f32,
}

/// Shader layout of one directional light
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuDirectionalLight {
    /// Position the light is seen from; the shader uses its direction to the origin
    pub position: [f32; 3],
    _padding0: f32,
    /// Color
    pub color: [f32; 3],
    _padding1: f32,
}

/// Per-frame lighting uniform block
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneData {
    /// World-space camera position
    pub camera_position: [f32; 3],
    _padding0: f32,
    /// Ambient light color
    pub ambient_light_color: [f32; 3],
    /// Number of valid entries in `directional_lights`
    pub directional_light_count: u32,
    /// Number of valid entries in `point_lights`
    pub point_light_count: u32,
    _padding1: [u32; 3],
    /// Directional lights
    pub directional_lights: [GpuDirectionalLight; MAX_DIRECTIONAL_LIGHTS],
    /// Point lights
    pub point_lights: [GpuPointLight; MAX_POINT_LIGHTS],
}

impl Default for SceneData {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl SceneData {
    /// Empty light lists
    pub fn new(camera_position: Vec3, ambient_light_color: Vec3) -> Self {
        Self {
            camera_position: camera_position.into(),
            ambient_light_color: ambient_light_color.into(),
            ..Self::default()
        }
    }

    /// Append a point light. Returns `false` when every slot is taken.
    pub fn push_point_light(&mut self, light: &PointLight, position: Vec3) -> bool {
        let index = self.point_light_count as usize;
        let Some(slot) = self.point_lights.get_mut(index) else {
            return false;
        };
        *slot = GpuPointLight {
            position: position.into(),
            attenuation: light.attenuation,
            color: light.color.into(),
            _padding: 0.0,
        };
        self.point_light_count += 1;
        true
    }

    /// Append a directional light. Returns `false` when every slot is taken.
    pub fn push_directional_light(&mut self, light: &DirectionalLight, position: Vec3) -> bool {
        let index = self.directional_light_count as usize;
        let Some(slot) = self.directional_lights.get_mut(index) else {
            return false;
        };
        *slot = GpuDirectionalLight {
            position: position.into(),
            color: light.color.into(),
            ..GpuDirectionalLight::default()
        };
        self.directional_light_count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_lights_capped() {
        let mut data = SceneData::default();
        let light = PointLight::new(Vec3::new(1.0, 0.0, 0.0));
        for i in 0..MAX_POINT_LIGHTS {
            assert!(data.push_point_light(&light, Vec3::new(i as f32, 0.0, 0.0)));
        }
        assert!(!data.push_point_light(&light, Vec3::zeros()));
        assert_eq!(data.point_light_count as usize, MAX_POINT_LIGHTS);
        assert_eq!(data.point_lights[7].position, [7.0, 0.0, 0.0]);
    }

    #[test]
    fn test_directional_and_point_counts_independent() {
        let mut data = SceneData::new(Vec3::new(0.0, 0.0, 3.0), Vec3::repeat(0.1));
        assert!(data.push_directional_light(&DirectionalLight::default(), Vec3::y()));
        assert_eq!(data.directional_light_count, 1);
        assert_eq!(data.point_light_count, 0);
        assert_eq!(data.camera_position, [0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_scene_data_is_std140_sized() {
        assert_eq!(std::mem::size_of::<SceneData>() % 16, 0);
    }
}
