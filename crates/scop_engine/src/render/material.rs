//! Material system
//!
//! A [`Material`] is one of three variants sharing a uniform capability: the handle of
//! its variant's pipeline, and a way to build a parameter block bound to its own
//! resources. Pipelines are created once per variant by the [`PipelineRegistry`],
//! which must run before any material is constructed and be torn down before the
//! device goes away.
//!
//! Materials are shared through `Arc` by every submesh and every frame that draws
//! them. Batching groups on [`MaterialId`], which is unique per material instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::gpu::{
    Binding, BindingType, BufferDescriptor, BufferHandle, BufferUsage, GraphicsDevice,
    ParameterBlock, ParameterBlockLayout, ParameterBlockPool, PipelineDescriptor, PipelineHandle,
    PixelFormat, SamplerHandle, StorageMode, TextureHandle,
};
use super::mesh::Vertex;
use super::{RenderError, RenderResult};
use crate::foundation::math::{Vec3, Vec4};

/// Set 0: view-projection matrix
pub const VIEW_PROJECTION_LAYOUT: ParameterBlockLayout = &[BindingType::UniformBuffer];

/// Set 1: unused, the model matrix travels as a push constant
pub const MODEL_LAYOUT: ParameterBlockLayout = &[];

/// Set 2: scene lighting data
pub const SCENE_DATA_LAYOUT: ParameterBlockLayout = &[BindingType::UniformBuffer];

/// Set 3 for flat color materials
pub const FLAT_COLOR_LAYOUT: ParameterBlockLayout = &[BindingType::UniformBuffer];

/// Set 3 for cube-textured materials
pub const TEXTURED_CUBE_LAYOUT: ParameterBlockLayout =
    &[BindingType::SampledTexture, BindingType::Sampler];

/// Set 3 for textured materials: data, diffuse, emissive, normal, sampler
pub const TEXTURED_LAYOUT: ParameterBlockLayout = &[
    BindingType::UniformBuffer,
    BindingType::SampledTexture,
    BindingType::SampledTexture,
    BindingType::SampledTexture,
    BindingType::Sampler,
];

/// Material variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MaterialKind {
    /// Lit single color
    FlatColor,
    /// Cube-map sampled by object-space position
    TexturedCube,
    /// Lit diffuse/emissive/normal textured
    Textured,
}

impl MaterialKind {
    /// Every variant, in registry order
    pub const ALL: [Self; 3] = [Self::FlatColor, Self::TexturedCube, Self::Textured];

    const fn index(self) -> usize {
        match self {
            Self::FlatColor => 0,
            Self::TexturedCube => 1,
            Self::Textured => 2,
        }
    }

    /// Parameter block layout bound at set 3
    pub const fn layout(self) -> ParameterBlockLayout {
        match self {
            Self::FlatColor => FLAT_COLOR_LAYOUT,
            Self::TexturedCube => TEXTURED_CUBE_LAYOUT,
            Self::Textured => TEXTURED_LAYOUT,
        }
    }

    fn pipeline_descriptor(self) -> PipelineDescriptor {
        let (label, vertex_attributes) = match self {
            Self::FlatColor => ("flat_color", vec![Vertex::POSITION_OFFSET, Vertex::NORMAL_OFFSET]),
            Self::TexturedCube => ("textured_cube", vec![Vertex::POSITION_OFFSET]),
            Self::Textured => (
                "textured",
                vec![
                    Vertex::POSITION_OFFSET,
                    Vertex::TEX_COORD_OFFSET,
                    Vertex::NORMAL_OFFSET,
                    Vertex::TANGENT_OFFSET,
                ],
            ),
        };
        PipelineDescriptor {
            label,
            vertex_attributes,
            vertex_stride: std::mem::size_of::<Vertex>(),
            parameter_block_layouts: vec![
                VIEW_PROJECTION_LAYOUT,
                MODEL_LAYOUT,
                SCENE_DATA_LAYOUT,
                self.layout(),
            ],
            color_format: PixelFormat::Bgra8Unorm,
            depth_format: PixelFormat::Depth32Float,
        }
    }
}

/// One pipeline per material variant, created and destroyed explicitly
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: [Option<PipelineHandle>; 3],
}

impl PipelineRegistry {
    /// Registry with no pipelines created yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every variant's pipeline. Variants already created are left alone.
    pub fn create_all(&mut self, device: &dyn GraphicsDevice) -> RenderResult<()> {
        for kind in MaterialKind::ALL {
            let slot = &mut self.pipelines[kind.index()];
            if slot.is_some() {
                continue;
            }
            let handle = device.new_pipeline(&kind.pipeline_descriptor())?;
            log::debug!("Created {:?} pipeline {:?}", kind, handle);
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Release every pipeline. Materials built earlier keep stale handles.
    pub fn destroy_all(&mut self, device: &dyn GraphicsDevice) {
        for slot in &mut self.pipelines {
            if let Some(handle) = slot.take() {
                device.destroy_pipeline(handle);
            }
        }
    }

    /// Pipeline of a variant, if created
    pub fn pipeline(&self, kind: MaterialKind) -> RenderResult<PipelineHandle> {
        self.pipelines[kind.index()].ok_or(RenderError::PipelineNotCreated(kind))
    }

    /// Whether every variant has a pipeline
    pub fn is_complete(&self) -> bool {
        self.pipelines.iter().all(Option::is_some)
    }
}

/// Unique identity of a material instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(pub u64);

impl MaterialId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Uniform data of a flat color material
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FlatColorData {
    /// RGBA diffuse color
    pub diffuse_color: [f32; 4],
    /// Specular color
    pub specular_color: [f32; 3],
    /// Specular exponent
    pub shininess: f32,
}

impl Default for FlatColorData {
    fn default() -> Self {
        Self {
            diffuse_color: [1.0, 1.0, 1.0, 1.0],
            specular_color: [0.5, 0.5, 0.5],
            shininess: 32.0,
        }
    }
}

/// Uniform data of a textured material
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TexturedData {
    /// RGBA tint multiplied with the diffuse texture
    pub diffuse_color: [f32; 4],
    /// Specular color
    pub specular_color: [f32; 3],
    /// Specular exponent
    pub shininess: f32,
    /// Tint multiplied with the emissive texture
    pub emissive_color: [f32; 3],
    _padding: f32,
}

impl Default for TexturedData {
    fn default() -> Self {
        Self {
            diffuse_color: [1.0, 1.0, 1.0, 1.0],
            specular_color: [0.5, 0.5, 0.5],
            shininess: 32.0,
            emissive_color: [0.0, 0.0, 0.0],
            _padding: 0.0,
        }
    }
}

impl TexturedData {
    /// Build from colors and shininess
    pub fn new(diffuse: Vec4, specular: Vec3, emissive: Vec3, shininess: f32) -> Self {
        Self {
            diffuse_color: diffuse.into(),
            specular_color: specular.into(),
            shininess,
            emissive_color: emissive.into(),
            _padding: 0.0,
        }
    }
}

/// Textures bound by a textured material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexturedMaps {
    /// Diffuse map
    pub diffuse: TextureHandle,
    /// Emissive map
    pub emissive: TextureHandle,
    /// Tangent-space normal map
    pub normal: TextureHandle,
    /// Sampler for all three maps
    pub sampler: SamplerHandle,
}

/// Per-variant GPU resources of a material
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialParams {
    /// Uniform buffer holding [`FlatColorData`]
    FlatColor {
        /// Uniform buffer
        data_buffer: BufferHandle,
        /// Values written into the buffer
        data: FlatColorData,
    },
    /// Cube texture and its sampler
    TexturedCube {
        /// Cube texture
        texture: TextureHandle,
        /// Sampler
        sampler: SamplerHandle,
    },
    /// Uniform buffer holding [`TexturedData`] plus the texture maps
    Textured {
        /// Uniform buffer
        data_buffer: BufferHandle,
        /// Values written into the buffer
        data: TexturedData,
        /// Bound maps
        maps: TexturedMaps,
    },
}

/// A shareable material instance
#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    pipeline: PipelineHandle,
    params: MaterialParams,
}

impl Material {
    /// Flat color material. Allocates and fills its uniform buffer.
    pub fn flat_color(
        device: &dyn GraphicsDevice,
        registry: &PipelineRegistry,
        data: FlatColorData,
    ) -> RenderResult<Arc<Self>> {
        let pipeline = registry.pipeline(MaterialKind::FlatColor)?;
        let data_buffer = uniform_buffer(device, bytemuck::bytes_of(&data))?;
        Ok(Arc::new(Self {
            id: MaterialId::next(),
            pipeline,
            params: MaterialParams::FlatColor { data_buffer, data },
        }))
    }

    /// Cube-textured material over an already uploaded cube texture
    pub fn textured_cube(
        registry: &PipelineRegistry,
        texture: TextureHandle,
        sampler: SamplerHandle,
    ) -> RenderResult<Arc<Self>> {
        let pipeline = registry.pipeline(MaterialKind::TexturedCube)?;
        Ok(Arc::new(Self {
            id: MaterialId::next(),
            pipeline,
            params: MaterialParams::TexturedCube { texture, sampler },
        }))
    }

    /// Textured material. Allocates and fills its uniform buffer.
    pub fn textured(
        device: &dyn GraphicsDevice,
        registry: &PipelineRegistry,
        data: TexturedData,
        maps: TexturedMaps,
    ) -> RenderResult<Arc<Self>> {
        let pipeline = registry.pipeline(MaterialKind::Textured)?;
        let data_buffer = uniform_buffer(device, bytemuck::bytes_of(&data))?;
        Ok(Arc::new(Self {
            id: MaterialId::next(),
            pipeline,
            params: MaterialParams::Textured {
                data_buffer,
                data,
                maps,
            },
        }))
    }

    /// Instance identity
    pub fn id(&self) -> MaterialId {
        self.id
    }

    /// Variant tag
    pub fn kind(&self) -> MaterialKind {
        match self.params {
            MaterialParams::FlatColor { .. } => MaterialKind::FlatColor,
            MaterialParams::TexturedCube { .. } => MaterialKind::TexturedCube,
            MaterialParams::Textured { .. } => MaterialKind::Textured,
        }
    }

    /// Pipeline shared by every material of this variant
    pub fn pipeline(&self) -> PipelineHandle {
        self.pipeline
    }

    /// Variant resources
    pub fn params(&self) -> &MaterialParams {
        &self.params
    }

    /// Allocate a parameter block from `pool` bound to this material's resources
    pub fn make_parameter_block(&self, pool: &mut ParameterBlockPool) -> ParameterBlock {
        let mut block = pool.get(self.kind().layout());
        match &self.params {
            MaterialParams::FlatColor { data_buffer, .. } => {
                block.set_binding(0, Binding::Buffer(*data_buffer));
            }
            MaterialParams::TexturedCube { texture, sampler } => {
                block.set_binding(0, Binding::Texture(*texture));
                block.set_binding(1, Binding::Sampler(*sampler));
            }
            MaterialParams::Textured {
                data_buffer, maps, ..
            } => {
                block.set_binding(0, Binding::Buffer(*data_buffer));
                block.set_binding(1, Binding::Texture(maps.diffuse));
                block.set_binding(2, Binding::Texture(maps.emissive));
                block.set_binding(3, Binding::Texture(maps.normal));
                block.set_binding(4, Binding::Sampler(maps.sampler));
            }
        }
        block
    }
}

fn uniform_buffer(device: &dyn GraphicsDevice, bytes: &[u8]) -> RenderResult<BufferHandle> {
    let buffer = device.new_buffer(&BufferDescriptor {
        size: bytes.len(),
        usage: BufferUsage::UNIFORM,
        storage: StorageMode::HostVisible,
    })?;
    device.write_buffer(buffer, 0, bytes)?;
    Ok(buffer)
}
