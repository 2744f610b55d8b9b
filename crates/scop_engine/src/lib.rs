//! # Scop Engine
//!
//! Asset-to-draw-call core of a small GPU renderer.
//!
//! ## Features
//!
//! - **Text Mesh Parsing**: OBJ positions, faces and normals, with smooth or flat
//!   normal reconstruction when the file has none
//! - **Scene Import**: node hierarchies flattened into submesh trees with composed
//!   transforms, materials resolved through a shared texture cache
//! - **Draw Batching**: per-frame grouping by pipeline, material and geometry with
//!   the minimum number of rebinds on replay
//! - **Frame Pacing**: a ring of frame records bounded by submission waits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scop_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = Arc::new(HeadlessDevice::new());
//!     let mut registry = PipelineRegistry::new();
//!     registry.create_all(device.as_ref())?;
//!
//!     let material = Material::flat_color(device.as_ref(), &registry, FlatColorData::default())?;
//!     let mut loader = MeshLoader::new(device.as_ref(), &registry);
//!     let mesh = Arc::new(loader.load_obj("teapot.obj", material)?);
//!
//!     let mut renderer = Renderer::new(device.clone(), RendererConfig::default())?;
//!     let camera = Camera::perspective(Vec3::new(0.0, 0.0, 3.0), 45.0, 0.1, 10.0);
//!     renderer.begin_frame(&camera, (800, 600))?;
//!     RenderableEntity::new(mesh).submit(&mut renderer)?;
//!     let stats = renderer.end_frame(TextureHandle(0))?;
//!     println!("{} draw calls", stats.draw_calls);
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{
            parse_obj, parse_obj_file, AssetError, ImportedScene, MeshLoader, ParsedMesh,
            TextureResolver, TextureSource,
        },
        config::{Config, ConfigError, RendererConfig, ViewerConfig},
        foundation::math::{Mat4, Transform, Vec3, Vec4},
        render::{
            gpu::TextureHandle,
            material::{FlatColorData, TexturedData},
            BatchStats, Camera, DirectionalLight, GraphicsDevice, HeadlessDevice, Material,
            MaterialKind, Mesh, PipelineRegistry, PointLight, RenderError, Renderer, SubMesh,
        },
        scene::{RenderableEntity, Scene},
    };
}
