//! # Rendering System
//!
//! Backend-agnostic frame production on top of the [`gpu`] boundary.
//!
//! ## Architecture
//!
//! - **gpu**: handles, descriptors and the device / command buffer traits
//! - **headless**: in-memory device used by tests and the viewer
//! - **material**: material variants and the pipeline registry
//! - **mesh**: vertex layout and the submesh tree
//! - **batch**: per-frame grouping of draws by pipeline, material and geometry
//! - **frame** / **renderer**: ring-buffered frame records and the frame loop

pub mod batch;
pub mod camera;
pub mod frame;
pub mod gpu;
pub mod headless;
pub mod lighting;
pub mod material;
pub mod mesh;
pub mod renderer;

pub use batch::{BatchStats, DrawBatches};
pub use camera::Camera;
pub use gpu::{GpuError, GraphicsDevice};
pub use headless::HeadlessDevice;
pub use lighting::{DirectionalLight, PointLight, SceneData, MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS};
pub use material::{Material, MaterialId, MaterialKind, PipelineRegistry};
pub use mesh::{Mesh, SubMesh, SubMeshKey, Vertex};
pub use renderer::Renderer;

use thiserror::Error;

use crate::config::ConfigError;

/// Upper bound on ring-buffered frame records
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised by the renderer and material construction
#[derive(Error, Debug)]
pub enum RenderError {
    /// The device failed
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// A material was built before its variant's pipeline
    #[error("Pipeline for {0:?} materials has not been created")]
    PipelineNotCreated(MaterialKind),

    /// A per-frame call was made outside `begin_frame` / `end_frame`
    #[error("No frame in progress")]
    NoFrameInProgress,

    /// Renderer configuration rejected
    #[error("Invalid renderer configuration: {0}")]
    Config(#[from] ConfigError),
}
