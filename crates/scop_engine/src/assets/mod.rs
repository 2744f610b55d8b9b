//! Asset loading
//!
//! Text meshes, images, textures and imported scenes, turned into GPU resources.

pub mod image_loader;
pub mod mesh_loader;
pub mod obj_parser;
pub mod scene_import;
pub mod texture_resolver;

pub use image_loader::ImageData;
pub use mesh_loader::MeshLoader;
pub use obj_parser::{parse_obj, parse_obj_file, ParsedMesh};
pub use scene_import::{ImportedMesh, ImportedScene, MaterialDescriptor, SceneNode};
pub use texture_resolver::{EmbeddedTexture, TextureResolver, TextureSource};

use std::path::PathBuf;

use thiserror::Error;

use crate::render::{GpuError, RenderError};

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Asset loading errors. Each aborts only the load that raised it.
#[derive(Error, Debug)]
pub enum AssetError {
    /// Malformed text mesh or scene content
    #[error("Format error: {0}")]
    Format(String),

    /// Source file missing or unreadable
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Cube map faces do not all share one size
    #[error("Cube face {face} is {actual:?}, expected {expected:?}")]
    CubeFaceMismatch {
        /// Index of the offending face
        face: usize,
        /// Size of the first face
        expected: (u32, u32),
        /// Size of the offending face
        actual: (u32, u32),
    },

    /// Image payload cannot be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// GPU resource allocation failed
    #[error("Resource creation failed: {0}")]
    ResourceCreation(#[from] GpuError),

    /// Material construction failed for a reason other than allocation
    #[error("Material creation failed: {0}")]
    Material(RenderError),

    /// Scene description could not be parsed
    #[error("Scene description error: {0}")]
    Config(String),
}

impl AssetError {
    /// Whether this is an IO-class failure (unreadable source or inconsistent cube faces)
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::CubeFaceMismatch { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<RenderError> for AssetError {
    fn from(error: RenderError) -> Self {
        match error {
            RenderError::Gpu(gpu) => Self::ResourceCreation(gpu),
            other => Self::Material(other),
        }
    }
}
