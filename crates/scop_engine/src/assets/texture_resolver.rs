//! Texture resolution and upload
//!
//! [`TextureResolver`] turns texture references from material descriptors into GPU
//! textures. References are cached by [`TextureSource`], so repeated references within
//! an import share one texture and a file never aliases an embedded image. Solid-color
//! fallback textures are cached by exact color. A failed load leaves no cache entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::image_loader::ImageData;
use super::{AssetError, AssetResult};
use crate::render::gpu::{
    BufferDescriptor, BufferUsage, GraphicsDevice, PixelFormat, SamplerDescriptor, SamplerHandle,
    StorageMode, TextureDescriptor, TextureHandle, TextureKind, TextureUsage,
};

/// Where a texture's texels come from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// Image file on disk
    Path(PathBuf),
    /// Index into the scene's embedded texture table
    Embedded(usize),
}

impl TextureSource {
    /// Interpret a material texture reference. `*N` names embedded texture `N`;
    /// anything else is a path relative to `base_dir`.
    pub fn from_reference(reference: &str, base_dir: &Path) -> Self {
        reference
            .strip_prefix('*')
            .and_then(|index| index.parse().ok())
            .map_or_else(|| Self::Path(base_dir.join(reference)), Self::Embedded)
    }
}

/// Image stored inside a scene file
///
/// A non-zero `height` means `data` holds `width * height` raw RGBA8 texels.
/// A zero `height` means `data` is a compressed image file of `width` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedTexture {
    /// Width in texels, or payload length when compressed
    pub width: u32,
    /// Height in texels, zero when compressed
    pub height: u32,
    /// Texels or compressed payload
    pub data: Vec<u8>,
}

impl EmbeddedTexture {
    /// Decode to RGBA8
    pub fn decode(&self) -> AssetResult<ImageData> {
        if self.height == 0 {
            ImageData::from_bytes(&self.data)
        } else {
            ImageData::from_rgba(self.width, self.height, self.data.clone())
        }
    }
}

/// Path-keyed texture cache plus solid-color fallbacks
#[derive(Debug, Default)]
pub struct TextureResolver {
    cache: HashMap<TextureSource, TextureHandle>,
    solid_colors: Vec<([f32; 4], TextureHandle)>,
    sampler: Option<SamplerHandle>,
}

impl TextureResolver {
    /// Empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Texture for `source`, loading and uploading it on first use
    pub fn resolve_texture(
        &mut self,
        device: &dyn GraphicsDevice,
        source: &TextureSource,
        embedded: &[EmbeddedTexture],
    ) -> AssetResult<TextureHandle> {
        if let Some(&texture) = self.cache.get(source) {
            log::debug!("Texture cache hit for {:?}", source);
            return Ok(texture);
        }

        let image = match source {
            TextureSource::Path(path) => ImageData::from_file(path)?,
            TextureSource::Embedded(index) => embedded
                .get(*index)
                .ok_or_else(|| AssetError::Format(format!("embedded texture {index} does not exist")))?
                .decode()?,
        };
        let texture = upload_texture(device, TextureKind::Texture2d, &[&image])?;

        log::debug!("Texture cache miss for {:?}, uploaded as {:?}", source, texture);
        self.cache.insert(source.clone(), texture);
        Ok(texture)
    }

    /// 1x1 texture of `color`, shared by every request for the same exact color
    pub fn solid_color_texture(&mut self, device: &dyn GraphicsDevice, color: [f32; 4]) -> AssetResult<TextureHandle> {
        if let Some((_, texture)) = self.solid_colors.iter().find(|(cached, _)| *cached == color) {
            return Ok(*texture);
        }
        let texture = upload_texture(device, TextureKind::Texture2d, &[&ImageData::solid_color(color)])?;
        log::debug!("Created solid color texture {:?} for {:?}", texture, color);
        self.solid_colors.push((color, texture));
        Ok(texture)
    }

    /// Cube texture from six face images in +X, -X, +Y, -Y, +Z, -Z order.
    ///
    /// A path listed more than once is decoded once. Every face must have the size of
    /// the first.
    pub fn load_cube_texture(&mut self, device: &dyn GraphicsDevice, faces: [&Path; 6]) -> AssetResult<TextureHandle> {
        let mut decoded: HashMap<&Path, ImageData> = HashMap::new();
        let mut expected = None;

        for (face, &path) in faces.iter().enumerate() {
            if !decoded.contains_key(path) {
                decoded.insert(path, ImageData::from_file(path)?);
            }
            let size = decoded[path].dimensions();
            match expected {
                None => expected = Some(size),
                Some(expected) if expected != size => {
                    return Err(AssetError::CubeFaceMismatch {
                        face,
                        expected,
                        actual: size,
                    });
                }
                Some(_) => {}
            }
        }

        let layers: Vec<&ImageData> = faces.iter().map(|&path| &decoded[path]).collect();
        let texture = upload_texture(device, TextureKind::Cube, &layers)?;
        log::info!("Loaded cube texture {:?} from {:?}", texture, faces[0].parent());
        Ok(texture)
    }

    /// Linear sampler shared by every material built through this resolver
    pub fn sampler(&mut self, device: &dyn GraphicsDevice) -> AssetResult<SamplerHandle> {
        if let Some(sampler) = self.sampler {
            return Ok(sampler);
        }
        let sampler = device.new_sampler(&SamplerDescriptor::default())?;
        self.sampler = Some(sampler);
        Ok(sampler)
    }

    /// Number of cached path and embedded textures
    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Number of cached solid-color textures
    pub fn solid_color_count(&self) -> usize {
        self.solid_colors.len()
    }
}

/// Upload equally sized RGBA8 layers into a new texture through a staging buffer,
/// waiting for the copy to complete.
pub fn upload_texture(
    device: &dyn GraphicsDevice,
    kind: TextureKind,
    layers: &[&ImageData],
) -> AssetResult<TextureHandle> {
    let (width, height) = layers
        .first()
        .map(|image| image.dimensions())
        .ok_or_else(|| AssetError::Decode("texture without image data".to_string()))?;
    let layer_size = width as usize * height as usize * PixelFormat::Rgba8Unorm.bytes_per_pixel();

    let staging = device.new_buffer(&BufferDescriptor {
        size: layer_size * layers.len(),
        usage: BufferUsage::COPY_SOURCE,
        storage: StorageMode::HostVisible,
    })?;
    for (layer, image) in layers.iter().enumerate() {
        device.write_buffer(staging, layer * layer_size, &image.data)?;
    }

    let texture = device.new_texture(&TextureDescriptor {
        kind,
        width,
        height,
        format: PixelFormat::Rgba8Unorm,
        usage: TextureUsage::COPY_DESTINATION | TextureUsage::SHADER_READ,
    })?;

    let mut commands = device.new_command_buffer();
    commands.begin_transfer_pass();
    for layer in 0..layers.len() {
        commands.copy_buffer_to_texture(staging, layer * layer_size, texture, layer as u32);
    }
    commands.end_transfer_pass();
    let token = device.submit(commands)?;
    device.wait(token)?;

    Ok(texture)
}
