//! Image decoding for texture uploads
//!
//! Every image is converted to tightly packed RGBA8 before upload.

use std::path::Path;

use super::{AssetError, AssetResult};

/// Decoded RGBA8 image ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data, row-major
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Read and decode an image file
    pub fn from_file(path: impl AsRef<Path>) -> AssetResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| AssetError::io(path, e))?;
        let image = Self::decode(&bytes, &path.display().to_string())?;
        log::debug!("Decoded {} ({}x{})", path.display(), image.width, image.height);
        Ok(image)
    }

    /// Decode a compressed image (PNG, JPEG) held in memory
    pub fn from_bytes(bytes: &[u8]) -> AssetResult<Self> {
        Self::decode(bytes, "in-memory image")
    }

    fn decode(bytes: &[u8], origin: &str) -> AssetResult<Self> {
        let rgba = image::load_from_memory(bytes)
            .map_err(|e| AssetError::Decode(format!("{origin}: {e}")))?
            .into_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Wrap already decoded RGBA8 texels, checking the byte count
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> AssetResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(AssetError::Decode(format!(
                "raw {width}x{height} RGBA image needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self { data, width, height })
    }

    /// 1x1 image of a float color, channels clamped to `[0, 1]`
    pub fn solid_color(color: [f32; 4]) -> Self {
        let data = color
            .iter()
            .map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        Self {
            data,
            width: 1,
            height: 1,
        }
    }

    /// Texel bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color([1.0, 0.0, 0.5, 1.0]);
        assert_eq!(img.dimensions(), (1, 1));
        assert_eq!(img.data, vec![255, 0, 128, 255]);
    }

    #[test]
    fn test_from_bytes_decodes_png() {
        let img = ImageData::from_bytes(&png_bytes(3, 2)).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.size_bytes(), 3 * 2 * 4);
        assert_eq!(&img.data[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = ImageData::from_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, AssetError::Decode(_)));
    }

    #[test]
    fn test_from_rgba_checks_length() {
        assert!(ImageData::from_rgba(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            ImageData::from_rgba(2, 2, vec![0; 15]),
            Err(AssetError::Decode(_))
        ));
    }
}
