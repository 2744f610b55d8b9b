//! Settings files
//!
//! Renderer and viewer settings, read from and written to TOML or RON. The format is
//! picked from the file extension.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

use crate::render::MAX_FRAMES_IN_FLIGHT;

/// On-disk settings formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.toml`
    Toml,
    /// `.ron`
    Ron,
}

impl ConfigFormat {
    /// Format for a `.toml` or `.ron` path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(self, text: &str) -> Result<T, ConfigError> {
        match self {
            Self::Toml => toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string())),
            Self::Ron => ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    fn encode<T: Serialize>(self, value: &T) -> Result<String, ConfigError> {
        let encoded = match self {
            Self::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            Self::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
                .map_err(|e| e.to_string()),
        };
        encoded.map_err(ConfigError::Serialize)
    }
}

/// A settings struct that can live in a file
///
/// Missing fields fall back to `Default` when the implementor uses `#[serde(default)]`.
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Parse settings text in the given format
    fn from_text(text: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        format.decode(text)
    }

    /// Read settings, choosing the format from the extension
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        log::debug!("Reading {:?} settings from {}", format, path.display());
        Self::from_text(&std::fs::read_to_string(path)?, format)
    }

    /// Write settings, choosing the format from the extension
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = ConfigFormat::from_path(path)?.encode(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Failures reading, writing or checking settings
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("cannot read settings: {0}")]
    Io(#[from] std::io::Error),

    /// Text did not match the settings schema
    #[error("malformed settings: {0}")]
    Parse(String),

    /// Settings could not be encoded
    #[error("cannot encode settings: {0}")]
    Serialize(String),

    /// Extension other than `.toml` or `.ron`
    #[error("unknown settings format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its allowed range
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// # Renderer Configuration
///
/// Frame pacing and camera projection settings for the draw-batch renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of ring-buffered frame records (frames that may be in flight at once)
    pub frames_in_flight: usize,
    /// Vertical field of view in degrees
    pub field_of_view_degrees: f32,
    /// Distance to near clipping plane
    pub near_plane: f32,
    /// Distance to far clipping plane
    pub far_plane: f32,
    /// Color the render target is cleared to every frame
    pub clear_color: [f32; 4],
    /// Initial ambient light color written into the scene data block
    pub ambient_light: [f32; 3],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            field_of_view_degrees: 45.0,
            near_plane: 0.1,
            far_plane: 10.0,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            ambient_light: [0.1, 0.1, 0.1],
        }
    }
}

impl RendererConfig {
    /// Set the number of frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(ConfigError::Invalid(format!(
                "frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if self.near_plane <= 0.0 || self.far_plane <= self.near_plane {
            return Err(ConfigError::Invalid(format!(
                "clip planes must satisfy 0 < near < far, got near={} far={}",
                self.near_plane, self.far_plane
            )));
        }
        if !(1.0..180.0).contains(&self.field_of_view_degrees) {
            return Err(ConfigError::Invalid(format!(
                "field_of_view_degrees out of range: {}",
                self.field_of_view_degrees
            )));
        }
        Ok(())
    }
}

impl Config for RendererConfig {}

/// # Viewer Configuration
///
/// Settings for the headless viewer binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Default `env_logger` filter
    pub log_level: String,
    /// Number of frames to render before exiting
    pub frame_count: u32,
    /// Render target size in pixels
    pub target_size: (u32, u32),
    /// Renderer settings
    pub renderer: RendererConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            frame_count: 6,
            target_size: (800, 600),
            renderer: RendererConfig::default(),
        }
    }
}

impl Config for ViewerConfig {}
