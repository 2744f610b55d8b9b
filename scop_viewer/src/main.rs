//! Headless scop viewer
//!
//! Loads an OBJ mesh, a RON scene or the built-in cube, then renders a fixed number
//! of frames of it spinning against the in-memory device and logs what each frame
//! issued.
//!
//! Run with `--help` for the arguments.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use scop_engine::assets::AssetError;
use scop_engine::config::{Config, ConfigError, ViewerConfig};
use scop_engine::foundation::math::utils::deg_to_rad;
use scop_engine::prelude::*;
use scop_engine::render::gpu::{PixelFormat, TextureDescriptor, TextureKind, TextureUsage};
use scop_engine::render::GpuError;
use thiserror::Error;

/// Degrees the model turns per frame
const SPIN_PER_FRAME: f32 = 15.0;

#[derive(Error, Debug)]
enum ViewerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("asset: {0}")]
    Asset(#[from] AssetError),

    #[error("render: {0}")]
    Render(#[from] RenderError),

    #[error("device: {0}")]
    Gpu(#[from] GpuError),
}

/// What to put on screen
#[derive(Debug, Clone, PartialEq)]
enum Source {
    Cube,
    Obj(PathBuf),
    Scene(PathBuf),
}

impl FromStr for Source {
    type Err = String;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        if arg == "cube" {
            return Ok(Self::Cube);
        }
        let path = PathBuf::from(arg);
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("obj") => Ok(Self::Obj(path)),
            Some("ron") => Ok(Self::Scene(path)),
            _ => Err(format!("expected `cube`, a .obj mesh or a .ron scene, got `{arg}`")),
        }
    }
}

/// Render a mesh or scene on the headless device and log per-frame draw statistics
#[derive(Parser, Debug)]
#[command(name = "scop_viewer", version)]
struct Cli {
    /// `cube`, an OBJ mesh or a RON scene
    #[arg(value_name = "SOURCE", default_value = "cube")]
    source: Source,

    /// Viewer settings file (.toml or .ron)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn load_mesh(loader: &mut MeshLoader<'_>, material: Arc<Material>, source: &Source) -> Result<Mesh, AssetError> {
    match source {
        Source::Cube => loader.builtin_cube(material),
        Source::Obj(path) => loader.load_obj(path, material),
        Source::Scene(path) => loader.load_scene_file(path),
    }
}

fn run(args: &Cli, config: &ViewerConfig) -> Result<(), ViewerError> {
    let device = Arc::new(HeadlessDevice::new());
    let mut registry = PipelineRegistry::new();
    registry.create_all(device.as_ref())?;

    let mesh = {
        let material = Material::flat_color(
            device.as_ref(),
            &registry,
            FlatColorData {
                diffuse_color: [0.8, 0.7, 0.5, 1.0],
                ..FlatColorData::default()
            },
        )?;
        let mut loader = MeshLoader::new(device.as_ref(), &registry);
        Arc::new(load_mesh(&mut loader, material, &args.source)?)
    };
    log::info!("Viewing '{}' ({} submeshes)", mesh.name, mesh.len());

    let (width, height) = config.target_size;
    let color_target = device.new_texture(&TextureDescriptor {
        kind: TextureKind::Texture2d,
        width,
        height,
        format: PixelFormat::Bgra8Unorm,
        usage: TextureUsage::COLOR_ATTACHMENT,
    })?;

    let mut scene = Scene::new();
    scene.add_entity(RenderableEntity::new(Arc::clone(&mesh)));
    scene.add_point_light(PointLight::default(), Vec3::new(2.0, 2.0, 2.0));
    scene.add_directional_light(DirectionalLight::default(), Vec3::new(-1.0, 1.0, 1.0));

    let mut renderer = Renderer::new(device.clone(), config.renderer.clone())?;
    let camera = Camera::from_config(&config.renderer, Vec3::new(0.0, 0.0, 3.0));

    for frame in 0..config.frame_count {
        if let Some(entity) = scene.entities.first_mut() {
            entity.rotation.y = deg_to_rad(SPIN_PER_FRAME * frame as f32);
        }
        renderer.begin_frame(&camera, config.target_size)?;
        scene.submit(&mut renderer)?;
        let stats = renderer.end_frame(color_target)?;
        log::info!(
            "Frame {}: {} draw calls, {} pipeline binds, {} material binds, {} vertex buffer binds",
            frame,
            stats.draw_calls,
            stats.pipeline_binds,
            stats.material_binds,
            stats.vertex_buffer_binds
        );
    }

    renderer.wait_idle()?;
    registry.destroy_all(device.as_ref());
    log::info!(
        "Rendered {} frames with {} submissions",
        renderer.frames_rendered(),
        device.submissions().len()
    );
    Ok(())
}

fn main() {
    let args = Cli::parse();

    let config = args
        .config
        .as_ref()
        .map_or_else(|| Ok(ViewerConfig::default()), ViewerConfig::load_from_file)
        .and_then(|config| {
            config.renderer.validate()?;
            Ok(config)
        });
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", ViewerError::from(e));
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level)).init();
    log::info!("Starting scop viewer");

    if let Err(e) = run(&args, &config) {
        log::error!("Viewer error: {}", e);
        std::process::exit(1);
    }
    log::info!("Viewer finished successfully");
}
