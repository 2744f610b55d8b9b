//! # Frame Renderer
//!
//! Drives one frame at a time over a ring of [`FrameRecord`]s:
//!
//! 1. [`Renderer::begin_frame`] waits for the current slot's previous submission,
//!    resets its transient state and writes the camera matrices.
//! 2. [`Renderer::render_mesh`] and the light methods accumulate the frame's draws.
//! 3. [`Renderer::end_frame`] replays the draw batches into a command buffer, submits
//!    it and advances to the next slot.
//!
//! At most `frames_in_flight` submissions are outstanding at any time.

use std::sync::Arc;

use super::batch::{BatchStats, DrawBatches};
use super::camera::Camera;
use super::frame::FrameRecord;
use super::gpu::{Binding, Framebuffer, GraphicsDevice, TextureHandle};
use super::lighting::{DirectionalLight, PointLight, SceneData};
use super::material::{SCENE_DATA_LAYOUT, VIEW_PROJECTION_LAYOUT};
use super::mesh::Mesh;
use super::{RenderError, RenderResult};
use crate::config::RendererConfig;
use crate::foundation::math::{Mat4, Vec3};

/// Batching renderer over a [`GraphicsDevice`]
pub struct Renderer {
    device: Arc<dyn GraphicsDevice>,
    config: RendererConfig,
    frames: Vec<FrameRecord>,
    frame_index: usize,
    frame_in_progress: bool,
    extent: (u32, u32),
    ambient_light: Vec3,
    dropped_lights: usize,
    last_stats: BatchStats,
    frames_rendered: u64,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("frames_in_flight", &self.frames.len())
            .field("frame_index", &self.frame_index)
            .field("frame_in_progress", &self.frame_in_progress)
            .field("frames_rendered", &self.frames_rendered)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    /// Validate `config` and allocate one frame record per frame in flight
    pub fn new(device: Arc<dyn GraphicsDevice>, config: RendererConfig) -> RenderResult<Self> {
        config.validate()?;
        let frames = (0..config.frames_in_flight)
            .map(|_| FrameRecord::new(device.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        log::info!("Renderer created with {} frames in flight", frames.len());
        Ok(Self {
            device,
            ambient_light: Vec3::from(config.ambient_light),
            config,
            frames,
            frame_index: 0,
            frame_in_progress: false,
            extent: (1, 1),
            dropped_lights: 0,
            last_stats: BatchStats::default(),
            frames_rendered: 0,
        })
    }

    /// Start a frame rendered from `camera` into a target of `extent` pixels.
    ///
    /// Blocks until the GPU is done with the frame slot being reused.
    pub fn begin_frame(&mut self, camera: &Camera, extent: (u32, u32)) -> RenderResult<()> {
        if self.frame_in_progress {
            log::warn!("begin_frame called twice; discarding the unfinished frame");
        }

        let frame = &mut self.frames[self.frame_index];
        frame.wait_and_reset(self.device.as_ref())?;

        let aspect = extent.0.max(1) as f32 / extent.1.max(1) as f32;
        frame.write_view_projection(self.device.as_ref(), &camera.view_projection_matrix(aspect))?;
        frame.scene_data = SceneData::new(camera.position, self.ambient_light);

        self.extent = extent;
        self.dropped_lights = 0;
        self.frame_in_progress = true;
        Ok(())
    }

    /// Set the ambient light color, applied to the current frame and later ones
    pub fn set_ambient_light(&mut self, color: Vec3) {
        self.ambient_light = color;
        if self.frame_in_progress {
            self.frames[self.frame_index].scene_data.ambient_light_color = color.into();
        }
    }

    /// Queue every submesh of `mesh` placed at `world` for this frame
    pub fn render_mesh(&mut self, mesh: &Mesh, world: &Mat4) -> RenderResult<()> {
        let frame = self.current_frame_mut()?;
        frame.batches.add_mesh(mesh, world);
        Ok(())
    }

    /// Add a point light at `position` to this frame. Lights beyond capacity are dropped.
    pub fn add_point_light(&mut self, light: &PointLight, position: Vec3) -> RenderResult<()> {
        let frame = self.current_frame_mut()?;
        let accepted = frame.scene_data.push_point_light(light, position);
        self.note_light(accepted, "point");
        Ok(())
    }

    /// Add a directional light seen from `position` to this frame. Lights beyond
    /// capacity are dropped.
    pub fn add_directional_light(&mut self, light: &DirectionalLight, position: Vec3) -> RenderResult<()> {
        let frame = self.current_frame_mut()?;
        let accepted = frame.scene_data.push_directional_light(light, position);
        self.note_light(accepted, "directional");
        Ok(())
    }

    /// Record and submit the frame into `color_target`, then advance to the next slot
    pub fn end_frame(&mut self, color_target: TextureHandle) -> RenderResult<BatchStats> {
        if !self.frame_in_progress {
            return Err(RenderError::NoFrameInProgress);
        }
        self.frame_in_progress = false;

        let device = self.device.as_ref();
        let frame = &mut self.frames[self.frame_index];
        let depth = frame.depth_target(device, self.extent)?;
        frame.write_scene_data(device)?;

        let mut view_projection = frame.parameter_blocks.get(VIEW_PROJECTION_LAYOUT);
        view_projection.set_binding(0, Binding::Buffer(frame.view_projection_buffer));
        let mut scene_data = frame.parameter_blocks.get(SCENE_DATA_LAYOUT);
        scene_data.set_binding(0, Binding::Buffer(frame.scene_data_buffer));

        let mut commands = device.new_command_buffer();
        commands.begin_render_pass(&Framebuffer {
            color: color_target,
            clear_color: self.config.clear_color,
            depth,
        });
        let stats = frame.batches.replay(
            commands.as_mut(),
            &mut frame.parameter_blocks,
            &view_projection,
            &scene_data,
        );
        commands.end_render_pass();

        let token = device.submit(commands)?;
        frame.set_last_submission(token);

        log::debug!(
            "Frame {} (slot {}): {} draws, {} pipeline / {} material / {} vertex buffer binds",
            self.frames_rendered,
            self.frame_index,
            stats.draw_calls,
            stats.pipeline_binds,
            stats.material_binds,
            stats.vertex_buffer_binds
        );

        self.frame_index = (self.frame_index + 1) % self.frames.len();
        self.frames_rendered += 1;
        self.last_stats = stats;
        Ok(stats)
    }

    /// Wait for every outstanding submission, e.g. before destroying pipelines
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        for frame in &mut self.frames {
            frame.wait_and_reset(self.device.as_ref())?;
        }
        Ok(())
    }

    /// Draw grouping of the frame in progress
    pub fn current_batches(&self) -> Option<&DrawBatches> {
        self.frame_in_progress
            .then(|| &self.frames[self.frame_index].batches)
    }

    /// Scene data of the frame in progress
    pub fn current_scene_data(&self) -> Option<&SceneData> {
        self.frame_in_progress
            .then(|| &self.frames[self.frame_index].scene_data)
    }

    /// Index of the frame slot used by the next (or current) frame
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames submitted so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Statistics of the last submitted frame
    pub fn last_stats(&self) -> BatchStats {
        self.last_stats
    }

    /// Active configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Device this renderer submits to
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    fn current_frame_mut(&mut self) -> RenderResult<&mut FrameRecord> {
        if !self.frame_in_progress {
            return Err(RenderError::NoFrameInProgress);
        }
        Ok(&mut self.frames[self.frame_index])
    }

    fn note_light(&mut self, accepted: bool, kind: &str) {
        if accepted {
            return;
        }
        self.dropped_lights += 1;
        if self.dropped_lights == 1 {
            log::warn!("Scene data is full; dropping {} light(s) this frame", kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::gpu::{BufferHandle, GpuError};
    use crate::render::headless::{HeadlessDevice, RecordedCommand};
    use crate::render::lighting::MAX_POINT_LIGHTS;
    use crate::render::material::{FlatColorData, Material, PipelineRegistry};
    use crate::render::mesh::SubMesh;

    fn setup(frames: usize) -> (Arc<HeadlessDevice>, Renderer, Mesh) {
        let device = Arc::new(HeadlessDevice::new());
        let mut registry = PipelineRegistry::new();
        registry.create_all(device.as_ref()).unwrap();
        let material = Material::flat_color(device.as_ref(), &registry, FlatColorData::default()).unwrap();
        let mut mesh = Mesh::new("quad");
        mesh.add_root(SubMesh::new("quad", BufferHandle(900), BufferHandle(901), material));
        let renderer = Renderer::new(
            device.clone(),
            RendererConfig::default().with_frames_in_flight(frames),
        )
        .unwrap();
        (device, renderer, mesh)
    }

    fn camera() -> Camera {
        Camera::from_config(&RendererConfig::default(), Vec3::new(0.0, 0.0, 3.0))
    }

    #[test]
    fn test_render_requires_frame() {
        let (_, mut renderer, mesh) = setup(3);
        assert!(matches!(
            renderer.render_mesh(&mesh, &Mat4::identity()),
            Err(RenderError::NoFrameInProgress)
        ));
        assert!(matches!(
            renderer.end_frame(TextureHandle(1)),
            Err(RenderError::NoFrameInProgress)
        ));
    }

    #[test]
    fn test_frame_index_wraps_and_waits_on_reuse() {
        let (device, mut renderer, mesh) = setup(3);
        for _ in 0..4 {
            renderer.begin_frame(&camera(), (640, 480)).unwrap();
            renderer.render_mesh(&mesh, &Mat4::identity()).unwrap();
            renderer.end_frame(TextureHandle(1)).unwrap();
        }
        assert_eq!(renderer.frame_index(), 1);
        // Only the fourth frame reused a slot with a pending submission.
        assert_eq!(device.waits().len(), 1);
        assert_eq!(device.waits()[0], crate::render::gpu::SubmissionToken(1));
    }

    #[test]
    fn test_grouping_does_not_leak_between_frames() {
        let (device, mut renderer, mesh) = setup(1);
        renderer.begin_frame(&camera(), (640, 480)).unwrap();
        renderer.render_mesh(&mesh, &Mat4::identity()).unwrap();
        renderer.render_mesh(&mesh, &Mat4::identity()).unwrap();
        assert_eq!(renderer.end_frame(TextureHandle(1)).unwrap().draw_calls, 2);

        renderer.begin_frame(&camera(), (640, 480)).unwrap();
        renderer.render_mesh(&mesh, &Mat4::identity()).unwrap();
        assert_eq!(renderer.end_frame(TextureHandle(1)).unwrap().draw_calls, 1);

        let submissions = device.submissions();
        let draws = submissions[1]
            .iter()
            .filter(|command| matches!(command, RecordedCommand::DrawIndexed(_)))
            .count();
        assert_eq!(draws, 1);
    }

    #[test]
    fn test_render_pass_wraps_draws() {
        let (device, mut renderer, mesh) = setup(2);
        renderer.begin_frame(&camera(), (320, 200)).unwrap();
        renderer.render_mesh(&mesh, &Mat4::identity()).unwrap();
        renderer.end_frame(TextureHandle(42)).unwrap();

        let commands = &device.submissions()[0];
        let RecordedCommand::BeginRenderPass(framebuffer) = &commands[0] else {
            panic!("expected render pass first, got {:?}", commands[0]);
        };
        assert_eq!(framebuffer.color, TextureHandle(42));
        assert_eq!(device.texture_descriptor(framebuffer.depth).unwrap().width, 320);
        assert_eq!(commands.last(), Some(&RecordedCommand::EndRenderPass));
    }

    #[test]
    fn test_extra_point_lights_dropped() {
        let (_, mut renderer, _) = setup(1);
        renderer.begin_frame(&camera(), (640, 480)).unwrap();
        for _ in 0..MAX_POINT_LIGHTS + 3 {
            renderer.add_point_light(&PointLight::default(), Vec3::zeros()).unwrap();
        }
        renderer.add_directional_light(&DirectionalLight::default(), Vec3::y()).unwrap();
        let data = renderer.current_scene_data().unwrap();
        assert_eq!(data.point_light_count as usize, MAX_POINT_LIGHTS);
        assert_eq!(data.directional_light_count, 1);
    }

    #[test]
    fn test_ambient_light_applies_to_current_frame() {
        let (_, mut renderer, _) = setup(1);
        renderer.begin_frame(&camera(), (640, 480)).unwrap();
        renderer.set_ambient_light(Vec3::new(0.2, 0.3, 0.4));
        assert_eq!(
            renderer.current_scene_data().unwrap().ambient_light_color,
            [0.2, 0.3, 0.4]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(HeadlessDevice::new());
        let result = Renderer::new(device, RendererConfig::default().with_frames_in_flight(0));
        assert!(matches!(result, Err(RenderError::Config(_))));
    }

    #[test]
    fn test_failed_allocation_surfaces_as_gpu_error() {
        let device = Arc::new(HeadlessDevice::new());
        device.limit_allocations(1);
        let result = Renderer::new(device, RendererConfig::default());
        assert!(matches!(
            result,
            Err(RenderError::Gpu(GpuError::AllocationFailed(_)))
        ));
    }
}
