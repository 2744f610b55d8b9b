//! Ring-buffered per-frame state
//!
//! Each [`FrameRecord`] owns the transient resources of one frame in flight. A slot is
//! only reused after the GPU has signalled completion of the batch last submitted
//! from it.

use super::batch::DrawBatches;
use super::gpu::{
    BufferDescriptor, BufferHandle, BufferUsage, GraphicsDevice, GpuResult, ParameterBlockPool,
    PixelFormat, StorageMode, SubmissionToken, TextureDescriptor, TextureHandle, TextureKind,
    TextureUsage,
};
use super::lighting::SceneData;
use crate::foundation::math::{utils, Mat4};

/// Transient resources of one frame slot
#[derive(Debug)]
pub struct FrameRecord {
    pub(crate) parameter_blocks: ParameterBlockPool,
    pub(crate) view_projection_buffer: BufferHandle,
    pub(crate) scene_data_buffer: BufferHandle,
    pub(crate) batches: DrawBatches,
    pub(crate) scene_data: SceneData,
    depth_target: Option<(TextureHandle, (u32, u32))>,
    last_submission: Option<SubmissionToken>,
}

impl FrameRecord {
    /// Allocate the slot's uniform buffers
    pub fn new(device: &dyn GraphicsDevice) -> GpuResult<Self> {
        let uniform = |size| {
            device.new_buffer(&BufferDescriptor {
                size,
                usage: BufferUsage::UNIFORM,
                storage: StorageMode::HostVisible,
            })
        };
        Ok(Self {
            parameter_blocks: ParameterBlockPool::new(),
            view_projection_buffer: uniform(std::mem::size_of::<[[f32; 4]; 4]>())?,
            scene_data_buffer: uniform(std::mem::size_of::<SceneData>())?,
            batches: DrawBatches::new(),
            scene_data: SceneData::default(),
            depth_target: None,
            last_submission: None,
        })
    }

    /// Block until the slot's previous submission has completed, then recycle its
    /// parameter blocks and clear its draw grouping.
    ///
    /// On a failed wait the slot keeps its submission and nothing is reset.
    pub fn wait_and_reset(&mut self, device: &dyn GraphicsDevice) -> GpuResult<()> {
        if let Some(token) = self.last_submission {
            device.wait(token)?;
            self.last_submission = None;
            log::trace!("Frame slot reusable after submission {:?}", token);
        }
        self.parameter_blocks.reset();
        self.batches.clear();
        Ok(())
    }

    /// Depth texture matching `extent`, recreated if the extent changed
    pub fn depth_target(&mut self, device: &dyn GraphicsDevice, extent: (u32, u32)) -> GpuResult<TextureHandle> {
        if let Some((texture, size)) = self.depth_target {
            if size == extent {
                return Ok(texture);
            }
        }
        let texture = device.new_texture(&TextureDescriptor {
            kind: TextureKind::Texture2d,
            width: extent.0,
            height: extent.1,
            format: PixelFormat::Depth32Float,
            usage: TextureUsage::DEPTH_ATTACHMENT,
        })?;
        log::debug!("Created {}x{} depth target {:?}", extent.0, extent.1, texture);
        self.depth_target = Some((texture, extent));
        Ok(texture)
    }

    /// Write the view-projection matrix into the slot's uniform buffer
    pub fn write_view_projection(&self, device: &dyn GraphicsDevice, matrix: &Mat4) -> GpuResult<()> {
        let columns = utils::column_major(matrix);
        device.write_buffer(self.view_projection_buffer, 0, bytemuck::bytes_of(&columns))
    }

    /// Write the accumulated scene data into the slot's uniform buffer
    pub fn write_scene_data(&self, device: &dyn GraphicsDevice) -> GpuResult<()> {
        device.write_buffer(self.scene_data_buffer, 0, bytemuck::bytes_of(&self.scene_data))
    }

    /// Remember the batch submitted from this slot
    pub fn set_last_submission(&mut self, token: SubmissionToken) {
        self.last_submission = Some(token);
    }

    /// Batch last submitted from this slot, not yet waited on
    pub fn last_submission(&self) -> Option<SubmissionToken> {
        self.last_submission
    }
}
