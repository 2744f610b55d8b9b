//! In-memory graphics device
//!
//! `HeadlessDevice` implements [`GraphicsDevice`] without a GPU. Buffers are byte
//! vectors, transfers are executed at submission, and every recorded command is kept
//! so callers can inspect exactly what a frame issued. Submissions complete
//! immediately; waits are logged.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::gpu::{
    BufferDescriptor, BufferHandle, CommandBuffer, Framebuffer, GpuError, GpuResult,
    GraphicsDevice, ParameterBlock, PipelineDescriptor, PipelineHandle, SamplerDescriptor,
    SamplerHandle, SubmissionToken, TextureDescriptor, TextureHandle, TextureKind,
};
use crate::foundation::math::Mat4;

/// One command as recorded by a [`HeadlessCommandBuffer`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Transfer pass opened
    BeginTransferPass,
    /// Buffer to buffer copy
    CopyBufferToBuffer {
        /// Source buffer
        source: BufferHandle,
        /// Destination buffer
        destination: BufferHandle,
        /// Bytes copied
        size: usize,
    },
    /// Buffer to texture copy
    CopyBufferToTexture {
        /// Source buffer
        source: BufferHandle,
        /// Byte offset in the source
        source_offset: usize,
        /// Destination texture
        destination: TextureHandle,
        /// Destination layer
        layer: u32,
    },
    /// Transfer pass closed
    EndTransferPass,
    /// Render pass opened
    BeginRenderPass(Framebuffer),
    /// Pipeline bound
    UsePipeline(PipelineHandle),
    /// Parameter block bound
    SetParameterBlock {
        /// Bound block
        block: ParameterBlock,
        /// Set index
        index: u32,
    },
    /// Vertex buffer bound
    UseVertexBuffer(BufferHandle),
    /// Model matrix pushed
    PushConstants(Mat4),
    /// Indexed draw
    DrawIndexed(BufferHandle),
    /// Render pass closed
    EndRenderPass,
}

/// Command buffer that stores what it is asked to record
#[derive(Debug, Default)]
pub struct HeadlessCommandBuffer {
    commands: Vec<RecordedCommand>,
}

impl HeadlessCommandBuffer {
    /// Commands recorded so far
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }
}

impl CommandBuffer for HeadlessCommandBuffer {
    fn begin_transfer_pass(&mut self) {
        self.commands.push(RecordedCommand::BeginTransferPass);
    }

    fn copy_buffer_to_buffer(&mut self, source: BufferHandle, destination: BufferHandle, size: usize) {
        self.commands.push(RecordedCommand::CopyBufferToBuffer { source, destination, size });
    }

    fn copy_buffer_to_texture(
        &mut self,
        source: BufferHandle,
        source_offset: usize,
        destination: TextureHandle,
        layer: u32,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToTexture {
            source,
            source_offset,
            destination,
            layer,
        });
    }

    fn end_transfer_pass(&mut self) {
        self.commands.push(RecordedCommand::EndTransferPass);
    }

    fn begin_render_pass(&mut self, framebuffer: &Framebuffer) {
        self.commands.push(RecordedCommand::BeginRenderPass(*framebuffer));
    }

    fn use_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(RecordedCommand::UsePipeline(pipeline));
    }

    fn set_parameter_block(&mut self, block: &ParameterBlock, index: u32) {
        self.commands.push(RecordedCommand::SetParameterBlock {
            block: block.clone(),
            index,
        });
    }

    fn use_vertex_buffer(&mut self, buffer: BufferHandle) {
        self.commands.push(RecordedCommand::UseVertexBuffer(buffer));
    }

    fn push_constants(&mut self, model: &Mat4) {
        self.commands.push(RecordedCommand::PushConstants(*model));
    }

    fn draw_indexed(&mut self, index_buffer: BufferHandle) {
        self.commands.push(RecordedCommand::DrawIndexed(index_buffer));
    }

    fn end_render_pass(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[derive(Debug)]
struct BufferEntry {
    descriptor: BufferDescriptor,
    data: Vec<u8>,
}

impl BufferEntry {
    fn read(&self, offset: usize, len: usize) -> GpuResult<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                GpuError::OutOfBounds(format!(
                    "read of {len} bytes at {offset} from buffer of {} bytes",
                    self.data.len()
                ))
            })
    }
}

#[derive(Debug)]
struct TextureEntry {
    descriptor: TextureDescriptor,
    layers: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct DeviceState {
    next_id: u64,
    buffers: HashMap<u64, BufferEntry>,
    textures: HashMap<u64, TextureEntry>,
    samplers: HashMap<u64, SamplerDescriptor>,
    pipelines: HashMap<u64, PipelineDescriptor>,
    submissions: Vec<Vec<RecordedCommand>>,
    waits: Vec<SubmissionToken>,
    remaining_allocations: Option<usize>,
}

impl DeviceState {
    fn allocate_id(&mut self, what: &str) -> GpuResult<u64> {
        if let Some(remaining) = self.remaining_allocations.as_mut() {
            if *remaining == 0 {
                return Err(GpuError::AllocationFailed(format!("headless {what} budget exhausted")));
            }
            *remaining -= 1;
        }
        self.next_id += 1;
        Ok(self.next_id)
    }

    fn execute(&mut self, commands: &[RecordedCommand]) -> GpuResult<()> {
        for command in commands {
            match *command {
                RecordedCommand::CopyBufferToBuffer { source, destination, size } => {
                    let bytes = self.buffer(source)?.read(0, size)?.to_vec();
                    let target = self.buffer_mut(destination)?;
                    if size > target.data.len() {
                        return Err(GpuError::OutOfBounds(format!(
                            "copy of {size} bytes into buffer {} of {} bytes",
                            destination.0,
                            target.data.len()
                        )));
                    }
                    target.data[..size].copy_from_slice(&bytes);
                }
                RecordedCommand::CopyBufferToTexture {
                    source,
                    source_offset,
                    destination,
                    layer,
                } => {
                    let (layer_size, layer_count) = {
                        let texture = self
                            .textures
                            .get(&destination.0)
                            .ok_or(GpuError::UnknownHandle { kind: "texture", id: destination.0 })?;
                        let descriptor = &texture.descriptor;
                        (
                            descriptor.width as usize * descriptor.height as usize * descriptor.format.bytes_per_pixel(),
                            texture.layers.len(),
                        )
                    };
                    if layer as usize >= layer_count {
                        return Err(GpuError::OutOfBounds(format!(
                            "layer {layer} of texture {} with {layer_count} layers",
                            destination.0
                        )));
                    }
                    let bytes = self.buffer(source)?.read(source_offset, layer_size)?.to_vec();
                    if let Some(texture) = self.textures.get_mut(&destination.0) {
                        texture.layers[layer as usize] = bytes;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn buffer(&self, handle: BufferHandle) -> GpuResult<&BufferEntry> {
        self.buffers
            .get(&handle.0)
            .ok_or(GpuError::UnknownHandle { kind: "buffer", id: handle.0 })
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> GpuResult<&mut BufferEntry> {
        self.buffers
            .get_mut(&handle.0)
            .ok_or(GpuError::UnknownHandle { kind: "buffer", id: handle.0 })
    }
}

/// Graphics device backed by host memory
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    state: Mutex<DeviceState>,
}

impl HeadlessDevice {
    /// Create a device with unlimited allocations
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow only `count` more resource allocations; every later one fails
    pub fn limit_allocations(&self, count: usize) {
        self.lock().remaining_allocations = Some(count);
    }

    /// Lift any allocation limit
    pub fn unlimit_allocations(&self) {
        self.lock().remaining_allocations = None;
    }

    /// Every submitted command buffer, in submission order
    pub fn submissions(&self) -> Vec<Vec<RecordedCommand>> {
        self.lock().submissions.clone()
    }

    /// Tokens waited on, in wait order
    pub fn waits(&self) -> Vec<SubmissionToken> {
        self.lock().waits.clone()
    }

    /// Current contents of a buffer
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.lock().buffers.get(&buffer.0).map(|entry| entry.data.clone())
    }

    /// Descriptor of a buffer
    pub fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<BufferDescriptor> {
        self.lock().buffers.get(&buffer.0).map(|entry| entry.descriptor)
    }

    /// Descriptor of a texture
    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.lock().textures.get(&texture.0).map(|entry| entry.descriptor)
    }

    /// Texel bytes of one texture layer
    pub fn texture_layer(&self, texture: TextureHandle, layer: u32) -> Option<Vec<u8>> {
        self.lock()
            .textures
            .get(&texture.0)
            .and_then(|entry| entry.layers.get(layer as usize).cloned())
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.lock().textures.len()
    }

    /// Number of live pipelines
    pub fn pipeline_count(&self) -> usize {
        self.lock().pipelines.len()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // A panic while holding the lock leaves plain data behind; keep using it.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn new_buffer(&self, descriptor: &BufferDescriptor) -> GpuResult<BufferHandle> {
        let mut state = self.lock();
        let id = state.allocate_id("buffer")?;
        state.buffers.insert(
            id,
            BufferEntry {
                descriptor: *descriptor,
                data: vec![0; descriptor.size],
            },
        );
        Ok(BufferHandle(id))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: usize, data: &[u8]) -> GpuResult<()> {
        let mut state = self.lock();
        let entry = state.buffer_mut(buffer)?;
        let len = entry.data.len();
        let target = offset
            .checked_add(data.len())
            .and_then(|end| entry.data.get_mut(offset..end))
            .ok_or_else(|| {
                GpuError::OutOfBounds(format!(
                    "write of {} bytes at {offset} overflows buffer of {len} bytes",
                    data.len()
                ))
            })?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn new_texture(&self, descriptor: &TextureDescriptor) -> GpuResult<TextureHandle> {
        let mut state = self.lock();
        let id = state.allocate_id("texture")?;
        let layer_count = match descriptor.kind {
            TextureKind::Texture2d => 1,
            TextureKind::Cube => 6,
        };
        state.textures.insert(
            id,
            TextureEntry {
                descriptor: *descriptor,
                layers: vec![Vec::new(); layer_count],
            },
        );
        Ok(TextureHandle(id))
    }

    fn new_sampler(&self, descriptor: &SamplerDescriptor) -> GpuResult<SamplerHandle> {
        let mut state = self.lock();
        let id = state.allocate_id("sampler")?;
        state.samplers.insert(id, *descriptor);
        Ok(SamplerHandle(id))
    }

    fn new_pipeline(&self, descriptor: &PipelineDescriptor) -> GpuResult<PipelineHandle> {
        let mut state = self.lock();
        let id = state.allocate_id("pipeline")?;
        state.pipelines.insert(id, descriptor.clone());
        Ok(PipelineHandle(id))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.lock().pipelines.remove(&pipeline.0);
    }

    fn new_command_buffer(&self) -> Box<dyn CommandBuffer> {
        Box::new(HeadlessCommandBuffer::default())
    }

    fn submit(&self, commands: Box<dyn CommandBuffer>) -> GpuResult<SubmissionToken> {
        let recorded = commands
            .into_any()
            .downcast::<HeadlessCommandBuffer>()
            .map_err(|_| GpuError::AllocationFailed("foreign command buffer".to_string()))?;
        let mut state = self.lock();
        state.execute(&recorded.commands)?;
        state.submissions.push(recorded.commands);
        Ok(SubmissionToken(state.submissions.len() as u64))
    }

    fn wait(&self, token: SubmissionToken) -> GpuResult<()> {
        let mut state = self.lock();
        if token.0 == 0 || token.0 > state.submissions.len() as u64 {
            return Err(GpuError::WaitFailed(token.0));
        }
        state.waits.push(token);
        Ok(())
    }
}
