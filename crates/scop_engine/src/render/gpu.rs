//! Backend abstraction for the GPU device
//!
//! Everything the mesh loader and the frame renderer need from a graphics API:
//! opaque resource handles, resource descriptors, the [`GraphicsDevice`] trait that
//! creates resources and submits work, and the [`CommandBuffer`] trait that records it.
//!
//! Handles are plain ids. Their identity is what the draw batching groups on, so they
//! are `Copy + Ord + Hash` and carry no lifetime; the device owns the resources.

use std::any::Any;

use bitflags::bitflags;
use thiserror::Error;

use crate::foundation::math::Mat4;

/// Result type for device operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Errors reported by a graphics device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// The device could not allocate a resource
    #[error("GPU allocation failed: {0}")]
    AllocationFailed(String),

    /// A handle does not name a live resource
    #[error("Unknown {kind} handle {id}")]
    UnknownHandle {
        /// Resource kind ("buffer", "texture", ...)
        kind: &'static str,
        /// Raw handle id
        id: u64,
    },

    /// A copy or write reaches past the end of a resource
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// Waiting on a submission failed
    #[error("Failed to wait for submission {0}")]
    WaitFailed(u64),
}

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);
    };
}

gpu_handle!(
    /// Handle to a GPU buffer
    BufferHandle
);
gpu_handle!(
    /// Handle to a GPU texture (2D or cube)
    TextureHandle
);
gpu_handle!(
    /// Handle to a texture sampler
    SamplerHandle
);
gpu_handle!(
    /// Handle to a compiled graphics pipeline
    PipelineHandle
);

/// Marker for a submitted command batch, waited on for frame pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionToken(pub u64);

bitflags! {
    /// How a buffer will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Bound as a vertex buffer
        const VERTEX = 1 << 0;
        /// Bound as an index buffer
        const INDEX = 1 << 1;
        /// Bound as a uniform buffer
        const UNIFORM = 1 << 2;
        /// Source of a transfer
        const COPY_SOURCE = 1 << 3;
        /// Destination of a transfer
        const COPY_DESTINATION = 1 << 4;
    }
}

bitflags! {
    /// How a texture will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Sampled by shaders
        const SHADER_READ = 1 << 0;
        /// Destination of a transfer
        const COPY_DESTINATION = 1 << 1;
        /// Render pass color attachment
        const COLOR_ATTACHMENT = 1 << 2;
        /// Render pass depth attachment
        const DEPTH_ATTACHMENT = 1 << 3;
    }
}

/// Where a resource lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageMode {
    /// CPU-writable memory
    HostVisible,
    /// GPU-only memory, filled through transfers
    DeviceLocal,
}

/// Buffer creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Size in bytes
    pub size: usize,
    /// Usage flags
    pub usage: BufferUsage,
    /// Memory placement
    pub storage: StorageMode,
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// Single 2D image
    Texture2d,
    /// Six square faces
    Cube,
}

/// Texel formats used by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit RGBA, normalized
    Rgba8Unorm,
    /// 8-bit BGRA, normalized (swapchain images)
    Bgra8Unorm,
    /// 32-bit float depth
    Depth32Float,
}

impl PixelFormat {
    /// Size of one texel in bytes
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Depth32Float => 4,
        }
    }
}

/// Texture creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    /// 2D or cube
    pub kind: TextureKind,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Texel format
    pub format: PixelFormat,
    /// Usage flags
    pub usage: TextureUsage,
}

/// Sampler creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerDescriptor {
    /// Use nearest filtering instead of linear
    pub nearest: bool,
}

/// Kind of resource bound at one slot of a parameter block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Uniform buffer
    UniformBuffer,
    /// Sampled texture
    SampledTexture,
    /// Sampler
    Sampler,
}

/// Ordered binding slots of a parameter block
pub type ParameterBlockLayout = &'static [BindingType];

/// Pipeline creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDescriptor {
    /// Debug label, also the shader library name
    pub label: &'static str,
    /// Vertex attribute byte offsets read by the vertex stage
    pub vertex_attributes: Vec<usize>,
    /// Vertex stride in bytes
    pub vertex_stride: usize,
    /// Parameter block layouts, indexed by set number
    pub parameter_block_layouts: Vec<ParameterBlockLayout>,
    /// Color attachment format
    pub color_format: PixelFormat,
    /// Depth attachment format
    pub depth_format: PixelFormat,
}

/// A resource bound to one slot of a parameter block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Uniform buffer
    Buffer(BufferHandle),
    /// Sampled texture
    Texture(TextureHandle),
    /// Sampler
    Sampler(SamplerHandle),
}

/// Descriptor bundle binding resources to a pipeline stage.
///
/// Blocks are handed out by a per-frame [`ParameterBlockPool`] and are only valid
/// until that pool is reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBlock {
    /// Pool-unique id for this frame
    pub id: u64,
    /// Layout this block was allocated for
    pub layout: ParameterBlockLayout,
    /// Bound resources, one per layout slot
    pub bindings: Vec<Option<Binding>>,
}

impl ParameterBlock {
    /// Bind a resource at `slot`. Out-of-layout slots are ignored with a warning.
    pub fn set_binding(&mut self, slot: usize, binding: Binding) {
        match self.bindings.get_mut(slot) {
            Some(entry) => *entry = Some(binding),
            None => log::warn!(
                "Parameter block binding slot {} outside layout of {} slots",
                slot,
                self.layout.len()
            ),
        }
    }
}

/// Transient allocator for parameter blocks, reset once per frame
#[derive(Debug, Default)]
pub struct ParameterBlockPool {
    next_id: u64,
    allocated: usize,
}

impl ParameterBlockPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a block with every slot of `layout` unbound
    pub fn get(&mut self, layout: ParameterBlockLayout) -> ParameterBlock {
        self.next_id += 1;
        self.allocated += 1;
        ParameterBlock {
            id: self.next_id,
            layout,
            bindings: vec![None; layout.len()],
        }
    }

    /// Number of blocks handed out since the last reset
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Release every block. Only valid once the GPU has finished with them.
    pub fn reset(&mut self) {
        self.allocated = 0;
    }
}

/// Attachment set for one render pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framebuffer {
    /// Color target
    pub color: TextureHandle,
    /// Clear color for the color target
    pub clear_color: [f32; 4],
    /// Depth target, cleared to 1.0
    pub depth: TextureHandle,
}

/// Records GPU commands for later submission
pub trait CommandBuffer: Any {
    /// Begin a transfer (copy) pass
    fn begin_transfer_pass(&mut self);

    /// Copy `size` bytes from a staging buffer into another buffer
    fn copy_buffer_to_buffer(&mut self, source: BufferHandle, destination: BufferHandle, size: usize);

    /// Copy tightly-packed texels from a buffer into one layer (cube face) of a texture
    fn copy_buffer_to_texture(
        &mut self,
        source: BufferHandle,
        source_offset: usize,
        destination: TextureHandle,
        layer: u32,
    );

    /// End the transfer pass
    fn end_transfer_pass(&mut self);

    /// Begin a render pass into `framebuffer`
    fn begin_render_pass(&mut self, framebuffer: &Framebuffer);

    /// Bind a graphics pipeline
    fn use_pipeline(&mut self, pipeline: PipelineHandle);

    /// Bind a parameter block at set `index`
    fn set_parameter_block(&mut self, block: &ParameterBlock, index: u32);

    /// Bind a vertex buffer
    fn use_vertex_buffer(&mut self, buffer: BufferHandle);

    /// Push the per-draw model matrix
    fn push_constants(&mut self, model: &Mat4);

    /// Draw every index of `index_buffer` against the bound vertex buffer
    fn draw_indexed(&mut self, index_buffer: BufferHandle);

    /// End the render pass
    fn end_render_pass(&mut self);

    /// Downcast to the concrete backend type at submission
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

/// Creates GPU resources and submits recorded work
pub trait GraphicsDevice {
    /// Create a buffer
    fn new_buffer(&self, descriptor: &BufferDescriptor) -> GpuResult<BufferHandle>;

    /// Write bytes into a host-visible buffer
    fn write_buffer(&self, buffer: BufferHandle, offset: usize, data: &[u8]) -> GpuResult<()>;

    /// Create a texture
    fn new_texture(&self, descriptor: &TextureDescriptor) -> GpuResult<TextureHandle>;

    /// Create a sampler
    fn new_sampler(&self, descriptor: &SamplerDescriptor) -> GpuResult<SamplerHandle>;

    /// Compile a graphics pipeline
    fn new_pipeline(&self, descriptor: &PipelineDescriptor) -> GpuResult<PipelineHandle>;

    /// Release a pipeline
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    /// Get an empty command buffer
    fn new_command_buffer(&self) -> Box<dyn CommandBuffer>;

    /// Submit recorded commands; the token signals once the GPU has executed them
    fn submit(&self, commands: Box<dyn CommandBuffer>) -> GpuResult<SubmissionToken>;

    /// Block until a submission has completed
    fn wait(&self, token: SubmissionToken) -> GpuResult<()>;
}
