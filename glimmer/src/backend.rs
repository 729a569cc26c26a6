//! Contract between the GI pipeline and the rendering engine that actually
//! owns the device.
//!
//! Everything the pipeline needs from the engine goes through [`Backend`]:
//! allocating buffers & images, registering them in the bindless heaps,
//! recording barriers and dispatches, and submitting command buffers.

pub mod cpu;
pub mod wgpu_backend;

use std::fmt::Debug;

use glam::{UVec2, UVec3};

use crate::{gpu, Result};

pub use self::cpu::CpuBackend;
pub use self::wgpu_backend::WgpuBackend;

pub trait Backend {
    type Buffer: Debug;
    type Image: Debug;
    type Pipeline: Debug;
    type CommandBuffer;

    fn create_command_buffer(&mut self, label: &str) -> Self::CommandBuffer;

    fn submit(&mut self, cmd: Self::CommandBuffer);

    fn create_buffer(&mut self, desc: &BufferDesc) -> Self::Buffer;

    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// Uploads `data` right away, outside of any command buffer.
    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    fn zero_fill(
        &mut self,
        cmd: &mut Self::CommandBuffer,
        buffer: &Self::Buffer,
    );

    /// Blocks until all submitted work is done and returns buffer's
    /// contents; meant for tests and debugging tools.
    fn read_buffer(&mut self, buffer: &Self::Buffer) -> Result<Vec<u8>>;

    fn create_image(&mut self, desc: &ImageDesc) -> Self::Image;

    fn destroy_image(&mut self, image: Self::Image);

    /// Registers buffers in the bindless heap, under consecutive handles;
    /// returns handle of the first buffer.
    fn register_buffers(&mut self, buffers: &[&Self::Buffer])
        -> Result<gpu::Handle>;

    fn register_image(
        &mut self,
        image: &Self::Image,
        view: ImageView,
    ) -> Result<gpu::Handle>;

    fn unregister(
        &mut self,
        kind: ResourceKind,
        first: gpu::Handle,
        count: u32,
    );

    fn buffer_barrier(
        &mut self,
        cmd: &mut Self::CommandBuffer,
        buffer: &Self::Buffer,
        barrier: Barrier,
    );

    fn image_barrier(
        &mut self,
        cmd: &mut Self::CommandBuffer,
        image: &Self::Image,
        barrier: Barrier,
        from: ImageLayout,
        to: ImageLayout,
    );

    fn create_pipeline(
        &mut self,
        desc: &PipelineDesc,
    ) -> Result<Self::Pipeline>;

    /// Starts a new frame in flight, recycling the transient uniform slot
    /// used `FRAMES_IN_FLIGHT` frames ago.
    fn begin_frame(&mut self);

    /// Uploads uniforms into the current frame's transient slot; returned
    /// handle remains valid only for the current frame.
    fn alloc_uniforms(&mut self, data: &[u8]) -> UniformHandle;

    fn dispatch_rays(
        &mut self,
        cmd: &mut Self::CommandBuffer,
        pipeline: &Self::Pipeline,
        extent: UVec2,
        uniforms: UniformHandle,
        params: &[u8],
    );

    fn dispatch_compute(
        &mut self,
        cmd: &mut Self::CommandBuffer,
        pipeline: &Self::Pipeline,
        groups: UVec3,
        uniforms: UniformHandle,
        params: &[u8],
    );

    fn draw(
        &mut self,
        cmd: &mut Self::CommandBuffer,
        desc: &DrawDesc<'_, Self>,
    );
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsages: u32 {
        const STORAGE = 1 << 0;
        const UNIFORM = 1 << 1;
        const INDEX = 1 << 2;
        const INDIRECT = 1 << 3;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsages,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsages: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const ATTACHMENT = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
}

impl ImageFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub label: String,
    pub size: UVec2,
    pub format: ImageFormat,
    pub usage: ImageUsages,
}

/// How an image gets exposed through the bindless heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageView {
    Sampled,
    Storage,
}

/// Bindless heaps are separate index spaces, one per kind of resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    StorageImage,
    SampledImage,
}

impl From<ImageView> for ResourceKind {
    fn from(view: ImageView) -> Self {
        match view {
            ImageView::Sampled => Self::SampledImage,
            ImageView::Storage => Self::StorageImage,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ShaderReadOnly,
    ColorAttachment,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const TRANSFER_WRITE = 1 << 0;
        const SHADER_READ = 1 << 1;
        const SHADER_WRITE = 1 << 2;
        const INDIRECT_READ = 1 << 3;
        const COLOR_WRITE = 1 << 4;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Stage: u32 {
        const TRANSFER = 1 << 0;
        const COMPUTE = 1 << 1;
        const RAY_TRACING = 1 << 2;
        const DRAW_INDIRECT = 1 << 3;
        const VERTEX = 1 << 4;
        const FRAGMENT = 1 << 5;
        const COLOR_OUTPUT = 1 << 6;
    }
}

/// Execution & memory dependency between two groups of commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Barrier {
    pub src_access: Access,
    pub src_stage: Stage,
    pub dst_access: Access,
    pub dst_stage: Stage,
}

impl Barrier {
    /// Zero-fill → ray tracing & compute.
    pub const FILL_TO_SHADERS: Self = Self {
        src_access: Access::TRANSFER_WRITE,
        src_stage: Stage::TRANSFER,
        dst_access: Access::SHADER_READ.union(Access::SHADER_WRITE),
        dst_stage: Stage::RAY_TRACING
            .union(Stage::COMPUTE)
            .union(Stage::VERTEX)
            .union(Stage::FRAGMENT),
    };

    /// Ray write → ray read & write.
    pub const RAYS_TO_RAYS: Self = Self {
        src_access: Access::SHADER_WRITE,
        src_stage: Stage::RAY_TRACING,
        dst_access: Access::SHADER_READ.union(Access::SHADER_WRITE),
        dst_stage: Stage::RAY_TRACING,
    };

    /// Ray write → fragment read.
    pub const RAYS_TO_FRAGMENT: Self = Self {
        src_access: Access::SHADER_WRITE,
        src_stage: Stage::RAY_TRACING,
        dst_access: Access::SHADER_READ,
        dst_stage: Stage::FRAGMENT,
    };

    /// Fragment read → ray write; issued when last frame's sampled image
    /// becomes this frame's storage image.
    pub const FRAGMENT_TO_RAYS: Self = Self {
        src_access: Access::SHADER_READ,
        src_stage: Stage::FRAGMENT.union(Stage::RAY_TRACING),
        dst_access: Access::SHADER_READ.union(Access::SHADER_WRITE),
        dst_stage: Stage::RAY_TRACING,
    };

    /// Shader read → color attachment write.
    pub const SHADERS_TO_COLOR: Self = Self {
        src_access: Access::SHADER_READ,
        src_stage: Stage::RAY_TRACING.union(Stage::FRAGMENT),
        dst_access: Access::COLOR_WRITE,
        dst_stage: Stage::COLOR_OUTPUT,
    };

    /// Color attachment write → ray tracing & fragment read.
    pub const COLOR_TO_SHADERS: Self = Self {
        src_access: Access::COLOR_WRITE,
        src_stage: Stage::COLOR_OUTPUT,
        dst_access: Access::SHADER_READ,
        dst_stage: Stage::RAY_TRACING.union(Stage::FRAGMENT),
    };

    /// Color attachment write → color attachment write.
    pub const COLOR_TO_COLOR: Self = Self {
        src_access: Access::COLOR_WRITE,
        src_stage: Stage::COLOR_OUTPUT,
        dst_access: Access::COLOR_WRITE,
        dst_stage: Stage::COLOR_OUTPUT,
    };

    /// Compute write → indirect draw.
    pub const COMPUTE_TO_INDIRECT: Self = Self {
        src_access: Access::SHADER_WRITE,
        src_stage: Stage::COMPUTE,
        dst_access: Access::INDIRECT_READ.union(Access::SHADER_READ),
        dst_stage: Stage::DRAW_INDIRECT.union(Stage::VERTEX),
    };
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    RayTracing,
    Compute,
    Raster {
        color_formats: Vec<ImageFormat>,
        depth_format: Option<ImageFormat>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineDesc {
    pub label: String,
    pub kind: PipelineKind,
    pub module: String,
    pub entry_point: String,
}

/// Handle to uniforms uploaded with [`Backend::alloc_uniforms()`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformHandle(pub(crate) u32);

impl UniformHandle {
    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadOp {
    #[default]
    Load,
    Clear,
}

pub struct DrawDesc<'a, B>
where
    B: Backend + ?Sized,
{
    pub pipeline: &'a B::Pipeline,
    pub color_targets: &'a [&'a B::Image],
    pub depth_target: Option<&'a B::Image>,
    pub load: LoadOp,
    pub uniforms: UniformHandle,
    pub params: &'a [u8],
    pub kind: DrawKind<'a, B>,
}

/// Raster pipelines pull their vertices from bindless buffers, so draws only
/// ever carry the index buffer.
pub enum DrawKind<'a, B>
where
    B: Backend + ?Sized,
{
    /// Single triangle covering the entire viewport.
    Fullscreen,

    Indexed {
        indices: &'a B::Buffer,
        index_count: u32,
        instances: u32,
    },

    /// Arguments are read from `args` (a [`gpu::DrawIndexedIndirectArgs`])
    /// at execution time.
    IndexedIndirect {
        indices: &'a B::Buffer,
        args: &'a B::Buffer,
    },
}
