//! Software implementation of the engine contract.
//!
//! Pipelines are Rust functions ("kernels") registered under shader module
//! names; commands get recorded into [`CpuCommandBuffer`] and executed, in
//! order, on [`Backend::submit()`].
//!
//! Besides executing commands, the backend validates them:
//!
//! - a command that touches a resource written by an earlier command, with no
//!   barrier on that resource in between, is reported as a [`Hazard`],
//! - accessing an image in a layout different from the one the access
//!   requires is reported as a [`LayoutViolation`].

mod invocation;
mod kernels;
mod memory;
mod scene;

use std::mem;
use std::sync::Arc;

use derivative::Derivative;
use fxhash::FxHashMap;
use glam::{uvec3, UVec2, UVec3, Vec4};
use log::{debug, trace, warn};

use self::invocation::Bindings;
pub use self::invocation::*;
use self::memory::{Accesses, CpuMemory, Resource};
pub use self::scene::*;
use crate::{
    gpu, Backend, Barrier, BindlessTable, BufferDesc, DrawDesc, DrawKind,
    Error, ImageDesc, ImageFormat, ImageLayout, ImageView, LoadOp,
    PipelineDesc, PipelineKind, ResourceKind, Result, UniformHandle,
};

pub type Kernel = Arc<dyn Fn(&mut Invocation<'_>) + Send + Sync>;

pub const MAX_BUFFERS: u32 = 4096;
pub const MAX_IMAGES: u32 = 1024;

/// Software backend.
///
/// Executed commands, hazards and layout violations are logged for the
/// lifetime of the backend, so long-running applications should call
/// [`Self::clear_log()`] periodically (e.g. once per frame, after inspecting
/// the log).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CpuBackend {
    memory: CpuMemory,
    buffers: BindlessTable<usize>,
    storage_images: BindlessTable<usize>,
    sampled_images: BindlessTable<usize>,
    #[derivative(Debug = "ignore")]
    kernels: FxHashMap<String, Kernel>,
    uniforms: [Vec<u8>; gpu::FRAMES_IN_FLIGHT],
    frame_slot: usize,
    executed: Vec<ExecutedCommand>,
    hazards: Vec<Hazard>,
    layout_violations: Vec<LayoutViolation>,
}

impl CpuBackend {
    /// Creates a backend with the reference GI kernels already registered.
    pub fn new() -> Self {
        let mut this = Self {
            memory: Default::default(),
            buffers: BindlessTable::new(ResourceKind::Buffer, MAX_BUFFERS),
            storage_images: BindlessTable::new(
                ResourceKind::StorageImage,
                MAX_IMAGES,
            ),
            sampled_images: BindlessTable::new(
                ResourceKind::SampledImage,
                MAX_IMAGES,
            ),
            kernels: Default::default(),
            uniforms: Default::default(),
            frame_slot: 0,
            executed: Default::default(),
            hazards: Default::default(),
            layout_violations: Default::default(),
        };

        kernels::install(&mut this);

        this
    }

    /// Registers kernel under given shader module name, replacing the
    /// previous one (if any).
    ///
    /// Already-created pipelines keep their kernels; the new one gets picked
    /// up by the next [`Backend::create_pipeline()`].
    pub fn add_kernel(
        &mut self,
        module: impl Into<String>,
        kernel: impl Fn(&mut Invocation<'_>) + Send + Sync + 'static,
    ) {
        self.kernels.insert(module.into(), Arc::new(kernel));
    }

    pub fn remove_kernel(&mut self, module: &str) -> bool {
        self.kernels.remove(module).is_some()
    }

    /// Returns all commands executed so far, in order.
    pub fn executed(&self) -> &[ExecutedCommand] {
        &self.executed
    }

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub fn layout_violations(&self) -> &[LayoutViolation] {
        &self.layout_violations
    }

    /// Forgets executed commands, hazards and layout violations.
    pub fn clear_log(&mut self) {
        self.executed.clear();
        self.hazards.clear();
        self.layout_violations.clear();
    }

    /// Returns uniforms uploaded most recently under given handle.
    pub fn uniforms(&self, handle: UniformHandle) -> &[u8] {
        &self.uniforms[handle.slot()]
    }

    pub fn image_layout(&self, image: &CpuImage) -> ImageLayout {
        self.memory.image(image.id).layout
    }

    pub fn read_image(&self, image: &CpuImage) -> Vec<Vec4> {
        self.memory.image(image.id).texels.clone()
    }

    fn execute(&mut self, command: Command) {
        match command {
            // Resources released after the command had been recorded, e.g.
            // because creating the resources they belong to has failed
            Command::ZeroFill { buffer } | Command::BufferBarrier { buffer, .. }
                if self.memory.try_buffer(buffer).is_none() =>
            {
                trace!("Skipping command on released buffer #{buffer}");
            }

            Command::ImageBarrier { image, .. }
                if self.memory.try_image(image).is_none() =>
            {
                trace!("Skipping command on released image #{image}");
            }

            Command::ZeroFill { buffer } => {
                let mut accesses = Accesses::default();

                accesses.write(Resource::Buffer(buffer));

                let buffer = self.memory.buffer_mut(buffer);

                buffer.data.fill(0);

                let label = buffer.label.clone();

                self.settle(CommandKind::ZeroFill, label, 1, accesses);
            }

            Command::BufferBarrier { buffer, barrier } => {
                let buffer = self.memory.buffer_mut(buffer);

                trace!("Barrier on `{}`: {:?}", buffer.label, barrier);

                buffer.last_write = None;

                let label = buffer.label.clone();

                self.settle(
                    CommandKind::BufferBarrier,
                    label,
                    0,
                    Default::default(),
                );
            }

            Command::ImageBarrier {
                image,
                barrier,
                from,
                to,
            } => {
                let mut accesses = Accesses::default();
                let memory = self.memory.image_mut(image);

                trace!(
                    "Barrier on `{}`: {:?} -> {:?} ({:?})",
                    memory.label,
                    from,
                    to,
                    barrier
                );

                if from != ImageLayout::Undefined {
                    accesses.expect_layout(image, memory.layout, from);
                }

                memory.layout = to;
                memory.last_write = None;

                let label = memory.label.clone();

                self.settle(CommandKind::ImageBarrier, label, 0, accesses);
            }

            Command::Dispatch {
                kind,
                label,
                kernel,
                size,
                uniforms,
                params,
            } => {
                let mut accesses = Accesses::default();

                self.run(
                    &kernel,
                    size,
                    uniforms,
                    &params,
                    &[],
                    &mut accesses,
                );

                let invocations = size.x * size.y * size.z;

                self.settle(kind, label, invocations, accesses);
            }

            Command::Draw {
                label,
                kernel,
                color_targets,
                load,
                uniforms,
                params,
                kind,
            } => {
                let mut accesses = Accesses::default();

                for &target in &color_targets {
                    let image = self.memory.image_mut(target);

                    accesses.expect_layout(
                        target,
                        image.layout,
                        ImageLayout::ColorAttachment,
                    );

                    accesses.write(Resource::Image(target));

                    if load == LoadOp::Clear {
                        image.texels.fill(Vec4::ZERO);
                    }
                }

                let size = match kind {
                    RecordedDraw::Fullscreen => color_targets
                        .first()
                        .map(|&target| self.memory.image(target).size)
                        .unwrap_or(UVec2::ZERO)
                        .extend(1),

                    RecordedDraw::Indexed { indices, instances } => {
                        accesses.read(Resource::Buffer(indices));

                        uvec3(instances, 1, 1)
                    }

                    RecordedDraw::IndexedIndirect { indices, args } => {
                        accesses.read(Resource::Buffer(indices));
                        accesses.read(Resource::Buffer(args));

                        let args = self.memory.buffer(args);

                        let size =
                            mem::size_of::<gpu::DrawIndexedIndirectArgs>();

                        let args: gpu::DrawIndexedIndirectArgs = args
                            .data
                            .get(..size)
                            .map(bytemuck::pod_read_unaligned)
                            .unwrap_or_else(|| {
                                panic!(
                                    "`{}` is too small to hold draw arguments",
                                    args.label
                                )
                            });

                        if args.index_count == 0 {
                            UVec3::ZERO
                        } else {
                            uvec3(args.instance_count, 1, 1)
                        }
                    }
                };

                self.run(
                    &kernel,
                    size,
                    uniforms,
                    &params,
                    &color_targets,
                    &mut accesses,
                );

                let invocations = size.x * size.y * size.z;

                self.settle(CommandKind::Draw, label, invocations, accesses);
            }
        }
    }

    fn run(
        &mut self,
        kernel: &Kernel,
        size: UVec3,
        uniforms: UniformHandle,
        params: &[u8],
        color_targets: &[usize],
        accesses: &mut Accesses,
    ) {
        let snapshot = self.memory.clone();

        let bindings = Bindings {
            buffers: &self.buffers,
            storage_images: &self.storage_images,
            sampled_images: &self.sampled_images,
        };

        for z in 0..size.z {
            for y in 0..size.y {
                for x in 0..size.x {
                    let mut invocation = Invocation {
                        id: uvec3(x, y, z),
                        size,
                        uniforms: &self.uniforms[uniforms.slot()],
                        params,
                        snapshot: &snapshot,
                        memory: &mut self.memory,
                        bindings: &bindings,
                        color_targets,
                        accesses: &mut *accesses,
                    };

                    kernel(&mut invocation);
                }
            }
        }
    }

    fn settle(
        &mut self,
        kind: CommandKind,
        label: String,
        invocations: u32,
        accesses: Accesses,
    ) {
        let idx = self.executed.len();

        for (resource, written) in accesses.touched {
            let (resource_label, last_write) =
                self.memory.tracking_mut(resource);

            if let Some(writer) = *last_write {
                let hazard = Hazard {
                    command: label.clone(),
                    resource: resource_label.to_owned(),
                    writer: self.executed[writer].label.clone(),
                };

                warn!("Hazard detected: {hazard:?}");

                self.hazards.push(hazard);
            }

            if written {
                *last_write = Some(idx);
            }
        }

        for (image, (expected, actual)) in accesses.layouts {
            let violation = LayoutViolation {
                command: label.clone(),
                image: self.memory.image(image).label.clone(),
                expected,
                actual,
            };

            warn!("Layout violation detected: {violation:?}");

            self.layout_violations.push(violation);
        }

        self.executed.push(ExecutedCommand {
            kind,
            label,
            invocations,
        });
    }

    fn table_mut(&mut self, kind: ResourceKind) -> &mut BindlessTable<usize> {
        match kind {
            ResourceKind::Buffer => &mut self.buffers,
            ResourceKind::StorageImage => &mut self.storage_images,
            ResourceKind::SampledImage => &mut self.sampled_images,
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    type Buffer = CpuBuffer;
    type Image = CpuImage;
    type Pipeline = CpuPipeline;
    type CommandBuffer = CpuCommandBuffer;

    fn create_command_buffer(&mut self, label: &str) -> CpuCommandBuffer {
        CpuCommandBuffer {
            label: label.to_owned(),
            commands: Default::default(),
        }
    }

    fn submit(&mut self, cmd: CpuCommandBuffer) {
        trace!(
            "Submitting `{}`; commands={}",
            cmd.label,
            cmd.commands.len()
        );

        for command in cmd.commands {
            self.execute(command);
        }

        self.memory.settle();
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> CpuBuffer {
        trace!("Allocating buffer `{}`; size={}", desc.label, desc.size);

        let id = self
            .memory
            .alloc_buffer(desc.label.clone(), desc.size as usize);

        CpuBuffer {
            id,
            label: desc.label.clone(),
            size: desc.size,
        }
    }

    fn destroy_buffer(&mut self, buffer: CpuBuffer) {
        trace!("Releasing buffer `{}`", buffer.label);

        self.memory.free_buffer(buffer.id);
    }

    fn write_buffer(&mut self, buffer: &CpuBuffer, offset: u64, data: &[u8]) {
        let memory = self.memory.buffer_mut(buffer.id);
        let range = (offset as usize)..(offset as usize + data.len());

        assert!(
            range.end <= memory.data.len(),
            "out-of-bounds write to `{}`",
            memory.label
        );

        memory.data[range].copy_from_slice(data);
    }

    fn zero_fill(&mut self, cmd: &mut CpuCommandBuffer, buffer: &CpuBuffer) {
        cmd.commands.push(Command::ZeroFill { buffer: buffer.id });
    }

    fn read_buffer(&mut self, buffer: &CpuBuffer) -> Result<Vec<u8>> {
        self.memory
            .try_buffer(buffer.id)
            .map(|memory| memory.data.clone())
            .ok_or_else(|| {
                Error::Readback(format!(
                    "buffer `{}` has been destroyed",
                    buffer.label
                ))
            })
    }

    fn create_image(&mut self, desc: &ImageDesc) -> CpuImage {
        trace!(
            "Allocating image `{}`; size={}, format={:?}",
            desc.label,
            desc.size,
            desc.format
        );

        let id = self.memory.alloc_image(desc.label.clone(), desc.size);

        CpuImage {
            id,
            label: desc.label.clone(),
            size: desc.size,
            format: desc.format,
        }
    }

    fn destroy_image(&mut self, image: CpuImage) {
        trace!("Releasing image `{}`", image.label);

        self.memory.free_image(image.id);
    }

    fn register_buffers(
        &mut self,
        buffers: &[&CpuBuffer],
    ) -> Result<gpu::Handle> {
        self.buffers
            .register_many(buffers.iter().map(|buffer| buffer.id))
    }

    fn register_image(
        &mut self,
        image: &CpuImage,
        view: ImageView,
    ) -> Result<gpu::Handle> {
        self.table_mut(view.into()).register(image.id)
    }

    fn unregister(
        &mut self,
        kind: ResourceKind,
        first: gpu::Handle,
        count: u32,
    ) {
        self.table_mut(kind).unregister(first, count);
    }

    fn buffer_barrier(
        &mut self,
        cmd: &mut CpuCommandBuffer,
        buffer: &CpuBuffer,
        barrier: Barrier,
    ) {
        cmd.commands.push(Command::BufferBarrier {
            buffer: buffer.id,
            barrier,
        });
    }

    fn image_barrier(
        &mut self,
        cmd: &mut CpuCommandBuffer,
        image: &CpuImage,
        barrier: Barrier,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        cmd.commands.push(Command::ImageBarrier {
            image: image.id,
            barrier,
            from,
            to,
        });
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<CpuPipeline> {
        debug!("Initializing pipeline: {}:{}", desc.label, desc.entry_point);

        let kernel = self.kernels.get(&desc.module).cloned().ok_or_else(|| {
            Error::MissingShader {
                module: desc.module.clone(),
            }
        })?;

        Ok(CpuPipeline {
            label: desc.label.clone(),
            kind: desc.kind.clone(),
            kernel,
        })
    }

    fn begin_frame(&mut self) {
        self.frame_slot = (self.frame_slot + 1) % gpu::FRAMES_IN_FLIGHT;
        self.uniforms[self.frame_slot].clear();
    }

    fn alloc_uniforms(&mut self, data: &[u8]) -> UniformHandle {
        self.uniforms[self.frame_slot] = data.to_vec();

        UniformHandle(self.frame_slot as u32)
    }

    fn dispatch_rays(
        &mut self,
        cmd: &mut CpuCommandBuffer,
        pipeline: &CpuPipeline,
        extent: UVec2,
        uniforms: UniformHandle,
        params: &[u8],
    ) {
        assert_eq!(
            PipelineKind::RayTracing,
            pipeline.kind,
            "`{}` is not a ray-tracing pipeline",
            pipeline.label
        );

        cmd.commands.push(Command::Dispatch {
            kind: CommandKind::DispatchRays,
            label: pipeline.label.clone(),
            kernel: pipeline.kernel.clone(),
            size: extent.extend(1),
            uniforms,
            params: params.to_vec(),
        });
    }

    fn dispatch_compute(
        &mut self,
        cmd: &mut CpuCommandBuffer,
        pipeline: &CpuPipeline,
        groups: UVec3,
        uniforms: UniformHandle,
        params: &[u8],
    ) {
        assert_eq!(
            PipelineKind::Compute,
            pipeline.kind,
            "`{}` is not a compute pipeline",
            pipeline.label
        );

        cmd.commands.push(Command::Dispatch {
            kind: CommandKind::DispatchCompute,
            label: pipeline.label.clone(),
            kernel: pipeline.kernel.clone(),
            size: groups,
            uniforms,
            params: params.to_vec(),
        });
    }

    fn draw(&mut self, cmd: &mut CpuCommandBuffer, desc: &DrawDesc<'_, Self>) {
        assert!(
            matches!(desc.pipeline.kind, PipelineKind::Raster { .. }),
            "`{}` is not a raster pipeline",
            desc.pipeline.label
        );

        let kind = match desc.kind {
            DrawKind::Fullscreen => RecordedDraw::Fullscreen,

            DrawKind::Indexed {
                indices, instances, ..
            } => RecordedDraw::Indexed {
                indices: indices.id,
                instances,
            },

            DrawKind::IndexedIndirect { indices, args } => {
                RecordedDraw::IndexedIndirect {
                    indices: indices.id,
                    args: args.id,
                }
            }
        };

        cmd.commands.push(Command::Draw {
            label: desc.pipeline.label.clone(),
            kernel: desc.pipeline.kernel.clone(),
            color_targets: desc
                .color_targets
                .iter()
                .map(|image| image.id)
                .collect(),
            load: desc.load,
            uniforms: desc.uniforms,
            params: desc.params.to_vec(),
            kind,
        });
    }
}

#[derive(Debug)]
pub struct CpuBuffer {
    id: usize,
    label: String,
    size: u64,
}

impl CpuBuffer {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug)]
pub struct CpuImage {
    id: usize,
    label: String,
    size: UVec2,
    format: ImageFormat,
}

impl CpuImage {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct CpuPipeline {
    label: String,
    kind: PipelineKind,
    #[derivative(Debug = "ignore")]
    kernel: Kernel,
}

impl CpuPipeline {
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct CpuCommandBuffer {
    label: String,
    #[derivative(Debug = "ignore")]
    commands: Vec<Command>,
}

impl CpuCommandBuffer {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

enum Command {
    ZeroFill {
        buffer: usize,
    },

    BufferBarrier {
        buffer: usize,
        barrier: Barrier,
    },

    ImageBarrier {
        image: usize,
        barrier: Barrier,
        from: ImageLayout,
        to: ImageLayout,
    },

    Dispatch {
        kind: CommandKind,
        label: String,
        kernel: Kernel,
        size: UVec3,
        uniforms: UniformHandle,
        params: Vec<u8>,
    },

    Draw {
        label: String,
        kernel: Kernel,
        color_targets: Vec<usize>,
        load: LoadOp,
        uniforms: UniformHandle,
        params: Vec<u8>,
        kind: RecordedDraw,
    },
}

enum RecordedDraw {
    Fullscreen,
    Indexed { indices: usize, instances: u32 },
    IndexedIndirect { indices: usize, args: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    ZeroFill,
    BufferBarrier,
    ImageBarrier,
    DispatchRays,
    DispatchCompute,
    Draw,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub kind: CommandKind,

    /// Pipeline's label for dispatches and draws, resource's label for
    /// everything else.
    pub label: String,

    pub invocations: u32,
}

/// Command that has touched a resource written by an earlier command, with
/// no barrier in between.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hazard {
    pub command: String,
    pub resource: String,
    pub writer: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutViolation {
    pub command: String,
    pub image: String,
    pub expected: ImageLayout,
    pub actual: ImageLayout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferUsages, ImageUsages};

    fn buffer(backend: &mut CpuBackend, label: &str) -> CpuBuffer {
        backend.create_buffer(&BufferDesc {
            label: label.into(),
            size: 64,
            usage: BufferUsages::STORAGE,
        })
    }

    fn pipeline(backend: &mut CpuBackend, module: &str) -> CpuPipeline {
        backend
            .create_pipeline(&PipelineDesc {
                label: module.into(),
                kind: PipelineKind::RayTracing,
                module: module.into(),
                entry_point: "main".into(),
            })
            .unwrap()
    }

    #[test]
    fn clearing_the_log() {
        let mut backend = CpuBackend::new();
        let target = buffer(&mut backend, "target");
        let mut cmd = backend.create_command_buffer("test");

        backend.zero_fill(&mut cmd, &target);
        backend.submit(cmd);

        assert_eq!(1, backend.executed().len());

        backend.clear_log();

        assert!(backend.executed().is_empty());
    }

    #[test]
    fn commands_on_released_resources_are_skipped() {
        let mut backend = CpuBackend::new();
        let target = buffer(&mut backend, "target");
        let mut cmd = backend.create_command_buffer("test");

        backend.zero_fill(&mut cmd, &target);
        backend.buffer_barrier(&mut cmd, &target, Barrier::FILL_TO_SHADERS);
        backend.destroy_buffer(target);
        backend.submit(cmd);

        assert!(backend.executed().is_empty());
        assert!(backend.hazards().is_empty());
    }

    #[test]
    fn dispatch_reads_memory_from_before_the_command() {
        let mut backend = CpuBackend::new();
        let buf = buffer(&mut backend, "buf");
        let handle = backend.register_buffers(&[&buf]).unwrap();

        backend.write_buffer(&buf, 0, bytemuck::bytes_of(&[1u32; 4]));

        // Each invocation adds its left neighbour's value to its own one; if
        // invocations observed each other's writes, values would snowball
        backend.add_kernel("shift", move |inv| {
            let x = inv.id.x as usize;

            if x > 0 {
                let lhs: u32 = inv.load(handle, x - 1);
                let rhs: u32 = inv.load(handle, x);

                inv.store(handle, x, lhs + rhs);
            }
        });

        let shift = pipeline(&mut backend, "shift");
        let uniforms = backend.alloc_uniforms(&[]);
        let mut cmd = backend.create_command_buffer("test");

        backend.dispatch_rays(
            &mut cmd,
            &shift,
            UVec2::new(4, 1),
            uniforms,
            &[],
        );
        backend.submit(cmd);

        let data = backend.read_buffer(&buf).unwrap();

        assert_eq!(
            [1u32, 2, 2, 2],
            bytemuck::pod_read_unaligned::<[u32; 4]>(&data[..16])
        );
    }

    #[test]
    fn missing_barrier_is_a_hazard() {
        let mut backend = CpuBackend::new();
        let buf = buffer(&mut backend, "buf");
        let handle = backend.register_buffers(&[&buf]).unwrap();

        backend.add_kernel("write", move |inv| inv.store(handle, 0, 1u32));
        backend.add_kernel("read", move |inv| {
            let _: u32 = inv.load(handle, 0);
        });

        let write = pipeline(&mut backend, "write");
        let read = pipeline(&mut backend, "read");
        let uniforms = backend.alloc_uniforms(&[]);

        // ---

        let mut cmd = backend.create_command_buffer("synchronized");

        backend.zero_fill(&mut cmd, &buf);
        backend.buffer_barrier(&mut cmd, &buf, Barrier::FILL_TO_SHADERS);
        backend.dispatch_rays(&mut cmd, &write, UVec2::ONE, uniforms, &[]);
        backend.buffer_barrier(&mut cmd, &buf, Barrier::RAYS_TO_RAYS);
        backend.dispatch_rays(&mut cmd, &read, UVec2::ONE, uniforms, &[]);
        backend.submit(cmd);

        assert!(backend.hazards().is_empty());

        // ---

        let mut cmd = backend.create_command_buffer("unsynchronized");

        backend.dispatch_rays(&mut cmd, &write, UVec2::ONE, uniforms, &[]);
        backend.dispatch_rays(&mut cmd, &read, UVec2::ONE, uniforms, &[]);
        backend.submit(cmd);

        assert_eq!(
            vec![Hazard {
                command: "read".into(),
                resource: "buf".into(),
                writer: "write".into(),
            }],
            backend.hazards()
        );
    }

    #[test]
    fn accessing_image_in_wrong_layout_is_a_violation() {
        let mut backend = CpuBackend::new();

        let image = backend.create_image(&ImageDesc {
            label: "img".into(),
            size: UVec2::new(2, 2),
            format: ImageFormat::Rgba16Float,
            usage: ImageUsages::STORAGE | ImageUsages::SAMPLED,
        });

        let handle =
            backend.register_image(&image, ImageView::Storage).unwrap();

        backend.add_kernel("write", move |inv| {
            let pos = inv.pixel();

            inv.store_texel(handle, pos, Vec4::ONE);
        });

        let write = pipeline(&mut backend, "write");
        let uniforms = backend.alloc_uniforms(&[]);
        let mut cmd = backend.create_command_buffer("test");

        backend.dispatch_rays(
            &mut cmd,
            &write,
            UVec2::new(2, 2),
            uniforms,
            &[],
        );

        backend.image_barrier(
            &mut cmd,
            &image,
            Barrier::FRAGMENT_TO_RAYS,
            ImageLayout::Undefined,
            ImageLayout::General,
        );

        backend.dispatch_rays(
            &mut cmd,
            &write,
            UVec2::new(2, 2),
            uniforms,
            &[],
        );
        backend.submit(cmd);

        assert_eq!(
            vec![LayoutViolation {
                command: "write".into(),
                image: "img".into(),
                expected: ImageLayout::General,
                actual: ImageLayout::Undefined,
            }],
            backend.layout_violations()
        );

        assert_eq!(ImageLayout::General, backend.image_layout(&image));
        assert_eq!(vec![Vec4::ONE; 4], backend.read_image(&image));
    }

    #[test]
    fn indirect_draw_takes_instance_count_from_the_buffer() {
        let mut backend = CpuBackend::new();
        let indices = buffer(&mut backend, "indices");
        let args = buffer(&mut backend, "args");

        backend.write_buffer(
            &args,
            0,
            bytemuck::bytes_of(&gpu::DrawIndexedIndirectArgs {
                index_count: 36,
                instance_count: 3,
                ..Default::default()
            }),
        );

        backend.add_kernel("noop", |_| ());

        let noop = backend
            .create_pipeline(&PipelineDesc {
                label: "noop".into(),
                kind: PipelineKind::Raster {
                    color_formats: Default::default(),
                    depth_format: None,
                },
                module: "noop".into(),
                entry_point: "main".into(),
            })
            .unwrap();

        let uniforms = backend.alloc_uniforms(&[]);
        let mut cmd = backend.create_command_buffer("test");

        backend.draw(
            &mut cmd,
            &DrawDesc {
                pipeline: &noop,
                color_targets: &[],
                depth_target: None,
                load: LoadOp::Load,
                uniforms,
                params: &[],
                kind: DrawKind::IndexedIndirect {
                    indices: &indices,
                    args: &args,
                },
            },
        );

        backend.submit(cmd);

        assert_eq!(
            &[ExecutedCommand {
                kind: CommandKind::Draw,
                label: "noop".into(),
                invocations: 3,
            }],
            backend.executed()
        );
    }

    #[test]
    fn missing_kernel() {
        let mut backend = CpuBackend::new();

        let result = backend.create_pipeline(&PipelineDesc {
            label: "nope".into(),
            kind: PipelineKind::Compute,
            module: "nope".into(),
            entry_point: "main".into(),
        });

        assert!(matches!(
            result,
            Err(Error::MissingShader { module }) if module == "nope"
        ));
    }
}
