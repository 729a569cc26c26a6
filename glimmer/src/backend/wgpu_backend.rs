//! Implementation of the engine contract on top of `wgpu`.
//!
//! - ray dispatches are executed as compute dispatches with
//!   [`WORKGROUP_SIZE`]² workgroups,
//! - bindless heaps are binding arrays (bind group #0), uniforms live in a
//!   per-frame-in-flight ring (bind group #1) and pass params are push
//!   constants,
//! - raster pipelines use `{entry_point}_vs` and `{entry_point}_fs` as their
//!   vertex and fragment entry points.
//!
//! wgpu tracks resource states on its own, so barriers are only logged;
//! layout transitions decide which binding array an image is exposed through
//! (see [`bindless_heap::BindlessHeap`]).

mod bindless_heap;
mod uniform_ring;

use std::sync::{mpsc, Arc};

use fxhash::FxHashMap;
use glam::{UVec2, UVec3};
use log::{debug, info, trace};

use self::bindless_heap::{BindlessHeap, HeapBuffer, HeapImage};
pub use self::bindless_heap::{
    MAX_BUFFERS, MAX_SAMPLED_IMAGES, MAX_STORAGE_IMAGES, STORAGE_FORMAT,
};
use self::uniform_ring::UniformRing;
use crate::{
    gpu, shaders, Backend, Barrier, BufferDesc, BufferUsages, DrawDesc,
    DrawKind, Error, ImageDesc, ImageFormat, ImageLayout, ImageUsages,
    ImageView, LoadOp, PipelineDesc, PipelineKind, ResourceKind, Result,
    UniformHandle,
};

pub const WORKGROUP_SIZE: u32 = 8;

#[derive(Debug)]
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    heap: BindlessHeap,
    uniforms: UniformRing,
    shaders: FxHashMap<String, Arc<wgpu::ShaderModule>>,
    next_image_id: u64,
}

impl WgpuBackend {
    /// Features the device has to be created with.
    pub const REQUIRED_FEATURES: wgpu::Features =
        wgpu::Features::TEXTURE_BINDING_ARRAY
            .union(wgpu::Features::BUFFER_BINDING_ARRAY)
            .union(wgpu::Features::STORAGE_RESOURCE_BINDING_ARRAY)
            .union(wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING)
            .union(wgpu::Features::UNIFORM_BUFFER_AND_STORAGE_TEXTURE_ARRAY_NON_UNIFORM_INDEXING)
            .union(wgpu::Features::PARTIALLY_BOUND_BINDING_ARRAY)
            .union(wgpu::Features::VERTEX_WRITABLE_STORAGE)
            .union(wgpu::Features::PUSH_CONSTANTS);

    /// Limits the device has to be created with.
    pub fn required_limits() -> wgpu::Limits {
        wgpu::Limits {
            max_storage_buffers_per_shader_stage: MAX_BUFFERS,
            max_storage_textures_per_shader_stage: MAX_STORAGE_IMAGES,
            max_sampled_textures_per_shader_stage: MAX_SAMPLED_IMAGES,
            max_push_constant_size: shaders::MAX_PARAMS_SIZE as u32,
            ..Default::default()
        }
    }

    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        info!("Initializing wgpu backend");

        let heap = BindlessHeap::new(&device);
        let uniforms = UniformRing::new(&device);

        Self {
            device,
            queue,
            heap,
            uniforms,
            shaders: Default::default(),
            next_image_id: 0,
        }
    }

    /// Registers shader module under given name (see [`crate::shaders`]),
    /// replacing the previous one (if any).
    ///
    /// Already-created pipelines keep using the previous module until
    /// they're re-created.
    pub fn add_shader(
        &mut self,
        name: impl Into<String>,
        module: wgpu::ShaderModule,
    ) {
        let name = name.into();

        debug!("Registering shader module `{name}`");

        self.shaders.insert(name, Arc::new(module));
    }

    pub fn remove_shader(&mut self, name: &str) -> bool {
        self.shaders.remove(name).is_some()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn dispatch(
        &mut self,
        cmd: &mut WgpuCommandBuffer,
        pipeline: &WgpuPipeline,
        groups: UVec3,
        uniforms: UniformHandle,
        params: &[u8],
    ) {
        let WgpuPipelineInner::Compute(compute) = &pipeline.inner else {
            panic!("`{}` is not a compute pipeline", pipeline.label);
        };

        trace!("Dispatching `{}`; groups={groups}", pipeline.label);

        let heap = self.heap.bind_group(&self.device, false);

        let mut pass =
            cmd.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&pipeline.label),
                timestamp_writes: None,
            });

        pass.set_pipeline(compute);
        pass.set_bind_group(0, heap, &[]);
        pass.set_bind_group(1, self.uniforms.bind_group(uniforms), &[]);

        if !params.is_empty() {
            pass.set_push_constants(0, params);
        }

        pass.dispatch_workgroups(groups.x, groups.y, groups.z);
    }
}

impl Backend for WgpuBackend {
    type Buffer = WgpuBuffer;
    type Image = WgpuImage;
    type Pipeline = WgpuPipeline;
    type CommandBuffer = WgpuCommandBuffer;

    fn create_command_buffer(&mut self, label: &str) -> WgpuCommandBuffer {
        let encoder = self.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor { label: Some(label) },
        );

        WgpuCommandBuffer {
            label: label.to_owned(),
            encoder,
        }
    }

    fn submit(&mut self, cmd: WgpuCommandBuffer) {
        trace!("Submitting `{}`", cmd.label);

        self.queue.submit([cmd.encoder.finish()]);
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> WgpuBuffer {
        // Copies and clears operate on multiples of four bytes
        let size = (desc.size.max(4) + 3) & !3;

        trace!(
            "Allocating buffer `{}`; size={size} (padded from {})",
            desc.label,
            desc.size
        );

        let mut usage =
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;

        for (ours, theirs) in [
            (BufferUsages::STORAGE, wgpu::BufferUsages::STORAGE),
            (BufferUsages::UNIFORM, wgpu::BufferUsages::UNIFORM),
            (BufferUsages::INDEX, wgpu::BufferUsages::INDEX),
            (BufferUsages::INDIRECT, wgpu::BufferUsages::INDIRECT),
        ] {
            if desc.usage.contains(ours) {
                usage |= theirs;
            }
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&desc.label),
            size,
            usage,
            mapped_at_creation: false,
        });

        WgpuBuffer {
            buffer: Arc::new(buffer),
            label: desc.label.clone(),
            size: desc.size,
            indirect: desc.usage.contains(BufferUsages::INDIRECT),
        }
    }

    fn destroy_buffer(&mut self, buffer: WgpuBuffer) {
        // The buffer gets actually released when the GPU is done with it
        trace!("Releasing buffer `{}`", buffer.label);
    }

    fn write_buffer(&mut self, buffer: &WgpuBuffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(&buffer.buffer, offset, data);
    }

    fn zero_fill(&mut self, cmd: &mut WgpuCommandBuffer, buffer: &WgpuBuffer) {
        trace!("Zero-filling `{}`", buffer.label);

        cmd.encoder.clear_buffer(&buffer.buffer, 0, None);
    }

    fn read_buffer(&mut self, buffer: &WgpuBuffer) -> Result<Vec<u8>> {
        let size = buffer.buffer.size();

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glimmer_readback"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(
            &wgpu::CommandEncoderDescriptor {
                label: Some("glimmer_readback"),
            },
        );

        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, size);

        self.queue.submit([encoder.finish()]);

        let (tx, rx) = mpsc::channel();
        let slice = staging.slice(..);

        slice.map_async(wgpu::MapMode::Read, move |result| {
            _ = tx.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|err| Error::Readback(err.to_string()))?
            .map_err(|err| Error::Readback(err.to_string()))?;

        let data = slice.get_mapped_range()[..buffer.size as usize].to_vec();

        staging.unmap();

        Ok(data)
    }

    fn create_image(&mut self, desc: &ImageDesc) -> WgpuImage {
        trace!(
            "Allocating image `{}`; size={}, format={:?}",
            desc.label,
            desc.size,
            desc.format
        );

        let mut usage = wgpu::TextureUsages::empty();

        for (ours, theirs) in [
            (ImageUsages::SAMPLED, wgpu::TextureUsages::TEXTURE_BINDING),
            (ImageUsages::STORAGE, wgpu::TextureUsages::STORAGE_BINDING),
            (ImageUsages::ATTACHMENT, wgpu::TextureUsages::RENDER_ATTACHMENT),
        ] {
            if desc.usage.contains(ours) {
                usage |= theirs;
            }
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&desc.label),
            size: wgpu::Extent3d {
                width: desc.size.x,
                height: desc.size.y,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage,
            view_formats: &[],
        });

        let view = texture.create_view(&Default::default());
        let id = self.next_image_id;

        self.next_image_id += 1;

        WgpuImage {
            id,
            texture,
            view: Arc::new(view),
            label: desc.label.clone(),
            size: desc.size,
            format: desc.format,
        }
    }

    fn destroy_image(&mut self, image: WgpuImage) {
        trace!("Releasing image `{}`", image.label);

        self.heap.forget(image.id);
    }

    fn register_buffers(
        &mut self,
        buffers: &[&WgpuBuffer],
    ) -> Result<gpu::Handle> {
        let handle = self
            .heap
            .buffers
            .register_many(buffers.iter().map(|buffer| HeapBuffer {
                buffer: buffer.buffer.clone(),
                indirect: buffer.indirect,
            }))?;

        self.heap.invalidate();

        Ok(handle)
    }

    fn register_image(
        &mut self,
        image: &WgpuImage,
        view: ImageView,
    ) -> Result<gpu::Handle> {
        let table = match view {
            ImageView::Sampled => &mut self.heap.sampled_images,

            ImageView::Storage => {
                assert_eq!(
                    STORAGE_FORMAT,
                    texture_format(image.format),
                    "storage image `{}` has unsupported format",
                    image.label
                );

                &mut self.heap.storage_images
            }
        };

        let handle = table.register(HeapImage {
            id: image.id,
            view: image.view.clone(),
        })?;

        self.heap.invalidate();

        Ok(handle)
    }

    fn unregister(
        &mut self,
        kind: ResourceKind,
        first: gpu::Handle,
        count: u32,
    ) {
        match kind {
            ResourceKind::Buffer => {
                self.heap.buffers.unregister(first, count);
            }
            ResourceKind::StorageImage => {
                self.heap.storage_images.unregister(first, count);
            }
            ResourceKind::SampledImage => {
                self.heap.sampled_images.unregister(first, count);
            }
        }

        self.heap.invalidate();
    }

    fn buffer_barrier(
        &mut self,
        _: &mut WgpuCommandBuffer,
        buffer: &WgpuBuffer,
        barrier: Barrier,
    ) {
        trace!("Barrier on `{}`: {:?}", buffer.label, barrier);
    }

    fn image_barrier(
        &mut self,
        _: &mut WgpuCommandBuffer,
        image: &WgpuImage,
        barrier: Barrier,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        trace!(
            "Barrier on `{}`: {:?} -> {:?} ({:?})",
            image.label,
            from,
            to,
            barrier
        );

        self.heap.set_layout(image.id, to);
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<WgpuPipeline> {
        debug!("Initializing pipeline: {}:{}", desc.label, desc.entry_point);

        let module = self.shaders.get(&desc.module).cloned().ok_or_else(|| {
            Error::MissingShader {
                module: desc.module.clone(),
            }
        })?;

        let stages = match desc.kind {
            PipelineKind::RayTracing | PipelineKind::Compute => {
                wgpu::ShaderStages::COMPUTE
            }
            PipelineKind::Raster { .. } => wgpu::ShaderStages::VERTEX_FRAGMENT,
        };

        let layout_label = format!("{}_pipeline_layout", desc.label);

        let layout =
            self.device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(&layout_label),
                    bind_group_layouts: &[
                        self.heap.layout(),
                        self.uniforms.layout(),
                    ],
                    push_constant_ranges: &[wgpu::PushConstantRange {
                        stages,
                        range: 0..(shaders::MAX_PARAMS_SIZE as u32),
                    }],
                });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let inner = match &desc.kind {
            PipelineKind::RayTracing | PipelineKind::Compute => {
                WgpuPipelineInner::Compute(self.device.create_compute_pipeline(
                    &wgpu::ComputePipelineDescriptor {
                        label: Some(&desc.label),
                        layout: Some(&layout),
                        module: &module,
                        entry_point: Some(desc.entry_point.as_str()),
                        compilation_options: Default::default(),
                        cache: None,
                    },
                ))
            }

            PipelineKind::Raster {
                color_formats,
                depth_format,
            } => {
                let vs_entry_point = format!("{}_vs", desc.entry_point);
                let fs_entry_point = format!("{}_fs", desc.entry_point);

                let targets: Vec<_> = color_formats
                    .iter()
                    .map(|format| {
                        Some(wgpu::ColorTargetState {
                            format: texture_format(*format),
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })
                    })
                    .collect();

                let depth_stencil =
                    depth_format.map(|format| wgpu::DepthStencilState {
                        format: texture_format(format),
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: Default::default(),
                        bias: Default::default(),
                    });

                WgpuPipelineInner::Render(self.device.create_render_pipeline(
                    &wgpu::RenderPipelineDescriptor {
                        label: Some(&desc.label),
                        layout: Some(&layout),
                        vertex: wgpu::VertexState {
                            module: &module,
                            entry_point: Some(vs_entry_point.as_str()),
                            compilation_options: Default::default(),
                            buffers: &[],
                        },
                        primitive: wgpu::PrimitiveState::default(),
                        depth_stencil,
                        multisample: wgpu::MultisampleState::default(),
                        fragment: Some(wgpu::FragmentState {
                            module: &module,
                            entry_point: Some(fs_entry_point.as_str()),
                            compilation_options: Default::default(),
                            targets: &targets,
                        }),
                        multiview: None,
                        cache: None,
                    },
                ))
            }
        };

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(Error::Pipeline {
                label: desc.label.clone(),
                message: err.to_string(),
            });
        }

        Ok(WgpuPipeline {
            label: desc.label.clone(),
            kind: desc.kind.clone(),
            inner,
        })
    }

    fn begin_frame(&mut self) {
        self.uniforms.advance();
    }

    fn alloc_uniforms(&mut self, data: &[u8]) -> UniformHandle {
        self.uniforms.write(&self.queue, data)
    }

    fn dispatch_rays(
        &mut self,
        cmd: &mut WgpuCommandBuffer,
        pipeline: &WgpuPipeline,
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

        self.dispatch(cmd, pipeline, workgroups(extent), uniforms, params);
    }

    fn dispatch_compute(
        &mut self,
        cmd: &mut WgpuCommandBuffer,
        pipeline: &WgpuPipeline,
        groups: UVec3,
        uniforms: UniformHandle,
        params: &[u8],
    ) {
        self.dispatch(cmd, pipeline, groups, uniforms, params);
    }

    fn draw(&mut self, cmd: &mut WgpuCommandBuffer, desc: &DrawDesc<'_, Self>) {
        let WgpuPipelineInner::Render(pipeline) = &desc.pipeline.inner else {
            panic!("`{}` is not a raster pipeline", desc.pipeline.label);
        };

        trace!("Drawing `{}`", desc.pipeline.label);

        let (color_load, depth_load) = match desc.load {
            LoadOp::Load => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
            LoadOp::Clear => (
                wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                wgpu::LoadOp::Clear(1.0),
            ),
        };

        let color_attachments: Vec<_> = desc
            .color_targets
            .iter()
            .map(|image| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &image.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();

        let depth_stencil_attachment = desc.depth_target.map(|image| {
            wgpu::RenderPassDepthStencilAttachment {
                view: &image.view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }
        });

        let heap = self.heap.bind_group(&self.device, true);

        let mut pass =
            cmd.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&desc.pipeline.label),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, heap, &[]);
        pass.set_bind_group(1, self.uniforms.bind_group(desc.uniforms), &[]);

        if !desc.params.is_empty() {
            pass.set_push_constants(
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                0,
                desc.params,
            );
        }

        match &desc.kind {
            DrawKind::Fullscreen => {
                pass.draw(0..3, 0..1);
            }

            DrawKind::Indexed {
                indices,
                index_count,
                instances,
            } => {
                pass.set_index_buffer(
                    indices.buffer.slice(..),
                    wgpu::IndexFormat::Uint32,
                );

                pass.draw_indexed(0..*index_count, 0, 0..*instances);
            }

            DrawKind::IndexedIndirect { indices, args } => {
                pass.set_index_buffer(
                    indices.buffer.slice(..),
                    wgpu::IndexFormat::Uint32,
                );

                pass.draw_indexed_indirect(&args.buffer, 0);
            }
        }
    }
}

#[derive(Debug)]
pub struct WgpuBuffer {
    buffer: Arc<wgpu::Buffer>,
    label: String,
    size: u64,
    indirect: bool,
}

impl WgpuBuffer {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns buffer's size as requested (the actual allocation might be
    /// padded).
    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug)]
pub struct WgpuImage {
    id: u64,
    texture: wgpu::Texture,
    view: Arc<wgpu::TextureView>,
    label: String,
    size: UVec2,
    format: ImageFormat,
}

impl WgpuImage {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

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

#[derive(Debug)]
pub struct WgpuPipeline {
    label: String,
    kind: PipelineKind,
    inner: WgpuPipelineInner,
}

impl WgpuPipeline {
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug)]
enum WgpuPipelineInner {
    Compute(wgpu::ComputePipeline),
    Render(wgpu::RenderPipeline),
}

#[derive(Debug)]
pub struct WgpuCommandBuffer {
    label: String,
    encoder: wgpu::CommandEncoder,
}

impl WgpuCommandBuffer {
    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }
}

pub fn texture_format(format: ImageFormat) -> wgpu::TextureFormat {
    match format {
        ImageFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        ImageFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        ImageFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        ImageFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

/// Returns number of workgroups covering given extent.
fn workgroups(extent: UVec2) -> UVec3 {
    ((extent + UVec2::splat(WORKGROUP_SIZE - 1)) / WORKGROUP_SIZE).extend(1)
}

#[cfg(test)]
mod tests {
    use glam::uvec2;

    use super::*;

    #[test]
    fn workgroups() {
        assert_eq!(UVec3::new(1, 1, 1), super::workgroups(uvec2(1, 1)));
        assert_eq!(UVec3::new(1, 1, 1), super::workgroups(uvec2(8, 8)));
        assert_eq!(UVec3::new(2, 1, 1), super::workgroups(uvec2(9, 8)));
        assert_eq!(
            UVec3::new(240, 135, 1),
            super::workgroups(uvec2(1920, 1080))
        );
    }

    #[test]
    fn storage_format_is_the_default_target_format() {
        assert_eq!(
            STORAGE_FORMAT,
            texture_format(crate::GiConfig::default().target_format)
        );
    }
}
