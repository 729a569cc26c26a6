use derivative::Derivative;
use glam::UVec2;
use log::{info, trace};

use crate::{
    gpu, Backend, Barrier, ImageDesc, ImageFormat, ImageLayout, ImageUsages,
    ImageView, PingPong, ResourceKind, Result,
};

/// Surface data rasterized by the engine; see [`gpu::GBufferEntry`].
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct GBuffer<B>
where
    B: Backend,
{
    d0: B::Image,
    d1: B::Image,
    depth: B::Image,
    d0_handle: gpu::Handle,
    d1_handle: gpu::Handle,
    layout: ImageLayout,
}

impl<B> GBuffer<B>
where
    B: Backend,
{
    pub const D0_FORMAT: ImageFormat = ImageFormat::Rgba32Float;
    pub const D1_FORMAT: ImageFormat = ImageFormat::Rgba16Float;
    pub const DEPTH_FORMAT: ImageFormat = ImageFormat::Depth32Float;

    fn create(backend: &mut B, label: &str, size: UVec2) -> Result<Self> {
        let mut image = |name: &str, format: ImageFormat| {
            let usage = if format.is_depth() {
                ImageUsages::ATTACHMENT
            } else {
                ImageUsages::ATTACHMENT | ImageUsages::SAMPLED
            };

            backend.create_image(&ImageDesc {
                label: format!("{label}_{name}"),
                size,
                format,
                usage,
            })
        };

        let d0 = image("d0", Self::D0_FORMAT);
        let d1 = image("d1", Self::D1_FORMAT);
        let depth = image("depth", Self::DEPTH_FORMAT);

        let handles = backend.register_image(&d0, ImageView::Sampled).and_then(
            |d0_handle| match backend.register_image(&d1, ImageView::Sampled) {
                Ok(d1_handle) => Ok((d0_handle, d1_handle)),

                Err(err) => {
                    backend.unregister(
                        ResourceKind::SampledImage,
                        d0_handle,
                        1,
                    );
                    Err(err)
                }
            },
        );

        let (d0_handle, d1_handle) = match handles {
            Ok(handles) => handles,

            Err(err) => {
                backend.destroy_image(d0);
                backend.destroy_image(d1);
                backend.destroy_image(depth);
                return Err(err);
            }
        };

        Ok(Self {
            d0,
            d1,
            depth,
            d0_handle,
            d1_handle,
            layout: ImageLayout::Undefined,
        })
    }

    pub fn d0(&self) -> &B::Image {
        &self.d0
    }

    pub fn d1(&self) -> &B::Image {
        &self.d1
    }

    pub fn depth(&self) -> &B::Image {
        &self.depth
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    fn transition(
        &mut self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        barrier: Barrier,
        layout: ImageLayout,
    ) {
        if self.layout == layout {
            return;
        }

        for image in [&self.d0, &self.d1] {
            backend.image_barrier(cmd, image, barrier, self.layout, layout);
        }

        self.layout = layout;
    }

    fn destroy(self, backend: &mut B) {
        backend.unregister(ResourceKind::SampledImage, self.d0_handle, 1);
        backend.unregister(ResourceKind::SampledImage, self.d1_handle, 1);
        backend.destroy_image(self.d0);
        backend.destroy_image(self.d1);
        backend.destroy_image(self.depth);
    }
}

/// G-buffers of the current and the previous frame; the previous one is what
/// temporal reuse validates its history against.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct GBuffers<B>
where
    B: Backend,
{
    buffers: PingPong<GBuffer<B>>,
}

impl<B> GBuffers<B>
where
    B: Backend,
{
    pub fn create(
        backend: &mut B,
        label: impl AsRef<str>,
        size: UVec2,
    ) -> Result<Self> {
        let label = label.as_ref();

        info!("Allocating g-buffers `{label}`; size={size}");

        let buffers = PingPong::try_create(
            backend,
            |backend, idx| {
                GBuffer::create(
                    backend,
                    &format!("{label}_{}", ['a', 'b'][idx]),
                    size,
                )
            },
            |backend, buffer| buffer.destroy(backend),
        )?;

        Ok(Self { buffers })
    }

    pub fn index(&self) -> u32 {
        self.buffers.index()
    }

    pub fn current(&self) -> &GBuffer<B> {
        self.buffers.current()
    }

    pub fn previous(&self) -> &GBuffer<B> {
        self.buffers.previous()
    }

    pub fn toggle(&mut self) {
        self.buffers.toggle();
    }

    /// Returns `(d0 handles, d1 handles)`, indexed by the absolute index of
    /// each g-buffer.
    pub fn handles(&self) -> ([gpu::Handle; 2], [gpu::Handle; 2]) {
        (
            self.buffers.map(|buffer| buffer.d0_handle),
            self.buffers.map(|buffer| buffer.d1_handle),
        )
    }

    /// Gets the current g-buffer ready to be rasterized into.
    pub fn begin(&mut self, backend: &mut B, cmd: &mut B::CommandBuffer) {
        trace!("Beginning g-buffer; index={}", self.index());

        let (curr, prev) = self.buffers.split_mut();

        prev.transition(
            backend,
            cmd,
            Barrier::COLOR_TO_SHADERS,
            ImageLayout::ShaderReadOnly,
        );

        curr.transition(
            backend,
            cmd,
            Barrier::SHADERS_TO_COLOR,
            ImageLayout::ColorAttachment,
        );
    }

    /// Makes the current g-buffer readable for the sampling passes.
    pub fn end(&mut self, backend: &mut B, cmd: &mut B::CommandBuffer) {
        self.buffers.current_mut().transition(
            backend,
            cmd,
            Barrier::COLOR_TO_SHADERS,
            ImageLayout::ShaderReadOnly,
        );
    }

    pub fn destroy(self, backend: &mut B) {
        for buffer in self.buffers.into_inner() {
            buffer.destroy(backend);
        }
    }
}
