#![allow(dead_code)]

use glam::{uvec2, vec3, UVec2};
use glimmer::cpu::{CommandKind, CpuImage, PlaneScene};
use glimmer::{
    gpu, Backend, Barrier, CpuBackend, FrameContext, GiConfig, GiRenderer,
    ImageDesc, ImageLayout, ImageUsages,
};

pub const EXTENT: UVec2 = uvec2(16, 8);

pub struct Harness {
    pub backend: CpuBackend,
    pub scene: PlaneScene,
    pub renderer: GiRenderer<CpuBackend>,
    pub output: CpuImage,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(GiConfig::default())
    }

    pub fn with_config(config: GiConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut backend = CpuBackend::new();

        let scene = PlaneScene::new(
            &mut backend,
            &[
                gpu::Light::point(
                    vec3(0.0, 3.0, 5.0),
                    vec3(1.0, 0.9, 0.8),
                    4.0,
                ),
                gpu::Light::point(
                    vec3(2.0, 1.0, 8.0),
                    vec3(0.2, 0.4, 1.0),
                    2.0,
                ),
            ],
        )
        .unwrap();

        let mut renderer = GiRenderer::new(
            &mut backend,
            GiConfig {
                seed: Some(1234),
                ..config
            },
        )
        .unwrap();

        let output = output(&mut backend, &renderer, EXTENT);
        let mut cmd = backend.create_command_buffer("setup");

        renderer
            .create_gi_resources(&mut backend, &mut cmd, EXTENT)
            .unwrap();

        backend.submit(cmd);

        Self {
            backend,
            scene,
            renderer,
            output,
        }
    }

    pub fn ctx(&self) -> FrameContext {
        FrameContext {
            scene: self.scene.bindings(),
            ..Default::default()
        }
    }

    /// Ticks and returns the uniforms that got uploaded.
    pub fn tick(&mut self, ctx: &FrameContext) -> gpu::GiUniforms {
        let handle = self.renderer.tick(&mut self.backend, ctx);

        bytemuck::pod_read_unaligned(self.backend.uniforms(handle))
    }

    /// Ticks, draws and submits a single frame.
    pub fn frame(&mut self, ctx: &FrameContext) {
        self.renderer.tick(&mut self.backend, ctx);

        let mut cmd = self.backend.create_command_buffer("frame");

        self.renderer.draw(
            &mut self.backend,
            &mut cmd,
            ctx,
            &self.scene,
            &self.output,
        );

        self.backend.submit(cmd);
    }

    pub fn frames(&mut self, n: usize) {
        let ctx = self.ctx();

        for _ in 0..n {
            self.frame(&ctx);
        }
    }

    pub fn resize(&mut self, extent: UVec2) {
        let output = output(&mut self.backend, &self.renderer, extent);
        let prev = std::mem::replace(&mut self.output, output);

        self.backend.destroy_image(prev);

        let mut cmd = self.backend.create_command_buffer("resize");

        self.renderer
            .resize(&mut self.backend, &mut cmd, extent)
            .unwrap();

        self.backend.submit(cmd);
    }

    /// Reads back all reservoirs of the current heap(s).
    pub fn reservoirs(&mut self) -> Vec<gpu::GiReservoir> {
        let pages: Vec<_> = self
            .renderer
            .resources()
            .unwrap()
            .reservoirs()
            .heaps()
            .flat_map(|heap| heap.pages())
            .map(|page| self.backend.read_buffer(page).unwrap())
            .collect();

        pages
            .iter()
            .flat_map(|page| page.chunks_exact(gpu::GiReservoir::STRIDE))
            .map(|chunk| {
                gpu::GiReservoir::unpack(bytemuck::pod_read_unaligned(chunk))
            })
            .collect()
    }

    /// Labels of dispatches & draws executed so far, in order.
    pub fn passes(&self) -> Vec<&str> {
        self.backend
            .executed()
            .iter()
            .filter(|cmd| {
                matches!(
                    cmd.kind,
                    CommandKind::DispatchRays
                        | CommandKind::DispatchCompute
                        | CommandKind::Draw
                )
            })
            .map(|cmd| cmd.label.as_str())
            .collect()
    }

    pub fn assert_clean(&self) {
        assert!(
            self.backend.hazards().is_empty(),
            "{:#?}",
            self.backend.hazards()
        );

        assert!(
            self.backend.layout_violations().is_empty(),
            "{:#?}",
            self.backend.layout_violations()
        );
    }
}

fn output(
    backend: &mut CpuBackend,
    renderer: &GiRenderer<CpuBackend>,
    extent: UVec2,
) -> CpuImage {
    let output = backend.create_image(&ImageDesc {
        label: "output".into(),
        size: extent,
        format: renderer.config().output_format,
        usage: ImageUsages::ATTACHMENT,
    });

    let mut cmd = backend.create_command_buffer("output");

    backend.image_barrier(
        &mut cmd,
        &output,
        Barrier::SHADERS_TO_COLOR,
        ImageLayout::Undefined,
        ImageLayout::ColorAttachment,
    );

    backend.submit(cmd);

    output
}
