use std::env;

use derivative::Derivative;
use glam::{UVec2, Vec3};
use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::utils::measure;
use crate::{
    gpu, Backend, Barrier, GBuffer, GBufferPass, GiConfig, GiFlags,
    GiPasses, GiResources, GiSettings, ImageLayout, ProbePasses, Result,
    UniformHandle,
};

/// Environment variable overriding seed of the per-frame noise.
pub const SEED_ENV: &str = "GLIMMER_SEED";

/// What the engine knows about the scene and wants the GI to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneBindings {
    /// Top-level acceleration structure; not used by the reference kernels.
    pub tlas: gpu::Handle,

    /// Bindless buffer of [`gpu::Light`]s.
    pub lights: gpu::Handle,

    pub light_count: u32,
}

/// Everything that might change from one frame to another.
#[derive(Clone, Debug, Default)]
pub struct FrameContext {
    pub settings: GiSettings,
    pub scene: SceneBindings,

    /// Whether the camera has moved since the previous frame; resets the
    /// temporal accumulation.
    pub camera_moved: bool,

    /// When set, a probe gets placed at given world-space position.
    pub probe_request: Option<Vec3>,
}

/// Rasterizes the scene into a g-buffer; implemented by the engine.
///
/// Targets come in [`GBuffer::D0_FORMAT`] and [`GBuffer::D1_FORMAT`] (plus
/// [`GBuffer::DEPTH_FORMAT`] for the depth attachment) and are already in the
/// color-attachment layout; see [`gpu::GBufferEntry`] for what goes where.
pub trait GBufferScene<B>
where
    B: Backend,
{
    fn draw_gbuffer(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        gbuffer: &GBuffer<B>,
        uniforms: UniformHandle,
    );
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct GiRenderer<B>
where
    B: Backend,
{
    config: GiConfig,
    passes: GiPasses<B>,
    probe_passes: Option<ProbePasses<B>>,
    gbuffer_pass: GBufferPass,
    resources: Option<GiResources<B>>,
    settings: GiSettings,
    #[derivative(Debug = "ignore")]
    rng: StdRng,
    frame: gpu::Frame,
    camera_frame: gpu::Frame,
    uniforms: Option<UniformHandle>,

    /// Whether the previous-frame resources contain anything worth reusing;
    /// false right after they've been (re)created.
    has_history: bool,
}

impl<B> GiRenderer<B>
where
    B: Backend,
{
    pub fn new(backend: &mut B, config: GiConfig) -> Result<Self> {
        info!("Initializing GI renderer");

        let passes = GiPasses::new(backend, &config)?;

        let probe_passes = if config.probes {
            Some(ProbePasses::new(backend, &config)?)
        } else {
            None
        };

        let seed = config.seed.or_else(seed_from_env).unwrap_or_else(|| {
            rand::thread_rng().gen()
        });

        debug!("Using seed {seed}");

        Ok(Self {
            config,
            passes,
            probe_passes,
            gbuffer_pass: GBufferPass,
            resources: None,
            settings: Default::default(),
            rng: StdRng::seed_from_u64(seed),
            frame: Default::default(),
            camera_frame: Default::default(),
            uniforms: None,
            has_history: false,
        })
    }

    /// Allocates the reservoir heap(s), targets, g-buffers and probes; the
    /// zero-fills get recorded into `cmd`.
    ///
    /// Previously created resources (if any) are released first.
    pub fn create_gi_resources(
        &mut self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        extent: UVec2,
    ) -> Result<()> {
        self.destroy_gi_resources(backend);

        self.resources =
            Some(GiResources::create(backend, cmd, &self.config, extent)?);

        self.has_history = false;

        Ok(())
    }

    pub fn destroy_gi_resources(&mut self, backend: &mut B) {
        if let Some(resources) = self.resources.take() {
            resources.destroy(backend);
        }

        self.uniforms = None;
    }

    /// Re-creates all resources for a new extent; there's no in-place
    /// resizing.
    pub fn resize(
        &mut self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        extent: UVec2,
    ) -> Result<()> {
        info!("Resizing GI resources; extent={extent}");

        self.create_gi_resources(backend, cmd, extent)
    }

    /// Re-creates pipelines of all passes, e.g. after shaders have been
    /// changed; returns how many of them have been reloaded successfully.
    ///
    /// Pipelines that fail to reload keep their previous version.
    pub fn reload_pipelines(&mut self, backend: &mut B) -> usize {
        let mut reloaded = self.passes.reload(backend);

        if let Some(probe_passes) = &mut self.probe_passes {
            reloaded += probe_passes.reload(backend);
        }

        let total = self.pipeline_count();

        if reloaded < total {
            warn!("Reloaded {reloaded} out of {total} pipelines");
        } else {
            info!("Reloaded {reloaded} pipelines");
        }

        reloaded
    }

    /// Prepares & uploads uniforms for the upcoming frame.
    ///
    /// Can be called many times before [`Self::draw()`]; uniforms uploaded
    /// most recently win.
    pub fn tick(
        &mut self,
        backend: &mut B,
        ctx: &FrameContext,
    ) -> UniformHandle {
        let resources = self.resources.as_ref().unwrap_or_else(|| {
            panic!("tick() called before create_gi_resources()")
        });

        if ctx.camera_moved {
            self.camera_frame = self.frame;
        }

        self.settings = ctx.settings.clone();

        let mut flags = self.settings.flags();

        if !self.has_history {
            flags.remove(GiFlags::TEMPORAL_REUSE);
        }

        let uniforms = resources.uniforms(
            &ctx.scene,
            &self.settings,
            flags,
            self.frame,
            self.camera_frame,
        );

        if self.uniforms.is_none() {
            backend.begin_frame();
        }

        let handle = backend.alloc_uniforms(bytemuck::bytes_of(&uniforms));

        trace!("Uploaded uniforms; frame={}", self.frame.get());

        self.uniforms = Some(handle);

        handle
    }

    /// Records the frame: g-buffer, sampling passes, composition (into
    /// `output`) and the probes.
    ///
    /// `output` must be in [`ImageLayout::ColorAttachment`] and stays in it.
    pub fn draw<S>(
        &mut self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        ctx: &FrameContext,
        scene: &S,
        output: &B::Image,
    ) where
        S: GBufferScene<B> + ?Sized,
    {
        let uniforms = self.uniforms.take().unwrap_or_else(|| {
            panic!("draw() called without a preceding tick()")
        });

        let resources = self.resources.as_mut().unwrap_or_else(|| {
            panic!("draw() called before create_gi_resources()")
        });

        resources.assert_valid();

        if cfg!(debug_assertions) {
            let extent = resources.extent();

            if let Err(err) =
                resources.reservoirs().ensure_capacity(extent.x * extent.y)
            {
                panic!("reservoir heap doesn't fit the targets: {err}");
            }
        }

        trace!("Drawing frame {}", self.frame.get());

        let settings = &self.settings;
        let passes = &self.passes;

        resources.targets.prepare(backend, cmd);

        measure("gbuffer_raster", || {
            self.gbuffer_pass.run(
                backend,
                cmd,
                &mut resources.gbuffers,
                scene,
                uniforms,
            );
        });

        measure("direct_sampling", || {
            passes.direct_sampling.run(
                backend,
                cmd,
                resources,
                uniforms,
                gpu::DirectSamplingPassParams {
                    seed: self.rng.gen(),
                    frame: self.frame.get(),
                },
            );
        });

        resources
            .reservoirs
            .barrier(backend, cmd, Barrier::RAYS_TO_RAYS);

        if settings.spatial_resampling {
            resources.targets.barrier(backend, cmd);

            measure("spatial_resampling", || {
                passes.spatial_resampling.run(
                    backend,
                    cmd,
                    resources,
                    uniforms,
                    gpu::SpatialResamplingPassParams {
                        seed: self.rng.gen(),
                        frame: self.frame.get(),
                    },
                );
            });
        }

        resources
            .reservoirs
            .barrier(backend, cmd, Barrier::RAYS_TO_FRAGMENT);

        resources.targets.finish(backend, cmd);

        measure("composite", || {
            passes
                .composite
                .run(backend, cmd, output, uniforms, settings);
        });

        if let (Some(probe_passes), Some(probes)) =
            (&self.probe_passes, &resources.probes)
        {
            if let Some(position) = ctx.probe_request {
                measure("probe_placement", || {
                    probe_passes.placement.run(
                        backend,
                        cmd,
                        uniforms,
                        position,
                        settings.probe_cell_size,
                    );
                });

                probes.barrier(backend, cmd);
            }

            backend.image_barrier(
                cmd,
                output,
                Barrier::COLOR_TO_COLOR,
                ImageLayout::ColorAttachment,
                ImageLayout::ColorAttachment,
            );

            measure("probe_drawing", || {
                probe_passes
                    .drawing
                    .run(backend, cmd, probes, output, uniforms);
            });
        }

        resources.toggle();

        self.frame = self.frame.next();
        self.has_history = true;
    }

    pub fn config(&self) -> &GiConfig {
        &self.config
    }

    pub fn settings(&self) -> &GiSettings {
        &self.settings
    }

    pub fn resources(&self) -> Option<&GiResources<B>> {
        self.resources.as_ref()
    }

    pub fn passes(&self) -> &GiPasses<B> {
        &self.passes
    }

    pub fn probe_passes(&self) -> Option<&ProbePasses<B>> {
        self.probe_passes.as_ref()
    }

    /// Number of frames drawn so far.
    pub fn frame(&self) -> gpu::Frame {
        self.frame
    }

    pub fn pipeline_count(&self) -> usize {
        let probes = if self.probe_passes.is_some() {
            ProbePasses::<B>::LEN
        } else {
            0
        };

        GiPasses::<B>::LEN + probes
    }
}

fn seed_from_env() -> Option<u64> {
    let seed = env::var(SEED_ENV).ok()?;

    match seed.parse() {
        Ok(seed) => Some(seed),

        Err(err) => {
            warn!("Ignoring {SEED_ENV}=`{seed}`: {err}");
            None
        }
    }
}
