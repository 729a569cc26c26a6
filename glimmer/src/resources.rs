use derivative::Derivative;
use glam::UVec2;
use log::info;

use crate::{
    gpu, Backend, Barrier, Error, GBuffers, GiConfig, GiFlags, GiSettings,
    PingPong, PingPongTargets, ProbeGrid, ReservoirHeap, ReservoirLayout,
    Result, SceneBindings,
};

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub enum Reservoirs<B>
where
    B: Backend,
{
    Folded(ReservoirHeap<B>),
    Split(PingPong<ReservoirHeap<B>>),
}

impl<B> Reservoirs<B>
where
    B: Backend,
{
    fn create(
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        layout: ReservoirLayout,
        pixels: u32,
        per_page: u32,
    ) -> Result<Self> {
        Ok(match layout {
            ReservoirLayout::Folded => Self::Folded(ReservoirHeap::create_ex(
                backend,
                cmd,
                "gi_reservoirs",
                2 * pixels,
                per_page,
            )?),

            ReservoirLayout::Split => Self::Split(PingPong::try_create(
                backend,
                |backend, idx| {
                    ReservoirHeap::create_ex(
                        backend,
                        cmd,
                        format!("gi_reservoirs_{}", ['a', 'b'][idx]),
                        pixels,
                        per_page,
                    )
                },
                |backend, heap| heap.destroy(backend),
            )?),
        })
    }

    pub fn heaps(&self) -> impl Iterator<Item = &ReservoirHeap<B>> + '_ {
        let (folded, split) = match self {
            Self::Folded(heap) => (Some(heap), None),
            Self::Split(heaps) => (None, Some(heaps.iter())),
        };

        folded.into_iter().chain(split.into_iter().flatten())
    }

    pub fn per_page(&self) -> u32 {
        match self {
            Self::Folded(heap) => heap.per_page(),
            Self::Split(heaps) => heaps.current().per_page(),
        }
    }

    /// Returns base handle of each half, indexed by the ping-pong index.
    pub fn handles(&self) -> [gpu::Handle; 2] {
        match self {
            Self::Folded(heap) => [heap.first_handle(); 2],
            Self::Split(heaps) => heaps.map(|heap| heap.first_handle()),
        }
    }

    /// Returns offset of each half within its heap, indexed by the ping-pong
    /// index.
    pub fn offsets(&self, pixels: u32) -> [u32; 2] {
        match self {
            Self::Folded(_) => [0, pixels],
            Self::Split(_) => [0, 0],
        }
    }

    /// Checks whether the heap(s) can hold reservoirs of `pixels` pixels,
    /// for both halves.
    pub fn ensure_capacity(&self, pixels: u32) -> Result<()> {
        match self {
            Self::Folded(heap) => heap.ensure_capacity(2 * pixels),

            Self::Split(heaps) => heaps
                .iter()
                .try_for_each(|heap| heap.ensure_capacity(pixels)),
        }
    }

    pub fn barrier(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        barrier: Barrier,
    ) {
        for heap in self.heaps() {
            heap.barrier(backend, cmd, barrier);
        }
    }

    fn toggle(&mut self) {
        if let Self::Split(heaps) = self {
            heaps.toggle();
        }
    }

    fn index(&self) -> Option<u32> {
        match self {
            Self::Folded(_) => None,
            Self::Split(heaps) => Some(heaps.index()),
        }
    }

    fn destroy(self, backend: &mut B) {
        match self {
            Self::Folded(heap) => heap.destroy(backend),

            Self::Split(heaps) => {
                for heap in heaps.into_inner() {
                    heap.destroy(backend);
                }
            }
        }
    }
}

/// Everything the GI passes operate on.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct GiResources<B>
where
    B: Backend,
{
    pub(crate) extent: UVec2,
    pub(crate) reservoirs: Reservoirs<B>,
    pub(crate) targets: PingPongTargets<B>,
    pub(crate) gbuffers: GBuffers<B>,
    pub(crate) probes: Option<ProbeGrid<B>>,
}

impl<B> GiResources<B>
where
    B: Backend,
{
    /// Allocates all resources; when any allocation fails, the resources
    /// allocated before it get released.
    pub fn create(
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        config: &GiConfig,
        extent: UVec2,
    ) -> Result<Self> {
        if extent.x == 0 || extent.y == 0 {
            return Err(Error::ZeroExtent {
                width: extent.x,
                height: extent.y,
            });
        }

        info!("Creating GI resources; extent={extent}");

        let pixels = extent.x * extent.y;

        let reservoirs = Reservoirs::create(
            backend,
            cmd,
            config.layout,
            pixels,
            config.reservoirs_per_page,
        )?;

        let targets = match PingPongTargets::create(
            backend,
            "gi_targets",
            extent,
            config.target_format,
        ) {
            Ok(targets) => targets,

            Err(err) => {
                reservoirs.destroy(backend);
                return Err(err);
            }
        };

        let gbuffers = match GBuffers::create(backend, "gi_gbuffer", extent) {
            Ok(gbuffers) => gbuffers,

            Err(err) => {
                reservoirs.destroy(backend);
                targets.destroy(backend);
                return Err(err);
            }
        };

        let mut this = Self {
            extent,
            reservoirs,
            targets,
            gbuffers,
            probes: None,
        };

        if config.probes {
            match ProbeGrid::create(backend, cmd, "gi_probes") {
                Ok(probes) => {
                    this.probes = Some(probes);
                }

                Err(err) => {
                    this.destroy(backend);
                    return Err(err);
                }
            }
        }

        Ok(this)
    }

    pub fn extent(&self) -> UVec2 {
        self.extent
    }

    pub fn reservoirs(&self) -> &Reservoirs<B> {
        &self.reservoirs
    }

    pub fn targets(&self) -> &PingPongTargets<B> {
        &self.targets
    }

    pub fn gbuffers(&self) -> &GBuffers<B> {
        &self.gbuffers
    }

    pub fn probes(&self) -> Option<&ProbeGrid<B>> {
        self.probes.as_ref()
    }

    pub fn write_index(&self) -> u32 {
        self.targets.index()
    }

    pub(crate) fn uniforms(
        &self,
        scene: &SceneBindings,
        settings: &GiSettings,
        mut flags: GiFlags,
        frame: gpu::Frame,
        camera_frame: gpu::Frame,
    ) -> gpu::GiUniforms {
        let pixels = self.extent.x * self.extent.y;
        let (targets_tex, targets_storage) = self.targets.handles();
        let (gbuffers_d0, gbuffers_d1) = self.gbuffers.handles();

        flags.set(GiFlags::PROBES, self.probes.is_some());

        gpu::GiUniforms {
            tlas: scene.tlas,
            lights: scene.lights,
            light_count: scene.light_count,
            probes: self
                .probes
                .as_ref()
                .map(|probes| probes.probes_handle())
                .unwrap_or_default(),
            probe_controller: self
                .probes
                .as_ref()
                .map(|probes| probes.controller_handle())
                .unwrap_or_default(),
            reservoirs_per_page: self.reservoirs.per_page(),
            width: self.extent.x,
            height: self.extent.y,
            targets_tex,
            targets_storage,
            gbuffers_d0,
            gbuffers_d1,
            reservoirs: self.reservoirs.handles(),
            reservoir_offsets: self.reservoirs.offsets(pixels),
            write_index: self.write_index(),
            frame,
            camera_frame,
            flags: flags.bits(),
            temporal_blend: settings.temporal_blend,
            depth_tolerance: settings.depth_tolerance,
            normal_tolerance: settings.normal_tolerance,
            spatial_radius: settings.spatial_radius,
            light_intensity: settings.light_intensity,
            spatial_samples: settings.spatial_samples,
            max_history: settings.max_history,
            _padding: 0,
        }
    }

    /// Panics if any of the handles the sampling passes rely on is invalid.
    pub(crate) fn assert_valid(&self) {
        let (targets_tex, targets_storage) = self.targets.handles();

        for handle in targets_tex
            .into_iter()
            .chain(targets_storage)
            .chain(self.reservoirs.handles())
        {
            assert!(
                handle.is_valid(),
                "GI resources contain an invalid handle: {self:?}"
            );
        }
    }

    /// Flips all ping-pong resources at once, so that they always agree on
    /// which instance is the current one.
    pub(crate) fn toggle(&mut self) {
        self.targets.toggle();
        self.gbuffers.toggle();
        self.reservoirs.toggle();

        assert_eq!(self.targets.index(), self.gbuffers.index());

        if let Some(index) = self.reservoirs.index() {
            assert_eq!(self.targets.index(), index);
        }
    }

    pub fn destroy(self, backend: &mut B) {
        info!("Destroying GI resources");

        self.reservoirs.destroy(backend);
        self.targets.destroy(backend);
        self.gbuffers.destroy(backend);

        if let Some(probes) = self.probes {
            probes.destroy(backend);
        }
    }
}
