use derivative::Derivative;
use glam::{UVec3, Vec3};

use crate::{
    gpu, shaders, Backend, GiConfig, GiPass, PipelineKind, Result,
    UniformHandle,
};

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ProbePlacementPass<B>
where
    B: Backend,
{
    pass: GiPass<B, gpu::ProbePlacementPassParams>,
}

impl<B> ProbePlacementPass<B>
where
    B: Backend,
{
    pub fn new(backend: &mut B, _: &GiConfig) -> Result<Self> {
        let pass = GiPass::new(
            backend,
            "probe_placement",
            PipelineKind::Compute,
            shaders::PROBE_PLACEMENT,
        )?;

        Ok(Self { pass })
    }

    pub fn reload(&mut self, backend: &mut B) -> bool {
        self.pass.reload(backend)
    }

    /// Appends a probe at the grid cell containing `position`; the probe
    /// count lives only on the GPU, in the controller buffer.
    pub fn run(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        uniforms: UniformHandle,
        position: Vec3,
        cell_size: f32,
    ) {
        self.pass.dispatch_compute(
            backend,
            cmd,
            UVec3::ONE,
            uniforms,
            gpu::ProbePlacementPassParams {
                position: position.extend(cell_size),
            },
        );
    }
}
