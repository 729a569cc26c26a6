use derivative::Derivative;

use crate::{
    gpu, shaders, Backend, GiConfig, GiPass, GiResources, PipelineKind,
    Result, UniformHandle,
};

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct SpatialResamplingPass<B>
where
    B: Backend,
{
    pass: GiPass<B, gpu::SpatialResamplingPassParams>,
}

impl<B> SpatialResamplingPass<B>
where
    B: Backend,
{
    pub fn new(backend: &mut B, _: &GiConfig) -> Result<Self> {
        let pass = GiPass::new(
            backend,
            "spatial_resampling",
            PipelineKind::RayTracing,
            shaders::SPATIAL_RESAMPLING,
        )?;

        Ok(Self { pass })
    }

    pub fn reload(&mut self, backend: &mut B) -> bool {
        self.pass.reload(backend)
    }

    /// Merges reservoirs of neighbouring pixels into each pixel's reservoir,
    /// in place; expects direct sampling's writes to be fenced already.
    pub fn run(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        resources: &GiResources<B>,
        uniforms: UniformHandle,
        params: gpu::SpatialResamplingPassParams,
    ) {
        self.pass.dispatch_rays(
            backend,
            cmd,
            resources.extent(),
            uniforms,
            params,
        );
    }
}
