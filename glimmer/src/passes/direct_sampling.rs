use derivative::Derivative;

use crate::{
    gpu, shaders, Backend, GiConfig, GiPass, GiResources, PipelineKind,
    Result, UniformHandle,
};

/// Streams fresh light candidates into this frame's reservoirs and reuses
/// last frame's reservoirs where the surface hasn't changed.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct DirectSamplingPass<B>
where
    B: Backend,
{
    pass: GiPass<B, gpu::DirectSamplingPassParams>,
}

impl<B> DirectSamplingPass<B>
where
    B: Backend,
{
    pub fn new(backend: &mut B, _: &GiConfig) -> Result<Self> {
        let pass = GiPass::new(
            backend,
            "direct_sampling",
            PipelineKind::RayTracing,
            shaders::DIRECT_SAMPLING,
        )?;

        Ok(Self { pass })
    }

    pub fn reload(&mut self, backend: &mut B) -> bool {
        self.pass.reload(backend)
    }

    pub fn run(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        resources: &GiResources<B>,
        uniforms: UniformHandle,
        params: gpu::DirectSamplingPassParams,
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
