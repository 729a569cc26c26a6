use derivative::Derivative;

use crate::{
    gpu, shaders, Backend, DrawKind, GiConfig, GiPass, GiSettings,
    PipelineKind, Result, UniformHandle,
};

/// Draws this frame's target (tonemapped) into the output image.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct CompositePass<B>
where
    B: Backend,
{
    pass: GiPass<B, gpu::CompositePassParams>,
}

impl<B> CompositePass<B>
where
    B: Backend,
{
    pub fn new(backend: &mut B, config: &GiConfig) -> Result<Self> {
        let pass = GiPass::new(
            backend,
            "composite",
            PipelineKind::Raster {
                color_formats: vec![config.output_format],
                depth_format: None,
            },
            shaders::COMPOSITE,
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
        output: &B::Image,
        uniforms: UniformHandle,
        settings: &GiSettings,
    ) {
        let params = gpu::CompositePassParams {
            mode: settings.mode.serialize(),
            exposure: settings.exposure,
        };

        self.pass.draw(
            backend,
            cmd,
            &[output],
            uniforms,
            params,
            DrawKind::Fullscreen,
        );
    }
}
