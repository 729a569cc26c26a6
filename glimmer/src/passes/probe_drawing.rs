use derivative::Derivative;

use crate::{
    shaders, Backend, DrawKind, GiConfig, GiPass, PipelineKind, ProbeGrid,
    Result, UniformHandle,
};

/// Visualises the probes as cubes, one instance per probe; the instance
/// count comes straight from the probe controller.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ProbeDrawingPass<B>
where
    B: Backend,
{
    pass: GiPass<B, ()>,
}

impl<B> ProbeDrawingPass<B>
where
    B: Backend,
{
    pub fn new(backend: &mut B, config: &GiConfig) -> Result<Self> {
        let pass = GiPass::new(
            backend,
            "probe_drawing",
            PipelineKind::Raster {
                color_formats: vec![config.output_format],
                depth_format: None,
            },
            shaders::PROBE_DRAWING,
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
        probes: &ProbeGrid<B>,
        output: &B::Image,
        uniforms: UniformHandle,
    ) {
        self.pass.draw(
            backend,
            cmd,
            &[output],
            uniforms,
            (),
            DrawKind::IndexedIndirect {
                indices: probes.indices(),
                args: probes.controller(),
            },
        );
    }
}
