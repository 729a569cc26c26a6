use std::marker::PhantomData;
use std::mem;

use bytemuck::Pod;
use derivative::Derivative;
use glam::{UVec2, UVec3};
use log::{debug, error, trace};

use crate::{
    shaders, Backend, DrawDesc, DrawKind, LoadOp, PipelineDesc, PipelineKind,
    Result, UniformHandle,
};

/// Pipeline of a single GI pass, together with the descriptor it's been
/// created from (so that it can be re-created when shaders change).
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct GiPass<B, P>
where
    B: Backend,
{
    desc: PipelineDesc,
    pipeline: B::Pipeline,
    #[derivative(Debug = "ignore")]
    _params: PhantomData<P>,
}

impl<B, P> GiPass<B, P>
where
    B: Backend,
    P: Pod,
{
    pub fn new(
        backend: &mut B,
        label: &str,
        kind: PipelineKind,
        module: &str,
    ) -> Result<Self> {
        debug!("Initializing pass: {label}");

        assert!(
            mem::size_of::<P>() <= shaders::MAX_PARAMS_SIZE,
            "params of `{label}` don't fit in push constants"
        );

        let desc = PipelineDesc {
            label: format!("glimmer_{label}"),
            kind,
            module: module.to_owned(),
            entry_point: shaders::ENTRY_POINT.to_owned(),
        };

        let pipeline = backend.create_pipeline(&desc)?;

        Ok(Self {
            desc,
            pipeline,
            _params: PhantomData,
        })
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn pipeline(&self) -> &B::Pipeline {
        &self.pipeline
    }

    /// Re-creates the pipeline; if that fails, the error is logged and the
    /// previous pipeline is kept.
    pub fn reload(&mut self, backend: &mut B) -> bool {
        match backend.create_pipeline(&self.desc) {
            Ok(pipeline) => {
                self.pipeline = pipeline;
                true
            }

            Err(err) => {
                error!(
                    "Couldn't reload `{}`, keeping the previous pipeline: {err}",
                    self.desc.label
                );

                false
            }
        }
    }

    pub fn dispatch_rays(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        extent: UVec2,
        uniforms: UniformHandle,
        params: P,
    ) {
        trace!("Dispatching `{}`; extent={extent}", self.desc.label);

        backend.dispatch_rays(
            cmd,
            &self.pipeline,
            extent,
            uniforms,
            bytemuck::bytes_of(&params),
        );
    }

    pub fn dispatch_compute(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        groups: UVec3,
        uniforms: UniformHandle,
        params: P,
    ) {
        trace!("Dispatching `{}`; groups={groups}", self.desc.label);

        backend.dispatch_compute(
            cmd,
            &self.pipeline,
            groups,
            uniforms,
            bytemuck::bytes_of(&params),
        );
    }

    pub fn draw(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        color_targets: &[&B::Image],
        uniforms: UniformHandle,
        params: P,
        kind: DrawKind<'_, B>,
    ) {
        trace!("Drawing `{}`", self.desc.label);

        backend.draw(
            cmd,
            &DrawDesc {
                pipeline: &self.pipeline,
                color_targets,
                depth_target: None,
                load: LoadOp::Load,
                uniforms,
                params: bytemuck::bytes_of(&params),
                kind,
            },
        );
    }
}
