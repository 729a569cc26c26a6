use log::trace;

use crate::{Backend, GBufferScene, GBuffers, UniformHandle};

/// Rasterizes the scene into the current g-buffer.
///
/// The pipeline belongs to the scene (it's the engine that knows about
/// meshes), so this pass only brackets the scene's draw with layout
/// transitions.
#[derive(Clone, Copy, Debug, Default)]
pub struct GBufferPass;

impl GBufferPass {
    pub fn run<B, S>(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        gbuffers: &mut GBuffers<B>,
        scene: &S,
        uniforms: UniformHandle,
    ) where
        B: Backend,
        S: GBufferScene<B> + ?Sized,
    {
        trace!("Rasterizing g-buffer; index={}", gbuffers.index());

        gbuffers.begin(backend, cmd);
        scene.draw_gbuffer(backend, cmd, gbuffers.current(), uniforms);
        gbuffers.end(backend, cmd);
    }
}
