use std::mem;

use glam::{vec3, Vec2, Vec3};
use log::info;

use super::{CpuBackend, CpuBuffer, CpuCommandBuffer, CpuPipeline, Invocation};
use crate::{
    gpu, Backend, BufferDesc, BufferUsages, DrawDesc, DrawKind, GBuffer,
    GBufferScene, LoadOp, PipelineDesc, PipelineKind, ResourceKind, Result,
    SceneBindings, UniformHandle,
};

/// Procedural scene for the software backend: a floor seen from above at an
/// angle, a wall on the right and the sky on top of the screen.
#[derive(Debug)]
pub struct PlaneScene {
    pipeline: CpuPipeline,
    lights: CpuBuffer,
    lights_handle: gpu::Handle,
    light_count: u32,
}

impl PlaneScene {
    pub const MODULE: &'static str = "plane_scene";

    pub fn new(
        backend: &mut CpuBackend,
        lights: &[gpu::Light],
    ) -> Result<Self> {
        info!("Creating plane scene; lights={}", lights.len());

        backend.add_kernel(Self::MODULE, rasterize);

        let pipeline = backend.create_pipeline(&PipelineDesc {
            label: Self::MODULE.into(),
            kind: PipelineKind::Raster {
                color_formats: vec![
                    GBuffer::<CpuBackend>::D0_FORMAT,
                    GBuffer::<CpuBackend>::D1_FORMAT,
                ],
                depth_format: Some(GBuffer::<CpuBackend>::DEPTH_FORMAT),
            },
            module: Self::MODULE.into(),
            entry_point: "main".into(),
        })?;

        let buffer = backend.create_buffer(&BufferDesc {
            label: "plane_scene_lights".into(),
            size: (lights.len().max(1) * mem::size_of::<gpu::Light>()) as u64,
            usage: BufferUsages::STORAGE,
        });

        backend.write_buffer(&buffer, 0, bytemuck::cast_slice(lights));

        let lights_handle = backend.register_buffers(&[&buffer])?;

        Ok(Self {
            pipeline,
            lights: buffer,
            lights_handle,
            light_count: lights.len() as u32,
        })
    }

    pub fn bindings(&self) -> SceneBindings {
        SceneBindings {
            tlas: gpu::Handle::INVALID,
            lights: self.lights_handle,
            light_count: self.light_count,
        }
    }

    pub fn destroy(self, backend: &mut CpuBackend) {
        backend.unregister(ResourceKind::Buffer, self.lights_handle, 1);
        backend.destroy_buffer(self.lights);
    }
}

impl GBufferScene<CpuBackend> for PlaneScene {
    fn draw_gbuffer(
        &self,
        backend: &mut CpuBackend,
        cmd: &mut CpuCommandBuffer,
        gbuffer: &GBuffer<CpuBackend>,
        uniforms: UniformHandle,
    ) {
        backend.draw(
            cmd,
            &DrawDesc {
                pipeline: &self.pipeline,
                color_targets: &[gbuffer.d0(), gbuffer.d1()],
                depth_target: Some(gbuffer.depth()),
                load: LoadOp::Clear,
                uniforms,
                params: &[],
                kind: DrawKind::Fullscreen,
            },
        );
    }
}

fn rasterize(inv: &mut Invocation) {
    let size = inv.size.truncate().as_vec2();
    let uv = (inv.pixel().as_vec2() + Vec2::splat(0.5)) / size;

    // Sky
    if uv.y < 0.25 {
        return;
    }

    let (position, normal) = if uv.x > 0.8 {
        (vec3(3.0, (1.0 - uv.y) * 4.0, uv.y * 10.0), Vec3::NEG_X)
    } else {
        (vec3((uv.x - 0.5) * 10.0, 0.0, uv.y * 10.0), Vec3::Y)
    };

    let [d0, d1] = gpu::GBufferEntry {
        position,
        depth: 1.0 + position.z,
        normal,
        roughness: 0.5,
    }
    .pack();

    inv.output(0, d0);
    inv.output(1, d1);
}
