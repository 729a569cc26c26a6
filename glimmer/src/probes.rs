use std::mem;

use derivative::Derivative;
use log::info;

use crate::{
    gpu, Backend, Barrier, BufferDesc, BufferUsages, ResourceKind, Result,
};

/// Indices of a unit cube, used to visualise each probe; vertices are
/// generated by the vertex shader out of `vertex_index`.
pub const PROBE_CUBE_INDICES: [u32; 36] = [
    0, 1, 2, 2, 1, 3, // -z
    4, 6, 5, 5, 6, 7, // +z
    0, 4, 1, 1, 4, 5, // -y
    2, 3, 6, 6, 3, 7, // +y
    0, 2, 4, 4, 2, 6, // -x
    1, 5, 3, 3, 5, 7, // +x
];

/// Buffers of the diffuse probes.
///
/// The controller buffer holds draw arguments for the probe visualisation;
/// its `instance_count` is bumped by the placement kernel, so the host never
/// knows (nor needs to know) how many probes there are.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ProbeGrid<B>
where
    B: Backend,
{
    probes: B::Buffer,
    controller: B::Buffer,
    indices: B::Buffer,
    probes_handle: gpu::Handle,
    controller_handle: gpu::Handle,
}

impl<B> ProbeGrid<B>
where
    B: Backend,
{
    pub fn create(
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        label: impl AsRef<str>,
    ) -> Result<Self> {
        let label = label.as_ref();

        info!(
            "Allocating probes `{label}`; capacity={}",
            gpu::PROBE_CAPACITY
        );

        let probes = backend.create_buffer(&BufferDesc {
            label: format!("{label}_probes"),
            size: (gpu::PROBE_CAPACITY as usize * mem::size_of::<gpu::Probe>())
                as u64,
            usage: BufferUsages::STORAGE,
        });

        let controller = backend.create_buffer(&BufferDesc {
            label: format!("{label}_controller"),
            size: mem::size_of::<gpu::DrawIndexedIndirectArgs>() as u64,
            usage: BufferUsages::STORAGE | BufferUsages::INDIRECT,
        });

        let indices = backend.create_buffer(&BufferDesc {
            label: format!("{label}_indices"),
            size: mem::size_of_val(&PROBE_CUBE_INDICES) as u64,
            usage: BufferUsages::INDEX,
        });

        backend.write_buffer(
            &controller,
            0,
            bytemuck::bytes_of(&gpu::DrawIndexedIndirectArgs {
                index_count: PROBE_CUBE_INDICES.len() as u32,
                ..Default::default()
            }),
        );

        backend.write_buffer(
            &indices,
            0,
            bytemuck::cast_slice(&PROBE_CUBE_INDICES),
        );

        backend.zero_fill(cmd, &probes);
        backend.buffer_barrier(cmd, &probes, Barrier::FILL_TO_SHADERS);

        let handles = backend.register_buffers(&[&probes]).and_then(
            |probes_handle| match backend.register_buffers(&[&controller]) {
                Ok(controller_handle) => Ok((probes_handle, controller_handle)),

                Err(err) => {
                    backend.unregister(ResourceKind::Buffer, probes_handle, 1);
                    Err(err)
                }
            },
        );

        let (probes_handle, controller_handle) = match handles {
            Ok(handles) => handles,

            Err(err) => {
                backend.destroy_buffer(probes);
                backend.destroy_buffer(controller);
                backend.destroy_buffer(indices);
                return Err(err);
            }
        };

        Ok(Self {
            probes,
            controller,
            indices,
            probes_handle,
            controller_handle,
        })
    }

    pub fn probes(&self) -> &B::Buffer {
        &self.probes
    }

    pub fn controller(&self) -> &B::Buffer {
        &self.controller
    }

    pub fn indices(&self) -> &B::Buffer {
        &self.indices
    }

    pub fn probes_handle(&self) -> gpu::Handle {
        self.probes_handle
    }

    pub fn controller_handle(&self) -> gpu::Handle {
        self.controller_handle
    }

    /// Makes probes placed by the compute pass visible to the indirect draw.
    pub fn barrier(&self, backend: &mut B, cmd: &mut B::CommandBuffer) {
        backend.buffer_barrier(cmd, &self.probes, Barrier::COMPUTE_TO_INDIRECT);

        backend.buffer_barrier(
            cmd,
            &self.controller,
            Barrier::COMPUTE_TO_INDIRECT,
        );
    }

    pub fn destroy(self, backend: &mut B) {
        backend.unregister(ResourceKind::Buffer, self.probes_handle, 1);
        backend.unregister(ResourceKind::Buffer, self.controller_handle, 1);
        backend.destroy_buffer(self.probes);
        backend.destroy_buffer(self.controller);
        backend.destroy_buffer(self.indices);
    }
}
