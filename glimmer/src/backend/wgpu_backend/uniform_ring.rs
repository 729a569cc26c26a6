use log::info;

use crate::{gpu, UniformHandle};

/// Size of each slot; uniforms have to fit in it.
pub const SLOT_SIZE: u64 = 256;

/// Bind group #1 of every pipeline: one uniform buffer per frame in flight,
/// so that uploading this frame's uniforms doesn't stomp on the ones a
/// previous frame might still be reading.
#[derive(Debug)]
pub struct UniformRing {
    layout: wgpu::BindGroupLayout,
    slots: Vec<(wgpu::Buffer, wgpu::BindGroup)>,
    current: usize,
}

impl UniformRing {
    pub fn new(device: &wgpu::Device) -> Self {
        info!(
            "Allocating uniform ring; slots={}, size={SLOT_SIZE}",
            gpu::FRAMES_IN_FLIGHT
        );

        let layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("glimmer_uniforms_layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT
                        | wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let slots = (0..gpu::FRAMES_IN_FLIGHT)
            .map(|slot| {
                let label = format!("glimmer_uniforms_{slot}");

                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&label),
                    usage: wgpu::BufferUsages::COPY_DST
                        | wgpu::BufferUsages::UNIFORM,
                    size: SLOT_SIZE,
                    mapped_at_creation: false,
                });

                let bind_group =
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&label),
                        layout: &layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.as_entire_binding(),
                        }],
                    });

                (buffer, bind_group)
            })
            .collect();

        Self {
            layout,
            slots,
            current: 0,
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    pub fn write(&self, queue: &wgpu::Queue, data: &[u8]) -> UniformHandle {
        assert!(
            data.len() as u64 <= SLOT_SIZE,
            "uniforms are too large: {} > {SLOT_SIZE} bytes",
            data.len()
        );

        if !data.is_empty() {
            queue.write_buffer(&self.slots[self.current].0, 0, data);
        }

        UniformHandle(self.current as u32)
    }

    pub fn bind_group(&self, handle: UniformHandle) -> &wgpu::BindGroup {
        &self.slots[handle.slot()].1
    }
}
