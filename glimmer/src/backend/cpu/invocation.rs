use std::mem;

use bytemuck::Pod;
use glam::{UVec2, UVec3, Vec4};

use super::memory::{Accesses, CpuMemory, Resource};
use crate::{gpu, BindlessTable, ImageLayout};

pub(crate) struct Bindings<'a> {
    pub buffers: &'a BindlessTable<usize>,
    pub storage_images: &'a BindlessTable<usize>,
    pub sampled_images: &'a BindlessTable<usize>,
}

/// Single invocation of a kernel, i.e. one pixel of a ray dispatch, one
/// workgroup of a compute dispatch or one instance of an indexed draw.
///
/// Reads observe memory as it was before the command started, writes go
/// straight into the live memory - so invocations of the same command can't
/// see each other's results, similarly to how it'd work on a GPU.
pub struct Invocation<'a> {
    pub id: UVec3,
    pub size: UVec3,
    pub(crate) uniforms: &'a [u8],
    pub(crate) params: &'a [u8],
    pub(crate) snapshot: &'a CpuMemory,
    pub(crate) memory: &'a mut CpuMemory,
    pub(crate) bindings: &'a Bindings<'a>,
    pub(crate) color_targets: &'a [usize],
    pub(crate) accesses: &'a mut Accesses,
}

impl Invocation<'_> {
    pub fn pixel(&self) -> UVec2 {
        self.id.truncate()
    }

    pub fn uniforms<T>(&self) -> T
    where
        T: Pod,
    {
        read(self.uniforms, 0)
            .unwrap_or_else(|| panic!("kernel has been given no uniforms"))
    }

    pub fn params<T>(&self) -> T
    where
        T: Pod,
    {
        read(self.params, 0).unwrap_or_else(|| {
            panic!("kernel has been given no (or too small) params")
        })
    }

    /// Reads `idx`-th item of given buffer.
    pub fn load<T>(&mut self, buffer: gpu::Handle, idx: usize) -> T
    where
        T: Pod,
    {
        let id = self.buffer_id(buffer);

        self.accesses.read(Resource::Buffer(id));

        let buffer = self.snapshot.buffer(id);

        read(&buffer.data, idx).unwrap_or_else(|| {
            panic!("out-of-bounds read of `{}` at #{idx}", buffer.label)
        })
    }

    /// Writes `idx`-th item of given buffer.
    pub fn store<T>(&mut self, buffer: gpu::Handle, idx: usize, value: T)
    where
        T: Pod,
    {
        let id = self.buffer_id(buffer);

        self.accesses.write(Resource::Buffer(id));

        let buffer = self.memory.buffer_mut(id);
        let size = mem::size_of::<T>();
        let range = (idx * size)..((idx + 1) * size);

        assert!(
            range.end <= buffer.data.len(),
            "out-of-bounds write to `{}` at #{idx}",
            buffer.label
        );

        buffer.data[range].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Atomically modifies `idx`-th item of given buffer; unlike
    /// [`Self::load()`], this observes writes done by other invocations.
    pub fn update<T, R>(
        &mut self,
        buffer: gpu::Handle,
        idx: usize,
        f: impl FnOnce(&mut T) -> R,
    ) -> R
    where
        T: Pod,
    {
        let id = self.buffer_id(buffer);

        let mut value: T =
            read(&self.memory.buffer(id).data, idx).unwrap_or_else(|| {
                panic!(
                    "out-of-bounds access to `{}` at #{idx}",
                    self.memory.buffer(id).label
                )
            });

        let result = f(&mut value);

        self.store(buffer, idx, value);

        result
    }

    /// Reads texel of an image bound as a sampled texture.
    pub fn sample(&mut self, image: gpu::Handle, pos: UVec2) -> Vec4 {
        let id = self.image_id(self.bindings.sampled_images, image);

        self.access_image(id, ImageLayout::ShaderReadOnly, false);

        let image = self.snapshot.image(id);

        image.texels[image.texel_idx(pos)]
    }

    /// Reads texel of an image bound as a storage image.
    pub fn load_texel(&mut self, image: gpu::Handle, pos: UVec2) -> Vec4 {
        let id = self.image_id(self.bindings.storage_images, image);

        self.access_image(id, ImageLayout::General, false);

        let image = self.snapshot.image(id);

        image.texels[image.texel_idx(pos)]
    }

    /// Writes texel of an image bound as a storage image.
    pub fn store_texel(&mut self, image: gpu::Handle, pos: UVec2, value: Vec4) {
        let id = self.image_id(self.bindings.storage_images, image);

        self.access_image(id, ImageLayout::General, true);

        let image = self.memory.image_mut(id);
        let idx = image.texel_idx(pos);

        image.texels[idx] = value;
    }

    /// Writes current pixel of the `target`-th color attachment.
    pub fn output(&mut self, target: usize, value: Vec4) {
        let id = *self.color_targets.get(target).unwrap_or_else(|| {
            panic!("draw has no color attachment #{target}")
        });

        let pos = self.pixel();
        let image = self.memory.image_mut(id);
        let idx = image.texel_idx(pos);

        image.texels[idx] = value;
    }

    fn buffer_id(&self, handle: gpu::Handle) -> usize {
        *self.bindings.buffers.resolve(handle).unwrap_or_else(|| {
            panic!("buffer {handle:?} is not registered in the bindless heap")
        })
    }

    fn image_id(
        &self,
        table: &BindlessTable<usize>,
        handle: gpu::Handle,
    ) -> usize {
        *table.resolve(handle).unwrap_or_else(|| {
            panic!(
                "{:?} {handle:?} is not registered in the bindless heap",
                table.kind()
            )
        })
    }

    fn access_image(&mut self, id: usize, expected: ImageLayout, write: bool) {
        let actual = self.memory.image(id).layout;

        self.accesses.expect_layout(id, actual, expected);

        if write {
            self.accesses.write(Resource::Image(id));
        } else {
            self.accesses.read(Resource::Image(id));
        }
    }
}

fn read<T>(bytes: &[u8], idx: usize) -> Option<T>
where
    T: Pod,
{
    let size = mem::size_of::<T>();
    let bytes = bytes.get((idx * size)..((idx + 1) * size))?;

    Some(bytemuck::pod_read_unaligned(bytes))
}
