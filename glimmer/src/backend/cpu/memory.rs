use fxhash::FxHashMap;
use glam::{UVec2, Vec4};

use crate::ImageLayout;

/// Contents of all buffers and images, together with what's needed to track
/// hazards.
///
/// Texels are kept as `Vec4`, at full precision regardless of the image's
/// format (which is why the memory doesn't track it).
#[derive(Clone, Debug, Default)]
pub(crate) struct CpuMemory {
    buffers: Vec<Option<BufferMemory>>,
    images: Vec<Option<ImageMemory>>,
}

impl CpuMemory {
    pub fn alloc_buffer(&mut self, label: String, size: usize) -> usize {
        self.buffers.push(Some(BufferMemory {
            label,
            data: vec![0; size],
            last_write: None,
        }));

        self.buffers.len() - 1
    }

    pub fn alloc_image(&mut self, label: String, size: UVec2) -> usize {
        self.images.push(Some(ImageMemory {
            label,
            size,
            texels: vec![Vec4::ZERO; (size.x * size.y) as usize],
            layout: ImageLayout::Undefined,
            last_write: None,
        }));

        self.images.len() - 1
    }

    pub fn free_buffer(&mut self, id: usize) {
        self.buffers[id] = None;
    }

    pub fn free_image(&mut self, id: usize) {
        self.images[id] = None;
    }

    pub fn try_buffer(&self, id: usize) -> Option<&BufferMemory> {
        self.buffers.get(id)?.as_ref()
    }

    pub fn buffer(&self, id: usize) -> &BufferMemory {
        self.try_buffer(id)
            .unwrap_or_else(|| panic!("buffer #{id} has been destroyed"))
    }

    pub fn buffer_mut(&mut self, id: usize) -> &mut BufferMemory {
        self.buffers
            .get_mut(id)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("buffer #{id} has been destroyed"))
    }

    pub fn try_image(&self, id: usize) -> Option<&ImageMemory> {
        self.images.get(id)?.as_ref()
    }

    pub fn image(&self, id: usize) -> &ImageMemory {
        self.try_image(id)
            .unwrap_or_else(|| panic!("image #{id} has been destroyed"))
    }

    pub fn image_mut(&mut self, id: usize) -> &mut ImageMemory {
        self.images
            .get_mut(id)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("image #{id} has been destroyed"))
    }

    /// Returns label of given resource and the index of the last command
    /// that has written into it without being followed by a barrier.
    pub fn tracking_mut(
        &mut self,
        resource: Resource,
    ) -> (&str, &mut Option<usize>) {
        match resource {
            Resource::Buffer(id) => {
                let buffer = self.buffer_mut(id);

                (&buffer.label, &mut buffer.last_write)
            }

            Resource::Image(id) => {
                let image = self.image_mut(id);

                (&image.label, &mut image.last_write)
            }
        }
    }

    /// Forgets about all pending writes; submissions are ordered with
    /// respect to each other.
    pub fn settle(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.last_write = None;
        }

        for image in self.images.iter_mut().flatten() {
            image.last_write = None;
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct BufferMemory {
    pub label: String,
    pub data: Vec<u8>,
    pub last_write: Option<usize>,
}

#[derive(Clone, Debug)]
pub(crate) struct ImageMemory {
    pub label: String,
    pub size: UVec2,
    pub texels: Vec<Vec4>,
    pub layout: ImageLayout,
    pub last_write: Option<usize>,
}

impl ImageMemory {
    pub fn texel_idx(&self, pos: UVec2) -> usize {
        assert!(
            pos.x < self.size.x && pos.y < self.size.y,
            "out-of-bounds access to `{}` at {pos}",
            self.label
        );

        (pos.y * self.size.x + pos.x) as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Resource {
    Buffer(usize),
    Image(usize),
}

/// Everything a single command has touched.
#[derive(Debug, Default)]
pub(crate) struct Accesses {
    pub touched: FxHashMap<Resource, bool>,
    pub layouts: FxHashMap<usize, (ImageLayout, ImageLayout)>,
}

impl Accesses {
    pub fn read(&mut self, resource: Resource) {
        self.touched.entry(resource).or_insert(false);
    }

    pub fn write(&mut self, resource: Resource) {
        self.touched.insert(resource, true);
    }

    pub fn expect_layout(
        &mut self,
        image: usize,
        actual: ImageLayout,
        expected: ImageLayout,
    ) {
        if actual != expected {
            self.layouts.entry(image).or_insert((expected, actual));
        }
    }
}
