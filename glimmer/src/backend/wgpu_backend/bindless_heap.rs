use std::num::NonZeroU32;
use std::sync::Arc;

use fxhash::FxHashMap;
use log::debug;

use crate::{BindlessTable, ImageLayout, ResourceKind};

pub const MAX_BUFFERS: u32 = 1024;
pub const MAX_STORAGE_IMAGES: u32 = 64;
pub const MAX_SAMPLED_IMAGES: u32 = 256;

/// Format all storage images must be in, since a binding array can't mix
/// storage formats.
pub const STORAGE_FORMAT: wgpu::TextureFormat =
    wgpu::TextureFormat::Rgba16Float;

/// Bind group #0 of every pipeline: binding arrays of all registered
/// resources, indexed by [`crate::gpu::Handle`].
///
/// wgpu doesn't allow for a resource to be used in conflicting ways within a
/// single pass, so:
///
/// - images are bound as storage images only while in
///   [`ImageLayout::General`] and as sampled images only while in
///   [`ImageLayout::ShaderReadOnly`] (other slots get a placeholder),
/// - raster passes get a separate bind group, with indirect buffers replaced
///   by a placeholder.
///
/// Bind groups get rebuilt lazily, on the first pass after anything has been
/// (un)registered or transitioned.
#[derive(Debug)]
pub struct BindlessHeap {
    pub buffers: BindlessTable<HeapBuffer>,
    pub storage_images: BindlessTable<HeapImage>,
    pub sampled_images: BindlessTable<HeapImage>,
    layouts: FxHashMap<u64, ImageLayout>,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    placeholders: Placeholders,
    compute_bind_group: Option<wgpu::BindGroup>,
    raster_bind_group: Option<wgpu::BindGroup>,
}

#[derive(Debug)]
pub struct HeapBuffer {
    pub buffer: Arc<wgpu::Buffer>,

    /// Whether the buffer can be used for indirect draws.
    pub indirect: bool,
}

#[derive(Debug)]
pub struct HeapImage {
    pub id: u64,
    pub view: Arc<wgpu::TextureView>,
}

impl BindlessHeap {
    pub fn new(device: &wgpu::Device) -> Self {
        debug!("Initializing bindless heap");

        let visibility =
            wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::VERTEX_FRAGMENT;

        let layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("glimmer_bindless_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage {
                                read_only: false,
                            },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: NonZeroU32::new(MAX_BUFFERS),
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: STORAGE_FORMAT,
                            view_dimension: wgpu::TextureViewDimension::D2,
                        },
                        count: NonZeroU32::new(MAX_STORAGE_IMAGES),
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float {
                                filterable: false,
                            },
                        },
                        count: NonZeroU32::new(MAX_SAMPLED_IMAGES),
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility,
                        ty: wgpu::BindingType::Sampler(
                            wgpu::SamplerBindingType::NonFiltering,
                        ),
                        count: None,
                    },
                ],
            });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glimmer_bindless_sampler"),
            ..Default::default()
        });

        Self {
            buffers: BindlessTable::new(ResourceKind::Buffer, MAX_BUFFERS),
            storage_images: BindlessTable::new(
                ResourceKind::StorageImage,
                MAX_STORAGE_IMAGES,
            ),
            sampled_images: BindlessTable::new(
                ResourceKind::SampledImage,
                MAX_SAMPLED_IMAGES,
            ),
            layouts: Default::default(),
            layout,
            sampler,
            placeholders: Placeholders::new(device),
            compute_bind_group: None,
            raster_bind_group: None,
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn invalidate(&mut self) {
        self.compute_bind_group = None;
        self.raster_bind_group = None;
    }

    pub fn set_layout(&mut self, image: u64, layout: ImageLayout) {
        if self.layouts.insert(image, layout) != Some(layout) {
            self.invalidate();
        }
    }

    pub fn forget(&mut self, image: u64) {
        self.layouts.remove(&image);
    }

    pub fn bind_group(
        &mut self,
        device: &wgpu::Device,
        raster: bool,
    ) -> &wgpu::BindGroup {
        let Self {
            buffers,
            storage_images,
            sampled_images,
            layouts,
            layout,
            sampler,
            placeholders,
            compute_bind_group,
            raster_bind_group,
        } = self;

        let bind_group = if raster {
            raster_bind_group
        } else {
            compute_bind_group
        };

        bind_group.get_or_insert_with(|| {
            debug!(
                "Rebuilding bindless heap; raster={raster}, buffers={}, \
                 storage_images={}, sampled_images={}",
                buffers.len(),
                storage_images.len(),
                sampled_images.len()
            );

            let layouts = &*layouts;

            let in_layout = |image: &HeapImage, expected: ImageLayout| {
                layouts.get(&image.id).copied() == Some(expected)
            };

            let buffers: Vec<_> =
                slots(buffers, &placeholders.buffer, |buffer| {
                    (!(raster && buffer.indirect)).then_some(&*buffer.buffer)
                })
                .map(|buffer| buffer.as_entire_buffer_binding())
                .collect();

            let storage_images: Vec<_> =
                slots(storage_images, &placeholders.storage_view, |image| {
                    in_layout(image, ImageLayout::General)
                        .then_some(&*image.view)
                })
                .collect();

            let sampled_images: Vec<_> =
                slots(sampled_images, &placeholders.sampled_view, |image| {
                    in_layout(image, ImageLayout::ShaderReadOnly)
                        .then_some(&*image.view)
                })
                .collect();

            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("glimmer_bindless"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::BufferArray(&buffers),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureViewArray(
                            &storage_images,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureViewArray(
                            &sampled_images,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        })
    }
}

/// Returns all slots of given table, with holes (and resources `resolve`
/// refuses to expose) filled by `placeholder`; binding arrays can't contain
/// holes and can't be empty.
fn slots<'a, R, T>(
    table: &'a BindlessTable<R>,
    placeholder: &'a T,
    resolve: impl Fn(&'a R) -> Option<&'a T> + 'a,
) -> impl Iterator<Item = &'a T> + 'a {
    let placeholders = if table.is_empty() { 1 } else { 0 };

    table
        .iter()
        .map(move |slot| slot.and_then(&resolve).unwrap_or(placeholder))
        .chain((0..placeholders).map(move |_| placeholder))
}

#[derive(Debug)]
struct Placeholders {
    buffer: wgpu::Buffer,
    storage_view: wgpu::TextureView,
    sampled_view: wgpu::TextureView,
}

impl Placeholders {
    fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("glimmer_placeholder_buffer"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let texture = |label: &str, usage: wgpu::TextureUsages| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: STORAGE_FORMAT,
                    usage,
                    view_formats: &[],
                })
                .create_view(&Default::default())
        };

        Self {
            buffer,
            storage_view: texture(
                "glimmer_placeholder_storage_image",
                wgpu::TextureUsages::STORAGE_BINDING,
            ),
            sampled_view: texture(
                "glimmer_placeholder_sampled_image",
                wgpu::TextureUsages::TEXTURE_BINDING,
            ),
        }
    }
}
