use derivative::Derivative;
use glam::UVec2;
use log::{info, trace};

use crate::{
    gpu, Backend, Barrier, ImageDesc, ImageFormat, ImageLayout, ImageUsages,
    ImageView, ResourceKind, Result,
};

/// Two instances of `T`, one of which is _current_ (written during this
/// frame) and the other _previous_ (written during the last frame).
///
/// Which one is which gets swapped by [`Self::toggle()`]; the index of the
/// current instance is what shaders get as `write_index`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PingPong<T> {
    items: [T; 2],
    index: usize,
}

impl<T> PingPong<T> {
    pub fn new(a: T, b: T) -> Self {
        Self {
            items: [a, b],
            index: 0,
        }
    }

    /// Creates both instances; if creating the second one fails, the first
    /// one gets released through `destroy` before the error is returned.
    pub fn try_create<C, E>(
        ctx: &mut C,
        mut create: impl FnMut(&mut C, usize) -> Result<T, E>,
        destroy: impl FnOnce(&mut C, T),
    ) -> Result<Self, E> {
        let a = create(ctx, 0)?;

        match create(ctx, 1) {
            Ok(b) => Ok(Self::new(a, b)),

            Err(err) => {
                destroy(ctx, a);
                Err(err)
            }
        }
    }

    pub fn index(&self) -> u32 {
        self.index as u32
    }

    pub fn current(&self) -> &T {
        &self.items[self.index]
    }

    pub fn current_mut(&mut self) -> &mut T {
        &mut self.items[self.index]
    }

    pub fn previous(&self) -> &T {
        &self.items[1 - self.index]
    }

    /// Returns both instances as `(current, previous)`.
    pub fn split_mut(&mut self) -> (&mut T, &mut T) {
        let [a, b] = &mut self.items;

        if self.index == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn toggle(&mut self) {
        self.index = 1 - self.index;
    }

    /// Maps both instances, preserving their absolute order.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> [U; 2] {
        [f(&self.items[0]), f(&self.items[1])]
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    pub fn into_inner(self) -> [T; 2] {
        self.items
    }
}

/// Image that's written by the sampling passes as a storage image and read
/// back, in the next frame, as a sampled one.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Target<B>
where
    B: Backend,
{
    image: B::Image,
    texture: gpu::Handle,
    storage: gpu::Handle,
    layout: ImageLayout,
}

impl<B> Target<B>
where
    B: Backend,
{
    fn create(
        backend: &mut B,
        label: String,
        size: UVec2,
        format: ImageFormat,
    ) -> Result<Self> {
        let image = backend.create_image(&ImageDesc {
            label,
            size,
            format,
            usage: ImageUsages::SAMPLED | ImageUsages::STORAGE,
        });

        let texture = match backend.register_image(&image, ImageView::Sampled)
        {
            Ok(handle) => handle,

            Err(err) => {
                backend.destroy_image(image);
                return Err(err);
            }
        };

        let storage = match backend.register_image(&image, ImageView::Storage)
        {
            Ok(handle) => handle,

            Err(err) => {
                backend.unregister(ResourceKind::SampledImage, texture, 1);
                backend.destroy_image(image);
                return Err(err);
            }
        };

        Ok(Self {
            image,
            texture,
            storage,
            layout: ImageLayout::Undefined,
        })
    }

    fn destroy(self, backend: &mut B) {
        backend.unregister(ResourceKind::SampledImage, self.texture, 1);
        backend.unregister(ResourceKind::StorageImage, self.storage, 1);
        backend.destroy_image(self.image);
    }

    pub fn image(&self) -> &B::Image {
        &self.image
    }

    pub fn texture(&self) -> gpu::Handle {
        self.texture
    }

    pub fn storage(&self) -> gpu::Handle {
        self.storage
    }

    pub fn layout(&self) -> ImageLayout {
        self.layout
    }

    fn transition(
        &mut self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        barrier: Barrier,
        layout: ImageLayout,
    ) {
        if self.layout == layout {
            return;
        }

        backend.image_barrier(cmd, &self.image, barrier, self.layout, layout);

        self.layout = layout;
    }
}

/// Ping-ponged render targets of the sampling passes.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct PingPongTargets<B>
where
    B: Backend,
{
    targets: PingPong<Target<B>>,
    size: UVec2,
    format: ImageFormat,
}

impl<B> PingPongTargets<B>
where
    B: Backend,
{
    pub fn create(
        backend: &mut B,
        label: impl AsRef<str>,
        size: UVec2,
        format: ImageFormat,
    ) -> Result<Self> {
        let label = label.as_ref();

        info!("Allocating targets `{label}`; size={size}, format={format:?}");

        let targets = PingPong::try_create(
            backend,
            |backend, idx| {
                Target::create(
                    backend,
                    format!("{label}_{}", ['a', 'b'][idx]),
                    size,
                    format,
                )
            },
            |backend, target| target.destroy(backend),
        )?;

        Ok(Self {
            targets,
            size,
            format,
        })
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn index(&self) -> u32 {
        self.targets.index()
    }

    pub fn current(&self) -> &Target<B> {
        self.targets.current()
    }

    pub fn previous(&self) -> &Target<B> {
        self.targets.previous()
    }

    pub fn toggle(&mut self) {
        self.targets.toggle();
    }

    /// Returns `(texture handles, storage handles)`, indexed by the absolute
    /// index of each target.
    pub fn handles(&self) -> ([gpu::Handle; 2], [gpu::Handle; 2]) {
        (
            self.targets.map(|target| target.texture),
            self.targets.map(|target| target.storage),
        )
    }

    pub fn layouts(&self) -> [ImageLayout; 2] {
        self.targets.map(|target| target.layout)
    }

    /// Gets the targets ready for the sampling passes: previous target
    /// becomes readable, current target becomes writable.
    ///
    /// The previous target is transitioned first, so that both targets are
    /// never writable at once.
    pub fn prepare(&mut self, backend: &mut B, cmd: &mut B::CommandBuffer) {
        trace!("Preparing targets; write_index={}", self.index());

        let (curr, prev) = self.targets.split_mut();

        prev.transition(
            backend,
            cmd,
            Barrier::RAYS_TO_FRAGMENT,
            ImageLayout::ShaderReadOnly,
        );

        curr.transition(
            backend,
            cmd,
            Barrier::FRAGMENT_TO_RAYS,
            ImageLayout::General,
        );
    }

    /// Separates writes of one sampling pass from the reads of the next one.
    pub fn barrier(&self, backend: &mut B, cmd: &mut B::CommandBuffer) {
        let curr = self.targets.current();

        backend.image_barrier(
            cmd,
            &curr.image,
            Barrier::RAYS_TO_RAYS,
            curr.layout,
            curr.layout,
        );
    }

    /// Makes the current target readable for the composition pass.
    pub fn finish(&mut self, backend: &mut B, cmd: &mut B::CommandBuffer) {
        self.targets.current_mut().transition(
            backend,
            cmd,
            Barrier::RAYS_TO_FRAGMENT,
            ImageLayout::ShaderReadOnly,
        );
    }

    pub fn destroy(self, backend: &mut B) {
        for target in self.targets.into_inner() {
            target.destroy(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cpu, CpuBackend, Error};

    #[test]
    fn toggling() {
        let mut target = PingPong::new("a", "b");

        assert_eq!(0, target.index());
        assert_eq!("a", *target.current());
        assert_eq!("b", *target.previous());

        target.toggle();

        assert_eq!(1, target.index());
        assert_eq!("b", *target.current());
        assert_eq!("a", *target.previous());
        assert_eq!(["a", "b"], target.map(|item| *item));

        target.toggle();

        assert_eq!(0, target.index());
        assert_eq!("a", *target.current());
    }

    #[test]
    fn split_mut() {
        let mut target = PingPong::new(1, 2);

        target.toggle();

        let (curr, prev) = target.split_mut();

        *curr += 10;
        *prev += 20;

        assert_eq!([21, 12], target.into_inner());
    }

    #[test]
    fn failed_creation_releases_the_first_instance() {
        let mut released = Vec::new();

        let target: Result<PingPong<&str>, &str> = PingPong::try_create(
            &mut released,
            |_, idx| if idx == 0 { Ok("a") } else { Err("out of slots") },
            |released, item| released.push(item),
        );

        assert_eq!(Err("out of slots"), target);
        assert_eq!(vec!["a"], released);
    }

    #[test]
    fn targets_release_their_slots_when_out_of_them() {
        let mut backend = CpuBackend::new();

        // Leave room for exactly one target
        for idx in 0..cpu::MAX_IMAGES - 1 {
            let image = backend.create_image(&ImageDesc {
                label: format!("filler{idx}"),
                size: UVec2::ONE,
                format: ImageFormat::Rgba16Float,
                usage: ImageUsages::SAMPLED,
            });

            backend.register_image(&image, ImageView::Sampled).unwrap();
        }

        let result = PingPongTargets::create(
            &mut backend,
            "targets",
            UVec2::new(4, 4),
            ImageFormat::Rgba16Float,
        );

        assert!(matches!(
            result,
            Err(Error::BindlessHeapFull {
                kind: ResourceKind::SampledImage,
                requested: 1,
            })
        ));

        let image = backend.create_image(&ImageDesc {
            label: "after".into(),
            size: UVec2::ONE,
            format: ImageFormat::Rgba16Float,
            usage: ImageUsages::SAMPLED | ImageUsages::STORAGE,
        });

        assert_eq!(
            gpu::Handle::new(0),
            backend.register_image(&image, ImageView::Storage).unwrap()
        );

        assert_eq!(
            gpu::Handle::new(cpu::MAX_IMAGES - 1),
            backend.register_image(&image, ImageView::Sampled).unwrap()
        );
    }

    #[test]
    fn never_both_writable() {
        let mut backend = CpuBackend::new();

        let mut targets = PingPongTargets::create(
            &mut backend,
            "targets",
            UVec2::new(4, 4),
            ImageFormat::Rgba16Float,
        )
        .unwrap();

        let mut cmd = backend.create_command_buffer("test");

        for frame in 0..4 {
            targets.prepare(&mut backend, &mut cmd);

            assert_eq!(ImageLayout::General, targets.current().layout());
            assert_eq!(
                ImageLayout::ShaderReadOnly,
                targets.previous().layout()
            );

            targets.finish(&mut backend, &mut cmd);

            assert_eq!(
                [ImageLayout::ShaderReadOnly; 2],
                targets.layouts(),
                "frame {frame}"
            );

            targets.toggle();
        }

        backend.submit(cmd);

        assert!(backend.layout_violations().is_empty());
        assert!(backend.hazards().is_empty());
    }
}
