use derivative::Derivative;
use log::{info, trace};

use crate::{
    gpu, Backend, Barrier, BufferDesc, BufferUsages, Error, ResourceKind,
    Result,
};

/// GPU-resident array of reservoirs, split into fixed-size pages.
///
/// Pages are separate buffers registered in the bindless heap under
/// consecutive handles, so that kernels can address page `n` as
/// `first_handle + n` (see [`gpu::ReservoirPtr`]).
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ReservoirHeap<B>
where
    B: Backend,
{
    label: String,
    pages: Vec<B::Buffer>,
    first_handle: gpu::Handle,
    per_page: u32,
}

impl<B> ReservoirHeap<B>
where
    B: Backend,
{
    /// Allocates (and zero-fills) a heap able to hold at least
    /// `capacity_hint` reservoirs.
    pub fn create(
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        label: impl AsRef<str>,
        capacity_hint: u32,
    ) -> Result<Self> {
        Self::create_ex(
            backend,
            cmd,
            label,
            capacity_hint,
            gpu::RESERVOIRS_PER_PAGE,
        )
    }

    /// Same as [`Self::create()`], but with a custom page size; kernels
    /// assume [`gpu::RESERVOIRS_PER_PAGE`], so this is meant for tests.
    pub fn create_ex(
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        label: impl AsRef<str>,
        capacity_hint: u32,
        per_page: u32,
    ) -> Result<Self> {
        let label = label.as_ref();
        let page_count = gpu::page_count(capacity_hint, per_page);
        let page_size = per_page as u64 * gpu::GiReservoir::STRIDE as u64;

        info!(
            "Allocating reservoir heap `{label}`; capacity={}, pages={}",
            capacity_hint, page_count
        );

        let pages: Vec<_> = (0..page_count)
            .map(|page| {
                backend.create_buffer(&BufferDesc {
                    label: format!("{label}_page{page}"),
                    size: page_size,
                    usage: BufferUsages::STORAGE,
                })
            })
            .collect();

        let first_handle = {
            let pages: Vec<_> = pages.iter().collect();

            backend.register_buffers(&pages)
        };

        let first_handle = match first_handle {
            Ok(handle) => handle,

            Err(err) => {
                for page in pages {
                    backend.destroy_buffer(page);
                }

                return Err(err);
            }
        };

        let this = Self {
            label: label.to_owned(),
            pages,
            first_handle,
            per_page,
        };

        this.zero_fill(backend, cmd);

        Ok(this)
    }

    /// Returns handle of the first page or [`gpu::Handle::INVALID`] if the
    /// heap has no pages.
    pub fn first_handle(&self) -> gpu::Handle {
        self.first_handle
    }

    pub fn page_handle(&self, page: u32) -> gpu::Handle {
        assert!(
            page < self.page_count(),
            "page {page} is out of bounds of `{}`",
            self.label
        );

        self.first_handle.offset(page)
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn capacity(&self) -> u32 {
        self.page_count() * self.per_page
    }

    pub fn pages(&self) -> &[B::Buffer] {
        &self.pages
    }

    /// Issues `barrier` for each page.
    pub fn barrier(
        &self,
        backend: &mut B,
        cmd: &mut B::CommandBuffer,
        barrier: Barrier,
    ) {
        trace!("Barrier on reservoir heap `{}`", self.label);

        for page in &self.pages {
            backend.buffer_barrier(cmd, page, barrier);
        }
    }

    /// Resets all reservoirs to empty ones (all-zero bytes decode into an
    /// empty reservoir).
    pub fn zero_fill(&self, backend: &mut B, cmd: &mut B::CommandBuffer) {
        for page in &self.pages {
            backend.zero_fill(cmd, page);
        }

        self.barrier(backend, cmd, Barrier::FILL_TO_SHADERS);
    }

    pub fn ensure_capacity(&self, required: u32) -> Result<()> {
        if self.capacity() < required {
            return Err(Error::HeapTooSmall {
                capacity: self.capacity(),
                required,
            });
        }

        Ok(())
    }

    pub fn destroy(self, backend: &mut B) {
        info!("Releasing reservoir heap `{}`", self.label);

        backend.unregister(
            ResourceKind::Buffer,
            self.first_handle,
            self.page_count(),
        );

        for page in self.pages {
            backend.destroy_buffer(page);
        }
    }
}
