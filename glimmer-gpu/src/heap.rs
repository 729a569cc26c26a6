use crate::Handle;

/// Number of reservoir slots stored in a single page (buffer) of the
/// reservoir heap.
///
/// Kernels hard-code this value, so changing it requires rebuilding them.
pub const RESERVOIRS_PER_PAGE: u32 = 16383;

/// Returns how many pages are needed to store `capacity` reservoirs.
pub fn page_count(capacity: u32, per_page: u32) -> u32 {
    assert!(per_page > 0);

    capacity.div_ceil(per_page)
}

/// Location of a reservoir within the paged heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReservoirPtr {
    pub page: u32,
    pub slot: u32,
}

impl ReservoirPtr {
    pub fn new(idx: u32, per_page: u32) -> Self {
        Self {
            page: idx / per_page,
            slot: idx % per_page,
        }
    }

    pub fn linear(self, per_page: u32) -> u32 {
        self.page * per_page + self.slot
    }

    /// Returns bindless handle of the page this pointer refers to.
    ///
    /// Relies on the pages being registered sequentially, starting at
    /// `first_page`.
    pub fn handle(self, first_page: Handle) -> Handle {
        first_page.offset(self.page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages() {
        assert_eq!(0, page_count(0, RESERVOIRS_PER_PAGE));
        assert_eq!(1, page_count(1, RESERVOIRS_PER_PAGE));
        assert_eq!(1, page_count(16383, RESERVOIRS_PER_PAGE));
        assert_eq!(2, page_count(16384, RESERVOIRS_PER_PAGE));
        assert_eq!(2, page_count(20000, RESERVOIRS_PER_PAGE));
    }

    #[test]
    fn addressing() {
        let first = Handle::new(40);

        let ptr = ReservoirPtr::new(16382, RESERVOIRS_PER_PAGE);

        assert_eq!(ReservoirPtr { page: 0, slot: 16382 }, ptr);
        assert_eq!(Handle::new(40), ptr.handle(first));

        let ptr = ReservoirPtr::new(20000, RESERVOIRS_PER_PAGE);

        assert_eq!(ReservoirPtr { page: 1, slot: 3617 }, ptr);
        assert_eq!(Handle::new(41), ptr.handle(first));
        assert_eq!(20000, ptr.linear(RESERVOIRS_PER_PAGE));
    }
}
