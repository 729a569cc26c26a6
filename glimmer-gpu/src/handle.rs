use core::fmt;

use bytemuck::{Pod, Zeroable};

/// Index into one of the bindless descriptor tables.
///
/// Handles are plain integers so that they can travel inside uniform blocks;
/// consecutive registrations yield consecutive handles, which is what allows
/// kernels to address page `n` of a paged resource as `first.offset(n)`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct Handle(u32);

impl Handle {
    /// Sentinel meaning "not registered (yet)".
    pub const INVALID: Self = Self(u32::MAX);

    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn offset(self, n: u32) -> Self {
        debug_assert!(self.is_valid(), "tried to offset an invalid handle");

        Self(self.0 + n)
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Handle({})", self.0)
        } else {
            write!(f, "Handle(INVALID)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_invalid() {
        assert!(!Handle::default().is_valid());
        assert!(Handle::new(0).is_valid());
    }

    #[test]
    fn offset() {
        assert_eq!(Handle::new(7), Handle::new(5).offset(2));
    }
}
