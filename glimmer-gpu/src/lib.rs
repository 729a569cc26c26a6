//! Common structs, algorithms etc. used by Glimmer's kernels and renderer.
//!
//! Everything here is plain-old-data or pure functions over plain-old-data,
//! so that the very same code can be compiled into a GPU kernel and executed
//! on the host by the software backend.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::manual_range_contains)]

mod frame;
mod gbuffer;
mod handle;
mod heap;
mod light;
mod noise;
mod passes;
mod probe;
mod reservoir;
pub mod sampling;
mod uniforms;
mod utils;

pub use self::frame::*;
pub use self::gbuffer::*;
pub use self::handle::*;
pub use self::heap::*;
pub use self::light::*;
pub use self::noise::*;
pub use self::passes::*;
pub use self::probe::*;
pub use self::reservoir::*;
pub use self::uniforms::*;
pub use self::utils::*;

/// Number of frames the host may be ahead of the GPU; transient per-frame
/// allocations (e.g. the GI uniforms) rotate through this many slots.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Golden angle, used for spatial filters.
pub const GOLDEN_ANGLE: f32 = 2.39996;
