//! Host side of a reservoir-resampled global illumination pipeline.
//!
//! The renderer doesn't own any device - everything it needs goes through
//! the [`Backend`] trait, implemented by the engine. Two implementations ship
//! with the crate: [`WgpuBackend`] and [`CpuBackend`], the latter being a
//! software emulation used for testing.
//!
//! A frame looks like this:
//!
//! ```text
//! tick: upload GI uniforms
//! draw: g-buffer → direct sampling → barrier → [spatial resampling →
//!       barrier] → composite → [probe placement → barrier] →
//!       [probe drawing]
//! ```

#![allow(clippy::too_many_arguments)]

mod backend;
mod bindless;
mod error;
mod gbuffers;
mod passes;
mod ping_pong;
mod probes;
mod renderer;
mod reservoir_heap;
mod resources;
mod settings;
pub mod shaders;
mod utils;

pub use glimmer_gpu as gpu;

pub use self::backend::*;
pub use self::bindless::*;
pub use self::error::*;
pub use self::gbuffers::*;
pub use self::passes::*;
pub use self::ping_pong::*;
pub use self::probes::*;
pub use self::renderer::*;
pub use self::reservoir_heap::*;
pub use self::resources::*;
pub use self::settings::*;
