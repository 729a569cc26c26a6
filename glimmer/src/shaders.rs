//! Names of the shader modules the GI passes are built from.
//!
//! The engine has to register a module under each of these names before
//! [`crate::GiRenderer::new()`] gets called (for [`crate::CpuBackend`] this
//! is done automatically, with the reference kernels).

pub const DIRECT_SAMPLING: &str = "gi_direct_sampling";
pub const SPATIAL_RESAMPLING: &str = "gi_spatial_resampling";
pub const COMPOSITE: &str = "gi_composite";
pub const PROBE_PLACEMENT: &str = "gi_probe_placement";
pub const PROBE_DRAWING: &str = "gi_probe_drawing";

pub const ENTRY_POINT: &str = "main";

/// Size of the push-constant range each pipeline gets, in bytes.
pub const MAX_PARAMS_SIZE: usize = 64;
