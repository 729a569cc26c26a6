use bytemuck::{Pod, Zeroable};
use glam::Vec4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct DirectSamplingPassParams {
    pub seed: u32,
    pub frame: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct SpatialResamplingPassParams {
    pub seed: u32,
    pub frame: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct ProbePlacementPassParams {
    /// xyz - world-space position
    /// w - grid's cell size
    pub position: Vec4,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct CompositePassParams {
    pub mode: u32,
    pub exposure: f32,
}

impl CompositePassParams {
    pub const MODE_SHADED: u32 = 0;
    pub const MODE_RESERVOIR_WEIGHTS: u32 = 1;
}
