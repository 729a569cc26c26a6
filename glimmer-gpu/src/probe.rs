use bytemuck::{Pod, Zeroable};
use glam::{IVec3, IVec4, Vec3, Vec4};

/// Maximum number of probes the probe buffer can hold.
pub const PROBE_CAPACITY: u32 = 16383;

/// World-space irradiance cache cell.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Probe {
    pub irradiance: [Vec4; 4],

    /// xyz - grid coordinates
    /// w - reserved
    pub grid: IVec4,
}

impl Probe {
    pub fn new(cell: IVec3) -> Self {
        Self {
            irradiance: Default::default(),
            grid: cell.extend(0),
        }
    }

    pub fn cell(&self) -> IVec3 {
        self.grid.truncate()
    }

    /// Returns grid cell containing given world-space position.
    pub fn cell_of(position: Vec3, cell_size: f32) -> IVec3 {
        (position / cell_size).floor().as_ivec3()
    }
}

/// Arguments of an indexed indirect draw, laid out as the graphics APIs
/// expect them.
///
/// For the probe controller only the GPU ever mutates `instance_count`; the
/// host creates the buffer and then only hands it to indirect draws.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}
