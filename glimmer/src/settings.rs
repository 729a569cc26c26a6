use crate::{gpu, ImageFormat};

/// Layout of the reservoir heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReservoirLayout {
    /// Single heap of `2 * pixels` reservoirs, the write half being selected
    /// by the ping-pong index.
    #[default]
    Folded,

    /// Two heaps of `pixels` reservoirs each, one per ping-pong index.
    Split,
}

/// Settings that are fixed for the lifetime of the renderer; changing them
/// requires creating a new [`crate::GiRenderer`].
#[derive(Clone, Debug, PartialEq)]
pub struct GiConfig {
    pub layout: ReservoirLayout,
    pub target_format: ImageFormat,

    /// Format of the image the composite (and probe) passes draw into.
    pub output_format: ImageFormat,

    /// Whether the diffuse probes should get allocated & drawn.
    pub probes: bool,

    /// Seed of the per-frame seed generator; when `None`, the `GLIMMER_SEED`
    /// environment variable is consulted and, if it's missing too, a random
    /// seed is used.
    pub seed: Option<u64>,

    /// Reservoirs per page; kernels assume [`gpu::RESERVOIRS_PER_PAGE`], so
    /// other values are only useful for tests.
    pub reservoirs_per_page: u32,
}

impl Default for GiConfig {
    fn default() -> Self {
        Self {
            layout: Default::default(),
            target_format: ImageFormat::Rgba16Float,
            output_format: ImageFormat::Rgba8Unorm,
            probes: true,
            seed: None,
            reservoirs_per_page: gpu::RESERVOIRS_PER_PAGE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GiMode {
    /// Shaded & tonemapped image.
    #[default]
    Shaded,

    /// Debug view of each pixel's reservoir weight.
    ReservoirWeights,
}

impl GiMode {
    pub(crate) fn serialize(self) -> u32 {
        match self {
            GiMode::Shaded => gpu::CompositePassParams::MODE_SHADED,
            GiMode::ReservoirWeights => {
                gpu::CompositePassParams::MODE_RESERVOIR_WEIGHTS
            }
        }
    }
}

/// Settings that can be changed on each frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GiSettings {
    pub mode: GiMode,

    /// Whether reservoirs and colors from the previous frame should be
    /// reused.
    pub temporal_reuse: bool,

    /// Whether the spatial resampling pass should run.
    pub spatial_resampling: bool,

    /// Minimum weight of the current frame when blending it with the
    /// history.
    pub temporal_blend: f32,

    /// Maximum relative difference of depths of two surfaces considered to
    /// be the same.
    pub depth_tolerance: f32,

    /// Minimum cosine between normals of two surfaces considered to be the
    /// same.
    pub normal_tolerance: f32,

    /// Radius, in pixels, of the disk spatial neighbours are picked from.
    pub spatial_radius: f32,

    pub spatial_samples: u32,
    pub light_intensity: f32,

    /// Maximum number of candidates a reservoir carries over from the
    /// previous frame.
    pub max_history: u32,

    pub exposure: f32,

    /// Size of probe grid's cell, in world units.
    pub probe_cell_size: f32,
}

impl Default for GiSettings {
    fn default() -> Self {
        Self {
            mode: Default::default(),
            temporal_reuse: true,
            spatial_resampling: true,
            temporal_blend: 0.1,
            depth_tolerance: 0.1,
            normal_tolerance: 0.9,
            spatial_radius: 16.0,
            spatial_samples: 4,
            light_intensity: 1.0,
            max_history: 20,
            exposure: 1.0,
            probe_cell_size: 1.0,
        }
    }
}

impl GiSettings {
    pub fn flags(&self) -> GiFlags {
        let mut flags = GiFlags::empty();

        flags.set(GiFlags::TEMPORAL_REUSE, self.temporal_reuse);
        flags.set(GiFlags::SPATIAL_RESAMPLING, self.spatial_resampling);
        flags
    }
}

bitflags::bitflags! {
    /// Mirror of `GiUniforms::FLAG_*`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GiFlags: u32 {
        const TEMPORAL_REUSE = gpu::GiUniforms::FLAG_TEMPORAL_REUSE;
        const SPATIAL_RESAMPLING = gpu::GiUniforms::FLAG_SPATIAL_RESAMPLING;
        const PROBES = gpu::GiUniforms::FLAG_PROBES;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        let mut target = GiSettings::default();

        assert_eq!(
            GiFlags::TEMPORAL_REUSE | GiFlags::SPATIAL_RESAMPLING,
            target.flags()
        );

        target.temporal_reuse = false;
        target.spatial_resampling = false;

        assert_eq!(GiFlags::empty(), target.flags());

        assert_eq!(
            gpu::GiUniforms::FLAG_PROBES,
            GiFlags::PROBES.bits()
        );
    }
}
