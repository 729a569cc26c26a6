use bytemuck::{Pod, Zeroable};
use glam::{IVec2, UVec2};

use crate::{Frame, Handle, ReservoirPtr};

/// Per-frame parameters shared by all GI stages.
///
/// Arrays of two are indexed by the ping-pong bit: `[write_index]` is this
/// frame's write target, `[1 - write_index]` is last frame's result.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GiUniforms {
    pub tlas: Handle,
    pub lights: Handle,
    pub light_count: u32,
    pub probes: Handle,
    pub probe_controller: Handle,
    pub reservoirs_per_page: u32,
    pub width: u32,
    pub height: u32,

    pub targets_tex: [Handle; 2],
    pub targets_storage: [Handle; 2],
    pub gbuffers_d0: [Handle; 2],
    pub gbuffers_d1: [Handle; 2],

    /// Handle of the first page of the reservoir heap holding given half.
    pub reservoirs: [Handle; 2],

    /// Linear index of the first reservoir of given half within its heap.
    pub reservoir_offsets: [u32; 2],

    pub write_index: u32,
    pub frame: Frame,

    /// Frame on which the camera has moved most recently.
    pub camera_frame: Frame,
    pub flags: u32,

    pub temporal_blend: f32,
    pub depth_tolerance: f32,
    pub normal_tolerance: f32,
    pub spatial_radius: f32,
    pub light_intensity: f32,
    pub spatial_samples: u32,
    pub max_history: u32,
    pub _padding: u32,
}

impl GiUniforms {
    pub const FLAG_TEMPORAL_REUSE: u32 = 1 << 0;
    pub const FLAG_SPATIAL_RESAMPLING: u32 = 1 << 1;
    pub const FLAG_PROBES: u32 = 1 << 2;

    pub fn has(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn read_index(&self) -> u32 {
        1 - self.write_index
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    pub fn pixel_idx(&self, pos: UVec2) -> u32 {
        pos.y * self.width + pos.x
    }

    /// Returns whether given point lays inside the screen.
    pub fn contains(&self, pos: IVec2) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && pos.x < self.width as i32
            && pos.y < self.height as i32
    }

    /// Locates reservoir of given pixel within given half of the heap.
    pub fn reservoir(&self, pos: UVec2, half: u32) -> (Handle, u32) {
        let half = half as usize;
        let idx = self.reservoir_offsets[half] + self.pixel_idx(pos);
        let ptr = ReservoirPtr::new(idx, self.reservoirs_per_page);

        (ptr.handle(self.reservoirs[half]), ptr.slot)
    }

    pub fn frames_since_camera_moved(&self) -> u32 {
        self.frame.since(self.camera_frame)
    }

    /// Weight of the current frame's estimate when blending it with the
    /// accumulated history.
    ///
    /// Right after the camera moves this is 1.0 (history is thrown away) and
    /// then it decays towards `temporal_blend`.
    pub fn temporal_alpha(&self) -> f32 {
        let fresh = 1.0 / (self.frames_since_camera_moved() as f32 + 1.0);

        fresh.max(self.temporal_blend).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use glam::uvec2;

    use super::*;
    use crate::RESERVOIRS_PER_PAGE;

    #[test]
    fn layout() {
        assert_eq!(128, core::mem::size_of::<GiUniforms>());
    }

    #[test]
    fn reservoir_addressing_of_folded_heap() {
        let target = GiUniforms {
            width: 200,
            height: 100,
            reservoirs_per_page: RESERVOIRS_PER_PAGE,
            reservoirs: [Handle::new(10); 2],
            reservoir_offsets: [0, 20000],
            ..Default::default()
        };

        assert_eq!((Handle::new(10), 0), target.reservoir(uvec2(0, 0), 0));
        assert_eq!((Handle::new(11), 3617), target.reservoir(uvec2(0, 0), 1));
        assert_eq!((Handle::new(10), 1), target.reservoir(uvec2(1, 0), 0));
    }

    #[test]
    fn reservoir_addressing_of_split_heap() {
        let target = GiUniforms {
            width: 200,
            height: 100,
            reservoirs_per_page: RESERVOIRS_PER_PAGE,
            reservoirs: [Handle::new(10), Handle::new(12)],
            reservoir_offsets: [0, 0],
            ..Default::default()
        };

        assert_eq!((Handle::new(11), 1617), target.reservoir(uvec2(0, 90), 0));
        assert_eq!((Handle::new(13), 1617), target.reservoir(uvec2(0, 90), 1));
    }

    #[test]
    fn temporal_alpha() {
        let mut target = GiUniforms {
            temporal_blend: 0.1,
            frame: Frame::new(10),
            camera_frame: Frame::new(10),
            ..Default::default()
        };

        assert_eq!(1.0, target.temporal_alpha());

        target.frame = Frame::new(11);
        assert_eq!(0.5, target.temporal_alpha());

        target.frame = Frame::new(1000);
        assert_eq!(0.1, target.temporal_alpha());
    }
}
