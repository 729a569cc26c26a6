use glam::{Vec3, Vec4, Vec4Swizzles};

/// Surface data rasterized into the G-buffer; one entry per pixel.
///
/// Stored as two texels:
///
/// - `d0`: world-space position (xyz) and view depth (w),
/// - `d1`: normal (xyz) and roughness (w).
///
/// Pixels that didn't hit any geometry have depth of zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GBufferEntry {
    pub position: Vec3,
    pub depth: f32,
    pub normal: Vec3,
    pub roughness: f32,
}

impl GBufferEntry {
    pub fn unpack([d0, d1]: [Vec4; 2]) -> Self {
        Self {
            position: d0.xyz(),
            depth: d0.w,
            normal: d1.xyz(),
            roughness: d1.w,
        }
    }

    pub fn pack(self) -> [Vec4; 2] {
        [
            self.position.extend(self.depth),
            self.normal.extend(self.roughness),
        ]
    }

    pub fn is_some(&self) -> bool {
        self.depth > 0.0
    }

    /// Returns whether `other` describes (more or less) the same surface as
    /// `self`; used to reject samples that would otherwise leak light across
    /// silhouettes.
    ///
    /// `depth_tolerance` is relative to the farther of both depths, while
    /// `normal_tolerance` is the minimum cosine between both normals.
    pub fn is_consistent_with(
        &self,
        other: &Self,
        depth_tolerance: f32,
        normal_tolerance: f32,
    ) -> bool {
        if !self.is_some() || !other.is_some() {
            return false;
        }

        let depth_diff = (self.depth - other.depth).abs();

        if depth_diff > depth_tolerance * self.depth.max(other.depth) {
            return false;
        }

        self.normal.dot(other.normal) >= normal_tolerance
    }
}

#[cfg(test)]
mod tests {
    use glam::vec3;

    use super::*;

    fn entry(depth: f32, normal: Vec3) -> GBufferEntry {
        GBufferEntry {
            position: vec3(1.0, 2.0, 3.0),
            depth,
            normal,
            roughness: 0.5,
        }
    }

    #[test]
    fn serialization() {
        let target = entry(12.5, vec3(0.0, 1.0, 0.0));

        assert_eq!(target, GBufferEntry::unpack(target.pack()));
    }

    #[test]
    fn consistency() {
        let up = vec3(0.0, 1.0, 0.0);
        let side = vec3(1.0, 0.0, 0.0);

        let consistent = |a: GBufferEntry, b: GBufferEntry| {
            a.is_consistent_with(&b, 0.1, 0.9)
        };

        assert!(consistent(entry(10.0, up), entry(10.5, up)));

        // Depth discontinuity
        assert!(!consistent(entry(10.0, up), entry(12.0, up)));

        // Normal discontinuity
        assert!(!consistent(entry(10.0, up), entry(10.0, side)));

        // Sky
        assert!(!consistent(entry(10.0, up), GBufferEntry::default()));
    }
}
