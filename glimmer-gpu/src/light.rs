use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4, Vec4Swizzles};

/// Point light, as uploaded by the scene into the bindless buffer table.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Light {
    /// x - position x
    /// y - position y
    /// z - position z
    /// w - radius
    pub d0: Vec4,

    /// x - color r
    /// y - color g
    /// z - color b
    /// w - intensity
    pub d1: Vec4,
}

impl Light {
    pub fn point(center: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            d0: center.extend(0.0),
            d1: color.extend(intensity),
        }
    }

    pub fn center(&self) -> Vec3 {
        self.d0.xyz()
    }

    pub fn radiance(&self) -> Vec3 {
        self.d1.xyz() * self.d1.w
    }
}
