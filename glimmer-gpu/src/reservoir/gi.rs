use core::ops::{Deref, DerefMut};

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::{Reservoir, Vec3Ext};

/// Reservoir holding a single light sample for a pixel (or probe slot).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GiReservoir {
    pub reservoir: Reservoir<GiSample>,

    /// Number of frames the chosen sample has survived temporal reuse.
    pub age: u32,
}

/// GPU-side representation of [`GiReservoir`].
///
/// All-zero bytes decode into an empty reservoir, so a zero-filled heap page
/// is a valid page of empty reservoirs.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GiReservoirData {
    /// xyz - sample's radiance
    /// w - m
    pub d0: Vec4,

    /// xyz - sample's position
    /// w - w
    pub d1: Vec4,

    /// x - (as u32) light id
    /// y - (as u32) age
    /// zw - reserved
    pub d2: Vec4,
}

impl GiReservoir {
    /// Size of a single reservoir on the GPU, in bytes.
    pub const STRIDE: usize = core::mem::size_of::<GiReservoirData>();

    pub fn unpack(data: GiReservoirData) -> Self {
        Self {
            reservoir: Reservoir {
                sample: GiSample {
                    radiance: data.d0.xyz(),
                    position: data.d1.xyz(),
                    light_id: data.d2.x.to_bits(),
                },
                m: data.d0.w,
                w: data.d1.w,
            },
            age: data.d2.y.to_bits(),
        }
    }

    pub fn pack(self) -> GiReservoirData {
        GiReservoirData {
            d0: self.sample.radiance.extend(self.m),
            d1: self.sample.position.extend(self.w),
            d2: Vec4::new(
                f32::from_bits(self.sample.light_id),
                f32::from_bits(self.age),
                0.0,
                0.0,
            ),
        }
    }

    pub fn read(buffer: &[GiReservoirData], id: usize) -> Self {
        Self::unpack(buffer[id])
    }

    pub fn write(self, buffer: &mut [GiReservoirData], id: usize) {
        buffer[id] = self.pack();
    }

    /// Returns the irradiance this reservoir's sample contributes at given
    /// surface, weighted by the reservoir's contribution weight.
    pub fn shade(&self, point: Vec3, normal: Vec3) -> Vec3 {
        if self.is_empty() {
            return Vec3::ZERO;
        }

        let irradiance = self.sample.irradiance(point, normal);
        let pdf = irradiance.luma();

        irradiance * self.contribution_weight(pdf)
    }
}

impl Deref for GiReservoir {
    type Target = Reservoir<GiSample>;

    fn deref(&self) -> &Self::Target {
        &self.reservoir
    }
}

impl DerefMut for GiReservoir {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reservoir
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GiSample {
    pub radiance: Vec3,
    pub position: Vec3,
    pub light_id: u32,
}

impl GiSample {
    /// Returns irradiance arriving from this sample at given surface.
    pub fn irradiance(self, point: Vec3, normal: Vec3) -> Vec3 {
        let dir = self.position - point;
        let dist_sq = dir.length_squared();

        if dist_sq <= 0.0 {
            return Vec3::ZERO;
        }

        let cosine = normal.dot(dir / dist_sq.sqrt()).max(0.0);

        self.radiance * cosine / dist_sq
    }

    /// Returns target pdf (the unnormalized "p-hat") of this sample at given
    /// surface.
    pub fn pdf(self, point: Vec3, normal: Vec3) -> f32 {
        self.irradiance(point, normal).luma()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec3;

    use super::*;

    #[test]
    fn layout() {
        assert_eq!(48, GiReservoir::STRIDE);
        assert_eq!(0, GiReservoir::STRIDE % 16);
    }

    #[test]
    fn zeroed_data_is_empty() {
        let target = GiReservoir::unpack(GiReservoirData::zeroed());

        assert!(target.is_empty());
        assert_eq!(0.0, target.w);
        assert_eq!(GiReservoir::default(), target);
    }

    #[test]
    fn serialization() {
        fn target(idx: usize) -> GiReservoir {
            GiReservoir {
                reservoir: Reservoir {
                    sample: GiSample {
                        radiance: vec3(1.0, 2.0, 3.0),
                        position: vec3(4.0, 5.0, 6.0 + (idx as f32)),
                        light_id: 3 * idx as u32,
                    },
                    m: 11.0,
                    w: 12.0 + (idx as f32),
                },
                age: idx as u32,
            }
        }

        let mut buffer = vec![GiReservoirData::default(); 10];

        for idx in 0..10 {
            target(idx).write(&mut buffer, idx);
        }

        for idx in 0..10 {
            assert_eq!(target(idx), GiReservoir::read(&buffer, idx));
        }
    }

    #[test]
    fn irradiance() {
        let sample = GiSample {
            radiance: vec3(4.0, 4.0, 4.0),
            position: vec3(0.0, 2.0, 0.0),
            light_id: 0,
        };

        let up = vec3(0.0, 1.0, 0.0);

        assert_relative_eq!(1.0, sample.irradiance(Vec3::ZERO, up).x);
        assert_eq!(Vec3::ZERO, sample.irradiance(Vec3::ZERO, -up));
        assert_eq!(Vec3::ZERO, sample.irradiance(sample.position, up));
    }
}
