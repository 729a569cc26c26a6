//! Per-pixel algorithms of the GI passes.
//!
//! Kernels only fetch inputs from their bindless resources, call into these
//! functions and store the results back; keeping the math here allows for
//! testing it without any GPU around.

use glam::{vec4, IVec2, UVec2, Vec3, Vec4, Vec4Swizzles};

use crate::{
    lerp, CompositePassParams, DrawIndexedIndirectArgs, GBufferEntry,
    GiReservoir, GiSample, GiUniforms, Light, Probe, ProbePlacementPassParams,
    WhiteNoise, PROBE_CAPACITY,
};

/// What the previous frame has left behind for given pixel.
#[derive(Clone, Copy, Debug, Default)]
pub struct History {
    pub surface: GBufferEntry,
    pub reservoir: GiReservoir,
    pub color: Vec4,
}

impl History {
    /// Returns whether the history describes the same surface as the current
    /// frame and so can be reused.
    pub fn is_reusable(
        &self,
        uniforms: &GiUniforms,
        surface: &GBufferEntry,
    ) -> bool {
        uniforms.has(GiUniforms::FLAG_TEMPORAL_REUSE)
            && self.surface.is_consistent_with(
                surface,
                uniforms.depth_tolerance,
                uniforms.normal_tolerance,
            )
    }
}

/// Direct sampling: streams a fresh light candidate into the pixel's
/// reservoir, reuses last frame's reservoir (if it's still valid) and
/// returns the new reservoir together with a color estimate.
pub fn sample_direct(
    wnoise: &mut WhiteNoise,
    uniforms: &GiUniforms,
    lights: &[Light],
    surface: GBufferEntry,
    history: History,
) -> (GiReservoir, Vec4) {
    if !surface.is_some() {
        return (GiReservoir::default(), Vec4::ZERO);
    }

    let mut reservoir = GiReservoir::default();

    if !lights.is_empty() {
        let light_id = wnoise.sample_int() % (lights.len() as u32);
        let light = lights[light_id as usize];

        let sample = GiSample {
            radiance: light.radiance() * uniforms.light_intensity,
            position: light.center(),
            light_id,
        };

        let source_pdf = 1.0 / (lights.len() as f32);
        let pdf = sample.pdf(surface.position, surface.normal);

        reservoir.update(wnoise, sample, pdf / source_pdf);
    }

    let reusable = history.is_reusable(uniforms, &surface);

    if reusable {
        let mut prev = history.reservoir;

        prev.clamp_m(uniforms.max_history as f32);

        if reservoir.merge(wnoise, &prev.reservoir) {
            reservoir.age = prev.age + 1;
        }
    }

    let estimate = reservoir.shade(surface.position, surface.normal);
    let color = resolve(uniforms, estimate, reusable.then_some(history.color));

    (reservoir, color)
}

/// Spatial resampling: combines the center reservoir with reservoirs of
/// geometrically-consistent neighbours.
pub fn resample_spatial(
    wnoise: &mut WhiteNoise,
    uniforms: &GiUniforms,
    center: GiReservoir,
    surface: GBufferEntry,
    neighbours: impl IntoIterator<Item = (GiReservoir, GBufferEntry)>,
    history: History,
) -> (GiReservoir, Vec4) {
    if !surface.is_some() {
        return (center, Vec4::ZERO);
    }

    let mut reservoir = center;

    for (neighbour, neighbour_surface) in neighbours {
        if !surface.is_consistent_with(
            &neighbour_surface,
            uniforms.depth_tolerance,
            uniforms.normal_tolerance,
        ) {
            continue;
        }

        if reservoir.merge(wnoise, &neighbour.reservoir) {
            reservoir.age = neighbour.age;
        }
    }

    let estimate = reservoir.shade(surface.position, surface.normal);
    let reusable = history.is_reusable(uniforms, &surface);

    (
        reservoir,
        resolve(uniforms, estimate, reusable.then_some(history.color)),
    )
}

/// Picks a random pixel within `spatial_radius` of `center`; returns `None`
/// if the chosen pixel is the center itself or lays outside of the screen.
pub fn spatial_neighbour(
    wnoise: &mut WhiteNoise,
    uniforms: &GiUniforms,
    center: UVec2,
) -> Option<UVec2> {
    let offset =
        (wnoise.sample_disk() * uniforms.spatial_radius).round().as_ivec2();

    if offset == IVec2::ZERO {
        return None;
    }

    let pos = center.as_ivec2() + offset;

    uniforms.contains(pos).then(|| pos.as_uvec2())
}

/// Blends current frame's estimate with the history, if there's any.
pub fn resolve(
    uniforms: &GiUniforms,
    estimate: Vec3,
    history: Option<Vec4>,
) -> Vec4 {
    let color = estimate.extend(1.0);

    match history {
        Some(history) => lerp(history, color, uniforms.temporal_alpha()),
        None => color,
    }
}

/// Appends a probe at given position, bumping the controller's instance
/// count; returns the slot the probe should be written into or `None` if
/// the probe buffer is already full.
pub fn place_probe(
    controller: &mut DrawIndexedIndirectArgs,
    params: ProbePlacementPassParams,
) -> Option<(u32, Probe)> {
    if controller.instance_count >= PROBE_CAPACITY {
        return None;
    }

    let slot = controller.instance_count;

    controller.instance_count += 1;

    let cell = Probe::cell_of(params.position.xyz(), params.position.w);

    Some((slot, Probe::new(cell)))
}

pub fn composite(
    params: CompositePassParams,
    color: Vec4,
    reservoir: GiReservoir,
) -> Vec4 {
    if params.mode == CompositePassParams::MODE_RESERVOIR_WEIGHTS {
        let w = reservoir.w / (1.0 + reservoir.w);

        return vec4(w, w, w, 1.0);
    }

    tonemap(color.xyz() * params.exposure).extend(1.0)
}

/// Reinhard tonemapping.
pub fn tonemap(color: Vec3) -> Vec3 {
    color / (Vec3::ONE + color)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{uvec2, vec3};

    use super::*;
    use crate::{Frame, Reservoir};

    fn uniforms() -> GiUniforms {
        GiUniforms {
            width: 16,
            height: 16,
            frame: Frame::new(5),
            flags: GiUniforms::FLAG_TEMPORAL_REUSE,
            temporal_blend: 0.1,
            depth_tolerance: 0.1,
            normal_tolerance: 0.9,
            spatial_radius: 4.0,
            light_intensity: 1.0,
            spatial_samples: 4,
            max_history: 20,
            ..Default::default()
        }
    }

    fn floor(depth: f32) -> GBufferEntry {
        GBufferEntry {
            position: Vec3::ZERO,
            depth,
            normal: vec3(0.0, 1.0, 0.0),
            roughness: 1.0,
        }
    }

    fn lamp() -> Light {
        Light::point(vec3(0.0, 2.0, 0.0), Vec3::ONE, 4.0)
    }

    fn wnoise() -> WhiteNoise {
        WhiteNoise::new(123, uvec2(1, 1))
    }

    #[test]
    fn sky_yields_empty_reservoir() {
        let (reservoir, color) = sample_direct(
            &mut wnoise(),
            &uniforms(),
            &[lamp()],
            GBufferEntry::default(),
            History::default(),
        );

        assert!(reservoir.is_empty());
        assert_eq!(Vec4::ZERO, color);
    }

    #[test]
    fn no_lights_yield_empty_reservoir() {
        let (reservoir, color) = sample_direct(
            &mut wnoise(),
            &uniforms(),
            &[],
            floor(5.0),
            History::default(),
        );

        assert!(reservoir.is_empty());
        assert_eq!(0.0, reservoir.w);
        assert_eq!(vec4(0.0, 0.0, 0.0, 1.0), color);
    }

    #[test]
    fn single_light_is_estimated_exactly() {
        let (reservoir, color) = sample_direct(
            &mut wnoise(),
            &uniforms(),
            &[lamp()],
            floor(5.0),
            History::default(),
        );

        assert_eq!(0, reservoir.sample.light_id);
        assert_eq!(1.0, reservoir.m);
        assert_eq!(0, reservoir.age);

        // radiance = 4.0, distance = 2.0, cosine = 1.0
        assert_relative_eq!(1.0, color.x, epsilon = 0.0001);
        assert_relative_eq!(1.0, color.y, epsilon = 0.0001);
        assert_relative_eq!(1.0, color.z, epsilon = 0.0001);
    }

    #[test]
    fn history_is_reused_on_consistent_surfaces_only() {
        let prev = GiReservoir {
            reservoir: Reservoir {
                sample: GiSample {
                    radiance: Vec3::ONE,
                    position: vec3(0.0, 1.0, 0.0),
                    light_id: 0,
                },
                m: 50.0,
                w: 100.0,
            },
            age: 3,
        };

        let history = |depth| History {
            surface: floor(depth),
            reservoir: prev,
            color: Vec4::ONE,
        };

        let (reservoir, _) = sample_direct(
            &mut wnoise(),
            &uniforms(),
            &[lamp()],
            floor(5.0),
            history(5.1),
        );

        // m = 1 fresh candidate + history clamped to 20
        assert_eq!(21.0, reservoir.m);

        let (reservoir, color) = sample_direct(
            &mut wnoise(),
            &uniforms(),
            &[lamp()],
            floor(5.0),
            history(9.0),
        );

        assert_eq!(1.0, reservoir.m);
        assert_eq!(0, reservoir.age);
        assert_relative_eq!(1.0, color.x, epsilon = 0.0001);
    }

    #[test]
    fn spatial_resampling_rejects_inconsistent_neighbours() {
        let center = GiReservoir {
            reservoir: Reservoir {
                sample: GiSample {
                    radiance: Vec3::ONE,
                    position: vec3(0.0, 1.0, 0.0),
                    light_id: 1,
                },
                m: 1.0,
                w: 5.0,
            },
            age: 0,
        };

        let mut neighbour = center;

        neighbour.sample.light_id = 2;
        neighbour.w = 1000.0;

        let (reservoir, _) = resample_spatial(
            &mut wnoise(),
            &uniforms(),
            center,
            floor(5.0),
            [(neighbour, floor(50.0)), (GiReservoir::default(), floor(5.0))],
            History::default(),
        );

        assert_eq!(center, reservoir);
    }

    #[test]
    fn spatial_resampling_merges_consistent_neighbours() {
        let mut center = GiReservoir::default();

        center.m = 3.0;

        let mut neighbour = GiReservoir::default();

        neighbour.sample.light_id = 2;
        neighbour.sample.position = vec3(0.0, 1.0, 0.0);
        neighbour.sample.radiance = Vec3::ONE;
        neighbour.m = 1.0;
        neighbour.w = 2.0;

        let (reservoir, _) = resample_spatial(
            &mut wnoise(),
            &uniforms(),
            center,
            floor(5.0),
            [(neighbour, floor(5.0))],
            History::default(),
        );

        assert_eq!(2, reservoir.sample.light_id);
        assert_eq!(4.0, reservoir.m);
        assert_eq!(2.0, reservoir.w);
    }

    #[test]
    fn neighbours_stay_on_screen() {
        let uniforms = uniforms();
        let mut wnoise = wnoise();

        for _ in 0..1000 {
            let pos = spatial_neighbour(&mut wnoise, &uniforms, uvec2(0, 15));

            if let Some(pos) = pos {
                assert!(pos.x < 16 && pos.y < 16);
                assert_ne!(uvec2(0, 15), pos);
            }
        }
    }

    #[test]
    fn probes_are_appended_until_full() {
        let mut controller = DrawIndexedIndirectArgs {
            index_count: 36,
            ..Default::default()
        };

        let params = ProbePlacementPassParams {
            position: vec4(2.5, 0.5, -0.5, 1.0),
        };

        let (slot, probe) = place_probe(&mut controller, params).unwrap();

        assert_eq!(0, slot);
        assert_eq!(1, controller.instance_count);
        assert_eq!(glam::ivec3(2, 0, -1), probe.cell());

        controller.instance_count = PROBE_CAPACITY;

        assert!(place_probe(&mut controller, params).is_none());
        assert_eq!(PROBE_CAPACITY, controller.instance_count);
    }
}
