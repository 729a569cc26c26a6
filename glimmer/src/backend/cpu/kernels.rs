//! Reference implementations of the GI shaders.

use glam::UVec2;

use super::{CpuBackend, Invocation};
use crate::gpu::{self, sampling, GBufferEntry, GiReservoir, GiUniforms};
use crate::shaders;

pub(super) fn install(backend: &mut CpuBackend) {
    backend.add_kernel(shaders::DIRECT_SAMPLING, direct_sampling);
    backend.add_kernel(shaders::SPATIAL_RESAMPLING, spatial_resampling);
    backend.add_kernel(shaders::COMPOSITE, composite);
    backend.add_kernel(shaders::PROBE_PLACEMENT, probe_placement);
    backend.add_kernel(shaders::PROBE_DRAWING, probe_drawing);
}

fn direct_sampling(inv: &mut Invocation) {
    let uniforms: GiUniforms = inv.uniforms();
    let params: gpu::DirectSamplingPassParams = inv.params();
    let pos = inv.pixel();
    let (curr, prev) = (uniforms.write_index, uniforms.read_index());

    let lights: Vec<gpu::Light> = (0..uniforms.light_count)
        .map(|idx| inv.load(uniforms.lights, idx as usize))
        .collect();

    let surface = gbuffer(inv, &uniforms, curr, pos);

    let history = sampling::History {
        surface: gbuffer(inv, &uniforms, prev, pos),
        reservoir: reservoir(inv, &uniforms, prev, pos),
        color: inv.sample(uniforms.targets_tex[prev as usize], pos),
    };

    let mut wnoise = gpu::WhiteNoise::new(params.seed, pos);

    let (reservoir, color) = sampling::sample_direct(
        &mut wnoise,
        &uniforms,
        &lights,
        surface,
        history,
    );

    let (page, slot) = uniforms.reservoir(pos, curr);

    inv.store(page, slot as usize, reservoir.pack());
    inv.store_texel(uniforms.targets_storage[curr as usize], pos, color);
}

fn spatial_resampling(inv: &mut Invocation) {
    let uniforms: GiUniforms = inv.uniforms();
    let params: gpu::SpatialResamplingPassParams = inv.params();
    let pos = inv.pixel();
    let (curr, prev) = (uniforms.write_index, uniforms.read_index());

    let mut wnoise = gpu::WhiteNoise::new(params.seed, pos);
    let surface = gbuffer(inv, &uniforms, curr, pos);
    let center = reservoir(inv, &uniforms, curr, pos);
    let mut neighbours = Vec::new();

    for _ in 0..uniforms.spatial_samples {
        if let Some(npos) =
            sampling::spatial_neighbour(&mut wnoise, &uniforms, pos)
        {
            neighbours.push((
                reservoir(inv, &uniforms, curr, npos),
                gbuffer(inv, &uniforms, curr, npos),
            ));
        }
    }

    let history = sampling::History {
        surface: gbuffer(inv, &uniforms, prev, pos),
        reservoir: Default::default(),
        color: inv.sample(uniforms.targets_tex[prev as usize], pos),
    };

    let (reservoir, color) = sampling::resample_spatial(
        &mut wnoise,
        &uniforms,
        center,
        surface,
        neighbours,
        history,
    );

    let (page, slot) = uniforms.reservoir(pos, curr);

    inv.store(page, slot as usize, reservoir.pack());
    inv.store_texel(uniforms.targets_storage[curr as usize], pos, color);
}

fn composite(inv: &mut Invocation) {
    let uniforms: GiUniforms = inv.uniforms();
    let params: gpu::CompositePassParams = inv.params();
    let pos = inv.pixel();

    if !uniforms.contains(pos.as_ivec2()) {
        return;
    }

    let curr = uniforms.write_index;
    let color = inv.sample(uniforms.targets_tex[curr as usize], pos);
    let reservoir = reservoir(inv, &uniforms, curr, pos);

    inv.output(0, sampling::composite(params, color, reservoir));
}

fn probe_placement(inv: &mut Invocation) {
    let uniforms: GiUniforms = inv.uniforms();
    let params: gpu::ProbePlacementPassParams = inv.params();

    let placed = inv.update(
        uniforms.probe_controller,
        0,
        |controller: &mut gpu::DrawIndexedIndirectArgs| {
            sampling::place_probe(controller, params)
        },
    );

    if let Some((slot, probe)) = placed {
        inv.store(uniforms.probes, slot as usize, probe);
    }
}

/// Meshes are not rasterized on the CPU - the kernel only fetches its
/// instance's probe, so that the draw shows up in the access tracking.
fn probe_drawing(inv: &mut Invocation) {
    let uniforms: GiUniforms = inv.uniforms();
    let _: gpu::Probe = inv.load(uniforms.probes, inv.id.x as usize);
}

fn gbuffer(
    inv: &mut Invocation,
    uniforms: &GiUniforms,
    idx: u32,
    pos: UVec2,
) -> GBufferEntry {
    let idx = idx as usize;

    GBufferEntry::unpack([
        inv.sample(uniforms.gbuffers_d0[idx], pos),
        inv.sample(uniforms.gbuffers_d1[idx], pos),
    ])
}

fn reservoir(
    inv: &mut Invocation,
    uniforms: &GiUniforms,
    half: u32,
    pos: UVec2,
) -> GiReservoir {
    let (page, slot) = uniforms.reservoir(pos, half);

    GiReservoir::unpack(inv.load(page, slot as usize))
}
