mod common;

use glam::{uvec2, vec3};
use glimmer::cpu::{self, CommandKind};
use glimmer::{
    gpu, shaders, Backend, BufferDesc, BufferUsages, CpuBackend, Error,
    GiConfig, GiRenderer, GiSettings, ImageDesc, ImageFormat, ImageLayout,
    ImageUsages, ImageView, ReservoirLayout, ResourceKind,
};

use self::common::{Harness, EXTENT};

#[test]
fn frames_are_free_of_hazards() {
    for layout in [ReservoirLayout::Folded, ReservoirLayout::Split] {
        let mut harness = Harness::with_config(GiConfig {
            layout,
            ..Default::default()
        });

        harness.frames(4);
        harness.assert_clean();
    }
}

#[test]
fn pass_order() {
    let mut harness = Harness::new();

    harness.backend.clear_log();
    harness.frames(1);

    assert_eq!(
        vec![
            "plane_scene",
            "glimmer_direct_sampling",
            "glimmer_spatial_resampling",
            "glimmer_composite",
            "glimmer_probe_drawing",
        ],
        harness.passes()
    );
}

#[test]
fn spatial_resampling_can_be_disabled() {
    let mut harness = Harness::new();
    let mut ctx = harness.ctx();

    ctx.settings = GiSettings {
        spatial_resampling: false,
        ..Default::default()
    };

    harness.backend.clear_log();
    harness.frame(&ctx);
    harness.frame(&ctx);
    harness.assert_clean();

    let passes = harness.passes();

    assert!(!passes.contains(&"glimmer_spatial_resampling"));

    assert_eq!(
        2,
        passes
            .iter()
            .filter(|pass| **pass == "glimmer_direct_sampling")
            .count()
    );
}

#[test]
fn probes_are_optional() {
    let mut harness = Harness::with_config(GiConfig {
        probes: false,
        ..Default::default()
    });

    harness.backend.clear_log();
    harness.frames(2);
    harness.assert_clean();

    assert!(harness.renderer.resources().unwrap().probes().is_none());
    assert_eq!(3, harness.renderer.pipeline_count());

    assert!(!harness
        .passes()
        .iter()
        .any(|pass| pass.starts_with("glimmer_probe")));
}

#[test]
fn reservoir_weights_are_never_negative() {
    for layout in [ReservoirLayout::Folded, ReservoirLayout::Split] {
        let mut harness = Harness::with_config(GiConfig {
            layout,
            reservoirs_per_page: 64,
            ..Default::default()
        });

        harness.frames(6);

        let reservoirs = harness.reservoirs();

        // 16x8 pixels, twice, in pages of 64 reservoirs
        assert_eq!(2 * EXTENT.x * EXTENT.y, reservoirs.len() as u32);

        assert_eq!(
            64,
            harness.renderer.resources().unwrap().reservoirs().per_page()
        );

        assert_reservoirs_are_sane(&reservoirs);
    }
}

fn assert_reservoirs_are_sane(reservoirs: &[gpu::GiReservoir]) {
    for reservoir in reservoirs {
        assert!(reservoir.w >= 0.0, "{reservoir:?}");
        assert!(reservoir.w.is_finite(), "{reservoir:?}");
        assert!(reservoir.m >= 0.0, "{reservoir:?}");
    }

    assert!(reservoirs.iter().any(|reservoir| reservoir.w > 0.0));
}

#[test]
fn targets_are_never_both_writable() {
    let mut harness = Harness::new();

    for _ in 0..4 {
        harness.frames(1);

        let layouts = harness.renderer.resources().unwrap().targets().layouts();

        assert!(
            !layouts.iter().all(|layout| *layout == ImageLayout::General),
            "{layouts:?}"
        );
    }
}

#[test]
fn frame_counter_advances_by_one() {
    let mut harness = Harness::new();

    assert_eq!(0, harness.renderer.frame().get());

    for frame in 1..=5 {
        let write_index = harness.renderer.resources().unwrap().write_index();

        harness.frames(1);

        assert_eq!(frame, harness.renderer.frame().get());

        assert_eq!(
            1 - write_index,
            harness.renderer.resources().unwrap().write_index()
        );
    }
}

#[test]
fn ticking_twice_keeps_the_frame() {
    let mut harness = Harness::new();
    let ctx = harness.ctx();

    harness.renderer.tick(&mut harness.backend, &ctx);
    harness.frame(&ctx);

    assert_eq!(1, harness.renderer.frame().get());
    harness.assert_clean();
}

#[test]
fn probe_placement() {
    let mut harness = Harness::new();
    let mut ctx = harness.ctx();

    harness.frames(1);

    ctx.probe_request = Some(vec3(1.2, 0.5, 3.7));

    harness.backend.clear_log();
    harness.frame(&ctx);
    harness.assert_clean();

    assert_eq!(
        vec![
            "plane_scene",
            "glimmer_direct_sampling",
            "glimmer_spatial_resampling",
            "glimmer_composite",
            "glimmer_probe_placement",
            "glimmer_probe_drawing",
        ],
        harness.passes()
    );

    let probes = harness.renderer.resources().unwrap().probes().unwrap();

    let controller: gpu::DrawIndexedIndirectArgs = bytemuck::pod_read_unaligned(
        &harness.backend.read_buffer(probes.controller()).unwrap()
            [..std::mem::size_of::<gpu::DrawIndexedIndirectArgs>()],
    );

    assert_eq!(1, controller.instance_count);
    assert_eq!(36, controller.index_count);

    // Probes stay there on the next frames, without being re-placed
    ctx.probe_request = None;

    harness.backend.clear_log();
    harness.frame(&ctx);

    let drawing = harness
        .backend
        .executed()
        .iter()
        .find(|cmd| cmd.label == "glimmer_probe_drawing")
        .unwrap();

    assert_eq!(CommandKind::Draw, drawing.kind);
    assert_eq!(1, drawing.invocations);
    assert!(!harness.passes().contains(&"glimmer_probe_placement"));
}

#[test]
fn resizing() {
    let mut harness = Harness::with_config(GiConfig {
        reservoirs_per_page: 32,
        ..Default::default()
    });

    harness.frames(2);
    harness.resize(uvec2(7, 5));

    let resources = harness.renderer.resources().unwrap();

    assert_eq!(uvec2(7, 5), resources.extent());
    assert_eq!(uvec2(7, 5), resources.targets().size());

    harness.frames(2);
    harness.assert_clean();

    // 2 * 7 * 5 reservoirs, rounded up to whole pages
    let reservoirs = harness.reservoirs();

    assert_eq!(96, reservoirs.len());
    assert_reservoirs_are_sane(&reservoirs);
}

#[test]
fn zero_extent() {
    let mut harness = Harness::new();
    let mut cmd = harness.backend.create_command_buffer("test");

    let result = harness.renderer.create_gi_resources(
        &mut harness.backend,
        &mut cmd,
        uvec2(0, 16),
    );

    assert!(matches!(
        result,
        Err(Error::ZeroExtent {
            width: 0,
            height: 16
        })
    ));

    assert!(harness.renderer.resources().is_none());
}

#[test]
fn first_frame_after_resizing_has_no_history() {
    let mut harness = Harness::new();
    let mut ctx = harness.ctx();

    ctx.settings.spatial_resampling = false;

    harness.frame(&ctx);
    harness.frame(&ctx);

    assert!(harness.tick(&ctx).has(gpu::GiUniforms::FLAG_TEMPORAL_REUSE));

    harness.resize(uvec2(12, 6));

    assert!(!harness.tick(&ctx).has(gpu::GiUniforms::FLAG_TEMPORAL_REUSE));

    harness.frame(&ctx);

    // Fresh candidates only
    let reservoirs = harness.reservoirs();

    assert!(reservoirs.iter().all(|reservoir| reservoir.m <= 1.0));
    assert!(reservoirs.iter().any(|reservoir| reservoir.m == 1.0));

    assert!(harness.tick(&ctx).has(gpu::GiUniforms::FLAG_TEMPORAL_REUSE));

    harness.frame(&ctx);
    harness.assert_clean();

    // Fresh candidates merged with the history
    assert!(harness
        .reservoirs()
        .iter()
        .any(|reservoir| reservoir.m > 1.0));
}

#[test]
fn camera_movement_restarts_temporal_accumulation() {
    let mut harness = Harness::new();
    let mut ctx = harness.ctx();

    harness.frames(5);

    let uniforms = harness.tick(&ctx);

    assert_eq!(5, uniforms.frames_since_camera_moved());
    assert!(uniforms.temporal_alpha() < 1.0);

    ctx.camera_moved = true;

    let uniforms = harness.tick(&ctx);

    assert_eq!(0, uniforms.frames_since_camera_moved());
    assert_eq!(1.0, uniforms.temporal_alpha());

    harness.frame(&ctx);

    ctx.camera_moved = false;

    harness.frame(&ctx);
    harness.frame(&ctx);

    let uniforms = harness.tick(&ctx);

    assert_eq!(8, uniforms.frame.get());
    assert_eq!(3, uniforms.frames_since_camera_moved());
    assert!(uniforms.temporal_alpha() < 1.0);
}

#[test]
fn failed_creation_releases_everything_allocated_so_far() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut backend = CpuBackend::new();
    let mut renderer = GiRenderer::new(&mut backend, GiConfig::default())
        .unwrap();

    // Room for both targets and half of the first g-buffer
    for idx in 0..cpu::MAX_IMAGES - 3 {
        let image = backend.create_image(&ImageDesc {
            label: format!("filler{idx}"),
            size: uvec2(1, 1),
            format: ImageFormat::Rgba16Float,
            usage: ImageUsages::SAMPLED,
        });

        backend.register_image(&image, ImageView::Sampled).unwrap();
    }

    let mut cmd = backend.create_command_buffer("test");

    let result =
        renderer.create_gi_resources(&mut backend, &mut cmd, uvec2(16, 8));

    assert!(matches!(
        result,
        Err(Error::BindlessHeapFull {
            kind: ResourceKind::SampledImage,
            requested: 1,
        })
    ));

    assert!(renderer.resources().is_none());

    // Commands recorded for the released resources are skipped
    backend.submit(cmd);

    let buffer = backend.create_buffer(&BufferDesc {
        label: "after".into(),
        size: 16,
        usage: BufferUsages::STORAGE,
    });

    let image = backend.create_image(&ImageDesc {
        label: "after".into(),
        size: uvec2(1, 1),
        format: ImageFormat::Rgba16Float,
        usage: ImageUsages::SAMPLED | ImageUsages::STORAGE,
    });

    assert_eq!(
        gpu::Handle::new(0),
        backend.register_buffers(&[&buffer]).unwrap()
    );

    assert_eq!(
        gpu::Handle::new(0),
        backend.register_image(&image, ImageView::Storage).unwrap()
    );

    assert_eq!(
        gpu::Handle::new(cpu::MAX_IMAGES - 3),
        backend.register_image(&image, ImageView::Sampled).unwrap()
    );
}

#[test]
fn failed_reload_keeps_previous_pipelines() {
    let mut harness = Harness::new();
    let total = harness.renderer.pipeline_count();

    assert_eq!(total, harness.renderer.reload_pipelines(&mut harness.backend));

    harness.backend.remove_kernel(shaders::SPATIAL_RESAMPLING);

    assert_eq!(
        total - 1,
        harness.renderer.reload_pipelines(&mut harness.backend)
    );

    harness.backend.clear_log();
    harness.frames(1);
    harness.assert_clean();

    assert!(harness.passes().contains(&"glimmer_spatial_resampling"));
}

#[test]
#[should_panic(expected = "without a preceding tick()")]
fn drawing_without_ticking() {
    let mut harness = Harness::new();
    let ctx = harness.ctx();
    let mut cmd = harness.backend.create_command_buffer("test");

    harness.renderer.draw(
        &mut harness.backend,
        &mut cmd,
        &ctx,
        &harness.scene,
        &harness.output,
    );
}
