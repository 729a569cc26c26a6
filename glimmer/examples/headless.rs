//! Renders a few frames of the procedural plane scene on the software
//! backend and prints the composited image as ASCII art.
//!
//! ```text
//! RUST_LOG=glimmer=debug cargo run --example headless
//! ```

use std::error::Error;

use glam::{uvec2, vec3, Vec4Swizzles};
use glimmer::cpu::PlaneScene;
use glimmer::gpu::Vec3Ext;
use glimmer::{
    gpu, Backend, Barrier, CpuBackend, FrameContext, GiConfig, GiRenderer,
    GiSettings, ImageDesc, ImageLayout, ImageUsages,
};
use log::info;

const FRAMES: usize = 16;
const RAMP: &[u8] = b" .:-=+*#%@";

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let extent = uvec2(64, 24);
    let mut backend = CpuBackend::new();

    let scene = PlaneScene::new(
        &mut backend,
        &[
            gpu::Light::point(vec3(-2.0, 2.5, 4.0), vec3(1.0, 0.8, 0.6), 6.0),
            gpu::Light::point(vec3(2.5, 1.0, 8.0), vec3(0.3, 0.5, 1.0), 3.0),
        ],
    )?;

    let mut renderer = GiRenderer::new(&mut backend, GiConfig::default())?;

    let output = backend.create_image(&ImageDesc {
        label: "output".into(),
        size: extent,
        format: renderer.config().output_format,
        usage: ImageUsages::ATTACHMENT,
    });

    let mut cmd = backend.create_command_buffer("setup");

    backend.image_barrier(
        &mut cmd,
        &output,
        Barrier::SHADERS_TO_COLOR,
        ImageLayout::Undefined,
        ImageLayout::ColorAttachment,
    );

    renderer.create_gi_resources(&mut backend, &mut cmd, extent)?;
    backend.submit(cmd);

    let mut ctx = FrameContext {
        settings: GiSettings::default(),
        scene: scene.bindings(),
        camera_moved: false,
        probe_request: Some(vec3(0.0, 0.5, 5.0)),
    };

    for _ in 0..FRAMES {
        renderer.tick(&mut backend, &ctx);

        let mut cmd = backend.create_command_buffer("frame");

        renderer.draw(&mut backend, &mut cmd, &ctx, &scene, &output);
        backend.submit(cmd);

        ctx.probe_request = None;
    }

    info!(
        "Rendered {} frames; hazards={}, layout violations={}",
        renderer.frame().get(),
        backend.hazards().len(),
        backend.layout_violations().len()
    );

    let texels = backend.read_image(&output);

    for row in texels.chunks(extent.x as usize) {
        let line: String = row
            .iter()
            .map(|texel| {
                let luma = texel.xyz().luma().clamp(0.0, 1.0);
                let idx = (luma * (RAMP.len() - 1) as f32).round() as usize;

                RAMP[idx] as char
            })
            .collect();

        println!("{line}");
    }

    renderer.destroy_gi_resources(&mut backend);
    scene.destroy(&mut backend);

    Ok(())
}
