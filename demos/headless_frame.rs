//! Headless frame demo
//!
//! Builds a small lit scene, renders a few frames through two cameras
//! and optionally writes the last frame to a PNG.
//!
//! ```bash
//! # Record-only run, no GPU needed
//! cargo run --example headless_frame -- --backend dummy
//!
//! # Render on the GPU and save the result
//! cargo run --example headless_frame -- --lights 12 --output frame.png
//! ```

use std::path::PathBuf;

use clap::Parser;
use forward_renderer::backend::SamplerDescriptor;
use forward_renderer::resources::{ImageData, Material, Mesh, MeshData, Model, Texture2D};
use forward_renderer::scene::{
    Camera, Caster, ClearMode, Light, LightPriority, Renderable, Transform, ViewportRect,
};
use forward_renderer::shader::builtin;
use forward_renderer::{BackendType, Entity, RenderResult, RenderSystem, RendererConfig, World};
use glam::{Quat, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliBackend {
    /// Headless GPU rendering via wgpu
    #[default]
    Wgpu,
    /// Records commands only
    Dummy,
}

impl From<CliBackend> for BackendType {
    fn from(cli: CliBackend) -> Self {
        match cli {
            CliBackend::Wgpu => BackendType::Wgpu,
            CliBackend::Dummy => BackendType::Dummy,
        }
    }
}

#[derive(Debug, Parser)]
#[command(about = "Render a lit scene without a window")]
struct Args {
    #[arg(long, value_enum, default_value_t = CliBackend::default())]
    backend: CliBackend,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// Automatic point lights circling the scene
    #[arg(long, default_value_t = 6)]
    lights: usize,

    /// Lights shaded per fragment, one pass each
    #[arg(long, default_value_t = 4)]
    quota: usize,

    #[arg(long, default_value_t = 3)]
    frames: u32,

    /// Write the last frame here (wgpu only)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn spawn_model(
    system: &mut RenderSystem,
    world: &mut World,
    data: &MeshData,
    material: Material,
    transform: Transform,
) -> RenderResult<Entity> {
    let mesh = Mesh::new(system.graphics_mut(), data, Some(material))?;
    Ok(world
        .spawn((transform, Renderable::new(Model::single(mesh))))
        .id())
}

fn build_scene(system: &mut RenderSystem, world: &mut World, lights: usize) -> RenderResult<Vec<Entity>> {
    let graphics = system.graphics_mut();

    let mut floor = Material::new(graphics, builtin::STANDARD)?;
    let checker = ImageData::checkerboard(64, [200, 200, 200, 255], [90, 90, 90, 255]);
    let texture = Texture2D::new(graphics, &checker, SamplerDescriptor::default())?;
    floor.set(graphics, "material.albedoColor", Vec3::ONE);
    floor.set(graphics, "material.albedoMap", texture);
    floor.set(graphics, "material.useAlbedoMap", true);
    floor.set(graphics, "material.roughnessValue", 0.8f32);

    let mut cubes = Vec::new();
    for (i, color) in [Vec3::new(0.9, 0.3, 0.2), Vec3::new(0.2, 0.8, 0.3), Vec3::new(0.2, 0.4, 0.9)]
        .into_iter()
        .enumerate()
    {
        let graphics = system.graphics_mut();
        let mut material = Material::new(graphics, builtin::STANDARD)?;
        material.set(graphics, "material.albedoColor", color);
        material.set(graphics, "material.roughnessValue", 0.4f32);
        cubes.push((i, material));
    }

    spawn_model(
        system,
        world,
        &MeshData::plane(12.0, 12.0, 8),
        floor,
        Transform::default(),
    )?;
    for (i, material) in cubes {
        let x = (i as f32 - 1.0) * 2.5;
        spawn_model(
            system,
            world,
            &MeshData::cube(),
            material,
            Transform::from_position(Vec3::new(x, 0.5, 0.0)),
        )?;
    }

    // Unlit marker, drawn in a single pass regardless of lights
    let mut marker = Material::new(system.graphics_mut(), builtin::COLOR)?;
    marker.set(system.graphics_mut(), "material.color", Vec4::new(1.0, 1.0, 0.6, 1.0));
    spawn_model(
        system,
        world,
        &MeshData::cube(),
        marker,
        Transform::from_position(Vec3::new(0.0, 3.0, 0.0)).with_scale(Vec3::splat(0.2)),
    )?;

    world.spawn((
        Light::new(Vec3::new(1.0, 0.95, 0.9), 0.6).with_priority(LightPriority::Important),
        Caster::directional(),
        Transform::from_position_rotation(Vec3::ZERO, Quat::from_rotation_x(-1.0)),
    ));

    let mut orbiting = Vec::with_capacity(lights);
    for i in 0..lights {
        let hue = i as f32 / lights.max(1) as f32;
        let color = Vec3::new(hue, 1.0 - hue, 0.5 + 0.5 * hue);
        orbiting.push(
            world
                .spawn((
                    Light::new(color, 2.0).with_priority(LightPriority::Automatic),
                    Caster::point(6.0),
                    Transform::default(),
                ))
                .id(),
        );
    }
    Ok(orbiting)
}

fn place_lights(world: &mut World, lights: &[Entity], time: f32) {
    for (i, &light) in lights.iter().enumerate() {
        let angle = time + i as f32 * std::f32::consts::TAU / lights.len() as f32;
        if let Some(mut transform) = world.get_mut::<Transform>(light) {
            transform.position = Vec3::new(angle.cos() * 4.0, 1.5, angle.sin() * 4.0);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = RendererConfig {
        width: args.width,
        height: args.height,
        backend: args.backend.into(),
        frag_light_quota: args.quota,
        ..Default::default()
    };
    let mut system = RenderSystem::from_config(config)?;
    let mut world = World::new();
    let lights = build_scene(&mut system, &mut world, args.lights)?;

    let main_camera = world
        .spawn((
            Camera::default(),
            Transform::from_position(Vec3::new(0.0, 4.0, 9.0)).looking_at(Vec3::ZERO, Vec3::Y),
        ))
        .id();
    let overhead = world
        .spawn((
            Camera::default()
                .with_depth(-1.0)
                .with_clear_mode(ClearMode::SolidColor),
            Transform::from_position(Vec3::new(0.0, 12.0, 0.01)).looking_at(Vec3::ZERO, Vec3::Y),
            ViewportRect::new(0.7, 0.0, 0.3, 0.3),
        ))
        .id();
    let cameras = [main_camera, overhead];

    for frame in 0..args.frames {
        place_lights(&mut world, &lights, frame as f32 * 0.3);
        let stats = system.update(&mut world, &cameras)?;
        log::info!("Frame {}: {:?}", frame, stats);
    }

    if let Some(path) = args.output {
        save_frame(&mut system, &path)?;
    }

    system.dispose();
    Ok(())
}

#[cfg(feature = "wgpu-backend")]
fn save_frame(system: &mut RenderSystem, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let (width, height) = system.graphics().device().surface_size();
    let Some(backend) = system
        .graphics_mut()
        .backend_mut::<forward_renderer::WgpuBackend>()
    else {
        log::warn!("--output needs the wgpu backend; nothing written");
        return Ok(());
    };
    let pixels = backend.read_surface()?;
    let image = image::RgbaImage::from_raw(width, height, pixels)
        .ok_or("surface readback has the wrong size")?;
    image.save(path)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

#[cfg(not(feature = "wgpu-backend"))]
fn save_frame(_system: &mut RenderSystem, _path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    log::warn!("--output needs the wgpu backend; nothing written");
    Ok(())
}
