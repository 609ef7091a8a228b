//! Shared scene setup for the integration tests.

#![allow(dead_code)]

use forward_renderer::backend::DummyBackend;
use forward_renderer::resources::{Material, Mesh, MeshData, Model};
use forward_renderer::scene::{
    Camera, Caster, ClearMode, Light, LightPriority, Renderable, Transform,
};
use forward_renderer::shader::{builtin, ShaderId};
use forward_renderer::{BackendType, Entity, RenderSystem, RendererConfig, World};
use glam::Vec3;

pub const WIDTH: u32 = 320;
pub const HEIGHT: u32 = 240;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config() -> RendererConfig {
    RendererConfig {
        width: WIDTH,
        height: HEIGHT,
        backend: BackendType::Dummy,
        ..Default::default()
    }
}

/// Render system on a recording backend
pub fn dummy_system() -> RenderSystem {
    init_logger();
    let config = config();
    let backend = DummyBackend::new(config.width, config.height);
    RenderSystem::new(Box::new(backend), config).expect("dummy render system")
}

pub fn backend(system: &RenderSystem) -> &DummyBackend {
    system
        .graphics()
        .backend::<DummyBackend>()
        .expect("dummy backend")
}

/// Camera at +Z looking at the origin, without sky
pub fn spawn_camera(world: &mut World, depth: f32) -> Entity {
    world
        .spawn((
            Camera::default()
                .with_depth(depth)
                .with_clear_mode(ClearMode::SolidColor),
            Transform::from_position(Vec3::new(0.0, 0.0, 5.0)).looking_at(Vec3::ZERO, Vec3::Y),
        ))
        .id()
}

pub fn spawn_mesh(system: &mut RenderSystem, world: &mut World, shader: ShaderId) -> Entity {
    let graphics = system.graphics_mut();
    let material = Material::new(graphics, shader).expect("material");
    let mesh = Mesh::new(graphics, &MeshData::cube(), Some(material)).expect("mesh");
    world
        .spawn((Transform::default(), Renderable::new(Model::single(mesh))))
        .id()
}

pub fn spawn_lit_cube(system: &mut RenderSystem, world: &mut World) -> Entity {
    spawn_mesh(system, world, builtin::STANDARD)
}

pub fn spawn_point_light(world: &mut World, position: Vec3, priority: LightPriority) -> Entity {
    world
        .spawn((
            Light::new(Vec3::ONE, 1.0).with_priority(priority),
            Caster::point(10.0),
            Transform::from_position(position),
        ))
        .id()
}
