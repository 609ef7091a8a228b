//! Whole-frame tests on the recording backend.
//!
//! Each test builds a small world, runs [`RenderSystem::update`] and
//! inspects what the renderer asked the device to do.
//!
//! ```bash
//! cargo test --test frame_tests
//! ```

mod common;

use rstest::rstest;

use common::{
    backend, dummy_system, spawn_camera, spawn_lit_cube, spawn_mesh, spawn_point_light, HEIGHT,
    WIDTH,
};
use forward_renderer::backend::{
    CompareFunction, DummyBackend, SamplerDescriptor, TextureHandle, UniformValue, Viewport,
};
use forward_renderer::resources::{ImageData, Material, Mesh, MeshData, Model, Property, Texture2D};
use forward_renderer::scene::{
    Active, Camera, ClearMode, LayerMask, Layers, LightPriority, RenderLayers, Renderable,
    Transform, ViewportRect,
};
use forward_renderer::shader::builtin;
use forward_renderer::{RenderSystem, World};
use glam::{Vec3, Vec4};

// ============================================================================
// Multi-pass lighting
// ============================================================================

#[rstest]
#[case::no_lights(0, 1, 0)]
#[case::under_quota(2, 2, 0)]
#[case::at_quota(4, 4, 0)]
#[case::over_quota(6, 4, 2)]
fn test_automatic_lights_fill_quota(
    #[case] lights: usize,
    #[case] expected_draws: usize,
    #[case] expected_vertex: i32,
) {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    spawn_lit_cube(&mut system, &mut world);
    for i in 0..lights {
        spawn_point_light(&mut world, Vec3::new(i as f32 + 1.0, 0.0, 0.0), LightPriority::Automatic);
    }

    let stats = system.update(&mut world, &[camera]).unwrap();

    assert_eq!(stats.draw_calls, expected_draws);
    assert_eq!(stats.additive_passes, expected_draws - 1);
    let draws = backend(&system).draws();
    assert_eq!(draws.len(), expected_draws);
    assert_eq!(draws[0].int("numVertPointLights"), Some(expected_vertex));
}

#[test]
fn test_additive_passes_composite_over_base() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    spawn_lit_cube(&mut system, &mut world);
    for i in 0..6 {
        spawn_point_light(&mut world, Vec3::new(0.0, i as f32 + 1.0, 0.0), LightPriority::Automatic);
    }

    system.update(&mut world, &[camera]).unwrap();

    let draws = backend(&system).draws();
    assert_eq!(draws.len(), 4);

    let base = &draws[0];
    assert!(!base.is_additive());
    assert!(base.state.depth_write);
    assert_eq!(base.vec3("ambientColor"), Some(Vec3::splat(0.1)));
    assert_eq!(base.int("numFragPointLights"), Some(1));

    for pass in &draws[1..] {
        assert!(pass.is_additive());
        assert_eq!(pass.state.depth_func, CompareFunction::Equal);
        assert_eq!(pass.vec3("ambientColor"), Some(Vec3::ZERO));
        assert_eq!(pass.int("numVertPointLights"), Some(0));
        assert_eq!(pass.int("numFragPointLights"), Some(1));
        assert_eq!(pass.mesh, base.mesh);
    }
}

#[test]
fn test_nearest_automatic_light_shades_first_pass() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    spawn_lit_cube(&mut system, &mut world);
    spawn_point_light(&mut world, Vec3::new(8.0, 0.0, 0.0), LightPriority::Automatic);
    spawn_point_light(&mut world, Vec3::new(1.0, 0.0, 0.0), LightPriority::Automatic);

    system.update(&mut world, &[camera]).unwrap();

    let draws = backend(&system).draws();
    assert_eq!(
        draws[0].vec3("fragPointLights[0].position"),
        Some(Vec3::new(1.0, 0.0, 0.0))
    );
    assert_eq!(
        draws[1].vec3("fragPointLights[0].position"),
        Some(Vec3::new(8.0, 0.0, 0.0))
    );
}

#[test]
fn test_vertex_lights_beyond_limit_dropped() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    spawn_lit_cube(&mut system, &mut world);
    for i in 0..15 {
        spawn_point_light(&mut world, Vec3::new(i as f32, 0.0, 0.0), LightPriority::NotImportant);
    }

    let stats = system.update(&mut world, &[camera]).unwrap();

    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.dropped_vertex_lights, 5);
    assert_eq!(backend(&system).draws()[0].int("numVertPointLights"), Some(10));
}

#[test]
fn test_state_restored_after_passes() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    spawn_lit_cube(&mut system, &mut world);
    spawn_lit_cube(&mut system, &mut world);
    for i in 0..3 {
        spawn_point_light(&mut world, Vec3::new(i as f32, 1.0, 0.0), LightPriority::Important);
    }
    let before = *system.graphics().state();

    let stats = system.update(&mut world, &[camera]).unwrap();

    assert_eq!(stats.draw_calls, 6);
    assert_eq!(*system.graphics().state(), before);

    // the second entity starts from the restored state again
    let draws = backend(&system).draws();
    assert!(draws[2].is_additive());
    assert!(!draws[3].is_additive());
    assert_eq!(draws[3].state, before);
}

// ============================================================================
// Visibility
// ============================================================================

#[test]
fn test_entity_on_several_layers_drawn_once() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = world
        .spawn((
            Camera::default()
                .with_layer_mask(LayerMask(0b11))
                .with_clear_mode(ClearMode::SolidColor),
            Transform::default(),
        ))
        .id();
    let entity = spawn_mesh(&mut system, &mut world, builtin::COLOR);
    world.entity_mut(entity).insert(RenderLayers(LayerMask(0b11)));

    let stats = system.update(&mut world, &[camera]).unwrap();

    assert_eq!(stats.entities_drawn, 1);
    assert_eq!(backend(&system).draws().len(), 1);
}

#[test]
fn test_layer_outside_camera_mask_not_drawn() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    let entity = spawn_mesh(&mut system, &mut world, builtin::COLOR);
    world.entity_mut(entity).insert(RenderLayers(LayerMask(0b10)));

    let stats = system.update(&mut world, &[camera]).unwrap();
    assert_eq!(stats.entities_drawn, 0);
    assert!(backend(&system).draws().is_empty());
}

#[test]
fn test_out_of_range_layer_not_drawn_by_default_camera() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    let entity = spawn_mesh(&mut system, &mut world, builtin::COLOR);
    world
        .entity_mut(entity)
        .insert(RenderLayers(LayerMask::layer(64)));

    let stats = system.update(&mut world, &[camera]).unwrap();
    assert_eq!(stats.entities_drawn, 0);
    assert!(backend(&system).draws().is_empty());
}

#[test]
fn test_named_layers_drive_visibility() {
    let mut system = dummy_system();
    let mut world = World::new();
    world.init_resource::<Layers>();
    world.resource_mut::<Layers>().add("UI").unwrap();

    let layers = world.resource::<Layers>().clone();
    let camera = world
        .spawn((
            Camera::default()
                .with_layer_mask(layers.mask(&["UI"]))
                .with_clear_mode(ClearMode::SolidColor),
            Transform::default(),
        ))
        .id();
    let overlay = spawn_mesh(&mut system, &mut world, builtin::COLOR);
    world.entity_mut(overlay).insert(layers.render_layers(&["UI"]));
    spawn_mesh(&mut system, &mut world, builtin::COLOR);

    let stats = system.update(&mut world, &[camera]).unwrap();
    assert_eq!(stats.entities_drawn, 1);
    assert_eq!(world.resource::<Layers>().id("UI"), Some(1));
}

#[test]
fn test_layer_registry_added_to_world() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);

    system.update(&mut world, &[camera]).unwrap();
    assert_eq!(world.resource::<Layers>().id("Default"), Some(Layers::DEFAULT));
}

#[test]
fn test_inactive_entities_skipped() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    let hidden = spawn_mesh(&mut system, &mut world, builtin::COLOR);
    world.entity_mut(hidden).insert(Active(false));
    let shown = spawn_mesh(&mut system, &mut world, builtin::COLOR);
    world.entity_mut(shown).insert(Active(true));

    let stats = system.update(&mut world, &[camera]).unwrap();
    assert_eq!(stats.entities_drawn, 1);

    let off = spawn_camera(&mut world, 1.0);
    world.entity_mut(off).insert(Active(false));
    let stats = system.update(&mut world, &[camera, off]).unwrap();
    assert_eq!(stats.cameras, 1);
}

// ============================================================================
// Cameras
// ============================================================================

#[test]
fn test_cameras_drawn_by_descending_depth() {
    let mut system = dummy_system();
    let mut world = World::new();
    let cameras: Vec<_> = [0.0, 5.0, -2.0, 5.0]
        .into_iter()
        .map(|depth| spawn_camera(&mut world, depth))
        .collect();

    let stats = system.update(&mut world, &cameras).unwrap();

    assert_eq!(stats.cameras, 4);
    let order: Vec<_> = system.cameras().sorted().collect();
    assert_eq!(order, vec![cameras[1], cameras[3], cameras[0], cameras[2]]);
    assert_eq!(backend(&system).blits().len(), 4);
}

#[test]
fn test_camera_past_surface_edge_rendered_at_visible_size() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    world
        .entity_mut(camera)
        .insert(ViewportRect::new(0.75, 0.0, 0.5, 1.0));
    spawn_mesh(&mut system, &mut world, builtin::COLOR);

    system.update(&mut world, &[camera]).unwrap();

    let backend = backend(&system);
    let dst = backend.blits()[0].dst;
    assert_eq!(dst, Viewport::new(WIDTH * 3 / 4, 0, WIDTH / 4, HEIGHT));
    // the target is drawn at the size it is blitted at
    let drawn = backend.draws()[0].viewport;
    assert_eq!((drawn.width, drawn.height), (dst.width, dst.height));
}

#[test]
fn test_camera_clear_color_opaque() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    world.get_mut::<Camera>(camera).unwrap().clear_color = Vec4::new(0.2, 0.4, 0.6, 0.0);

    system.update(&mut world, &[camera]).unwrap();

    let clears = backend(&system).clears();
    assert_eq!(clears.len(), 2);
    assert_eq!(clears[1].color, Vec4::new(0.2, 0.4, 0.6, 1.0));
}

// ============================================================================
// Materials
// ============================================================================

fn albedo_map(material: &Material) -> Option<TextureHandle> {
    match material.property("material.albedoMap") {
        Some(Property::Texture2D(Some(texture))) => Some(texture.handle()),
        _ => None,
    }
}

#[test]
fn test_material_copy_outlives_original() {
    let mut system = dummy_system();
    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);

    let graphics = system.graphics_mut();
    let mut original = Material::new(graphics, builtin::STANDARD).unwrap();
    let image = ImageData::checkerboard(4, [255, 255, 255, 255], [0, 0, 0, 255]);
    let texture = Texture2D::new(graphics, &image, SamplerDescriptor::default()).unwrap();
    assert!(original.set(graphics, "material.albedoMap", texture));
    assert!(original.set(graphics, "material.useAlbedoMap", true));

    let copy = original.copy(graphics).unwrap();
    let original_map = albedo_map(&original).unwrap();
    let copy_map = albedo_map(&copy).unwrap();
    assert_ne!(original_map, copy_map);
    original.dispose(graphics);

    let mesh = Mesh::new(graphics, &MeshData::cube(), Some(copy)).unwrap();
    world.spawn((Transform::default(), Renderable::new(Model::single(mesh))));

    system.update(&mut world, &[camera]).unwrap();

    let backend = backend(&system);
    assert!(!backend.texture_alive(original_map));
    assert!(backend.texture_alive(copy_map));
    let draw = &backend.draws()[0];
    assert_eq!(draw.textures.get(&0), Some(&copy_map));
    assert_eq!(draw.uniform("material.useAlbedoMap"), Some(&UniformValue::Bool(true)));
}

#[test]
fn test_unbound_property_does_not_block_drawing() {
    common::init_logger();
    let config = common::config();
    let mut backend = DummyBackend::new(config.width, config.height);
    backend.strip_uniform("material.albedoColor");
    let mut system = RenderSystem::new(Box::new(backend), config).unwrap();

    let mut world = World::new();
    let camera = spawn_camera(&mut world, 0.0);
    let graphics = system.graphics_mut();
    let mut material = Material::new(graphics, builtin::STANDARD).unwrap();
    assert!(material.set(graphics, "material.albedoColor", Vec3::new(1.0, 0.0, 0.0)));
    let mesh = Mesh::new(graphics, &MeshData::cube(), Some(material)).unwrap();
    world.spawn((Transform::default(), Renderable::new(Model::single(mesh))));

    let stats = system.update(&mut world, &[camera]).unwrap();

    assert_eq!(stats.draw_calls, 1);
    let draw = &common::backend(&system).draws()[0];
    assert!(draw.uniform("material.albedoColor").is_none());
    assert!(draw.uniform("material.metallicValue").is_some());
}
