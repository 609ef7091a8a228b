//! Multi-pass forward renderer
//!
//! Each lit mesh is drawn once per fragment light. The first pass
//! writes depth and carries the ambient term and the per-vertex lights;
//! every later pass re-draws the same surface with depth func `Equal`
//! and additive blending, contributing only its fragment light.

use std::collections::HashSet;

use bevy_ecs::prelude::*;
use glam::{Mat3, Mat4, Vec3};

use super::light_sort::sort_light_entities;
use super::LightSystem;
use crate::backend::*;
use crate::graphics::Graphics;
use crate::resources::Mesh;
use crate::scene::{
    is_active, Camera, LayerId, LayerMask, LightSample, ModelMatrix, ProjectionMatrix, Renderable,
    ViewMatrix,
};
use crate::shader::{ShaderProgram, UniformRole};

/// Counters for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub cameras: usize,
    pub entities_drawn: usize,
    pub draw_calls: usize,
    /// Draws composited additively over a base pass
    pub additive_passes: usize,
    /// Meshes without material or with an unresolvable program
    pub skipped_meshes: usize,
    pub dropped_vertex_lights: usize,
}

/// Lights shading one draw target, split into per-vertex and
/// per-fragment sets. Every entry has the components a shading
/// program needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightBatch {
    pub vertex: Vec<Entity>,
    /// One pass each, in pass order
    pub fragment: Vec<Entity>,
}

impl LightBatch {
    /// Important lights go per fragment, not-important ones per vertex.
    /// Automatic lights are promoted per fragment by descending score
    /// while fewer than `quota` fragment lights are present; the rest
    /// go per vertex.
    pub fn assemble(world: &World, lights: &LightSystem, target: Vec3, quota: usize) -> Self {
        let resolvable = |entity: &&Entity| LightSample::from_entity(world, **entity).is_some();

        let mut fragment: Vec<_> = lights.important().iter().filter(resolvable).copied().collect();
        let mut vertex: Vec<_> = lights
            .not_important()
            .iter()
            .filter(resolvable)
            .copied()
            .collect();

        let automatic = sort_light_entities(world, lights.automatic(), target);
        let promoted = quota.saturating_sub(fragment.len()).min(automatic.len());
        fragment.extend_from_slice(&automatic[..promoted]);
        vertex.extend_from_slice(&automatic[promoted..]);

        Self { vertex, fragment }
    }

    /// Number of draws a light-aware mesh takes
    pub fn passes(&self) -> usize {
        self.fragment.len().max(1)
    }
}

fn samples(world: &World, entities: &[Entity]) -> Vec<LightSample> {
    entities
        .iter()
        .filter_map(|&entity| LightSample::from_entity(world, entity))
        .collect()
}

/// Matrices of one entity seen from one camera
#[derive(Debug, Clone, Copy)]
struct Transforms {
    model: Mat4,
    view: Mat4,
    projection: Mat4,
}

impl Transforms {
    fn value(&self, role: UniformRole, kind: UniformKind) -> Option<UniformValue> {
        let matrix = match role {
            UniformRole::Model => self.model,
            UniformRole::View => self.view,
            UniformRole::Projection => self.projection,
            UniformRole::ModelView => self.view * self.model,
            UniformRole::ViewProjection => self.projection * self.view,
            UniformRole::ModelViewProjection => self.projection * self.view * self.model,
            UniformRole::Normal => {
                let normal = self.model.inverse().transpose();
                return match kind {
                    UniformKind::Mat3 => Some(UniformValue::Mat3(Mat3::from_mat4(normal))),
                    _ => Some(UniformValue::Mat4(normal)),
                };
            }
            _ => return None,
        };
        Some(UniformValue::Mat4(matrix))
    }

    fn upload(&self, device: &mut dyn RenderDevice, program: &ShaderProgram) {
        for uniform in program.uniforms() {
            if let Some(value) = self.value(uniform.role(), uniform.kind()) {
                uniform.set(device, value);
            }
        }
    }
}

fn upload_ambient(device: &mut dyn RenderDevice, program: &ShaderProgram, color: Vec3) {
    for uniform in program.with_role(UniformRole::AmbientColor) {
        uniform.set(device, UniformValue::Vec3(color));
    }
}

/// Draws every visible renderable of a camera
#[derive(Debug, Clone)]
pub struct ForwardRenderer {
    frag_light_quota: usize,
}

impl Default for ForwardRenderer {
    fn default() -> Self {
        Self::new(4)
    }
}

impl ForwardRenderer {
    pub fn new(frag_light_quota: usize) -> Self {
        Self { frag_light_quota }
    }

    pub fn frag_light_quota(&self) -> usize {
        self.frag_light_quota
    }

    pub fn set_frag_light_quota(&mut self, quota: usize) {
        self.frag_light_quota = quota;
    }

    /// Draw `renderables` seen by `camera`.
    ///
    /// Layers of the camera mask are visited in ascending order; an
    /// entity on several of them is drawn once.
    pub fn render(
        &self,
        graphics: &mut Graphics,
        world: &World,
        lights: &LightSystem,
        camera: Entity,
        renderables: &[(Entity, LayerMask)],
        stats: &mut FrameStats,
    ) {
        let Some(layer_mask) = world.get::<Camera>(camera).map(|c| c.layer_mask) else {
            return;
        };
        let view = world.get::<ViewMatrix>(camera).copied().unwrap_or_default().0;
        let projection = world
            .get::<ProjectionMatrix>(camera)
            .copied()
            .unwrap_or_default()
            .0;

        // Each entity is keyed by its lowest visible layer; the stable sort
        // keeps submission order within a layer.
        let mut visible: Vec<(LayerId, Entity)> = renderables
            .iter()
            .filter(|(_, layers)| layers.intersects(layer_mask))
            .filter_map(|&(entity, layers)| (layers & layer_mask).first().map(|l| (l, entity)))
            .collect();
        visible.sort_by_key(|&(layer, _)| layer);

        let mut rendered = HashSet::new();
        for (_, entity) in visible {
            if rendered.contains(&entity) || !is_active(world, entity) {
                continue;
            }
            let (Some(model), Some(renderable)) = (
                world.get::<ModelMatrix>(entity),
                world.get::<Renderable>(entity),
            ) else {
                continue;
            };

            let transforms = Transforms {
                model: model.0,
                view,
                projection,
            };
            let mut batch = None;
            for mesh in &renderable.model.meshes {
                self.draw_mesh(graphics, world, lights, mesh, &transforms, &mut batch, stats);
            }

            rendered.insert(entity);
            stats.entities_drawn += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_mesh(
        &self,
        graphics: &mut Graphics,
        world: &World,
        lights: &LightSystem,
        mesh: &Mesh,
        transforms: &Transforms,
        batch: &mut Option<LightBatch>,
        stats: &mut FrameStats,
    ) {
        let Some(material) = &mesh.material else {
            log::debug!("Skipping mesh without material");
            stats.skipped_meshes += 1;
            return;
        };
        let program = match graphics.shader(material.shader()) {
            Ok(program) => program,
            Err(err) => {
                log::debug!("Skipping mesh: {}", err);
                stats.skipped_meshes += 1;
                return;
            }
        };

        material.apply(graphics, &program);
        transforms.upload(graphics.device_mut(), &program);

        let Some(slots) = program.lights() else {
            graphics.draw_mesh(mesh.handle());
            stats.draw_calls += 1;
            return;
        };

        let batch = batch.get_or_insert_with(|| {
            LightBatch::assemble(
                world,
                lights,
                transforms.model.w_axis.truncate(),
                self.frag_light_quota,
            )
        });
        let vertex_lights = samples(world, &batch.vertex);
        let fragment_lights = samples(world, &batch.fragment);

        let additive = PipelineState {
            depth_test: true,
            depth_write: false,
            depth_func: CompareFunction::Equal,
            blend: Some(BlendState::additive()),
            ..*graphics.state()
        };
        let mut scope = graphics.scoped();
        for pass in 0..batch.passes() {
            let device = scope.device_mut();
            if pass == 0 {
                upload_ambient(device, &program, lights.ambient_color());
                stats.dropped_vertex_lights += slots.upload_vertex_lights(device, &vertex_lights);
            } else {
                upload_ambient(device, &program, Vec3::ZERO);
                slots.clear_vertex_lights(device);
            }
            slots.upload_fragment_light(device, fragment_lights.get(pass));

            if pass == 1 {
                scope.set_state(additive);
            }
            scope.draw_mesh(mesh.handle());
            stats.draw_calls += 1;
            if pass > 0 {
                stats.additive_passes += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{Material, MeshData, Model};
    use crate::scene::{Caster, Light, LightPriority, Transform};
    use crate::shader::builtin;

    fn point_light(world: &mut World, x: f32, priority: LightPriority) -> Entity {
        world
            .spawn((
                Light::default().with_priority(priority),
                Caster::point(10.0),
                Transform::from_position(Vec3::new(x, 0.0, 0.0)),
            ))
            .id()
    }

    fn refreshed(world: &mut World) -> LightSystem {
        let mut lights = LightSystem::default();
        lights.refresh(world);
        lights
    }

    #[test]
    fn test_batch_promotes_top_automatic_lights() {
        let mut world = World::new();
        let automatic: Vec<_> = (1..=6)
            .map(|i| point_light(&mut world, i as f32, LightPriority::Automatic))
            .collect();
        let lights = refreshed(&mut world);

        let batch = LightBatch::assemble(&world, &lights, Vec3::ZERO, 4);

        assert_eq!(batch.fragment, automatic[..4].to_vec());
        assert_eq!(batch.vertex.len(), 2);
        assert!(batch.vertex.contains(&automatic[4]));
        assert!(batch.vertex.contains(&automatic[5]));
    }

    #[test]
    fn test_batch_important_always_per_fragment() {
        let mut world = World::new();
        let important: Vec<_> = (0..5)
            .map(|i| point_light(&mut world, 100.0 + i as f32, LightPriority::Important))
            .collect();
        let near = point_light(&mut world, 0.5, LightPriority::Automatic);
        let background = point_light(&mut world, 0.1, LightPriority::NotImportant);
        let lights = refreshed(&mut world);

        let batch = LightBatch::assemble(&world, &lights, Vec3::ZERO, 4);

        assert_eq!(batch.fragment.len(), 5);
        assert!(important.iter().all(|e| batch.fragment.contains(e)));
        assert_eq!(batch.vertex.len(), 2);
        assert!(batch.vertex.contains(&near));
        assert!(batch.vertex.contains(&background));
    }

    #[test]
    fn test_batch_skips_incomplete_lights() {
        let mut world = World::new();
        world.spawn(Light::default().with_priority(LightPriority::Important));
        world.spawn((Light::default(), Caster::point(1.0)));
        let lights = refreshed(&mut world);

        let batch = LightBatch::assemble(&world, &lights, Vec3::ZERO, 4);
        assert!(batch.fragment.is_empty());
        assert!(batch.vertex.is_empty());
        assert_eq!(batch.passes(), 1);
    }

    #[test]
    fn test_unlit_mesh_single_draw() {
        let mut graphics = Graphics::new(Box::new(DummyBackend::default()));
        let mut world = World::new();
        for i in 0..3 {
            point_light(&mut world, i as f32, LightPriority::Important);
        }
        let material = Material::new(&mut graphics, builtin::COLOR).unwrap();
        let mesh = Mesh::new(&mut graphics, &MeshData::cube(), Some(material)).unwrap();
        let entity = world
            .spawn((ModelMatrix::default(), Renderable::new(Model::single(mesh))))
            .id();
        let camera = world.spawn(Camera::default()).id();
        let lights = refreshed(&mut world);

        let mut stats = FrameStats::default();
        ForwardRenderer::default().render(
            &mut graphics,
            &world,
            &lights,
            camera,
            &[(entity, LayerMask::DEFAULT)],
            &mut stats,
        );

        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.additive_passes, 0);
        let draws = graphics.backend::<DummyBackend>().unwrap().draws();
        assert_eq!(draws.len(), 1);
        assert!(!draws[0].is_additive());
    }

    #[test]
    fn test_entities_drawn_by_lowest_visible_layer() {
        let mut graphics = Graphics::new(Box::new(DummyBackend::default()));
        let mut world = World::new();
        let spawn = |graphics: &mut Graphics, world: &mut World| {
            let material = Material::new(graphics, builtin::COLOR).unwrap();
            let mesh = Mesh::new(graphics, &MeshData::cube(), Some(material)).unwrap();
            let handle = mesh.handle();
            let entity = world
                .spawn((ModelMatrix::default(), Renderable::new(Model::single(mesh))))
                .id();
            (entity, handle)
        };
        let (upper, upper_mesh) = spawn(&mut graphics, &mut world);
        let (both, both_mesh) = spawn(&mut graphics, &mut world);
        let (lower, lower_mesh) = spawn(&mut graphics, &mut world);
        let (hidden, _) = spawn(&mut graphics, &mut world);
        let renderables = [
            (upper, LayerMask::layer(2)),
            (both, LayerMask::layer(0).with(2)),
            (lower, LayerMask::layer(0)),
            (hidden, LayerMask::layer(5)),
            // listed twice, still drawn once
            (upper, LayerMask::layer(2)),
        ];
        let camera = world
            .spawn(Camera::default().with_layer_mask(LayerMask::layer(0).with(2)))
            .id();
        let lights = refreshed(&mut world);

        let mut stats = FrameStats::default();
        ForwardRenderer::default().render(
            &mut graphics,
            &world,
            &lights,
            camera,
            &renderables,
            &mut stats,
        );

        assert_eq!(stats.entities_drawn, 3);
        let order: Vec<_> = graphics
            .backend::<DummyBackend>()
            .unwrap()
            .draws()
            .iter()
            .map(|draw| draw.mesh)
            .collect();
        assert_eq!(order, vec![both_mesh, lower_mesh, upper_mesh]);
    }

    #[test]
    fn test_mesh_without_material_skipped() {
        let mut graphics = Graphics::new(Box::new(DummyBackend::default()));
        let mut world = World::new();
        let bare = Mesh::new(&mut graphics, &MeshData::cube(), None).unwrap();
        let material = Material::new(&mut graphics, builtin::COLOR).unwrap();
        let dressed = Mesh::new(&mut graphics, &MeshData::cube(), Some(material)).unwrap();
        let entity = world
            .spawn((
                ModelMatrix::default(),
                Renderable::new(Model::new(vec![bare, dressed])),
            ))
            .id();
        let camera = world.spawn(Camera::default()).id();
        let lights = refreshed(&mut world);

        let mut stats = FrameStats::default();
        ForwardRenderer::default().render(
            &mut graphics,
            &world,
            &lights,
            camera,
            &[(entity, LayerMask::DEFAULT)],
            &mut stats,
        );

        assert_eq!(stats.skipped_meshes, 1);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.entities_drawn, 1);
    }

    #[test]
    fn test_transform_roles_uploaded() {
        let mut graphics = Graphics::new(Box::new(DummyBackend::default()));
        let mut world = World::new();
        let material = Material::new(&mut graphics, builtin::COLOR).unwrap();
        let mesh = Mesh::new(&mut graphics, &MeshData::cube(), Some(material)).unwrap();
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let entity = world
            .spawn((ModelMatrix(model), Renderable::new(Model::single(mesh))))
            .id();
        let camera = world.spawn((Camera::default(), ViewMatrix(view))).id();
        let lights = refreshed(&mut world);

        let mut stats = FrameStats::default();
        ForwardRenderer::default().render(
            &mut graphics,
            &world,
            &lights,
            camera,
            &[(entity, LayerMask::DEFAULT)],
            &mut stats,
        );

        let draw = &graphics.backend::<DummyBackend>().unwrap().draws()[0];
        assert_eq!(
            draw.uniform("modelViewProjection"),
            Some(&UniformValue::Mat4(view * model))
        );
    }
}
