//! Systems deriving render matrices from scene components
//!
//! Run these before [`RenderSystem::update`](crate::pipeline::RenderSystem::update);
//! the renderer only reads the derived matrices.

use bevy_ecs::prelude::*;

use super::{Camera, ModelMatrix, Projection, ProjectionMatrix, Transform, ViewMatrix, ViewportRect};

/// Output surface size, used for camera aspect ratios
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceSize {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Derive [`ModelMatrix`] for every entity with a [`Transform`]
pub fn update_model_matrices(
    mut commands: Commands,
    mut query: Query<(Entity, &Transform, Option<&mut ModelMatrix>)>,
) {
    for (entity, transform, matrix) in &mut query {
        let model = transform.matrix();
        match matrix {
            Some(mut matrix) => matrix.0 = model,
            None => {
                commands.entity(entity).insert(ModelMatrix(model));
            }
        }
    }
}

/// Derive [`ViewMatrix`] for every camera with a [`Transform`]
pub fn update_view_matrices(
    mut commands: Commands,
    mut query: Query<(Entity, &Transform, Option<&mut ViewMatrix>), With<Camera>>,
) {
    for (entity, transform, matrix) in &mut query {
        let view = transform.view_matrix();
        match matrix {
            Some(mut matrix) => matrix.0 = view,
            None => {
                commands.entity(entity).insert(ViewMatrix(view));
            }
        }
    }
}

/// Derive [`ProjectionMatrix`] for every camera.
///
/// Cameras without [`Projection`] or [`ViewportRect`] use the defaults.
pub fn update_projection_matrices(
    mut commands: Commands,
    surface: Option<Res<SurfaceSize>>,
    mut query: Query<
        (
            Entity,
            Option<&Projection>,
            Option<&ViewportRect>,
            Option<&mut ProjectionMatrix>,
        ),
        With<Camera>,
    >,
) {
    let surface = surface.map(|s| *s).unwrap_or_default();
    for (entity, projection, rect, matrix) in &mut query {
        let aspect = rect
            .copied()
            .unwrap_or_default()
            .aspect(surface.width, surface.height);
        let projection = projection.copied().unwrap_or_default().matrix(aspect);
        match matrix {
            Some(mut matrix) => matrix.0 = projection,
            None => {
                commands.entity(entity).insert(ProjectionMatrix(projection));
            }
        }
    }
}

/// A schedule running all matrix systems
pub fn matrix_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems((
        update_model_matrices,
        update_view_matrices,
        update_projection_matrices,
    ));
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    #[test]
    fn test_matrices_created_then_updated() {
        let mut world = World::new();
        world.insert_resource(SurfaceSize {
            width: 800,
            height: 400,
        });
        let object = world.spawn(Transform::from_position(Vec3::X)).id();
        let camera = world
            .spawn((Camera::default(), Transform::from_position(Vec3::Z * 5.0)))
            .id();

        let mut schedule = matrix_schedule();
        schedule.run(&mut world);

        assert_eq!(
            world.get::<ModelMatrix>(object).map(|m| m.translation()),
            Some(Vec3::X)
        );
        let view = world.get::<ViewMatrix>(camera).map(|m| m.0);
        assert_eq!(view, Some(Mat4::look_at_rh(Vec3::Z * 5.0, Vec3::Z * 4.0, Vec3::Y)));
        let expected = Projection::default().matrix(2.0);
        assert_eq!(world.get::<ProjectionMatrix>(camera).map(|m| m.0), Some(expected));

        world.get_mut::<Transform>(object).unwrap().position = Vec3::Y;
        schedule.run(&mut world);
        assert_eq!(
            world.get::<ModelMatrix>(object).map(|m| m.translation()),
            Some(Vec3::Y)
        );
    }

    #[test]
    fn test_orthographic_projection_ignores_aspect() {
        let mut world = World::new();
        let camera = world
            .spawn((
                Camera::default(),
                Projection::orthographic(5.0, 5.0, 0.1, 100.0),
                ViewportRect::new(0.0, 0.0, 0.5, 1.0),
            ))
            .id();

        matrix_schedule().run(&mut world);

        let expected = Mat4::orthographic_rh(-5.0, 5.0, -5.0, 5.0, 0.1, 100.0);
        assert_eq!(world.get::<ProjectionMatrix>(camera).map(|m| m.0), Some(expected));
    }
}
