//! Camera draw order

use bevy_ecs::prelude::*;

use crate::scene::{is_active, Camera};

/// Active cameras in draw order: descending depth, ties in the order
/// they were given.
#[derive(Debug, Clone, Default)]
pub struct CameraSystem {
    sorted: Vec<(Entity, f32)>,
}

impl CameraSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the order from `cameras`; inactive entities and entities
    /// without a [`Camera`] are left out
    pub fn sort(&mut self, world: &World, cameras: &[Entity]) {
        self.sorted.clear();
        for &entity in cameras {
            if !is_active(world, entity) {
                continue;
            }
            let Some(camera) = world.get::<Camera>(entity) else {
                continue;
            };
            self.insert(entity, camera.depth);
        }
    }

    fn insert(&mut self, entity: Entity, depth: f32) {
        let index = self
            .sorted
            .iter()
            .position(|&(_, other)| other < depth)
            .unwrap_or(self.sorted.len());
        self.sorted.insert(index, (entity, depth));
    }

    pub fn sorted(&self) -> impl Iterator<Item = Entity> + '_ {
        self.sorted.iter().map(|&(entity, _)| entity)
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Active;

    #[test]
    fn test_descending_depth_ties_keep_order() {
        let mut world = World::new();
        let cameras: Vec<_> = [0.0, 5.0, -2.0, 5.0]
            .into_iter()
            .map(|depth| world.spawn(Camera::default().with_depth(depth)).id())
            .collect();

        let mut system = CameraSystem::new();
        system.sort(&world, &cameras);

        let order: Vec<_> = system.sorted().collect();
        assert_eq!(order, vec![cameras[1], cameras[3], cameras[0], cameras[2]]);
    }

    #[test]
    fn test_inactive_and_missing_cameras_skipped() {
        let mut world = World::new();
        let active = world.spawn(Camera::default()).id();
        let inactive = world.spawn((Camera::default(), Active(false))).id();
        let not_a_camera = world.spawn_empty().id();

        let mut system = CameraSystem::new();
        system.sort(&world, &[active, inactive, not_a_camera]);

        assert_eq!(system.sorted().collect::<Vec<_>>(), vec![active]);
        assert_eq!(system.len(), 1);
    }
}
