//! Per-frame light classification

use bevy_ecs::prelude::*;
use glam::Vec3;

use crate::scene::{Light, LightPriority};

/// Light entities bucketed by priority, refreshed once per frame.
///
/// Order within a bucket follows world iteration order.
#[derive(Debug, Clone)]
pub struct LightSystem {
    important: Vec<Entity>,
    not_important: Vec<Entity>,
    automatic: Vec<Entity>,
    ambient_color: Vec3,
}

impl Default for LightSystem {
    fn default() -> Self {
        Self::new(Vec3::splat(0.1))
    }
}

impl LightSystem {
    pub fn new(ambient_color: Vec3) -> Self {
        Self {
            important: Vec::new(),
            not_important: Vec::new(),
            automatic: Vec::new(),
            ambient_color,
        }
    }

    /// Rebuild the buckets from every entity carrying a [`Light`]
    pub fn refresh(&mut self, world: &mut World) {
        self.important.clear();
        self.not_important.clear();
        self.automatic.clear();

        let mut query = world.query::<(Entity, &Light)>();
        for (entity, light) in query.iter(world) {
            match light.priority {
                LightPriority::Important => self.important.push(entity),
                LightPriority::NotImportant => self.not_important.push(entity),
                LightPriority::Automatic => self.automatic.push(entity),
            }
        }

        log::trace!(
            "Lights: {} important, {} not important, {} automatic",
            self.important.len(),
            self.not_important.len(),
            self.automatic.len()
        );
    }

    /// Always shaded per fragment
    pub fn important(&self) -> &[Entity] {
        &self.important
    }

    /// Always shaded per vertex
    pub fn not_important(&self) -> &[Entity] {
        &self.not_important
    }

    /// Promoted to per-fragment by score, per vertex otherwise
    pub fn automatic(&self) -> &[Entity] {
        &self.automatic
    }

    pub fn ambient_color(&self) -> Vec3 {
        self.ambient_color
    }

    pub fn set_ambient_color(&mut self, color: Vec3) {
        self.ambient_color = color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lights_bucketed_by_priority() {
        let mut world = World::new();
        let important = world
            .spawn(Light::default().with_priority(LightPriority::Important))
            .id();
        let background = world
            .spawn(Light::default().with_priority(LightPriority::NotImportant))
            .id();
        let auto_a = world.spawn(Light::default()).id();
        let auto_b = world.spawn(Light::default()).id();
        world.spawn_empty();

        let mut lights = LightSystem::default();
        lights.refresh(&mut world);

        assert_eq!(lights.important(), &[important]);
        assert_eq!(lights.not_important(), &[background]);
        assert_eq!(lights.automatic().len(), 2);
        assert!(lights.automatic().contains(&auto_a));
        assert!(lights.automatic().contains(&auto_b));
    }

    #[test]
    fn test_refresh_replaces_previous_frame() {
        let mut world = World::new();
        let light = world.spawn(Light::default()).id();
        let mut lights = LightSystem::default();
        lights.refresh(&mut world);
        assert_eq!(lights.automatic().len(), 1);

        world.despawn(light);
        lights.refresh(&mut world);
        assert!(lights.automatic().is_empty());
    }

    #[test]
    fn test_default_ambient() {
        let mut lights = LightSystem::default();
        assert_eq!(lights.ambient_color(), Vec3::splat(0.1));
        lights.set_ambient_color(Vec3::ZERO);
        assert_eq!(lights.ambient_color(), Vec3::ZERO);
    }
}
