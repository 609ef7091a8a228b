//! Light types for the scene

use bevy_ecs::prelude::*;
use glam::Vec3;

use super::Transform;

/// How the renderer treats a light when it has to choose between
/// per-vertex and per-fragment shading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightPriority {
    /// Promoted to per-fragment by score while fragment slots remain.
    #[default]
    Automatic,
    /// Always shaded per fragment.
    Important,
    /// Always shaded per vertex.
    NotImportant,
}

/// Emitted light. Shape and placement come from [`Caster`] and
/// [`Transform`] on the same entity.
#[derive(Component, Debug, Clone)]
pub struct Light {
    /// Linear RGB
    pub color: Vec3,
    pub intensity: f32,
    pub priority: LightPriority,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            color: Vec3::new(1.0, 244.0 / 255.0, 214.0 / 255.0),
            intensity: 1.0,
            priority: LightPriority::Automatic,
        }
    }
}

impl Light {
    pub fn new(color: Vec3, intensity: f32) -> Self {
        Self {
            color,
            intensity: intensity.max(0.0),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: LightPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Light source shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CasterKind {
    #[default]
    Directional,
    Point,
    Spot,
}

/// Geometry of a light source
#[derive(Component, Debug, Clone)]
pub struct Caster {
    pub kind: CasterKind,
    /// Effective radius for point and spot lights
    pub radius: f32,
    /// Spot inner cutoff, degrees
    pub inner_cutoff: f32,
    /// Spot outer cutoff, degrees
    pub outer_cutoff: f32,
}

impl Default for Caster {
    fn default() -> Self {
        Self {
            kind: CasterKind::Directional,
            radius: 10.0,
            inner_cutoff: 25.0,
            outer_cutoff: 35.0,
        }
    }
}

impl Caster {
    pub fn directional() -> Self {
        Self::default()
    }

    pub fn point(radius: f32) -> Self {
        Self {
            kind: CasterKind::Point,
            radius,
            ..Default::default()
        }
    }

    pub fn spot(radius: f32, inner_cutoff: f32, outer_cutoff: f32) -> Self {
        Self {
            kind: CasterKind::Spot,
            radius,
            inner_cutoff,
            outer_cutoff,
        }
    }
}

/// Everything a shading program needs to know about one light,
/// gathered from its `Light`, `Caster` and `Transform`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSample {
    pub kind: CasterKind,
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
    pub direction: Vec3,
    pub radius: f32,
    /// Radians
    pub inner_cutoff: f32,
    /// Radians
    pub outer_cutoff: f32,
}

impl LightSample {
    pub fn new(light: &Light, caster: &Caster, transform: &Transform) -> Self {
        Self {
            kind: caster.kind,
            color: light.color,
            intensity: light.intensity,
            position: transform.position,
            direction: transform.forward(),
            radius: caster.radius,
            inner_cutoff: caster.inner_cutoff.to_radians(),
            outer_cutoff: caster.outer_cutoff.to_radians(),
        }
    }

    /// Gather a light entity's sample, or `None` if it lacks a component
    pub fn from_entity(world: &World, entity: Entity) -> Option<Self> {
        let light = world.get::<Light>(entity)?;
        let caster = world.get::<Caster>(entity)?;
        let transform = world.get::<Transform>(entity)?;
        Some(Self::new(light, caster, transform))
    }
}
