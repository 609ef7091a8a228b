//! Scene components
//!
//! Everything the renderer reads from the ECS world lives here. Entities
//! are plain `bevy_ecs` entities; the renderer only borrows the world.

mod camera;
mod layer;
mod light;
mod systems;
mod transform;

pub use camera::*;
pub use layer::*;
pub use light::*;
pub use systems::*;
pub use transform::*;

use bevy_ecs::prelude::*;

use crate::resources::Model;

/// Enable flag. Entities without it are active.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Active(pub bool);

impl Default for Active {
    fn default() -> Self {
        Self(true)
    }
}

/// Whether an entity takes part in rendering
pub fn is_active(world: &World, entity: Entity) -> bool {
    world.get::<Active>(entity).map_or(true, |active| active.0)
}

/// Meshes drawn at the entity's [`ModelMatrix`]
#[derive(Component, Debug)]
pub struct Renderable {
    pub model: Model,
}

impl Renderable {
    pub fn new(model: Model) -> Self {
        Self { model }
    }
}
