//! Forward rendering pipeline
//!
//! 1. [`LightSystem`] - buckets light entities by priority
//! 2. [`CameraSystem`] - orders cameras by depth
//! 3. [`ForwardRenderer`] - multi-pass lit drawing per camera
//! 4. [`RenderSystem`] - per-frame driver: targets, sky, blit

mod camera_system;
mod forward;
pub mod light_sort;
mod light_system;
mod render_system;

pub use camera_system::CameraSystem;
pub use forward::{ForwardRenderer, FrameStats, LightBatch};
pub use light_sort::{score_light, sort_lights};
pub use light_system::LightSystem;
pub use render_system::RenderSystem;
