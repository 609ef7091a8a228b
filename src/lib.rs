//! Forward Renderer - a multi-pass forward rendering core over Bevy ECS
//!
//! Scenes are plain `bevy_ecs` worlds. Each frame the renderer:
//! - buckets light entities by priority and scores them per draw target
//! - draws every visible mesh once per per-fragment light, compositing
//!   later passes additively over the first
//! - renders each camera into an off-screen target and blits it into the
//!   camera's rectangle of the output surface
//!
//! Two backends are provided:
//! - **Dummy**: records draws, clears and blits; no GPU required
//! - **wgpu**: headless GPU rendering (`wgpu-backend` feature)

pub mod backend;
pub mod error;
pub mod graphics;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod shader;

// Re-export Bevy ECS prelude for users
pub use bevy_ecs::prelude::*;

pub use backend::{create_device, DummyBackend, RenderDevice};
#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;
pub use error::{RenderError, RenderResult};
pub use graphics::{Graphics, StateScope};
pub use pipeline::{FrameStats, RenderSystem};

use backend::TextureFormat;
use glam::{Vec3, Vec4};

/// Backend selection for the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendType {
    /// Records commands without touching a GPU
    Dummy,
    /// wgpu backend, rendering headless into an off-screen surface
    #[default]
    Wgpu,
}

/// Configuration for initializing the renderer
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Output surface width
    pub width: u32,
    /// Output surface height
    pub height: u32,
    /// Which backend to use
    pub backend: BackendType,
    /// Lights shaded per fragment for each mesh, one pass each
    pub frag_light_quota: usize,
    pub ambient_color: Vec3,
    /// Color the output surface is cleared to each frame
    pub clear_color: Vec4,
    /// Color format of the off-screen camera target
    pub camera_format: TextureFormat,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            backend: BackendType::Wgpu,
            frag_light_quota: 4,
            ambient_color: Vec3::splat(0.1),
            clear_color: Vec4::new(1.0, 0.0, 1.0, 1.0),
            camera_format: TextureFormat::Rgba16Float,
        }
    }
}
