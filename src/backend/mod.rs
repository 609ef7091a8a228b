//! Backend abstraction layer
//!
//! Provides the device trait and the types both backends share.

pub mod dummy;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use dummy::DummyBackend;
pub use traits::*;
pub use types::*;

use crate::{BackendType, RendererConfig};

/// Create the device selected by `config.backend`
pub fn create_device(config: &RendererConfig) -> BackendResult<Box<dyn RenderDevice>> {
    match config.backend {
        BackendType::Dummy => Ok(Box::new(DummyBackend::new(config.width, config.height))),
        #[cfg(feature = "wgpu-backend")]
        BackendType::Wgpu => Ok(Box::new(wgpu_backend::WgpuBackend::new_headless(
            config.width,
            config.height,
        )?)),
        #[cfg(not(feature = "wgpu-backend"))]
        BackendType::Wgpu => Err(BackendError::InitializationFailed(
            "wgpu backend not compiled in (enable the `wgpu-backend` feature)".into(),
        )),
    }
}
