//! Core backend abstraction traits
//!
//! [`RenderDevice`] is the seam between the renderer and the GPU. The
//! renderer never talks to a graphics API directly; it drives a device
//! through this trait with handles it got back from the device.

use crate::backend::types::*;
use glam::Vec4;
use std::any::Any;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create shader program: {0}")]
    ProgramCreationFailed(String),
    #[error("Uniform `{name}` is declared as {declared:?} but the program defines it differently")]
    UniformTypeMismatch { name: String, declared: UniformKind },
    #[error("Unknown {0} handle")]
    InvalidHandle(&'static str),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a linked shading program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub(crate) u64);

/// Handle to a GPU texture (2D or cube)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to uploaded vertex and index data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub(crate) u64);

/// Handle to an off-screen color + depth target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetHandle(pub(crate) u64);

/// Resolved location of a parameter slot inside one program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub(crate) program: ProgramHandle,
    pub(crate) slot: u32,
}

impl UniformLocation {
    pub fn program(&self) -> ProgramHandle {
        self.program
    }
}

/// Main graphics device trait
pub trait RenderDevice: Any {
    /// Human-readable backend name
    fn name(&self) -> &'static str;

    /// Size of the output surface in pixels
    fn surface_size(&self) -> (u32, u32);

    /// Begin a new frame
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// End the frame and flush queued GPU work
    fn end_frame(&mut self) -> BackendResult<()>;

    // Shading programs

    /// Create a program from source
    fn create_program(&mut self, source: &ProgramSource) -> BackendResult<ProgramHandle>;

    /// Destroy a program
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Resolve a named parameter slot.
    ///
    /// `Ok(None)` means the program has no such slot; writes to it are
    /// dropped. A slot whose type disagrees with `kind` is an error.
    fn uniform_location(
        &mut self,
        program: ProgramHandle,
        name: &str,
        kind: UniformKind,
    ) -> BackendResult<Option<UniformLocation>>;

    /// Make a program current for subsequent draws
    fn use_program(&mut self, program: ProgramHandle);

    /// Write a parameter value
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    /// Bind a texture to a texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle);

    // Fixed-function state

    /// Replace the fixed-function state used by subsequent draws
    fn apply_state(&mut self, state: &PipelineState);

    // Textures

    /// Create a texture, optionally uploading its pixels
    fn create_texture(
        &mut self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> BackendResult<TextureHandle>;

    /// Duplicate a texture into a new, independently owned handle
    fn copy_texture(&mut self, texture: TextureHandle) -> BackendResult<TextureHandle>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    // Meshes

    /// Upload vertex and index data
    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> BackendResult<MeshHandle>;

    /// Destroy a mesh
    fn destroy_mesh(&mut self, mesh: MeshHandle);

    /// Draw a mesh with the current program, state, textures and target
    fn draw_mesh(&mut self, mesh: MeshHandle);

    // Render targets

    /// Create an off-screen color + depth target
    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<RenderTargetHandle>;

    /// Reallocate a target's attachments at a new size
    fn resize_render_target(
        &mut self,
        target: RenderTargetHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    /// Current size of a target
    fn render_target_size(&self, target: RenderTargetHandle) -> Option<(u32, u32)>;

    /// Destroy a target
    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    /// Direct draws and clears to a target, or to the output surface with `None`
    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>);

    /// Set the viewport on the bound target
    fn set_viewport(&mut self, viewport: Viewport);

    /// Clear color and depth of the bound target
    fn clear(&mut self, color: Vec4);

    /// Copy a target's color attachment into a rectangle of the output surface
    fn blit_to_surface(&mut self, target: RenderTargetHandle, dst: Viewport);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
