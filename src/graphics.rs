//! Device state context
//!
//! [`Graphics`] owns the device, the shader library and the
//! fixed-function state. State setters only mark the state dirty; the
//! device sees the new state right before the next draw.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use glam::Vec4;

use crate::backend::*;
use crate::error::RenderResult;
use crate::shader::{ShaderId, ShaderLibrary, ShaderProgram};

pub struct Graphics {
    device: Box<dyn RenderDevice>,
    shaders: ShaderLibrary,
    state: PipelineState,
    dirty: bool,
    clear_color: Vec4,
    active_program: Option<ProgramHandle>,
}

impl Graphics {
    /// Wrap a device, registering the built-in shaders
    pub fn new(device: Box<dyn RenderDevice>) -> Self {
        Self::with_library(device, ShaderLibrary::with_builtins())
    }

    pub fn with_library(device: Box<dyn RenderDevice>, shaders: ShaderLibrary) -> Self {
        log::info!("Graphics initialized on {}", device.name());
        Self {
            device,
            shaders,
            state: PipelineState::default(),
            dirty: true,
            clear_color: Vec4::new(1.0, 0.0, 1.0, 1.0),
            active_program: None,
        }
    }

    pub fn device(&self) -> &dyn RenderDevice {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> &mut dyn RenderDevice {
        self.device.as_mut()
    }

    /// Downcast the device to a concrete backend
    pub fn backend<T: RenderDevice>(&self) -> Option<&T> {
        self.device.as_any().downcast_ref::<T>()
    }

    pub fn backend_mut<T: RenderDevice>(&mut self) -> Option<&mut T> {
        self.device.as_any_mut().downcast_mut::<T>()
    }

    pub fn shaders(&self) -> &ShaderLibrary {
        &self.shaders
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.shaders
    }

    /// Resolve a shading program, instantiating it on first use
    pub fn shader(&mut self, id: ShaderId) -> RenderResult<Arc<ShaderProgram>> {
        self.shaders.get_or_create(id, self.device.as_mut())
    }

    /// Make a program current
    pub fn use_program(&mut self, program: &ShaderProgram) {
        if self.active_program != Some(program.handle()) {
            self.device.use_program(program.handle());
            self.active_program = Some(program.handle());
        }
    }

    pub fn active_program(&self) -> Option<ProgramHandle> {
        self.active_program
    }

    // Fixed-function state

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Replace the whole state
    pub fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            self.state = state;
            self.dirty = true;
        }
    }

    pub fn set_depth_testing(&mut self, enabled: bool) {
        self.set_state(PipelineState {
            depth_test: enabled,
            ..self.state
        });
    }

    pub fn set_depth_masking(&mut self, enabled: bool) {
        self.set_state(PipelineState {
            depth_write: enabled,
            ..self.state
        });
    }

    pub fn set_depth_func(&mut self, func: CompareFunction) {
        self.set_state(PipelineState {
            depth_func: func,
            ..self.state
        });
    }

    pub fn set_blending(&mut self, blend: Option<BlendState>) {
        self.set_state(PipelineState { blend, ..self.state });
    }

    pub fn set_cull_mode(&mut self, cull_mode: CullMode) {
        self.set_state(PipelineState {
            cull_mode,
            ..self.state
        });
    }

    pub fn set_front_face(&mut self, front_face: FrontFace) {
        self.set_state(PipelineState {
            front_face,
            ..self.state
        });
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Push pending state to the device
    pub fn update(&mut self) {
        if self.dirty {
            self.device.apply_state(&self.state);
            self.dirty = false;
        }
    }

    /// Save the current state; it is restored when the scope drops
    pub fn scoped(&mut self) -> StateScope<'_> {
        StateScope {
            saved: self.state,
            graphics: self,
        }
    }

    pub fn clear_color(&self) -> Vec4 {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
    }

    /// Flush pending state and draw
    pub fn draw_mesh(&mut self, mesh: MeshHandle) {
        self.update();
        self.device.draw_mesh(mesh);
    }

    /// Destroy every cached shading program
    pub fn dispose(&mut self) {
        self.shaders.dispose(self.device.as_mut());
        self.active_program = None;
    }
}

impl std::fmt::Debug for Graphics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graphics")
            .field("device", &self.device.name())
            .field("shaders", &self.shaders)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Restores the saved fixed-function state on drop
pub struct StateScope<'a> {
    graphics: &'a mut Graphics,
    saved: PipelineState,
}

impl StateScope<'_> {
    pub fn saved(&self) -> &PipelineState {
        &self.saved
    }
}

impl Deref for StateScope<'_> {
    type Target = Graphics;

    fn deref(&self) -> &Graphics {
        self.graphics
    }
}

impl DerefMut for StateScope<'_> {
    fn deref_mut(&mut self) -> &mut Graphics {
        self.graphics
    }
}

impl Drop for StateScope<'_> {
    fn drop(&mut self) {
        self.graphics.set_state(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graphics() -> Graphics {
        Graphics::new(Box::new(DummyBackend::default()))
    }

    #[test]
    fn test_state_pushed_lazily() {
        let mut graphics = graphics();
        let mesh = graphics.device_mut().create_mesh(&[], &[]).unwrap();
        let program = graphics.shader(crate::shader::builtin::COLOR).unwrap();
        graphics.use_program(&program);

        graphics.set_depth_func(CompareFunction::Always);
        graphics.set_depth_func(CompareFunction::Less);
        assert_eq!(
            graphics.backend::<DummyBackend>().unwrap().state().depth_func,
            CompareFunction::LessEqual
        );

        graphics.draw_mesh(mesh);
        let backend = graphics.backend::<DummyBackend>().unwrap();
        assert_eq!(backend.draws()[0].state.depth_func, CompareFunction::Less);
        assert_eq!(backend.state_changes(), 1);
    }

    #[test]
    fn test_scope_restores_state() {
        let mut graphics = graphics();
        let before = *graphics.state();
        {
            let mut scope = graphics.scoped();
            scope.set_blending(Some(BlendState::additive()));
            scope.set_depth_masking(false);
            assert_eq!(scope.state().blend, Some(BlendState::additive()));
        }
        assert_eq!(*graphics.state(), before);
    }

    #[test]
    fn test_graphics_defaults() {
        let graphics = graphics();
        assert_eq!(*graphics.state(), PipelineState::default());
        assert_eq!(graphics.clear_color(), Vec4::new(1.0, 0.0, 1.0, 1.0));
        assert!(graphics.is_dirty());
    }
}
