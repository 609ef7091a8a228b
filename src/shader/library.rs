//! Registry of shading techniques

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{builtin, ProgramBuilder, ShaderProgram};
use crate::backend::{ProgramSource, RenderDevice};
use crate::error::{RenderError, RenderResult};

/// Identifier a material uses to reference its shading technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(&'static str);

impl ShaderId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A shading technique: its source and the slots it declares
pub trait ShaderDefinition: Send + Sync {
    fn id(&self) -> ShaderId;

    fn source(&self) -> ProgramSource;

    /// Declare every slot of the program
    fn declare(&self, program: &mut ProgramBuilder<'_>) -> RenderResult<()>;
}

/// Lazily instantiated, cached shading programs keyed by [`ShaderId`]
#[derive(Default)]
pub struct ShaderLibrary {
    definitions: HashMap<ShaderId, Box<dyn ShaderDefinition>>,
    programs: HashMap<ShaderId, Arc<ShaderProgram>>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with the standard, color, texture and skybox techniques
    pub fn with_builtins() -> Self {
        let mut library = Self::new();
        library.register(builtin::StandardShader);
        library.register(builtin::ColorShader);
        library.register(builtin::TextureShader);
        library.register(builtin::SkyboxShader);
        library
    }

    /// Register a technique. A technique already registered under the
    /// same id is replaced only if it has not been instantiated yet.
    pub fn register<D: ShaderDefinition + 'static>(&mut self, definition: D) -> bool {
        let id = definition.id();
        if self.programs.contains_key(&id) {
            log::warn!("Shader `{}` is already in use and cannot be replaced", id);
            return false;
        }
        self.definitions.insert(id, Box::new(definition));
        true
    }

    pub fn contains(&self, id: ShaderId) -> bool {
        self.definitions.contains_key(&id)
    }

    /// Already-instantiated program, if any
    pub fn get(&self, id: ShaderId) -> Option<Arc<ShaderProgram>> {
        self.programs.get(&id).cloned()
    }

    /// Instantiate on first request, then serve from the cache
    pub fn get_or_create(
        &mut self,
        id: ShaderId,
        device: &mut dyn RenderDevice,
    ) -> RenderResult<Arc<ShaderProgram>> {
        if let Some(program) = self.programs.get(&id) {
            return Ok(program.clone());
        }
        let definition = self
            .definitions
            .get(&id)
            .ok_or(RenderError::UnknownShader(id))?;

        log::debug!("Instantiating shader `{}`", id);
        let handle = device.create_program(&definition.source())?;
        let mut builder = ProgramBuilder::new(device, id, handle);
        if let Err(err) = definition.declare(&mut builder) {
            device.destroy_program(handle);
            return Err(err);
        }
        let program = Arc::new(builder.build());
        self.programs.insert(id, program.clone());
        Ok(program)
    }

    /// Destroy every instantiated program
    pub fn dispose(&mut self, device: &mut dyn RenderDevice) {
        for (_, program) in self.programs.drain() {
            device.destroy_program(program.handle());
        }
    }
}

impl fmt::Debug for ShaderLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<_> = self.definitions.keys().collect();
        registered.sort();
        f.debug_struct("ShaderLibrary")
            .field("registered", &registered)
            .field("instantiated", &self.programs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyBackend, UniformKind};

    struct BrokenShader;

    impl ShaderDefinition for BrokenShader {
        fn id(&self) -> ShaderId {
            ShaderId::new("broken")
        }

        fn source(&self) -> ProgramSource {
            ProgramSource {
                label: "broken".into(),
                wgsl: String::new(),
            }
        }

        fn declare(&self, program: &mut ProgramBuilder<'_>) -> RenderResult<()> {
            program.material("", UniformKind::Float)?;
            Ok(())
        }
    }

    #[test]
    fn test_programs_are_cached() {
        let mut backend = DummyBackend::default();
        let mut library = ShaderLibrary::with_builtins();

        assert!(library.get(builtin::STANDARD).is_none());
        let first = library.get_or_create(builtin::STANDARD, &mut backend).unwrap();
        let second = library.get_or_create(builtin::STANDARD, &mut backend).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.live_programs(), 1);
    }

    #[test]
    fn test_unknown_shader() {
        let mut backend = DummyBackend::default();
        let mut library = ShaderLibrary::new();
        let result = library.get_or_create(ShaderId::new("nope"), &mut backend);
        assert!(matches!(result, Err(RenderError::UnknownShader(_))));
    }

    #[test]
    fn test_failed_declaration_releases_program() {
        let mut backend = DummyBackend::default();
        let mut library = ShaderLibrary::new();
        library.register(BrokenShader);

        let result = library.get_or_create(ShaderId::new("broken"), &mut backend);
        assert!(matches!(result, Err(RenderError::EmptyUniformName)));
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_in_use_shader_not_replaced() {
        let mut backend = DummyBackend::default();
        let mut library = ShaderLibrary::with_builtins();
        library.get_or_create(builtin::COLOR, &mut backend).unwrap();

        assert!(!library.register(builtin::ColorShader));
        library.dispose(&mut backend);
        assert_eq!(backend.live_programs(), 0);
        assert!(library.register(builtin::ColorShader));
    }
}
