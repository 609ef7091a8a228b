//! Typed parameter slots of a shading program

use crate::backend::*;
use crate::error::{RenderError, RenderResult};

/// What the renderer feeds into a slot each draw.
///
/// Only [`UniformRole::Material`] slots are exposed as material
/// properties; the others are filled by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformRole {
    Model,
    View,
    Projection,
    ModelView,
    ViewProjection,
    ModelViewProjection,
    /// Inverse transpose of the model matrix (world-space normals)
    Normal,
    AmbientColor,
    Material,
    /// Written by the program's own code (light arrays, counts)
    Internal,
}

/// A named, typed, write-only handle into a program's parameter slot.
///
/// A slot the program does not define has no location; writes to it
/// are dropped.
#[derive(Debug, Clone)]
pub struct Uniform {
    name: String,
    kind: UniformKind,
    role: UniformRole,
    location: Option<UniformLocation>,
}

impl Uniform {
    pub fn new(
        device: &mut dyn RenderDevice,
        program: ProgramHandle,
        name: &str,
        kind: UniformKind,
        role: UniformRole,
    ) -> RenderResult<Self> {
        if name.is_empty() {
            return Err(RenderError::EmptyUniformName);
        }
        let location = device.uniform_location(program, name, kind)?;
        if location.is_none() {
            log::debug!("Uniform `{}` is not present in the program", name);
        }
        Ok(Self {
            name: name.to_string(),
            kind,
            role,
            location,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UniformKind {
        self.kind
    }

    pub fn role(&self) -> UniformRole {
        self.role
    }

    pub fn location(&self) -> Option<UniformLocation> {
        self.location
    }

    pub fn is_bound(&self) -> bool {
        self.location.is_some()
    }

    /// Write a value. No-op without a location or when the value does
    /// not fit the declared kind.
    pub fn set(&self, device: &mut dyn RenderDevice, value: UniformValue) {
        let Some(location) = self.location else {
            return;
        };
        if !value.fits(self.kind) {
            log::warn!(
                "Uniform `{}` is {:?}, ignoring {:?}",
                self.name,
                self.kind,
                value
            );
            return;
        }
        device.set_uniform(location, &value);
    }

    /// Point an image slot at `unit` and bind `texture` there
    pub fn set_texture(&self, device: &mut dyn RenderDevice, unit: u32, texture: TextureHandle) {
        if self.location.is_none() || !self.kind.is_sampler() {
            return;
        }
        self.set(device, UniformValue::TextureUnit(unit));
        device.bind_texture(unit, texture);
    }
}
