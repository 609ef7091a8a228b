//! Materials: per-mesh values for a program's material slots

use std::collections::BTreeMap;

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

use super::{Cubemap, Texture2D};
use crate::backend::{UniformKind, UniformValue};
use crate::error::RenderResult;
use crate::graphics::Graphics;
use crate::shader::{ShaderId, ShaderProgram, UniformRole};

/// A typed material value. Image variants own their GPU texture.
#[derive(Debug, PartialEq)]
pub enum Property {
    Bool(bool),
    Float(f32),
    Int(i32),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
    Texture2D(Option<Texture2D>),
    Cubemap(Option<Cubemap>),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl Property {
    /// Zero value of a slot kind; images start unset
    pub fn default_for(kind: UniformKind) -> Self {
        match kind {
            UniformKind::Bool => Self::Bool(false),
            UniformKind::Float => Self::Float(0.0),
            UniformKind::Int => Self::Int(0),
            UniformKind::Mat2 => Self::Mat2(Mat2::ZERO),
            UniformKind::Mat3 => Self::Mat3(Mat3::ZERO),
            UniformKind::Mat4 => Self::Mat4(Mat4::ZERO),
            UniformKind::Sampler2D => Self::Texture2D(None),
            UniformKind::SamplerCube => Self::Cubemap(None),
            UniformKind::Vec2 => Self::Vec2(Vec2::ZERO),
            UniformKind::Vec3 => Self::Vec3(Vec3::ZERO),
            UniformKind::Vec4 => Self::Vec4(Vec4::ZERO),
        }
    }

    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Bool(_) => UniformKind::Bool,
            Self::Float(_) => UniformKind::Float,
            Self::Int(_) => UniformKind::Int,
            Self::Mat2(_) => UniformKind::Mat2,
            Self::Mat3(_) => UniformKind::Mat3,
            Self::Mat4(_) => UniformKind::Mat4,
            Self::Texture2D(_) => UniformKind::Sampler2D,
            Self::Cubemap(_) => UniformKind::SamplerCube,
            Self::Vec2(_) => UniformKind::Vec2,
            Self::Vec3(_) => UniformKind::Vec3,
            Self::Vec4(_) => UniformKind::Vec4,
        }
    }

    /// Plain value for non-image properties
    pub fn value(&self) -> Option<UniformValue> {
        Some(match *self {
            Self::Bool(v) => UniformValue::Bool(v),
            Self::Float(v) => UniformValue::Float(v),
            Self::Int(v) => UniformValue::Int(v),
            Self::Mat2(v) => UniformValue::Mat2(v),
            Self::Mat3(v) => UniformValue::Mat3(v),
            Self::Mat4(v) => UniformValue::Mat4(v),
            Self::Vec2(v) => UniformValue::Vec2(v),
            Self::Vec3(v) => UniformValue::Vec3(v),
            Self::Vec4(v) => UniformValue::Vec4(v),
            Self::Texture2D(_) | Self::Cubemap(_) => return None,
        })
    }

    /// Deep copy; images are duplicated on the device
    pub fn copy(&self, graphics: &mut Graphics) -> RenderResult<Self> {
        Ok(match self {
            Self::Texture2D(texture) => Self::Texture2D(
                texture
                    .as_ref()
                    .map(|t| t.copy(graphics))
                    .transpose()?,
            ),
            Self::Cubemap(cubemap) => Self::Cubemap(
                cubemap
                    .as_ref()
                    .map(|c| c.copy(graphics))
                    .transpose()?,
            ),
            Self::Bool(v) => Self::Bool(*v),
            Self::Float(v) => Self::Float(*v),
            Self::Int(v) => Self::Int(*v),
            Self::Mat2(v) => Self::Mat2(*v),
            Self::Mat3(v) => Self::Mat3(*v),
            Self::Mat4(v) => Self::Mat4(*v),
            Self::Vec2(v) => Self::Vec2(*v),
            Self::Vec3(v) => Self::Vec3(*v),
            Self::Vec4(v) => Self::Vec4(*v),
        })
    }

    /// Release an owned image, if any
    pub fn dispose(self, graphics: &mut Graphics) {
        match self {
            Self::Texture2D(Some(texture)) => texture.dispose(graphics),
            Self::Cubemap(Some(cubemap)) => cubemap.dispose(graphics),
            _ => {}
        }
    }
}

macro_rules! impl_property_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Property {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_property_from! {
    bool => Bool,
    f32 => Float,
    i32 => Int,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
}

impl From<Texture2D> for Property {
    fn from(texture: Texture2D) -> Self {
        Self::Texture2D(Some(texture))
    }
}

impl From<Cubemap> for Property {
    fn from(cubemap: Cubemap) -> Self {
        Self::Cubemap(Some(cubemap))
    }
}

/// Property values for one shading program.
///
/// Holds exactly one property per material slot of the program at
/// construction time, iterated in name order.
#[derive(Debug, PartialEq)]
pub struct Material {
    shader: ShaderId,
    properties: BTreeMap<String, Property>,
}

impl Material {
    /// Create a material with default values for every material slot
    pub fn new(graphics: &mut Graphics, shader: ShaderId) -> RenderResult<Self> {
        let program = graphics.shader(shader)?;
        let properties = program
            .with_role(UniformRole::Material)
            .map(|u| (u.name().to_string(), Property::default_for(u.kind())))
            .collect();
        Ok(Self { shader, properties })
    }

    pub fn shader(&self) -> ShaderId {
        self.shader
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties.iter().map(|(name, p)| (name.as_str(), p))
    }

    /// Replace a property's value.
    ///
    /// Returns `false` and releases `value` when the material has no
    /// property called `name` or its kind differs. The replaced value's
    /// image, if any, is released.
    pub fn set(&mut self, graphics: &mut Graphics, name: &str, value: impl Into<Property>) -> bool {
        let value = value.into();
        match self.properties.get_mut(name) {
            Some(slot) if slot.kind() == value.kind() => {
                std::mem::replace(slot, value).dispose(graphics);
                true
            }
            Some(slot) => {
                log::debug!(
                    "Material property `{}` is {:?}, ignoring {:?}",
                    name,
                    slot.kind(),
                    value.kind()
                );
                value.dispose(graphics);
                false
            }
            None => {
                log::debug!("Material has no property `{}`", name);
                value.dispose(graphics);
                false
            }
        }
    }

    /// Make `program` current and write every property into it.
    ///
    /// Image properties take consecutive texture units in name order.
    /// Properties the program has no matching slot for are skipped.
    pub fn apply(&self, graphics: &mut Graphics, program: &ShaderProgram) {
        graphics.use_program(program);
        let device = graphics.device_mut();
        let mut unit = 0;

        for (name, property) in &self.properties {
            let Some(uniform) = program.uniform(name) else {
                continue;
            };
            if uniform.kind() != property.kind() {
                continue;
            }
            match property {
                Property::Texture2D(texture) => {
                    match texture {
                        Some(texture) => uniform.set_texture(device, unit, texture.handle()),
                        None => uniform.set(device, UniformValue::TextureUnit(unit)),
                    }
                    unit += 1;
                }
                Property::Cubemap(cubemap) => {
                    match cubemap {
                        Some(cubemap) => uniform.set_texture(device, unit, cubemap.handle()),
                        None => uniform.set(device, UniformValue::TextureUnit(unit)),
                    }
                    unit += 1;
                }
                other => {
                    if let Some(value) = other.value() {
                        uniform.set(device, value);
                    }
                }
            }
        }
    }

    /// Deep copy with duplicated images
    pub fn copy(&self, graphics: &mut Graphics) -> RenderResult<Self> {
        let mut properties = BTreeMap::new();
        for (name, property) in &self.properties {
            properties.insert(name.clone(), property.copy(graphics)?);
        }
        Ok(Self {
            shader: self.shader,
            properties,
        })
    }

    /// Release every image this material owns
    pub fn dispose(self, graphics: &mut Graphics) {
        for (_, property) in self.properties {
            property.dispose(graphics);
        }
    }
}
