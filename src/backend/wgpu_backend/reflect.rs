//! WGSL program reflection
//!
//! Uniforms live in one block at `@group(0) @binding(0)`. Its members
//! are flattened into dotted paths (`material.albedoColor`,
//! `vertPointLights[3].light.color`). Images live in group 1; a `__` in
//! the WGSL name stands for `.` and the image's sampler, if any, is the
//! global named `<image>_sampler`.

use std::collections::HashMap;

use naga::{ArraySize, ImageDimension, ScalarKind, TypeInner, VectorSize};

use crate::backend::types::UniformKind;

pub const UNIFORM_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    pub offset: u32,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub binding: u32,
    pub sampler: Option<u32>,
    pub kind: UniformKind,
}

/// Layout of a program's parameters
#[derive(Debug, Clone, Default)]
pub struct ProgramLayout {
    /// Size of the uniform block in bytes, 0 without one
    pub uniform_size: u32,
    pub uniforms: HashMap<String, UniformField>,
    pub textures: Vec<TextureBinding>,
}

impl ProgramLayout {
    pub fn kind_of(&self, name: &str) -> Option<UniformKind> {
        self.uniforms
            .get(name)
            .map(|field| field.kind)
            .or_else(|| self.texture(name).map(|(_, t)| t.kind))
    }

    pub fn texture(&self, name: &str) -> Option<(usize, &TextureBinding)> {
        self.textures.iter().enumerate().find(|(_, t)| t.name == name)
    }
}

/// Parse WGSL and extract its parameter layout
pub fn reflect(wgsl: &str) -> Result<ProgramLayout, String> {
    let module = naga::front::wgsl::parse_str(wgsl).map_err(|e| e.emit_to_string(wgsl))?;
    let mut layout = ProgramLayout::default();
    let mut samplers = HashMap::new();

    for (_, var) in module.global_variables.iter() {
        let (Some(binding), Some(name)) = (&var.binding, &var.name) else {
            continue;
        };
        let inner = &module.types[var.ty].inner;

        match var.space {
            naga::AddressSpace::Uniform if binding.group == UNIFORM_GROUP => {
                if layout.uniform_size > 0 {
                    log::warn!("Ignoring extra uniform block `{}`", name);
                    continue;
                }
                layout.uniform_size = inner.size(module.to_ctx());
                let prefix = match inner {
                    TypeInner::Struct { .. } => String::new(),
                    _ => name.clone(),
                };
                flatten(&module, var.ty, &prefix, 0, &mut layout.uniforms);
            }
            naga::AddressSpace::Handle if binding.group == TEXTURE_GROUP => match inner {
                TypeInner::Image { dim, .. } => {
                    let kind = match dim {
                        ImageDimension::Cube => UniformKind::SamplerCube,
                        _ => UniformKind::Sampler2D,
                    };
                    layout.textures.push(TextureBinding {
                        name: name.replace("__", "."),
                        binding: binding.binding,
                        sampler: None,
                        kind,
                    });
                }
                TypeInner::Sampler { .. } => {
                    samplers.insert(name.replace("__", "."), binding.binding);
                }
                _ => {}
            },
            _ => {}
        }
    }

    for texture in &mut layout.textures {
        texture.sampler = samplers.get(&format!("{}_sampler", texture.name)).copied();
    }
    layout.textures.sort_by_key(|t| t.binding);
    Ok(layout)
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn flatten(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    path: &str,
    offset: u32,
    out: &mut HashMap<String, UniformField>,
) {
    let kind = match &module.types[ty].inner {
        TypeInner::Struct { members, .. } => {
            for member in members {
                let name = member.name.as_deref().unwrap_or_default();
                flatten(module, member.ty, &join(path, name), offset + member.offset, out);
            }
            return;
        }
        TypeInner::Array {
            base,
            size: ArraySize::Constant(count),
            stride,
        } => {
            for i in 0..count.get() {
                flatten(module, *base, &format!("{path}[{i}]"), offset + i * stride, out);
            }
            return;
        }
        TypeInner::Scalar(scalar) => match scalar.kind {
            ScalarKind::Float => UniformKind::Float,
            ScalarKind::Sint => UniformKind::Int,
            ScalarKind::Uint | ScalarKind::Bool => UniformKind::Bool,
            _ => return,
        },
        TypeInner::Vector { size, .. } => match size {
            VectorSize::Bi => UniformKind::Vec2,
            VectorSize::Tri => UniformKind::Vec3,
            VectorSize::Quad => UniformKind::Vec4,
        },
        TypeInner::Matrix { columns, rows, .. } => match (columns, rows) {
            (VectorSize::Bi, VectorSize::Bi) => UniformKind::Mat2,
            (VectorSize::Tri, VectorSize::Tri) => UniformKind::Mat3,
            (VectorSize::Quad, VectorSize::Quad) => UniformKind::Mat4,
            _ => return,
        },
        _ => return,
    };
    out.insert(path.to_string(), UniformField { offset, kind });
}
