//! Built-in shading techniques

use super::{ProgramBuilder, ShaderDefinition, ShaderId, UniformRole};
use crate::backend::{ProgramSource, UniformKind};
use crate::error::RenderResult;

pub const STANDARD: ShaderId = ShaderId::new("standard");
pub const COLOR: ShaderId = ShaderId::new("color");
pub const TEXTURE: ShaderId = ShaderId::new("texture");
pub const SKYBOX: ShaderId = ShaderId::new("skybox");

fn source(label: &str, wgsl: &str) -> ProgramSource {
    ProgramSource {
        label: label.to_string(),
        wgsl: wgsl.to_string(),
    }
}

/// Lit surface with albedo, metallic, roughness, ambient occlusion,
/// normal and height parameters
pub struct StandardShader;

impl ShaderDefinition for StandardShader {
    fn id(&self) -> ShaderId {
        STANDARD
    }

    fn source(&self) -> ProgramSource {
        source("standard", include_str!("wgsl/standard.wgsl"))
    }

    fn declare(&self, program: &mut ProgramBuilder<'_>) -> RenderResult<()> {
        program
            .uniform("model", UniformKind::Mat4, UniformRole::Model)?
            .uniform("view", UniformKind::Mat4, UniformRole::View)?
            .uniform("projection", UniformKind::Mat4, UniformRole::Projection)?
            .uniform("modelView", UniformKind::Mat4, UniformRole::ModelView)?
            .uniform("normal", UniformKind::Mat3, UniformRole::Normal)?
            .lighting()?;

        for map in ["albedo", "metallic", "roughness", "ao", "normal", "height"] {
            let mut chars = map.chars();
            let capitalized: String = chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect())
                .unwrap_or_default();
            program
                .material(&format!("material.use{capitalized}Map"), UniformKind::Bool)?
                .material(&format!("material.{map}Map"), UniformKind::Sampler2D)?;
        }

        program
            .material("material.albedoColor", UniformKind::Vec3)?
            .material("material.metallicValue", UniformKind::Float)?
            .material("material.roughnessValue", UniformKind::Float)?
            .material("material.heightScale", UniformKind::Float)?;
        Ok(())
    }
}

/// Unlit solid color
pub struct ColorShader;

impl ShaderDefinition for ColorShader {
    fn id(&self) -> ShaderId {
        COLOR
    }

    fn source(&self) -> ProgramSource {
        source("color", include_str!("wgsl/color.wgsl"))
    }

    fn declare(&self, program: &mut ProgramBuilder<'_>) -> RenderResult<()> {
        program
            .uniform(
                "modelViewProjection",
                UniformKind::Mat4,
                UniformRole::ModelViewProjection,
            )?
            .material("material.color", UniformKind::Vec4)?;
        Ok(())
    }
}

/// Unlit textured surface
pub struct TextureShader;

impl ShaderDefinition for TextureShader {
    fn id(&self) -> ShaderId {
        TEXTURE
    }

    fn source(&self) -> ProgramSource {
        source("texture", include_str!("wgsl/texture.wgsl"))
    }

    fn declare(&self, program: &mut ProgramBuilder<'_>) -> RenderResult<()> {
        program
            .uniform(
                "modelViewProjection",
                UniformKind::Mat4,
                UniformRole::ModelViewProjection,
            )?
            .material("material.texture", UniformKind::Sampler2D)?;
        Ok(())
    }
}

/// Sky cube sampled by view direction
pub struct SkyboxShader;

impl ShaderDefinition for SkyboxShader {
    fn id(&self) -> ShaderId {
        SKYBOX
    }

    fn source(&self) -> ProgramSource {
        source("skybox", include_str!("wgsl/skybox.wgsl"))
    }

    fn declare(&self, program: &mut ProgramBuilder<'_>) -> RenderResult<()> {
        program
            .uniform(
                "viewProjection",
                UniformKind::Mat4,
                UniformRole::ViewProjection,
            )?
            .material("skybox", UniformKind::SamplerCube)?;
        Ok(())
    }
}
