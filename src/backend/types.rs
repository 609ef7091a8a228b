//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    /// Six square faces, uploaded in +X, -X, +Y, -Y, +Z, -Z order.
    Cube,
}

impl TextureKind {
    pub fn layers(&self) -> u32 {
        match self {
            TextureKind::D2 => 1,
            TextureKind::Cube => 6,
        }
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub sampler: SamplerDescriptor,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            kind: TextureKind::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
            sampler: SamplerDescriptor::default(),
        }
    }
}

impl TextureDescriptor {
    /// Size in bytes of the full pixel payload (all layers).
    pub fn data_size(&self) -> usize {
        (self.width * self.height * self.format.bytes_per_pixel() * self.kind.layers()) as usize
    }
}

/// Standard vertex with position, normal, UV, and tangent
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub tangent: Vec4,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
        }
    }
}

/// Front face winding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    Ccw,
    Cw,
}

impl FrontFace {
    pub fn reversed(self) -> Self {
        match self {
            FrontFace::Ccw => FrontFace::Cw,
            FrontFace::Cw => FrontFace::Ccw,
        }
    }
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Compare function for depth tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Blend equation (color and alpha share factors)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl BlendState {
    pub fn alpha_blending() -> Self {
        Self {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
        }
    }

    pub fn additive() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::One,
        }
    }
}

/// Fixed-function state consumed by every draw.
///
/// Backends receive the whole struct through
/// [`RenderDevice::apply_state`](super::RenderDevice::apply_state); a
/// pipeline-object backend keys its pipeline cache on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunction,
    /// `None` disables blending.
    pub blend: Option<BlendState>,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_func: CompareFunction::LessEqual,
            blend: Some(BlendState::alpha_blending()),
            cull_mode: CullMode::Back,
            front_face: FrontFace::Ccw,
        }
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Sampler descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
        }
    }
}

impl SamplerDescriptor {
    pub fn clamped() -> Self {
        Self {
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            ..Default::default()
        }
    }
}

/// Declared type of a shading-program parameter slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Bool,
    Float,
    Int,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
    SamplerCube,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    pub fn is_sampler(&self) -> bool {
        matches!(self, UniformKind::Sampler2D | UniformKind::SamplerCube)
    }
}

/// A value written into a parameter slot.
///
/// Image slots receive the texture unit the image was bound to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Float(f32),
    Int(i32),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
    TextureUnit(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl UniformValue {
    /// Whether this value can be written into a slot of `kind`.
    pub fn fits(&self, kind: UniformKind) -> bool {
        matches!(
            (self, kind),
            (UniformValue::Bool(_), UniformKind::Bool)
                | (UniformValue::Float(_), UniformKind::Float)
                | (UniformValue::Int(_), UniformKind::Int)
                | (UniformValue::Mat2(_), UniformKind::Mat2)
                | (UniformValue::Mat3(_), UniformKind::Mat3)
                | (UniformValue::Mat4(_), UniformKind::Mat4)
                | (UniformValue::TextureUnit(_), UniformKind::Sampler2D)
                | (UniformValue::TextureUnit(_), UniformKind::SamplerCube)
                | (UniformValue::Vec2(_), UniformKind::Vec2)
                | (UniformValue::Vec3(_), UniformKind::Vec3)
                | (UniformValue::Vec4(_), UniformKind::Vec4)
        )
    }
}

/// Source handed to the device when a shading program is created
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub label: String,
    /// WGSL module with `vs_main` and `fs_main` entry points.
    pub wgsl: String,
}

/// Pixel rectangle on a render target or the output surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_fits_kind() {
        assert!(UniformValue::TextureUnit(0).fits(UniformKind::Sampler2D));
        assert!(UniformValue::TextureUnit(0).fits(UniformKind::SamplerCube));
        assert!(UniformValue::Mat4(Mat4::IDENTITY).fits(UniformKind::Mat4));
        assert!(!UniformValue::Mat3(Mat3::IDENTITY).fits(UniformKind::Mat4));
        assert!(!UniformValue::Float(1.0).fits(UniformKind::Int));
    }

    #[test]
    fn test_cube_descriptor_size() {
        let desc = TextureDescriptor {
            width: 4,
            height: 4,
            kind: TextureKind::Cube,
            ..Default::default()
        };
        assert_eq!(desc.data_size(), 4 * 4 * 4 * 6);
    }

    #[test]
    fn test_default_pipeline_state() {
        let state = PipelineState::default();
        assert!(state.depth_test);
        assert!(state.depth_write);
        assert_eq!(state.depth_func, CompareFunction::LessEqual);
        assert_eq!(state.blend, Some(BlendState::alpha_blending()));
        assert_eq!(state.cull_mode, CullMode::Back);
        assert_eq!(state.front_face, FrontFace::Ccw);
    }
}
