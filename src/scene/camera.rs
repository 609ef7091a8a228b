//! Camera components

use bevy_ecs::prelude::*;
use glam::{Mat4, Vec4};

use super::LayerMask;
use crate::backend::Viewport;

/// What a camera draws behind the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearMode {
    /// Clear to the camera color, then draw the skybox cube
    #[default]
    Skybox,
    /// Clear to the camera color only
    SolidColor,
}

/// A viewpoint rendered into its own rectangle of the output surface
#[derive(Component, Debug, Clone)]
pub struct Camera {
    pub clear_mode: ClearMode,
    pub clear_color: Vec4,
    pub layer_mask: LayerMask,
    /// Cameras with higher depth are drawn first
    pub depth: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            clear_mode: ClearMode::Skybox,
            clear_color: Vec4::new(49.0 / 255.0, 77.0 / 255.0, 121.0 / 255.0, 1.0),
            layer_mask: LayerMask::DEFAULT,
            depth: 0.0,
        }
    }
}

impl Camera {
    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_clear_mode(mut self, clear_mode: ClearMode) -> Self {
        self.clear_mode = clear_mode;
        self
    }

    pub fn with_layer_mask(mut self, layer_mask: LayerMask) -> Self {
        self.layer_mask = layer_mask;
        self
    }
}

/// Camera projection type
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Aspect ratio is taken from the camera's viewport
    Perspective { fov_y: f32, near: f32, far: f32 },
    Orthographic {
        half_width: f32,
        half_height: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: 60f32.to_radians(),
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            near,
            far,
        }
    }

    pub fn orthographic(half_width: f32, half_height: f32, near: f32, far: f32) -> Self {
        Projection::Orthographic {
            half_width,
            half_height,
            near,
            far,
        }
    }

    pub fn matrix(&self, aspect: f32) -> Mat4 {
        match *self {
            Projection::Perspective { fov_y, near, far } => {
                Mat4::perspective_rh(fov_y, aspect, near, far)
            }
            Projection::Orthographic {
                half_width,
                half_height,
                near,
                far,
            } => Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                near,
                far,
            ),
        }
    }
}

/// Camera rectangle as fractions of the output surface
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ViewportRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for ViewportRect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }
}

impl ViewportRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Pixel rectangle on a surface of the given size, never empty.
    ///
    /// The rectangle is cropped to the surface, so a camera hanging off
    /// the edge renders only its visible part.
    pub fn to_pixels(&self, surface_width: u32, surface_height: u32) -> Viewport {
        let w = surface_width.max(1);
        let h = surface_height.max(1);
        let x = ((self.x * w as f32) as u32).min(w - 1);
        let y = ((self.y * h as f32) as u32).min(h - 1);
        Viewport {
            x,
            y,
            width: ((self.width * w as f32) as u32).clamp(1, w - x),
            height: ((self.height * h as f32) as u32).clamp(1, h - y),
        }
    }

    pub fn aspect(&self, surface_width: u32, surface_height: u32) -> f32 {
        let pixels = self.to_pixels(surface_width, surface_height);
        pixels.width as f32 / pixels.height as f32
    }
}

/// World-to-view matrix, derived by
/// [`update_view_matrices`](super::update_view_matrices)
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ViewMatrix(pub Mat4);

impl Default for ViewMatrix {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}

/// View-to-clip matrix, derived by
/// [`update_projection_matrices`](super::update_projection_matrices)
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ProjectionMatrix(pub Mat4);

impl Default for ProjectionMatrix {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}
