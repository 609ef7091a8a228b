//! Transform components

use bevy_ecs::prelude::*;
use glam::{Mat3, Mat4, Quat, Vec3};

/// Transform component for positioning objects in 3D space
#[derive(Component, Debug, Clone, Copy)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Translate * rotate * scale
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Get forward direction (local -Z in world space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Get up direction (local +Y in world space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// View matrix looking down this transform's forward axis
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), self.up())
    }

    /// Rotate so that forward points at `target`
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);

        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward));
    }

    pub fn looking_at(mut self, target: Vec3, up: Vec3) -> Self {
        self.look_at(target, up);
        self
    }
}

/// World matrix derived from [`Transform`] by
/// [`update_model_matrices`](super::update_model_matrices).
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ModelMatrix(pub Mat4);

impl Default for ModelMatrix {
    fn default() -> Self {
        Self(Mat4::IDENTITY)
    }
}

impl ModelMatrix {
    pub fn translation(&self) -> Vec3 {
        self.0.w_axis.truncate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_is_translate_rotate_scale() {
        let transform = Transform::from_position_rotation(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
        )
        .with_scale(Vec3::splat(2.0));

        let point = transform.matrix().transform_point3(Vec3::X);
        assert!(point.abs_diff_eq(Vec3::new(1.0, 4.0, 3.0), 1e-5));
    }

    #[test]
    fn test_look_at_points_forward_at_target() {
        let transform = Transform::from_position(Vec3::new(0.0, 0.0, 5.0))
            .looking_at(Vec3::new(5.0, 0.0, 5.0), Vec3::Y);
        assert!(transform.forward().abs_diff_eq(Vec3::X, 1e-5));
        assert!(transform.up().abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_view_matrix_moves_eye_to_origin() {
        let transform = Transform::from_position(Vec3::new(0.0, 1.0, 4.0));
        let eye = transform.view_matrix().transform_point3(transform.position);
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-5));
    }
}
