//! Math utilities and types
//!
//! Provides the fundamental math types used by the mesh, scene and render modules.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Build a transform from a position, XYZ euler angles (radians) and a uniform scale.
    ///
    /// The rotation is applied X first, then Y, then Z in the object's local frame,
    /// which matches `translate * rot_x * rot_y * rot_z * scale`.
    pub fn from_euler(position: Vec3, euler: Vec3, uniform_scale: f32) -> Self {
        let rotation = Quat::from_axis_angle(&Vec3::x_axis(), euler.x)
            * Quat::from_axis_angle(&Vec3::y_axis(), euler.y)
            * Quat::from_axis_angle(&Vec3::z_axis(), euler.z);
        Self {
            position,
            rotation,
            scale: Vec3::repeat(uniform_scale),
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Math utility functions
pub mod utils {
    use super::{Mat4, Vec3};

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// Right-handed perspective projection with a `[0, 1]` depth range.
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = -1.0;
        result
    }

    /// Right-handed look-at view matrix
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        #[rustfmt::skip]
        let rotation = Mat4::new(
            right.x,      right.y,      right.z,      0.0,
            camera_up.x,  camera_up.y,  camera_up.z,  0.0,
            -forward.x,   -forward.y,   -forward.z,   0.0,
            0.0,          0.0,          0.0,          1.0,
        );

        rotation * Mat4::new_translation(&-eye)
    }

    /// Column-major array form of a matrix, the layout shader uniform blocks expect.
    pub fn column_major(matrix: &Mat4) -> [[f32; 4]; 4] {
        (*matrix).into()
    }
}
