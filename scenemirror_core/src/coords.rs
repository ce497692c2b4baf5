//! Coordinate utilities - pure 4×4 matrix builders.
//!
//! Tracking sources disagree on their native axes: point-tracked image
//! targets report Y-forward poses, plane-anchored sources report Z-forward
//! poses. The scene graph reconciles them once, at the tree boundary, by
//! inserting a synthetic child whose local matrix is one of the correction
//! rotations built here.
//!
//! All matrices are `nalgebra::Matrix4<f64>` (right-handed). The flat
//! 16-element form used on the wire is column-major, matching nalgebra's
//! storage order.

use nalgebra::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Rotation about the X axis by `angle` radians.
pub fn rotation_x(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, c, -s, 0.0,
        0.0, s, c, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about the Y axis by `angle` radians.
pub fn rotation_y(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        c, 0.0, s, 0.0,
        0.0, 1.0, 0.0, 0.0,
        -s, 0.0, c, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Rotation about the Z axis by `angle` radians.
pub fn rotation_z(angle: f64) -> Matrix4<f64> {
    let (s, c) = angle.sin_cos();
    Matrix4::new(
        c, -s, 0.0, 0.0,
        s, c, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Pure translation.
pub fn translation(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&Vector3::new(x, y, z))
}

/// Translation component of an affine transform.
#[inline]
pub fn translation_of(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Builds a matrix from its flat column-major form.
pub fn from_flat(flat: &[f64; 16]) -> Matrix4<f64> {
    Matrix4::from_column_slice(flat)
}

/// Flattens a matrix to its column-major form.
pub fn to_flat(m: &Matrix4<f64>) -> [f64; 16] {
    let mut flat = [0.0; 16];
    flat.copy_from_slice(m.as_slice());
    flat
}

/// Which tracking-source convention a coordinate correction reconciles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionVariant {
    /// Point-tracked targets (image markers, object targets)
    Point,

    /// Plane-anchored sources (ground plane, area targets)
    Plane,
}

impl CorrectionVariant {
    /// Default rotation about X for this variant, in radians.
    pub fn default_angle(&self) -> f64 {
        match self {
            CorrectionVariant::Point => -FRAC_PI_2,
            CorrectionVariant::Plane => FRAC_PI_2,
        }
    }

    /// Correction matrix using the default angle.
    pub fn matrix(&self) -> Matrix4<f64> {
        rotation_x(self.default_angle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_quarter_turns_map_axes() {
        let y = Vector4::new(0.0, 1.0, 0.0, 1.0);
        let z = Vector4::new(0.0, 0.0, 1.0, 1.0);
        let x = Vector4::new(1.0, 0.0, 0.0, 1.0);

        assert_relative_eq!(rotation_x(FRAC_PI_2) * y, z, epsilon = 1e-12);
        assert_relative_eq!(rotation_y(FRAC_PI_2) * z, x, epsilon = 1e-12);
        assert_relative_eq!(rotation_z(FRAC_PI_2) * x, y, epsilon = 1e-12);
    }

    #[test]
    fn test_rotations_are_orthonormal() {
        for angle in [0.0, 0.3, -1.2, 2.5] {
            for r in [rotation_x(angle), rotation_y(angle), rotation_z(angle)] {
                assert_relative_eq!(r * r.transpose(), Matrix4::identity(), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_correction_variants_cancel() {
        let product = CorrectionVariant::Point.matrix() * CorrectionVariant::Plane.matrix();
        assert_relative_eq!(product, Matrix4::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_flat_form_is_column_major() {
        let m = translation(1.0, 2.0, 3.0);
        let flat = to_flat(&m);

        assert_eq!(&flat[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(from_flat(&flat), m);
        assert_eq!(translation_of(&m), Vector3::new(1.0, 2.0, 3.0));
    }
}
