//! Rotation algebra: quaternion / matrix / Euler conversions and change of basis.
//!
//! Quaternions are stored as `[w, x, y, z]` (Hamilton convention, the same
//! layout SfM tools write to disk). Rotation matrices act on column vectors.
//!
//! The one rule that matters for every frame conversion in this crate:
//!
//! ```text
//! R' = M · R · Mᵀ
//! ```
//!
//! re-expresses a linear operator `R` in the basis reached through the
//! orthogonal matrix `M`. `R · M` or `M · R` on their own mix two different
//! bases and produce a rotation that is valid but wrong.

use nalgebra::{Matrix3, Rotation3, Vector3};
use thiserror::Error;

/// Tolerance on `‖RᵀR - I‖` beyond which a matrix is not treated as a rotation.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// Quaternion norms further than this from 1 get renormalized.
const QUAT_NORM_EPSILON: f64 = 1e-9;

/// Quaternions with a norm below this carry no orientation.
const QUAT_MIN_NORM: f64 = 1e-12;

/// `sqrt(R00² + R10²)` below this means the middle Euler angle is at ±90°.
const GIMBAL_THRESHOLD: f64 = 1e-6;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum RotationError {
    #[error("quaternion has (near) zero norm {0:.3e}")]
    ZeroNorm(f64),

    #[error("quaternion contains non-finite components")]
    NonFinite,
}

/// Convert a `[w, x, y, z]` quaternion into a rotation matrix.
///
/// Quaternions that are not unit length are renormalized first.
pub fn quat_to_matrix(q: [f64; 4]) -> Result<Matrix3<f64>, RotationError> {
    if q.iter().any(|c| !c.is_finite()) {
        return Err(RotationError::NonFinite);
    }
    let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
    if norm < QUAT_MIN_NORM {
        return Err(RotationError::ZeroNorm(norm));
    }

    let [w, x, y, z] = if (norm - 1.0).abs() > QUAT_NORM_EPSILON {
        [q[0] / norm, q[1] / norm, q[2] / norm, q[3] / norm]
    } else {
        q
    };

    #[rustfmt::skip]
    let r = Matrix3::new(
        1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - w * z),       2.0 * (x * z + w * y),
        2.0 * (x * y + w * z),       1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - w * x),
        2.0 * (x * z - w * y),       2.0 * (y * z + w * x),       1.0 - 2.0 * (x * x + y * y),
    );
    Ok(r)
}

/// Convert a rotation matrix to a unit `[w, x, y, z]` quaternion with `w >= 0`.
///
/// Branches on the largest of the trace and the diagonal terms so the divisor
/// never approaches zero.
pub fn matrix_to_quat(r: &Matrix3<f64>) -> [f64; 4] {
    let (m00, m11, m22) = (r[(0, 0)], r[(1, 1)], r[(2, 2)]);
    let trace = m00 + m11 + m22;

    let q = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        [
            0.25 * s,
            (r[(2, 1)] - r[(1, 2)]) / s,
            (r[(0, 2)] - r[(2, 0)]) / s,
            (r[(1, 0)] - r[(0, 1)]) / s,
        ]
    } else if m00 > m11 && m00 > m22 {
        let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
        [
            (r[(2, 1)] - r[(1, 2)]) / s,
            0.25 * s,
            (r[(0, 1)] + r[(1, 0)]) / s,
            (r[(0, 2)] + r[(2, 0)]) / s,
        ]
    } else if m11 > m22 {
        let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
        [
            (r[(0, 2)] - r[(2, 0)]) / s,
            (r[(0, 1)] + r[(1, 0)]) / s,
            0.25 * s,
            (r[(1, 2)] + r[(2, 1)]) / s,
        ]
    } else {
        let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
        [
            (r[(1, 0)] - r[(0, 1)]) / s,
            (r[(0, 2)] + r[(2, 0)]) / s,
            (r[(1, 2)] + r[(2, 1)]) / s,
            0.25 * s,
        ]
    };

    let norm = q.iter().map(|c| c * c).sum::<f64>().sqrt();
    let sign = if q[0] < 0.0 { -1.0 } else { 1.0 };
    [
        sign * q[0] / norm,
        sign * q[1] / norm,
        sign * q[2] / norm,
        sign * q[3] / norm,
    ]
}

/// Intrinsic XYZ Euler angles in degrees, plus whether the decomposition hit
/// gimbal lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerXyz {
    /// Rotation about X, Y, Z in degrees (`R = Rz · Ry · Rx`).
    pub degrees: Vector3<f64>,
    pub gimbal_locked: bool,
}

/// Decompose `R = Rz(z) · Ry(y) · Rx(x)` into `(x, y, z)` degrees.
///
/// Near gimbal lock (|y| → 90°) one degree of freedom is lost: y is clamped to
/// exactly ±90°, z is pinned to 0 and x carries the remaining rotation.
pub fn matrix_to_euler_xyz_checked(r: &Matrix3<f64>) -> EulerXyz {
    let sy = (r[(0, 0)] * r[(0, 0)] + r[(1, 0)] * r[(1, 0)]).sqrt();

    if sy > GIMBAL_THRESHOLD {
        let x = r[(2, 1)].atan2(r[(2, 2)]);
        let y = (-r[(2, 0)]).atan2(sy);
        let z = r[(1, 0)].atan2(r[(0, 0)]);
        EulerXyz {
            // `+ 0.0` folds -0.0 into 0.0 so exported tables stay clean
            degrees: Vector3::new(x.to_degrees(), y.to_degrees(), z.to_degrees()).add_scalar(0.0),
            gimbal_locked: false,
        }
    } else {
        let x = (-r[(1, 2)]).atan2(r[(1, 1)]);
        let y = if -r[(2, 0)] >= 0.0 { 90.0 } else { -90.0 };
        EulerXyz {
            degrees: Vector3::new(x.to_degrees() + 0.0, y, 0.0),
            gimbal_locked: true,
        }
    }
}

/// Intrinsic XYZ Euler angles in degrees. See [`matrix_to_euler_xyz_checked`].
pub fn matrix_to_euler_xyz(r: &Matrix3<f64>) -> Vector3<f64> {
    matrix_to_euler_xyz_checked(r).degrees
}

/// Inverse of [`matrix_to_euler_xyz`]: builds `Rz · Ry · Rx` from degrees.
pub fn euler_xyz_to_matrix(degrees: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::from_euler_angles(
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    )
    .into_inner()
}

/// Frobenius norm of `RᵀR - I`.
pub fn orthonormality_error(r: &Matrix3<f64>) -> f64 {
    (r.transpose() * r - Matrix3::identity()).norm()
}

/// True for a proper rotation (orthonormal, det +1) within `tolerance`.
pub fn is_rotation(r: &Matrix3<f64>, tolerance: f64) -> bool {
    r.iter().all(|v| v.is_finite())
        && orthonormality_error(r) <= tolerance
        && (r.determinant() - 1.0).abs() <= 3.0 * tolerance
}

/// Project a nearly orthonormal matrix back onto SO(3) using the SVD.
pub fn orthonormalize(r: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = r.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return *r;
    };
    let mut u = u;
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    u * v_t
}

/// Re-express rotation `r` in the basis reached through orthogonal `m`:
/// `M · R · Mᵀ`.
///
/// `m` may be improper (a reflection or handedness change); the result is still
/// a proper rotation. Accumulated floating error beyond
/// [`ORTHONORMAL_TOLERANCE`] is removed by re-orthonormalizing.
pub fn similarity_transform(m: &Matrix3<f64>, r: &Matrix3<f64>) -> Matrix3<f64> {
    let out = m * r * m.transpose();
    if orthonormality_error(&out) > ORTHONORMAL_TOLERANCE {
        orthonormalize(&out)
    } else {
        out
    }
}

/// Camera position in world coordinates from a world-to-camera pose: `-Rᵀ t`.
pub fn camera_center(r_w2c: &Matrix3<f64>, t_w2c: &Vector3<f64>) -> Vector3<f64> {
    -(r_w2c.transpose() * t_w2c)
}

/// Flip a pose between world-to-camera and camera-to-world: `(Rᵀ, -Rᵀ t)`.
pub fn direction_invert(r: &Matrix3<f64>, t: &Vector3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let r_t = r.transpose();
    let t_inv = -(r_t * t);
    (r_t, t_inv)
}

/// Geodesic angle in degrees between two rotations.
pub fn rotation_angle_between(a: &Matrix3<f64>, b: &Matrix3<f64>) -> f64 {
    let q = matrix_to_quat(&(a.transpose() * b));
    let vec_norm = (q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    (2.0 * vec_norm.atan2(q[0].abs())).to_degrees()
}

/// Absolute dot product of two `[w, x, y, z]` quaternions (1 = same rotation).
pub fn quat_similarity(a: [f64; 4], b: [f64; 4]) -> f64 {
    (a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Unit, UnitQuaternion};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_unit_quat(rng: &mut StdRng) -> [f64; 4] {
        loop {
            let q: [f64; 4] = [
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ];
            let n = q.iter().map(|c| c * c).sum::<f64>().sqrt();
            if n > 0.1 {
                return [q[0] / n, q[1] / n, q[2] / n, q[3] / n];
            }
        }
    }

    fn axis_angle(axis: Vector3<f64>, angle: f64) -> Matrix3<f64> {
        UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), angle)
            .to_rotation_matrix()
            .into_inner()
    }

    #[test]
    fn test_quat_to_matrix_matches_nalgebra() {
        let q = [0.8, 0.2, -0.4, 0.4];
        let r = quat_to_matrix(q).unwrap();
        let expected = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            q[0], q[1], q[2], q[3],
        ))
        .to_rotation_matrix()
        .into_inner();
        assert_relative_eq!(r, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_quat_to_matrix_normalizes() {
        let r = quat_to_matrix([2.0, 0.0, 0.0, 0.0]).unwrap();
        assert_relative_eq!(r, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_quat_to_matrix_rejects_degenerate() {
        assert_eq!(
            quat_to_matrix([0.0, 0.0, 0.0, 0.0]),
            Err(RotationError::ZeroNorm(0.0))
        );
        assert_eq!(
            quat_to_matrix([f64::NAN, 0.0, 0.0, 1.0]),
            Err(RotationError::NonFinite)
        );
    }

    #[test]
    fn test_quat_matrix_roundtrip_random() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let q = random_unit_quat(&mut rng);
            let back = matrix_to_quat(&quat_to_matrix(q).unwrap());
            assert!(quat_similarity(q, back) >= 1.0 - 1e-6);
            assert!(back[0] >= 0.0);
        }
    }

    #[test]
    fn test_matrix_to_quat_half_turns() {
        // w == 0 exercises every non-trace branch
        for axis in [Vector3::x(), Vector3::y(), Vector3::z()] {
            let r = axis_angle(axis, std::f64::consts::PI);
            let q = matrix_to_quat(&r);
            assert_relative_eq!(q[0], 0.0, epsilon = 1e-9);
            assert_relative_eq!(quat_to_matrix(q).unwrap(), r, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_matrix_to_quat_near_identity() {
        let r = axis_angle(Vector3::new(1.0, 1.0, 0.0), 1e-8);
        let q = matrix_to_quat(&r);
        assert_relative_eq!(q[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_euler_roundtrip() {
        let angles = Vector3::new(10.0, -35.0, 120.0);
        let r = euler_xyz_to_matrix(&angles);
        let back = matrix_to_euler_xyz_checked(&r);
        assert!(!back.gimbal_locked);
        assert_relative_eq!(back.degrees, angles, epsilon = 1e-9);
    }

    #[test]
    fn test_euler_gimbal_lock_is_clamped() {
        let r = euler_xyz_to_matrix(&Vector3::new(30.0, 90.0, 0.0));
        let e = matrix_to_euler_xyz_checked(&r);
        assert!(e.gimbal_locked);
        assert_eq!(e.degrees.y, 90.0);
        assert_eq!(e.degrees.z, 0.0);
        assert!(e.degrees.iter().all(|v| v.is_finite()));
        assert_relative_eq!(euler_xyz_to_matrix(&e.degrees), r, epsilon = 1e-9);
    }

    #[test]
    fn test_similarity_preserves_orthonormality() {
        let mut rng = StdRng::seed_from_u64(11);
        #[rustfmt::skip]
        let bases = [
            Matrix3::new(0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, -1.0, 0.0),
            Matrix3::new(-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
            Matrix3::new(0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0),
        ];
        for m in bases.iter() {
            for _ in 0..100 {
                let r = quat_to_matrix(random_unit_quat(&mut rng)).unwrap();
                let out = similarity_transform(m, &r);
                assert!(orthonormality_error(&out) < 1e-6);
                assert!(is_rotation(&out, 1e-6));
            }
        }
    }

    #[test]
    fn test_similarity_differs_from_naive_products() {
        // 90° swap about Z: x -> y, y -> -x
        #[rustfmt::skip]
        let m = Matrix3::new(
            0.0, -1.0, 0.0,
            1.0,  0.0, 0.0,
            0.0,  0.0, 1.0,
        );
        let r = axis_angle(Vector3::x(), 0.5);
        let out = similarity_transform(&m, &r);

        // Rotation about X becomes the same rotation about the new Y axis.
        assert_relative_eq!(out, axis_angle(Vector3::y(), 0.5), epsilon = 1e-12);
        assert!((out - r * m).norm() > 1e-3);
        assert!((out - m * r).norm() > 1e-3);
    }

    #[test]
    fn test_direction_invert_roundtrip() {
        let r = axis_angle(Vector3::new(0.3, -0.2, 0.9), 1.1);
        let t = Vector3::new(1.0, -2.0, 3.5);
        let (r1, t1) = direction_invert(&r, &t);
        let (r2, t2) = direction_invert(&r1, &t1);
        assert_relative_eq!(r2, r, epsilon = 1e-12);
        assert_relative_eq!(t2, t, epsilon = 1e-12);
    }

    #[test]
    fn test_camera_center_matches_inverse_translation() {
        let r = axis_angle(Vector3::y(), 0.7);
        let t = Vector3::new(0.5, 0.0, 2.0);
        let (_, t_c2w) = direction_invert(&r, &t);
        assert_relative_eq!(camera_center(&r, &t), t_c2w, epsilon = 1e-12);
    }

    #[test]
    fn test_orthonormalize_repairs_drift() {
        let r = axis_angle(Vector3::z(), 0.3);
        let noisy = r + Matrix3::from_element(1e-4);
        assert!(orthonormality_error(&noisy) > ORTHONORMAL_TOLERANCE);
        let fixed = orthonormalize(&noisy);
        assert!(is_rotation(&fixed, 1e-9));
        assert_relative_eq!(fixed, r, epsilon = 1e-3);
    }

    #[test]
    fn test_rotation_angle_between() {
        let a = axis_angle(Vector3::z(), 0.2);
        let b = axis_angle(Vector3::z(), 0.2 + 30f64.to_radians());
        assert_relative_eq!(rotation_angle_between(&a, &b), 30.0, epsilon = 1e-9);
        assert_relative_eq!(rotation_angle_between(&a, &a), 0.0, epsilon = 1e-9);
    }
}
