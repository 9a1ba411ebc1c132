//! Two-view geometry primitives.
//!
//! This module provides the shared vocabulary of the crate: feature
//! correspondences in normalized coordinates, angle-axis rotation helpers,
//! relative-pose extraction from two posed cameras, and the essential matrix
//! relating two calibrated views. The optimization module builds its epipolar
//! residuals on top of these primitives.

use crate::camera::PinholeCamera;
use nalgebra::{Matrix3, Rotation3, Unit, Vector2, Vector3};

/// A pair of corresponding observations of one scene point in two views.
///
/// Both features are expected in normalized (calibration-removed) camera
/// coordinates, see [`crate::camera::PinholeCamera::pixel_to_normalized`].
/// The container is plain data: callers own it, the refiner only reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureCorrespondence {
    /// Normalized observation in the first view.
    pub feature1: Vector2<f64>,
    /// Normalized observation in the second view.
    pub feature2: Vector2<f64>,
}

impl FeatureCorrespondence {
    pub fn new(feature1: Vector2<f64>, feature2: Vector2<f64>) -> Self {
        Self { feature1, feature2 }
    }
}

/// Converts a compact angle-axis vector to a rotation matrix.
pub fn rotation_from_angle_axis(angle_axis: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::from_scaled_axis(*angle_axis).into_inner()
}

/// Converts a rotation matrix back to its compact angle-axis vector.
pub fn angle_axis_from_rotation(rotation: &Matrix3<f64>) -> Vector3<f64> {
    Rotation3::from_matrix(rotation).scaled_axis()
}

/// Computes the relative rotation between two absolute orientations.
///
/// Both inputs are angle-axis world-to-camera rotations; the result is the
/// angle-axis of `R2 * R1ᵀ`, the rotation taking camera 1's frame into
/// camera 2's frame.
pub fn relative_rotation(rotation1: &Vector3<f64>, rotation2: &Vector3<f64>) -> Vector3<f64> {
    let rotation1 = Rotation3::from_scaled_axis(*rotation1);
    let rotation2 = Rotation3::from_scaled_axis(*rotation2);
    (rotation2 * rotation1.inverse()).scaled_axis()
}

/// Extracts the relative pose of `camera2` with respect to `camera1`.
///
/// Returns the relative rotation as an angle-axis vector and the unit-norm
/// relative translation direction, i.e. the direction from camera 1 to
/// camera 2 expressed in camera 1's frame. Baseline length is not recoverable
/// from two calibrated views and is deliberately normalized away.
pub fn relative_pose(
    camera1: &PinholeCamera,
    camera2: &PinholeCamera,
) -> (Vector3<f64>, Unit<Vector3<f64>>) {
    let rotation = relative_rotation(&camera1.orientation, &camera2.orientation);
    let baseline = camera1.rotation_matrix() * (camera2.position - camera1.position);
    (rotation, Unit::new_normalize(baseline))
}

/// Builds the skew-symmetric cross-product matrix `[v]×` with `[v]× w = v × w`.
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Builds the essential matrix for a relative pose.
///
/// `rotation` is the angle-axis relative rotation and `position` the relative
/// translation direction in camera 1's frame, as produced by
/// [`relative_pose`]. The translation is rotated into camera 2's frame so the
/// constraint reads `x₂ʰᵀ [R·t]× R x₁ʰ = 0` for any scene point observed as
/// `x₁`/`x₂` in normalized coordinates.
pub fn essential_from_pose(rotation: &Vector3<f64>, position: &Vector3<f64>) -> Matrix3<f64> {
    let rotation = rotation_from_angle_axis(rotation);
    skew_symmetric(&(rotation * position)) * rotation
}

/// Tests whether a correspondence reconstructs in front of both cameras.
///
/// Depth signs are recovered from the two-view relation
/// `d₂·x₂ʰ = R (d₁·x₁ʰ − t)` by cross-product elimination. `rotation` is the
/// relative rotation matrix and `position` the relative translation direction
/// in camera 1's frame; the baseline scale is assumed positive.
pub fn in_front_of_both_cameras(
    rotation: &Matrix3<f64>,
    position: &Vector3<f64>,
    correspondence: &FeatureCorrespondence,
) -> bool {
    let x1 = correspondence.feature1.push(1.0);
    let x2 = correspondence.feature2.push(1.0);

    let y = rotation * x1;
    let b = rotation * position;

    let y_cross_x2 = y.cross(&x2);
    let denom = y_cross_x2.norm_squared();
    if denom < f64::EPSILON {
        // Rays parallel to the baseline carry no depth information.
        return false;
    }

    let depth1 = b.cross(&x2).dot(&y_cross_x2) / denom;
    let depth2 = b.cross(&y).dot(&y_cross_x2) / denom;
    depth1 > 0.0 && depth2 > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Intrinsics, Resolution};
    use approx::assert_relative_eq;

    fn posed_camera(orientation: Vector3<f64>, position: Vector3<f64>) -> PinholeCamera {
        let mut camera = PinholeCamera::new(
            Intrinsics {
                fx: 800.0,
                fy: 800.0,
                cx: 500.0,
                cy: 500.0,
                skew: 0.0,
            },
            Resolution {
                width: 1000,
                height: 1000,
            },
        )
        .unwrap();
        camera.orientation = orientation;
        camera.position = position;
        camera
    }

    fn normalized_observation(camera: &PinholeCamera, point: &Vector3<f64>) -> Vector2<f64> {
        let pixel = camera.project_point(point).unwrap();
        camera.pixel_to_normalized(&pixel).unwrap()
    }

    #[test]
    fn test_relative_rotation_of_identical_orientations_is_zero() {
        let orientation = Vector3::new(0.1, -0.2, 0.05);
        let relative = relative_rotation(&orientation, &orientation);
        assert_relative_eq!(relative.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_axis_round_trip() {
        let angle_axis = Vector3::new(0.3, -0.1, 0.25);
        let recovered = angle_axis_from_rotation(&rotation_from_angle_axis(&angle_axis));
        assert_relative_eq!(recovered, angle_axis, epsilon = 1e-9);
    }

    #[test]
    fn test_skew_symmetric_matches_cross_product() {
        let a = Vector3::new(0.4, -1.2, 2.0);
        let b = Vector3::new(-0.7, 0.3, 1.1);
        assert_relative_eq!(skew_symmetric(&a) * b, a.cross(&b), epsilon = 1e-15);
    }

    #[test]
    fn test_essential_matrix_annihilates_perfect_correspondences() {
        let camera1 = posed_camera(Vector3::new(0.02, -0.05, 0.1), Vector3::new(0.1, -0.3, 0.2));
        let camera2 = posed_camera(Vector3::new(-0.04, 0.08, 0.03), Vector3::new(0.8, 0.1, -0.5));
        let (rotation, position) = relative_pose(&camera1, &camera2);
        let essential = essential_from_pose(&rotation, &position);

        for point in [
            Vector3::new(1.0, -0.5, 9.0),
            Vector3::new(-1.5, 0.8, 8.2),
            Vector3::new(0.2, 1.4, 10.0),
        ] {
            let x1 = normalized_observation(&camera1, &point).push(1.0);
            let x2 = normalized_observation(&camera2, &point).push(1.0);
            let constraint = (x2.transpose() * essential * x1)[(0, 0)];
            assert_relative_eq!(constraint, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cheirality_sign() {
        let camera1 = posed_camera(Vector3::zeros(), Vector3::zeros());
        let camera2 = posed_camera(Vector3::new(0.0, 0.05, 0.0), Vector3::new(1.0, 0.0, 0.0));
        let (rotation_aa, position) = relative_pose(&camera1, &camera2);
        let rotation = rotation_from_angle_axis(&rotation_aa);

        let point = Vector3::new(0.3, -0.2, 7.0);
        let correspondence = FeatureCorrespondence::new(
            normalized_observation(&camera1, &point),
            normalized_observation(&camera2, &point),
        );

        assert!(in_front_of_both_cameras(
            &rotation,
            &position,
            &correspondence
        ));
        // Flipping the baseline reconstructs the point behind the cameras.
        assert!(!in_front_of_both_cameras(
            &rotation,
            &(-position.into_inner()),
            &correspondence
        ));
    }
}
