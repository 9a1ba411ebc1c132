//! Implements a posed pinhole camera.
//!
//! This module provides the [`PinholeCamera`] struct: a distortion-free pinhole
//! projection model together with an extrinsic pose (orientation and position in
//! the world frame). It is the data producer for the epipolar refinement
//! routines in [`crate::optimization`]: it projects world points into pixel
//! observations and inverts its calibration so observations can be compared in
//! normalized coordinates across cameras.

use crate::camera::{validation, CameraModelError, Intrinsics, Resolution};
use nalgebra::{Matrix3, Rotation3, Vector2, Vector3};
use std::fs;
use std::io::Write;
use yaml_rust::YamlLoader;

/// A pinhole camera with a pose in the world frame.
///
/// The orientation is stored as a compact angle-axis vector describing the
/// rotation from world coordinates into the camera frame. The position is the
/// camera center expressed in world coordinates, so a world point `X` maps to
/// camera coordinates as `R * (X - position)`.
///
/// # Examples
///
/// ```rust
/// use nalgebra::Vector3;
/// use epipolar_tools::camera::{PinholeCamera, Intrinsics, Resolution};
///
/// let camera = PinholeCamera::new(
///     Intrinsics { fx: 800.0, fy: 800.0, cx: 500.0, cy: 500.0, skew: 0.0 },
///     Resolution { width: 1000, height: 1000 },
/// ).unwrap();
///
/// let pixel = camera.project_point(&Vector3::new(0.0, 0.0, 5.0)).unwrap();
/// assert!((pixel.x - 500.0).abs() < 1e-12);
/// assert!((pixel.y - 500.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    /// The intrinsic parameters [`Intrinsics`] (fx, fy, cx, cy, skew).
    pub intrinsics: Intrinsics,
    /// The sensor resolution [`Resolution`] (width, height).
    pub resolution: Resolution,
    /// Angle-axis rotation taking world coordinates into the camera frame.
    pub orientation: Vector3<f64>,
    /// Camera center in world coordinates.
    pub position: Vector3<f64>,
}

impl PinholeCamera {
    /// Creates a new [`PinholeCamera`] with an identity pose.
    ///
    /// # Errors
    ///
    /// Returns a [`CameraModelError`] if the intrinsics are invalid
    /// (non-positive focal length, non-finite principal point or skew).
    pub fn new(
        intrinsics: Intrinsics,
        resolution: Resolution,
    ) -> Result<Self, CameraModelError> {
        let camera = PinholeCamera {
            intrinsics,
            resolution,
            orientation: Vector3::zeros(),
            position: Vector3::zeros(),
        };
        camera.validate_params()?;
        Ok(camera)
    }

    /// Returns the world-to-camera rotation as a rotation matrix.
    pub fn rotation_matrix(&self) -> Rotation3<f64> {
        Rotation3::from_scaled_axis(self.orientation)
    }

    /// Builds the 3x3 upper-triangular calibration matrix `K`.
    pub fn calibration_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.intrinsics.fx,
            self.intrinsics.skew,
            self.intrinsics.cx,
            0.0,
            self.intrinsics.fy,
            self.intrinsics.cy,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Inverts the calibration matrix with an invertibility check.
    ///
    /// # Errors
    ///
    /// Returns [`CameraModelError::CalibrationNotInvertible`] if `K` is
    /// singular, which only happens for ill-formed intrinsics.
    pub fn inverse_calibration_matrix(&self) -> Result<Matrix3<f64>, CameraModelError> {
        self.calibration_matrix()
            .try_inverse()
            .ok_or(CameraModelError::CalibrationNotInvertible)
    }

    /// Projects a world point into pixel coordinates.
    ///
    /// The point is first rotated into the camera frame, `p = R * (X - c)`,
    /// then projected through the pinhole model:
    /// `u = fx * x / z + skew * y / z + cx`, `v = fy * y / z + cy`.
    ///
    /// No image-bounds check is applied: observations outside the sensor are
    /// legitimate inputs to epipolar constraints once de-calibrated.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::PointAtCameraCenter`]: the point is at or behind
    ///   the camera's principal plane.
    pub fn project_point(&self, point_world: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let point_camera = self.rotation_matrix() * (point_world - self.position);

        if point_camera.z < f64::EPSILON.sqrt() {
            return Err(CameraModelError::PointAtCameraCenter);
        }

        let x = point_camera.x / point_camera.z;
        let y = point_camera.y / point_camera.z;

        let u = self.intrinsics.fx * x + self.intrinsics.skew * y + self.intrinsics.cx;
        let v = self.intrinsics.fy * y + self.intrinsics.cy;

        Ok(Vector2::new(u, v))
    }

    /// De-calibrates a pixel observation into normalized camera coordinates.
    ///
    /// Applies `K⁻¹` to the homogeneous pixel and de-homogenizes, which removes
    /// focal length, principal point, and skew. Normalized observations from
    /// two calibrated cameras can be compared directly through the essential
    /// matrix.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::CalibrationNotInvertible`]: ill-formed intrinsics.
    pub fn pixel_to_normalized(&self, pixel: &Vector2<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let inv_calibration = self.inverse_calibration_matrix()?;
        let normalized = inv_calibration * Vector3::new(pixel.x, pixel.y, 1.0);
        Ok(Vector2::new(
            normalized.x / normalized.z,
            normalized.y / normalized.z,
        ))
    }

    /// Loads intrinsics and resolution from a YAML file.
    ///
    /// The expected structure matches the files under `samples/`: a `cam0` key
    /// holding `intrinsics` (fx, fy, cx, cy, and optionally skew) and
    /// `resolution` (width, height). The pose is runtime state and is
    /// initialized to identity.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::IOError`]: the file cannot be read.
    /// * [`CameraModelError::YamlError`]: malformed YAML.
    /// * [`CameraModelError::InvalidParams`]: missing fields or wrong types.
    /// * Validation errors for out-of-range intrinsics.
    ///
    /// # Related
    /// * [`PinholeCamera::save_to_yaml()`]
    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;
        let doc = &docs[0];

        let intrinsics_yaml = doc["cam0"]["intrinsics"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams("YAML missing 'intrinsics' or not an array".to_string())
        })?;
        let resolution_yaml = doc["cam0"]["resolution"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams("YAML missing 'resolution' or not an array".to_string())
        })?;

        let intrinsics = Intrinsics {
            fx: intrinsics_yaml[0].as_f64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid fx: not a float".to_string())
            })?,
            fy: intrinsics_yaml[1].as_f64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid fy: not a float".to_string())
            })?,
            cx: intrinsics_yaml[2].as_f64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid cx: not a float".to_string())
            })?,
            cy: intrinsics_yaml[3].as_f64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid cy: not a float".to_string())
            })?,
            skew: match intrinsics_yaml.get(4) {
                Some(value) => value.as_f64().ok_or_else(|| {
                    CameraModelError::InvalidParams("Invalid skew: not a float".to_string())
                })?,
                None => 0.0,
            },
        };

        let resolution = Resolution {
            width: resolution_yaml[0].as_i64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid width: not an integer".to_string())
            })? as u32,
            height: resolution_yaml[1].as_i64().ok_or_else(|| {
                CameraModelError::InvalidParams("Invalid height: not an integer".to_string())
            })? as u32,
        };

        Self::new(intrinsics, resolution)
    }

    /// Saves the camera's intrinsics and resolution to a YAML file.
    ///
    /// The pose is deliberately not persisted.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::YamlError`]: serialization failure.
    /// * [`CameraModelError::IOError`]: the file cannot be created or written.
    ///
    /// # Related
    /// * [`PinholeCamera::load_from_yaml()`]
    pub fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let yaml = serde_yaml::to_value(serde_yaml::Mapping::from_iter([(
            serde_yaml::Value::String("cam0".to_string()),
            serde_yaml::to_value(serde_yaml::Mapping::from_iter([
                (
                    serde_yaml::Value::String("camera_model".to_string()),
                    serde_yaml::Value::String("pinhole".to_string()),
                ),
                (
                    serde_yaml::Value::String("intrinsics".to_string()),
                    serde_yaml::to_value(vec![
                        self.intrinsics.fx,
                        self.intrinsics.fy,
                        self.intrinsics.cx,
                        self.intrinsics.cy,
                        self.intrinsics.skew,
                    ])
                    .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                ),
                (
                    serde_yaml::Value::String("resolution".to_string()),
                    serde_yaml::to_value(vec![self.resolution.width, self.resolution.height])
                        .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
                ),
            ]))
            .map_err(|e| CameraModelError::YamlError(e.to_string()))?,
        )]))
        .map_err(|e| CameraModelError::YamlError(e.to_string()))?;

        let yaml_string =
            serde_yaml::to_string(&yaml).map_err(|e| CameraModelError::YamlError(e.to_string()))?;

        let mut file =
            fs::File::create(path).map_err(|e| CameraModelError::IOError(e.to_string()))?;

        file.write_all(yaml_string.as_bytes())
            .map_err(|e| CameraModelError::IOError(e.to_string()))?;

        Ok(())
    }

    /// Validates the intrinsic parameters of the camera.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::FocalLengthMustBePositive`]
    /// * [`CameraModelError::PrincipalPointMustBeFinite`]
    pub fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)?;
        Ok(())
    }
}

/// Contains unit tests for the posed pinhole camera.
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn test_camera() -> PinholeCamera {
        PinholeCamera::new(
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
        .unwrap()
    }

    #[test]
    fn test_pinhole_load_from_yaml() {
        let camera = PinholeCamera::load_from_yaml("samples/pinhole.yaml").unwrap();

        assert_eq!(camera.intrinsics.fx, 461.629);
        assert_eq!(camera.intrinsics.fy, 460.152);
        assert_eq!(camera.intrinsics.cx, 362.680);
        assert_eq!(camera.intrinsics.cy, 246.049);
        assert_eq!(camera.intrinsics.skew, 0.0);
        assert_eq!(camera.resolution.width, 752);
        assert_eq!(camera.resolution.height, 480);
        assert_eq!(camera.orientation, Vector3::zeros());
        assert_eq!(camera.position, Vector3::zeros());
    }

    #[test]
    fn test_project_and_decalibrate_consistency() {
        let mut camera = test_camera();
        camera.orientation = Vector3::new(0.05, -0.1, 0.02);
        camera.position = Vector3::new(0.3, -0.2, 0.1);

        let point_world = Vector3::new(0.5, -0.4, 6.0);
        let pixel = camera.project_point(&point_world).unwrap();
        let normalized = camera.pixel_to_normalized(&pixel).unwrap();

        // De-calibration must reproduce the perspective division of the
        // camera-frame point.
        let point_camera = camera.rotation_matrix() * (point_world - camera.position);
        assert_relative_eq!(
            normalized.x,
            point_camera.x / point_camera.z,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            normalized.y,
            point_camera.y / point_camera.z,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_project_point_behind_camera() {
        let camera = test_camera();
        let result = camera.project_point(&Vector3::new(0.0, 0.0, -1.0));
        assert!(matches!(
            result,
            Err(CameraModelError::PointAtCameraCenter)
        ));
    }

    #[test]
    fn test_inverse_calibration_round_trip() {
        let mut camera = test_camera();
        camera.intrinsics.skew = 0.3;

        let calibration = camera.calibration_matrix();
        let inverse = camera.inverse_calibration_matrix().unwrap();
        let identity = calibration * inverse;

        assert_relative_eq!(identity, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_intrinsics_rejected() {
        let result = PinholeCamera::new(
            Intrinsics {
                fx: -1.0,
                fy: 800.0,
                cx: 500.0,
                cy: 500.0,
                skew: 0.0,
            },
            Resolution {
                width: 1000,
                height: 1000,
            },
        );
        assert!(matches!(
            result,
            Err(CameraModelError::FocalLengthMustBePositive)
        ));
    }
}
