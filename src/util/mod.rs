//! Synthetic-data helpers for two-view experiments.
//!
//! These are the data producers the regression tests are built on: seeded
//! random cameras, random scene points in front of the cameras, and i.i.d.
//! Gaussian pixel noise. They are kept in the public API so downstream users
//! can reproduce the same synthetic setups.

use crate::camera::{Intrinsics, PinholeCamera, Resolution};
use nalgebra::{Vector2, Vector3};
use rand::Rng;

/// Samples a uniform value in `[low, high)`.
pub fn rand_double(rng: &mut impl Rng, low: f64, high: f64) -> f64 {
    if low == high {
        return low;
    }
    rng.gen_range(low..high)
}

/// Samples a standard-normal value via the Box-Muller transform.
pub fn rand_gaussian(rng: &mut impl Rng) -> f64 {
    // gen_range is half-open at 1.0, so 1.0 - sample keeps ln away from zero.
    let u1: f64 = 1.0 - rng.gen_range(0.0..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Adds i.i.d. Gaussian noise with standard deviation `sigma` to a pixel
/// observation.
pub fn add_noise_to_projection(projection: &mut Vector2<f64>, sigma: f64, rng: &mut impl Rng) {
    projection.x += sigma * rand_gaussian(rng);
    projection.y += sigma * rand_gaussian(rng);
}

/// Builds a randomly posed camera with fixed, realistic intrinsics.
///
/// The position is uniform in `[-1, 1]³` and the orientation a small random
/// rotation (angle-axis uniform in `0.2 * [-1, 1]³`), so two such cameras
/// share a wide common field of view. Intrinsics: 1000x1000 sensor, focal
/// length 800, principal point at the center, no skew.
pub fn random_camera(rng: &mut impl Rng) -> PinholeCamera {
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
    .expect("fixed intrinsics are valid");
    camera.position = Vector3::new(
        rand_double(rng, -1.0, 1.0),
        rand_double(rng, -1.0, 1.0),
        rand_double(rng, -1.0, 1.0),
    );
    camera.orientation = 0.2
        * Vector3::new(
            rand_double(rng, -1.0, 1.0),
            rand_double(rng, -1.0, 1.0),
            rand_double(rng, -1.0, 1.0),
        );
    camera
}

/// Samples `n` scene points in front of cameras posed by [`random_camera`]:
/// x and y uniform in `[-2, 2]`, depth uniform in `[8, 10]`.
pub fn random_points_in_front(rng: &mut impl Rng, n: usize) -> Vec<Vector3<f64>> {
    (0..n)
        .map(|_| {
            Vector3::new(
                rand_double(rng, -2.0, 2.0),
                rand_double(rng, -2.0, 2.0),
                rand_double(rng, 8.0, 10.0),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_rand_double_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let value = rand_double(&mut rng, -2.0, 2.0);
            assert!((-2.0..2.0).contains(&value));
        }
        assert_eq!(rand_double(&mut rng, 3.0, 3.0), 3.0);
    }

    #[test]
    fn test_rand_gaussian_moments() {
        let mut rng = StdRng::seed_from_u64(2);
        let samples: Vec<f64> = (0..20_000).map(|_| rand_gaussian(&mut rng)).collect();

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let variance =
            samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / samples.len() as f64;

        assert!(mean.abs() < 0.05, "sample mean {}", mean);
        assert!((variance - 1.0).abs() < 0.05, "sample variance {}", variance);
    }

    #[test]
    fn test_random_points_are_in_front() {
        let mut rng = StdRng::seed_from_u64(3);
        for point in random_points_in_front(&mut rng, 100) {
            assert!(point.z >= 8.0 && point.z < 10.0);
            assert!(point.x.abs() <= 2.0);
            assert!(point.y.abs() <= 2.0);
        }
    }

    #[test]
    fn test_random_camera_projects_scene_points() {
        let mut rng = StdRng::seed_from_u64(4);
        let camera = random_camera(&mut rng);
        for point in random_points_in_front(&mut rng, 50) {
            let pixel = camera.project_point(&point).unwrap();
            assert!(pixel.x.is_finite() && pixel.y.is_finite());
        }
    }
}
