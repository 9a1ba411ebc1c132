//! Local parameterization of the unit sphere.
//!
//! A unit-norm translation direction has two degrees of freedom, so the
//! optimizer must not update it by unconstrained addition in ambient 3-space.
//! This module provides the tangent-plane basis and retraction used by
//! [`crate::optimization::relative_position`]: steps live in the 2-D tangent
//! plane at the current point and are mapped back to the sphere by
//! normalization. The parameterization is independent of the solver so its
//! invariants can be tested in isolation.

use nalgebra::{Unit, Vector2, Vector3};

/// An orthonormal basis of the plane tangent to the unit sphere at a point.
///
/// The basis is only valid at the point it was built for; rebuild it after
/// every accepted step.
#[derive(Debug, Clone, Copy)]
pub struct SphereTangentBasis {
    u: Vector3<f64>,
    v: Vector3<f64>,
}

impl SphereTangentBasis {
    /// Builds the tangent basis at `point`.
    ///
    /// The seed axis is the coordinate axis least aligned with `point`, which
    /// keeps the Gram-Schmidt step well conditioned for every direction.
    pub fn new(point: &Unit<Vector3<f64>>) -> Self {
        let abs = point.map(f64::abs);
        let seed = if abs.x <= abs.y && abs.x <= abs.z {
            Vector3::x()
        } else if abs.y <= abs.z {
            Vector3::y()
        } else {
            Vector3::z()
        };

        let u = (seed - point.as_ref() * point.dot(&seed)).normalize();
        let v = point.cross(&u);
        Self { u, v }
    }

    /// First tangent direction.
    pub fn u(&self) -> &Vector3<f64> {
        &self.u
    }

    /// Second tangent direction.
    pub fn v(&self) -> &Vector3<f64> {
        &self.v
    }

    /// Lifts a 2-D tangent step into ambient coordinates.
    pub fn lift(&self, delta: &Vector2<f64>) -> Vector3<f64> {
        self.u * delta.x + self.v * delta.y
    }

    /// Applies a tangent step at `point` and retracts back onto the sphere.
    ///
    /// The zero step returns `point` unchanged.
    pub fn retract(&self, point: &Unit<Vector3<f64>>, delta: &Vector2<f64>) -> Unit<Vector3<f64>> {
        Unit::new_normalize(point.as_ref() + self.lift(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_directions() -> Vec<Unit<Vector3<f64>>> {
        vec![
            Unit::new_normalize(Vector3::new(1.0, 0.0, 0.0)),
            Unit::new_normalize(Vector3::new(0.0, -1.0, 0.0)),
            Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0)),
            Unit::new_normalize(Vector3::new(1.0, 1.0, 1.0)),
            Unit::new_normalize(Vector3::new(-0.3, 0.7, -0.2)),
            Unit::new_normalize(Vector3::new(1e-8, 1.0, 1e-8)),
        ]
    }

    #[test]
    fn test_basis_is_orthonormal() {
        for point in sample_directions() {
            let basis = SphereTangentBasis::new(&point);
            assert_relative_eq!(basis.u().norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(basis.v().norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(basis.u().dot(basis.v()), 0.0, epsilon = 1e-12);
            assert_relative_eq!(basis.u().dot(&point), 0.0, epsilon = 1e-12);
            assert_relative_eq!(basis.v().dot(&point), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_step_is_identity() {
        for point in sample_directions() {
            let basis = SphereTangentBasis::new(&point);
            let retracted = basis.retract(&point, &Vector2::zeros());
            assert_relative_eq!(retracted.into_inner(), point.into_inner(), epsilon = 1e-15);
        }
    }

    #[test]
    fn test_retraction_stays_on_sphere() {
        for point in sample_directions() {
            let basis = SphereTangentBasis::new(&point);
            for delta in [
                Vector2::new(0.1, -0.2),
                Vector2::new(-2.0, 1.5),
                Vector2::new(1e-9, 0.0),
            ] {
                let retracted = basis.retract(&point, &delta);
                assert_relative_eq!(retracted.norm(), 1.0, epsilon = 1e-12);
            }
        }
    }
}
