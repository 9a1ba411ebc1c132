//! Refines the relative translation direction between two calibrated views
//! whose relative rotation is already known.
//!
//! The direction from camera 1 to camera 2 is a unit vector with two degrees
//! of freedom. For a candidate direction `t` and the fixed rotation `R`, every
//! correspondence `(x₁, x₂)` in normalized coordinates contributes the
//! epipolar error `x₂ʰᵀ [R·t]× R x₁ʰ`, optionally Sampson-normalized by the
//! epipolar-line gradient magnitude. The sum of squares is minimized with a
//! damped Gauss-Newton (Levenberg-Marquardt) loop whose steps live in the
//! plane tangent to the unit sphere at the current estimate, so the iterate
//! never leaves the sphere and the parameter count stays at two.
//!
//! Rotation estimation, triangulation, and outlier rejection are out of scope:
//! the rotation is a constant and residuals are unweighted.

use crate::geometry::{
    in_front_of_both_cameras, rotation_from_angle_axis, FeatureCorrespondence,
};
use crate::manifold::SphereTangentBasis;
use crate::optimization::{RefineError, RefineOptions, RefineSummary, ResidualKind};
use log::info;
use nalgebra::{Matrix2, Matrix3, Unit, Vector2, Vector3};

/// Two tangent degrees of freedom, one scalar residual per correspondence.
const MIN_CORRESPONDENCES: usize = 2;
/// Norm slack accepted on the initial guess before renormalizing.
const UNIT_NORM_TOLERANCE: f64 = 1e-6;
/// Relative eigenvalue ratio below which the normal equations are treated as
/// rank deficient.
const RANK_TOLERANCE: f64 = 1e-12;
/// Damping ceiling; beyond this the trust region has collapsed.
const MAX_DAMPING: f64 = 1e16;

/// One correspondence, pre-rotated into the frames the residual needs.
struct EpipolarTerm {
    /// `R x₁ʰ`: the first observation rotated into camera 2's frame.
    rotated1: Vector3<f64>,
    /// `x₂ʰ`: the homogeneous second observation.
    feature2: Vector3<f64>,
    /// `Rᵀ x₂ʰ`: the second observation rotated into camera 1's frame.
    counter_rotated2: Vector3<f64>,
}

/// The fixed part of one solve: correspondences and rotation are immutable,
/// only the translation direction moves.
struct EpipolarProblem {
    terms: Vec<EpipolarTerm>,
    rotation: Matrix3<f64>,
    residual: ResidualKind,
}

impl EpipolarProblem {
    fn new(
        matches: &[FeatureCorrespondence],
        rotation: Matrix3<f64>,
        residual: ResidualKind,
    ) -> Self {
        let terms = matches
            .iter()
            .map(|m| {
                let x1 = m.feature1.push(1.0);
                let x2 = m.feature2.push(1.0);
                EpipolarTerm {
                    rotated1: rotation * x1,
                    feature2: x2,
                    counter_rotated2: rotation.transpose() * x2,
                }
            })
            .collect();
        Self {
            terms,
            rotation,
            residual,
        }
    }

    fn len(&self) -> usize {
        self.terms.len()
    }

    /// Residual of one term together with its gradient in ambient 3-space.
    ///
    /// With `y = R x₁ʰ` and `z = Rᵀ x₂ʰ`, the algebraic error is the triple
    /// product `e = t · (x₁ʰ × z)`, which is linear in `t`. The Sampson form
    /// divides by `g = √(l₂ₓ² + l₂ᵧ² + l₁ₓ² + l₁ᵧ²)` built from the epipolar
    /// lines `l₂ = (R t) × y` and `l₁ = z × t`; its gradient follows from the
    /// quotient rule. When `g` underflows (both observations parallel to the
    /// baseline) the term falls back to the algebraic form.
    fn residual_and_gradient(&self, index: usize, t: &Vector3<f64>) -> (f64, Vector3<f64>) {
        let term = &self.terms[index];
        let y = &term.rotated1;
        let z = &term.counter_rotated2;

        // x₁ʰ × z, recovered as Rᵀ (y × x₂ʰ) to reuse the cached rotations.
        let coefficient = self.rotation.transpose() * y.cross(&term.feature2);
        let error = t.dot(&coefficient);

        match self.residual {
            ResidualKind::Algebraic => (error, coefficient),
            ResidualKind::Sampson => {
                let line2 = (self.rotation * t).cross(y);
                let line1 = z.cross(t);
                let g_squared =
                    line2.x * line2.x + line2.y * line2.y + line1.x * line1.x + line1.y * line1.y;
                if g_squared < f64::EPSILON {
                    return (error, coefficient);
                }
                let g = g_squared.sqrt();

                // d l₂ / d t = -[y]× R, d l₁ / d t = [z]×.
                let dline2 = -crate::geometry::skew_symmetric(y) * self.rotation;
                let dline1 = crate::geometry::skew_symmetric(z);
                let g_gradient = (dline2.row(0).transpose() * line2.x
                    + dline2.row(1).transpose() * line2.y
                    + dline1.row(0).transpose() * line1.x
                    + dline1.row(1).transpose() * line1.y)
                    / g;

                let residual = error / g;
                let gradient = coefficient / g - g_gradient * (error / g_squared);
                (residual, gradient)
            }
        }
    }

    /// Sum of squared residuals at `t`.
    fn cost(&self, t: &Vector3<f64>) -> f64 {
        (0..self.len())
            .map(|i| {
                let (r, _) = self.residual_and_gradient(i, t);
                r * r
            })
            .sum()
    }
}

/// Refines a relative translation direction under a known relative rotation.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{Vector2, Vector3};
/// use epipolar_tools::geometry::FeatureCorrespondence;
/// use epipolar_tools::optimization::RelativePositionRefiner;
///
/// // Identity rotation, translation along +x: corresponding features on the
/// // same scanline already satisfy every epipolar constraint.
/// let matches: Vec<FeatureCorrespondence> = (0..8)
///     .map(|i| {
///         let y = -0.2 + 0.05 * i as f64;
///         FeatureCorrespondence::new(
///             Vector2::new(0.1 + 0.02 * i as f64, y),
///             Vector2::new(0.3 + 0.02 * i as f64, y),
///         )
///     })
///     .collect();
///
/// let rotation = Vector3::zeros();
/// let mut position = Vector3::new(1.0, 0.0, 0.0);
/// let summary = RelativePositionRefiner::new()
///     .refine(&matches, &rotation, &mut position)
///     .unwrap();
/// assert!(summary.converged);
/// assert!((position.norm() - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelativePositionRefiner {
    pub options: RefineOptions,
}

impl RelativePositionRefiner {
    /// Creates a refiner with the default options (Sampson residuals,
    /// unweighted, no cheirality filter).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RefineOptions) -> Self {
        Self { options }
    }

    /// Refines `relative_position` in place.
    ///
    /// `matches` holds calibrated correspondences, `relative_rotation` the
    /// fixed angle-axis rotation from camera 1's frame to camera 2's frame,
    /// and `relative_position` a unit-norm initial guess for the direction
    /// from camera 1 to camera 2 in camera 1's frame.
    ///
    /// On success the output is unit-norm. On [`RefineError::DidNotConverge`]
    /// the best accepted estimate is left in the output; on every other error
    /// the output is untouched.
    ///
    /// # Errors
    ///
    /// * [`RefineError::InsufficientCorrespondences`]: fewer than two usable
    ///   correspondences (after the optional cheirality filter).
    /// * [`RefineError::InvalidInitialGuess`]: non-finite or far-from-unit
    ///   initial direction. This is a contract violation, distinct from
    ///   geometric failure.
    /// * [`RefineError::DegenerateGeometry`]: rank-deficient normal equations
    ///   at the start of the solve, e.g. all points collinear with the
    ///   baseline.
    /// * [`RefineError::NumericalFailure`]: a residual, Jacobian entry, or
    ///   step became non-finite.
    /// * [`RefineError::DidNotConverge`]: iteration ceiling reached.
    pub fn refine(
        &self,
        matches: &[FeatureCorrespondence],
        relative_rotation: &Vector3<f64>,
        relative_position: &mut Vector3<f64>,
    ) -> Result<RefineSummary, RefineError> {
        let guess_norm = relative_position.norm();
        if !relative_position.iter().all(|v| v.is_finite())
            || (guess_norm - 1.0).abs() > UNIT_NORM_TOLERANCE
        {
            return Err(RefineError::InvalidInitialGuess);
        }
        let mut t = Unit::new_normalize(*relative_position);

        let rotation = rotation_from_angle_axis(relative_rotation);
        let usable: Vec<FeatureCorrespondence> = if self.options.filter_behind_cameras {
            matches
                .iter()
                .copied()
                .filter(|m| in_front_of_both_cameras(&rotation, &t, m))
                .collect()
        } else {
            matches.to_vec()
        };
        if usable.len() < MIN_CORRESPONDENCES {
            return Err(RefineError::InsufficientCorrespondences {
                minimum: MIN_CORRESPONDENCES,
                actual: usable.len(),
            });
        }

        let problem = EpipolarProblem::new(&usable, rotation, self.options.residual);

        let initial_cost = problem.cost(&t);
        if !initial_cost.is_finite() {
            return Err(RefineError::NumericalFailure);
        }
        let mut cost = initial_cost;
        let mut damping = self.options.initial_damping;
        let mut converged = false;
        let mut iterations = 0;

        if self.options.verbose {
            info!(
                "Refining relative position over {} correspondences, initial cost {:.6e}",
                problem.len(),
                initial_cost
            );
        }

        for iteration in 1..=self.options.max_iterations {
            iterations = iteration;

            let basis = SphereTangentBasis::new(&t);
            let mut jtj = Matrix2::zeros();
            let mut jtr = Vector2::zeros();
            for i in 0..problem.len() {
                let (residual, gradient) = problem.residual_and_gradient(i, &t);
                let row = Vector2::new(gradient.dot(basis.u()), gradient.dot(basis.v()));
                jtj += row * row.transpose();
                jtr += row * residual;
            }
            if !(jtj.iter().all(|v| v.is_finite()) && jtr.iter().all(|v| v.is_finite())) {
                return Err(RefineError::NumericalFailure);
            }

            // Degenerate configurations show up as a collapsed eigenvalue of
            // the 2x2 normal equations before any damping is applied.
            let trace = jtj.trace();
            if iteration == 1 && jtj.determinant() <= RANK_TOLERANCE * trace * trace {
                return Err(RefineError::DegenerateGeometry);
            }

            if jtr.norm() < self.options.gradient_tolerance {
                converged = true;
                break;
            }

            let damped = jtj + Matrix2::from_diagonal(&(jtj.diagonal() * damping));
            let delta = match damped.try_inverse() {
                Some(inverse) => -(inverse * jtr),
                None => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        break;
                    }
                    continue;
                }
            };
            if !delta.iter().all(|v| v.is_finite()) {
                return Err(RefineError::NumericalFailure);
            }

            if delta.norm() < self.options.step_tolerance {
                converged = true;
                break;
            }

            let proposal = basis.retract(&t, &delta);
            let proposal_cost = problem.cost(&proposal);

            if proposal_cost.is_finite() && proposal_cost < cost {
                let improvement = cost - proposal_cost;
                t = proposal;
                cost = proposal_cost;
                damping = (damping / 3.0).max(1e-12);
                if self.options.verbose {
                    info!(
                        "iter {:>3}: cost {:.6e}, step {:.3e}, damping {:.1e}",
                        iteration,
                        cost,
                        delta.norm(),
                        damping
                    );
                }
                if improvement < self.options.cost_tolerance * cost.max(f64::MIN_POSITIVE) {
                    converged = true;
                    break;
                }
            } else {
                damping *= 10.0;
                if self.options.verbose {
                    info!(
                        "iter {:>3}: step rejected (cost {:.6e}), damping {:.1e}",
                        iteration, proposal_cost, damping
                    );
                }
                if damping > MAX_DAMPING {
                    break;
                }
            }
        }

        let refined = t.into_inner();
        if !refined.iter().all(|v| v.is_finite()) {
            return Err(RefineError::NumericalFailure);
        }
        *relative_position = refined;

        if !converged {
            return Err(RefineError::DidNotConverge { iterations });
        }
        if self.options.verbose {
            info!(
                "Converged after {} iterations: cost {:.6e} -> {:.6e}",
                iterations, initial_cost, cost
            );
        }
        Ok(RefineSummary {
            initial_cost,
            final_cost: cost,
            iterations,
            converged,
        })
    }
}

/// Refines a relative translation direction with the default options.
///
/// See [`RelativePositionRefiner::refine`] for the contract.
pub fn refine_relative_position(
    matches: &[FeatureCorrespondence],
    relative_rotation: &Vector3<f64>,
    relative_position: &mut Vector3<f64>,
) -> Result<RefineSummary, RefineError> {
    RelativePositionRefiner::new().refine(matches, relative_rotation, relative_position)
}
