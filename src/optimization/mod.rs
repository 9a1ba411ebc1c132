//! The `optimization` module provides the nonlinear refinement routines of the
//! crate.
//!
//! Its centerpiece is the relative-position refiner in [`relative_position`]:
//! given a fixed relative rotation and a set of calibrated correspondences, it
//! refines a unit-norm relative translation direction by minimizing an
//! epipolar-constraint objective with a small damped Gauss-Newton
//! (Levenberg-Marquardt) loop over the sphere's tangent plane.
//!
//! The shared surface lives here: the residual policy, the solver options with
//! their documented defaults, the error taxonomy, and the per-solve summary.

use serde::{Deserialize, Serialize};

pub mod relative_position;

pub use relative_position::{refine_relative_position, RelativePositionRefiner};

/// Per-correspondence residual form for the epipolar objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResidualKind {
    /// The raw algebraic epipolar error `x₂ʰᵀ E x₁ʰ`. Scale-sensitive to the
    /// point position, so distant points dominate the fit.
    Algebraic,
    /// The algebraic error divided by the epipolar-line gradient magnitude, a
    /// first-order approximation of the geometric distance.
    Sampson,
}

/// Options controlling the relative-position refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineOptions {
    /// Residual form. Defaults to [`ResidualKind::Sampson`]; residuals are
    /// never re-weighted (no robust loss).
    pub residual: ResidualKind,
    /// When `true`, correspondences that reconstruct behind either camera are
    /// excluded from the residual sum. Off by default: pre-filtering is the
    /// caller's responsibility, and unfiltered points still contribute.
    pub filter_behind_cameras: bool,
    /// Iteration ceiling for the damped Gauss-Newton loop.
    pub max_iterations: usize,
    /// Relative objective-improvement threshold for convergence.
    pub cost_tolerance: f64,
    /// Tangent-step norm threshold for convergence.
    pub step_tolerance: f64,
    /// Gradient-norm threshold for convergence.
    pub gradient_tolerance: f64,
    /// Initial Levenberg-Marquardt damping factor.
    pub initial_damping: f64,
    /// If `true`, log solve progress at info level.
    pub verbose: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            residual: ResidualKind::Sampson,
            filter_behind_cameras: false,
            max_iterations: 100,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-14,
            gradient_tolerance: 1e-12,
            initial_damping: 1e-4,
            verbose: false,
        }
    }
}

/// Failure modes of the relative-position refinement.
///
/// Degenerate geometry is an anticipated outcome, not a programming error;
/// every variant is surfaced through `Result`, never by panicking.
#[derive(thiserror::Error, Debug)]
pub enum RefineError {
    #[error("At least {minimum} correspondences are required, got {actual}")]
    InsufficientCorrespondences { minimum: usize, actual: usize },
    #[error("Initial relative position must be a finite unit-norm vector")]
    InvalidInitialGuess,
    #[error("Degenerate geometry: the normal equations are rank deficient")]
    DegenerateGeometry,
    #[error("Numerical failure: a non-finite quantity was encountered")]
    NumericalFailure,
    #[error("Did not converge within {iterations} iterations")]
    DidNotConverge { iterations: usize },
}

/// Summary of one refinement solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineSummary {
    /// Objective value at the initial guess.
    pub initial_cost: f64,
    /// Objective value at the refined direction.
    pub final_cost: f64,
    /// Number of iterations performed (accepted and rejected steps).
    pub iterations: usize,
    /// Whether a convergence tolerance terminated the solve.
    pub converged: bool,
}
