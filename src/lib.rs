//! Epipolar Tools Library
//!
//! A Rust library for two-view epipolar geometry. Its core routine refines the
//! relative translation direction between two calibrated cameras when the
//! relative rotation between them is already known:
//! - Posed pinhole camera model with calibration inversion
//! - Feature correspondences in normalized coordinates
//! - Essential-matrix and relative-pose helpers
//! - Unit-sphere tangent-plane parameterization
//! - Levenberg-Marquardt relative-position refinement with algebraic or
//!   Sampson-normalized epipolar residuals
//!
//! The library also includes seeded synthetic-data helpers (random cameras,
//! scene points, pixel noise) for building reproducible two-view experiments.

pub mod camera;
pub mod geometry;
pub mod manifold;
pub mod optimization;
pub mod util;

// Re-export commonly used types
pub use camera::{CameraModelError, Intrinsics, PinholeCamera, Resolution};

pub use geometry::{
    essential_from_pose, relative_pose, relative_rotation, FeatureCorrespondence,
};

pub use manifold::SphereTangentBasis;

pub use optimization::{
    refine_relative_position, RefineError, RefineOptions, RefineSummary, RelativePositionRefiner,
    ResidualKind,
};
