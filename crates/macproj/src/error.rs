//! Error type for configuration and construction preconditions.

use thiserror::Error;

/// Precondition violations detected when a grid, configuration, or
/// multigrid pyramid is constructed.
///
/// Numerical non-convergence is deliberately not represented here. Both
/// solver variants are best-effort within a fixed budget; callers that care
/// can inspect the residual after the solve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("grid spacing must be positive, got ({x}, {y})")]
    InvalidSpacing { x: f64, y: f64 },

    #[error("grid resolution must be at least 1 per axis, got {nx}x{ny}")]
    InvalidResolution { nx: usize, ny: usize },

    #[error("solver tolerance must be positive, got {0}")]
    InvalidTolerance(f64),

    #[error("iteration budget must be at least 1")]
    ZeroIterationBudget,

    #[error("SOR factor must lie in (0, 2), got {0}")]
    InvalidSorFactor(f64),

    #[error("multigrid depth {requested} invalid for a {nx}x{ny} grid (supported 1..={supported})")]
    InvalidPyramidDepth {
        requested: usize,
        supported: usize,
        nx: usize,
        ny: usize,
    },

    #[error("velocity field extents do not match the input grid")]
    FieldShapeMismatch,
}
