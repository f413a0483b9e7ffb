//! Configuration surface: solver selection, system representation, and the
//! closed-domain flags.

use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;
use crate::multigrid::MgParams;

/// Which outer domain faces are solid walls.
///
/// A closed side behaves like a Boundary neighbor (zero flux); an open side
/// behaves like free space with the pressure pinned to zero just outside
/// the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedBoundary {
    pub left: bool,
    pub right: bool,
    pub down: bool,
    pub up: bool,
}

impl ClosedBoundary {
    pub const fn all() -> Self {
        Self {
            left: true,
            right: true,
            down: true,
            up: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            left: false,
            right: false,
            down: false,
            up: false,
        }
    }
}

impl Default for ClosedBoundary {
    fn default() -> Self {
        Self::all()
    }
}

/// Linear solver selection. Resolved to a concrete solver once at
/// configuration time, never per cell.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum SolverKind {
    /// Incomplete-Cholesky preconditioned conjugate gradient with a fixed
    /// iteration budget.
    Iterative { max_iterations: usize, tolerance: f64 },
    /// Geometric multigrid V-cycles over a marker/system pyramid.
    Multigrid(MgParams),
}

impl Default for SolverKind {
    fn default() -> Self {
        SolverKind::Iterative {
            max_iterations: 100,
            tolerance: 1e-6,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub solver: SolverKind,
    /// Solve the fluid-cell-compacted system instead of the grid-shaped
    /// one. Only meaningful for the iterative solver; multigrid always
    /// builds the level pyramid.
    pub compressed: bool,
    pub closed: ClosedBoundary,
}

impl ProjectionConfig {
    /// Reject malformed tolerances and iteration budgets outright rather
    /// than clamping them into something plausible.
    pub fn validate(&self) -> Result<(), ProjectionError> {
        match self.solver {
            SolverKind::Iterative {
                max_iterations,
                tolerance,
            } => {
                if max_iterations == 0 {
                    return Err(ProjectionError::ZeroIterationBudget);
                }
                if !(tolerance > 0.0) {
                    return Err(ProjectionError::InvalidTolerance(tolerance));
                }
            }
            SolverKind::Multigrid(params) => params.validate()?,
        }
        Ok(())
    }
}
