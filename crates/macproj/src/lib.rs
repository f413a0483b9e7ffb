//! Pressure projection for a 2-D staggered (MAC) grid.
//!
//! Cells are classified fluid, air, or boundary from a pair of signed
//! distance fields, a Poisson system is assembled over the fluid cells,
//! solved with either incomplete-Cholesky PCG or geometric multigrid, and
//! the resulting pressure gradient is subtracted from the face velocities.
//! The corrected field is divergence free on the fluid interior up to the
//! solver tolerance.
//!
//! ```
//! use glam::DVec2;
//! use macproj::{Grid, MacVelocity, PressureSolver, ProjectionConfig};
//!
//! let grid = Grid::new(16, 16, DVec2::splat(1.0 / 16.0), DVec2::ZERO).unwrap();
//! let mut vel = MacVelocity::new(grid);
//! vel.v.fill(-1.0);
//!
//! let mut solver = PressureSolver::new(ProjectionConfig::default()).unwrap();
//! // Closed tank, fluid in the lower half.
//! solver
//!     .solve_in_place(&mut vel, &|_| f64::MAX, &|p: DVec2| p.y - 0.5)
//!     .unwrap();
//! ```

pub mod config;
pub mod error;
pub mod grid;
pub mod markers;
pub mod multigrid;
pub mod pcg;
pub mod project;
pub mod solver;
pub mod system;
pub mod velocity;

pub use config::{ClosedBoundary, ProjectionConfig, SolverKind};
pub use error::ProjectionError;
pub use glam::DVec2;
pub use grid::{Grid, ScalarField};
pub use markers::{Marker, MarkerField};
pub use multigrid::{MgParams, MgSolver, MgSystem};
pub use pcg::PcgSolver;
pub use project::{apply_pressure_gradient, apply_pressure_gradient_in_place};
pub use solver::PressureSolver;
pub use system::{CompressedSystem, FlatSystem, Row};
pub use velocity::MacVelocity;
