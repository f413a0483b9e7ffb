//! Pressure projection for a 3-D staggered (MAC) grid.
//!
//! Cells are classified fluid, air, or boundary from a pair of signed
//! distance fields, a Poisson system is assembled over the fluid cells,
//! solved with either incomplete-Cholesky PCG or geometric multigrid, and
//! the resulting pressure gradient is subtracted from the face velocities.
//! The corrected field is divergence free on the fluid interior up to the
//! solver tolerance.
//!
//! ```
//! use glam::DVec3;
//! use macproj3d::{Grid3D, MacVelocity3D, PressureSolver3D, ProjectionConfig};
//!
//! let grid = Grid3D::new(8, 8, 8, DVec3::splat(1.0 / 8.0), DVec3::ZERO).unwrap();
//! let mut vel = MacVelocity3D::new(grid);
//! vel.v.fill(-1.0);
//!
//! let mut solver = PressureSolver3D::new(ProjectionConfig::default()).unwrap();
//! // Closed tank, fluid in the lower half.
//! solver
//!     .solve_in_place(&mut vel, &|_| f64::MAX, &|p: DVec3| p.y - 0.5)
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
pub use glam::DVec3;
pub use grid::{Grid3D, ScalarField3D};
pub use markers::{Marker, MarkerField3D};
pub use multigrid::{MgParams, MgSolver, MgSystem};
pub use pcg::PcgSolver;
pub use project::{apply_pressure_gradient, apply_pressure_gradient_in_place};
pub use solver::PressureSolver3D;
pub use system::{CompressedSystem3D, FlatSystem3D, Row};
pub use velocity::MacVelocity3D;
