//! Top-level projection pipeline: markers -> system -> linear solve ->
//! pressure gradient.

use glam::DVec2;

use crate::config::{ProjectionConfig, SolverKind};
use crate::error::ProjectionError;
use crate::grid::ScalarField;
use crate::markers::{self, MarkerField};
use crate::multigrid::{MgSolver, MgSystem};
use crate::pcg::PcgSolver;
use crate::project;
use crate::system::{self, CompressedSystem, FlatSystem};
use crate::velocity::MacVelocity;

/// The solver variant, resolved once at configuration time.
#[derive(Debug, Clone)]
enum LinearSolver {
    Pcg(PcgSolver),
    Multigrid(MgSolver),
}

/// Single-phase pressure projection on a MAC grid.
///
/// Per [`solve`](PressureSolver::solve) call: classify markers from the
/// signed-distance fields (a pyramid of them when the multigrid solver is
/// configured), assemble the Poisson system, solve it, and subtract the
/// pressure gradient from the face velocities. All intermediate state is
/// owned by this struct and rebuilt every call; nothing leaks across
/// solves.
pub struct PressureSolver {
    config: ProjectionConfig,
    solver: LinearSolver,
    markers: Vec<MarkerField>,
    system: FlatSystem,
    compressed: CompressedSystem,
    mg_system: MgSystem,
    pressure: ScalarField,
}

impl PressureSolver {
    pub fn new(config: ProjectionConfig) -> Result<Self, ProjectionError> {
        config.validate()?;
        let solver = match config.solver {
            SolverKind::Iterative {
                max_iterations,
                tolerance,
            } => LinearSolver::Pcg(PcgSolver::new(max_iterations, tolerance)),
            SolverKind::Multigrid(params) => LinearSolver::Multigrid(MgSolver::new(params)),
        };
        Ok(Self {
            config,
            solver,
            markers: Vec::new(),
            system: FlatSystem::default(),
            compressed: CompressedSystem::default(),
            mg_system: MgSystem::default(),
            pressure: ScalarField::default(),
        })
    }

    /// Project `input` and write the corrected field into `output`.
    ///
    /// Both signed-distance fields use the negative-inside convention; a
    /// fully submerged solve can pass `|_| -1.0` as the fluid SDF and
    /// `|_| f64::MAX` as the boundary SDF.
    pub fn solve<B, F>(
        &mut self,
        input: &MacVelocity,
        boundary_sdf: &B,
        fluid_sdf: &F,
        output: &mut MacVelocity,
    ) -> Result<(), ProjectionError>
    where
        B: Fn(DVec2) -> f64 + Sync,
        F: Fn(DVec2) -> f64 + Sync,
    {
        if output.grid != input.grid {
            return Err(ProjectionError::FieldShapeMismatch);
        }
        self.solve_pressure(input, boundary_sdf, fluid_sdf)?;
        project::apply_pressure_gradient(input, &self.markers[0], &self.pressure, output);
        Ok(())
    }

    /// As [`solve`](PressureSolver::solve), correcting the field in place.
    pub fn solve_in_place<B, F>(
        &mut self,
        vel: &mut MacVelocity,
        boundary_sdf: &B,
        fluid_sdf: &F,
    ) -> Result<(), ProjectionError>
    where
        B: Fn(DVec2) -> f64 + Sync,
        F: Fn(DVec2) -> f64 + Sync,
    {
        self.solve_pressure(vel, boundary_sdf, fluid_sdf)?;
        project::apply_pressure_gradient_in_place(vel, &self.markers[0], &self.pressure);
        Ok(())
    }

    /// Solved pressure on the finest grid, for diagnostics. Zero until the
    /// first solve.
    pub fn pressure(&self) -> &ScalarField {
        &self.pressure
    }

    /// Finest-level markers from the last solve.
    pub fn markers(&self) -> Option<&MarkerField> {
        self.markers.first()
    }

    /// Residual norm left by the last linear solve.
    pub fn last_residual(&self) -> f64 {
        match &self.solver {
            LinearSolver::Pcg(pcg) => pcg.last_residual(),
            LinearSolver::Multigrid(mg) => mg.last_residual(),
        }
    }

    fn solve_pressure<B, F>(
        &mut self,
        input: &MacVelocity,
        boundary_sdf: &B,
        fluid_sdf: &F,
    ) -> Result<(), ProjectionError>
    where
        B: Fn(DVec2) -> f64 + Sync,
        F: Fn(DVec2) -> f64 + Sync,
    {
        let grid = input.grid;
        let max_levels = match &self.solver {
            LinearSolver::Multigrid(mg) => mg.params().max_levels,
            LinearSolver::Pcg(_) => 1,
        };
        self.markers = markers::build_pyramid(&grid, max_levels, boundary_sdf, fluid_sdf)?;

        match &mut self.solver {
            LinearSolver::Pcg(pcg) => {
                if self.config.compressed {
                    self.compressed =
                        system::build_compressed(&self.markers[0], input, self.config.closed);
                    pcg.solve_compressed(&mut self.compressed);
                    self.pressure = ScalarField::new(grid.nx, grid.ny);
                    system::decompress_into(&self.compressed, &mut self.pressure);
                } else {
                    self.system = system::build_flat(&self.markers[0], input, self.config.closed);
                    pcg.solve_flat(&mut self.system);
                    self.pressure = ScalarField {
                        nx: grid.nx,
                        ny: grid.ny,
                        data: self.system.x.clone(),
                    };
                }
            }
            LinearSolver::Multigrid(mg) => {
                // One system per pyramid level; the sub-levels consume a
                // chain of downsampled velocity snapshots.
                let mut levels = Vec::with_capacity(self.markers.len());
                levels.push(system::build_flat(&self.markers[0], input, self.config.closed));
                let mut snapshot: Option<MacVelocity> = None;
                for level in 1..self.markers.len() {
                    let coarser = match &snapshot {
                        Some(finer) => finer.downsample(),
                        None => input.downsample(),
                    };
                    levels.push(system::build_flat(
                        &self.markers[level],
                        &coarser,
                        self.config.closed,
                    ));
                    snapshot = Some(coarser);
                }
                self.mg_system = MgSystem { levels };
                mg.solve(&mut self.mg_system);
                self.pressure = ScalarField {
                    nx: grid.nx,
                    ny: grid.ny,
                    data: self.mg_system.levels[0].x.clone(),
                };
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClosedBoundary;
    use crate::grid::Grid;
    use glam::DVec2;

    #[test]
    fn rejects_invalid_config() {
        let config = ProjectionConfig {
            solver: SolverKind::Iterative {
                max_iterations: 0,
                tolerance: 1e-6,
            },
            ..Default::default()
        };
        assert!(PressureSolver::new(config).is_err());
    }

    #[test]
    fn rejects_mismatched_output_field() {
        let input = MacVelocity::new(Grid::new(4, 4, DVec2::splat(1.0), DVec2::ZERO).unwrap());
        let mut output = MacVelocity::new(Grid::new(8, 8, DVec2::splat(1.0), DVec2::ZERO).unwrap());
        let mut solver = PressureSolver::new(ProjectionConfig::default()).unwrap();
        let err = solver
            .solve(&input, &|_| f64::MAX, &|_| -1.0, &mut output)
            .unwrap_err();
        assert_eq!(err, ProjectionError::FieldShapeMismatch);
    }

    #[test]
    fn all_air_grid_is_a_no_op() {
        let grid = Grid::new(4, 4, DVec2::splat(1.0), DVec2::ZERO).unwrap();
        let mut vel = MacVelocity::new(grid);
        vel.u.fill(2.0);
        let before = vel.u.clone();

        for compressed in [false, true] {
            let config = ProjectionConfig {
                compressed,
                closed: ClosedBoundary::all(),
                ..Default::default()
            };
            let mut solver = PressureSolver::new(config).unwrap();
            solver
                .solve_in_place(&mut vel, &|_| f64::MAX, &|_| f64::MAX)
                .unwrap();
            assert_eq!(vel.u, before);
            assert!(solver.pressure().data.iter().all(|&p| p == 0.0));
        }
    }

    #[test]
    fn pyramid_depth_error_surfaces_from_solve() {
        let grid = Grid::new(6, 6, DVec2::splat(1.0), DVec2::ZERO).unwrap();
        let mut vel = MacVelocity::new(grid);
        let config = ProjectionConfig {
            solver: SolverKind::Multigrid(crate::multigrid::MgParams {
                max_levels: 4,
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut solver = PressureSolver::new(config).unwrap();
        let err = solver
            .solve_in_place(&mut vel, &|_| f64::MAX, &|_| -1.0)
            .unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidPyramidDepth { .. }));
    }
}
