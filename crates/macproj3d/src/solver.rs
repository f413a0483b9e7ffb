//! Top-level projection pipeline: markers -> system -> linear solve ->
//! pressure gradient.

use glam::DVec3;

use crate::config::{ProjectionConfig, SolverKind};
use crate::error::ProjectionError;
use crate::grid::ScalarField3D;
use crate::markers::{self, MarkerField3D};
use crate::multigrid::{MgSolver, MgSystem};
use crate::pcg::PcgSolver;
use crate::project;
use crate::system::{self, CompressedSystem3D, FlatSystem3D};
use crate::velocity::MacVelocity3D;

/// The solver variant, resolved once at configuration time.
#[derive(Debug, Clone)]
enum LinearSolver {
    Pcg(PcgSolver),
    Multigrid(MgSolver),
}

/// Single-phase pressure projection on a MAC grid.
///
/// Per [`solve`](PressureSolver3D::solve) call: classify markers from the
/// signed-distance fields (a pyramid of them when the multigrid solver is
/// configured), assemble the Poisson system, solve it, and subtract the
/// pressure gradient from the face velocities. All intermediate state is
/// owned by this struct and rebuilt every call; nothing leaks across
/// solves.
pub struct PressureSolver3D {
    config: ProjectionConfig,
    solver: LinearSolver,
    markers: Vec<MarkerField3D>,
    system: FlatSystem3D,
    compressed: CompressedSystem3D,
    mg_system: MgSystem,
    pressure: ScalarField3D,
}

impl PressureSolver3D {
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
            system: FlatSystem3D::default(),
            compressed: CompressedSystem3D::default(),
            mg_system: MgSystem::default(),
            pressure: ScalarField3D::default(),
        })
    }

    /// Project `input` and write the corrected field into `output`.
    ///
    /// Both signed-distance fields use the negative-inside convention; a
    /// fully submerged solve can pass `|_| -1.0` as the fluid SDF and
    /// `|_| f64::MAX` as the boundary SDF.
    pub fn solve<B, F>(
        &mut self,
        input: &MacVelocity3D,
        boundary_sdf: &B,
        fluid_sdf: &F,
        output: &mut MacVelocity3D,
    ) -> Result<(), ProjectionError>
    where
        B: Fn(DVec3) -> f64 + Sync,
        F: Fn(DVec3) -> f64 + Sync,
    {
        if output.grid != input.grid {
            return Err(ProjectionError::FieldShapeMismatch);
        }
        self.solve_pressure(input, boundary_sdf, fluid_sdf)?;
        project::apply_pressure_gradient(input, &self.markers[0], &self.pressure, output);
        Ok(())
    }

    /// As [`solve`](PressureSolver3D::solve), correcting the field in
    /// place.
    pub fn solve_in_place<B, F>(
        &mut self,
        vel: &mut MacVelocity3D,
        boundary_sdf: &B,
        fluid_sdf: &F,
    ) -> Result<(), ProjectionError>
    where
        B: Fn(DVec3) -> f64 + Sync,
        F: Fn(DVec3) -> f64 + Sync,
    {
        self.solve_pressure(vel, boundary_sdf, fluid_sdf)?;
        project::apply_pressure_gradient_in_place(vel, &self.markers[0], &self.pressure);
        Ok(())
    }

    /// Solved pressure on the finest grid, for diagnostics. Zero until the
    /// first solve.
    pub fn pressure(&self) -> &ScalarField3D {
        &self.pressure
    }

    /// Finest-level markers from the last solve.
    pub fn markers(&self) -> Option<&MarkerField3D> {
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
        input: &MacVelocity3D,
        boundary_sdf: &B,
        fluid_sdf: &F,
    ) -> Result<(), ProjectionError>
    where
        B: Fn(DVec3) -> f64 + Sync,
        F: Fn(DVec3) -> f64 + Sync,
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
                    self.pressure = ScalarField3D::new(grid.nx, grid.ny, grid.nz);
                    system::decompress_into(&self.compressed, &mut self.pressure);
                } else {
                    self.system = system::build_flat(&self.markers[0], input, self.config.closed);
                    pcg.solve_flat(&mut self.system);
                    self.pressure = ScalarField3D {
                        nx: grid.nx,
                        ny: grid.ny,
                        nz: grid.nz,
                        data: self.system.x.clone(),
                    };
                }
            }
            LinearSolver::Multigrid(mg) => {
                // One system per pyramid level; the sub-levels consume a
                // chain of downsampled velocity snapshots.
                let mut levels = Vec::with_capacity(self.markers.len());
                levels.push(system::build_flat(&self.markers[0], input, self.config.closed));
                let mut snapshot: Option<MacVelocity3D> = None;
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
                self.pressure = ScalarField3D {
                    nx: grid.nx,
                    ny: grid.ny,
                    nz: grid.nz,
                    data: self.mg_system.levels[0].x.clone(),
                };
            }
        }
        Ok(())
    }
}
