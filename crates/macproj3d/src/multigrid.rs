//! Geometric multigrid: red-black SOR relaxation, full-weighting
//! restriction, trilinear correction, and the V-cycle driver.

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;
use crate::system::{l2_norm, FlatSystem3D};

/// Multigrid tuning knobs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MgParams {
    /// Pyramid depth, including the finest level
    pub max_levels: usize,
    /// Relaxation sweeps before restricting
    pub pre_sweeps: usize,
    /// Relaxation sweeps after the coarse correction
    pub post_sweeps: usize,
    /// Relaxation sweeps on the coarsest level
    pub coarsest_sweeps: usize,
    /// V-cycles per solve
    pub max_cycles: usize,
    /// Relative residual target on the finest level
    pub tolerance: f64,
    /// Over-relaxation factor for the red-black sweeps
    pub sor_factor: f64,
}

impl Default for MgParams {
    fn default() -> Self {
        Self {
            max_levels: 5,
            pre_sweeps: 5,
            post_sweeps: 5,
            coarsest_sweeps: 30,
            max_cycles: 20,
            tolerance: 1e-6,
            sor_factor: 1.5,
        }
    }
}

impl MgParams {
    pub fn validate(&self) -> Result<(), ProjectionError> {
        if self.max_levels == 0 || self.max_cycles == 0 || self.coarsest_sweeps == 0 {
            return Err(ProjectionError::ZeroIterationBudget);
        }
        if !(self.tolerance > 0.0) {
            return Err(ProjectionError::InvalidTolerance(self.tolerance));
        }
        if !(self.sor_factor > 0.0 && self.sor_factor < 2.0) {
            return Err(ProjectionError::InvalidSorFactor(self.sor_factor));
        }
        Ok(())
    }
}

/// Flat systems from finest (index 0) to coarsest. Built fresh per solve.
#[derive(Debug, Default)]
pub struct MgSystem {
    pub levels: Vec<FlatSystem3D>,
}

#[derive(Debug, Clone)]
pub struct MgSolver {
    params: MgParams,
    last_cycles: usize,
    last_residual: f64,
}

impl MgSolver {
    pub fn new(params: MgParams) -> Self {
        Self {
            params,
            last_cycles: 0,
            last_residual: 0.0,
        }
    }

    pub fn params(&self) -> &MgParams {
        &self.params
    }

    /// V-cycles consumed by the last solve.
    pub fn last_cycles(&self) -> usize {
        self.last_cycles
    }

    /// Finest-level residual l2 norm left by the last solve.
    pub fn last_residual(&self) -> f64 {
        self.last_residual
    }

    /// Run V-cycles until the finest relative residual drops below
    /// tolerance or the cycle budget is spent. Best effort, like the
    /// iterative solver.
    pub fn solve(&mut self, system: &mut MgSystem) {
        self.last_cycles = 0;
        self.last_residual = 0.0;
        let Some(finest) = system.levels.first() else {
            return;
        };

        let b_norm = l2_norm(&finest.b);
        if b_norm == 0.0 {
            system.levels[0].x.fill(0.0);
            return;
        }
        let threshold = self.params.tolerance * b_norm;

        let mut r = vec![0.0; system.levels[0].a.len()];
        let mut residual = b_norm;
        for cycle in 0..self.params.max_cycles {
            v_cycle(&mut system.levels, &self.params);
            system.levels[0].residual_into(&mut r);
            residual = l2_norm(&r);
            self.last_cycles = cycle + 1;
            if residual <= threshold {
                break;
            }
        }
        self.last_residual = residual;
        debug!(
            "multigrid: {} cycles over {} levels, residual {:.3e} (target {:.3e})",
            self.last_cycles,
            system.levels.len(),
            residual,
            threshold
        );
    }
}

fn v_cycle(levels: &mut [FlatSystem3D], params: &MgParams) {
    let (fine_slice, rest) = levels.split_at_mut(1);
    let fine = &mut fine_slice[0];

    if rest.is_empty() {
        for _ in 0..params.coarsest_sweeps {
            relax_red_black(fine, params.sor_factor);
        }
        return;
    }

    for _ in 0..params.pre_sweeps {
        relax_red_black(fine, params.sor_factor);
    }

    let mut r = vec![0.0; fine.a.len()];
    fine.residual_into(&mut r);
    {
        let coarse = &mut rest[0];
        restrict(
            &r,
            (fine.nx, fine.ny, fine.nz),
            &mut coarse.b,
            (coarse.nx, coarse.ny, coarse.nz),
        );
        coarse.x.fill(0.0);
    }

    v_cycle(rest, params);

    correct(
        &rest[0].x,
        (rest[0].nx, rest[0].ny, rest[0].nz),
        &mut fine.x,
        (fine.nx, fine.ny, fine.nz),
    );

    for _ in 0..params.post_sweeps {
        relax_red_black(fine, params.sor_factor);
    }
}

/// One red-black SOR Gauss-Seidel sweep over the stencil system. Cells of
/// one color only read the other color, so each half sweep runs as a
/// parallel pass into a scratch vector, folded back before the other color
/// goes.
pub fn relax_red_black(system: &mut FlatSystem3D, sor_factor: f64) {
    let (nx, ny, nz) = (system.nx, system.ny, system.nz);
    let slab = nx * ny;
    let mut next = system.x.clone();
    for parity in 0..2 {
        {
            let (a, b, x) = (&system.a, &system.b, &system.x);
            next.par_chunks_mut(slab).enumerate().for_each(|(k, cells)| {
                for j in 0..ny {
                    for i in ((parity + j + k) % 2..nx).step_by(2) {
                        let idx = (k * ny + j) * nx + i;
                        let center = a[idx].center;
                        if center == 0.0 {
                            // Fluid cell sealed in by boundary on all sides;
                            // its pressure is undetermined, leave it alone.
                            continue;
                        }
                        let mut r = 0.0;
                        if i > 0 {
                            r += a[idx - 1].right * x[idx - 1];
                        }
                        if i + 1 < nx {
                            r += a[idx].right * x[idx + 1];
                        }
                        if j > 0 {
                            r += a[idx - nx].up * x[idx - nx];
                        }
                        if j + 1 < ny {
                            r += a[idx].up * x[idx + nx];
                        }
                        if k > 0 {
                            r += a[idx - slab].front * x[idx - slab];
                        }
                        if k + 1 < nz {
                            r += a[idx].front * x[idx + slab];
                        }
                        cells[j * nx + i] =
                            (1.0 - sor_factor) * x[idx] + sor_factor * (b[idx] - r) / center;
                    }
                }
            });
        }
        system.x.copy_from_slice(&next);
    }
}

const KERNEL: [f64; 4] = [0.125, 0.375, 0.375, 0.125];

#[inline]
fn tap_window(c: usize, extent: usize) -> [usize; 4] {
    [
        if c > 0 { 2 * c - 1 } else { 2 * c },
        2 * c,
        2 * c + 1,
        if c + 1 < extent { 2 * c + 2 } else { 2 * c + 1 },
    ]
}

/// Fine-to-coarse full weighting with the 1/8-3/8-3/8-1/8 kernel per axis,
/// windows clamped at the grid edge.
pub fn restrict(
    fine: &[f64],
    (fnx, fny, _fnz): (usize, usize, usize),
    coarse: &mut [f64],
    (cnx, cny, cnz): (usize, usize, usize),
) {
    debug_assert_eq!(fnx, 2 * cnx);
    debug_assert_eq!(fny, 2 * cny);

    coarse
        .par_chunks_mut(cnx * cny)
        .enumerate()
        .for_each(|(k, out_slab)| {
            let k_indices = tap_window(k, cnz);
            for j in 0..cny {
                let j_indices = tap_window(j, cny);
                for i in 0..cnx {
                    let i_indices = tap_window(i, cnx);
                    let mut sum = 0.0;
                    for (kz, &fk) in KERNEL.iter().zip(k_indices.iter()) {
                        for (ky, &fj) in KERNEL.iter().zip(j_indices.iter()) {
                            for (kx, &fi) in KERNEL.iter().zip(i_indices.iter()) {
                                sum += kx * ky * kz * fine[(fk * fny + fj) * fnx + fi];
                            }
                        }
                    }
                    out_slab[j * cnx + i] = sum;
                }
            }
        });
}

#[inline]
fn correct_taps(f: usize, fine_extent: usize) -> ([usize; 2], [f64; 2]) {
    let c = f / 2;
    if f % 2 == 0 {
        ([if f > 1 { c - 1 } else { c }, c], [0.25, 0.75])
    } else {
        ([c, if f + 1 < fine_extent { c + 1 } else { c }], [0.75, 0.25])
    }
}

/// Coarse-to-fine trilinear correction, added onto the fine unknown.
pub fn correct(
    coarse: &[f64],
    (cnx, cny, _cnz): (usize, usize, usize),
    fine: &mut [f64],
    (fnx, fny, fnz): (usize, usize, usize),
) {
    debug_assert_eq!(fnx, 2 * cnx);
    debug_assert_eq!(fny, 2 * cny);

    fine.par_chunks_mut(fnx * fny)
        .enumerate()
        .for_each(|(k, out_slab)| {
            let (k_indices, k_weights) = correct_taps(k, fnz);
            for j in 0..fny {
                let (j_indices, j_weights) = correct_taps(j, fny);
                for i in 0..fnx {
                    let (i_indices, i_weights) = correct_taps(i, fnx);
                    let mut sum = 0.0;
                    for z in 0..2 {
                        for y in 0..2 {
                            for x in 0..2 {
                                sum += i_weights[x]
                                    * j_weights[y]
                                    * k_weights[z]
                                    * coarse
                                        [(k_indices[z] * cny + j_indices[y]) * cnx + i_indices[x]];
                            }
                        }
                    }
                    out_slab[j * fnx + i] += sum;
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClosedBoundary;
    use crate::grid::Grid3D;
    use crate::markers::MarkerField3D;
    use crate::system::build_flat;
    use crate::velocity::MacVelocity3D;
    use glam::DVec3;

    #[test]
    fn restrict_preserves_constant_fields() {
        let fine = vec![3.0; 8 * 8 * 8];
        let mut coarse = vec![0.0; 4 * 4 * 4];
        restrict(&fine, (8, 8, 8), &mut coarse, (4, 4, 4));
        for &c in &coarse {
            assert!((c - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn correct_adds_constant_fields_exactly() {
        let coarse = vec![2.0; 4 * 4 * 4];
        let mut fine = vec![1.0; 8 * 8 * 8];
        correct(&coarse, (4, 4, 4), &mut fine, (8, 8, 8));
        for &f in &fine {
            assert!((f - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn relaxation_reduces_the_residual() {
        // A fluid blob surrounded by air: every unknown is at most two
        // cells from a Dirichlet neighbor, so ten SOR sweeps must bite.
        // (On a tall mostly-Neumann column the per-sweep factor is close
        // to 1 and no fixed sweep count is a fair test.)
        let grid = Grid3D::new(8, 8, 8, DVec3::splat(1.0), DVec3::ZERO).unwrap();
        let mut vel = MacVelocity3D::new(grid);
        for k in 2..6 {
            for i in 2..6 {
                let idx = vel.v_index(i, 4, k);
                vel.v[idx] = 1.0;
            }
        }
        let markers = MarkerField3D::classify(&grid, &|_| f64::MAX, &|p: DVec3| {
            let d = (p - DVec3::splat(4.0)).abs() - DVec3::splat(2.0);
            d.x.max(d.y).max(d.z)
        });
        let mut system = build_flat(&markers, &vel, ClosedBoundary::all());

        let mut r = vec![0.0; system.a.len()];
        system.residual_into(&mut r);
        let before = l2_norm(&r);
        for _ in 0..10 {
            relax_red_black(&mut system, 1.5);
        }
        system.residual_into(&mut r);
        let after = l2_norm(&r);
        assert!(after < before * 0.5, "before {} after {}", before, after);
    }

    #[test]
    fn v_cycles_converge_on_a_free_surface_box() {
        let grid = Grid3D::new(16, 16, 16, DVec3::splat(1.0), DVec3::ZERO).unwrap();
        let mut vel = MacVelocity3D::new(grid);
        for k in 0..16 {
            for j in 1..16 {
                for i in 0..16 {
                    let idx = vel.v_index(i, j, k);
                    vel.v[idx] = 1.0;
                }
            }
        }
        let markers = MarkerField3D::classify(&grid, &|_| f64::MAX, &|p: DVec3| p.y - 15.0);

        let mut system = MgSystem::default();
        system
            .levels
            .push(build_flat(&markers, &vel, ClosedBoundary::all()));
        let mut coarse_markers = markers;
        let mut coarse_vel = vel;
        for _ in 1..3 {
            coarse_markers = coarse_markers.coarsen();
            coarse_vel = coarse_vel.downsample();
            system
                .levels
                .push(build_flat(&coarse_markers, &coarse_vel, ClosedBoundary::all()));
        }

        let mut solver = MgSolver::new(MgParams {
            max_levels: 3,
            tolerance: 1e-8,
            max_cycles: 40,
            ..Default::default()
        });
        solver.solve(&mut system);
        assert!(
            solver.last_residual() <= 1e-8 * l2_norm(&system.levels[0].b),
            "residual {} after {} cycles",
            solver.last_residual(),
            solver.last_cycles()
        );
    }

    #[test]
    fn empty_pyramid_is_a_no_op() {
        let mut solver = MgSolver::new(MgParams::default());
        let mut system = MgSystem::default();
        solver.solve(&mut system);
        assert_eq!(solver.last_cycles(), 0);
    }
}
