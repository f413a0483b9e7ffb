//! Incomplete-Cholesky preconditioned conjugate gradient.
//!
//! Best effort by design: the solve runs until the relative residual drops
//! below tolerance or the iteration budget is spent, and keeps the best
//! iterate either way. Non-convergence is not an error.

use log::debug;

use crate::system::{dot, l2_norm, CompressedSystem, FlatSystem, Row};

/// The matrix side of the PCG loop, over either system form. Both systems
/// already carry a parallel matrix-vector product; the trait just lets the
/// loop borrow it.
trait Operator {
    fn mvp(&self, v: &[f64], y: &mut [f64]);
}

impl Operator for FlatSystem {
    fn mvp(&self, v: &[f64], y: &mut [f64]) {
        FlatSystem::mvp(self, v, y);
    }
}

impl Operator for CompressedSystem {
    fn mvp(&self, v: &[f64], y: &mut [f64]) {
        CompressedSystem::mvp(self, v, y);
    }
}

trait Preconditioner {
    /// z = M^-1 r
    fn apply(&mut self, r: &[f64], z: &mut [f64]);
}

#[derive(Debug, Clone)]
pub struct PcgSolver {
    max_iterations: usize,
    tolerance: f64,
    last_iterations: usize,
    last_residual: f64,
}

impl PcgSolver {
    /// Budget and relative-residual target. Validation happens at the
    /// configuration layer.
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            last_iterations: 0,
            last_residual: 0.0,
        }
    }

    /// Iterations consumed by the last solve.
    pub fn last_iterations(&self) -> usize {
        self.last_iterations
    }

    /// Residual l2 norm left by the last solve.
    pub fn last_residual(&self) -> f64 {
        self.last_residual
    }

    /// Solve the grid-shaped system in place.
    pub fn solve_flat(&mut self, system: &mut FlatSystem) {
        let (nx, ny) = (system.nx, system.ny);
        // The unknown vector steps out so the system can serve as the
        // operator while the loop writes into x.
        let mut x = std::mem::take(&mut system.x);
        let mut precond = IcStencil::build(nx, ny, &system.a);
        let (iterations, residual) = pcg(
            &*system,
            &mut precond,
            &system.b,
            &mut x,
            self.max_iterations,
            self.tolerance,
        );
        system.x = x;
        self.last_iterations = iterations;
        self.last_residual = residual;
        debug!(
            "pcg (flat {}x{}): {} iterations, residual {:.3e}",
            nx, ny, iterations, residual
        );
    }

    /// Solve the compacted system in place. A zero-row system (no fluid
    /// cells) returns immediately.
    pub fn solve_compressed(&mut self, system: &mut CompressedSystem) {
        let mut x = std::mem::take(&mut system.x);
        let mut precond = IcCsr::build(&system.row_ptr, &system.cols, &system.vals);
        let (iterations, residual) = pcg(
            &*system,
            &mut precond,
            &system.b,
            &mut x,
            self.max_iterations,
            self.tolerance,
        );
        system.x = x;
        self.last_iterations = iterations;
        self.last_residual = residual;
        debug!(
            "pcg (compressed, {} rows): {} iterations, residual {:.3e}",
            system.rows(),
            iterations,
            residual
        );
    }
}

fn pcg<O: Operator, P: Preconditioner>(
    op: &O,
    precond: &mut P,
    b: &[f64],
    x: &mut [f64],
    max_iterations: usize,
    tolerance: f64,
) -> (usize, f64) {
    let n = b.len();
    if n == 0 {
        return (0, 0.0);
    }
    x.fill(0.0);

    let b_norm = l2_norm(b);
    if b_norm == 0.0 {
        return (0, 0.0);
    }
    let threshold = tolerance * b_norm;

    // x = 0, so r starts as b.
    let mut r = b.to_vec();
    let mut residual = b_norm;

    let mut d = vec![0.0; n];
    precond.apply(&r, &mut d);
    let mut sigma = dot(&r, &d);

    let mut q = vec![0.0; n];
    let mut s = vec![0.0; n];
    let mut iterations = 0;

    while iterations < max_iterations {
        op.mvp(&d, &mut q);
        let dq = dot(&d, &q);
        if dq == 0.0 || sigma == 0.0 {
            break;
        }
        let alpha = sigma / dq;

        for k in 0..n {
            x[k] += alpha * d[k];
        }
        for k in 0..n {
            r[k] -= alpha * q[k];
        }
        iterations += 1;

        residual = l2_norm(&r);
        if residual <= threshold {
            break;
        }

        precond.apply(&r, &mut s);
        let sigma_new = dot(&r, &s);
        let beta = sigma_new / sigma;
        sigma = sigma_new;
        for k in 0..n {
            d[k] = s[k] + beta * d[k];
        }
    }

    (iterations, residual)
}

/// IC(0) factorization of the stencil matrix: a diagonal `d` plus the
/// matrix's own off-diagonals reused as the triangular factors.
struct IcStencil<'a> {
    nx: usize,
    ny: usize,
    a: &'a [Row],
    d: Vec<f64>,
    y: Vec<f64>,
}

impl<'a> IcStencil<'a> {
    fn build(nx: usize, ny: usize, a: &'a [Row]) -> Self {
        let n = nx * ny;
        let mut d = vec![0.0; n];
        for j in 0..ny {
            for i in 0..nx {
                let idx = j * nx + i;
                let mut denom = a[idx].center;
                if i > 0 {
                    denom -= a[idx - 1].right * a[idx - 1].right * d[idx - 1];
                }
                if j > 0 {
                    denom -= a[idx - nx].up * a[idx - nx].up * d[idx - nx];
                }
                d[idx] = if denom.abs() > 0.0 { 1.0 / denom } else { 0.0 };
            }
        }
        Self {
            nx,
            ny,
            a,
            d,
            y: vec![0.0; n],
        }
    }
}

impl Preconditioner for IcStencil<'_> {
    fn apply(&mut self, r: &[f64], z: &mut [f64]) {
        let (nx, ny) = (self.nx, self.ny);

        // Forward substitution.
        for j in 0..ny {
            for i in 0..nx {
                let idx = j * nx + i;
                let mut sum = r[idx];
                if i > 0 {
                    sum -= self.a[idx - 1].right * self.y[idx - 1];
                }
                if j > 0 {
                    sum -= self.a[idx - nx].up * self.y[idx - nx];
                }
                self.y[idx] = sum * self.d[idx];
            }
        }

        // Backward substitution.
        for j in (0..ny).rev() {
            for i in (0..nx).rev() {
                let idx = j * nx + i;
                let mut sum = self.y[idx];
                if i + 1 < nx {
                    sum -= self.a[idx].right * z[idx + 1];
                }
                if j + 1 < ny {
                    sum -= self.a[idx].up * z[idx + nx];
                }
                z[idx] = sum * self.d[idx];
            }
        }
    }
}

/// IC(0) factorization over the CSR form.
struct IcCsr<'a> {
    row_ptr: &'a [usize],
    cols: &'a [usize],
    vals: &'a [f64],
    d: Vec<f64>,
    y: Vec<f64>,
}

impl<'a> IcCsr<'a> {
    fn build(row_ptr: &'a [usize], cols: &'a [usize], vals: &'a [f64]) -> Self {
        let n = row_ptr.len().saturating_sub(1);
        let mut d = vec![0.0; n];
        for i in 0..n {
            let mut denom = 0.0;
            for k in row_ptr[i]..row_ptr[i + 1] {
                let j = cols[k];
                if j == i {
                    denom += vals[k];
                } else if j < i {
                    denom -= vals[k] * vals[k] * d[j];
                }
            }
            d[i] = if denom.abs() > 0.0 { 1.0 / denom } else { 0.0 };
        }
        Self {
            row_ptr,
            cols,
            vals,
            d,
            y: vec![0.0; n],
        }
    }
}

impl Preconditioner for IcCsr<'_> {
    fn apply(&mut self, r: &[f64], z: &mut [f64]) {
        let n = r.len();

        for i in 0..n {
            let mut sum = r[i];
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.cols[k];
                if j < i {
                    sum -= self.vals[k] * self.y[j];
                }
            }
            self.y[i] = sum * self.d[i];
        }

        for i in (0..n).rev() {
            let mut sum = self.y[i];
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                let j = self.cols[k];
                if j > i {
                    sum -= self.vals[k] * z[j];
                }
            }
            z[i] = sum * self.d[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClosedBoundary;
    use crate::grid::Grid;
    use crate::markers::{MarkerField, Marker};
    use crate::system::{build_compressed, build_flat};
    use crate::velocity::MacVelocity;
    use glam::DVec2;

    fn free_surface_setup(n: usize) -> (MacVelocity, MarkerField) {
        let grid = Grid::new(n, n, DVec2::splat(1.0), DVec2::ZERO).unwrap();
        let mut vel = MacVelocity::new(grid);
        for j in 1..n {
            for i in 0..n {
                let idx = vel.v_index(i, j);
                vel.v[idx] = 1.0;
            }
        }
        let markers =
            MarkerField::classify(&grid, &|_| f64::MAX, &|p: DVec2| p.y - (n as f64 - 1.0));
        (vel, markers)
    }

    #[test]
    fn flat_solve_hits_tolerance() {
        let (vel, markers) = free_surface_setup(8);
        let mut system = build_flat(&markers, &vel, ClosedBoundary::all());
        let mut solver = PcgSolver::new(200, 1e-8);
        solver.solve_flat(&mut system);

        let mut r = vec![0.0; system.a.len()];
        system.residual_into(&mut r);
        let b_norm = l2_norm(&system.b);
        assert!(l2_norm(&r) <= 1e-8 * b_norm * 1.0001);
        assert!(solver.last_iterations() > 0);
    }

    #[test]
    fn compressed_solve_matches_residual_report() {
        let (vel, markers) = free_surface_setup(8);
        let mut system = build_compressed(&markers, &vel, ClosedBoundary::all());
        let mut solver = PcgSolver::new(200, 1e-8);
        solver.solve_compressed(&mut system);

        let mut r = vec![0.0; system.rows()];
        system.residual_into(&mut r);
        assert!((l2_norm(&r) - solver.last_residual()).abs() < 1e-12);
    }

    #[test]
    fn zero_rhs_solves_to_zero_immediately() {
        let vel = MacVelocity::new(Grid::new(4, 4, DVec2::splat(1.0), DVec2::ZERO).unwrap());
        let markers = MarkerField::uniform(4, 4, Marker::Fluid);
        let mut system = build_flat(&markers, &vel, ClosedBoundary::all());
        let mut solver = PcgSolver::new(100, 1e-6);
        solver.solve_flat(&mut system);
        assert_eq!(solver.last_iterations(), 0);
        assert!(system.x.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn empty_compressed_system_is_a_no_op() {
        let vel = MacVelocity::new(Grid::new(4, 4, DVec2::splat(1.0), DVec2::ZERO).unwrap());
        let markers = MarkerField::uniform(4, 4, Marker::Air);
        let mut system = build_compressed(&markers, &vel, ClosedBoundary::all());
        assert_eq!(system.rows(), 0);
        let mut solver = PcgSolver::new(100, 1e-6);
        solver.solve_compressed(&mut system);
        assert_eq!(solver.last_iterations(), 0);
    }
}
