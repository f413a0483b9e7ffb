//! Incomplete-Cholesky preconditioned conjugate gradient.
//!
//! Best effort by design: the solve runs until the relative residual drops
//! below tolerance or the iteration budget is spent, and keeps the best
//! iterate either way. Non-convergence is not an error.

use log::debug;

use crate::system::{dot, l2_norm, CompressedSystem3D, FlatSystem3D, Row};

/// The matrix side of the PCG loop, over either system form. Both systems
/// already carry a parallel matrix-vector product; the trait just lets the
/// loop borrow it.
trait Operator {
    fn mvp(&self, v: &[f64], y: &mut [f64]);
}

impl Operator for FlatSystem3D {
    fn mvp(&self, v: &[f64], y: &mut [f64]) {
        FlatSystem3D::mvp(self, v, y);
    }
}

impl Operator for CompressedSystem3D {
    fn mvp(&self, v: &[f64], y: &mut [f64]) {
        CompressedSystem3D::mvp(self, v, y);
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
    pub fn solve_flat(&mut self, system: &mut FlatSystem3D) {
        let (nx, ny, nz) = (system.nx, system.ny, system.nz);
        // The unknown vector steps out so the system can serve as the
        // operator while the loop writes into x.
        let mut x = std::mem::take(&mut system.x);
        let mut precond = IcStencil::build(nx, ny, nz, &system.a);
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
            "pcg (flat {}x{}x{}): {} iterations, residual {:.3e}",
            nx, ny, nz, iterations, residual
        );
    }

    /// Solve the compacted system in place. A zero-row system (no fluid
    /// cells) returns immediately.
    pub fn solve_compressed(&mut self, system: &mut CompressedSystem3D) {
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
    nz: usize,
    a: &'a [Row],
    d: Vec<f64>,
    y: Vec<f64>,
}

impl<'a> IcStencil<'a> {
    fn build(nx: usize, ny: usize, nz: usize, a: &'a [Row]) -> Self {
        let slab = nx * ny;
        let n = slab * nz;
        let mut d = vec![0.0; n];
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let idx = (k * ny + j) * nx + i;
                    let mut denom = a[idx].center;
                    if i > 0 {
                        denom -= a[idx - 1].right * a[idx - 1].right * d[idx - 1];
                    }
                    if j > 0 {
                        denom -= a[idx - nx].up * a[idx - nx].up * d[idx - nx];
                    }
                    if k > 0 {
                        denom -= a[idx - slab].front * a[idx - slab].front * d[idx - slab];
                    }
                    d[idx] = if denom.abs() > 0.0 { 1.0 / denom } else { 0.0 };
                }
            }
        }
        Self {
            nx,
            ny,
            nz,
            a,
            d,
            y: vec![0.0; n],
        }
    }
}

impl Preconditioner for IcStencil<'_> {
    fn apply(&mut self, r: &[f64], z: &mut [f64]) {
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);
        let slab = nx * ny;

        // Forward substitution.
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let idx = (k * ny + j) * nx + i;
                    let mut sum = r[idx];
                    if i > 0 {
                        sum -= self.a[idx - 1].right * self.y[idx - 1];
                    }
                    if j > 0 {
                        sum -= self.a[idx - nx].up * self.y[idx - nx];
                    }
                    if k > 0 {
                        sum -= self.a[idx - slab].front * self.y[idx - slab];
                    }
                    self.y[idx] = sum * self.d[idx];
                }
            }
        }

        // Backward substitution.
        for k in (0..nz).rev() {
            for j in (0..ny).rev() {
                for i in (0..nx).rev() {
                    let idx = (k * ny + j) * nx + i;
                    let mut sum = self.y[idx];
                    if i + 1 < nx {
                        sum -= self.a[idx].right * z[idx + 1];
                    }
                    if j + 1 < ny {
                        sum -= self.a[idx].up * z[idx + nx];
                    }
                    if k + 1 < nz {
                        sum -= self.a[idx].front * z[idx + slab];
                    }
                    z[idx] = sum * self.d[idx];
                }
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
