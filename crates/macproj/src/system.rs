//! Sparse Poisson system assembly: the grid-shaped stencil form, the
//! fluid-cell-compacted CSR form, and the vector helpers shared by the
//! solvers.

use rayon::prelude::*;

use crate::config::ClosedBoundary;
use crate::grid::ScalarField;
use crate::markers::{Marker, MarkerField};
use crate::velocity::MacVelocity;

/// One stencil row: the self coefficient plus the two forward neighbors.
/// Backward coefficients are recovered from the neighbors' rows; the
/// operator is symmetric so nothing is lost.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Row {
    pub center: f64,
    pub right: f64,
    pub up: f64,
}

/// Grid-shaped linear system: one row per cell. Non-fluid cells carry an
/// identity row (center = 1, b = 0) so the solution is defined everywhere.
#[derive(Clone, Debug, Default)]
pub struct FlatSystem {
    pub nx: usize,
    pub ny: usize,
    pub a: Vec<Row>,
    pub b: Vec<f64>,
    pub x: Vec<f64>,
}

impl FlatSystem {
    pub fn new(nx: usize, ny: usize) -> Self {
        let n = nx * ny;
        Self {
            nx,
            ny,
            a: vec![Row::default(); n],
            b: vec![0.0; n],
            x: vec![0.0; n],
        }
    }

    /// y = A v over the symmetric stencil.
    pub fn mvp(&self, v: &[f64], y: &mut [f64]) {
        let nx = self.nx;
        y.par_chunks_mut(nx).enumerate().for_each(|(j, out_row)| {
            for (i, out) in out_row.iter_mut().enumerate() {
                let idx = j * nx + i;
                let mut sum = self.a[idx].center * v[idx];
                if i + 1 < nx {
                    sum += self.a[idx].right * v[idx + 1];
                }
                if i > 0 {
                    sum += self.a[idx - 1].right * v[idx - 1];
                }
                if j + 1 < self.ny {
                    sum += self.a[idx].up * v[idx + nx];
                }
                if j > 0 {
                    sum += self.a[idx - nx].up * v[idx - nx];
                }
                *out = sum;
            }
        });
    }

    /// r = b - A x using the system's own unknown vector.
    pub fn residual_into(&self, r: &mut [f64]) {
        self.mvp(&self.x, r);
        for (rk, bk) in r.iter_mut().zip(self.b.iter()) {
            *rk = bk - *rk;
        }
    }
}

/// Fluid-cell-compacted system in CSR form.
///
/// `cells[row]` is the flat grid index the row was compacted from. The
/// decompressor consumes this map directly, so the builder and the
/// decompressor cannot silently disagree about scan order.
#[derive(Clone, Debug, Default)]
pub struct CompressedSystem {
    pub row_ptr: Vec<usize>,
    pub cols: Vec<usize>,
    pub vals: Vec<f64>,
    pub b: Vec<f64>,
    pub x: Vec<f64>,
    pub cells: Vec<usize>,
}

impl CompressedSystem {
    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    /// y = A v, standard CSR row products.
    pub fn mvp(&self, v: &[f64], y: &mut [f64]) {
        y.par_iter_mut().enumerate().for_each(|(row, out)| {
            let mut sum = 0.0;
            for k in self.row_ptr[row]..self.row_ptr[row + 1] {
                sum += self.vals[k] * v[self.cols[k]];
            }
            *out = sum;
        });
    }

    /// r = b - A x using the system's own unknown vector.
    pub fn residual_into(&self, r: &mut [f64]) {
        self.mvp(&self.x, r);
        for (rk, bk) in r.iter_mut().zip(self.b.iter()) {
            *rk = bk - *rk;
        }
    }
}

/// Build the grid-shaped system for the Poisson operator.
///
/// Fluid rows get rhs = divergence and, per non-Boundary neighbor, 1/h^2
/// added to the center; a Fluid forward neighbor also gets -1/h^2 off the
/// diagonal. Out-of-grid neighbors behave like Air free space (Dirichlet
/// zero just outside) unless that side of the domain is flagged closed, in
/// which case they are skipped like Boundary.
pub fn build_flat(markers: &MarkerField, vel: &MacVelocity, closed: ClosedBoundary) -> FlatSystem {
    let (nx, ny) = (markers.nx, markers.ny);
    let inv_h = vel.grid.spacing.recip();
    let inv_h_sqr = inv_h * inv_h;

    let mut system = FlatSystem::new(nx, ny);
    system
        .a
        .par_chunks_mut(nx)
        .zip(system.b.par_chunks_mut(nx))
        .enumerate()
        .for_each(|(j, (a_row, b_row))| {
            for i in 0..nx {
                let row = &mut a_row[i];
                *row = Row::default();

                if markers.at(i, j) != Marker::Fluid {
                    row.center = 1.0;
                    continue;
                }
                b_row[i] = vel.divergence_at(i, j);

                if i + 1 < nx {
                    if markers.at(i + 1, j) != Marker::Boundary {
                        row.center += inv_h_sqr.x;
                        if markers.at(i + 1, j) == Marker::Fluid {
                            row.right -= inv_h_sqr.x;
                        }
                    }
                } else if !closed.right {
                    row.center += inv_h_sqr.x;
                }

                if i > 0 {
                    if markers.at(i - 1, j) != Marker::Boundary {
                        row.center += inv_h_sqr.x;
                    }
                } else if !closed.left {
                    row.center += inv_h_sqr.x;
                }

                if j + 1 < ny {
                    if markers.at(i, j + 1) != Marker::Boundary {
                        row.center += inv_h_sqr.y;
                        if markers.at(i, j + 1) == Marker::Fluid {
                            row.up -= inv_h_sqr.y;
                        }
                    }
                } else if !closed.up {
                    row.center += inv_h_sqr.y;
                }

                if j > 0 {
                    if markers.at(i, j - 1) != Marker::Boundary {
                        row.center += inv_h_sqr.y;
                    }
                } else if !closed.down {
                    row.center += inv_h_sqr.y;
                }
            }
        });
    system
}

/// Build the compacted CSR system restricted to fluid cells.
///
/// The first pass assigns every fluid cell a compacted row index in
/// row-major scan order; it must finish before the row-fill pass reads the
/// map. Same coefficients as [`build_flat`].
pub fn build_compressed(
    markers: &MarkerField,
    vel: &MacVelocity,
    closed: ClosedBoundary,
) -> CompressedSystem {
    let (nx, ny) = (markers.nx, markers.ny);
    let inv_h = vel.grid.spacing.recip();
    let inv_h_sqr = inv_h * inv_h;

    // Pass 1: compaction map.
    let mut coord_to_row = vec![usize::MAX; nx * ny];
    let mut cells = Vec::new();
    for (idx, &marker) in markers.data.iter().enumerate() {
        if marker == Marker::Fluid {
            coord_to_row[idx] = cells.len();
            cells.push(idx);
        }
    }

    // Pass 2: rows, in the same order the map was assigned.
    let rows = cells.len();
    let mut system = CompressedSystem {
        row_ptr: Vec::with_capacity(rows + 1),
        cols: Vec::new(),
        vals: Vec::new(),
        b: Vec::with_capacity(rows),
        x: vec![0.0; rows],
        cells,
    };
    system.row_ptr.push(0);

    for row in 0..rows {
        let idx = system.cells[row];
        let (i, j) = (idx % nx, idx / nx);

        system.b.push(vel.divergence_at(i, j));

        // Center entry first; off-diagonals appended as they are found.
        let center_slot = system.vals.len();
        system.cols.push(row);
        system.vals.push(0.0);
        let mut center = 0.0;

        if i + 1 < nx {
            if markers.at(i + 1, j) != Marker::Boundary {
                center += inv_h_sqr.x;
                if markers.at(i + 1, j) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx + 1]);
                    system.vals.push(-inv_h_sqr.x);
                }
            }
        } else if !closed.right {
            center += inv_h_sqr.x;
        }

        if i > 0 {
            if markers.at(i - 1, j) != Marker::Boundary {
                center += inv_h_sqr.x;
                if markers.at(i - 1, j) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx - 1]);
                    system.vals.push(-inv_h_sqr.x);
                }
            }
        } else if !closed.left {
            center += inv_h_sqr.x;
        }

        if j + 1 < ny {
            if markers.at(i, j + 1) != Marker::Boundary {
                center += inv_h_sqr.y;
                if markers.at(i, j + 1) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx + nx]);
                    system.vals.push(-inv_h_sqr.y);
                }
            }
        } else if !closed.up {
            center += inv_h_sqr.y;
        }

        if j > 0 {
            if markers.at(i, j - 1) != Marker::Boundary {
                center += inv_h_sqr.y;
                if markers.at(i, j - 1) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx - nx]);
                    system.vals.push(-inv_h_sqr.y);
                }
            }
        } else if !closed.down {
            center += inv_h_sqr.y;
        }

        system.vals[center_slot] = center;
        system.row_ptr.push(system.cols.len());
    }
    system
}

/// Scatter the compacted solution back onto the full grid. Non-fluid cells
/// stay zero.
pub fn decompress_into(system: &CompressedSystem, out: &mut ScalarField) {
    out.data.fill(0.0);
    for (row, &cell) in system.cells.iter().enumerate() {
        out.data[cell] = system.x[row];
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn l2_norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}
