//! Sparse Poisson system assembly: the grid-shaped stencil form, the
//! fluid-cell-compacted CSR form, and the vector helpers shared by the
//! solvers.

use rayon::prelude::*;

use crate::config::ClosedBoundary;
use crate::grid::ScalarField3D;
use crate::markers::{Marker, MarkerField3D};
use crate::velocity::MacVelocity3D;

/// One stencil row: the self coefficient plus the three forward neighbors.
/// Backward coefficients are recovered from the neighbors' rows; the
/// operator is symmetric so nothing is lost.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Row {
    pub center: f64,
    pub right: f64,
    pub up: f64,
    pub front: f64,
}

/// Grid-shaped linear system: one row per cell. Non-fluid cells carry an
/// identity row (center = 1, b = 0) so the solution is defined everywhere.
#[derive(Clone, Debug, Default)]
pub struct FlatSystem3D {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub a: Vec<Row>,
    pub b: Vec<f64>,
    pub x: Vec<f64>,
}

impl FlatSystem3D {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        let n = nx * ny * nz;
        Self {
            nx,
            ny,
            nz,
            a: vec![Row::default(); n],
            b: vec![0.0; n],
            x: vec![0.0; n],
        }
    }

    /// y = A v over the symmetric stencil.
    pub fn mvp(&self, v: &[f64], y: &mut [f64]) {
        let (nx, ny, nz) = (self.nx, self.ny, self.nz);
        let slab = nx * ny;
        y.par_chunks_mut(slab).enumerate().for_each(|(k, out_slab)| {
            for j in 0..ny {
                for i in 0..nx {
                    let idx = (k * ny + j) * nx + i;
                    let mut sum = self.a[idx].center * v[idx];
                    if i + 1 < nx {
                        sum += self.a[idx].right * v[idx + 1];
                    }
                    if i > 0 {
                        sum += self.a[idx - 1].right * v[idx - 1];
                    }
                    if j + 1 < ny {
                        sum += self.a[idx].up * v[idx + nx];
                    }
                    if j > 0 {
                        sum += self.a[idx - nx].up * v[idx - nx];
                    }
                    if k + 1 < nz {
                        sum += self.a[idx].front * v[idx + slab];
                    }
                    if k > 0 {
                        sum += self.a[idx - slab].front * v[idx - slab];
                    }
                    out_slab[j * nx + i] = sum;
                }
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
pub struct CompressedSystem3D {
    pub row_ptr: Vec<usize>,
    pub cols: Vec<usize>,
    pub vals: Vec<f64>,
    pub b: Vec<f64>,
    pub x: Vec<f64>,
    pub cells: Vec<usize>,
}

impl CompressedSystem3D {
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
pub fn build_flat(
    markers: &MarkerField3D,
    vel: &MacVelocity3D,
    closed: ClosedBoundary,
) -> FlatSystem3D {
    let (nx, ny, nz) = (markers.nx, markers.ny, markers.nz);
    let inv_h = vel.grid.spacing.recip();
    let inv_h_sqr = inv_h * inv_h;
    let slab = nx * ny;

    let mut system = FlatSystem3D::new(nx, ny, nz);
    system
        .a
        .par_chunks_mut(slab)
        .zip(system.b.par_chunks_mut(slab))
        .enumerate()
        .for_each(|(k, (a_slab, b_slab))| {
            for j in 0..ny {
                for i in 0..nx {
                    let row = &mut a_slab[j * nx + i];
                    *row = Row::default();

                    if markers.at(i, j, k) != Marker::Fluid {
                        row.center = 1.0;
                        continue;
                    }
                    b_slab[j * nx + i] = vel.divergence_at(i, j, k);

                    if i + 1 < nx {
                        if markers.at(i + 1, j, k) != Marker::Boundary {
                            row.center += inv_h_sqr.x;
                            if markers.at(i + 1, j, k) == Marker::Fluid {
                                row.right -= inv_h_sqr.x;
                            }
                        }
                    } else if !closed.right {
                        row.center += inv_h_sqr.x;
                    }

                    if i > 0 {
                        if markers.at(i - 1, j, k) != Marker::Boundary {
                            row.center += inv_h_sqr.x;
                        }
                    } else if !closed.left {
                        row.center += inv_h_sqr.x;
                    }

                    if j + 1 < ny {
                        if markers.at(i, j + 1, k) != Marker::Boundary {
                            row.center += inv_h_sqr.y;
                            if markers.at(i, j + 1, k) == Marker::Fluid {
                                row.up -= inv_h_sqr.y;
                            }
                        }
                    } else if !closed.up {
                        row.center += inv_h_sqr.y;
                    }

                    if j > 0 {
                        if markers.at(i, j - 1, k) != Marker::Boundary {
                            row.center += inv_h_sqr.y;
                        }
                    } else if !closed.down {
                        row.center += inv_h_sqr.y;
                    }

                    if k + 1 < nz {
                        if markers.at(i, j, k + 1) != Marker::Boundary {
                            row.center += inv_h_sqr.z;
                            if markers.at(i, j, k + 1) == Marker::Fluid {
                                row.front -= inv_h_sqr.z;
                            }
                        }
                    } else if !closed.front {
                        row.center += inv_h_sqr.z;
                    }

                    if k > 0 {
                        if markers.at(i, j, k - 1) != Marker::Boundary {
                            row.center += inv_h_sqr.z;
                        }
                    } else if !closed.back {
                        row.center += inv_h_sqr.z;
                    }
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
    markers: &MarkerField3D,
    vel: &MacVelocity3D,
    closed: ClosedBoundary,
) -> CompressedSystem3D {
    let (nx, ny, nz) = (markers.nx, markers.ny, markers.nz);
    let inv_h = vel.grid.spacing.recip();
    let inv_h_sqr = inv_h * inv_h;
    let slab = nx * ny;

    // Pass 1: compaction map.
    let mut coord_to_row = vec![usize::MAX; nx * ny * nz];
    let mut cells = Vec::new();
    for (idx, &marker) in markers.data.iter().enumerate() {
        if marker == Marker::Fluid {
            coord_to_row[idx] = cells.len();
            cells.push(idx);
        }
    }

    // Pass 2: rows, in the same order the map was assigned.
    let rows = cells.len();
    let mut system = CompressedSystem3D {
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
        let i = idx % nx;
        let j = (idx / nx) % ny;
        let k = idx / slab;

        system.b.push(vel.divergence_at(i, j, k));

        // Center entry first; off-diagonals appended as they are found.
        let center_slot = system.vals.len();
        system.cols.push(row);
        system.vals.push(0.0);
        let mut center = 0.0;

        if i + 1 < nx {
            if markers.at(i + 1, j, k) != Marker::Boundary {
                center += inv_h_sqr.x;
                if markers.at(i + 1, j, k) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx + 1]);
                    system.vals.push(-inv_h_sqr.x);
                }
            }
        } else if !closed.right {
            center += inv_h_sqr.x;
        }

        if i > 0 {
            if markers.at(i - 1, j, k) != Marker::Boundary {
                center += inv_h_sqr.x;
                if markers.at(i - 1, j, k) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx - 1]);
                    system.vals.push(-inv_h_sqr.x);
                }
            }
        } else if !closed.left {
            center += inv_h_sqr.x;
        }

        if j + 1 < ny {
            if markers.at(i, j + 1, k) != Marker::Boundary {
                center += inv_h_sqr.y;
                if markers.at(i, j + 1, k) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx + nx]);
                    system.vals.push(-inv_h_sqr.y);
                }
            }
        } else if !closed.up {
            center += inv_h_sqr.y;
        }

        if j > 0 {
            if markers.at(i, j - 1, k) != Marker::Boundary {
                center += inv_h_sqr.y;
                if markers.at(i, j - 1, k) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx - nx]);
                    system.vals.push(-inv_h_sqr.y);
                }
            }
        } else if !closed.down {
            center += inv_h_sqr.y;
        }

        if k + 1 < nz {
            if markers.at(i, j, k + 1) != Marker::Boundary {
                center += inv_h_sqr.z;
                if markers.at(i, j, k + 1) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx + slab]);
                    system.vals.push(-inv_h_sqr.z);
                }
            }
        } else if !closed.front {
            center += inv_h_sqr.z;
        }

        if k > 0 {
            if markers.at(i, j, k - 1) != Marker::Boundary {
                center += inv_h_sqr.z;
                if markers.at(i, j, k - 1) == Marker::Fluid {
                    system.cols.push(coord_to_row[idx - slab]);
                    system.vals.push(-inv_h_sqr.z);
                }
            }
        } else if !closed.back {
            center += inv_h_sqr.z;
        }

        system.vals[center_slot] = center;
        system.row_ptr.push(system.cols.len());
    }
    system
}

/// Scatter the compacted solution back onto the full grid. Non-fluid cells
/// stay zero.
pub fn decompress_into(system: &CompressedSystem3D, out: &mut ScalarField3D) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3D;
    use glam::DVec3;

    fn unit_velocity(n: usize) -> MacVelocity3D {
        MacVelocity3D::new(Grid3D::new(n, n, n, DVec3::splat(1.0), DVec3::ZERO).unwrap())
    }

    #[test]
    fn non_fluid_rows_are_identity() {
        let vel = unit_velocity(3);
        let markers = MarkerField3D::uniform(3, 3, 3, Marker::Air);
        let system = build_flat(&markers, &vel, ClosedBoundary::all());
        for (row, b) in system.a.iter().zip(system.b.iter()) {
            assert_eq!(row.center, 1.0);
            assert_eq!((row.right, row.up, row.front), (0.0, 0.0, 0.0));
            assert_eq!(*b, 0.0);
        }
    }

    #[test]
    fn interior_fluid_row_is_standard_seven_point() {
        let vel = unit_velocity(3);
        let markers = MarkerField3D::uniform(3, 3, 3, Marker::Fluid);
        let system = build_flat(&markers, &vel, ClosedBoundary::all());
        let center = system.a[markers.index(1, 1, 1)];
        assert_eq!(center.center, 6.0);
        assert_eq!((center.right, center.up, center.front), (-1.0, -1.0, -1.0));
        // Closed corner cell only sees its three in-grid neighbors.
        let corner = system.a[markers.index(0, 0, 0)];
        assert_eq!(corner.center, 3.0);
    }

    #[test]
    fn open_domain_side_adds_dirichlet_term() {
        let vel = unit_velocity(3);
        let markers = MarkerField3D::uniform(3, 3, 3, Marker::Fluid);
        let mut closed = ClosedBoundary::all();
        closed.back = false;
        let system = build_flat(&markers, &vel, closed);
        // The open side contributes 1/h^2 to the diagonal, nothing off it.
        assert_eq!(system.a[markers.index(1, 1, 0)].center, 6.0);
        assert_eq!(system.a[markers.index(1, 1, 2)].center, 5.0);
    }

    #[test]
    fn boundary_neighbor_is_excluded_entirely() {
        let vel = unit_velocity(3);
        let mut markers = MarkerField3D::uniform(3, 3, 3, Marker::Fluid);
        let idx = markers.index(1, 1, 2);
        markers.data[idx] = Marker::Boundary;
        let system = build_flat(&markers, &vel, ClosedBoundary::all());
        let row = system.a[markers.index(1, 1, 1)];
        assert_eq!(row.center, 5.0);
        assert_eq!(row.front, 0.0);
        assert_eq!(row.right, -1.0);
    }

    #[test]
    fn flat_and_compressed_encode_the_same_operator() {
        let mut vel = unit_velocity(4);
        for (k, u) in vel.u.iter_mut().enumerate() {
            *u = (k as f64 * 0.37).sin();
        }
        for (k, v) in vel.v.iter_mut().enumerate() {
            *v = (k as f64 * 0.73).cos();
        }
        for (k, w) in vel.w.iter_mut().enumerate() {
            *w = (k as f64 * 0.19).sin();
        }
        // Fluid bottom half, air above, one boundary cell.
        let grid = vel.grid;
        let markers = MarkerField3D::classify(
            &grid,
            &|p: DVec3| {
                if (p - DVec3::splat(1.5)).abs().max_element() < 0.25 {
                    -1.0
                } else {
                    1.0
                }
            },
            &|p: DVec3| p.y - 3.0,
        );
        assert!(markers.fluid_count() > 0);

        let flat = build_flat(&markers, &vel, ClosedBoundary::all());
        let comp = build_compressed(&markers, &vel, ClosedBoundary::all());
        assert_eq!(comp.rows(), markers.fluid_count());

        // Apply both operators to the same test vector, zero outside the
        // fluid region (the compressed form never references those cells),
        // and compare row by row.
        let mut full: Vec<f64> = (0..flat.a.len()).map(|k| (k as f64 * 0.11).sin()).collect();
        for (idx, m) in markers.data.iter().enumerate() {
            if *m != Marker::Fluid {
                full[idx] = 0.0;
            }
        }
        let mut full_out = vec![0.0; full.len()];
        flat.mvp(&full, &mut full_out);

        let packed: Vec<f64> = comp.cells.iter().map(|&c| full[c]).collect();
        let mut packed_out = vec![0.0; packed.len()];
        comp.mvp(&packed, &mut packed_out);

        for (row, &cell) in comp.cells.iter().enumerate() {
            assert!(
                (full_out[cell] - packed_out[row]).abs() < 1e-12,
                "operator mismatch at cell {}",
                cell
            );
            assert!((comp.b[row] - flat.b[cell]).abs() < 1e-12);
        }
    }

    #[test]
    fn decompress_follows_the_compaction_map() {
        let vel = unit_velocity(2);
        let markers =
            MarkerField3D::classify(&vel.grid, &|_| f64::MAX, &|p: DVec3| p.z - 1.0);
        let mut comp = build_compressed(&markers, &vel, ClosedBoundary::all());
        for (row, x) in comp.x.iter_mut().enumerate() {
            *x = row as f64 + 1.0;
        }
        let mut out = ScalarField3D::new(2, 2, 2);
        decompress_into(&comp, &mut out);
        // Fluid slab k = 0 in scan order; air slab stays zero.
        for j in 0..2 {
            for i in 0..2 {
                assert_eq!(out.at(i, j, 0), (j * 2 + i) as f64 + 1.0);
                assert_eq!(out.at(i, j, 1), 0.0);
            }
        }
    }
}
