//! Cell classification into fluid / air / boundary, and the majority-vote
//! coarsening used by the multigrid pyramid.

use glam::DVec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;
use crate::grid::Grid3D;

/// Per-cell occupancy for the pressure solve.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum Marker {
    /// Carries a pressure unknown
    Fluid,
    /// Open space; Dirichlet (free-surface) neighbor
    #[default]
    Air,
    /// Solid obstacle; Neumann (zero-flux) neighbor
    Boundary,
}

/// A point is inside a signed-distance field where the distance is negative.
#[inline]
pub fn is_inside_sdf(phi: f64) -> bool {
    phi < 0.0
}

/// Dense per-cell marker grid.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerField3D {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub data: Vec<Marker>,
}

impl MarkerField3D {
    /// Uniform field, handy for tests and fully submerged solves.
    pub fn uniform(nx: usize, ny: usize, nz: usize, marker: Marker) -> Self {
        Self {
            nx,
            ny,
            nz,
            data: vec![marker; nx * ny * nz],
        }
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.ny + j) * self.nx + i
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize, k: usize) -> Marker {
        self.data[(k * self.ny + j) * self.nx + i]
    }

    pub fn fluid_count(&self) -> usize {
        self.data.iter().filter(|&&m| m == Marker::Fluid).count()
    }

    /// Classify every cell of `grid` by sampling both signed-distance
    /// fields at the cell center. Boundary takes priority over fluid.
    pub fn classify<B, F>(grid: &Grid3D, boundary_sdf: &B, fluid_sdf: &F) -> Self
    where
        B: Fn(DVec3) -> f64 + Sync,
        F: Fn(DVec3) -> f64 + Sync,
    {
        let slab = grid.nx * grid.ny;
        let mut data = vec![Marker::Air; grid.cell_count()];
        data.par_chunks_mut(slab).enumerate().for_each(|(k, cells)| {
            for j in 0..grid.ny {
                for i in 0..grid.nx {
                    let pt = grid.cell_center(i, j, k);
                    cells[j * grid.nx + i] = if is_inside_sdf(boundary_sdf(pt)) {
                        Marker::Boundary
                    } else if is_inside_sdf(fluid_sdf(pt)) {
                        Marker::Fluid
                    } else {
                        Marker::Air
                    };
                }
            }
        });
        Self {
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
            data,
        }
    }

    /// Downsample 2x per axis by plurality vote over each coarse cell's
    /// children, the child window clamped at odd fine extents. Ties go to
    /// Boundary, then Air, then Fluid: solids dominate, and a coarse cell
    /// straddling the free surface stays open.
    pub fn coarsen(&self) -> MarkerField3D {
        let nx = (self.nx / 2).max(1);
        let ny = (self.ny / 2).max(1);
        let nz = (self.nz / 2).max(1);
        let mut data = vec![Marker::Air; nx * ny * nz];
        data.par_chunks_mut(nx * ny)
            .enumerate()
            .for_each(|(k, slab)| {
                let k0 = (2 * k).min(self.nz - 1);
                let k1 = (2 * k + 1).min(self.nz - 1);
                for j in 0..ny {
                    let j0 = (2 * j).min(self.ny - 1);
                    let j1 = (2 * j + 1).min(self.ny - 1);
                    for i in 0..nx {
                        let i0 = (2 * i).min(self.nx - 1);
                        let i1 = (2 * i + 1).min(self.nx - 1);

                        let mut counts = [0u32; 3];
                        for ck in [k0, k1] {
                            for cj in [j0, j1] {
                                for ci in [i0, i1] {
                                    counts[vote_slot(self.at(ci, cj, ck))] += 1;
                                }
                            }
                        }
                        slab[j * nx + i] = vote_winner(counts);
                    }
                }
            });
        MarkerField3D { nx, ny, nz, data }
    }
}

#[inline]
fn vote_slot(marker: Marker) -> usize {
    match marker {
        Marker::Boundary => 0,
        Marker::Fluid => 1,
        Marker::Air => 2,
    }
}

/// First maximum in (Boundary, Air, Fluid) order wins. Air beating Fluid
/// on ties keeps a Dirichlet row on every coarse level below a free
/// surface; otherwise a closed coarse system can go singular.
fn vote_winner(counts: [u32; 3]) -> Marker {
    let mut winner = Marker::Boundary;
    let mut best = counts[0];
    if counts[2] > best {
        winner = Marker::Air;
        best = counts[2];
    }
    if counts[1] > best {
        winner = Marker::Fluid;
    }
    winner
}

/// Number of pyramid levels supported by halving `(nx, ny, nz)`: halving
/// stops once any axis goes odd or reaches 1.
pub fn supported_levels(nx: usize, ny: usize, nz: usize) -> usize {
    let mut levels = 1;
    let (mut x, mut y, mut z) = (nx, ny, nz);
    while x % 2 == 0 && y % 2 == 0 && z % 2 == 0 && x > 1 && y > 1 && z > 1 {
        x /= 2;
        y /= 2;
        z /= 2;
        levels += 1;
    }
    levels
}

/// Build the marker pyramid: the finest level classified from the SDFs,
/// each coarser level voted down from the previous one. A depth the grid
/// cannot support fails fast before any index math can go wrong.
pub fn build_pyramid<B, F>(
    grid: &Grid3D,
    max_levels: usize,
    boundary_sdf: &B,
    fluid_sdf: &F,
) -> Result<Vec<MarkerField3D>, ProjectionError>
where
    B: Fn(DVec3) -> f64 + Sync,
    F: Fn(DVec3) -> f64 + Sync,
{
    let supported = supported_levels(grid.nx, grid.ny, grid.nz);
    if max_levels == 0 || max_levels > supported {
        return Err(ProjectionError::InvalidPyramidDepth {
            requested: max_levels,
            supported,
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
        });
    }

    let mut levels = Vec::with_capacity(max_levels);
    levels.push(MarkerField3D::classify(grid, boundary_sdf, fluid_sdf));
    for l in 1..max_levels {
        let coarser = levels[l - 1].coarsen();
        levels.push(coarser);
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn unit_grid(n: usize) -> Grid3D {
        Grid3D::new(n, n, n, DVec3::splat(1.0), DVec3::ZERO).unwrap()
    }

    #[test]
    fn boundary_takes_priority_over_fluid() {
        let grid = unit_grid(2);
        let field = MarkerField3D::classify(&grid, &|_| -1.0, &|_| -1.0);
        assert!(field.data.iter().all(|&m| m == Marker::Boundary));
    }

    #[test]
    fn classify_splits_fluid_and_air() {
        let grid = unit_grid(4);
        // Fluid below y = 2, no boundary anywhere.
        let field = MarkerField3D::classify(&grid, &|_| f64::MAX, &|p: DVec3| p.y - 2.0);
        for k in 0..4 {
            for j in 0..4 {
                for i in 0..4 {
                    let expected = if j < 2 { Marker::Fluid } else { Marker::Air };
                    assert_eq!(field.at(i, j, k), expected);
                }
            }
        }
    }

    #[test]
    fn coarsen_keeps_boundary_block() {
        // A 4x4x4 boundary block inside an 8x8x8 fluid grid must survive as
        // the matching octant of the 4x4x4 coarse field.
        let mut fine = MarkerField3D::uniform(8, 8, 8, Marker::Fluid);
        for k in 0..4 {
            for j in 0..4 {
                for i in 0..4 {
                    let idx = fine.index(i, j, k);
                    fine.data[idx] = Marker::Boundary;
                }
            }
        }
        let coarse = fine.coarsen();
        assert_eq!((coarse.nx, coarse.ny, coarse.nz), (4, 4, 4));
        for k in 0..4 {
            for j in 0..4 {
                for i in 0..4 {
                    let expected = if i < 2 && j < 2 && k < 2 {
                        Marker::Boundary
                    } else {
                        Marker::Fluid
                    };
                    assert_eq!(coarse.at(i, j, k), expected);
                }
            }
        }
    }

    #[test]
    fn tie_break_prefers_boundary_then_air() {
        // 4 boundary vs 4 fluid children: boundary wins.
        let mut fine = MarkerField3D::uniform(2, 2, 2, Marker::Fluid);
        for idx in 0..4 {
            fine.data[idx] = Marker::Boundary;
        }
        assert_eq!(fine.coarsen().at(0, 0, 0), Marker::Boundary);

        // 4 fluid vs 4 air children: air wins, so the free surface is
        // never voted away.
        let mut fine = MarkerField3D::uniform(2, 2, 2, Marker::Air);
        for idx in 0..4 {
            fine.data[idx] = Marker::Fluid;
        }
        assert_eq!(fine.coarsen().at(0, 0, 0), Marker::Air);
    }

    #[test]
    fn surface_slab_under_a_lid_survives_coarsening() {
        // Fluid to one cell below the top: each coarsened top-row cell
        // votes 4 fluid vs 4 air and must come out air, keeping a pressure
        // Dirichlet row on the coarse level.
        let grid = unit_grid(8);
        let mut field = MarkerField3D::classify(&grid, &|_| f64::MAX, &|p: DVec3| p.y - 7.0);
        for _ in 0..2 {
            field = field.coarsen();
            for k in 0..field.nz {
                for i in 0..field.nx {
                    assert_eq!(field.at(i, field.ny - 1, k), Marker::Air);
                }
            }
        }
    }

    #[test]
    fn pyramid_depth_is_validated() {
        let grid = unit_grid(6);
        // 6 -> 3, then 3 is odd: only two levels supported.
        assert_eq!(supported_levels(6, 6, 6), 2);
        let err = build_pyramid(&grid, 3, &|_| f64::MAX, &|_| -1.0).unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::InvalidPyramidDepth {
                requested: 3,
                supported: 2,
                ..
            }
        ));

        let levels = build_pyramid(&grid, 2, &|_| f64::MAX, &|_| -1.0).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!((levels[1].nx, levels[1].ny, levels[1].nz), (3, 3, 3));
    }
}
