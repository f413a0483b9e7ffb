//! Cell classification into fluid / air / boundary, and the majority-vote
//! coarsening used by the multigrid pyramid.

use glam::DVec2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;
use crate::grid::Grid;

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
pub struct MarkerField {
    pub nx: usize,
    pub ny: usize,
    pub data: Vec<Marker>,
}

impl MarkerField {
    /// Uniform field, handy for tests and fully submerged solves.
    pub fn uniform(nx: usize, ny: usize, marker: Marker) -> Self {
        Self {
            nx,
            ny,
            data: vec![marker; nx * ny],
        }
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> Marker {
        self.data[j * self.nx + i]
    }

    pub fn fluid_count(&self) -> usize {
        self.data.iter().filter(|&&m| m == Marker::Fluid).count()
    }

    /// Classify every cell of `grid` by sampling both signed-distance
    /// fields at the cell center. Boundary takes priority over fluid.
    pub fn classify<B, F>(grid: &Grid, boundary_sdf: &B, fluid_sdf: &F) -> Self
    where
        B: Fn(DVec2) -> f64 + Sync,
        F: Fn(DVec2) -> f64 + Sync,
    {
        let mut data = vec![Marker::Air; grid.cell_count()];
        data.par_chunks_mut(grid.nx)
            .enumerate()
            .for_each(|(j, row)| {
                for (i, cell) in row.iter_mut().enumerate() {
                    let pt = grid.cell_center(i, j);
                    *cell = if is_inside_sdf(boundary_sdf(pt)) {
                        Marker::Boundary
                    } else if is_inside_sdf(fluid_sdf(pt)) {
                        Marker::Fluid
                    } else {
                        Marker::Air
                    };
                }
            });
        Self {
            nx: grid.nx,
            ny: grid.ny,
            data,
        }
    }

    /// Downsample 2x per axis by plurality vote over each coarse cell's
    /// children, the child window clamped at odd fine extents. Ties go to
    /// Boundary, then Air, then Fluid: solids dominate, and a coarse cell
    /// straddling the free surface stays open.
    pub fn coarsen(&self) -> MarkerField {
        let nx = (self.nx / 2).max(1);
        let ny = (self.ny / 2).max(1);
        let mut data = vec![Marker::Air; nx * ny];
        data.par_chunks_mut(nx).enumerate().for_each(|(j, row)| {
            let j0 = (2 * j).min(self.ny - 1);
            let j1 = (2 * j + 1).min(self.ny - 1);
            for (i, cell) in row.iter_mut().enumerate() {
                let i0 = (2 * i).min(self.nx - 1);
                let i1 = (2 * i + 1).min(self.nx - 1);

                let mut counts = [0u32; 3];
                for cj in [j0, j1] {
                    for ci in [i0, i1] {
                        counts[vote_slot(self.at(ci, cj))] += 1;
                    }
                }
                *cell = vote_winner(counts);
            }
        });
        MarkerField { nx, ny, data }
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

/// Number of pyramid levels supported by halving `(nx, ny)`: halving stops
/// once either axis goes odd or reaches 1.
pub fn supported_levels(nx: usize, ny: usize) -> usize {
    let mut levels = 1;
    let (mut x, mut y) = (nx, ny);
    while x % 2 == 0 && y % 2 == 0 && x > 1 && y > 1 {
        x /= 2;
        y /= 2;
        levels += 1;
    }
    levels
}

/// Build the marker pyramid: the finest level classified from the SDFs,
/// each coarser level voted down from the previous one. A depth the grid
/// cannot support fails fast before any index math can go wrong.
pub fn build_pyramid<B, F>(
    grid: &Grid,
    max_levels: usize,
    boundary_sdf: &B,
    fluid_sdf: &F,
) -> Result<Vec<MarkerField>, ProjectionError>
where
    B: Fn(DVec2) -> f64 + Sync,
    F: Fn(DVec2) -> f64 + Sync,
{
    let supported = supported_levels(grid.nx, grid.ny);
    if max_levels == 0 || max_levels > supported {
        return Err(ProjectionError::InvalidPyramidDepth {
            requested: max_levels,
            supported,
            nx: grid.nx,
            ny: grid.ny,
        });
    }

    let mut levels = Vec::with_capacity(max_levels);
    levels.push(MarkerField::classify(grid, boundary_sdf, fluid_sdf));
    for l in 1..max_levels {
        let coarser = levels[l - 1].coarsen();
        levels.push(coarser);
    }
    Ok(levels)
}
