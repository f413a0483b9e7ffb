//! Grid geometry and cell-centered scalar storage.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;

/// Uniform grid geometry: resolution, per-axis spacing, and world origin.
///
/// Cell `(i, j)` spans `origin + spacing * (i, j)` to
/// `origin + spacing * (i + 1, j + 1)`; the cell center sits half a cell in
/// from the lower corner. Face centers follow the MAC convention: u faces on
/// vertical cell edges, v faces on horizontal ones.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Number of cells in X
    pub nx: usize,
    /// Number of cells in Y
    pub ny: usize,
    /// Cell size per axis in world units
    pub spacing: DVec2,
    /// World position of the lower-left grid corner
    pub origin: DVec2,
}

impl Grid {
    /// Create a grid, rejecting degenerate spacing or resolution.
    pub fn new(
        nx: usize,
        ny: usize,
        spacing: DVec2,
        origin: DVec2,
    ) -> Result<Self, ProjectionError> {
        if nx == 0 || ny == 0 {
            return Err(ProjectionError::InvalidResolution { nx, ny });
        }
        if !(spacing.x > 0.0) || !(spacing.y > 0.0) {
            return Err(ProjectionError::InvalidSpacing {
                x: spacing.x,
                y: spacing.y,
            });
        }
        Ok(Self {
            nx,
            ny,
            spacing,
            origin,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn cell_index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    /// World position of the center of cell `(i, j)`.
    #[inline]
    pub fn cell_center(&self, i: usize, j: usize) -> DVec2 {
        self.origin + self.spacing * DVec2::new(i as f64 + 0.5, j as f64 + 0.5)
    }

    /// World position of the u face between cells `(i - 1, j)` and `(i, j)`.
    #[inline]
    pub fn u_face_center(&self, i: usize, j: usize) -> DVec2 {
        self.origin + self.spacing * DVec2::new(i as f64, j as f64 + 0.5)
    }

    /// World position of the v face between cells `(i, j - 1)` and `(i, j)`.
    #[inline]
    pub fn v_face_center(&self, i: usize, j: usize) -> DVec2 {
        self.origin + self.spacing * DVec2::new(i as f64 + 0.5, j as f64)
    }

    /// Half-resolution grid with doubled spacing (multigrid sub-level).
    /// Callers are expected to have checked the pyramid depth first; odd
    /// extents clamp at 1.
    pub fn half(&self) -> Grid {
        Grid {
            nx: (self.nx / 2).max(1),
            ny: (self.ny / 2).max(1),
            spacing: self.spacing * 2.0,
            origin: self.origin,
        }
    }
}

/// Dense cell-centered scalar field. Used for the solved pressure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalarField {
    pub nx: usize,
    pub ny: usize,
    pub data: Vec<f64>,
}

impl ScalarField {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            data: vec![0.0; nx * ny],
        }
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> f64 {
        self.data[j * self.nx + i]
    }
}
