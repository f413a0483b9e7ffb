//! Grid geometry and cell-centered scalar storage.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;

/// Uniform grid geometry: resolution, per-axis spacing, and world origin.
///
/// Cell `(i, j, k)` spans `origin + spacing * (i, j, k)` to
/// `origin + spacing * (i + 1, j + 1, k + 1)`; the cell center sits half a
/// cell in from the lower corner. Face centers follow the MAC convention:
/// u faces normal to X, v faces normal to Y, w faces normal to Z.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid3D {
    /// Number of cells in X
    pub nx: usize,
    /// Number of cells in Y
    pub ny: usize,
    /// Number of cells in Z
    pub nz: usize,
    /// Cell size per axis in world units
    pub spacing: DVec3,
    /// World position of the lower grid corner
    pub origin: DVec3,
}

impl Grid3D {
    /// Create a grid, rejecting degenerate spacing or resolution.
    pub fn new(
        nx: usize,
        ny: usize,
        nz: usize,
        spacing: DVec3,
        origin: DVec3,
    ) -> Result<Self, ProjectionError> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(ProjectionError::InvalidResolution { nx, ny, nz });
        }
        if !(spacing.x > 0.0) || !(spacing.y > 0.0) || !(spacing.z > 0.0) {
            return Err(ProjectionError::InvalidSpacing {
                x: spacing.x,
                y: spacing.y,
                z: spacing.z,
            });
        }
        Ok(Self {
            nx,
            ny,
            nz,
            spacing,
            origin,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[inline]
    pub fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.ny + j) * self.nx + i
    }

    /// World position of the center of cell `(i, j, k)`.
    #[inline]
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> DVec3 {
        self.origin
            + self.spacing * DVec3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5)
    }

    /// World position of the u face between cells `(i - 1, j, k)` and
    /// `(i, j, k)`.
    #[inline]
    pub fn u_face_center(&self, i: usize, j: usize, k: usize) -> DVec3 {
        self.origin + self.spacing * DVec3::new(i as f64, j as f64 + 0.5, k as f64 + 0.5)
    }

    /// World position of the v face between cells `(i, j - 1, k)` and
    /// `(i, j, k)`.
    #[inline]
    pub fn v_face_center(&self, i: usize, j: usize, k: usize) -> DVec3 {
        self.origin + self.spacing * DVec3::new(i as f64 + 0.5, j as f64, k as f64 + 0.5)
    }

    /// World position of the w face between cells `(i, j, k - 1)` and
    /// `(i, j, k)`.
    #[inline]
    pub fn w_face_center(&self, i: usize, j: usize, k: usize) -> DVec3 {
        self.origin + self.spacing * DVec3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64)
    }

    /// Half-resolution grid with doubled spacing (multigrid sub-level).
    /// Callers are expected to have checked the pyramid depth first; odd
    /// extents clamp at 1.
    pub fn half(&self) -> Grid3D {
        Grid3D {
            nx: (self.nx / 2).max(1),
            ny: (self.ny / 2).max(1),
            nz: (self.nz / 2).max(1),
            spacing: self.spacing * 2.0,
            origin: self.origin,
        }
    }
}

/// Dense cell-centered scalar field. Used for the solved pressure.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScalarField3D {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub data: Vec<f64>,
}

impl ScalarField3D {
    pub fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            nx,
            ny,
            nz,
            data: vec![0.0; nx * ny * nz],
        }
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.ny + j) * self.nx + i
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[(k * self.ny + j) * self.nx + i]
    }
}
