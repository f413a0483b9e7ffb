//! Staggered (MAC) velocity storage, sampling, and downsampling.

use glam::DVec2;

use crate::grid::Grid;

/// Face-sampled velocity field on a MAC grid.
///
/// `u` lives on vertical faces, `(nx + 1) x ny` values; `v` on horizontal
/// faces, `nx x (ny + 1)` values.
#[derive(Clone, Debug)]
pub struct MacVelocity {
    pub grid: Grid,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
}

impl MacVelocity {
    /// Zero-velocity field over `grid`.
    pub fn new(grid: Grid) -> Self {
        let u_count = (grid.nx + 1) * grid.ny;
        let v_count = grid.nx * (grid.ny + 1);
        Self {
            grid,
            u: vec![0.0; u_count],
            v: vec![0.0; v_count],
        }
    }

    #[inline]
    pub fn u_index(&self, i: usize, j: usize) -> usize {
        j * (self.grid.nx + 1) + i
    }

    #[inline]
    pub fn v_index(&self, i: usize, j: usize) -> usize {
        j * self.grid.nx + i
    }

    /// Discrete divergence at the center of cell `(i, j)`: forward minus
    /// backward face value over the spacing, summed per axis.
    pub fn divergence_at(&self, i: usize, j: usize) -> f64 {
        let inv_h = self.grid.spacing.recip();
        let du = self.u[self.u_index(i + 1, j)] - self.u[self.u_index(i, j)];
        let dv = self.v[self.v_index(i, j + 1)] - self.v[self.v_index(i, j)];
        du * inv_h.x + dv * inv_h.y
    }

    /// Bilinear sample of the u component at a world position.
    pub fn sample_u(&self, pos: DVec2) -> f64 {
        let (nx, ny) = (self.grid.nx, self.grid.ny);
        // u samples sit at (i, j + 0.5) in grid coordinates
        let gx = ((pos.x - self.grid.origin.x) / self.grid.spacing.x).clamp(0.0, nx as f64);
        let gy = ((pos.y - self.grid.origin.y) / self.grid.spacing.y - 0.5)
            .clamp(0.0, (ny - 1) as f64);

        let i0 = (gx as usize).min(nx.saturating_sub(1));
        let j0 = (gy as usize).min(ny.saturating_sub(1));
        let i1 = (i0 + 1).min(nx);
        let j1 = (j0 + 1).min(ny - 1);
        let tx = gx - i0 as f64;
        let ty = gy - j0 as f64;

        let s00 = self.u[self.u_index(i0, j0)];
        let s10 = self.u[self.u_index(i1, j0)];
        let s01 = self.u[self.u_index(i0, j1)];
        let s11 = self.u[self.u_index(i1, j1)];

        let bottom = s00 + (s10 - s00) * tx;
        let top = s01 + (s11 - s01) * tx;
        bottom + (top - bottom) * ty
    }

    /// Bilinear sample of the v component at a world position.
    pub fn sample_v(&self, pos: DVec2) -> f64 {
        let (nx, ny) = (self.grid.nx, self.grid.ny);
        // v samples sit at (i + 0.5, j) in grid coordinates
        let gx = ((pos.x - self.grid.origin.x) / self.grid.spacing.x - 0.5)
            .clamp(0.0, (nx - 1) as f64);
        let gy = ((pos.y - self.grid.origin.y) / self.grid.spacing.y).clamp(0.0, ny as f64);

        let i0 = (gx as usize).min(nx.saturating_sub(1));
        let j0 = (gy as usize).min(ny.saturating_sub(1));
        let i1 = (i0 + 1).min(nx - 1);
        let j1 = (j0 + 1).min(ny);
        let tx = gx - i0 as f64;
        let ty = gy - j0 as f64;

        let s00 = self.v[self.v_index(i0, j0)];
        let s10 = self.v[self.v_index(i1, j0)];
        let s01 = self.v[self.v_index(i0, j1)];
        let s11 = self.v[self.v_index(i1, j1)];

        let bottom = s00 + (s10 - s00) * tx;
        let top = s01 + (s11 - s01) * tx;
        bottom + (top - bottom) * ty
    }

    /// Half-resolution snapshot for multigrid sub-levels: every coarse face
    /// value is the fine field sampled at the coarse face center.
    pub fn downsample(&self) -> MacVelocity {
        let coarse = self.grid.half();
        let mut out = MacVelocity::new(coarse);

        for j in 0..coarse.ny {
            for i in 0..=coarse.nx {
                let idx = out.u_index(i, j);
                out.u[idx] = self.sample_u(coarse.u_face_center(i, j));
            }
        }
        for j in 0..=coarse.ny {
            for i in 0..coarse.nx {
                let idx = out.v_index(i, j);
                out.v[idx] = self.sample_v(coarse.v_face_center(i, j));
            }
        }
        out
    }
}
