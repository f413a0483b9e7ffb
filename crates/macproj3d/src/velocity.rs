//! Staggered (MAC) velocity storage, sampling, and downsampling.

use glam::DVec3;

use crate::grid::Grid3D;

/// Face-sampled velocity field on a MAC grid.
///
/// `u` lives on X-normal faces, `(nx + 1) x ny x nz` values; `v` on
/// Y-normal faces, `nx x (ny + 1) x nz`; `w` on Z-normal faces,
/// `nx x ny x (nz + 1)`.
#[derive(Clone, Debug)]
pub struct MacVelocity3D {
    pub grid: Grid3D,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    pub w: Vec<f64>,
}

impl MacVelocity3D {
    /// Zero-velocity field over `grid`.
    pub fn new(grid: Grid3D) -> Self {
        let u_count = (grid.nx + 1) * grid.ny * grid.nz;
        let v_count = grid.nx * (grid.ny + 1) * grid.nz;
        let w_count = grid.nx * grid.ny * (grid.nz + 1);
        Self {
            grid,
            u: vec![0.0; u_count],
            v: vec![0.0; v_count],
            w: vec![0.0; w_count],
        }
    }

    #[inline]
    pub fn u_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.grid.ny + j) * (self.grid.nx + 1) + i
    }

    #[inline]
    pub fn v_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * (self.grid.ny + 1) + j) * self.grid.nx + i
    }

    #[inline]
    pub fn w_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.grid.ny + j) * self.grid.nx + i
    }

    /// Discrete divergence at the center of cell `(i, j, k)`: forward minus
    /// backward face value over the spacing, summed per axis.
    pub fn divergence_at(&self, i: usize, j: usize, k: usize) -> f64 {
        let inv_h = self.grid.spacing.recip();
        let du = self.u[self.u_index(i + 1, j, k)] - self.u[self.u_index(i, j, k)];
        let dv = self.v[self.v_index(i, j + 1, k)] - self.v[self.v_index(i, j, k)];
        let dw = self.w[self.w_index(i, j, k + 1)] - self.w[self.w_index(i, j, k)];
        du * inv_h.x + dv * inv_h.y + dw * inv_h.z
    }

    /// Trilinear sample of the u component at a world position.
    pub fn sample_u(&self, pos: DVec3) -> f64 {
        let grid_pos = (pos - self.grid.origin) / self.grid.spacing;
        // u samples sit at (i, j + 0.5, k + 0.5) in grid coordinates
        let gx = grid_pos.x.clamp(0.0, self.grid.nx as f64);
        let gy = (grid_pos.y - 0.5).clamp(0.0, (self.grid.ny - 1) as f64);
        let gz = (grid_pos.z - 0.5).clamp(0.0, (self.grid.nz - 1) as f64);
        trilinear(
            &self.u,
            self.grid.nx + 1,
            self.grid.ny,
            self.grid.nz,
            gx,
            gy,
            gz,
        )
    }

    /// Trilinear sample of the v component at a world position.
    pub fn sample_v(&self, pos: DVec3) -> f64 {
        let grid_pos = (pos - self.grid.origin) / self.grid.spacing;
        // v samples sit at (i + 0.5, j, k + 0.5)
        let gx = (grid_pos.x - 0.5).clamp(0.0, (self.grid.nx - 1) as f64);
        let gy = grid_pos.y.clamp(0.0, self.grid.ny as f64);
        let gz = (grid_pos.z - 0.5).clamp(0.0, (self.grid.nz - 1) as f64);
        trilinear(
            &self.v,
            self.grid.nx,
            self.grid.ny + 1,
            self.grid.nz,
            gx,
            gy,
            gz,
        )
    }

    /// Trilinear sample of the w component at a world position.
    pub fn sample_w(&self, pos: DVec3) -> f64 {
        let grid_pos = (pos - self.grid.origin) / self.grid.spacing;
        // w samples sit at (i + 0.5, j + 0.5, k)
        let gx = (grid_pos.x - 0.5).clamp(0.0, (self.grid.nx - 1) as f64);
        let gy = (grid_pos.y - 0.5).clamp(0.0, (self.grid.ny - 1) as f64);
        let gz = grid_pos.z.clamp(0.0, self.grid.nz as f64);
        trilinear(
            &self.w,
            self.grid.nx,
            self.grid.ny,
            self.grid.nz + 1,
            gx,
            gy,
            gz,
        )
    }

    /// Half-resolution snapshot for multigrid sub-levels: every coarse face
    /// value is the fine field sampled at the coarse face center.
    pub fn downsample(&self) -> MacVelocity3D {
        let coarse = self.grid.half();
        let mut out = MacVelocity3D::new(coarse);

        for k in 0..coarse.nz {
            for j in 0..coarse.ny {
                for i in 0..=coarse.nx {
                    let idx = out.u_index(i, j, k);
                    out.u[idx] = self.sample_u(coarse.u_face_center(i, j, k));
                }
            }
        }
        for k in 0..coarse.nz {
            for j in 0..=coarse.ny {
                for i in 0..coarse.nx {
                    let idx = out.v_index(i, j, k);
                    out.v[idx] = self.sample_v(coarse.v_face_center(i, j, k));
                }
            }
        }
        for k in 0..=coarse.nz {
            for j in 0..coarse.ny {
                for i in 0..coarse.nx {
                    let idx = out.w_index(i, j, k);
                    out.w[idx] = self.sample_w(coarse.w_face_center(i, j, k));
                }
            }
        }
        out
    }
}

/// Trilinear interpolation on a dense `sx x sy x sz` sample lattice at the
/// already-clamped sample-space coordinate `(gx, gy, gz)`.
fn trilinear(data: &[f64], sx: usize, sy: usize, sz: usize, gx: f64, gy: f64, gz: f64) -> f64 {
    let i0 = (gx as usize).min(sx - 1);
    let j0 = (gy as usize).min(sy - 1);
    let k0 = (gz as usize).min(sz - 1);
    let i1 = (i0 + 1).min(sx - 1);
    let j1 = (j0 + 1).min(sy - 1);
    let k1 = (k0 + 1).min(sz - 1);
    let tx = gx - i0 as f64;
    let ty = gy - j0 as f64;
    let tz = gz - k0 as f64;

    let at = |i: usize, j: usize, k: usize| data[(k * sy + j) * sx + i];
    let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;

    let bottom_back = lerp(at(i0, j0, k0), at(i1, j0, k0), tx);
    let top_back = lerp(at(i0, j1, k0), at(i1, j1, k0), tx);
    let bottom_front = lerp(at(i0, j0, k1), at(i1, j0, k1), tx);
    let top_front = lerp(at(i0, j1, k1), at(i1, j1, k1), tx);

    let back = lerp(bottom_back, top_back, ty);
    let front = lerp(bottom_front, top_front, ty);
    lerp(back, front, tz)
}
