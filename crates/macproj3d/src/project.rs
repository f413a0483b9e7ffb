//! Pressure-gradient application: turns the solved pressure into the
//! divergence-free velocity correction.

use rayon::prelude::*;

use crate::grid::ScalarField3D;
use crate::markers::{Marker, MarkerField3D};
use crate::velocity::MacVelocity3D;

/// Correct the face velocities in place.
///
/// A face is updated only when its backward cell is Fluid and its forward
/// cell is not Boundary: `v += (1/h) * (p_fwd - p_bwd)`. Faces touching a
/// Boundary cell belong to the external boundary-condition solver, faces
/// with no adjacent Fluid cell carry no pressure, and the outer domain
/// faces are never written; all of those pass through untouched.
pub fn apply_pressure_gradient_in_place(
    vel: &mut MacVelocity3D,
    markers: &MarkerField3D,
    pressure: &ScalarField3D,
) {
    let (nx, ny, nz) = (markers.nx, markers.ny, markers.nz);
    let inv_h = vel.grid.spacing.recip();

    vel.u
        .par_chunks_mut((nx + 1) * ny)
        .enumerate()
        .for_each(|(k, slab)| {
            for j in 0..ny {
                for i in 1..nx {
                    if markers.at(i - 1, j, k) == Marker::Fluid
                        && markers.at(i, j, k) != Marker::Boundary
                    {
                        slab[j * (nx + 1) + i] +=
                            inv_h.x * (pressure.at(i, j, k) - pressure.at(i - 1, j, k));
                    }
                }
            }
        });

    vel.v
        .par_chunks_mut(nx * (ny + 1))
        .enumerate()
        .for_each(|(k, slab)| {
            for j in 1..ny {
                for i in 0..nx {
                    if markers.at(i, j - 1, k) == Marker::Fluid
                        && markers.at(i, j, k) != Marker::Boundary
                    {
                        slab[j * nx + i] +=
                            inv_h.y * (pressure.at(i, j, k) - pressure.at(i, j - 1, k));
                    }
                }
            }
        });

    vel.w
        .par_chunks_mut(nx * ny)
        .enumerate()
        .for_each(|(k, slab)| {
            if k == 0 || k >= nz {
                return;
            }
            for j in 0..ny {
                for i in 0..nx {
                    if markers.at(i, j, k - 1) == Marker::Fluid
                        && markers.at(i, j, k) != Marker::Boundary
                    {
                        slab[j * nx + i] +=
                            inv_h.z * (pressure.at(i, j, k) - pressure.at(i, j, k - 1));
                    }
                }
            }
        });
}

/// As [`apply_pressure_gradient_in_place`], writing into a separate output
/// field. Untouched faces copy the input through.
pub fn apply_pressure_gradient(
    input: &MacVelocity3D,
    markers: &MarkerField3D,
    pressure: &ScalarField3D,
    output: &mut MacVelocity3D,
) {
    output.u.copy_from_slice(&input.u);
    output.v.copy_from_slice(&input.v);
    output.w.copy_from_slice(&input.w);
    apply_pressure_gradient_in_place(output, markers, pressure);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid3D;
    use glam::DVec3;

    fn setup(nx: usize, ny: usize, nz: usize) -> (MacVelocity3D, ScalarField3D) {
        let grid = Grid3D::new(nx, ny, nz, DVec3::splat(1.0), DVec3::ZERO).unwrap();
        (MacVelocity3D::new(grid), ScalarField3D::new(nx, ny, nz))
    }

    #[test]
    fn gradient_is_added_across_fluid_faces() {
        let (mut vel, mut pressure) = setup(2, 1, 1);
        let markers = MarkerField3D::uniform(2, 1, 1, Marker::Fluid);
        pressure.data = vec![2.0, 5.0];
        apply_pressure_gradient_in_place(&mut vel, &markers, &pressure);
        assert_eq!(vel.u[vel.u_index(1, 0, 0)], 3.0);
        // Domain faces are never written.
        assert_eq!(vel.u[vel.u_index(0, 0, 0)], 0.0);
        assert_eq!(vel.u[vel.u_index(2, 0, 0)], 0.0);
    }

    #[test]
    fn boundary_faces_are_left_untouched() {
        let (mut vel, mut pressure) = setup(1, 1, 3);
        let mut markers = MarkerField3D::uniform(1, 1, 3, Marker::Fluid);
        markers.data[2] = Marker::Boundary;
        pressure.data = vec![1.0, 4.0, 0.0];
        let sentinel = 7.5;
        let idx = vel.w_index(0, 0, 2);
        vel.w[idx] = sentinel;
        apply_pressure_gradient_in_place(&mut vel, &markers, &pressure);
        // Fluid-fluid face updated, fluid-boundary face untouched.
        assert_eq!(vel.w[vel.w_index(0, 0, 1)], 3.0);
        assert_eq!(vel.w[vel.w_index(0, 0, 2)], sentinel);
    }

    #[test]
    fn faces_with_air_behind_are_left_untouched() {
        let (mut vel, mut pressure) = setup(1, 2, 1);
        let mut markers = MarkerField3D::uniform(1, 2, 1, Marker::Fluid);
        markers.data[0] = Marker::Air;
        pressure.data = vec![0.0, 3.0];
        apply_pressure_gradient_in_place(&mut vel, &markers, &pressure);
        // Backward cell is air, so the shared face keeps its value even
        // though the forward cell is fluid.
        assert_eq!(vel.v[vel.v_index(0, 1, 0)], 0.0);
    }

    #[test]
    fn out_of_place_copies_untouched_faces() {
        let (mut input, pressure) = setup(2, 2, 2);
        input.u.fill(1.25);
        input.v.fill(-0.5);
        input.w.fill(0.75);
        let markers = MarkerField3D::uniform(2, 2, 2, Marker::Air);
        let mut output = MacVelocity3D::new(input.grid);
        apply_pressure_gradient(&input, &markers, &pressure, &mut output);
        assert_eq!(output.u, input.u);
        assert_eq!(output.v, input.v);
        assert_eq!(output.w, input.w);
    }
}
