//! Pressure-gradient application: turns the solved pressure into the
//! divergence-free velocity correction.

use rayon::prelude::*;

use crate::grid::ScalarField;
use crate::markers::{Marker, MarkerField};
use crate::velocity::MacVelocity;

/// Correct the face velocities in place.
///
/// A face is updated only when its backward cell is Fluid and its forward
/// cell is not Boundary: `v += (1/h) * (p_fwd - p_bwd)`. Faces touching a
/// Boundary cell belong to the external boundary-condition solver, faces
/// with no adjacent Fluid cell carry no pressure, and the outer domain
/// faces are never written; all of those pass through untouched.
pub fn apply_pressure_gradient_in_place(
    vel: &mut MacVelocity,
    markers: &MarkerField,
    pressure: &ScalarField,
) {
    let (nx, ny) = (markers.nx, markers.ny);
    let inv_h = vel.grid.spacing.recip();

    vel.u.par_chunks_mut(nx + 1).enumerate().for_each(|(j, row)| {
        for i in 1..nx {
            if markers.at(i - 1, j) == Marker::Fluid && markers.at(i, j) != Marker::Boundary {
                row[i] += inv_h.x * (pressure.at(i, j) - pressure.at(i - 1, j));
            }
        }
    });

    vel.v.par_chunks_mut(nx).enumerate().for_each(|(j, row)| {
        if j == 0 || j >= ny {
            return;
        }
        for (i, value) in row.iter_mut().enumerate() {
            if markers.at(i, j - 1) == Marker::Fluid && markers.at(i, j) != Marker::Boundary {
                *value += inv_h.y * (pressure.at(i, j) - pressure.at(i, j - 1));
            }
        }
    });
}

/// As [`apply_pressure_gradient_in_place`], writing into a separate output
/// field. Untouched faces copy the input through.
pub fn apply_pressure_gradient(
    input: &MacVelocity,
    markers: &MarkerField,
    pressure: &ScalarField,
    output: &mut MacVelocity,
) {
    output.u.copy_from_slice(&input.u);
    output.v.copy_from_slice(&input.v);
    apply_pressure_gradient_in_place(output, markers, pressure);
}
