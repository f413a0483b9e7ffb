//! Tank Projection Diagnostic
//!
//! A closed tank with a solid block near the floor and fluid filling the
//! lower half, hit with a uniform downward velocity. Prints divergence
//! statistics before and after the projection for both solver backends.
//!
//! Run with: cargo run --bin tank_diagnostic --release

use glam::DVec2;
use macproj::{Grid, MacVelocity, Marker, MgParams, PressureSolver, ProjectionConfig, SolverKind};

const N: usize = 32;

fn build_velocity(grid: Grid) -> MacVelocity {
    let mut vel = MacVelocity::new(grid);
    for j in 1..grid.ny {
        for i in 0..grid.nx {
            let idx = vel.v_index(i, j);
            vel.v[idx] = -1.0;
        }
    }
    vel
}

// Solid block occupying roughly the middle third of the floor.
fn boundary_sdf(p: DVec2) -> f64 {
    let half = DVec2::new(0.15, 0.1);
    let center = DVec2::new(0.5, 0.15);
    let d = (p - center).abs() - half;
    d.max(DVec2::ZERO).length() + d.x.max(d.y).min(0.0)
}

fn fluid_sdf(p: DVec2) -> f64 {
    p.y - 0.5
}

fn divergence_stats(vel: &MacVelocity, solver: &PressureSolver) -> (f64, f64) {
    let markers = solver.markers().unwrap();
    let mut max = 0.0f64;
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for j in 0..vel.grid.ny {
        for i in 0..vel.grid.nx {
            if markers.at(i, j) == Marker::Fluid {
                let div = vel.divergence_at(i, j).abs();
                max = max.max(div);
                sum += div;
                count += 1;
            }
        }
    }
    (max, sum / count.max(1) as f64)
}

fn main() {
    let grid = Grid::new(N, N, DVec2::splat(1.0 / N as f64), DVec2::ZERO).unwrap();

    let backends = [
        ("iccg", ProjectionConfig::default()),
        (
            "iccg/compressed",
            ProjectionConfig {
                compressed: true,
                ..Default::default()
            },
        ),
        (
            "multigrid",
            ProjectionConfig {
                solver: SolverKind::Multigrid(MgParams {
                    max_levels: 4,
                    ..Default::default()
                }),
                ..Default::default()
            },
        ),
    ];

    for (name, config) in backends {
        let input = build_velocity(grid);
        let mut output = MacVelocity::new(grid);
        let mut solver = PressureSolver::new(config).unwrap();
        solver
            .solve(&input, &boundary_sdf, &fluid_sdf, &mut output)
            .unwrap();

        let (max_before, avg_before) = divergence_stats(&input, &solver);
        let (max_after, avg_after) = divergence_stats(&output, &solver);
        println!("{name}:");
        println!("  divergence before: max {max_before:.3e}, avg {avg_before:.3e}");
        println!("  divergence after:  max {max_after:.3e}, avg {avg_after:.3e}");
        println!("  solver residual:   {:.3e}", solver.last_residual());
    }
}
