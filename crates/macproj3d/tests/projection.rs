//! End-to-end projection scenarios on small grids with known solutions.

use glam::DVec3;
use macproj3d::{
    Grid3D, MacVelocity3D, MgParams, PressureSolver3D, ProjectionConfig, SolverKind,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn unit_grid(n: usize) -> Grid3D {
    Grid3D::new(n, n, n, DVec3::splat(1.0), DVec3::ZERO).unwrap()
}

/// Closed box, all faces interior to the Y axis carrying unit downwash.
fn box_velocity(n: usize) -> MacVelocity3D {
    let mut vel = MacVelocity3D::new(unit_grid(n));
    for k in 0..n {
        for j in 1..n {
            for i in 0..n {
                let idx = vel.v_index(i, j, k);
                vel.v[idx] = 1.0;
            }
        }
    }
    vel
}

fn assert_still(vel: &MacVelocity3D, tol: f64) {
    for value in vel.u.iter().chain(vel.v.iter()).chain(vel.w.iter()) {
        assert!(value.abs() < tol, "residual velocity {value}");
    }
}

#[test]
fn closed_box_comes_to_rest() {
    for compressed in [false, true] {
        let mut vel = box_velocity(3);
        let config = ProjectionConfig {
            compressed,
            ..Default::default()
        };
        let mut solver = PressureSolver3D::new(config).unwrap();
        solver
            .solve_in_place(&mut vel, &|_| f64::MAX, &|_| -1.0)
            .unwrap();

        assert_still(&vel, 1e-5);
        // Hydrostatic-like profile: pressure drops by h per cell upward.
        let pressure = solver.pressure();
        for k in 0..3 {
            for j in 0..2 {
                for i in 0..3 {
                    assert!(
                        (pressure.at(i, j + 1, k) - pressure.at(i, j, k) + 1.0).abs() < 1e-5
                    );
                }
            }
        }
    }
}

#[test]
fn free_surface_pressure_profile() {
    let mut vel = box_velocity(3);
    let mut solver = PressureSolver3D::new(ProjectionConfig::default()).unwrap();
    // Fluid below y = 2, air above.
    solver
        .solve_in_place(&mut vel, &|_| f64::MAX, &|p: DVec3| p.y - 2.0)
        .unwrap();

    assert_still(&vel, 1e-5);
    let pressure = solver.pressure();
    for k in 0..3 {
        for j in 0..3 {
            for i in 0..3 {
                assert!((pressure.at(i, j, k) - (2.0 - j as f64)).abs() < 1e-5);
            }
        }
    }
}

#[test]
fn solid_wall_keeps_its_velocity() {
    let mut vel = box_velocity(3);
    let mut solver = PressureSolver3D::new(ProjectionConfig::default()).unwrap();
    // Everything right of x = 2 is solid, which covers the i = 2 wall.
    solver
        .solve_in_place(&mut vel, &|p: DVec3| -p.x + 2.0, &|_| -1.0)
        .unwrap();

    for k in 0..3 {
        for j in 0..4 {
            for i in 0..3 {
                let v = vel.v[vel.v_index(i, j, k)];
                if i == 2 && (j == 1 || j == 2) {
                    // Faces between two solid cells are left alone.
                    assert!((v - 1.0).abs() < 1e-5);
                } else {
                    assert!(v.abs() < 1e-5);
                }
            }
        }
    }
}

#[test]
fn random_field_becomes_divergence_free() {
    let n = 8;
    let grid = unit_grid(n);
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut vel = MacVelocity3D::new(grid);
    // Interior faces only, so the net flux stays zero and the closed-box
    // system is compatible.
    for k in 0..n {
        for j in 0..n {
            for i in 1..n {
                let idx = vel.u_index(i, j, k);
                vel.u[idx] = rng.gen_range(-1.0..1.0);
            }
        }
    }
    for k in 0..n {
        for j in 1..n {
            for i in 0..n {
                let idx = vel.v_index(i, j, k);
                vel.v[idx] = rng.gen_range(-1.0..1.0);
            }
        }
    }
    for k in 1..n {
        for j in 0..n {
            for i in 0..n {
                let idx = vel.w_index(i, j, k);
                vel.w[idx] = rng.gen_range(-1.0..1.0);
            }
        }
    }

    for compressed in [false, true] {
        let mut out = MacVelocity3D::new(grid);
        let config = ProjectionConfig {
            solver: SolverKind::Iterative {
                max_iterations: 1000,
                tolerance: 1e-10,
            },
            compressed,
            ..Default::default()
        };
        let mut solver = PressureSolver3D::new(config).unwrap();
        solver
            .solve(&vel, &|_| f64::MAX, &|_| -1.0, &mut out)
            .unwrap();

        for k in 0..n {
            for j in 0..n {
                for i in 0..n {
                    assert!(
                        out.divergence_at(i, j, k).abs() < 1e-6,
                        "cell ({i}, {j}, {k}) still diverges"
                    );
                }
            }
        }
    }
}

#[test]
fn multigrid_handles_fluid_up_to_the_lid() {
    // Free surface one cell below the closed top. Coarsening votes the
    // top slab 4 fluid vs 4 air; it has to stay air, or every coarse level
    // is a closed all-fluid system and the cycles run away.
    let fluid = |p: DVec3| p.y - 15.0;
    let mut solved = Vec::new();
    let solvers = [
        SolverKind::Iterative {
            max_iterations: 1000,
            tolerance: 1e-10,
        },
        SolverKind::Multigrid(MgParams {
            max_levels: 3,
            max_cycles: 50,
            tolerance: 1e-10,
            ..Default::default()
        }),
    ];
    for kind in solvers {
        let mut vel = box_velocity(16);
        let config = ProjectionConfig {
            solver: kind,
            ..Default::default()
        };
        let mut solver = PressureSolver3D::new(config).unwrap();
        solver
            .solve_in_place(&mut vel, &|_| f64::MAX, &fluid)
            .unwrap();
        for value in vel.u.iter().chain(vel.v.iter()).chain(vel.w.iter()) {
            assert!(value.abs() < 10.0, "velocity ran away: {value}");
        }
        solved.push(vel);
    }
    for (a, b) in solved[0].v.iter().zip(solved[1].v.iter()) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn multigrid_matches_pcg() {
    let fluid = |p: DVec3| p.y - 10.0;
    let mut solved = Vec::new();
    let solvers = [
        SolverKind::Iterative {
            max_iterations: 1000,
            tolerance: 1e-10,
        },
        SolverKind::Multigrid(MgParams {
            max_levels: 3,
            max_cycles: 50,
            tolerance: 1e-10,
            ..Default::default()
        }),
    ];
    for kind in solvers {
        let mut vel = box_velocity(16);
        let config = ProjectionConfig {
            solver: kind,
            ..Default::default()
        };
        let mut solver = PressureSolver3D::new(config).unwrap();
        solver
            .solve_in_place(&mut vel, &|_| f64::MAX, &fluid)
            .unwrap();
        solved.push(vel);
    }
    for (a, b) in solved[0].v.iter().zip(solved[1].v.iter()) {
        assert!((a - b).abs() < 1e-4);
    }
}
