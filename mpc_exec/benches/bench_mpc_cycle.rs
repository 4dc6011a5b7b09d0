//! # MPC Cycle Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use mpc_lib::{
    grad_solver::{self, GradSolver},
    mpc_ctrl::{self, MpcCtrl},
    sim::{self, SimDriver},
};
use util::module::State;

fn mpc_cycle_benchmark(c: &mut Criterion) {
    // ---- Build the controller and a telemetry sample from the simulation ----

    let solver = GradSolver::new(grad_solver::Params::default()).unwrap();
    let mut ctrl = MpcCtrl::new(mpc_ctrl::Params::default(), Box::new(solver))
        .unwrap()
        .with_pacer(|_| ());

    let mut sim = SimDriver::new(sim::Params::default()).unwrap();

    // Run a few cycles so the vehicle is up to speed and the solver is warm
    let mut tm = sim.telemetry();
    for _ in 0..20 {
        let (cmd, _) = ctrl.proc(&tm).unwrap();
        tm = sim.proc(&cmd).unwrap().0;
    }

    c.bench_function("mpc_cycle", |b| b.iter(|| ctrl.proc(&tm)));
}

criterion_group!(benches, mpc_cycle_benchmark);
criterion_main!(benches);
