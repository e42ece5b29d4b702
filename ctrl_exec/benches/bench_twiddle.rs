//! # Twiddle Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ctrl_lib::{
    pid::{Gains, PidController},
    twiddle::{Twiddle, TwiddleParams},
};

fn twiddle_benchmark(c: &mut Criterion) {
    let params = TwiddleParams::default();
    let ctrl = PidController::new(
        Gains { k_p: 0.12, k_i: 0.002, k_d: 0.05 },
        1.0,
        -1.0,
    );

    // A full trial of the default length with the controller running on a decaying oscillation
    c.bench_function("Twiddle::trial", |b| {
        b.iter(|| {
            let mut tw = Twiddle::new(ctrl.clone(), &params);
            let mut report = None;
            let mut i = 0;

            while report.is_none() {
                let cte = (-(i as f64) * 0.01).exp() * ((i as f64) * 0.2).sin();

                let pid = tw.controller_mut();
                pid.update_error(cte, 0.05);
                black_box(pid.compute_output());

                report = tw.step(cte);
                i += 1;
            }

            report
        })
    });

    c.bench_function("PidController::update", |b| {
        let mut pid = ctrl.clone();
        b.iter(|| {
            pid.update_error(black_box(0.3), 0.05);
            pid.compute_output()
        })
    });
}

criterion_group!(benches, twiddle_benchmark);
criterion_main!(benches);
