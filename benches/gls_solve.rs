//! Benchmarks for the full GLS solve on synthetic scans (single process).
//!
//! Run with:
//!   cargo bench --bench gls_solve
//!   cargo bench gls_solve -- gls_solve/intensity_diagonal
//!   cargo bench gls_solve -- gls_solve/iqu_diagonal

use std::f64::consts::PI;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mapfit::communicator::SelfComm;
use mapfit::gls::compute_gls_maps;
use mapfit::noise::{CirculantNoiseOp, DiagonalNoiseOp};
use mapfit::scan::{ScanSamples, StokesMode};
use mapfit::solver::GlsParams;

struct Fixture {
    npix: usize,
    pointings: Vec<usize>,
    angles: Vec<f64>,
    tod: Vec<f64>,
}

/// Deterministic synthetic scan: every pixel swept `passes` times under random angles.
fn make_fixture(npix: usize, passes: usize, seed: u64) -> Fixture {
    let mut rng = StdRng::seed_from_u64(seed);
    let nsamples = npix * passes;

    let mut pointings = Vec::with_capacity(nsamples);
    for _ in 0..passes {
        pointings.extend(0..npix);
    }
    let angles: Vec<f64> = (0..nsamples)
        .map(|_| rng.gen_range(-PI / 2.0..PI / 2.0))
        .collect();
    let tod: Vec<f64> = pointings
        .iter()
        .zip(angles.iter())
        .map(|(&pixel, &psi)| {
            let i = 1.0 + pixel as f64;
            let q = 0.1 * (pixel as f64).cos();
            let u = 0.1 * (pixel as f64).sin();
            i + q * (2.0 * psi).cos() + u * (2.0 * psi).sin()
        })
        .collect();

    Fixture {
        npix,
        pointings,
        angles,
        tod,
    }
}

fn bench_gls_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("gls_solve");

    let fixture = make_fixture(512, 8, 7);
    let nsamples = fixture.tod.len();
    let params = GlsParams::default();

    // 1) Intensity-only solve with white noise.
    let samples = ScanSamples::process(
        fixture.npix,
        &fixture.pointings,
        None,
        None,
        None,
        StokesMode::I,
        Arc::new(SelfComm),
    )
    .expect("scan fixture");
    let inv_white = DiagonalNoiseOp::from_variances(vec![1.0; nsamples])
        .expect("white noise")
        .inverse();
    let tod = DVector::from_vec(fixture.tod.clone());

    group.bench_function("intensity_diagonal", |b| {
        b.iter(|| {
            let result =
                compute_gls_maps(black_box(&samples), &tod, &inv_white, &params).expect("solve");
            black_box(result.iterations);
        })
    });

    // 2) Full IQU solve with white noise.
    let samples_iqu = ScanSamples::process(
        fixture.npix,
        &fixture.pointings,
        None,
        Some(&fixture.angles),
        None,
        StokesMode::Iqu,
        Arc::new(SelfComm),
    )
    .expect("scan fixture");

    group.bench_function("iqu_diagonal", |b| {
        b.iter(|| {
            let result = compute_gls_maps(black_box(&samples_iqu), &tod, &inv_white, &params)
                .expect("solve");
            black_box(result.iterations);
        })
    });

    // 3) Intensity solve with a circulant (FFT-applied) inverse noise covariance.
    let row: Vec<f64> = (0..nsamples)
        .map(|k| (-(k.min(nsamples - k) as f64) * 0.5).exp())
        .collect();
    let inv_circulant = CirculantNoiseOp::from_covariance_row(&row)
        .expect("circulant noise")
        .inverse()
        .expect("invertible spectrum");

    group.bench_function("intensity_circulant", |b| {
        b.iter(|| {
            let result = compute_gls_maps(black_box(&samples), &tod, &inv_circulant, &params)
                .expect("solve");
            black_box(result.iterations);
        })
    });

    group.finish();
}

criterion_group!(gls_benches, bench_gls_solve);
criterion_main!(gls_benches);
