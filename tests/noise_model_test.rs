use approx::assert_abs_diff_eq;
use mapfit::mapfit_errors::MapfitError;
use mapfit::noise::{CirculantNoiseOp, DiagonalNoiseOp, NoiseModel, ToeplitzNoiseOp};
use mapfit::operators::LinearOp;
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Symmetric, diagonally dominant circulant row with a positive spectrum.
fn exponential_row(n: usize, decay: f64) -> Vec<f64> {
    (0..n)
        .map(|k| (-(k.min(n - k) as f64) * decay).exp())
        .collect()
}

#[test]
fn diagonal_round_trip_for_random_variances() {
    let mut rng = StdRng::seed_from_u64(31);
    for _ in 0..8 {
        let variances: Vec<f64> = (0..50).map(|_| rng.gen_range(0.1..10.0)).collect();
        let noise = DiagonalNoiseOp::from_variances(variances).unwrap();
        let inverse = noise.inverse();

        let v = DVector::from_fn(50, |_, _| rng.gen_range(-5.0..5.0));
        let round_trip = inverse.apply(&noise.apply(&v).unwrap()).unwrap();
        assert_abs_diff_eq!((round_trip - v).norm(), 0.0, epsilon = 1e-12);
    }
}

/// The transform-domain shortcut must agree with the direct quadratic-cost circular
/// convolution on small inputs.
#[test]
fn circulant_apply_matches_dense_reference() {
    let n = 24;
    let row = exponential_row(n, 1.0);
    let op = CirculantNoiseOp::from_covariance_row(&row).unwrap();

    let mut rng = StdRng::seed_from_u64(32);
    let x = DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0));
    let fast = op.apply(&x).unwrap();

    for i in 0..n {
        let mut direct = 0.0;
        for j in 0..n {
            direct += row[(i + n - j) % n] * x[j];
        }
        assert_abs_diff_eq!(fast[i], direct, epsilon = 1e-10);
    }
}

#[test]
fn circulant_inverse_round_trip() {
    let n = 64;
    let op = CirculantNoiseOp::from_covariance_row(&exponential_row(n, 0.7)).unwrap();
    let inverse = op.inverse().unwrap();

    let mut rng = StdRng::seed_from_u64(33);
    let x = DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0));
    let round_trip = inverse.apply(&op.apply(&x).unwrap()).unwrap();
    assert_abs_diff_eq!((round_trip - x).norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn circulant_rejects_singular_spectrum() {
    // A constant row has spectrum (n·c, 0, 0, …): all but the DC mode vanish.
    let row = vec![1.0; 8];
    let err = CirculantNoiseOp::from_covariance_row(&row).unwrap_err();
    assert!(matches!(err, MapfitError::SingularNoiseSpectrum { .. }));
}

/// The circulant-embedded Toeplitz inverse is exact away from the boundary: the
/// round-trip error must be negligible in the interior of a well-conditioned band.
#[test]
fn toeplitz_inverse_round_trip_in_the_interior() {
    let n = 48;
    let band = [4.0, 0.4, 0.1];
    let op = ToeplitzNoiseOp::from_band(&band, n).unwrap();
    let inverse = op.inverse().unwrap();

    let mut rng = StdRng::seed_from_u64(34);
    let x = DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0));
    let round_trip = inverse.apply(&op.apply(&x).unwrap()).unwrap();

    for i in n / 3..2 * n / 3 {
        assert_abs_diff_eq!(round_trip[i], x[i], epsilon = 1e-8);
    }
}

#[test]
fn descriptor_builds_matching_operators() {
    let nsamples = 16;
    let model = NoiseModel::Diagonal {
        variances: vec![2.0; nsamples],
    };
    let covariance = model.covariance_operator(nsamples).unwrap();
    let inverse = model.inverse_operator(nsamples).unwrap();

    let x = DVector::from_element(nsamples, 3.0);
    assert_abs_diff_eq!(
        (covariance.apply(&x).unwrap() - DVector::from_element(nsamples, 6.0)).norm(),
        0.0,
        epsilon = 1e-13
    );
    assert_abs_diff_eq!(
        (inverse.apply(&x).unwrap() - DVector::from_element(nsamples, 1.5)).norm(),
        0.0,
        epsilon = 1e-13
    );
}

#[test]
fn descriptor_rejects_mismatched_lengths() {
    let model = NoiseModel::Circulant {
        covariance_row: exponential_row(8, 1.0),
    };
    let err = model.covariance_operator(16).unwrap_err();
    assert!(matches!(err, MapfitError::InputLengthMismatch(_)));
}
