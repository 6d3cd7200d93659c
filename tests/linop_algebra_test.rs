use approx::assert_abs_diff_eq;
use mapfit::mapfit_errors::MapfitError;
use mapfit::operators::algebra::{DiagonalOp, IdentityOp, OpProduct, OpScaled, OpSum};
use mapfit::operators::block_diagonal::BlockDiagOp;
use mapfit::operators::{to_dense, LinearOp};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_vector(len: usize, rng: &mut StdRng) -> DVector<f64> {
    DVector::from_fn(len, |_, _| rng.gen_range(-1.0..1.0))
}

#[test]
fn operator_sum_is_linear_in_the_operands() {
    let mut rng = StdRng::seed_from_u64(17);
    let n = 64;
    let a = DiagonalOp::new(random_vector(n, &mut rng));
    let b = DiagonalOp::new(random_vector(n, &mut rng));
    let sum = OpSum::new(&a, &b).unwrap();

    for _ in 0..8 {
        let v = random_vector(n, &mut rng);
        let lhs = sum.apply(&v).unwrap();
        let rhs = a.apply(&v).unwrap() + b.apply(&v).unwrap();
        assert_abs_diff_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-13);
    }
}

#[test]
fn scaled_product_composes_without_materializing() {
    let mut rng = StdRng::seed_from_u64(18);
    let n = 32;
    let a = DiagonalOp::new(random_vector(n, &mut rng));
    let prod = OpProduct::new(&a, IdentityOp::new(n)).unwrap();
    let scaled = OpScaled::new(-2.5, &prod);

    let v = random_vector(n, &mut rng);
    let expected = a.apply(&v).unwrap() * -2.5;
    assert_abs_diff_eq!((scaled.apply(&v).unwrap() - expected).norm(), 0.0, epsilon = 1e-13);
}

#[test]
fn composition_rejects_shape_mismatches() {
    let a = IdentityOp::new(4);
    let b = IdentityOp::new(5);
    assert!(matches!(
        OpSum::new(&a, &b).unwrap_err(),
        MapfitError::IncompatibleShapes { .. }
    ));
    assert!(matches!(
        OpProduct::new(&a, &b).unwrap_err(),
        MapfitError::IncompatibleShapes { .. }
    ));
}

#[test]
fn block_diagonal_matches_dense_direct_sum() {
    let mut rng = StdRng::seed_from_u64(19);
    let blocks = vec![
        DiagonalOp::new(random_vector(3, &mut rng)),
        DiagonalOp::new(random_vector(5, &mut rng)),
        DiagonalOp::new(random_vector(2, &mut rng)),
    ];
    let expected_diag: Vec<f64> = blocks
        .iter()
        .flat_map(|block| block.diagonal().iter().copied().collect::<Vec<_>>())
        .collect();

    let op = BlockDiagOp::new(blocks).unwrap();
    assert_eq!(op.shape(), (10, 10));

    let dense = to_dense(&op).unwrap();
    for i in 0..10 {
        for j in 0..10 {
            let expected = if i == j { expected_diag[i] } else { 0.0 };
            assert_abs_diff_eq!(dense[(i, j)], expected, epsilon = 1e-14);
        }
    }
}

#[test]
fn transpose_of_product_reverses_the_factors() {
    let mut rng = StdRng::seed_from_u64(20);
    let n = 16;
    let a = DiagonalOp::new(random_vector(n, &mut rng));
    let b = DiagonalOp::new(random_vector(n, &mut rng));
    let prod = OpProduct::new(&a, &b).unwrap();

    // Diagonal factors commute, so (A·B)ᵀ·v must equal B·(A·v).
    let v = random_vector(n, &mut rng);
    let lhs = prod.apply_transpose(&v).unwrap();
    let rhs = b.apply(&a.apply(&v).unwrap()).unwrap();
    assert_abs_diff_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-13);
}
