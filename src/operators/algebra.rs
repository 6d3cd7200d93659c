//! # Operator algebra
//!
//! Immutable composition nodes over [`LinearOp`] operands: sums, products, and scalar
//! multiples, plus the trivial identity and diagonal operators. Each node owns its
//! operands (pass references thanks to the blanket `impl LinearOp for &T`) and expresses
//! its `apply` in terms of the operands' applies — nothing is ever evaluated into a dense
//! matrix. Shape compatibility is checked once, at construction.
//!
//! ## Example
//!
//! ```rust
//! use nalgebra::DVector;
//! use mapfit::operators::{LinearOp, algebra::{DiagonalOp, OpSum, OpScaled}};
//!
//! let a = DiagonalOp::new(DVector::from_vec(vec![1.0, 2.0]));
//! let b = DiagonalOp::new(DVector::from_vec(vec![3.0, 4.0]));
//! let sum = OpSum::new(&a, &b).unwrap();
//! let half = OpScaled::new(0.5, &sum);
//!
//! let x = DVector::from_vec(vec![1.0, 1.0]);
//! assert_eq!(half.apply(&x).unwrap(), DVector::from_vec(vec![2.0, 3.0]));
//! ```

use nalgebra::DVector;

use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;

/// Sum of two operators of identical shape: `(A + B)·x = A·x + B·x`.
#[derive(Debug)]
pub struct OpSum<A, B> {
    left: A,
    right: B,
}

impl<A: LinearOp, B: LinearOp> OpSum<A, B> {
    /// Build `A + B`, failing if the shapes differ.
    pub fn new(left: A, right: B) -> Result<Self, MapfitError> {
        if left.shape() != right.shape() {
            return Err(MapfitError::IncompatibleShapes {
                operation: "add",
                left_rows: left.nrows(),
                left_cols: left.ncols(),
                right_rows: right.nrows(),
                right_cols: right.ncols(),
            });
        }
        Ok(OpSum { left, right })
    }
}

impl<A: LinearOp, B: LinearOp> LinearOp for OpSum<A, B> {
    fn nrows(&self) -> usize {
        self.left.nrows()
    }

    fn ncols(&self) -> usize {
        self.left.ncols()
    }

    fn is_symmetric(&self) -> bool {
        self.left.is_symmetric() && self.right.is_symmetric()
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        Ok(self.left.apply(x)? + self.right.apply(x)?)
    }

    fn apply_transpose(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        Ok(self.left.apply_transpose(x)? + self.right.apply_transpose(x)?)
    }
}

/// Product of two operators: `(A · B)·x = A·(B·x)`.
#[derive(Debug)]
pub struct OpProduct<A, B> {
    left: A,
    right: B,
}

impl<A: LinearOp, B: LinearOp> OpProduct<A, B> {
    /// Build `A · B`, failing unless the inner dimensions agree.
    pub fn new(left: A, right: B) -> Result<Self, MapfitError> {
        if left.ncols() != right.nrows() {
            return Err(MapfitError::IncompatibleShapes {
                operation: "multiply",
                left_rows: left.nrows(),
                left_cols: left.ncols(),
                right_rows: right.nrows(),
                right_cols: right.ncols(),
            });
        }
        Ok(OpProduct { left, right })
    }
}

impl<A: LinearOp, B: LinearOp> LinearOp for OpProduct<A, B> {
    fn nrows(&self) -> usize {
        self.left.nrows()
    }

    fn ncols(&self) -> usize {
        self.right.ncols()
    }

    // A·B is not symmetric in general, even for symmetric operands.

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.left.apply(&self.right.apply(x)?)
    }

    fn apply_transpose(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.right.apply_transpose(&self.left.apply_transpose(x)?)
    }
}

/// Scalar multiple of an operator: `(s·A)·x = s·(A·x)`.
pub struct OpScaled<A> {
    scale: f64,
    inner: A,
}

impl<A: LinearOp> OpScaled<A> {
    pub fn new(scale: f64, inner: A) -> Self {
        OpScaled { scale, inner }
    }
}

impl<A: LinearOp> LinearOp for OpScaled<A> {
    fn nrows(&self) -> usize {
        self.inner.nrows()
    }

    fn ncols(&self) -> usize {
        self.inner.ncols()
    }

    fn is_symmetric(&self) -> bool {
        self.inner.is_symmetric()
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        Ok(self.inner.apply(x)? * self.scale)
    }

    fn apply_transpose(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        Ok(self.inner.apply_transpose(x)? * self.scale)
    }
}

/// The identity operator of a given dimension.
#[derive(Debug, Clone)]
pub struct IdentityOp {
    dim: usize,
}

impl IdentityOp {
    pub fn new(dim: usize) -> Self {
        IdentityOp { dim }
    }
}

impl LinearOp for IdentityOp {
    fn nrows(&self) -> usize {
        self.dim
    }

    fn ncols(&self) -> usize {
        self.dim
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.check_apply(x)?;
        Ok(x.clone())
    }
}

/// A diagonal operator: elementwise scaling by a fixed vector.
#[derive(Debug, Clone)]
pub struct DiagonalOp {
    diag: DVector<f64>,
}

impl DiagonalOp {
    pub fn new(diag: DVector<f64>) -> Self {
        DiagonalOp { diag }
    }

    pub fn diagonal(&self) -> &DVector<f64> {
        &self.diag
    }
}

impl LinearOp for DiagonalOp {
    fn nrows(&self) -> usize {
        self.diag.len()
    }

    fn ncols(&self) -> usize {
        self.diag.len()
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.check_apply(x)?;
        Ok(x.component_mul(&self.diag))
    }
}
