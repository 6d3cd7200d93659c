//! # Matrix-free linear operators
//!
//! This module defines the [`LinearOp`] contract shared by every operator in the crate:
//! the pointing operator, the noise covariance family, the block-diagonal preconditioner,
//! and the composition nodes of [`algebra`].
//!
//! ## Contract
//!
//! A linear operator is a mapping `x ↦ A·x` with a declared shape `(nrows, ncols)`:
//! the input vector has length `ncols` and the output vector has length `nrows`. An
//! operator never materializes its matrix representation — `apply` is the only way in.
//! Applying a vector of the wrong length fails with
//! [`MapfitError::ShapeMismatch`](crate::mapfit_errors::MapfitError::ShapeMismatch).
//!
//! Operators are immutable once constructed: applying one must not mutate observable
//! state. Performance caches prepared at construction time (e.g. FFT plans in the
//! circulant noise operator) are allowed because they are observably pure.
//!
//! ## Composition
//!
//! Operators compose into immutable expression nodes without ever being evaluated into a
//! dense matrix: see [`algebra::OpSum`], [`algebra::OpProduct`] and [`algebra::OpScaled`].
//! Shape compatibility is validated when the node is built, not when it is applied.
//!
//! ## See also
//!
//! * [`algebra`] – composition nodes and the trivial identity/diagonal operators.
//! * [`block_diagonal`] – direct sums of homogeneous blocks.
//! * [`to_dense`] – dense probe of an operator, for tests and small diagnostics only.

pub mod algebra;
pub mod block_diagonal;

use nalgebra::{DMatrix, DVector};

use crate::mapfit_errors::MapfitError;

/// Common interface of all matrix-free linear operators.
pub trait LinearOp {
    /// Length of the output vector `A·x`.
    fn nrows(&self) -> usize;

    /// Length of the input vector `x`.
    fn ncols(&self) -> usize;

    /// Whether the operator is self-adjoint. Symmetric operators get
    /// [`LinearOp::apply_transpose`] for free.
    fn is_symmetric(&self) -> bool {
        false
    }

    /// Compute `A·x`.
    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError>;

    /// Compute `Aᵀ·x`.
    ///
    /// The default implementation forwards to [`LinearOp::apply`] and is only valid for
    /// symmetric operators; non-symmetric operators must override it.
    fn apply_transpose(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        debug_assert!(
            self.is_symmetric(),
            "apply_transpose must be overridden for non-symmetric operators"
        );
        self.apply(x)
    }

    /// Shape of the operator as `(nrows, ncols)`.
    fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    /// Validate the input length of a forward application.
    fn check_apply(&self, x: &DVector<f64>) -> Result<(), MapfitError> {
        if x.len() != self.ncols() {
            return Err(MapfitError::ShapeMismatch {
                nrows: self.nrows(),
                ncols: self.ncols(),
                len: x.len(),
            });
        }
        Ok(())
    }

    /// Validate the input length of a transpose application.
    fn check_apply_transpose(&self, x: &DVector<f64>) -> Result<(), MapfitError> {
        if x.len() != self.nrows() {
            return Err(MapfitError::ShapeMismatch {
                nrows: self.nrows(),
                ncols: self.ncols(),
                len: x.len(),
            });
        }
        Ok(())
    }
}

impl<T: LinearOp + ?Sized> LinearOp for &T {
    fn nrows(&self) -> usize {
        (**self).nrows()
    }

    fn ncols(&self) -> usize {
        (**self).ncols()
    }

    fn is_symmetric(&self) -> bool {
        (**self).is_symmetric()
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        (**self).apply(x)
    }

    fn apply_transpose(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        (**self).apply_transpose(x)
    }
}

/// Return the dense form of a linear operator by applying it to every basis vector.
///
/// This allocates an `nrows × ncols` matrix and performs `ncols` applications; it exists
/// for tests and small diagnostics, never for production-sized operators.
pub fn to_dense<A: LinearOp>(op: &A) -> Result<DMatrix<f64>, MapfitError> {
    let (nrows, ncols) = op.shape();
    let mut dense = DMatrix::zeros(nrows, ncols);
    let mut basis = DVector::zeros(ncols);
    for j in 0..ncols {
        basis[j] = 1.0;
        let column = op.apply(&basis)?;
        dense.set_column(j, &column);
        basis[j] = 0.0;
    }
    Ok(dense)
}
