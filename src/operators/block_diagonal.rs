//! # Block-diagonal composition
//!
//! [`BlockDiagOp`] combines independent operators into their direct sum: a vector is
//! split along the block boundaries, each block is applied to its own slice, and the
//! outputs are concatenated. No information flows between blocks, which is exactly the
//! structure of uncorrelated per-detector (or per-process) noise.

use nalgebra::DVector;

use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;

/// Direct sum of homogeneous blocks: `diag(B₀, B₁, …)`.
///
/// Shape is the sum of the block shapes; the operator is symmetric iff every block is.
/// Blocks may have different sizes but must share a concrete type — in practice they are
/// per-detector noise operators of one kind.
#[derive(Debug)]
pub struct BlockDiagOp<T> {
    blocks: Vec<T>,
    nrows: usize,
    ncols: usize,
    symmetric: bool,
}

impl<T: LinearOp> BlockDiagOp<T> {
    /// Build the direct sum of `blocks`. At least one block is required.
    pub fn new(blocks: Vec<T>) -> Result<Self, MapfitError> {
        if blocks.is_empty() {
            return Err(MapfitError::EmptyBlockDiagonal);
        }
        let nrows = blocks.iter().map(LinearOp::nrows).sum();
        let ncols = blocks.iter().map(LinearOp::ncols).sum();
        let symmetric = blocks.iter().all(LinearOp::is_symmetric);
        Ok(BlockDiagOp {
            blocks,
            nrows,
            ncols,
            symmetric,
        })
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[T] {
        &self.blocks
    }

    fn dispatch(
        &self,
        x: &DVector<f64>,
        out_len: usize,
        in_of: impl Fn(&T) -> usize,
        out_of: impl Fn(&T) -> usize,
        apply: impl Fn(&T, &DVector<f64>) -> Result<DVector<f64>, MapfitError>,
    ) -> Result<DVector<f64>, MapfitError> {
        let mut out = DVector::zeros(out_len);
        let mut in_offset = 0;
        let mut out_offset = 0;
        for block in &self.blocks {
            let n_in = in_of(block);
            let n_out = out_of(block);
            let piece = apply(block, &x.rows(in_offset, n_in).into_owned())?;
            out.rows_mut(out_offset, n_out).copy_from(&piece);
            in_offset += n_in;
            out_offset += n_out;
        }
        Ok(out)
    }
}

impl<T: LinearOp> LinearOp for BlockDiagOp<T> {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.check_apply(x)?;
        self.dispatch(x, self.nrows, T::ncols, T::nrows, |b, v| b.apply(v))
    }

    fn apply_transpose(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.check_apply_transpose(x)?;
        self.dispatch(x, self.ncols, T::nrows, T::ncols, |b, v| {
            b.apply_transpose(v)
        })
    }
}
