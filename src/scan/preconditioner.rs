//! # Block-diagonal preconditioner
//!
//! The normal-equations operator `Pᵀ N⁻¹ P` is diagonally dominant in pixel space: with
//! white noise it is exactly block-diagonal, one 1×1 / 2×2 / 3×3 block per pixel — the
//! weighted polarization accumulators the scan container already holds. Inverting those
//! blocks pixel by pixel gives a cheap approximate inverse of the whole operator, the
//! classical preconditioner of GLS map-making.
//!
//! Apply is embarrassingly parallel and needs no communication: each pixel's components
//! are multiplied by its own precomputed inverse block.
//!
//! A degenerate block (pixel observed under too few independent angles) never reaches
//! this module under [`DegeneracyPolicy::Exclude`] — the pixel was removed from the
//! solved set during scan processing. Under [`DegeneracyPolicy::PseudoInverse`] the
//! block is replaced by its Moore–Penrose pseudo-inverse.

use nalgebra::{DVector, Matrix2, Matrix3, Vector2, Vector3};

use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;
use crate::scan::{DegeneracyPolicy, ScanSamples, StokesMode};

/// Pixel-block inverse of the weighted projection accumulators.
///
/// Shape: `(map_len, map_len)`, symmetric. The inverted blocks are packed row-major,
/// `components²` entries per pixel.
pub struct BlockDiagPreconditioner {
    mode: StokesMode,
    dim: usize,
    blocks: Vec<f64>,
}

impl BlockDiagPreconditioner {
    /// Invert every pixel block of a processed scan.
    ///
    /// Return
    /// ------
    /// * The preconditioner operator, or [`MapfitError::DegenerateBlock`] when a block
    ///   is singular and the scan's policy cannot absorb it.
    pub fn new(samples: &ScanSamples) -> Result<Self, MapfitError> {
        let mode = samples.mode();
        let npix = samples.observed_npix();
        let k = mode.components();
        let mut blocks = Vec::with_capacity(npix * k * k);

        match mode {
            StokesMode::I => {
                for (pixel, &wc) in samples.weighted_counts().iter().enumerate() {
                    if wc <= 0.0 {
                        return Err(MapfitError::DegenerateBlock(pixel));
                    }
                    blocks.push(1.0 / wc);
                }
            }
            StokesMode::Qu => {
                for pixel in 0..npix {
                    let block = Matrix2::new(
                        samples.weighted_cos_sq()[pixel],
                        samples.weighted_sincos()[pixel],
                        samples.weighted_sincos()[pixel],
                        samples.weighted_sin_sq()[pixel],
                    );
                    let inverse = invert_block2(block, pixel, samples.policy())?;
                    blocks.extend_from_slice(&[
                        inverse[(0, 0)],
                        inverse[(0, 1)],
                        inverse[(1, 0)],
                        inverse[(1, 1)],
                    ]);
                }
            }
            StokesMode::Iqu => {
                for pixel in 0..npix {
                    let block = Matrix3::new(
                        samples.weighted_counts()[pixel],
                        samples.weighted_cos()[pixel],
                        samples.weighted_sin()[pixel],
                        samples.weighted_cos()[pixel],
                        samples.weighted_cos_sq()[pixel],
                        samples.weighted_sincos()[pixel],
                        samples.weighted_sin()[pixel],
                        samples.weighted_sincos()[pixel],
                        samples.weighted_sin_sq()[pixel],
                    );
                    let inverse = invert_block3(block, pixel, samples.policy())?;
                    for row in 0..3 {
                        for col in 0..3 {
                            blocks.push(inverse[(row, col)]);
                        }
                    }
                }
            }
        }

        Ok(BlockDiagPreconditioner {
            mode,
            dim: samples.map_len(),
            blocks,
        })
    }
}

fn invert_block2(
    block: Matrix2<f64>,
    pixel: usize,
    policy: DegeneracyPolicy,
) -> Result<Matrix2<f64>, MapfitError> {
    match block.try_inverse() {
        Some(inverse) => Ok(inverse),
        None => match policy {
            DegeneracyPolicy::PseudoInverse => block
                .pseudo_inverse(f64::EPSILON.sqrt())
                .map_err(|_| MapfitError::DegenerateBlock(pixel)),
            DegeneracyPolicy::Exclude { .. } => Err(MapfitError::DegenerateBlock(pixel)),
        },
    }
}

fn invert_block3(
    block: Matrix3<f64>,
    pixel: usize,
    policy: DegeneracyPolicy,
) -> Result<Matrix3<f64>, MapfitError> {
    match block.try_inverse() {
        Some(inverse) => Ok(inverse),
        None => match policy {
            DegeneracyPolicy::PseudoInverse => block
                .pseudo_inverse(f64::EPSILON.sqrt())
                .map_err(|_| MapfitError::DegenerateBlock(pixel)),
            DegeneracyPolicy::Exclude { .. } => Err(MapfitError::DegenerateBlock(pixel)),
        },
    }
}

impl LinearOp for BlockDiagPreconditioner {
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
        let mut out = DVector::zeros(self.dim);
        match self.mode {
            StokesMode::I => {
                for (pixel, &inv) in self.blocks.iter().enumerate() {
                    out[pixel] = inv * x[pixel];
                }
            }
            StokesMode::Qu => {
                for pixel in 0..self.dim / 2 {
                    let b = &self.blocks[4 * pixel..4 * pixel + 4];
                    let m = Matrix2::new(b[0], b[1], b[2], b[3]);
                    let v = m * Vector2::new(x[2 * pixel], x[2 * pixel + 1]);
                    out[2 * pixel] = v[0];
                    out[2 * pixel + 1] = v[1];
                }
            }
            StokesMode::Iqu => {
                for pixel in 0..self.dim / 3 {
                    let b = &self.blocks[9 * pixel..9 * pixel + 9];
                    let m = Matrix3::new(b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8]);
                    let v = m * Vector3::new(x[3 * pixel], x[3 * pixel + 1], x[3 * pixel + 2]);
                    out[3 * pixel] = v[0];
                    out[3 * pixel + 1] = v[1];
                    out[3 * pixel + 2] = v[2];
                }
            }
        }
        Ok(out)
    }
}
