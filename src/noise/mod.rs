//! # Noise covariance models
//!
//! Detector noise enters the GLS estimator through the inverse covariance `N⁻¹` of the
//! time-ordered data. Three stationary models are supported, each as a matrix-free
//! operator with an efficient apply:
//!
//! * [`DiagonalNoiseOp`] – white (uncorrelated) noise; apply is an elementwise scale.
//! * [`CirculantNoiseOp`] – stationary periodic correlation; apply runs in the transform
//!   domain (forward FFT, spectral multiply, inverse FFT) at `O(n log n)`.
//! * [`ToeplitzNoiseOp`] – banded stationary correlation with non-periodic boundary;
//!   apply embeds the band into a larger circulant and truncates back.
//!
//! Every model exposes both the covariance and its inverse as operators; for the
//! Toeplitz model the inverse is the circulant-embedded approximation (exact in the
//! periodic limit, accurate to the boundary effect otherwise).
//!
//! Per-detector independence is expressed by stacking per-block operators with
//! [`BlockDiagOp`](crate::operators::block_diagonal::BlockDiagOp): the composed apply
//! dispatches block by block and needs no cross-block communication.
//!
//! [`NoiseModel`] is the serializable descriptor used by callers that configure the
//! noise from parameters rather than constructing operators directly.

pub mod circulant;
pub mod diagonal;
pub mod toeplitz;

pub use circulant::CirculantNoiseOp;
pub use diagonal::DiagonalNoiseOp;
pub use toeplitz::ToeplitzNoiseOp;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;

/// Descriptor of a per-process (or per-detector) noise model: kind plus parameters.
///
/// The descriptor is the configuration-level view of the noise; call
/// [`NoiseModel::covariance_operator`] or [`NoiseModel::inverse_operator`] to turn it
/// into an operator acting on a time-ordered vector of a given length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NoiseModel {
    /// Uncorrelated noise with one variance per sample.
    Diagonal { variances: Vec<f64> },
    /// Stationary periodic correlation described by the first row of the circulant
    /// covariance matrix.
    Circulant { covariance_row: Vec<f64> },
    /// Banded stationary correlation described by the leading covariance band
    /// `[c(0), c(1), …, c(bw-1)]`.
    Toeplitz { band: Vec<f64> },
}

/// A noise operator of any supported kind, behind one tagged type.
#[derive(Debug)]
pub enum NoiseOperator {
    Diagonal(DiagonalNoiseOp),
    Circulant(CirculantNoiseOp),
    Toeplitz(ToeplitzNoiseOp),
}

impl NoiseModel {
    /// Build the covariance operator `N` for a time-ordered vector of length `nsamples`.
    pub fn covariance_operator(&self, nsamples: usize) -> Result<NoiseOperator, MapfitError> {
        match self {
            NoiseModel::Diagonal { variances } => {
                check_len("variances", variances.len(), nsamples)?;
                Ok(NoiseOperator::Diagonal(DiagonalNoiseOp::from_variances(
                    variances.clone(),
                )?))
            }
            NoiseModel::Circulant { covariance_row } => {
                check_len("covariance_row", covariance_row.len(), nsamples)?;
                Ok(NoiseOperator::Circulant(
                    CirculantNoiseOp::from_covariance_row(covariance_row)?,
                ))
            }
            NoiseModel::Toeplitz { band } => Ok(NoiseOperator::Toeplitz(
                ToeplitzNoiseOp::from_band(band, nsamples)?,
            )),
        }
    }

    /// Build the inverse-covariance operator `N⁻¹` for a time-ordered vector of length
    /// `nsamples`.
    pub fn inverse_operator(&self, nsamples: usize) -> Result<NoiseOperator, MapfitError> {
        match self.covariance_operator(nsamples)? {
            NoiseOperator::Diagonal(op) => Ok(NoiseOperator::Diagonal(op.inverse())),
            NoiseOperator::Circulant(op) => Ok(NoiseOperator::Circulant(op.inverse()?)),
            NoiseOperator::Toeplitz(op) => Ok(NoiseOperator::Toeplitz(op.inverse()?)),
        }
    }
}

fn check_len(name: &str, got: usize, expected: usize) -> Result<(), MapfitError> {
    if got != expected {
        return Err(MapfitError::InputLengthMismatch(format!(
            "{name} has length {got}, expected {expected}"
        )));
    }
    Ok(())
}

impl LinearOp for NoiseOperator {
    fn nrows(&self) -> usize {
        match self {
            NoiseOperator::Diagonal(op) => op.nrows(),
            NoiseOperator::Circulant(op) => op.nrows(),
            NoiseOperator::Toeplitz(op) => op.nrows(),
        }
    }

    fn ncols(&self) -> usize {
        match self {
            NoiseOperator::Diagonal(op) => op.ncols(),
            NoiseOperator::Circulant(op) => op.ncols(),
            NoiseOperator::Toeplitz(op) => op.ncols(),
        }
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        match self {
            NoiseOperator::Diagonal(op) => op.apply(x),
            NoiseOperator::Circulant(op) => op.apply(x),
            NoiseOperator::Toeplitz(op) => op.apply(x),
        }
    }
}
