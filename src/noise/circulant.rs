//! # Circulant noise covariance
//!
//! A stationary, periodic noise correlation makes the covariance matrix circulant: it is
//! fully described by its first row, and it is diagonalized by the discrete Fourier
//! transform. Applying the covariance (or its inverse) therefore costs `O(n log n)`:
//! forward transform, elementwise multiply by the precomputed spectrum, inverse
//! transform — never the quadratic dense product.
//!
//! The FFT plans are prepared once at construction and cached inside the operator; plan
//! reuse is a pure performance cache and does not affect observable behavior.
//!
//! ## Positive-definiteness
//!
//! The eigenvalues of a circulant matrix are the DFT of its generating row. A valid
//! covariance must be symmetric positive-definite, so construction checks that the
//! spectrum is real (up to [`SPECTRUM_IMAG_TOL`]) and strictly positive (relative to
//! [`SPECTRUM_TOL`]); the inverse operator is then the circulant with reciprocal
//! spectrum.

use std::fmt;
use std::sync::Arc;

use nalgebra::DVector;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::constants::{SPECTRUM_IMAG_TOL, SPECTRUM_TOL};
use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;

/// Shared transform-domain machinery: a circulant multiply of a fixed length `m` with a
/// fixed spectrum. Used by the circulant covariance directly and by the Toeplitz
/// operator through its circulant embedding.
pub(crate) struct CirculantKernel {
    m: usize,
    spectrum: Vec<Complex<f64>>,
    fwd: Arc<dyn Fft<f64>>,
    inv: Arc<dyn Fft<f64>>,
}

impl CirculantKernel {
    /// Build the kernel for the circulant whose first row is `row`.
    pub(crate) fn from_row(row: &[f64]) -> Self {
        let m = row.len();
        let mut planner = FftPlanner::new();
        let fwd = planner.plan_fft_forward(m);
        let inv = planner.plan_fft_inverse(m);

        let mut spectrum: Vec<Complex<f64>> =
            row.iter().map(|&value| Complex::new(value, 0.0)).collect();
        fwd.process(&mut spectrum);

        CirculantKernel {
            m,
            spectrum,
            fwd,
            inv,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.m
    }

    pub(crate) fn spectrum(&self) -> &[Complex<f64>] {
        &self.spectrum
    }

    /// Kernel with the elementwise reciprocal spectrum, rejecting near-zero modes.
    pub(crate) fn reciprocal(&self) -> Result<Self, MapfitError> {
        let max_modulus = self
            .spectrum
            .iter()
            .map(|value| value.norm())
            .fold(0.0_f64, f64::max);
        let floor = SPECTRUM_TOL * max_modulus.max(1.0);
        let mut reciprocal = Vec::with_capacity(self.m);
        for (index, value) in self.spectrum.iter().enumerate() {
            if value.norm() <= floor {
                return Err(MapfitError::SingularNoiseSpectrum {
                    index,
                    value: value.re,
                });
            }
            reciprocal.push(value.inv());
        }
        Ok(CirculantKernel {
            m: self.m,
            spectrum: reciprocal,
            fwd: Arc::clone(&self.fwd),
            inv: Arc::clone(&self.inv),
        })
    }

    /// Multiply a complex buffer of length `m` by the circulant, in place.
    pub(crate) fn convolve(&self, buffer: &mut [Complex<f64>]) {
        debug_assert_eq!(buffer.len(), self.m);
        self.fwd.process(buffer);
        for (value, lambda) in buffer.iter_mut().zip(self.spectrum.iter()) {
            *value *= lambda;
        }
        self.inv.process(buffer);
        // rustfft leaves the inverse transform unnormalized.
        let scale = 1.0 / self.m as f64;
        for value in buffer.iter_mut() {
            *value *= scale;
        }
    }
}

impl fmt::Debug for CirculantKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CirculantKernel").field("m", &self.m).finish()
    }
}

/// Circulant noise covariance operator, applied in the transform domain.
#[derive(Debug)]
pub struct CirculantNoiseOp {
    kernel: CirculantKernel,
}

impl CirculantNoiseOp {
    /// Build the covariance operator from the first row of the circulant covariance.
    ///
    /// Arguments
    /// ---------
    /// * `covariance_row`: the generating sequence `[c(0), c(1), …, c(n-1)]`. For a valid
    ///   symmetric covariance, `c(k) == c(n-k)`.
    ///
    /// Return
    /// ------
    /// * The covariance operator, or an error when the row is empty, its spectrum has a
    ///   significant imaginary part (asymmetric row), or a spectral value is not
    ///   strictly positive (the matrix would not be positive-definite).
    pub fn from_covariance_row(covariance_row: &[f64]) -> Result<Self, MapfitError> {
        if covariance_row.is_empty() {
            return Err(MapfitError::InvalidNoiseModel(
                "circulant covariance row must not be empty".into(),
            ));
        }
        let kernel = CirculantKernel::from_row(covariance_row);

        let max_modulus = kernel
            .spectrum()
            .iter()
            .map(|value| value.norm())
            .fold(0.0_f64, f64::max);
        for (index, value) in kernel.spectrum().iter().enumerate() {
            if value.im.abs() > SPECTRUM_IMAG_TOL * max_modulus.max(1.0) {
                return Err(MapfitError::InvalidNoiseModel(format!(
                    "circulant covariance row is not symmetric: spectral mode {index} has \
                     imaginary part {}",
                    value.im
                )));
            }
            if value.re <= SPECTRUM_TOL * max_modulus.max(1.0) {
                return Err(MapfitError::SingularNoiseSpectrum {
                    index,
                    value: value.re,
                });
            }
        }

        log::debug!(
            "circulant noise operator: n={}, spectral range [{:.3e}, {:.3e}]",
            kernel.len(),
            kernel
                .spectrum()
                .iter()
                .map(|v| v.re)
                .fold(f64::INFINITY, f64::min),
            kernel
                .spectrum()
                .iter()
                .map(|v| v.re)
                .fold(f64::NEG_INFINITY, f64::max),
        );

        Ok(CirculantNoiseOp { kernel })
    }

    /// The exact inverse operator: the circulant with reciprocal spectrum.
    pub fn inverse(&self) -> Result<CirculantNoiseOp, MapfitError> {
        Ok(CirculantNoiseOp {
            kernel: self.kernel.reciprocal()?,
        })
    }
}

impl LinearOp for CirculantNoiseOp {
    fn nrows(&self) -> usize {
        self.kernel.len()
    }

    fn ncols(&self) -> usize {
        self.kernel.len()
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.check_apply(x)?;
        let mut buffer: Vec<Complex<f64>> =
            x.iter().map(|&value| Complex::new(value, 0.0)).collect();
        self.kernel.convolve(&mut buffer);
        Ok(DVector::from_iterator(
            x.len(),
            buffer.iter().map(|value| value.re),
        ))
    }
}
