//! # Banded Toeplitz noise covariance
//!
//! Noise whose correlation decays with lag, truncated to a bandwidth `bw`, gives a
//! symmetric banded Toeplitz covariance. The operator keeps the transform-domain
//! efficiency of the circulant case through the classic embedding trick: the band is
//! laid out as the first row of a circulant of length `m ≥ n + bw − 1` (rounded up to a
//! power of two), the input is zero-padded to `m`, multiplied in the transform domain,
//! and the first `n` entries of the result are kept. The zero padding guarantees that
//! the periodic wrap-around of the embedding never reaches the retained entries, so the
//! non-periodic boundary of the Toeplitz matrix is respected exactly.
//!
//! The inverse operator uses the reciprocal spectrum of the same embedding. It is the
//! standard circulant approximation to the Toeplitz inverse: exact in the interior,
//! accurate to the boundary effect near the edges, which is the documented tolerance of
//! the inverse-noise contract.

use nalgebra::DVector;
use num_complex::Complex;

use crate::mapfit_errors::MapfitError;
use crate::noise::circulant::CirculantKernel;
use crate::operators::LinearOp;

/// Symmetric banded Toeplitz covariance, applied via circulant embedding.
#[derive(Debug)]
pub struct ToeplitzNoiseOp {
    n: usize,
    bandwidth: usize,
    kernel: CirculantKernel,
}

impl ToeplitzNoiseOp {
    /// Build the covariance operator for `nsamples` time samples from the leading
    /// covariance band.
    ///
    /// Arguments
    /// ---------
    /// * `band`: the covariance band `[c(0), c(1), …, c(bw-1)]`, `1 ≤ bw ≤ nsamples`.
    /// * `nsamples`: the dimension of the (square) operator.
    pub fn from_band(band: &[f64], nsamples: usize) -> Result<Self, MapfitError> {
        if band.is_empty() {
            return Err(MapfitError::InvalidNoiseModel(
                "Toeplitz covariance band must not be empty".into(),
            ));
        }
        if band.len() > nsamples {
            return Err(MapfitError::InvalidNoiseModel(format!(
                "Toeplitz covariance band has length {} but the operator dimension is {}",
                band.len(),
                nsamples
            )));
        }
        if !(band[0].is_finite() && band[0] > 0.0) {
            return Err(MapfitError::NonPositiveNoiseVariance {
                index: 0,
                value: band[0],
            });
        }

        let bandwidth = band.len();
        // Embedding length: wrap-around must stay clear of the first n outputs.
        let m = (nsamples + bandwidth - 1).next_power_of_two();
        let mut row = vec![0.0; m];
        row[0] = band[0];
        for (lag, &value) in band.iter().enumerate().skip(1) {
            row[lag] = value;
            row[m - lag] = value;
        }

        log::debug!(
            "Toeplitz noise operator: n={nsamples}, bandwidth={bandwidth}, embedding m={m}"
        );

        Ok(ToeplitzNoiseOp {
            n: nsamples,
            bandwidth,
            kernel: CirculantKernel::from_row(&row),
        })
    }

    /// The circulant-embedded approximate inverse.
    ///
    /// Fails with [`MapfitError::SingularNoiseSpectrum`] when the embedded spectrum has
    /// a near-zero mode, in which case no stable reciprocal exists.
    pub fn inverse(&self) -> Result<ToeplitzNoiseOp, MapfitError> {
        Ok(ToeplitzNoiseOp {
            n: self.n,
            bandwidth: self.bandwidth,
            kernel: self.kernel.reciprocal()?,
        })
    }

    /// Bandwidth of the covariance band this operator was built from.
    pub fn bandwidth(&self) -> usize {
        self.bandwidth
    }
}

impl LinearOp for ToeplitzNoiseOp {
    fn nrows(&self) -> usize {
        self.n
    }

    fn ncols(&self) -> usize {
        self.n
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.check_apply(x)?;
        // Zero-pad to the embedding length, convolve, truncate.
        let mut buffer = vec![Complex::new(0.0, 0.0); self.kernel.len()];
        for (slot, &value) in buffer.iter_mut().zip(x.iter()) {
            *slot = Complex::new(value, 0.0);
        }
        self.kernel.convolve(&mut buffer);
        Ok(DVector::from_iterator(
            self.n,
            buffer[..self.n].iter().map(|value| value.re),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::to_dense;
    use approx::assert_abs_diff_eq;

    #[test]
    fn matches_dense_toeplitz_product() {
        let band = [2.0, 0.6, 0.1];
        let n = 9;
        let op = ToeplitzNoiseOp::from_band(&band, n).unwrap();
        let dense = to_dense(&op).unwrap();
        for i in 0..n {
            for j in 0..n {
                let lag = i.abs_diff(j);
                let expected = if lag < band.len() { band[lag] } else { 0.0 };
                assert_abs_diff_eq!(dense[(i, j)], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn band_longer_than_dimension_is_rejected() {
        let err = ToeplitzNoiseOp::from_band(&[1.0, 0.5, 0.2], 2).unwrap_err();
        assert!(matches!(err, MapfitError::InvalidNoiseModel(_)));
    }
}
