//! Diagonal (white) noise covariance and its inverse.

use nalgebra::DVector;

use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;

/// Diagonal noise covariance: `N = diag(σ²₀, …, σ²ₙ₋₁)`.
///
/// Apply is an elementwise scale. The inverse is exact (elementwise reciprocal);
/// construction rejects non-positive or non-finite variances since their inversion is
/// undefined.
#[derive(Debug, Clone)]
pub struct DiagonalNoiseOp {
    diag: DVector<f64>,
}

impl DiagonalNoiseOp {
    /// Build the covariance operator from per-sample variances.
    ///
    /// Arguments
    /// ---------
    /// * `variances`: one strictly positive, finite variance per time sample.
    ///
    /// Return
    /// ------
    /// * The covariance operator, or
    ///   [`MapfitError::NonPositiveNoiseVariance`] on the first offending entry.
    pub fn from_variances(variances: Vec<f64>) -> Result<Self, MapfitError> {
        for (index, &value) in variances.iter().enumerate() {
            if !(value.is_finite() && value > 0.0) {
                return Err(MapfitError::NonPositiveNoiseVariance { index, value });
            }
        }
        Ok(DiagonalNoiseOp {
            diag: DVector::from_vec(variances),
        })
    }

    /// The exact inverse operator: elementwise reciprocal of the variances.
    pub fn inverse(&self) -> DiagonalNoiseOp {
        DiagonalNoiseOp {
            diag: self.diag.map(|v| 1.0 / v),
        }
    }

    /// The diagonal of the operator.
    pub fn diagonal(&self) -> &DVector<f64> {
        &self.diag
    }
}

impl LinearOp for DiagonalNoiseOp {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_variance_is_rejected() {
        let err = DiagonalNoiseOp::from_variances(vec![1.0, 0.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            MapfitError::NonPositiveNoiseVariance {
                index: 1,
                value: 0.0
            }
        );
    }

    #[test]
    fn inverse_round_trip() {
        let noise = DiagonalNoiseOp::from_variances(vec![0.5, 2.0, 4.0]).unwrap();
        let x = DVector::from_vec(vec![1.0, -2.0, 3.0]);
        let round_trip = noise.inverse().apply(&noise.apply(&x).unwrap()).unwrap();
        assert!((round_trip - x).norm() < 1e-14);
    }
}
