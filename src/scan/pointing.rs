//! # Pointing operator
//!
//! The measurement equation of the experiment: the forward apply scans a sky map into a
//! time-ordered vector (each local sample reads its pixel's components, projected by the
//! polarization angle), and the transpose apply bins a time-ordered vector back into map
//! space (weighted accumulation per pixel followed by **one global sum-reduction**,
//! since a pixel may be hit from several processes).
//!
//! After the reduction, the transpose result is the identical global map vector on every
//! process — this is the only collective step inside a normal-equations application, so
//! every process reaches it in the same order by construction.
//!
//! Flagged samples read and contribute exactly zero in both directions. Unobserved
//! pixels do not exist in the compressed map space handled here.

use nalgebra::DVector;

use crate::constants::INVALID_PIXEL;
use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;
use crate::scan::{ScanSamples, StokesMode};

/// The pointing operator `P` over a processed scan.
///
/// Shape: `(local nsamples, observed_npix × components)`. The forward direction is
/// process-local; the transpose direction ends with a global reduction and returns the
/// replicated global map vector.
pub struct PointingOp<'a> {
    samples: &'a ScanSamples,
}

impl<'a> PointingOp<'a> {
    pub fn new(samples: &'a ScanSamples) -> Self {
        PointingOp { samples }
    }
}

impl LinearOp for PointingOp<'_> {
    fn nrows(&self) -> usize {
        self.samples.nsamples()
    }

    fn ncols(&self) -> usize {
        self.samples.map_len()
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.check_apply(x)?;
        let mode = self.samples.mode();
        let pointings = self.samples.local_pointings();
        let mut tod = DVector::zeros(self.samples.nsamples());

        match mode {
            StokesMode::I => {
                for (sample, &pixel) in pointings.iter().enumerate() {
                    if pixel != INVALID_PIXEL {
                        tod[sample] = x[pixel];
                    }
                }
            }
            StokesMode::Qu => {
                let cos2 = self.samples.cos2();
                let sin2 = self.samples.sin2();
                for (sample, &pixel) in pointings.iter().enumerate() {
                    if pixel != INVALID_PIXEL {
                        tod[sample] = cos2[sample] * x[2 * pixel] + sin2[sample] * x[2 * pixel + 1];
                    }
                }
            }
            StokesMode::Iqu => {
                let cos2 = self.samples.cos2();
                let sin2 = self.samples.sin2();
                for (sample, &pixel) in pointings.iter().enumerate() {
                    if pixel != INVALID_PIXEL {
                        tod[sample] = x[3 * pixel]
                            + cos2[sample] * x[3 * pixel + 1]
                            + sin2[sample] * x[3 * pixel + 2];
                    }
                }
            }
        }
        Ok(tod)
    }

    fn apply_transpose(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.check_apply_transpose(x)?;
        let mode = self.samples.mode();
        let pointings = self.samples.local_pointings();
        let mut binned = vec![0.0; self.samples.map_len()];

        match mode {
            StokesMode::I => {
                for (sample, &pixel) in pointings.iter().enumerate() {
                    if pixel != INVALID_PIXEL {
                        binned[pixel] += x[sample];
                    }
                }
            }
            StokesMode::Qu => {
                let cos2 = self.samples.cos2();
                let sin2 = self.samples.sin2();
                for (sample, &pixel) in pointings.iter().enumerate() {
                    if pixel != INVALID_PIXEL {
                        binned[2 * pixel] += cos2[sample] * x[sample];
                        binned[2 * pixel + 1] += sin2[sample] * x[sample];
                    }
                }
            }
            StokesMode::Iqu => {
                let cos2 = self.samples.cos2();
                let sin2 = self.samples.sin2();
                for (sample, &pixel) in pointings.iter().enumerate() {
                    if pixel != INVALID_PIXEL {
                        binned[3 * pixel] += x[sample];
                        binned[3 * pixel + 1] += cos2[sample] * x[sample];
                        binned[3 * pixel + 2] += sin2[sample] * x[sample];
                    }
                }
            }
        }

        // A pixel may receive hits from several processes: the local accumulation is
        // only a partial sum until reduced.
        self.samples.comm().reduce_sum_f64(&mut binned);
        Ok(DVector::from_vec(binned))
    }
}
