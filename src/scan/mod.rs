//! # Scan samples: the process-local shard of time-ordered data
//!
//! This module defines [`ScanSamples`], the container that turns raw per-process arrays
//! (pointing indices, quality flags, polarization angles, noise weights) into the
//! precomputed state every downstream operator needs:
//!
//! * the **global hit count** per pixel and the observed-pixel mask,
//! * the **compressed pixel indexing** (unobserved and degenerate pixels removed, local
//!   pointings rewritten in the compressed space),
//! * the per-pixel **weighted polarization accumulators** (`Σw`, `Σw·cos2ψ`,
//!   `Σw·sin2ψ`, `Σw·cos²2ψ`, `Σw·sin²2ψ`, `Σw·sin2ψcos2ψ`), globally reduced —
//!   the 1×1 / 2×2 / 3×3 block per pixel that drives both binning and the
//!   block-diagonal preconditioner.
//!
//! Construction is a **collective** operation: every process of the communicator group
//! must call [`ScanSamples::process`] with its own shard, and the accumulators are
//! combined with one global reduction per array so that every process ends up with the
//! identical global view.
//!
//! ## Pixel compression
//!
//! A pixel observed by zero valid samples across all processes cannot be solved for —
//! the normal-equations matrix is singular there — so it is removed from the map space
//! entirely rather than patched downstream. Under the default
//! [`DegeneracyPolicy::Exclude`], pixels whose accumulated polarization block is
//! numerically singular (e.g. a pixel only ever observed at a single polarization
//! angle) are removed the same way, and the samples that pointed at them are flagged
//! invalid. The solved map therefore lives on `observed_npix ≤ npix` pixels, and no
//! NaN/Inf can leak out of unobservable pixels.
//!
//! ## See also
//!
//! * [`PointingOp`](crate::scan::pointing::PointingOp) – the measurement operator built
//!   on this container.
//! * [`BlockDiagPreconditioner`](crate::scan::preconditioner::BlockDiagPreconditioner) –
//!   per-pixel inverse of the accumulated blocks.

pub mod pointing;
pub mod preconditioner;

use std::sync::Arc;

use itertools::izip;
use serde::{Deserialize, Serialize};

use crate::communicator::Communicator;
use crate::constants::{Radian, DEGENERACY_THRESHOLD, INVALID_PIXEL};
use crate::mapfit_errors::MapfitError;

/// Which Stokes components the map is solved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StokesMode {
    /// Intensity only: one component per pixel.
    I,
    /// Polarization only: Q and U per pixel.
    Qu,
    /// Full solve: I, Q and U per pixel.
    Iqu,
}

impl StokesMode {
    /// Number of map components per pixel.
    pub fn components(self) -> usize {
        match self {
            StokesMode::I => 1,
            StokesMode::Qu => 2,
            StokesMode::Iqu => 3,
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            StokesMode::I => "I",
            StokesMode::Qu => "QU",
            StokesMode::Iqu => "IQU",
        }
    }
}

/// What to do with a pixel whose accumulated polarization block is singular.
///
/// The choice is experiment-dependent, so it is a configuration knob rather than a
/// hard-coded behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DegeneracyPolicy {
    /// Remove the pixel from the solved set, exactly like a never-observed pixel, when
    /// the determinant of its accumulated block falls below `threshold`.
    Exclude { threshold: f64 },
    /// Keep the pixel; the preconditioner falls back to a pseudo-inverse of its block.
    PseudoInverse,
}

impl Default for DegeneracyPolicy {
    fn default() -> Self {
        DegeneracyPolicy::Exclude {
            threshold: DEGENERACY_THRESHOLD,
        }
    }
}

/// Process-local shard of time-ordered samples plus the globally-reduced per-pixel
/// state derived from it.
///
/// See the [module documentation](self) for the processing pipeline.
pub struct ScanSamples {
    mode: StokesMode,
    policy: DegeneracyPolicy,
    npix: usize,
    observed_npix: usize,
    nsamples: usize,

    // Per local sample, in the compressed pixel space. Invalid samples carry
    // `INVALID_PIXEL` and contribute to nothing.
    pointings: Vec<usize>,
    cos2: Vec<f64>,
    sin2: Vec<f64>,
    weights: Vec<f64>,

    // Per full-space pixel.
    observed: Vec<bool>,
    pixel_map: Vec<usize>,

    // Per compressed pixel, globally reduced.
    hit_counts: Vec<u64>,
    weighted_counts: Vec<f64>,
    weighted_cos: Vec<f64>,
    weighted_sin: Vec<f64>,
    weighted_cos_sq: Vec<f64>,
    weighted_sin_sq: Vec<f64>,
    weighted_sincos: Vec<f64>,

    comm: Arc<dyn Communicator>,
}

impl std::fmt::Debug for ScanSamples {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanSamples")
            .field("mode", &self.mode)
            .field("policy", &self.policy)
            .field("npix", &self.npix)
            .field("observed_npix", &self.observed_npix)
            .field("nsamples", &self.nsamples)
            .field("comm_rank", &self.comm.rank())
            .field("comm_size", &self.comm.size())
            .finish_non_exhaustive()
    }
}

impl ScanSamples {
    /// Process a local shard of time-ordered samples with the default
    /// [`DegeneracyPolicy`].
    ///
    /// This is a collective call: every member of `comm`'s group must call it, with
    /// the same `npix` and `mode`.
    ///
    /// Arguments
    /// ---------
    /// * `npix`: number of pixels of the full map space (identical on every process).
    /// * `pointings`: one pixel index per local time sample.
    /// * `flags`: optional per-sample validity flag (`true` = valid); defaults to all
    ///   valid.
    /// * `pol_angles`: per-sample polarization angle ψ in radians; required for
    ///   [`StokesMode::Qu`] and [`StokesMode::Iqu`], ignored for [`StokesMode::I`].
    /// * `noise_weights`: optional per-sample inverse-variance weight; defaults to 1.
    /// * `mode`: which Stokes components to solve for.
    /// * `comm`: the communicator group this shard belongs to.
    ///
    /// Return
    /// ------
    /// * The processed container, or a construction error (mismatched array lengths,
    ///   pixel index out of range, missing angles, no observed pixel anywhere).
    #[allow(clippy::too_many_arguments)]
    pub fn process(
        npix: usize,
        pointings: &[usize],
        flags: Option<&[bool]>,
        pol_angles: Option<&[Radian]>,
        noise_weights: Option<&[f64]>,
        mode: StokesMode,
        comm: Arc<dyn Communicator>,
    ) -> Result<Self, MapfitError> {
        Self::process_with_policy(
            npix,
            pointings,
            flags,
            pol_angles,
            noise_weights,
            mode,
            comm,
            DegeneracyPolicy::default(),
        )
    }

    /// Same as [`ScanSamples::process`], with an explicit [`DegeneracyPolicy`].
    #[allow(clippy::too_many_arguments)]
    pub fn process_with_policy(
        npix: usize,
        pointings: &[usize],
        flags: Option<&[bool]>,
        pol_angles: Option<&[Radian]>,
        noise_weights: Option<&[f64]>,
        mode: StokesMode,
        comm: Arc<dyn Communicator>,
        policy: DegeneracyPolicy,
    ) -> Result<Self, MapfitError> {
        let nsamples = pointings.len();

        if let Some(flags) = flags {
            if flags.len() != nsamples {
                return Err(MapfitError::InputLengthMismatch(format!(
                    "flags has length {}, pointings has length {}",
                    flags.len(),
                    nsamples
                )));
            }
        }
        if let Some(weights) = noise_weights {
            if weights.len() != nsamples {
                return Err(MapfitError::InputLengthMismatch(format!(
                    "noise_weights has length {}, pointings has length {}",
                    weights.len(),
                    nsamples
                )));
            }
            for (index, &value) in weights.iter().enumerate() {
                if !(value.is_finite() && value > 0.0) {
                    return Err(MapfitError::NonPositiveNoiseVariance { index, value });
                }
            }
        }
        let angles = match (mode, pol_angles) {
            (StokesMode::I, _) => None,
            (_, Some(angles)) => {
                if angles.len() != nsamples {
                    return Err(MapfitError::InputLengthMismatch(format!(
                        "pol_angles has length {}, pointings has length {}",
                        angles.len(),
                        nsamples
                    )));
                }
                Some(angles)
            }
            (_, None) => return Err(MapfitError::MissingPolarizationAngles(mode.label())),
        };

        let valid: Vec<bool> = match flags {
            Some(flags) => flags.to_vec(),
            None => vec![true; nsamples],
        };
        for (&pixel, &is_valid) in pointings.iter().zip(valid.iter()) {
            if is_valid && pixel >= npix {
                return Err(MapfitError::PixelIndexOutOfRange { index: pixel, npix });
            }
        }

        let weights: Vec<f64> = match noise_weights {
            Some(weights) => weights.to_vec(),
            None => vec![1.0; nsamples],
        };
        let (cos2, sin2) = match angles {
            Some(angles) => {
                let cos2: Vec<f64> = angles.iter().map(|&psi| (2.0 * psi).cos()).collect();
                let sin2: Vec<f64> = angles.iter().map(|&psi| (2.0 * psi).sin()).collect();
                (cos2, sin2)
            }
            None => (Vec::new(), Vec::new()),
        };

        // Local accumulation over the full pixel space, then one global reduction per
        // array. Contributions combine in ascending rank order (Communicator contract).
        let mut counts = vec![0u64; npix];
        let mut weighted_counts = vec![0.0; npix];
        let mut weighted_cos = vec![0.0; npix];
        let mut weighted_sin = vec![0.0; npix];
        let mut weighted_cos_sq = vec![0.0; npix];
        let mut weighted_sin_sq = vec![0.0; npix];
        let mut weighted_sincos = vec![0.0; npix];

        for (sample, (&pixel, &is_valid, &weight)) in
            izip!(pointings.iter(), valid.iter(), weights.iter()).enumerate()
        {
            if !is_valid {
                continue;
            }
            counts[pixel] += 1;
            weighted_counts[pixel] += weight;
            if mode != StokesMode::I {
                let c = cos2[sample];
                let s = sin2[sample];
                weighted_cos[pixel] += weight * c;
                weighted_sin[pixel] += weight * s;
                weighted_cos_sq[pixel] += weight * c * c;
                weighted_sin_sq[pixel] += weight * s * s;
                weighted_sincos[pixel] += weight * s * c;
            }
        }

        comm.reduce_sum_u64(&mut counts);
        comm.reduce_sum_f64(&mut weighted_counts);
        if mode != StokesMode::I {
            comm.reduce_sum_f64(&mut weighted_cos);
            comm.reduce_sum_f64(&mut weighted_sin);
            comm.reduce_sum_f64(&mut weighted_cos_sq);
            comm.reduce_sum_f64(&mut weighted_sin_sq);
            comm.reduce_sum_f64(&mut weighted_sincos);
        }

        // Observed pixels, minus the degenerate ones under the Exclude policy.
        let mut observed: Vec<bool> = counts.iter().map(|&count| count > 0).collect();
        if let DegeneracyPolicy::Exclude { threshold } = policy {
            let mut excluded = 0usize;
            for pixel in 0..npix {
                if !observed[pixel] {
                    continue;
                }
                let degenerate = match mode {
                    StokesMode::I => weighted_counts[pixel] <= 0.0,
                    StokesMode::Qu => {
                        let det = weighted_cos_sq[pixel] * weighted_sin_sq[pixel]
                            - weighted_sincos[pixel] * weighted_sincos[pixel];
                        det < threshold
                    }
                    StokesMode::Iqu => {
                        let (a, b, c) = (
                            weighted_counts[pixel],
                            weighted_cos[pixel],
                            weighted_sin[pixel],
                        );
                        let (d, e, f) = (
                            weighted_cos_sq[pixel],
                            weighted_sincos[pixel],
                            weighted_sin_sq[pixel],
                        );
                        let det = a * (d * f - e * e) - b * (b * f - c * e) + c * (b * e - c * d);
                        det < threshold
                    }
                };
                if degenerate {
                    observed[pixel] = false;
                    excluded += 1;
                }
            }
            if excluded > 0 {
                log::info!(
                    "excluded {excluded} degenerate pixel(s) from the {} solve",
                    mode.label()
                );
            }
        }

        // Compressed indexing: observed pixels get consecutive new indices.
        let mut pixel_map = vec![INVALID_PIXEL; npix];
        let mut observed_npix = 0usize;
        for (pixel, &is_observed) in observed.iter().enumerate() {
            if is_observed {
                pixel_map[pixel] = observed_npix;
                observed_npix += 1;
            }
        }
        if observed_npix == 0 {
            return Err(MapfitError::NoObservedPixels);
        }

        let compress_u64 = |full: &[u64]| -> Vec<u64> {
            full.iter()
                .zip(observed.iter())
                .filter(|(_, &keep)| keep)
                .map(|(&value, _)| value)
                .collect()
        };
        let compress = |full: &[f64]| -> Vec<f64> {
            full.iter()
                .zip(observed.iter())
                .filter(|(_, &keep)| keep)
                .map(|(&value, _)| value)
                .collect()
        };

        // Rewrite the local pointings into the compressed space. Samples that pointed
        // at an excluded pixel become invalid.
        let remapped: Vec<usize> = pointings
            .iter()
            .zip(valid.iter())
            .map(|(&pixel, &is_valid)| {
                if is_valid && observed[pixel] {
                    pixel_map[pixel]
                } else {
                    INVALID_PIXEL
                }
            })
            .collect();

        log::debug!(
            "scan processed: mode={}, npix={npix}, observed_npix={observed_npix}, \
             local samples={nsamples}",
            mode.label()
        );

        Ok(ScanSamples {
            mode,
            policy,
            npix,
            observed_npix,
            nsamples,
            pointings: remapped,
            cos2,
            sin2,
            weights,
            hit_counts: compress_u64(&counts),
            weighted_counts: compress(&weighted_counts),
            weighted_cos: compress(&weighted_cos),
            weighted_sin: compress(&weighted_sin),
            weighted_cos_sq: compress(&weighted_cos_sq),
            weighted_sin_sq: compress(&weighted_sin_sq),
            weighted_sincos: compress(&weighted_sincos),
            observed,
            pixel_map,
            comm,
        })
    }

    pub fn mode(&self) -> StokesMode {
        self.mode
    }

    pub fn policy(&self) -> DegeneracyPolicy {
        self.policy
    }

    /// Number of pixels of the full map space.
    pub fn npix(&self) -> usize {
        self.npix
    }

    /// Number of pixels retained in the solved (compressed) map space.
    pub fn observed_npix(&self) -> usize {
        self.observed_npix
    }

    /// Length of the solved map vector: `observed_npix × components`.
    pub fn map_len(&self) -> usize {
        self.observed_npix * self.mode.components()
    }

    /// Number of local time samples, including flagged ones.
    pub fn nsamples(&self) -> usize {
        self.nsamples
    }

    /// Observed-pixel mask over the full pixel space.
    pub fn observed(&self) -> &[bool] {
        &self.observed
    }

    /// Global hit counts over the compressed pixel space.
    pub fn hit_counts(&self) -> &[u64] {
        &self.hit_counts
    }

    /// Global hit map over the full pixel space (zero for unobserved pixels).
    pub fn full_hit_map(&self) -> Vec<u64> {
        let mut full = vec![0u64; self.npix];
        for (pixel, &is_observed) in self.observed.iter().enumerate() {
            if is_observed {
                full[pixel] = self.hit_counts[self.pixel_map[pixel]];
            }
        }
        full
    }

    /// Scatter a compressed per-pixel vector back to the full pixel space, writing
    /// `fill` into unobserved pixels.
    pub fn expand_map(
        &self,
        compressed: &nalgebra::DVector<f64>,
        fill: f64,
    ) -> Result<nalgebra::DVector<f64>, MapfitError> {
        if compressed.len() != self.observed_npix {
            return Err(MapfitError::InputLengthMismatch(format!(
                "compressed map has length {}, expected {}",
                compressed.len(),
                self.observed_npix
            )));
        }
        let mut full = nalgebra::DVector::from_element(self.npix, fill);
        for (pixel, &is_observed) in self.observed.iter().enumerate() {
            if is_observed {
                full[pixel] = compressed[self.pixel_map[pixel]];
            }
        }
        Ok(full)
    }

    pub fn comm(&self) -> &Arc<dyn Communicator> {
        &self.comm
    }

    pub(crate) fn local_pointings(&self) -> &[usize] {
        &self.pointings
    }

    pub(crate) fn cos2(&self) -> &[f64] {
        &self.cos2
    }

    pub(crate) fn sin2(&self) -> &[f64] {
        &self.sin2
    }

    /// Per-sample noise weights as supplied (1.0 where defaulted), e.g. to build a
    /// matching diagonal inverse-noise operator.
    pub fn noise_weights(&self) -> &[f64] {
        &self.weights
    }

    pub(crate) fn weighted_counts(&self) -> &[f64] {
        &self.weighted_counts
    }

    pub(crate) fn weighted_cos(&self) -> &[f64] {
        &self.weighted_cos
    }

    pub(crate) fn weighted_sin(&self) -> &[f64] {
        &self.weighted_sin
    }

    pub(crate) fn weighted_cos_sq(&self) -> &[f64] {
        &self.weighted_cos_sq
    }

    pub(crate) fn weighted_sin_sq(&self) -> &[f64] {
        &self.weighted_sin_sq
    }

    pub(crate) fn weighted_sincos(&self) -> &[f64] {
        &self.weighted_sincos
    }
}
