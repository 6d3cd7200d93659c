//! # GLS orchestration
//!
//! Run a full **generalized least-squares map estimate** over a processed scan:
//! assemble the pointing operator and the supplied inverse-noise operator into the
//! matrix-free normal-equations operator `Pᵀ N⁻¹ P`, build the block-diagonal
//! preconditioner, form the right-hand side `Pᵀ N⁻¹ d`, run the distributed PCG
//! solver, and package the solved per-Stokes maps with convergence diagnostics.
//!
//! ## Overview
//! -----------------
//! [`compute_gls_maps`] is the main entry point. It is a collective call: every process
//! of the scan's communicator group must call it with its own local time-ordered data.
//! The returned [`GlsResult`] is identical on every process.
//!
//! ## Result model
//! -----------------
//! * `converged == true` – the residual threshold was met within the iteration budget.
//! * `converged == false` – the budget ran out ([`PcgStopReason::MaxIterReached`]) or
//!   the solver hit a numerical breakdown ([`PcgStopReason::Breakdown`]); the
//!   best-effort maps are still returned, flagged, and are never presented as a valid
//!   solution without the flag.
//!
//! Shape inconsistencies between the supplied operators abort before solving; solver
//! trouble is reported in the result record rather than raised, so callers can inspect
//! partial progress.
//!
//! ## Example
//! -----------------
//! ```rust,no_run
//! use std::sync::Arc;
//! use nalgebra::DVector;
//! use mapfit::communicator::SelfComm;
//! use mapfit::gls::compute_gls_maps;
//! use mapfit::noise::DiagonalNoiseOp;
//! use mapfit::scan::{ScanSamples, StokesMode};
//! use mapfit::solver::GlsParams;
//!
//! # fn demo(pointings: Vec<usize>, tod: DVector<f64>) -> Result<(), mapfit::mapfit_errors::MapfitError> {
//! let samples = ScanSamples::process(
//!     128,
//!     &pointings,
//!     None,
//!     None,
//!     None,
//!     StokesMode::I,
//!     Arc::new(SelfComm),
//! )?;
//! let inv_noise = DiagonalNoiseOp::from_variances(vec![1.0; tod.len()])?.inverse();
//! let params = GlsParams::builder().rel_tolerance(1e-8).build()?;
//!
//! let result = compute_gls_maps(&samples, &tod, &inv_noise, &params)?;
//! eprintln!(
//!     "converged={} after {} iteration(s), residual {:.3e}",
//!     result.converged, result.iterations, result.residual_norm
//! );
//! # Ok(()) }
//! ```
//!
//! ## See also
//! -----------------
//! * [`ScanSamples`](crate::scan::ScanSamples) – the processed scan this runs over.
//! * [`pcg`](crate::solver::pcg) – the iterative engine.
//! * [`separate_map_vectors`] – split an interleaved map vector into per-Stokes maps.

use std::time::{Duration, Instant};

use nalgebra::DVector;

use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;
use crate::scan::pointing::PointingOp;
use crate::scan::preconditioner::BlockDiagPreconditioner;
use crate::scan::{ScanSamples, StokesMode};
use crate::solver::{pcg, GlsParams, PcgStopReason};

/// The matrix-free normal-equations operator `Pᵀ N⁻¹ P`.
///
/// Never materialized: an apply is one forward pointing, one inverse-noise apply, and
/// one transpose pointing (which carries the global reduction).
pub struct NormalEquationsOp<'a, N> {
    pointing: PointingOp<'a>,
    inv_noise: &'a N,
}

impl<'a, N: LinearOp> NormalEquationsOp<'a, N> {
    /// Assemble the operator, failing fast on inconsistent shapes.
    pub fn new(samples: &'a ScanSamples, inv_noise: &'a N) -> Result<Self, MapfitError> {
        let pointing = PointingOp::new(samples);
        if inv_noise.shape() != (pointing.nrows(), pointing.nrows()) {
            return Err(MapfitError::IncompatibleShapes {
                operation: "compose with inverse-noise",
                left_rows: pointing.nrows(),
                left_cols: pointing.ncols(),
                right_rows: inv_noise.nrows(),
                right_cols: inv_noise.ncols(),
            });
        }
        Ok(NormalEquationsOp { pointing, inv_noise })
    }
}

impl<N: LinearOp> LinearOp for NormalEquationsOp<'_, N> {
    fn nrows(&self) -> usize {
        self.pointing.ncols()
    }

    fn ncols(&self) -> usize {
        self.pointing.ncols()
    }

    fn is_symmetric(&self) -> bool {
        true
    }

    fn apply(&self, x: &DVector<f64>) -> Result<DVector<f64>, MapfitError> {
        self.pointing
            .apply_transpose(&self.inv_noise.apply(&self.pointing.apply(x)?)?)
    }
}

/// Final product of a GLS solve. Immutable once returned.
#[derive(Debug, Clone)]
pub struct GlsResult {
    /// Whether the solver met the residual threshold.
    pub converged: bool,
    /// Terminal state of the PCG iteration.
    pub stop_reason: PcgStopReason,
    /// Number of completed PCG iterations.
    pub iterations: usize,
    /// Final residual norm.
    pub residual_norm: f64,
    /// Residual norm after each iteration, starting with the initial residual.
    pub residual_history: Vec<f64>,
    /// Wall-clock time of the solve (operator assembly included).
    pub elapsed: Duration,
    /// Stokes components the maps were solved for.
    pub mode: StokesMode,
    /// Number of pixels of the full map space.
    pub npix: usize,
    /// Number of solved (observed, non-degenerate) pixels.
    pub observed_npix: usize,
    /// One compressed map per Stokes component, each of length `observed_npix`.
    pub maps: Vec<DVector<f64>>,
    /// Observed-pixel mask over the full pixel space.
    pub observed: Vec<bool>,
    /// Global hit map over the full pixel space, when requested.
    pub hit_map: Option<Vec<u64>>,
}

impl GlsResult {
    /// Expand the solved maps to the full pixel space, writing `fill` into pixels that
    /// were not solved for.
    pub fn expanded_maps(
        &self,
        samples: &ScanSamples,
        fill: f64,
    ) -> Result<Vec<DVector<f64>>, MapfitError> {
        self.maps
            .iter()
            .map(|map| samples.expand_map(map, fill))
            .collect()
    }
}

/// Compute the GLS map estimate over a processed scan.
///
/// Arguments
/// ---------
/// * `samples`: the processed scan shard (collective state).
/// * `tod`: the local time-ordered detector data, one value per local sample.
/// * `inv_noise`: the inverse noise covariance of the local time-ordered data, as a
///   matrix-free operator of shape `(nsamples, nsamples)`.
/// * `params`: solver configuration.
///
/// Return
/// ------
/// * The [`GlsResult`] — including for non-converged solves, which carry best-effort
///   maps and `converged = false` — or a construction-time error (inconsistent
///   shapes, degenerate preconditioner block).
///
/// See also
/// -------------
/// * [`NormalEquationsOp`] – the operator this solves.
/// * [`GlsParams::builder`] – solver configuration.
pub fn compute_gls_maps<N: LinearOp>(
    samples: &ScanSamples,
    tod: &DVector<f64>,
    inv_noise: &N,
    params: &GlsParams,
) -> Result<GlsResult, MapfitError> {
    let start = Instant::now();

    if tod.len() != samples.nsamples() {
        return Err(MapfitError::InputLengthMismatch(format!(
            "time-ordered data has length {}, scan holds {} local samples",
            tod.len(),
            samples.nsamples()
        )));
    }

    let normal = NormalEquationsOp::new(samples, inv_noise)?;
    let pointing = PointingOp::new(samples);

    // rhs = Pᵀ N⁻¹ d — replicated on every process after the binning reduction.
    let rhs = pointing.apply_transpose(&inv_noise.apply(tod)?)?;

    let precond = if params.use_preconditioner {
        Some(BlockDiagPreconditioner::new(samples)?)
    } else {
        None
    };

    let outcome = pcg(&normal, precond.as_ref(), &rhs, None, params)?;
    if !outcome.converged() {
        log::warn!(
            "GLS solve did not converge: {:?} after {} iteration(s), residual {:.3e}",
            outcome.stop_reason,
            outcome.iterations,
            outcome.residual_norm
        );
    }

    let maps = separate_map_vectors(&outcome.solution, samples.mode())?;

    Ok(GlsResult {
        converged: outcome.converged(),
        stop_reason: outcome.stop_reason,
        iterations: outcome.iterations,
        residual_norm: outcome.residual_norm,
        residual_history: outcome.residual_history,
        elapsed: start.elapsed(),
        mode: samples.mode(),
        npix: samples.npix(),
        observed_npix: samples.observed_npix(),
        maps,
        observed: samples.observed().to_vec(),
        hit_map: params.return_hit_map.then(|| samples.full_hit_map()),
    })
}

/// Split an interleaved, pixel-major map vector into one vector per Stokes component.
///
/// The input layout is the solver's: the components of pixel `p` occupy
/// `p·k .. p·k + k` where `k = mode.components()`.
pub fn separate_map_vectors(
    solution: &DVector<f64>,
    mode: StokesMode,
) -> Result<Vec<DVector<f64>>, MapfitError> {
    let k = mode.components();
    if solution.len() % k != 0 {
        return Err(MapfitError::InputLengthMismatch(format!(
            "map vector of length {} is not a multiple of {k} components",
            solution.len()
        )));
    }
    let npix = solution.len() / k;
    let mut maps = Vec::with_capacity(k);
    for component in 0..k {
        maps.push(DVector::from_fn(npix, |pixel, _| {
            solution[pixel * k + component]
        }));
    }
    Ok(maps)
}
