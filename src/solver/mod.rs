//! # GLS solver parameters and the distributed PCG engine
//!
//! This module defines the [`GlsParams`] configuration struct and its builder, which
//! control the preconditioned conjugate-gradient solve at the heart of the GLS map
//! estimate, together with the solver itself ([`pcg`]) and its outcome types.
//!
//! ## Solver contract
//!
//! [`pcg`] solves `A·x = b` for a symmetric positive-definite operator `A` supplied as
//! a matrix-free [`LinearOp`] — in map-making, the normal-equations operator
//! `Pᵀ N⁻¹ P`, never formed explicitly. Every process of the communicator group runs
//! the identical control flow on replicated map-domain vectors; the one collective step
//! per iteration is the reduction inside `A·p` (the pointing transpose), so all
//! processes compute bit-identical scalars and reach the convergence branch in the same
//! iteration by construction.
//!
//! ## Termination
//!
//! The iteration is a small state machine, `INIT → ITERATE → terminal`, with three
//! terminal states captured by [`PcgStopReason`]:
//!
//! * `Converged` – the residual norm fell below `max(rel_tolerance · ‖b‖, abs_tolerance)`;
//! * `MaxIterReached` – the iteration budget ran out with the residual still above the
//!   threshold; the partial estimate is returned with `converged = false`;
//! * `Breakdown` – the curvature denominator `p·A·p` was numerically zero or negative,
//!   which for an SPD operator signals loss of positive-definiteness (e.g. a
//!   mis-specified noise model). The solver flags it and stops — it never divides
//!   silently.
//!
//! Breakdown and non-convergence are **reported, not raised**: callers inspect the
//! outcome record. Only structural misuse (shape mismatches, invalid parameters) is an
//! error.
//!
//! ## Example
//!
//! ```rust
//! use mapfit::solver::GlsParams;
//!
//! let params = GlsParams::builder()
//!     .rel_tolerance(1e-8)
//!     .max_iterations(200)
//!     .build()
//!     .unwrap();
//! assert_eq!(params.max_iterations, 200);
//! ```

use std::cmp::Ordering::{Equal, Greater};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ABS_TOLERANCE, DEFAULT_MAX_ITERATIONS, DEFAULT_REL_TOLERANCE};
use crate::mapfit_errors::MapfitError;
use crate::operators::LinearOp;

/// Configuration of a GLS solve.
///
/// Fields
/// -----------------
/// * `rel_tolerance` – convergence threshold relative to the right-hand-side norm.
/// * `abs_tolerance` – absolute convergence threshold; the effective threshold is
///   `max(rel_tolerance · ‖b‖, abs_tolerance)`.
/// * `max_iterations` – iteration budget; exhausting it yields
///   [`PcgStopReason::MaxIterReached`], not an error.
/// * `use_preconditioner` – whether to build and apply the block-diagonal
///   preconditioner (on by default; turning it off is mainly useful for diagnostics).
/// * `return_hit_map` – whether the GLS result carries the full-sky hit map.
///
/// Defaults
/// -----------------
/// `rel_tolerance = 1e-10`, `abs_tolerance = 0`, `max_iterations = 100`,
/// `use_preconditioner = true`, `return_hit_map = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlsParams {
    pub rel_tolerance: f64,
    pub abs_tolerance: f64,
    pub max_iterations: usize,
    pub use_preconditioner: bool,
    pub return_hit_map: bool,
}

impl Default for GlsParams {
    fn default() -> Self {
        GlsParams {
            rel_tolerance: DEFAULT_REL_TOLERANCE,
            abs_tolerance: DEFAULT_ABS_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            use_preconditioner: true,
            return_hit_map: false,
        }
    }
}

impl GlsParams {
    /// Construct a new [`GlsParams`] with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fluent [`GlsParamsBuilder`]; call `build()` to validate.
    pub fn builder() -> GlsParamsBuilder {
        GlsParamsBuilder::new()
    }
}

/// Builder for [`GlsParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct GlsParamsBuilder {
    params: GlsParams,
}

impl GlsParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: GlsParams::default(),
        }
    }

    pub fn rel_tolerance(mut self, v: f64) -> Self {
        self.params.rel_tolerance = v;
        self
    }

    pub fn abs_tolerance(mut self, v: f64) -> Self {
        self.params.abs_tolerance = v;
        self
    }

    pub fn max_iterations(mut self, v: usize) -> Self {
        self.params.max_iterations = v;
        self
    }

    pub fn use_preconditioner(mut self, v: bool) -> Self {
        self.params.use_preconditioner = v;
        self
    }

    pub fn return_hit_map(mut self, v: bool) -> Self {
        self.params.return_hit_map = v;
        self
    }

    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    /// Finalize the builder, validating the configuration.
    ///
    /// Validation rules
    /// -----------------
    /// * `rel_tolerance >= 0`, `abs_tolerance >= 0`, both finite and not NaN;
    /// * at least one of the two tolerances strictly positive (otherwise the solve
    ///   could never terminate by convergence);
    /// * `max_iterations >= 1`.
    pub fn build(self) -> Result<GlsParams, MapfitError> {
        let p = &self.params;

        if !Self::ge0(p.rel_tolerance) || !p.rel_tolerance.is_finite() {
            return Err(MapfitError::InvalidGlsParameter(
                "rel_tolerance must be finite and non-negative".into(),
            ));
        }
        if !Self::ge0(p.abs_tolerance) || !p.abs_tolerance.is_finite() {
            return Err(MapfitError::InvalidGlsParameter(
                "abs_tolerance must be finite and non-negative".into(),
            ));
        }
        if p.rel_tolerance == 0.0 && p.abs_tolerance == 0.0 {
            return Err(MapfitError::InvalidGlsParameter(
                "at least one of rel_tolerance and abs_tolerance must be positive".into(),
            ));
        }
        if p.max_iterations == 0 {
            return Err(MapfitError::InvalidGlsParameter(
                "max_iterations must be >= 1".into(),
            ));
        }

        Ok(self.params)
    }
}

/// Terminal state of a PCG solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PcgStopReason {
    /// Residual norm fell below the configured threshold.
    Converged,
    /// Iteration budget exhausted with the residual still above the threshold.
    MaxIterReached,
    /// Curvature denominator `p·A·p` numerically zero or negative.
    Breakdown,
}

/// Outcome of a PCG solve: the (possibly partial) solution plus diagnostics.
#[derive(Debug, Clone)]
pub struct PcgOutcome {
    /// Best estimate at termination, whatever the stop reason.
    pub solution: DVector<f64>,
    pub stop_reason: PcgStopReason,
    /// Number of completed iterations.
    pub iterations: usize,
    /// Final residual norm.
    pub residual_norm: f64,
    /// Residual norm after each iteration, starting with the initial residual.
    pub residual_history: Vec<f64>,
}

impl PcgOutcome {
    pub fn converged(&self) -> bool {
        self.stop_reason == PcgStopReason::Converged
    }
}

/// Preconditioned conjugate gradient for a symmetric positive-definite operator.
///
/// Arguments
/// ---------
/// * `a`: the system operator (square, symmetric positive-definite).
/// * `precond`: optional approximate inverse of `a` (square, same shape); `None` runs
///   plain CG.
/// * `rhs`: the right-hand side.
/// * `x0`: optional initial guess; defaults to zero.
/// * `params`: tolerances and iteration budget.
///
/// Return
/// ------
/// * The [`PcgOutcome`] — including for non-converged and broken-down solves — or a
///   shape/configuration error detected before iterating.
///
/// β follows the Fletcher–Reeves-style ratio of successive preconditioned residual
/// inner products `(r·z)ₖ₊₁ / (r·z)ₖ`.
pub fn pcg<A: LinearOp, M: LinearOp>(
    a: &A,
    precond: Option<&M>,
    rhs: &DVector<f64>,
    x0: Option<&DVector<f64>>,
    params: &GlsParams,
) -> Result<PcgOutcome, MapfitError> {
    let n = a.ncols();
    if a.nrows() != n {
        return Err(MapfitError::IncompatibleShapes {
            operation: "solve with non-square",
            left_rows: a.nrows(),
            left_cols: a.ncols(),
            right_rows: n,
            right_cols: 1,
        });
    }
    if rhs.len() != n {
        return Err(MapfitError::ShapeMismatch {
            nrows: a.nrows(),
            ncols: a.ncols(),
            len: rhs.len(),
        });
    }
    if let Some(m) = precond {
        if m.shape() != (n, n) {
            return Err(MapfitError::IncompatibleShapes {
                operation: "precondition",
                left_rows: a.nrows(),
                left_cols: a.ncols(),
                right_rows: m.nrows(),
                right_cols: m.ncols(),
            });
        }
    }
    if let Some(x0) = x0 {
        if x0.len() != n {
            return Err(MapfitError::ShapeMismatch {
                nrows: a.nrows(),
                ncols: a.ncols(),
                len: x0.len(),
            });
        }
    }

    let threshold = f64::max(params.rel_tolerance * rhs.norm(), params.abs_tolerance);
    log::debug!(
        "pcg: n={n}, threshold={threshold:.3e}, max_iterations={}",
        params.max_iterations
    );

    #[cfg(feature = "progress")]
    let bar = {
        let bar = indicatif::ProgressBar::new(params.max_iterations as u64);
        bar.set_style(
            indicatif::ProgressStyle::with_template(
                "{prefix} [{bar:40}] {pos}/{len} residual {msg}",
            )
            .unwrap()
            .progress_chars("=> "),
        );
        bar.set_prefix("pcg");
        bar
    };

    // INIT: r0 = b - A·x0, z0 = M·r0, p0 = z0.
    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => DVector::zeros(n),
    };
    let mut r = rhs - a.apply(&x)?;
    let mut residual_norm = r.norm();
    let mut history = vec![residual_norm];

    let apply_precond = |r: &DVector<f64>| -> Result<DVector<f64>, MapfitError> {
        match precond {
            Some(m) => m.apply(r),
            None => Ok(r.clone()),
        }
    };

    let mut z = apply_precond(&r)?;
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut iterations = 0;

    let stop_reason = loop {
        if residual_norm <= threshold {
            break PcgStopReason::Converged;
        }
        if iterations >= params.max_iterations {
            break PcgStopReason::MaxIterReached;
        }

        // ITERATE: the apply below carries the one collective reduction per iteration.
        let ap = a.apply(&p)?;
        let curvature = p.dot(&ap);
        if !curvature.is_finite() || curvature <= 0.0 {
            log::warn!("pcg breakdown at iteration {iterations}: p·Ap = {curvature:.3e}");
            break PcgStopReason::Breakdown;
        }

        let alpha = rz / curvature;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        residual_norm = r.norm();
        history.push(residual_norm);
        iterations += 1;

        #[cfg(feature = "progress")]
        {
            bar.set_position(iterations as u64);
            bar.set_message(format!("{residual_norm:.3e}"));
        }

        z = apply_precond(&r)?;
        let rz_next = r.dot(&z);
        if rz == 0.0 {
            break PcgStopReason::Breakdown;
        }
        let beta = rz_next / rz;
        rz = rz_next;

        // p <- z + beta * p
        p.axpy(1.0, &z, beta);
    };

    #[cfg(feature = "progress")]
    bar.finish_and_clear();

    log::debug!(
        "pcg finished: {stop_reason:?} after {iterations} iteration(s), residual {residual_norm:.3e}"
    );

    Ok(PcgOutcome {
        solution: x,
        stop_reason,
        iterations,
        residual_norm,
        residual_history: history,
    })
}
