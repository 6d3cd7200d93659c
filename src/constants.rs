//! # Constants and type definitions for mapfit
//!
//! This module centralizes the **numerical guards**, **solver defaults**, and **common type
//! definitions** used throughout the `mapfit` library.
//!
//! ## Overview
//!
//! - Numerical thresholds guarding ill-conditioned noise spectra and pixel blocks
//! - Default solver tolerances and iteration budgets
//! - Core type aliases used across the crate
//!
//! These definitions are used by all main modules, including the scan container, the noise
//! operators, and the GLS solver.

// -------------------------------------------------------------------------------------------------
// Numerical guards
// -------------------------------------------------------------------------------------------------

/// Relative threshold below which a noise spectral eigenvalue is treated as singular.
///
/// A circulant (or circulant-embedded Toeplitz) covariance whose spectrum contains a value
/// smaller than `SPECTRUM_TOL` times the spectral maximum cannot be inverted reliably; the
/// inverse operator constructors reject it instead of dividing.
pub const SPECTRUM_TOL: f64 = 1e-12;

/// Relative tolerance on the imaginary part of a covariance spectrum.
///
/// The generating row of a valid (symmetric) circulant covariance has a real spectrum up to
/// floating-point noise; an imaginary component above this fraction of the spectral maximum
/// indicates an asymmetric row.
pub const SPECTRUM_IMAG_TOL: f64 = 1e-8;

/// Default determinant threshold below which a pixel's accumulated polarization block is
/// considered degenerate (e.g. a pixel observed under a single polarization angle).
///
/// Pixels failing this test are excluded from the solved map under
/// [`DegeneracyPolicy::Exclude`](crate::scan::DegeneracyPolicy).
pub const DEGENERACY_THRESHOLD: f64 = 1e-5;

// -------------------------------------------------------------------------------------------------
// Solver defaults
// -------------------------------------------------------------------------------------------------

/// Default relative tolerance on the residual norm for the PCG solver.
pub const DEFAULT_REL_TOLERANCE: f64 = 1e-10;

/// Default absolute tolerance on the residual norm for the PCG solver.
pub const DEFAULT_ABS_TOLERANCE: f64 = 0.0;

/// Default iteration budget for the PCG solver.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in radians
pub type Radian = f64;

/// Sentinel pointing index assigned to flagged (invalid) samples after pixel compression.
pub(crate) const INVALID_PIXEL: usize = usize::MAX;
