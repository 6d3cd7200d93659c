//! # mapfit
//!
//! A distributed GLS map-making core for CMB experiments: matrix-free linear operators
//! (pointing, noise covariance, block-diagonal preconditioner) composed and solved with
//! a preconditioned conjugate-gradient method over process-partitioned time-ordered
//! data. See [`gls::compute_gls_maps`] for the main entry point.

pub mod communicator;
pub mod constants;
pub mod gls;
pub mod mapfit_errors;
pub mod noise;
pub mod operators;
pub mod scan;
pub mod solver;

pub use communicator::{Communicator, SelfComm, ThreadComm};
pub use gls::{compute_gls_maps, separate_map_vectors, GlsResult, NormalEquationsOp};
pub use mapfit_errors::MapfitError;
pub use noise::{CirculantNoiseOp, DiagonalNoiseOp, NoiseModel, ToeplitzNoiseOp};
pub use scan::{DegeneracyPolicy, ScanSamples, StokesMode};
pub use solver::{pcg, GlsParams, PcgOutcome, PcgStopReason};
