use std::f64::consts::PI;

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Contiguous block partition of `data` into `nshards` shards, the same layout the
/// distributed runtime would use: shard sizes differ by at most one sample and
/// concatenating the shards in rank order restores the original stream.
pub fn shard<T: Clone>(data: &[T], nshards: usize, rank: usize) -> Vec<T> {
    let div = data.len() / nshards;
    let rem = data.len() % nshards;
    let len = div + usize::from(rank < rem);
    let start = rank * div + rank.min(rem);
    data[start..start + len].to_vec()
}

/// A random polarized scan: pointings, polarization angles in `[-π/2, π/2]`, and
/// positive noise weights, plus a handful of flagged-invalid samples.
pub struct RandomScan {
    pub pointings: Vec<usize>,
    pub flags: Vec<bool>,
    pub angles: Vec<f64>,
    pub weights: Vec<f64>,
}

pub fn random_scan(npix: usize, nsamples: usize, nbad: usize, seed: u64) -> RandomScan {
    let mut rng = StdRng::seed_from_u64(seed);
    let pointings: Vec<usize> = (0..nsamples).map(|_| rng.gen_range(0..npix)).collect();
    let angles: Vec<f64> = (0..nsamples)
        .map(|_| rng.gen_range(-PI / 2.0..PI / 2.0))
        .collect();
    let weights: Vec<f64> = (0..nsamples).map(|_| rng.gen_range(0.2..2.0)).collect();
    let mut flags = vec![true; nsamples];
    for _ in 0..nbad {
        let bad = rng.gen_range(0..nsamples);
        flags[bad] = false;
    }
    RandomScan {
        pointings,
        flags,
        angles,
        weights,
    }
}

/// An intensity-only ground-truth problem: integer-valued true map, a scan built from
/// `passes` full sweeps over the pixels plus `extra_hits` repeated pixels, and the
/// noiseless time-ordered data `d = P·m_true`.
pub struct IntensityProblem {
    pub npix: usize,
    pub m_true: DVector<f64>,
    pub pointings: Vec<usize>,
    pub tod: Vec<f64>,
}

pub fn intensity_problem(npix: usize, passes: usize, extra_hits: usize) -> IntensityProblem {
    let m_true = DVector::from_fn(npix, |pixel, _| (pixel + 1) as f64);
    let mut pointings = Vec::with_capacity(npix * passes + extra_hits);
    for _ in 0..passes {
        pointings.extend(0..npix);
    }
    // Extra hits on the first pixels, so hit counts are not all equal.
    pointings.extend(0..extra_hits.min(npix));
    let tod = pointings.iter().map(|&pixel| m_true[pixel]).collect();
    IntensityProblem {
        npix,
        m_true,
        pointings,
        tod,
    }
}
