mod common;

use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use common::{random_scan, shard};
use mapfit::communicator::{Communicator, SelfComm, ThreadComm};
use mapfit::operators::LinearOp;
use mapfit::scan::pointing::PointingOp;
use mapfit::scan::{ScanSamples, StokesMode};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn self_comm() -> Arc<dyn Communicator> {
    Arc::new(SelfComm)
}

/// Adjoint test: for random map `m` and data `d`, `⟨P·m, d⟩ == ⟨m, Pᵀ·d⟩`.
#[test]
fn pointing_is_adjoint_of_binning() {
    for (mode, seed) in [
        (StokesMode::I, 41_u64),
        (StokesMode::Qu, 42),
        (StokesMode::Iqu, 43),
    ] {
        let scan = random_scan(32, 256, 8, seed);
        let samples = ScanSamples::process(
            32,
            &scan.pointings,
            Some(&scan.flags),
            Some(&scan.angles),
            Some(&scan.weights),
            mode,
            self_comm(),
        )
        .unwrap();
        let pointing = PointingOp::new(&samples);

        let mut rng = StdRng::seed_from_u64(seed ^ 0xabcd);
        let m = DVector::from_fn(pointing.ncols(), |_, _| rng.gen_range(-1.0..1.0));
        let d = DVector::from_fn(pointing.nrows(), |_, _| rng.gen_range(-1.0..1.0));

        let forward = pointing.apply(&m).unwrap();
        let binned = pointing.apply_transpose(&d).unwrap();
        assert_abs_diff_eq!(forward.dot(&d), m.dot(&binned), epsilon = 1e-10);
    }
}

#[test]
fn flagged_samples_contribute_nothing() {
    let pointings = [0usize, 1, 1, 0];
    let flags = [true, true, false, true];
    let samples = ScanSamples::process(
        2,
        &pointings,
        Some(&flags),
        None,
        None,
        StokesMode::I,
        self_comm(),
    )
    .unwrap();
    let pointing = PointingOp::new(&samples);

    // Forward: the flagged sample reads zero.
    let m = DVector::from_vec(vec![5.0, 7.0]);
    let tod = pointing.apply(&m).unwrap();
    assert_eq!(tod, DVector::from_vec(vec![5.0, 7.0, 0.0, 5.0]));

    // Transpose: the flagged sample deposits nothing.
    let d = DVector::from_vec(vec![1.0, 1.0, 100.0, 1.0]);
    let binned = pointing.apply_transpose(&d).unwrap();
    assert_eq!(binned, DVector::from_vec(vec![2.0, 1.0]));
}

/// A pixel observed by no valid sample anywhere is excluded from the map space: the
/// operator shapes shrink and no NaN/Inf can reach the solved map.
#[test]
fn unobserved_pixels_are_masked_out() {
    let pointings = [0usize, 2, 2, 0];
    let samples =
        ScanSamples::process(4, &pointings, None, None, None, StokesMode::I, self_comm()).unwrap();

    assert_eq!(samples.observed_npix(), 2);
    assert_eq!(samples.observed(), &[true, false, true, false]);

    let pointing = PointingOp::new(&samples);
    assert_eq!(pointing.ncols(), 2);

    let binned = pointing
        .apply_transpose(&DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]))
        .unwrap();
    assert!(binned.iter().all(|value| value.is_finite()));

    // Expansion writes the requested fill into the masked pixels, nothing else.
    let full = samples.expand_map(&binned, 0.0).unwrap();
    assert_eq!(full[1], 0.0);
    assert_eq!(full[3], 0.0);
}

/// The binning reduction makes the transpose result identical on every process, and
/// equal to the serial result for the same global stream.
#[test]
fn binning_is_partition_independent_across_two_shards() {
    let scan = random_scan(16, 64, 0, 44);
    let npix = 16;

    // Serial reference.
    let serial = ScanSamples::process(
        npix,
        &scan.pointings,
        None,
        None,
        None,
        StokesMode::I,
        self_comm(),
    )
    .unwrap();
    let d_global: Vec<f64> = (0..64).map(|i| (i as f64 * 0.31).sin()).collect();
    let serial_binned = PointingOp::new(&serial)
        .apply_transpose(&DVector::from_vec(d_global.clone()))
        .unwrap();
    let serial_hits = serial.full_hit_map();

    // Two shards over a thread group.
    let comms = ThreadComm::group(2);
    let handles: Vec<_> = comms
        .into_iter()
        .map(|comm| {
            let rank = comm.rank();
            let pointings = shard(&scan.pointings, 2, rank);
            let d_local = shard(&d_global, 2, rank);
            thread::spawn(move || {
                let samples = ScanSamples::process(
                    npix,
                    &pointings,
                    None,
                    None,
                    None,
                    StokesMode::I,
                    Arc::new(comm),
                )
                .unwrap();
                let binned = PointingOp::new(&samples)
                    .apply_transpose(&DVector::from_vec(d_local))
                    .unwrap();
                (binned, samples.full_hit_map())
            })
        })
        .collect();

    for handle in handles {
        let (binned, hits) = handle.join().unwrap();
        assert_eq!(hits, serial_hits);
        assert_abs_diff_eq!((binned - &serial_binned).norm(), 0.0, epsilon = 1e-12);
    }
}
