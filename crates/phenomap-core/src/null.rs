//! Null distributions of average precision under random ranking.
//!
//! A null sample for shape `(n_pos, n_total)` places `n_pos` positives at
//! uniformly random distinct ranks among `n_total` and scores the result with
//! the same AP definition as the engine. One distribution is built per
//! distinct shape and shared by every record with that shape.
//!
//! Randomness comes from a [`RandomSource`], which hands out one generator per
//! shape. [`SeededSource`] derives each generator from a base seed and the
//! shape, so distributions do not depend on the order shapes are visited.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Cardinalities of a ranked candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NullShape {
    pub n_pos: usize,
    pub n_total: usize,
}

impl NullShape {
    pub fn new(n_pos: usize, n_total: usize) -> Self {
        Self { n_pos, n_total }
    }

    /// A shape needs at least one positive, one negative and two candidates.
    pub fn is_degenerate(&self) -> bool {
        self.n_total < 2 || self.n_pos == 0 || self.n_pos >= self.n_total
    }
}

/// Supplies a generator for each null shape.
pub trait RandomSource {
    type Rng: Rng;

    fn rng_for(&self, shape: NullShape) -> Self::Rng;
}

/// Deterministic per-shape generators derived from a base seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededSource {
    pub seed: u64,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl RandomSource for SeededSource {
    type Rng = StdRng;

    fn rng_for(&self, shape: NullShape) -> StdRng {
        let mut h = splitmix64(self.seed);
        h = splitmix64(h ^ shape.n_pos as u64);
        h = splitmix64(h ^ shape.n_total as u64);
        StdRng::seed_from_u64(h)
    }
}

/// SplitMix64 finalizer, used to decorrelate derived seeds.
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// AP of one random placement of `shape.n_pos` positives.
pub fn random_average_precision<R: Rng + ?Sized>(shape: NullShape, rng: &mut R) -> f64 {
    let mut ranks = rand::seq::index::sample(&mut *rng, shape.n_total, shape.n_pos).into_vec();
    ranks.sort_unstable();
    let sum: f64 = ranks
        .iter()
        .enumerate()
        .map(|(hit, &rank)| (hit + 1) as f64 / (rank + 1) as f64)
        .sum();
    sum / shape.n_pos as f64
}

/// `null_size` random AP samples for `shape`.
pub fn null_distribution<R: Rng + ?Sized>(
    shape: NullShape,
    null_size: usize,
    rng: &mut R,
) -> Vec<f64> {
    (0..null_size)
        .map(|_| random_average_precision(shape, &mut *rng))
        .collect()
}

/// Null distributions keyed by shape, built once per distinct shape.
#[derive(Debug, Clone, Default)]
pub struct NullCache {
    null_size: usize,
    dists: BTreeMap<NullShape, Vec<f64>>,
}

impl NullCache {
    /// Build distributions for every distinct non-degenerate shape.
    /// Degenerate shapes are logged and left out.
    pub fn build<S: RandomSource>(
        shapes: impl IntoIterator<Item = NullShape>,
        null_size: usize,
        source: &S,
    ) -> Self {
        let mut dists = BTreeMap::new();
        let distinct: std::collections::BTreeSet<NullShape> = shapes.into_iter().collect();
        for shape in distinct {
            if shape.is_degenerate() || null_size == 0 {
                log::warn!(
                    "skipping null for n_pos={} n_total={}: degenerate shape",
                    shape.n_pos,
                    shape.n_total
                );
                continue;
            }
            let mut rng = source.rng_for(shape);
            dists.insert(shape, null_distribution(shape, null_size, &mut rng));
        }
        log::debug!("built {} null distributions of size {null_size}", dists.len());
        Self { null_size, dists }
    }

    pub fn get(&self, shape: NullShape) -> Option<&[f64]> {
        self.dists.get(&shape).map(Vec::as_slice)
    }

    pub fn null_size(&self) -> usize {
        self.null_size
    }

    pub fn len(&self) -> usize {
        self.dists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dists.is_empty()
    }
}
