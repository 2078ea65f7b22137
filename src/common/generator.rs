//! Synthetic record generation for the demo CLI and benchmarks.
//!
//! Not part of the sort engine proper (`spec.md` §1 names the data
//! generator as an external collaborator); this is just a small xorshift
//! PRNG so the demo binary and benches don't need an extra dependency for
//! what amounts to "make some numbers".

/// A tiny, deterministic xorshift64* generator — good enough for generating
/// test workloads, not for anything security sensitive.
pub struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    pub fn new(seed: u64) -> Self {
        Xorshift64 { state: seed | 1 }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub fn next_u32_below(&mut self, bound: u32) -> u32 {
        (self.next_u64() % bound as u64) as u32
    }
}

/// Describes how a generated key stream should be shaped, matching the
/// scenarios in `spec.md` §8's end-to-end table.
#[derive(Debug, Clone, Copy)]
pub enum KeyDistribution {
    /// `0..count` in increasing order.
    Sorted,
    /// `0..count` in decreasing order.
    ReverseSorted,
    /// Uniform over `[0, cardinality)`.
    UniformLowCardinality { cardinality: u32 },
    /// Every key distinct, in a pseudo-random order.
    AllDistinctRandom,
    /// A run of sorted keys followed by a shuffled tail, repeated — models
    /// "mostly sorted, a little noise".
    MostlySorted { sorted_run: usize },
}

/// Generates `count` `u32` keys according to `dist`.
pub fn generate_keys(dist: KeyDistribution, count: usize, seed: u64) -> Vec<u32> {
    let mut rng = Xorshift64::new(seed);
    match dist {
        KeyDistribution::Sorted => (0..count as u32).collect(),
        KeyDistribution::ReverseSorted => (0..count as u32).rev().collect(),
        KeyDistribution::UniformLowCardinality { cardinality } => {
            (0..count).map(|_| rng.next_u32_below(cardinality.max(1))).collect()
        }
        KeyDistribution::AllDistinctRandom => {
            let mut keys: Vec<u32> = (0..count as u32).collect();
            for i in (1..keys.len()).rev() {
                let j = rng.next_u32_below(i as u32 + 1) as usize;
                keys.swap(i, j);
            }
            keys
        }
        KeyDistribution::MostlySorted { sorted_run } => {
            let mut keys: Vec<u32> = (0..count as u32).collect();
            let mut i = 0;
            while i < keys.len() {
                let end = (i + sorted_run.max(1)).min(keys.len());
                if end < keys.len() {
                    // Shuffle a small noisy tail after each sorted run.
                    let noise_end = (end + (sorted_run / 10).max(1)).min(keys.len());
                    for k in (end + 1..noise_end).rev() {
                        let j = end + rng.next_u32_below((k - end) as u32 + 1) as usize;
                        keys.swap(k, j);
                    }
                    i = noise_end;
                } else {
                    i = end;
                }
            }
            keys
        }
    }
}
