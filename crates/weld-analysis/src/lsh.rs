//! MinHash/LSH candidate index for sub-quadratic pair generation.
//!
//! Each region's fuzzy token set is hashed with k independent xxh3-seeded
//! hash functions into a MinHash signature, the signature is partitioned
//! into b bands of r rows, and the region is indexed under one bucket key
//! per band. Two regions collide with probability `1 - (1 - s^r)^b` for
//! true Jaccard similarity s, so (b, r) tune recall against candidate-set
//! size. `add` and `query` are O(b) amortized, independent of corpus size.

use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use weld_core::types::collections::{FxHashMap, FxHashSet};

/// Banded MinHash index over region ids.
#[derive(Debug)]
pub struct MinHashIndex {
    num_hashes: usize,
    rows_per_band: usize,
    /// (band, bucket hash) → region ids.
    buckets: FxHashMap<(u32, u64), Vec<usize>>,
    /// Signatures kept for similarity estimation.
    signatures: FxHashMap<usize, Vec<u64>>,
}

impl MinHashIndex {
    /// `num_bands` must divide `num_hashes`; validated by config.
    pub fn new(num_hashes: usize, num_bands: usize) -> Self {
        debug_assert!(num_bands > 0 && num_hashes % num_bands == 0);
        Self {
            num_hashes,
            rows_per_band: num_hashes / num_bands,
            buckets: FxHashMap::default(),
            signatures: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// MinHash signature of a token set.
    pub fn signature(&self, tokens: &FxHashSet<String>) -> Vec<u64> {
        let mut signature = vec![u64::MAX; self.num_hashes];
        for token in tokens {
            for (seed, slot) in signature.iter_mut().enumerate() {
                let hash = xxh3_64_with_seed(token.as_bytes(), seed as u64);
                if hash < *slot {
                    *slot = hash;
                }
            }
        }
        signature
    }

    /// Index `id` under one bucket per band.
    pub fn add(&mut self, id: usize, tokens: &FxHashSet<String>) {
        let signature = self.signature(tokens);
        for (band, key) in self.band_keys(&signature) {
            self.buckets.entry((band, key)).or_default().push(id);
        }
        self.signatures.insert(id, signature);
    }

    /// All indexed regions sharing at least one band bucket with `tokens`,
    /// sorted and deduplicated.
    pub fn query(&self, tokens: &FxHashSet<String>) -> Vec<usize> {
        let signature = self.signature(tokens);
        let mut out: Vec<usize> = Vec::new();
        for (band, key) in self.band_keys(&signature) {
            if let Some(ids) = self.buckets.get(&(band, key)) {
                out.extend_from_slice(ids);
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Every distinct pair sharing at least one bucket, ordered.
    pub fn candidate_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = FxHashSet::default();
        for ids in self.buckets.values() {
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    let (a, b) = if ids[i] < ids[j] {
                        (ids[i], ids[j])
                    } else {
                        (ids[j], ids[i])
                    };
                    if a != b {
                        pairs.insert((a, b));
                    }
                }
            }
        }
        let mut pairs: Vec<(usize, usize)> = pairs.into_iter().collect();
        pairs.sort_unstable();
        pairs
    }

    /// Estimated Jaccard similarity from signature agreement.
    pub fn estimate_similarity(&self, left: usize, right: usize) -> Option<f64> {
        let a = self.signatures.get(&left)?;
        let b = self.signatures.get(&right)?;
        let equal = a.iter().zip(b).filter(|(x, y)| x == y).count();
        Some(equal as f64 / self.num_hashes as f64)
    }

    fn band_keys(&self, signature: &[u64]) -> SmallVec<[(u32, u64); 32]> {
        signature
            .chunks(self.rows_per_band)
            .enumerate()
            .map(|(band, rows)| {
                let mut bytes = Vec::with_capacity(rows.len() * 8);
                for row in rows {
                    bytes.extend_from_slice(&row.to_le_bytes());
                }
                (band as u32, xxh3_64_with_seed(&bytes, 0x5eed))
            })
            .collect()
    }
}
