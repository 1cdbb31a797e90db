//! The `analyze` pipeline: extract → normalize → candidates → filter →
//! score → cluster → metrics.
//!
//! Single-threaded and cooperative: every phase runs to completion over
//! its whole input before the next phase starts. The candidate index is
//! the one component that may be queried interleaved with insertion.

use tracing::{debug, info};

use weld_core::config::WeldConfig;
use weld_core::region::{extract_all, CodeRegion};
use weld_core::syntax::Corpus;
use weld_core::types::collections::FxHashSet;

use crate::cluster::build_clusters;
use crate::filters::PreFilterChain;
use crate::lsh::MinHashIndex;
use crate::metrics::per_file_metrics;
use crate::normalize::{self, TokenStream};
use crate::similarity::SimilarityCalculator;
use crate::types::{DuplicationReport, PairMatch};

/// The similarity and clustering pipeline.
pub struct AnalysisPipeline {
    config: WeldConfig,
    filters: PreFilterChain,
    calculator: SimilarityCalculator,
}

/// Run the full pipeline over a corpus.
pub fn analyze(corpus: &Corpus, config: &WeldConfig) -> DuplicationReport {
    AnalysisPipeline::new(config.clone()).run(corpus)
}

impl AnalysisPipeline {
    pub fn new(config: WeldConfig) -> Self {
        let filters = PreFilterChain::new(config.filter.clone());
        let calculator = SimilarityCalculator::new(config.similarity.clone());
        Self {
            config,
            filters,
            calculator,
        }
    }

    pub fn run(&self, corpus: &Corpus) -> DuplicationReport {
        // Phase 1: Region extraction (sliding windows per declaration).
        let regions = extract_all(corpus, &self.config.region);
        debug!(regions = regions.len(), "extracted regions");

        // Phase 2: Normalization. Strict feeds scoring; fuzzy only buckets.
        let strict: Vec<TokenStream> = regions
            .iter()
            .map(|r| normalize::strict(corpus, r))
            .collect();

        // Phase 3: Candidate generation, all-pairs or LSH past the
        // corpus-size threshold.
        let candidates = self.candidate_pairs(corpus, &regions);
        debug!(candidates = candidates.len(), "candidate pairs");

        // Phase 4: Pre-filter chain, then the expensive calculator.
        let mut matches: Vec<PairMatch> = Vec::new();
        for (left, right) in candidates {
            let decision = self.filters.evaluate(
                &regions[left],
                &strict[left],
                &regions[right],
                &strict[right],
            );
            if !decision.passed() {
                continue;
            }
            let result = self.calculator.score(&strict[left], &strict[right]);
            if self.calculator.is_duplicate(&result) {
                matches.push(PairMatch {
                    left,
                    right,
                    result,
                });
            }
        }

        // Phase 5: Keep only maximal matches; a window pair wholly inside a
        // larger qualifying pair is the same duplicate seen smaller.
        let matches = suppress_dominated(&regions, matches);

        // Phase 6: Connected-component clustering.
        let clusters = build_clusters(&regions, matches);

        // Phase 7: Per-file rollups.
        let per_file = per_file_metrics(&regions, &clusters);

        info!(
            regions = regions.len(),
            clusters = clusters.len(),
            "analysis complete"
        );
        DuplicationReport {
            regions,
            clusters,
            per_file_metrics: per_file,
        }
    }

    fn candidate_pairs(&self, corpus: &Corpus, regions: &[CodeRegion]) -> Vec<(usize, usize)> {
        if self.config.lsh.effective_enabled(regions.len()) {
            let mut index =
                MinHashIndex::new(self.config.lsh.num_hashes, self.config.lsh.num_bands);
            for (idx, region) in regions.iter().enumerate() {
                let fuzzy = normalize::fuzzy(corpus, region);
                index.add(idx, &fuzzy.canonical_set());
            }
            index.candidate_pairs()
        } else {
            let mut pairs = Vec::with_capacity(regions.len() * regions.len() / 2);
            for i in 0..regions.len() {
                for j in (i + 1)..regions.len() {
                    pairs.push((i, j));
                }
            }
            pairs
        }
    }
}

/// Keep only the best view of each duplicate. A match is dropped when
/// another match over nested windows (straight or crossed) either scores
/// strictly higher, or ties the score across strictly more statements.
/// Score is compared before size: a lopsided pairing of a window with a
/// sub-window of its true partner never displaces the exact match.
fn suppress_dominated(regions: &[CodeRegion], matches: Vec<PairMatch>) -> Vec<PairMatch> {
    let span = |m: &PairMatch| regions[m.left].len() + regions[m.right].len();
    let nested = |a: usize, b: usize| {
        contains(&regions[a], &regions[b]) || contains(&regions[b], &regions[a])
    };
    let mut keep: Vec<bool> = vec![true; matches.len()];
    for (i, m) in matches.iter().enumerate() {
        for (j, other) in matches.iter().enumerate() {
            if i == j {
                continue;
            }
            let straight = nested(other.left, m.left) && nested(other.right, m.right);
            let crossed = nested(other.left, m.right) && nested(other.right, m.left);
            if !(straight || crossed) {
                continue;
            }
            let dominates = other.result.combined > m.result.combined
                || (other.result.combined == m.result.combined && span(other) > span(m));
            if dominates {
                keep[i] = false;
                break;
            }
        }
    }
    let survivors: FxHashSet<usize> = keep
        .iter()
        .enumerate()
        .filter(|(_, &k)| k)
        .map(|(i, _)| i)
        .collect();
    matches
        .into_iter()
        .enumerate()
        .filter(|(i, _)| survivors.contains(i))
        .map(|(_, m)| m)
        .collect()
}

fn contains(outer: &CodeRegion, inner: &CodeRegion) -> bool {
    outer.decl == inner.decl
        && outer.offset <= inner.offset
        && outer.offset + outer.len() >= inner.offset + inner.len()
}
