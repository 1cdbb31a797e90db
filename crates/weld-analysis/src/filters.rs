//! Pre-filter chain: cheap, ordered, short-circuiting pair rejection.
//!
//! Filters run cheapest first and the first rejection wins:
//! 1. size — statement counts differ by more than the configured ratio;
//! 2. structural — statement-kind multiset overlap below the floor;
//! 3. provenance — overlapping windows from the same declaration.
//!
//! A pair surviving the chain becomes a similarity-calculator candidate.

use tracing::trace;

use weld_core::config::FilterConfig;
use weld_core::region::CodeRegion;
use weld_core::types::collections::FxHashMap;

use crate::normalize::TokenStream;

/// Outcome of running the chain on one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Pass,
    Reject(&'static str),
}

impl FilterDecision {
    pub fn passed(self) -> bool {
        self == Self::Pass
    }
}

/// The ordered pre-filter chain.
#[derive(Debug, Clone)]
pub struct PreFilterChain {
    config: FilterConfig,
}

impl PreFilterChain {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Run the chain over one candidate pair.
    pub fn evaluate(
        &self,
        left: &CodeRegion,
        left_tokens: &TokenStream,
        right: &CodeRegion,
        right_tokens: &TokenStream,
    ) -> FilterDecision {
        let decision = self
            .size_filter(left_tokens, right_tokens)
            .and_then(|| self.structural_filter(left_tokens, right_tokens))
            .and_then(|| provenance_filter(left, right));
        if let FilterDecision::Reject(reason) = decision {
            trace!(
                left = %left.start_line,
                right = %right.start_line,
                reason,
                "pre-filter rejected pair"
            );
        }
        decision
    }

    /// O(1): reject when the larger statement count exceeds the smaller by
    /// more than the configured ratio.
    fn size_filter(&self, left: &TokenStream, right: &TokenStream) -> FilterDecision {
        let (small, large) = if left.len() <= right.len() {
            (left.len(), right.len())
        } else {
            (right.len(), left.len())
        };
        if small == 0 {
            return FilterDecision::Reject("empty region");
        }
        if large as f64 / small as f64 > self.config.max_size_ratio {
            FilterDecision::Reject("size ratio")
        } else {
            FilterDecision::Pass
        }
    }

    /// O(n): reject unless the statement-kind multiset overlap clears the floor.
    fn structural_filter(&self, left: &TokenStream, right: &TokenStream) -> FilterDecision {
        let overlap = multiset_jaccard(&left.kind_multiset(), &right.kind_multiset());
        if overlap < self.config.min_structural_overlap {
            FilterDecision::Reject("structural overlap")
        } else {
            FilterDecision::Pass
        }
    }
}

impl FilterDecision {
    fn and_then(self, next: impl FnOnce() -> FilterDecision) -> FilterDecision {
        match self {
            Self::Pass => next(),
            reject => reject,
        }
    }
}

/// Overlapping windows drawn from the same declaration are not duplicates.
fn provenance_filter(left: &CodeRegion, right: &CodeRegion) -> FilterDecision {
    if left.decl == right.decl && windows_overlap(left, right) {
        FilterDecision::Reject("self-overlap")
    } else {
        FilterDecision::Pass
    }
}

fn windows_overlap(left: &CodeRegion, right: &CodeRegion) -> bool {
    let left_end = left.offset + left.len();
    let right_end = right.offset + right.len();
    left.offset < right_end && right.offset < left_end
}

/// Jaccard overlap of two multisets: Σ min(count) / Σ max(count).
pub fn multiset_jaccard(
    left: &FxHashMap<&'static str, usize>,
    right: &FxHashMap<&'static str, usize>,
) -> f64 {
    if left.is_empty() && right.is_empty() {
        return 0.0;
    }
    let mut intersection = 0usize;
    let mut union = 0usize;
    for (key, &left_count) in left {
        let right_count = right.get(key).copied().unwrap_or(0);
        intersection += left_count.min(right_count);
        union += left_count.max(right_count);
    }
    for (key, &right_count) in right {
        if !left.contains_key(key) {
            union += right_count;
        }
    }
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weld_core::config::RegionConfig;
    use weld_core::region::extract_regions;
    use weld_core::syntax::builder::{assign, expr, call, ident, int, var, CorpusBuilder};
    use weld_core::syntax::{Corpus, DeclId};

    use crate::normalize;

    fn chain() -> PreFilterChain {
        PreFilterChain::new(FilterConfig::default())
    }

    fn full_region(corpus: &Corpus, decl: DeclId) -> CodeRegion {
        let config = RegionConfig {
            min_statements: 1,
            max_statements: 40,
        };
        extract_regions(corpus, decl, &config)
            .into_iter()
            .max_by_key(|r| r.len())
            .unwrap()
    }

    #[test]
    fn size_filter_rejects_lopsided_pairs() {
        let mut cb = CorpusBuilder::new();
        let small = cb
            .method("src/A.java", "A", "small")
            .body(vec![var("int", "a", int(1)), var("int", "b", int(2))]);
        let large = cb.method("src/A.java", "A", "large").body(vec![
            var("int", "a", int(1)),
            var("int", "b", int(2)),
            var("int", "c", int(3)),
            var("int", "d", int(4)),
        ]);
        let corpus = cb.finish();
        let (small, large) = (full_region(&corpus, small), full_region(&corpus, large));
        let (st, lt) = (
            normalize::strict(&corpus, &small),
            normalize::strict(&corpus, &large),
        );
        assert_eq!(
            chain().evaluate(&small, &st, &large, &lt),
            FilterDecision::Reject("size ratio")
        );
    }

    #[test]
    fn structural_filter_rejects_different_shapes() {
        let mut cb = CorpusBuilder::new();
        let decls = cb.method("src/A.java", "A", "decls").body(vec![
            var("int", "a", int(1)),
            var("int", "b", int(2)),
            var("int", "c", int(3)),
        ]);
        let calls = cb.method("src/A.java", "A", "calls").body(vec![
            expr(call("log", vec![ident("a")])),
            expr(call("log", vec![ident("b")])),
            expr(call("log", vec![ident("c")])),
        ]);
        let corpus = cb.finish();
        let (left, right) = (full_region(&corpus, decls), full_region(&corpus, calls));
        let (lt, rt) = (
            normalize::strict(&corpus, &left),
            normalize::strict(&corpus, &right),
        );
        assert_eq!(
            chain().evaluate(&left, &lt, &right, &rt),
            FilterDecision::Reject("structural overlap")
        );
    }

    #[test]
    fn provenance_filter_rejects_overlapping_self_windows() {
        let mut cb = CorpusBuilder::new();
        let decl = cb.method("src/A.java", "A", "m").body(vec![
            assign("a", int(1)),
            assign("b", int(2)),
            assign("c", int(3)),
            assign("d", int(4)),
        ]);
        let corpus = cb.finish();
        let config = RegionConfig {
            min_statements: 3,
            max_statements: 3,
        };
        let regions = extract_regions(&corpus, decl, &config);
        // Windows [0..3] and [1..4] overlap.
        let (left, right) = (&regions[0], &regions[1]);
        let (lt, rt) = (
            normalize::strict(&corpus, left),
            normalize::strict(&corpus, right),
        );
        assert_eq!(
            chain().evaluate(left, &lt, right, &rt),
            FilterDecision::Reject("self-overlap")
        );
    }

    #[test]
    fn disjoint_windows_in_same_declaration_pass() {
        let mut cb = CorpusBuilder::new();
        let decl = cb.method("src/A.java", "A", "m").body(vec![
            assign("a", int(1)),
            assign("b", int(2)),
            assign("c", int(3)),
            assign("d", int(4)),
            assign("e", int(5)),
            assign("f", int(6)),
        ]);
        let corpus = cb.finish();
        let config = RegionConfig {
            min_statements: 3,
            max_statements: 3,
        };
        let regions = extract_regions(&corpus, decl, &config);
        let left = regions.iter().find(|r| r.offset == 0).unwrap();
        let right = regions.iter().find(|r| r.offset == 3).unwrap();
        let (lt, rt) = (
            normalize::strict(&corpus, left),
            normalize::strict(&corpus, right),
        );
        assert!(chain().evaluate(left, &lt, right, &rt).passed());
    }

    #[test]
    fn multiset_jaccard_identical_is_one() {
        let mut counts = FxHashMap::default();
        counts.insert("assign", 3usize);
        counts.insert("var_decl", 1usize);
        assert!((multiset_jaccard(&counts, &counts) - 1.0).abs() < f64::EPSILON);
    }
}
