//! Multi-algorithm weighted similarity scoring over strict token streams.
//!
//! `score = w1·LCS + w2·(1 − normalizedEdit) + w3·structuralJaccard`.
//! Weights are caller-supplied and need not re-sum to 1. The edit
//! alignment doubles as the variation trace: every aligned position where
//! the regions differ is recorded with both original values, feeding
//! parameter inference downstream.

use weld_core::config::SimilarityConfig;

use crate::filters::multiset_jaccard;
use crate::normalize::TokenStream;
use crate::types::{SimilarityResult, Variation, VariationAnalysis};

/// The weighted similarity calculator.
#[derive(Debug, Clone)]
pub struct SimilarityCalculator {
    config: SimilarityConfig,
}

impl SimilarityCalculator {
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(SimilarityConfig::default())
    }

    /// Score a pair of strict token streams.
    pub fn score(&self, left: &TokenStream, right: &TokenStream) -> SimilarityResult {
        let subsequence = lcs_ratio(left, right);
        let (edit_distance, variations) = edit_alignment(left, right);
        let structural = multiset_jaccard(&left.kind_multiset(), &right.kind_multiset());

        let combined = self.config.weight_subsequence * subsequence
            + self.config.weight_edit * (1.0 - edit_distance)
            + self.config.weight_structural * structural;

        SimilarityResult {
            subsequence,
            edit_distance,
            structural,
            combined,
            variations,
        }
    }

    /// Whether a scored pair qualifies as a duplicate.
    pub fn is_duplicate(&self, result: &SimilarityResult) -> bool {
        result.combined >= self.config.duplicate_threshold
    }
}

/// Longest-common-subsequence ratio over canonical forms, in [0, 1].
fn lcs_ratio(left: &TokenStream, right: &TokenStream) -> f64 {
    let m = left.len();
    let n = right.len();
    if m == 0 && n == 0 {
        return 1.0;
    }
    if m == 0 || n == 0 {
        return 0.0;
    }
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if left.tokens[i - 1].canonical == right.tokens[j - 1].canonical {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }
    dp[m][n] as f64 / m.max(n) as f64
}

/// Levenshtein DP over canonical forms plus a backtrace that records every
/// differing position with both regions' original values.
fn edit_alignment(left: &TokenStream, right: &TokenStream) -> (f64, VariationAnalysis) {
    let m = left.len();
    let n = right.len();
    if m == 0 && n == 0 {
        return (0.0, VariationAnalysis::default());
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=n {
        dp[0][j] = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let substitution = if left.tokens[i - 1].canonical == right.tokens[j - 1].canonical {
                0
            } else {
                1
            };
            dp[i][j] = (dp[i - 1][j - 1] + substitution)
                .min(dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1);
        }
    }

    let distance = dp[m][n] as f64 / m.max(n) as f64;
    let variations = backtrace(&dp, left, right);
    (distance, variations)
}

fn backtrace(dp: &[Vec<usize>], left: &TokenStream, right: &TokenStream) -> VariationAnalysis {
    let mut variations = Vec::new();
    let mut i = left.len();
    let mut j = right.len();

    while i > 0 || j > 0 {
        if i > 0 && j > 0 {
            let left_token = &left.tokens[i - 1];
            let right_token = &right.tokens[j - 1];
            let canonical_match = left_token.canonical == right_token.canonical;
            let substitution = usize::from(!canonical_match);
            if dp[i][j] == dp[i - 1][j - 1] + substitution {
                if canonical_match {
                    // Same shape; differing slot values are the parameter
                    // candidates.
                    for (k, (ls, rs)) in left_token
                        .slots
                        .iter()
                        .zip(&right_token.slots)
                        .enumerate()
                    {
                        if ls.original != rs.original {
                            variations.push(Variation {
                                position: i - 1,
                                slot: Some(k),
                                left: ls.original.clone(),
                                right: rs.original.clone(),
                                left_node: Some(ls.node),
                                right_node: Some(rs.node),
                            });
                        }
                    }
                } else {
                    variations.push(Variation {
                        position: i - 1,
                        slot: None,
                        left: left_token.original.clone(),
                        right: right_token.original.clone(),
                        left_node: None,
                        right_node: None,
                    });
                }
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && (j == 0 || dp[i][j] == dp[i - 1][j] + 1) {
            variations.push(Variation {
                position: i - 1,
                slot: None,
                left: left.tokens[i - 1].original.clone(),
                right: String::new(),
                left_node: None,
                right_node: None,
            });
            i -= 1;
        } else {
            variations.push(Variation {
                position: i,
                slot: None,
                left: String::new(),
                right: right.tokens[j - 1].original.clone(),
                left_node: None,
                right_node: None,
            });
            j -= 1;
        }
    }

    variations.reverse();
    VariationAnalysis { variations }
}
