//! Result types emitted by the analysis pipeline.

use serde::Serialize;

use weld_core::region::CodeRegion;
use weld_core::syntax::NodeId;

/// Index of a region within a [`DuplicationReport`]'s region list.
pub type RegionIdx = usize;

/// One position where two regions differ, with both original values.
///
/// `slot` is set when the statements agree canonically and only an
/// abstracted value (identifier or literal) differs — the case parameter
/// inference feeds on. It is `None` when the whole statement differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variation {
    /// Statement index within the token stream.
    pub position: usize,
    /// Slot index within the statement, when only a slot differs.
    pub slot: Option<usize>,
    pub left: String,
    pub right: String,
    /// Arena nodes carrying the differing values, when slot-level.
    pub left_node: Option<NodeId>,
    pub right_node: Option<NodeId>,
}

/// Ordered positions where two regions differ.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VariationAnalysis {
    pub variations: Vec<Variation>,
}

impl VariationAnalysis {
    /// Variations at slot granularity — the parameter candidates.
    pub fn slot_variations(&self) -> impl Iterator<Item = &Variation> {
        self.variations.iter().filter(|v| v.slot.is_some())
    }

    /// Variations where whole statements differ.
    pub fn statement_variations(&self) -> impl Iterator<Item = &Variation> {
        self.variations.iter().filter(|v| v.slot.is_none())
    }
}

/// Per-pair similarity scores plus the variation trace.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityResult {
    /// Longest-common-subsequence match ratio in [0, 1].
    pub subsequence: f64,
    /// Normalized edit distance in [0, 1]; 0 means identical.
    pub edit_distance: f64,
    /// Jaccard overlap of statement-kind multisets in [0, 1].
    pub structural: f64,
    /// Weighted combination of the three sub-scores.
    pub combined: f64,
    pub variations: VariationAnalysis,
}

/// A qualifying pair of regions.
#[derive(Debug, Clone, Serialize)]
pub struct PairMatch {
    pub left: RegionIdx,
    pub right: RegionIdx,
    pub result: SimilarityResult,
}

/// One connected component of qualifying pairs.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCluster {
    /// The member with the lexicographically smallest (file, start line).
    pub primary: RegionIdx,
    /// All members including the primary, ordered by location.
    pub members: Vec<RegionIdx>,
    /// The pairwise matches forming the component.
    pub matches: Vec<PairMatch>,
    /// Σ over non-primary members of (line count − 1); the −1 approximates
    /// the call line left behind.
    pub estimated_lines_saved: usize,
}

impl DuplicateCluster {
    /// Best combined score among the cluster's matches.
    pub fn best_score(&self) -> f64 {
        self.matches
            .iter()
            .map(|m| m.result.combined)
            .fold(0.0, f64::max)
    }

    /// The match joining `member` to the primary, if one exists directly.
    pub fn match_with_primary(&self, member: RegionIdx) -> Option<&PairMatch> {
        self.matches.iter().find(|m| {
            (m.left == self.primary && m.right == member)
                || (m.right == self.primary && m.left == member)
        })
    }
}

/// Per-file duplication rollup.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetrics {
    pub file: String,
    /// Regions extracted from this file.
    pub region_count: usize,
    /// Regions participating in at least one cluster.
    pub duplicated_regions: usize,
    /// Estimated duplicate lines attributable to this file.
    pub estimated_duplicate_lines: usize,
}

/// Output of [`crate::analyze`].
#[derive(Debug, Clone, Serialize)]
pub struct DuplicationReport {
    /// Every region considered, indexed by the cluster/member indices.
    pub regions: Vec<CodeRegion>,
    /// Clusters ordered by estimated savings, descending.
    pub clusters: Vec<DuplicateCluster>,
    pub per_file_metrics: Vec<FileMetrics>,
}

impl DuplicationReport {
    pub fn region(&self, idx: RegionIdx) -> &CodeRegion {
        &self.regions[idx]
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
