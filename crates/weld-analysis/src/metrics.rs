//! Per-file duplication rollups for the report.

use weld_core::region::CodeRegion;
use weld_core::types::collections::{FxHashMap, FxHashSet};

use crate::types::{DuplicateCluster, FileMetrics, RegionIdx};

/// Compute per-file metrics from the final clusters, ordered by path.
pub fn per_file_metrics(
    regions: &[CodeRegion],
    clusters: &[DuplicateCluster],
) -> Vec<FileMetrics> {
    let mut clustered: FxHashSet<RegionIdx> = FxHashSet::default();
    let mut duplicate_lines: FxHashMap<&str, usize> = FxHashMap::default();
    for cluster in clusters {
        for &member in &cluster.members {
            clustered.insert(member);
            if member != cluster.primary {
                let region = &regions[member];
                *duplicate_lines.entry(region.file.as_str()).or_insert(0) +=
                    region.line_count().saturating_sub(1);
            }
        }
    }

    let mut by_file: FxHashMap<&str, FileMetrics> = FxHashMap::default();
    for (idx, region) in regions.iter().enumerate() {
        let entry = by_file
            .entry(region.file.as_str())
            .or_insert_with(|| FileMetrics {
                file: region.file.clone(),
                region_count: 0,
                duplicated_regions: 0,
                estimated_duplicate_lines: 0,
            });
        entry.region_count += 1;
        if clustered.contains(&idx) {
            entry.duplicated_regions += 1;
        }
    }
    for (file, lines) in duplicate_lines {
        if let Some(entry) = by_file.get_mut(file) {
            entry.estimated_duplicate_lines = lines;
        }
    }

    let mut metrics: Vec<FileMetrics> = by_file.into_values().collect();
    metrics.sort_by(|a, b| a.file.cmp(&b.file));
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PairMatch;
    use crate::types::{SimilarityResult, VariationAnalysis};
    use weld_core::syntax::DeclId;

    fn make_region(file: &str, start: u32, lines: usize) -> CodeRegion {
        CodeRegion {
            stmts: Vec::new(),
            file: file.to_string(),
            start_line: start,
            end_line: start + lines as u32 - 1,
            offset: 0,
            decl: DeclId(0),
        }
    }

    #[test]
    fn rollups_count_clustered_regions_per_file() {
        let regions = vec![
            make_region("a.java", 1, 6),
            make_region("b.java", 1, 6),
            make_region("b.java", 20, 4),
        ];
        let clusters = vec![DuplicateCluster {
            primary: 0,
            members: vec![0, 1],
            matches: vec![PairMatch {
                left: 0,
                right: 1,
                result: SimilarityResult {
                    subsequence: 1.0,
                    edit_distance: 0.0,
                    structural: 1.0,
                    combined: 1.0,
                    variations: VariationAnalysis::default(),
                },
            }],
            estimated_lines_saved: 5,
        }];

        let metrics = per_file_metrics(&regions, &clusters);
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].file, "a.java");
        assert_eq!(metrics[0].duplicated_regions, 1);
        assert_eq!(metrics[0].estimated_duplicate_lines, 0); // primary side
        assert_eq!(metrics[1].file, "b.java");
        assert_eq!(metrics[1].region_count, 2);
        assert_eq!(metrics[1].duplicated_regions, 1);
        assert_eq!(metrics[1].estimated_duplicate_lines, 5);
    }
}
