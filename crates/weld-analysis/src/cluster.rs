//! Connected-component clustering of qualifying pairs.
//!
//! Qualifying pairs form the edges of an undirected graph over regions;
//! each connected component becomes one duplicate cluster. The primary is
//! the member with the lexicographically smallest (file, start line), and
//! estimated savings assume every non-primary member collapses to one
//! call line.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;

use tracing::debug;

use weld_core::region::CodeRegion;
use weld_core::types::collections::FxHashMap;

use crate::types::{DuplicateCluster, PairMatch, RegionIdx};

/// Group qualifying pairs into clusters, ordered by estimated savings
/// descending (location ascending on ties).
pub fn build_clusters(regions: &[CodeRegion], matches: Vec<PairMatch>) -> Vec<DuplicateCluster> {
    if matches.is_empty() {
        return Vec::new();
    }

    let mut graph: UnGraph<RegionIdx, usize> = UnGraph::new_undirected();
    let mut node_of: FxHashMap<RegionIdx, NodeIndex> = FxHashMap::default();
    for (match_idx, pair) in matches.iter().enumerate() {
        let left = *node_of
            .entry(pair.left)
            .or_insert_with(|| graph.add_node(pair.left));
        let right = *node_of
            .entry(pair.right)
            .or_insert_with(|| graph.add_node(pair.right));
        graph.add_edge(left, right, match_idx);
    }

    // Union-find over graph nodes gives the connected components in O(V+E).
    let mut components = UnionFind::new(graph.node_count());
    for edge in graph.edge_references() {
        components.union(edge.source().index(), edge.target().index());
    }

    let mut members_by_root: FxHashMap<usize, Vec<RegionIdx>> = FxHashMap::default();
    for node in graph.node_indices() {
        let root = components.find(node.index());
        members_by_root
            .entry(root)
            .or_default()
            .push(graph[node]);
    }
    let mut matches_by_root: FxHashMap<usize, Vec<PairMatch>> = FxHashMap::default();
    for edge in graph.edge_references() {
        let root = components.find(edge.source().index());
        matches_by_root
            .entry(root)
            .or_default()
            .push(matches[*edge.weight()].clone());
    }

    let mut clusters: Vec<DuplicateCluster> = members_by_root
        .into_iter()
        .map(|(root, mut members)| {
            members.sort_by(|&a, &b| location_key(&regions[a]).cmp(&location_key(&regions[b])));
            let primary = members[0];
            let estimated_lines_saved = members
                .iter()
                .skip(1)
                .map(|&idx| regions[idx].line_count().saturating_sub(1))
                .sum();
            let mut component_matches = matches_by_root.remove(&root).unwrap_or_default();
            component_matches.sort_by(|a, b| (a.left, a.right).cmp(&(b.left, b.right)));
            DuplicateCluster {
                primary,
                members,
                matches: component_matches,
                estimated_lines_saved,
            }
        })
        .collect();

    clusters.sort_by(|a, b| {
        b.estimated_lines_saved
            .cmp(&a.estimated_lines_saved)
            .then_with(|| location_key(&regions[a.primary]).cmp(&location_key(&regions[b.primary])))
    });

    debug!(
        clusters = clusters.len(),
        pairs = clusters.iter().map(|c| c.matches.len()).sum::<usize>(),
        "built duplicate clusters"
    );
    clusters
}

fn location_key(region: &CodeRegion) -> (&str, u32, usize) {
    (&region.file, region.start_line, region.offset)
}
