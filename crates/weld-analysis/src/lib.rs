//! # weld-analysis
//!
//! Similarity and clustering engine for the Weld refactoring tool.
//! Normalizes code regions into comparable token streams, filters
//! implausible pairs cheaply, indexes large corpora with MinHash/LSH,
//! scores surviving pairs with a weighted multi-algorithm blend, and
//! groups matches into duplicate clusters.

pub mod cluster;
pub mod filters;
pub mod lsh;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod similarity;
pub mod types;

pub use pipeline::{analyze, AnalysisPipeline};
pub use types::{DuplicateCluster, DuplicationReport, PairMatch, SimilarityResult};
