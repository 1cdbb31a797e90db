//! Code regions: the unit of duplicate comparison.
//!
//! A region is a contiguous statement window inside one declaration,
//! produced by sliding-window extraction over the declaration body.
//! Identity is location only — two regions at the same (file, line range,
//! offset) are the same region even if their statement ids differ, which is
//! what lets results survive tree mutation between pipeline stages.

use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::config::RegionConfig;
use crate::syntax::{Corpus, DeclId, NodeId};

/// An immutable statement window inside one declaration.
#[derive(Debug, Clone, Serialize)]
pub struct CodeRegion {
    /// Statement nodes, in order. References into the shared arena.
    pub stmts: Vec<NodeId>,
    /// Normalized source file path.
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Index of the first statement within the enclosing declaration body.
    pub offset: usize,
    /// The enclosing method or constructor.
    pub decl: DeclId,
}

impl CodeRegion {
    /// Number of statements in the window.
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Number of source lines the window spans.
    pub fn line_count(&self) -> usize {
        (self.end_line - self.start_line) as usize + 1
    }

    /// Location key used for identity, ordering, and deterministic output.
    pub fn location(&self) -> (&str, u32, u32, usize) {
        (&self.file, self.start_line, self.end_line, self.offset)
    }
}

impl PartialEq for CodeRegion {
    fn eq(&self, other: &Self) -> bool {
        self.location() == other.location()
    }
}

impl Eq for CodeRegion {}

impl Hash for CodeRegion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location().hash(state);
    }
}

/// Extract every sliding window of `config.min_statements..=max_statements`
/// statements from `decl`'s body, in (offset, length) order.
pub fn extract_regions(corpus: &Corpus, decl: DeclId, config: &RegionConfig) -> Vec<CodeRegion> {
    let declaration = corpus.decl(decl);
    let body_stmts = corpus.tree().children(declaration.body);
    let total = body_stmts.len();
    let mut regions = Vec::new();

    if total < config.min_statements {
        return regions;
    }

    let max_len = config.max_statements.min(total);
    for offset in 0..total {
        for len in config.min_statements..=max_len {
            if offset + len > total {
                break;
            }
            let stmts: Vec<NodeId> = body_stmts[offset..offset + len].to_vec();
            let start_line = corpus.tree().line(stmts[0]);
            let end_line = window_end_line(corpus, &stmts);
            regions.push(CodeRegion {
                stmts,
                file: declaration.file.clone(),
                start_line,
                end_line,
                offset,
                decl,
            });
        }
    }
    regions
}

/// Extract regions for every declaration in the corpus, ordered by
/// (file, start line, offset, length).
pub fn extract_all(corpus: &Corpus, config: &RegionConfig) -> Vec<CodeRegion> {
    let mut regions: Vec<CodeRegion> = corpus
        .decls()
        .flat_map(|(id, _)| extract_regions(corpus, id, config))
        .collect();
    regions.sort_by(|a, b| a.location().cmp(&b.location()).then(a.len().cmp(&b.len())));
    regions
}

/// Last line covered by the window, accounting for nested blocks.
fn window_end_line(corpus: &Corpus, stmts: &[NodeId]) -> u32 {
    let last = *stmts.last().expect("window is never empty");
    corpus
        .tree()
        .descendants(last)
        .into_iter()
        .map(|id| corpus.tree().line(id))
        .max()
        .unwrap_or(0)
}
