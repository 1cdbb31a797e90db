//! Variable escape and liveness analysis for one region.
//!
//! Relative to its enclosing declaration body, a region partitions the
//! variables it touches into:
//! - reads of externally-declared variables — safe, parameter candidates;
//! - writes to externally-declared variables — capture violations;
//! - internally-declared variables referenced after the region ends —
//!   live-out, return-value candidates.
//!
//! Identifiers the corpus cannot place (fields, globals) count as
//! externally declared; that is the conservative direction for both reads
//! and writes.

use serde::Serialize;

use weld_core::region::CodeRegion;
use weld_core::syntax::{Corpus, NodeId, NodeKind, SyntaxTree};
use weld_core::types::collections::{FxHashMap, FxHashSet};

/// A variable declared inside the region and referenced after it ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveOut {
    pub name: String,
    /// Declared type from the variable's declaration.
    pub ty: String,
    /// True when the initializer is built purely from literals; such
    /// variables are cheap to recompute at call sites and are excluded
    /// from return candidacy.
    pub literal_init: bool,
}

/// Escape analysis result for one region.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EscapeAnalysis {
    /// Externally-declared variables read inside, with first-use line.
    /// Ordered by first use.
    pub reads: Vec<(String, u32)>,
    /// Externally-declared variables written inside. Any entry makes the
    /// region non-extractable.
    pub writes: Vec<String>,
    /// Internally-declared variables still referenced after the region.
    pub live_out: Vec<LiveOut>,
}

impl EscapeAnalysis {
    /// Return candidates after the literal-initialization exclusion.
    pub fn return_candidates(&self) -> Vec<&LiveOut> {
        self.live_out.iter().filter(|v| !v.literal_init).collect()
    }
}

/// Analyze one region against its enclosing declaration body.
pub fn analyze_region(corpus: &Corpus, region: &CodeRegion) -> EscapeAnalysis {
    let tree = corpus.tree();
    let decl = corpus.decl(region.decl);
    let region_set: FxHashSet<NodeId> = region.stmts.iter().copied().collect();

    // Variables declared inside the region, with type and init kind.
    let mut inner: FxHashMap<String, (String, bool)> = FxHashMap::default();
    for &stmt in &region.stmts {
        for node in tree.descendants(stmt) {
            if tree.kind(node) == NodeKind::VarDecl {
                let ty = tree.text(tree.children(node)[0]).to_string();
                let literal_init = tree
                    .children(node)
                    .get(1)
                    .is_some_and(|&init| is_literal_expr(tree, init));
                inner.insert(tree.text(node).to_string(), (ty, literal_init));
            }
        }
    }

    // Reads and writes inside the region, in evaluation order.
    let mut reads: Vec<(String, u32)> = Vec::new();
    let mut seen_reads: FxHashSet<String> = FxHashSet::default();
    let mut writes: Vec<String> = Vec::new();
    let mut seen_writes: FxHashSet<String> = FxHashSet::default();
    for &stmt in &region.stmts {
        scan_stmt(
            tree,
            stmt,
            &mut |name, line| {
                if !inner.contains_key(name) && seen_reads.insert(name.to_string()) {
                    reads.push((name.to_string(), line));
                }
            },
            &mut |name| {
                if !inner.contains_key(name) && seen_writes.insert(name.to_string()) {
                    writes.push(name.to_string());
                }
            },
        );
    }

    // Live-out: inner declarations referenced strictly after the region
    // ends, by line, within the same declaration body.
    let mut live_out = Vec::new();
    let mut seen_live: FxHashSet<String> = FxHashSet::default();
    for &stmt in tree.children(decl.body) {
        if region_set.contains(&stmt) {
            continue;
        }
        for (name, line) in tree.idents_under(stmt) {
            if line <= region.end_line {
                continue;
            }
            if let Some((ty, literal_init)) = inner.get(&name) {
                if seen_live.insert(name.clone()) {
                    live_out.push(LiveOut {
                        name,
                        ty: ty.clone(),
                        literal_init: *literal_init,
                    });
                }
            }
        }
    }

    EscapeAnalysis {
        reads,
        writes,
        live_out,
    }
}

/// Walk one statement, reporting identifier reads and assignment targets.
fn scan_stmt(
    tree: &SyntaxTree,
    stmt: NodeId,
    on_read: &mut impl FnMut(&str, u32),
    on_write: &mut impl FnMut(&str),
) {
    let children = tree.children(stmt);
    match tree.kind(stmt) {
        NodeKind::Assign => {
            on_write(tree.text(children[0]));
            scan_expr(tree, children[1], on_read);
        }
        NodeKind::VarDecl => {
            if let Some(&init) = children.get(1) {
                scan_expr(tree, init, on_read);
            }
        }
        NodeKind::ExprStmt | NodeKind::Return => {
            if let Some(&value) = children.first() {
                scan_expr(tree, value, on_read);
            }
        }
        NodeKind::If => {
            scan_expr(tree, children[0], on_read);
            scan_block(tree, children[1], on_read, on_write);
            if let Some(&els) = children.get(2) {
                scan_block(tree, els, on_read, on_write);
            }
        }
        NodeKind::While => {
            scan_expr(tree, children[0], on_read);
            scan_block(tree, children[1], on_read, on_write);
        }
        _ => {}
    }
}

fn scan_block(
    tree: &SyntaxTree,
    block: NodeId,
    on_read: &mut impl FnMut(&str, u32),
    on_write: &mut impl FnMut(&str),
) {
    for &stmt in tree.children(block) {
        scan_stmt(tree, stmt, on_read, on_write);
    }
}

fn scan_expr(tree: &SyntaxTree, expr: NodeId, on_read: &mut impl FnMut(&str, u32)) {
    for (name, line) in tree.idents_under(expr) {
        on_read(&name, line);
    }
}

/// Whether an expression is built purely from literals.
fn is_literal_expr(tree: &SyntaxTree, expr: NodeId) -> bool {
    match tree.kind(expr) {
        NodeKind::Literal(_) => true,
        NodeKind::Binary => tree
            .children(expr)
            .iter()
            .all(|&child| is_literal_expr(tree, child)),
        _ => false,
    }
}
