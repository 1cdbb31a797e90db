//! Region normalization into canonical token streams.
//!
//! Two views per region, kept strictly separate:
//! - **strict** — identifiers and literals abstracted to placeholders,
//!   call-site names preserved. `a.deposit(x)` and `a.withdraw(x)` stay
//!   distinguishable. This stream feeds the similarity calculator.
//! - **fuzzy** — additionally erases call names. Used only for coarse
//!   pre-filter bucketing and the LSH index, never for the final score;
//!   folding call names into the strict stream would merge semantically
//!   opposite operations into one cluster.

use serde::Serialize;

use weld_core::region::CodeRegion;
use weld_core::syntax::{Corpus, LiteralKind, NodeId, NodeKind, SyntaxTree};
use weld_core::types::collections::{FxHashMap, FxHashSet};

/// Abstraction placeholder recorded for one value position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotKind {
    /// A variable or field identifier.
    Var,
    /// A literal of the given kind.
    Literal(LiteralKind),
}

/// One abstracted value position with its original text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub kind: SlotKind,
    pub original: String,
    pub node: NodeId,
}

/// Normalized representation of one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    /// Canonical form with values abstracted.
    pub canonical: String,
    /// The original source line of the statement.
    pub original: String,
    /// Statement kind, the unit of structural overlap.
    pub stmt_kind: &'static str,
    /// Abstracted value positions in source order (nested included).
    pub slots: Vec<Slot>,
}

/// Ordered tokens for one region.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
}

impl TokenStream {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Statement-kind multiset for the structural pre-filter and the
    /// structural sub-score.
    pub fn kind_multiset(&self) -> FxHashMap<&'static str, usize> {
        let mut counts = FxHashMap::default();
        for token in &self.tokens {
            *counts.entry(token.stmt_kind).or_insert(0) += 1;
        }
        counts
    }

    /// Canonical-form set for MinHash signatures.
    pub fn canonical_set(&self) -> FxHashSet<String> {
        self.tokens.iter().map(|t| t.canonical.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strict,
    Fuzzy,
}

/// Strict normalization: call names preserved.
pub fn strict(corpus: &Corpus, region: &CodeRegion) -> TokenStream {
    normalize(corpus, region, Mode::Strict)
}

/// Fuzzy normalization: call names erased. Bucketing only.
pub fn fuzzy(corpus: &Corpus, region: &CodeRegion) -> TokenStream {
    normalize(corpus, region, Mode::Fuzzy)
}

fn normalize(corpus: &Corpus, region: &CodeRegion, mode: Mode) -> TokenStream {
    let tree = corpus.tree();
    let source = corpus.source(&region.file);
    let tokens = region
        .stmts
        .iter()
        .map(|&stmt| {
            let mut slots = Vec::new();
            let canonical = canon_stmt(tree, stmt, mode, &mut slots);
            let original = source
                .and_then(|text| text.lines().nth(tree.line(stmt) as usize - 1))
                .map(|line| line.trim().to_string())
                .unwrap_or_default();
            Token {
                canonical,
                original,
                stmt_kind: tree.kind(stmt).name(),
                slots,
            }
        })
        .collect();
    TokenStream { tokens }
}

fn canon_stmt(tree: &SyntaxTree, id: NodeId, mode: Mode, slots: &mut Vec<Slot>) -> String {
    let children = tree.children(id);
    match tree.kind(id) {
        NodeKind::VarDecl => {
            slots.push(Slot {
                kind: SlotKind::Var,
                original: tree.text(id).to_string(),
                node: id,
            });
            let ty = tree.text(children[0]);
            match children.get(1) {
                Some(&init) => {
                    format!("decl<{ty}> VAR = {}", canon_expr(tree, init, mode, slots))
                }
                None => format!("decl<{ty}> VAR"),
            }
        }
        NodeKind::Assign => {
            let target = canon_expr(tree, children[0], mode, slots);
            let value = canon_expr(tree, children[1], mode, slots);
            format!("{target} = {value}")
        }
        NodeKind::ExprStmt => canon_expr(tree, children[0], mode, slots),
        NodeKind::Return => match children.first() {
            Some(&value) => format!("return {}", canon_expr(tree, value, mode, slots)),
            None => "return".to_string(),
        },
        NodeKind::If => {
            let cond = canon_expr(tree, children[0], mode, slots);
            let then = canon_block(tree, children[1], mode, slots);
            match children.get(2) {
                Some(&els) => {
                    let els = canon_block(tree, els, mode, slots);
                    format!("if({cond}){{{then}}}else{{{els}}}")
                }
                None => format!("if({cond}){{{then}}}"),
            }
        }
        NodeKind::While => {
            let cond = canon_expr(tree, children[0], mode, slots);
            let body = canon_block(tree, children[1], mode, slots);
            format!("while({cond}){{{body}}}")
        }
        other => other.name().to_string(),
    }
}

fn canon_block(tree: &SyntaxTree, block: NodeId, mode: Mode, slots: &mut Vec<Slot>) -> String {
    tree.children(block)
        .iter()
        .map(|&stmt| canon_stmt(tree, stmt, mode, slots))
        .collect::<Vec<_>>()
        .join("; ")
}

fn canon_expr(tree: &SyntaxTree, id: NodeId, mode: Mode, slots: &mut Vec<Slot>) -> String {
    let children = tree.children(id);
    match tree.kind(id) {
        NodeKind::Ident => {
            slots.push(Slot {
                kind: SlotKind::Var,
                original: tree.text(id).to_string(),
                node: id,
            });
            "VAR".to_string()
        }
        NodeKind::Literal(kind) => {
            slots.push(Slot {
                kind: SlotKind::Literal(kind),
                original: tree.text(id).to_string(),
                node: id,
            });
            format!("LIT<{}>", kind.type_name())
        }
        NodeKind::Call => {
            let (receiver, args) = match children.first() {
                Some(&first) if tree.kind(first) == NodeKind::Receiver => {
                    let inner = tree.children(first)[0];
                    (
                        Some(canon_expr(tree, inner, mode, slots)),
                        &children[1..],
                    )
                }
                _ => (None, children),
            };
            let name = match mode {
                Mode::Strict => tree.text(id),
                Mode::Fuzzy => "CALL",
            };
            let args = args
                .iter()
                .map(|&arg| canon_expr(tree, arg, mode, slots))
                .collect::<Vec<_>>()
                .join(", ");
            match receiver {
                Some(recv) => format!("{recv}.{name}({args})"),
                None => format!("{name}({args})"),
            }
        }
        NodeKind::Binary => {
            let lhs = canon_expr(tree, children[0], mode, slots);
            let rhs = canon_expr(tree, children[1], mode, slots);
            format!("{lhs} {} {rhs}", tree.text(id))
        }
        other => other.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weld_core::config::RegionConfig;
    use weld_core::region::extract_regions;
    use weld_core::syntax::builder::{expr, ident, int, mcall, var, CorpusBuilder};
    use weld_core::syntax::DeclId;

    fn region_of(corpus: &Corpus, decl: DeclId) -> CodeRegion {
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
    fn strict_preserves_call_names_fuzzy_erases_them() {
        let mut cb = CorpusBuilder::new();
        let deposit = cb.method("src/A.java", "A", "pay").body(vec![expr(mcall(
            ident("account"),
            "deposit",
            vec![ident("amount")],
        ))]);
        let withdraw = cb.method("src/A.java", "A", "take").body(vec![expr(mcall(
            ident("account"),
            "withdraw",
            vec![ident("amount")],
        ))]);
        let corpus = cb.finish();

        let dep = region_of(&corpus, deposit);
        let wit = region_of(&corpus, withdraw);

        let strict_dep = strict(&corpus, &dep);
        let strict_wit = strict(&corpus, &wit);
        assert_eq!(strict_dep.tokens[0].canonical, "VAR.deposit(VAR)");
        assert_eq!(strict_wit.tokens[0].canonical, "VAR.withdraw(VAR)");
        assert_ne!(strict_dep.tokens[0].canonical, strict_wit.tokens[0].canonical);

        let fuzzy_dep = fuzzy(&corpus, &dep);
        let fuzzy_wit = fuzzy(&corpus, &wit);
        assert_eq!(fuzzy_dep.tokens[0].canonical, fuzzy_wit.tokens[0].canonical);
        assert_eq!(fuzzy_dep.tokens[0].canonical, "VAR.CALL(VAR)");
    }

    #[test]
    fn slots_carry_original_values_in_order() {
        let mut cb = CorpusBuilder::new();
        let decl = cb
            .method("src/A.java", "A", "m")
            .body(vec![var("int", "fee", int(10))]);
        let corpus = cb.finish();
        let region = region_of(&corpus, decl);
        let stream = strict(&corpus, &region);

        let token = &stream.tokens[0];
        assert_eq!(token.canonical, "decl<int> VAR = LIT<int>");
        assert_eq!(token.original, "int fee = 10;");
        assert_eq!(token.slots.len(), 2);
        assert_eq!(token.slots[0].original, "fee");
        assert_eq!(token.slots[1].original, "10");
        assert_eq!(token.slots[1].kind, SlotKind::Literal(LiteralKind::Int));
    }

    #[test]
    fn nested_statements_fold_into_one_token() {
        use weld_core::syntax::builder::{assign, bin, if_stmt};
        let mut cb = CorpusBuilder::new();
        let decl = cb.method("src/A.java", "A", "m").body(vec![if_stmt(
            bin(ident("x"), ">", int(0)),
            vec![assign("y", int(1))],
        )]);
        let corpus = cb.finish();
        let region = region_of(&corpus, decl);
        let stream = strict(&corpus, &region);

        assert_eq!(stream.len(), 1);
        assert_eq!(stream.tokens[0].stmt_kind, "if");
        assert_eq!(
            stream.tokens[0].canonical,
            "if(VAR > LIT<int>){VAR = LIT<int>}"
        );
    }

    #[test]
    fn loops_fold_into_one_token() {
        use weld_core::syntax::builder::{assign, bin, while_stmt};
        let mut cb = CorpusBuilder::new();
        let decl = cb.method("src/A.java", "A", "m").body(vec![while_stmt(
            bin(ident("i"), "<", int(3)),
            vec![assign("i", bin(ident("i"), "+", int(1)))],
        )]);
        let corpus = cb.finish();
        let region = region_of(&corpus, decl);
        let stream = strict(&corpus, &region);

        assert_eq!(stream.len(), 1);
        assert_eq!(stream.tokens[0].stmt_kind, "while");
        assert_eq!(
            stream.tokens[0].canonical,
            "while(VAR < LIT<int>){VAR = VAR + LIT<int>}"
        );
    }

    #[test]
    fn literal_kinds_keep_distinct_placeholders() {
        use weld_core::syntax::builder::{assign, bool_lit, double, long, null};
        let mut cb = CorpusBuilder::new();
        let decl = cb.method("src/A.java", "A", "m").body(vec![
            var("long", "a", long(5)),
            var("double", "b", double("2.5")),
            var("boolean", "c", bool_lit(true)),
            assign("d", null()),
        ]);
        let corpus = cb.finish();
        let stream = strict(&corpus, &region_of(&corpus, decl));

        assert_eq!(stream.tokens[0].canonical, "decl<long> VAR = LIT<long>");
        assert_eq!(stream.tokens[1].canonical, "decl<double> VAR = LIT<double>");
        assert_eq!(stream.tokens[2].canonical, "decl<boolean> VAR = LIT<boolean>");
        assert_eq!(stream.tokens[3].canonical, "VAR = LIT<Object>");
        assert_eq!(stream.tokens[0].slots[1].original, "5L");
    }

    #[test]
    fn kind_multiset_counts_statement_kinds() {
        use weld_core::syntax::builder::assign;
        let mut cb = CorpusBuilder::new();
        let decl = cb.method("src/A.java", "A", "m").body(vec![
            var("int", "a", int(1)),
            assign("b", ident("a")),
            assign("c", ident("b")),
        ]);
        let corpus = cb.finish();
        let stream = strict(&corpus, &region_of(&corpus, decl));
        let counts = stream.kind_multiset();
        assert_eq!(counts["var_decl"], 1);
        assert_eq!(counts["assign"], 2);
    }
}
