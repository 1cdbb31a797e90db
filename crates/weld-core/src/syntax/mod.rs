//! Syntax arena, corpus, and construction utilities.
//!
//! The tree is an arena of nodes with stable indices (mutation never moves
//! or reuses a slot). Multiple source files share one arena; each file has
//! its own root. The only mutation path is [`corpus::CorpusEditor`], a
//! capability the refactoring orchestrator hands to exactly one strategy
//! execution at a time.

pub mod builder;
pub mod corpus;
pub mod tree;

pub use builder::{CorpusBuilder, Expr, Stmt};
pub use corpus::{Corpus, CorpusEditor, DeclId, DeclKind, Declaration};
pub use tree::{LiteralKind, NodeId, NodeKind, SyntaxNode, SyntaxTree};
