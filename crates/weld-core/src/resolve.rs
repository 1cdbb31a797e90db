//! Best-effort type resolution with graceful degradation.
//!
//! Resolution is a three-state outcome and every consumer must handle all
//! three; a failed lookup degrades the analysis, it never crashes it.

use serde::Serialize;

use crate::syntax::{Corpus, DeclId, NodeId, NodeKind};

/// Outcome of resolving the type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    Resolved(String),
    Unresolved,
    /// Conflicting candidate types; treated as unusable, not as an error.
    Ambiguous,
}

impl Resolution {
    pub fn resolved(&self) -> Option<&str> {
        match self {
            Self::Resolved(ty) => Some(ty),
            Self::Unresolved | Self::Ambiguous => None,
        }
    }
}

/// Resolves expression types within a declaration context.
pub trait TypeResolver {
    fn resolve(&self, corpus: &Corpus, decl: DeclId, node: NodeId) -> Resolution;
}

/// Global declaration lookup used only for collision checks.
///
/// `None` means the lookup itself is unavailable; callers degrade to
/// "assume no collision" with a warning.
pub trait DeclarationLookup {
    fn declarations_by_name(&self, name: &str) -> Option<Vec<DeclId>>;
}

/// Resolver that never resolves anything. Useful where degradation paths
/// are under test.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResolver;

impl TypeResolver for NoResolver {
    fn resolve(&self, _corpus: &Corpus, _decl: DeclId, _node: NodeId) -> Resolution {
        Resolution::Unresolved
    }
}

/// Resolver backed by the corpus itself: literals by kind, identifiers by
/// parameter and local-declaration types, binary arithmetic by widening.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorpusResolver;

impl TypeResolver for CorpusResolver {
    fn resolve(&self, corpus: &Corpus, decl: DeclId, node: NodeId) -> Resolution {
        match corpus.tree().kind(node) {
            NodeKind::Literal(kind) => Resolution::Resolved(kind.type_name().to_string()),
            NodeKind::Ident => resolve_ident(corpus, decl, corpus.tree().text(node)),
            NodeKind::Binary => {
                let children = corpus.tree().children(node);
                let lhs = self.resolve(corpus, decl, children[0]);
                let rhs = self.resolve(corpus, decl, children[1]);
                match (lhs.resolved(), rhs.resolved()) {
                    (Some(a), Some(b)) => match common_supertype(a, b) {
                        Some(ty) => Resolution::Resolved(ty),
                        None => Resolution::Ambiguous,
                    },
                    _ => Resolution::Unresolved,
                }
            }
            // Call return types need whole-project resolution, which is an
            // external collaborator; degrade.
            _ => Resolution::Unresolved,
        }
    }
}

fn resolve_ident(corpus: &Corpus, decl: DeclId, name: &str) -> Resolution {
    let declaration = corpus.decl(decl);
    if let Some(param) = declaration.params.iter().find(|p| p.name == name) {
        return Resolution::Resolved(param.ty.clone());
    }

    let tree = corpus.tree();
    let mut found: Option<String> = None;
    for node in tree.descendants(declaration.body) {
        if tree.kind(node) == NodeKind::VarDecl && tree.text(node) == name {
            let ty = tree.text(tree.children(node)[0]).to_string();
            match &found {
                Some(existing) if *existing != ty => return Resolution::Ambiguous,
                _ => found = Some(ty),
            }
        }
    }
    match found {
        Some(ty) => Resolution::Resolved(ty),
        None => Resolution::Unresolved,
    }
}

/// The safe common type of two source types, if one exists.
///
/// Equal types unify to themselves; numeric primitives widen
/// (int → long → double); two reference types fall back to `Object`.
/// A primitive against a reference type has no safe common type.
pub fn common_supertype(a: &str, b: &str) -> Option<String> {
    if a == b {
        return Some(a.to_string());
    }
    if is_numeric(a) && is_numeric(b) {
        return Some(widen(a, b).to_string());
    }
    if !is_primitive(a) && !is_primitive(b) {
        return Some("Object".to_string());
    }
    None
}

pub fn is_numeric(ty: &str) -> bool {
    matches!(ty, "int" | "long" | "double" | "float" | "short" | "byte")
}

pub fn is_primitive(ty: &str) -> bool {
    is_numeric(ty) || matches!(ty, "boolean" | "char")
}

fn widen(a: &str, b: &str) -> &'static str {
    let rank = |ty: &str| match ty {
        "byte" => 0,
        "short" => 1,
        "int" => 2,
        "long" => 3,
        "float" => 4,
        _ => 5,
    };
    match rank(a).max(rank(b)) {
        0 => "byte",
        1 => "short",
        2 => "int",
        3 => "long",
        4 => "float",
        _ => "double",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::builder::{assign, bin, ident, int, str_lit, var, CorpusBuilder};

    #[test]
    fn literals_resolve_by_kind() {
        let mut cb = CorpusBuilder::new();
        let decl = cb
            .method("src/A.java", "A", "m")
            .body(vec![var("int", "x", int(1)), assign("y", str_lit("hi"))]);
        let corpus = cb.finish();

        let resolver = CorpusResolver;
        let (_, d) = corpus.decls().next().unwrap();
        let body = corpus.tree().children(d.body).to_vec();
        let init = corpus.tree().children(body[0])[1];
        assert_eq!(
            resolver.resolve(&corpus, decl, init),
            Resolution::Resolved("int".to_string())
        );
        let value = corpus.tree().children(body[1])[1];
        assert_eq!(
            resolver.resolve(&corpus, decl, value),
            Resolution::Resolved("String".to_string())
        );
    }

    #[test]
    fn idents_resolve_through_params_and_locals() {
        let mut cb = CorpusBuilder::new();
        let decl = cb
            .method("src/A.java", "A", "m")
            .param("amount", "long")
            .body(vec![
                var("int", "fee", int(10)),
                assign("total", bin(ident("amount"), "+", ident("fee"))),
            ]);
        let corpus = cb.finish();
        let resolver = CorpusResolver;
        let (_, d) = corpus.decls().next().unwrap();
        let body = corpus.tree().children(d.body).to_vec();
        let sum = corpus.tree().children(body[1])[1];
        // long + int widens to long
        assert_eq!(
            resolver.resolve(&corpus, decl, sum),
            Resolution::Resolved("long".to_string())
        );
    }

    #[test]
    fn unknown_ident_degrades_to_unresolved() {
        let mut cb = CorpusBuilder::new();
        let decl = cb
            .method("src/A.java", "A", "m")
            .body(vec![assign("x", ident("mystery"))]);
        let corpus = cb.finish();
        let (_, d) = corpus.decls().next().unwrap();
        let body = corpus.tree().children(d.body).to_vec();
        let value = corpus.tree().children(body[0])[1];
        assert_eq!(
            CorpusResolver.resolve(&corpus, decl, value),
            Resolution::Unresolved
        );
    }

    #[test]
    fn supertype_table() {
        assert_eq!(common_supertype("int", "int").as_deref(), Some("int"));
        assert_eq!(common_supertype("int", "long").as_deref(), Some("long"));
        assert_eq!(common_supertype("long", "double").as_deref(), Some("double"));
        assert_eq!(
            common_supertype("String", "Account").as_deref(),
            Some("Object")
        );
        assert_eq!(common_supertype("int", "String"), None);
        assert_eq!(common_supertype("boolean", "int"), None);
    }
}
