//! The syntax node arena.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable index of a node in the arena.
///
/// Slots are never reused or moved; detached nodes simply become
/// unreachable from their file root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of a literal, used for parameter type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    Int,
    Long,
    Double,
    Bool,
    Str,
    Null,
}

impl LiteralKind {
    /// The source-level type name this literal infers to.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Double => "double",
            Self::Bool => "boolean",
            Self::Str => "String",
            Self::Null => "Object",
        }
    }
}

/// Closed set of node kinds the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Root of one source file; `text` is the normalized path.
    File,
    /// A class declaration; `text` is the class name.
    Class,
    /// A method declaration; `text` is the method name.
    Method,
    /// A constructor declaration; `text` is the class name.
    Constructor,
    /// A statement list.
    Block,
    /// `text` is the variable name; children are `[type-ref]` or
    /// `[type-ref, init-expr]`.
    VarDecl,
    /// A declared type name; `text` is the type.
    TypeRef,
    /// Children are `[target-ident, value-expr]`.
    Assign,
    /// A bare expression statement; single child.
    ExprStmt,
    /// Children are `[value-expr]` or empty.
    Return,
    /// Children are `[cond, then-block]` or `[cond, then-block, else-block]`.
    If,
    /// Children are `[cond, body-block]`.
    While,
    /// An identifier use; `text` is the name.
    Ident,
    /// A literal; `text` is the source text.
    Literal(LiteralKind),
    /// A call; `text` is the callee name. An optional leading `Receiver`
    /// child wraps the receiver expression; remaining children are
    /// arguments.
    Call,
    /// Wraps a call receiver expression; single child.
    Receiver,
    /// A binary expression; `text` is the operator, children `[lhs, rhs]`.
    Binary,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Class => "class",
            Self::Method => "method",
            Self::Constructor => "constructor",
            Self::Block => "block",
            Self::VarDecl => "var_decl",
            Self::TypeRef => "type_ref",
            Self::Assign => "assign",
            Self::ExprStmt => "expr_stmt",
            Self::Return => "return",
            Self::If => "if",
            Self::While => "while",
            Self::Ident => "ident",
            Self::Literal(_) => "literal",
            Self::Call => "call",
            Self::Receiver => "receiver",
            Self::Binary => "binary",
        }
    }

    /// Whether nodes of this kind appear as direct children of a `Block`.
    pub fn is_statement(&self) -> bool {
        matches!(
            self,
            Self::VarDecl | Self::Assign | Self::ExprStmt | Self::Return | Self::If | Self::While
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One node in the arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    /// Name, operator, literal text, or path depending on `kind`.
    pub text: String,
    /// 1-based source line; refreshed after every mutation.
    pub line: u32,
    pub children: Vec<NodeId>,
}

/// Arena of syntax nodes with stable indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyntaxTree {
    nodes: Vec<SyntaxNode>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Allocate a node and return its stable id.
    pub fn alloc(&mut self, kind: NodeKind, text: impl Into<String>, children: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SyntaxNode {
            kind,
            text: text.into(),
            line: 0,
            children,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &SyntaxNode {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut SyntaxNode {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.index()].kind
    }

    pub fn text(&self, id: NodeId) -> &str {
        &self.nodes[id.index()].text
    }

    pub fn line(&self, id: NodeId) -> u32 {
        self.nodes[id.index()].line
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// Pre-order traversal of `root`'s subtree, including `root`.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in self.children(id).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// All identifier names read anywhere under `root`.
    pub fn idents_under(&self, root: NodeId) -> Vec<(String, u32)> {
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.kind(id) == NodeKind::Ident)
            .map(|id| (self.text(id).to_string(), self.line(id)))
            .collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_assigns_stable_sequential_ids() {
        let mut tree = SyntaxTree::new();
        let a = tree.alloc(NodeKind::Ident, "x", vec![]);
        let b = tree.alloc(NodeKind::Ident, "y", vec![]);
        assert_eq!(a, NodeId(0));
        assert_eq!(b, NodeId(1));
        assert_eq!(tree.text(a), "x");
        assert_eq!(tree.text(b), "y");
    }

    #[test]
    fn descendants_are_preorder() {
        let mut tree = SyntaxTree::new();
        let x = tree.alloc(NodeKind::Ident, "x", vec![]);
        let one = tree.alloc(NodeKind::Literal(LiteralKind::Int), "1", vec![]);
        let add = tree.alloc(NodeKind::Binary, "+", vec![x, one]);
        let stmt = tree.alloc(NodeKind::ExprStmt, "", vec![add]);
        assert_eq!(tree.descendants(stmt), vec![stmt, add, x, one]);
    }

    #[test]
    fn idents_under_finds_nested_names() {
        let mut tree = SyntaxTree::new();
        let x = tree.alloc(NodeKind::Ident, "x", vec![]);
        let recv = tree.alloc(NodeKind::Receiver, "", vec![x]);
        let y = tree.alloc(NodeKind::Ident, "y", vec![]);
        let call = tree.alloc(NodeKind::Call, "deposit", vec![recv, y]);
        let names: Vec<String> = tree
            .idents_under(call)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["x", "y"]);
    }
}
