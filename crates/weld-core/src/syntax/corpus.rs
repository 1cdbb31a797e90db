//! The corpus: one arena, its declarations, and rendered per-file sources.
//!
//! Rendering is deterministic and doubles as line numbering: every refresh
//! re-renders a file and stamps each node with its current 1-based line.
//! Downstream liveness analysis reasons about "before/after the region" in
//! terms of these lines, so a refresh must follow every mutation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::collections::{FxHashMap, FxHashSet};

use super::tree::{NodeId, NodeKind, SyntaxNode, SyntaxTree};

/// Stable index of a declaration in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What flavor of declaration a body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    Method,
    Constructor,
}

/// A formal parameter of a declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

/// A method or constructor known to the corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    pub class_name: String,
    /// Normalized source file path.
    pub file: String,
    /// The `Method`/`Constructor` node.
    pub node: NodeId,
    pub class_node: NodeId,
    /// The body `Block` node.
    pub body: NodeId,
    pub start_line: u32,
    pub end_line: u32,
    pub is_test: bool,
    pub is_setup: bool,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
}

/// One arena plus declarations and rendered sources for a set of files.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    tree: SyntaxTree,
    /// File roots ordered by path.
    file_roots: Vec<NodeId>,
    decls: Vec<Declaration>,
    decl_by_node: FxHashMap<NodeId, DeclId>,
    sources: FxHashMap<String, String>,
}

impl Corpus {
    pub(super) fn from_parts(
        tree: SyntaxTree,
        file_roots: Vec<NodeId>,
        decls: Vec<Declaration>,
    ) -> Self {
        let decl_by_node = decls
            .iter()
            .enumerate()
            .map(|(i, d)| (d.node, DeclId(i as u32)))
            .collect();
        let mut corpus = Self {
            tree,
            file_roots,
            decls,
            decl_by_node,
            sources: FxHashMap::default(),
        };
        corpus.refresh_all();
        corpus
    }

    pub fn tree(&self) -> &SyntaxTree {
        &self.tree
    }

    /// All declarations with their ids, in insertion order.
    pub fn decls(&self) -> impl Iterator<Item = (DeclId, &Declaration)> {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, d)| (DeclId(i as u32), d))
    }

    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    pub fn decl_by_node(&self, node: NodeId) -> Option<DeclId> {
        self.decl_by_node.get(&node).copied()
    }

    /// Best-effort global name lookup used for collision checks.
    pub fn declarations_by_name(&self, name: &str) -> Vec<DeclId> {
        self.decls()
            .filter(|(_, d)| d.name == name)
            .map(|(id, _)| id)
            .collect()
    }

    /// Normalized paths of every file in the corpus, ordered.
    pub fn files(&self) -> Vec<&str> {
        self.file_roots
            .iter()
            .map(|&root| self.tree.text(root))
            .collect()
    }

    pub fn file_root(&self, path: &str) -> Option<NodeId> {
        self.file_roots
            .iter()
            .copied()
            .find(|&root| self.tree.text(root) == path)
    }

    /// The rendered source of `path`, current as of the last refresh.
    pub fn source(&self, path: &str) -> Option<&str> {
        self.sources.get(path).map(String::as_str)
    }

    /// Begin a mutation. The editor is the only mutation capability; it is
    /// meant to be created by the refactoring orchestrator during APPLY and
    /// dropped before the next cluster is considered.
    pub fn edit(&mut self) -> CorpusEditor<'_> {
        CorpusEditor {
            corpus: self,
            touched: FxHashSet::default(),
        }
    }

    /// Re-render and renumber every file.
    pub fn refresh_all(&mut self) {
        for root in self.file_roots.clone() {
            self.refresh_file_root(root);
        }
    }

    fn refresh_file_root(&mut self, root: NodeId) {
        let path = self.tree.text(root).to_string();
        let mut out: Vec<String> = Vec::new();
        self.tree.node_mut(root).line = 1;
        for class in self.tree.children(root).to_vec() {
            let class_name = self.tree.text(class).to_string();
            out.push(format!("class {} {{", class_name));
            self.tree.node_mut(class).line = out.len() as u32;
            for member in self.tree.children(class).to_vec() {
                let decl_id = match self.decl_by_node(member) {
                    Some(id) => id,
                    None => continue,
                };
                let signature = render_signature(&self.decls[decl_id.index()]);
                out.push(format!("    {}", signature));
                let start = out.len() as u32;
                self.tree.node_mut(member).line = start;
                let body = self.decls[decl_id.index()].body;
                self.tree.node_mut(body).line = start;
                for stmt in self.tree.children(body).to_vec() {
                    render_stmt(&mut self.tree, stmt, 2, &mut out);
                }
                out.push("    }".to_string());
                let end = out.len() as u32;
                let decl = &mut self.decls[decl_id.index()];
                decl.start_line = start;
                decl.end_line = end;
            }
            out.push("}".to_string());
        }
        let mut text = out.join("\n");
        text.push('\n');
        self.sources.insert(path, text);
    }
}

fn render_signature(decl: &Declaration) -> String {
    let params = decl
        .params
        .iter()
        .map(|p| format!("{} {}", p.ty, p.name))
        .collect::<Vec<_>>()
        .join(", ");
    match decl.kind {
        DeclKind::Constructor => format!("{}({}) {{", decl.name, params),
        DeclKind::Method => {
            let ret = decl.return_type.as_deref().unwrap_or("void");
            format!("{} {}({}) {{", ret, decl.name, params)
        }
    }
}

/// Render one statement, stamping it and its expression subtrees with the
/// lines they land on.
fn render_stmt(tree: &mut SyntaxTree, id: NodeId, depth: usize, out: &mut Vec<String>) {
    let pad = "    ".repeat(depth);
    let kind = tree.kind(id);
    let children = tree.children(id).to_vec();
    match kind {
        NodeKind::VarDecl => {
            let name = tree.text(id).to_string();
            let ty = tree.text(children[0]).to_string();
            let line = match children.get(1) {
                Some(&init) => format!("{pad}{ty} {name} = {};", render_expr(tree, init)),
                None => format!("{pad}{ty} {name};"),
            };
            out.push(line);
            stamp(tree, id, out.len() as u32);
        }
        NodeKind::Assign => {
            let target = render_expr(tree, children[0]);
            let value = render_expr(tree, children[1]);
            out.push(format!("{pad}{target} = {value};"));
            stamp(tree, id, out.len() as u32);
        }
        NodeKind::ExprStmt => {
            let expr = render_expr(tree, children[0]);
            out.push(format!("{pad}{expr};"));
            stamp(tree, id, out.len() as u32);
        }
        NodeKind::Return => {
            let line = match children.first() {
                Some(&value) => format!("{pad}return {};", render_expr(tree, value)),
                None => format!("{pad}return;"),
            };
            out.push(line);
            stamp(tree, id, out.len() as u32);
        }
        NodeKind::If => {
            let cond = render_expr(tree, children[0]);
            out.push(format!("{pad}if ({cond}) {{"));
            let header = out.len() as u32;
            tree.node_mut(id).line = header;
            stamp(tree, children[0], header);
            render_block(tree, children[1], depth + 1, out);
            if let Some(&els) = children.get(2) {
                out.push(format!("{pad}}} else {{"));
                render_block(tree, els, depth + 1, out);
            }
            out.push(format!("{pad}}}"));
        }
        NodeKind::While => {
            let cond = render_expr(tree, children[0]);
            out.push(format!("{pad}while ({cond}) {{"));
            let header = out.len() as u32;
            tree.node_mut(id).line = header;
            stamp(tree, children[0], header);
            render_block(tree, children[1], depth + 1, out);
            out.push(format!("{pad}}}"));
        }
        other => {
            // Non-statement node in statement position; render as bare text.
            tracing::warn!(kind = %other, "unexpected node in statement position");
            out.push(format!("{pad}{};", tree.text(id)));
            stamp(tree, id, out.len() as u32);
        }
    }
}

fn render_block(tree: &mut SyntaxTree, block: NodeId, depth: usize, out: &mut Vec<String>) {
    tree.node_mut(block).line = out.len() as u32;
    for stmt in tree.children(block).to_vec() {
        render_stmt(tree, stmt, depth, out);
    }
}

/// Stamp `id` and every expression descendant with `line`.
fn stamp(tree: &mut SyntaxTree, id: NodeId, line: u32) {
    for node in tree.descendants(id) {
        if !tree.kind(node).is_statement() || node == id {
            tree.node_mut(node).line = line;
        }
    }
}

fn render_expr(tree: &SyntaxTree, id: NodeId) -> String {
    match tree.kind(id) {
        NodeKind::Ident | NodeKind::Literal(_) | NodeKind::TypeRef => tree.text(id).to_string(),
        NodeKind::Call => {
            let children = tree.children(id);
            let (receiver, args) = match children.first() {
                Some(&first) if tree.kind(first) == NodeKind::Receiver => {
                    let inner = tree.children(first)[0];
                    (Some(render_expr(tree, inner)), &children[1..])
                }
                _ => (None, children),
            };
            let rendered_args = args
                .iter()
                .map(|&a| render_expr(tree, a))
                .collect::<Vec<_>>()
                .join(", ");
            match receiver {
                Some(recv) => format!("{recv}.{}({rendered_args})", tree.text(id)),
                None => format!("{}({rendered_args})", tree.text(id)),
            }
        }
        NodeKind::Binary => {
            let children = tree.children(id);
            format!(
                "{} {} {}",
                render_expr(tree, children[0]),
                tree.text(id),
                render_expr(tree, children[1])
            )
        }
        NodeKind::Receiver => render_expr(tree, tree.children(id)[0]),
        other => {
            tracing::warn!(kind = %other, "unexpected node in expression position");
            tree.text(id).to_string()
        }
    }
}

/// The single mutation capability over a [`Corpus`].
///
/// Tracks which files it touched so the orchestrator can refresh and
/// backup exactly those.
pub struct CorpusEditor<'a> {
    corpus: &'a mut Corpus,
    touched: FxHashSet<String>,
}

impl<'a> CorpusEditor<'a> {
    /// Allocate a fresh node.
    pub fn alloc(&mut self, kind: NodeKind, text: impl Into<String>, children: Vec<NodeId>) -> NodeId {
        self.corpus.tree.alloc(kind, text, children)
    }

    /// Deep-copy `node`'s subtree into fresh arena slots.
    pub fn clone_subtree(&mut self, node: NodeId) -> NodeId {
        let SyntaxNode {
            kind,
            text,
            line,
            children,
        } = self.corpus.tree.node(node).clone();
        let copied: Vec<NodeId> = children
            .into_iter()
            .map(|child| self.clone_subtree(child))
            .collect();
        let id = self.corpus.tree.alloc(kind, text, copied);
        self.corpus.tree.node_mut(id).line = line;
        id
    }

    /// Add a new declaration to `class_node` and register it.
    #[allow(clippy::too_many_arguments)]
    pub fn add_method(
        &mut self,
        class_node: NodeId,
        name: &str,
        kind: DeclKind,
        params: Vec<Param>,
        return_type: Option<String>,
        body_stmts: Vec<NodeId>,
        is_test: bool,
    ) -> DeclId {
        let body = self.corpus.tree.alloc(NodeKind::Block, "", body_stmts);
        let node_kind = match kind {
            DeclKind::Method => NodeKind::Method,
            DeclKind::Constructor => NodeKind::Constructor,
        };
        let node = self.corpus.tree.alloc(node_kind, name, vec![body]);
        self.corpus.tree.node_mut(class_node).children.push(node);

        let class_name = self.corpus.tree.text(class_node).to_string();
        let file = self.file_of_class(class_node);
        self.touched.insert(file.clone());

        let id = DeclId(self.corpus.decls.len() as u32);
        self.corpus.decls.push(Declaration {
            name: name.to_string(),
            kind,
            class_name,
            file,
            node,
            class_node,
            body,
            start_line: 0,
            end_line: 0,
            is_test,
            is_setup: false,
            params,
            return_type,
        });
        self.corpus.decl_by_node.insert(node, id);
        id
    }

    /// Splice `replacement` over `count` statements starting at `offset`
    /// in `decl`'s body.
    pub fn replace_statements(
        &mut self,
        decl: DeclId,
        offset: usize,
        count: usize,
        replacement: Vec<NodeId>,
    ) {
        let (body, file) = {
            let d = &self.corpus.decls[decl.index()];
            (d.body, d.file.clone())
        };
        let children = &mut self.corpus.tree.node_mut(body).children;
        children.splice(offset..offset + count, replacement);
        self.touched.insert(file);
    }

    /// Read access while editing.
    pub fn corpus(&self) -> &Corpus {
        self.corpus
    }

    /// Refresh every touched file and report them, sorted.
    pub fn finish(self) -> Vec<String> {
        let mut touched: Vec<String> = self.touched.into_iter().collect();
        touched.sort();
        for path in &touched {
            if let Some(root) = self.corpus.file_root(path) {
                self.corpus.refresh_file_root(root);
            }
        }
        touched
    }

    fn file_of_class(&self, class_node: NodeId) -> String {
        for &root in &self.corpus.file_roots {
            if self.corpus.tree.children(root).contains(&class_node) {
                return self.corpus.tree.text(root).to_string();
            }
        }
        String::new()
    }
}
