//! Fluent construction of a [`Corpus`] from statement and expression values.
//!
//! The extraction collaborator feeds the engine a parsed corpus; this
//! builder is the in-crate stand-in for that boundary and the backbone of
//! every test fixture.

use crate::types::collections::FxHashMap;

use super::corpus::{Corpus, DeclId, DeclKind, Declaration, Param};
use super::tree::{LiteralKind, NodeId, NodeKind, SyntaxTree};

/// An expression value, lowered into arena nodes on build.
#[derive(Debug, Clone)]
pub enum Expr {
    Ident(String),
    Literal(LiteralKind, String),
    Call {
        receiver: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
    },
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// A statement value, lowered into arena nodes on build.
#[derive(Debug, Clone)]
pub enum Stmt {
    VarDecl {
        ty: String,
        name: String,
        init: Option<Expr>,
    },
    Assign {
        target: String,
        value: Expr,
    },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        els: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
}

pub fn ident(name: &str) -> Expr {
    Expr::Ident(name.to_string())
}

pub fn int(value: i64) -> Expr {
    Expr::Literal(LiteralKind::Int, value.to_string())
}

pub fn long(value: i64) -> Expr {
    Expr::Literal(LiteralKind::Long, format!("{value}L"))
}

pub fn double(text: &str) -> Expr {
    Expr::Literal(LiteralKind::Double, text.to_string())
}

pub fn bool_lit(value: bool) -> Expr {
    Expr::Literal(LiteralKind::Bool, value.to_string())
}

pub fn str_lit(value: &str) -> Expr {
    Expr::Literal(LiteralKind::Str, format!("\"{value}\""))
}

pub fn null() -> Expr {
    Expr::Literal(LiteralKind::Null, "null".to_string())
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        receiver: None,
        name: name.to_string(),
        args,
    }
}

/// A call through a receiver, e.g. `account.deposit(amount)`.
pub fn mcall(receiver: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        receiver: Some(Box::new(receiver)),
        name: name.to_string(),
        args,
    }
}

pub fn bin(lhs: Expr, op: &str, rhs: Expr) -> Expr {
    Expr::Binary {
        op: op.to_string(),
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

pub fn var(ty: &str, name: &str, init: Expr) -> Stmt {
    Stmt::VarDecl {
        ty: ty.to_string(),
        name: name.to_string(),
        init: Some(init),
    }
}

pub fn var_uninit(ty: &str, name: &str) -> Stmt {
    Stmt::VarDecl {
        ty: ty.to_string(),
        name: name.to_string(),
        init: None,
    }
}

pub fn assign(target: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        target: target.to_string(),
        value,
    }
}

pub fn expr(e: Expr) -> Stmt {
    Stmt::Expr(e)
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return(Some(value))
}

pub fn ret_void() -> Stmt {
    Stmt::Return(None)
}

pub fn if_stmt(cond: Expr, then: Vec<Stmt>) -> Stmt {
    Stmt::If {
        cond,
        then,
        els: Vec::new(),
    }
}

pub fn if_else(cond: Expr, then: Vec<Stmt>, els: Vec<Stmt>) -> Stmt {
    Stmt::If { cond, then, els }
}

pub fn while_stmt(cond: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While { cond, body }
}

/// Builds a corpus file by file, class by class.
#[derive(Default)]
pub struct CorpusBuilder {
    tree: SyntaxTree,
    file_roots: Vec<NodeId>,
    classes: FxHashMap<(String, String), NodeId>,
    decls: Vec<Declaration>,
}

impl CorpusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a method declaration in `class` inside `file`.
    pub fn method<'a>(&'a mut self, file: &str, class: &str, name: &str) -> MethodBuilder<'a> {
        self.declaration(file, class, name, DeclKind::Method)
    }

    /// Start a constructor declaration for `class` inside `file`.
    pub fn constructor<'a>(&'a mut self, file: &str, class: &str) -> MethodBuilder<'a> {
        self.declaration(file, class, class, DeclKind::Constructor)
    }

    fn declaration<'a>(
        &'a mut self,
        file: &str,
        class: &str,
        name: &str,
        kind: DeclKind,
    ) -> MethodBuilder<'a> {
        MethodBuilder {
            builder: self,
            file: file.to_string(),
            class: class.to_string(),
            name: name.to_string(),
            kind,
            params: Vec::new(),
            return_type: None,
            is_test: false,
            is_setup: false,
        }
    }

    /// Finish building: render every file and number every node.
    pub fn finish(self) -> Corpus {
        Corpus::from_parts(self.tree, self.file_roots, self.decls)
    }

    fn class_node(&mut self, file: &str, class: &str) -> NodeId {
        let key = (file.to_string(), class.to_string());
        if let Some(&node) = self.classes.get(&key) {
            return node;
        }
        let file_root = match self
            .file_roots
            .iter()
            .copied()
            .find(|&root| self.tree.text(root) == file)
        {
            Some(root) => root,
            None => {
                let root = self.tree.alloc(NodeKind::File, file, vec![]);
                self.file_roots.push(root);
                root
            }
        };
        let class_node = self.tree.alloc(NodeKind::Class, class, vec![]);
        self.tree.node_mut(file_root).children.push(class_node);
        self.classes.insert(key, class_node);
        class_node
    }

    fn lower_expr(&mut self, expr: &Expr) -> NodeId {
        match expr {
            Expr::Ident(name) => self.tree.alloc(NodeKind::Ident, name.clone(), vec![]),
            Expr::Literal(kind, text) => {
                self.tree.alloc(NodeKind::Literal(*kind), text.clone(), vec![])
            }
            Expr::Call {
                receiver,
                name,
                args,
            } => {
                let mut children = Vec::new();
                if let Some(recv) = receiver {
                    let inner = self.lower_expr(recv);
                    let wrapper = self.tree.alloc(NodeKind::Receiver, "", vec![inner]);
                    children.push(wrapper);
                }
                for arg in args {
                    children.push(self.lower_expr(arg));
                }
                self.tree.alloc(NodeKind::Call, name.clone(), children)
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expr(lhs);
                let rhs = self.lower_expr(rhs);
                self.tree.alloc(NodeKind::Binary, op.clone(), vec![lhs, rhs])
            }
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> NodeId {
        match stmt {
            Stmt::VarDecl { ty, name, init } => {
                let ty_node = self.tree.alloc(NodeKind::TypeRef, ty.clone(), vec![]);
                let mut children = vec![ty_node];
                if let Some(init) = init {
                    children.push(self.lower_expr(init));
                }
                self.tree.alloc(NodeKind::VarDecl, name.clone(), children)
            }
            Stmt::Assign { target, value } => {
                let target = self.tree.alloc(NodeKind::Ident, target.clone(), vec![]);
                let value = self.lower_expr(value);
                self.tree.alloc(NodeKind::Assign, "", vec![target, value])
            }
            Stmt::Expr(e) => {
                let inner = self.lower_expr(e);
                self.tree.alloc(NodeKind::ExprStmt, "", vec![inner])
            }
            Stmt::Return(value) => {
                let children = match value {
                    Some(v) => vec![self.lower_expr(v)],
                    None => vec![],
                };
                self.tree.alloc(NodeKind::Return, "", children)
            }
            Stmt::If { cond, then, els } => {
                let cond = self.lower_expr(cond);
                let then_block = self.lower_block(then);
                let mut children = vec![cond, then_block];
                if !els.is_empty() {
                    children.push(self.lower_block(els));
                }
                self.tree.alloc(NodeKind::If, "", children)
            }
            Stmt::While { cond, body } => {
                let cond = self.lower_expr(cond);
                let block = self.lower_block(body);
                self.tree.alloc(NodeKind::While, "", vec![cond, block])
            }
        }
    }

    fn lower_block(&mut self, stmts: &[Stmt]) -> NodeId {
        let children: Vec<NodeId> = stmts.iter().map(|s| self.lower_stmt(s)).collect();
        self.tree.alloc(NodeKind::Block, "", children)
    }
}

/// In-flight declaration; consumed by [`MethodBuilder::body`].
pub struct MethodBuilder<'a> {
    builder: &'a mut CorpusBuilder,
    file: String,
    class: String,
    name: String,
    kind: DeclKind,
    params: Vec<Param>,
    return_type: Option<String>,
    is_test: bool,
    is_setup: bool,
}

impl<'a> MethodBuilder<'a> {
    pub fn param(mut self, name: &str, ty: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            ty: ty.to_string(),
        });
        self
    }

    pub fn returns(mut self, ty: &str) -> Self {
        self.return_type = Some(ty.to_string());
        self
    }

    /// Mark as a test method (e.g. carries a test annotation).
    pub fn test(mut self) -> Self {
        self.is_test = true;
        self
    }

    /// Mark as a test-setup method (e.g. a before-each hook).
    pub fn setup(mut self) -> Self {
        self.is_setup = true;
        self
    }

    /// Attach the body and register the declaration.
    pub fn body(self, stmts: Vec<Stmt>) -> DeclId {
        let class_node = self.builder.class_node(&self.file, &self.class);
        let body = self.builder.lower_block(&stmts);
        let node_kind = match self.kind {
            DeclKind::Method => NodeKind::Method,
            DeclKind::Constructor => NodeKind::Constructor,
        };
        let node = self
            .builder
            .tree
            .alloc(node_kind, self.name.clone(), vec![body]);
        self.builder.tree.node_mut(class_node).children.push(node);

        let id = DeclId(self.builder.decls.len() as u32);
        self.builder.decls.push(Declaration {
            name: self.name,
            kind: self.kind,
            class_name: self.class,
            file: self.file,
            node,
            class_node,
            body,
            start_line: 0,
            end_line: 0,
            is_test: self.is_test,
            is_setup: self.is_setup,
            params: self.params,
            return_type: self.return_type,
        });
        id
    }
}
