//! The closed set of refactoring strategies and their application.
//!
//! Every strategy shares one mechanical core: build a helper from the
//! primary region with varying values substituted by parameters, then
//! collapse each member region to a single call. The strategies differ in
//! what the members are (methods, constructors, tests, setup hooks) and
//! where the helper conceptually lands; application is rejected before any
//! mutation if a call-site argument cannot be constructed, so a failed
//! apply never leaves a partially-edited corpus.

use std::fmt;

use serde::Serialize;

use weld_analysis::types::{DuplicateCluster, DuplicationReport, RegionIdx};
use weld_core::errors::RejectReason;
use weld_core::syntax::corpus::Param;
use weld_core::syntax::{Corpus, CorpusEditor, DeclKind, NodeId, NodeKind};
use weld_core::types::collections::FxHashMap;

use crate::recommend::{ParamSource, RefactoringRecommendation};
use crate::safety::ReturnPlan;

/// The refactoring shapes the engine knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefactoringStrategy {
    /// Extract a private helper within one class.
    HelperMethod,
    /// Collapse overlapping constructors onto one shared initializer.
    ConstructorDelegation,
    /// Hoist a helper for members spread across classes.
    SharedBase,
    /// Merge literal-only test variants into one parameterized scenario.
    ParameterizedTest,
    /// Share duplicated test fixture setup.
    SharedSetup,
}

impl RefactoringStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HelperMethod => "helper-method",
            Self::ConstructorDelegation => "constructor-delegation",
            Self::SharedBase => "shared-base",
            Self::ParameterizedTest => "parameterized-test",
            Self::SharedSetup => "shared-setup",
        }
    }

    /// Application order across clusters; higher goes first.
    pub fn priority(&self) -> u8 {
        match self {
            Self::ParameterizedTest => 5,
            Self::ConstructorDelegation => 4,
            Self::SharedSetup => 3,
            Self::HelperMethod => 2,
            Self::SharedBase => 1,
        }
    }
}

impl fmt::Display for RefactoringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One call-site argument, planned before any mutation.
enum ArgTemplate {
    /// Pass an in-scope variable by name.
    Name(String),
    /// Clone this member's value subtree.
    Value(NodeId),
}

/// Apply `rec` to every member of `cluster`, returning the touched files.
///
/// All argument lookups happen up front; the corpus is only mutated once
/// construction is known to succeed.
pub fn apply(
    corpus: &mut Corpus,
    report: &DuplicationReport,
    cluster: &DuplicateCluster,
    rec: &RefactoringRecommendation,
) -> Result<Vec<String>, RejectReason> {
    let call_plans = plan_call_sites(corpus, report, cluster, rec)?;

    let primary_region = report.region(cluster.primary);
    let primary_decl = corpus.decl(primary_region.decl);
    let class_node = primary_decl.class_node;
    let params: Vec<Param> = rec
        .params
        .iter()
        .map(|p| Param {
            name: p.name.clone(),
            ty: p.ty.clone(),
        })
        .collect();
    let return_type = match &rec.ret {
        ReturnPlan::Void => None,
        ReturnPlan::LiveOut { ty, .. } | ReturnPlan::Explicit { ty } => Some(ty.clone()),
    };

    let mut subst: FxHashMap<NodeId, String> = FxHashMap::default();
    for param in &rec.params {
        if let ParamSource::SlotVariation { primary_node, .. } = param.source {
            subst.insert(primary_node, param.name.clone());
        }
    }

    let mut editor = corpus.edit();

    let mut body: Vec<NodeId> = primary_region
        .stmts
        .clone()
        .into_iter()
        .map(|stmt| clone_with_substitution(&mut editor, stmt, &subst))
        .collect();
    if let ReturnPlan::LiveOut { name, .. } = &rec.ret {
        let value = editor.alloc(NodeKind::Ident, name.clone(), vec![]);
        body.push(editor.alloc(NodeKind::Return, "", vec![value]));
    }

    editor.add_method(
        class_node,
        &rec.name,
        DeclKind::Method,
        params,
        return_type,
        body,
        false,
    );

    // Higher offsets first so earlier offsets in the same body stay valid.
    let mut plans = call_plans;
    plans.sort_by(|a, b| b.offset.cmp(&a.offset));
    for plan in plans {
        let args: Vec<NodeId> = plan
            .args
            .into_iter()
            .map(|arg| match arg {
                ArgTemplate::Name(name) => editor.alloc(NodeKind::Ident, name, vec![]),
                ArgTemplate::Value(node) => editor.clone_subtree(node),
            })
            .collect();
        let call = editor.alloc(NodeKind::Call, rec.name.clone(), args);
        let stmt = match &rec.ret {
            ReturnPlan::Void => editor.alloc(NodeKind::ExprStmt, "", vec![call]),
            ReturnPlan::Explicit { .. } => editor.alloc(NodeKind::Return, "", vec![call]),
            ReturnPlan::LiveOut { name, ty } => {
                let ty_node = editor.alloc(NodeKind::TypeRef, ty.clone(), vec![]);
                editor.alloc(NodeKind::VarDecl, name.clone(), vec![ty_node, call])
            }
        };
        editor.replace_statements(plan.decl, plan.offset, plan.count, vec![stmt]);
    }

    let touched = editor.finish();
    tracing::info!(
        strategy = rec.strategy.name(),
        helper = %rec.name,
        members = cluster.members.len(),
        files = touched.len(),
        "applied refactoring"
    );
    Ok(touched)
}

struct CallPlan {
    decl: weld_core::syntax::DeclId,
    offset: usize,
    count: usize,
    args: Vec<ArgTemplate>,
}

/// Resolve every member's call-site arguments, or fail before mutating.
fn plan_call_sites(
    corpus: &Corpus,
    report: &DuplicationReport,
    cluster: &DuplicateCluster,
    rec: &RefactoringRecommendation,
) -> Result<Vec<CallPlan>, RejectReason> {
    let mut plans = Vec::with_capacity(cluster.members.len());
    for &member in &cluster.members {
        let region = report.region(member);
        let mut args = Vec::with_capacity(rec.params.len());
        for param in &rec.params {
            args.push(member_argument(corpus, cluster, member, param)?);
        }
        plans.push(CallPlan {
            decl: region.decl,
            offset: region.offset,
            count: region.len(),
            args,
        });
    }
    Ok(plans)
}

fn member_argument(
    corpus: &Corpus,
    cluster: &DuplicateCluster,
    member: RegionIdx,
    param: &crate::recommend::ParameterSpec,
) -> Result<ArgTemplate, RejectReason> {
    match param.source {
        ParamSource::OuterRead => Ok(ArgTemplate::Name(param.name.clone())),
        ParamSource::SlotVariation {
            position,
            slot,
            primary_node,
        } => {
            if member == cluster.primary {
                return Ok(ArgTemplate::Value(primary_node));
            }
            let pair = cluster.match_with_primary(member).ok_or_else(|| {
                RejectReason::ConstructionFailed {
                    message: format!("member {member} has no direct match with the primary"),
                }
            })?;
            let primary_is_left = pair.left == cluster.primary;
            let variation = pair
                .result
                .variations
                .slot_variations()
                .find(|v| v.position == position && v.slot == Some(slot));
            match variation {
                // This member agrees with the primary at the slot.
                None => Ok(ArgTemplate::Value(primary_node)),
                Some(v) => {
                    let node = if primary_is_left { v.right_node } else { v.left_node };
                    match node {
                        Some(node) if corpus.tree().kind(node) != NodeKind::VarDecl => {
                            Ok(ArgTemplate::Value(node))
                        }
                        _ => Err(RejectReason::ConstructionFailed {
                            message: format!(
                                "no argument value for parameter `{}` in member {member}",
                                param.name
                            ),
                        }),
                    }
                }
            }
        }
    }
}

/// Deep-copy a subtree, swapping substituted nodes for parameter reads.
fn clone_with_substitution(
    editor: &mut CorpusEditor<'_>,
    node: NodeId,
    subst: &FxHashMap<NodeId, String>,
) -> NodeId {
    if let Some(name) = subst.get(&node) {
        return editor.alloc(NodeKind::Ident, name.clone(), vec![]);
    }
    let (kind, text, children) = {
        let tree = editor.corpus().tree();
        (
            tree.kind(node),
            tree.text(node).to_string(),
            tree.children(node).to_vec(),
        )
    };
    let copied: Vec<NodeId> = children
        .into_iter()
        .map(|child| clone_with_substitution(editor, child, subst))
        .collect();
    editor.alloc(kind, text, copied)
}
