//! Cluster safety analysis: can these regions be merged without changing
//! behavior?
//!
//! Produces an [`ExtractionPlan`] — parameters, return wiring, warnings —
//! or the first [`RejectReason`] found. Checks run in a fixed order so a
//! cluster always rejects for the same reason: nested returns, outer
//! writes, statement-granularity differences, parameter typing, then
//! return-value selection.

use serde::Serialize;

use weld_analysis::types::{DuplicateCluster, DuplicationReport};
use weld_core::errors::RejectReason;
use weld_core::region::CodeRegion;
use weld_core::resolve::{common_supertype, TypeResolver};
use weld_core::syntax::{Corpus, NodeId, NodeKind};
use weld_core::types::collections::FxHashMap;

use crate::escape::{analyze_region, EscapeAnalysis};
use crate::recommend::{ParamSource, ParameterSpec};

/// How the extracted helper returns a value to its call sites.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReturnPlan {
    /// Nothing escapes; the helper is void.
    Void,
    /// One live-out variable is declared at each call site from the
    /// helper's return value.
    LiveOut { name: String, ty: String },
    /// The region ends in a top-level `return`; call sites become
    /// `return helper(...)`.
    Explicit { ty: String },
}

/// Everything the strategy layer needs to build the helper.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionPlan {
    /// Helper parameters in declaration order: slot variations first,
    /// then outer-read captures by first use.
    pub params: Vec<ParameterSpec>,
    pub ret: ReturnPlan,
    /// Non-fatal findings, surfaced on the session.
    pub warnings: Vec<String>,
    /// Parameters whose type degraded to `Object`; each one costs
    /// recommendation confidence.
    pub type_fallbacks: usize,
}

/// Plans extractions for clusters against one corpus.
pub struct SafetyAnalyzer<'a, R: TypeResolver> {
    corpus: &'a Corpus,
    resolver: &'a R,
}

impl<'a, R: TypeResolver> SafetyAnalyzer<'a, R> {
    pub fn new(corpus: &'a Corpus, resolver: &'a R) -> Self {
        Self { corpus, resolver }
    }

    /// Validate `cluster` and plan its extraction.
    pub fn plan(
        &self,
        report: &DuplicationReport,
        cluster: &DuplicateCluster,
    ) -> Result<ExtractionPlan, RejectReason> {
        let mut warnings = Vec::new();
        let mut type_fallbacks = 0usize;

        // Every member must satisfy the hard preconditions, not just the
        // primary; the helper body replaces all of them.
        let mut analyses: Vec<(usize, EscapeAnalysis)> = Vec::new();
        for &member in &cluster.members {
            let region = report.region(member);
            if let Some(line) = self.nested_return_line(region) {
                return Err(RejectReason::NestedReturn { line });
            }
            let analysis = analyze_region(self.corpus, region);
            if let Some(name) = analysis.writes.first() {
                return Err(RejectReason::OuterWrite { name: name.clone() });
            }
            analyses.push((member, analysis));
        }

        for &member in &cluster.members {
            if member == cluster.primary {
                continue;
            }
            let pair = cluster.match_with_primary(member).ok_or_else(|| {
                RejectReason::ConstructionFailed {
                    message: format!(
                        "member {} has no direct match with the cluster primary",
                        member
                    ),
                }
            })?;
            if let Some(variation) = pair.result.variations.statement_variations().next() {
                return Err(RejectReason::NoStrategy {
                    message: format!(
                        "members differ at statement granularity: `{}` vs `{}`",
                        variation.left, variation.right
                    ),
                });
            }
        }

        let primary = report.region(cluster.primary);
        let mut params = self.plan_slot_params(
            report,
            cluster,
            &mut warnings,
            &mut type_fallbacks,
        )?;
        let slot_names: Vec<String> = params
            .iter()
            .flat_map(|p| p.example_values.iter().cloned())
            .collect();

        // Outer reads become pass-through captures unless the same value
        // already varies slot-wise (the slot parameter then carries it).
        let primary_analysis = analyses
            .iter()
            .find(|(member, _)| *member == cluster.primary)
            .map(|(_, a)| a.clone())
            .unwrap_or_default();
        for (name, line) in &primary_analysis.reads {
            if slot_names.iter().any(|value| value == name) {
                continue;
            }
            let ty = match self.resolve_ident_type(primary, name) {
                Some(ty) => ty,
                None => {
                    warnings.push(format!(
                        "could not resolve the type of `{name}`; passing it as Object"
                    ));
                    type_fallbacks += 1;
                    "Object".to_string()
                }
            };
            params.push(ParameterSpec {
                name: name.clone(),
                ty,
                source: ParamSource::OuterRead,
                example_values: vec![name.clone()],
                first_use_line: *line,
            });
        }

        let ret = self.plan_return(primary, &primary_analysis, &mut warnings)?;

        // Call sites re-declare the live-out under the primary's name, so a
        // member that names it differently would orphan its later reads.
        if let ReturnPlan::LiveOut { name, .. } = &ret {
            for (member, analysis) in &analyses {
                if *member == cluster.primary {
                    continue;
                }
                let candidates = analysis.return_candidates();
                if candidates.len() != 1 || candidates[0].name != *name {
                    return Err(RejectReason::ConstructionFailed {
                        message: format!(
                            "live-out variable `{name}` is named differently in another member"
                        ),
                    });
                }
            }
        }

        Ok(ExtractionPlan {
            params,
            ret,
            warnings,
            type_fallbacks,
        })
    }

    /// First `return` nested under a conditional or loop in the region.
    fn nested_return_line(&self, region: &CodeRegion) -> Option<u32> {
        let tree = self.corpus.tree();
        for &stmt in &region.stmts {
            if !matches!(tree.kind(stmt), NodeKind::If | NodeKind::While) {
                continue;
            }
            if let Some(node) = tree
                .descendants(stmt)
                .into_iter()
                .find(|&n| tree.kind(n) == NodeKind::Return)
            {
                return Some(tree.line(node));
            }
        }
        None
    }

    /// One parameter per (statement, slot) position that varies between
    /// the primary and any member, types unified by widening.
    fn plan_slot_params(
        &self,
        report: &DuplicationReport,
        cluster: &DuplicateCluster,
        warnings: &mut Vec<String>,
        type_fallbacks: &mut usize,
    ) -> Result<Vec<ParameterSpec>, RejectReason> {
        let tree = self.corpus.tree();
        let primary_region = report.region(cluster.primary);

        // (position, slot) → (primary node, unified type, per-member values)
        let mut by_slot: FxHashMap<(usize, usize), SlotParam> = FxHashMap::default();
        let mut order: Vec<(usize, usize)> = Vec::new();

        for &member in &cluster.members {
            if member == cluster.primary {
                continue;
            }
            let member_region = report.region(member);
            let pair = match cluster.match_with_primary(member) {
                Some(pair) => pair,
                None => continue, // already rejected above
            };
            let primary_is_left = pair.left == cluster.primary;
            for variation in pair.result.variations.slot_variations() {
                let slot = match variation.slot {
                    Some(slot) => slot,
                    None => continue,
                };
                let key = (variation.position, slot);
                let (primary_node, member_node, primary_value, member_value) = if primary_is_left {
                    (
                        variation.left_node,
                        variation.right_node,
                        &variation.left,
                        &variation.right,
                    )
                } else {
                    (
                        variation.right_node,
                        variation.left_node,
                        &variation.right,
                        &variation.left,
                    )
                };
                let primary_node = match primary_node {
                    Some(node) => node,
                    None => continue,
                };
                // A declared-name slot points at the VarDecl statement
                // itself; renaming a local between members is harmless and
                // the helper keeps the primary's name.
                if tree.kind(primary_node) == NodeKind::VarDecl {
                    continue;
                }

                let member_ty = self.node_type(member_region.decl, member_node);
                let primary_ty = self.node_type(primary_region.decl, Some(primary_node));

                let entry = by_slot.entry(key).or_insert_with(|| {
                    order.push(key);
                    SlotParam {
                        primary_node,
                        ty: primary_ty.clone(),
                        primary_value: primary_value.clone(),
                        member_values: Vec::new(),
                        widened: false,
                    }
                });
                entry.member_values.push(member_value.clone());

                entry.ty = match (&entry.ty, &member_ty) {
                    (Some(a), Some(b)) => match common_supertype(a, b) {
                        Some(ty) => {
                            if ty != *a || ty != *b {
                                entry.widened = true;
                            }
                            Some(ty)
                        }
                        None => {
                            return Err(RejectReason::TypeConflict {
                                position: variation.position,
                                left: a.clone(),
                                right: b.clone(),
                            });
                        }
                    },
                    _ => None,
                };
            }
        }

        let mut params = Vec::with_capacity(order.len());
        for (ordinal, key) in order.iter().enumerate() {
            let slot = &by_slot[key];
            let name = match tree.kind(slot.primary_node) {
                NodeKind::Ident => tree.text(slot.primary_node).to_string(),
                NodeKind::Literal(_) => format!("value{ordinal}"),
                _ => format!("arg{ordinal}"),
            };
            let ty = match &slot.ty {
                Some(ty) => {
                    if slot.widened {
                        warnings.push(format!(
                            "parameter `{name}` widens to `{ty}` across members"
                        ));
                        if ty == "Object" {
                            *type_fallbacks += 1;
                        }
                    }
                    ty.clone()
                }
                None => {
                    warnings.push(format!(
                        "could not resolve a type for parameter `{name}`; passing it as Object"
                    ));
                    *type_fallbacks += 1;
                    "Object".to_string()
                }
            };
            let mut example_values = vec![slot.primary_value.clone()];
            example_values.extend(slot.member_values.iter().cloned());
            params.push(ParameterSpec {
                name,
                ty,
                source: ParamSource::SlotVariation {
                    position: key.0,
                    slot: key.1,
                    primary_node: slot.primary_node,
                },
                example_values,
                first_use_line: tree.line(slot.primary_node),
            });
        }
        Ok(params)
    }

    /// The return ladder: an explicit top-level `return` wins, then a
    /// single live-out, then void. Two or more candidates are ambiguous.
    fn plan_return(
        &self,
        primary: &CodeRegion,
        analysis: &EscapeAnalysis,
        warnings: &mut Vec<String>,
    ) -> Result<ReturnPlan, RejectReason> {
        let tree = self.corpus.tree();
        if let Some(&last) = primary.stmts.last() {
            if tree.kind(last) == NodeKind::Return {
                let decl = self.corpus.decl(primary.decl);
                let ty = match decl.return_type.clone() {
                    Some(ty) => ty,
                    None => {
                        let resolved = tree.children(last).first().and_then(|&value| {
                            self.resolver
                                .resolve(self.corpus, primary.decl, value)
                                .resolved()
                                .map(str::to_string)
                        });
                        match resolved {
                            Some(ty) => ty,
                            None => {
                                warnings.push(
                                    "could not resolve the returned type; using Object".to_string(),
                                );
                                "Object".to_string()
                            }
                        }
                    }
                };
                return Ok(ReturnPlan::Explicit { ty });
            }
        }

        let candidates = analysis.return_candidates();
        match candidates.len() {
            0 => Ok(ReturnPlan::Void),
            1 => Ok(ReturnPlan::LiveOut {
                name: candidates[0].name.clone(),
                ty: candidates[0].ty.clone(),
            }),
            _ => Err(RejectReason::AmbiguousReturn {
                ty: candidates[0].ty.clone(),
                names: candidates.iter().map(|c| c.name.clone()).collect(),
            }),
        }
    }

    fn resolve_ident_type(&self, region: &CodeRegion, name: &str) -> Option<String> {
        let tree = self.corpus.tree();
        let node = region.stmts.iter().find_map(|&stmt| {
            tree.descendants(stmt)
                .into_iter()
                .find(|&n| tree.kind(n) == NodeKind::Ident && tree.text(n) == name)
        })?;
        self.resolver
            .resolve(self.corpus, region.decl, node)
            .resolved()
            .map(str::to_string)
    }

    fn node_type(&self, decl: weld_core::syntax::DeclId, node: Option<NodeId>) -> Option<String> {
        let node = node?;
        self.resolver
            .resolve(self.corpus, decl, node)
            .resolved()
            .map(str::to_string)
    }
}

struct SlotParam {
    primary_node: NodeId,
    ty: Option<String>,
    primary_value: String,
    member_values: Vec<String>,
    widened: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use weld_analysis::analyze;
    use weld_core::config::WeldConfig;
    use weld_core::resolve::{CorpusResolver, NoResolver};
    use weld_core::syntax::builder::{
        assign, bin, call, expr, ident, if_stmt, int, mcall, ret, ret_void, var, while_stmt,
        CorpusBuilder,
    };

    fn plan_first_cluster(
        corpus: &Corpus,
        resolver: &impl TypeResolver,
    ) -> Result<ExtractionPlan, RejectReason> {
        let report = analyze(corpus, &WeldConfig::default());
        assert!(!report.is_empty(), "fixture produced no clusters");
        SafetyAnalyzer::new(corpus, resolver).plan(&report, &report.clusters[0])
    }

    #[test]
    fn nested_return_is_always_rejected() {
        let mut cb = CorpusBuilder::new();
        let body = || {
            vec![
                var("int", "fee", int(10)),
                if_stmt(bin(ident("fee"), ">", int(5)), vec![ret(ident("fee"))]),
                expr(call("log", vec![ident("fee")])),
            ]
        };
        cb.method("src/A.java", "A", "one").returns("int").body(body());
        cb.method("src/B.java", "B", "two").returns("int").body(body());
        let corpus = cb.finish();

        let err = plan_first_cluster(&corpus, &CorpusResolver).unwrap_err();
        assert!(matches!(err, RejectReason::NestedReturn { .. }));
    }

    #[test]
    fn return_nested_in_a_loop_is_rejected() {
        let mut cb = CorpusBuilder::new();
        let body = || {
            vec![
                var("int", "tries", int(0)),
                while_stmt(bin(ident("tries"), "<", int(3)), vec![ret_void()]),
                expr(call("log", vec![ident("tries")])),
            ]
        };
        cb.method("src/A.java", "A", "one").body(body());
        cb.method("src/B.java", "B", "two").body(body());
        let corpus = cb.finish();

        let err = plan_first_cluster(&corpus, &CorpusResolver).unwrap_err();
        assert!(matches!(err, RejectReason::NestedReturn { .. }));
    }

    #[test]
    fn trailing_top_level_return_plans_explicit() {
        let mut cb = CorpusBuilder::new();
        let body = || {
            vec![
                var("int", "fee", bin(ident("amount"), "/", int(10))),
                expr(call("log", vec![ident("fee")])),
                ret(ident("fee")),
            ]
        };
        cb.method("src/A.java", "A", "one")
            .param("amount", "int")
            .returns("int")
            .body(body());
        cb.method("src/B.java", "B", "two")
            .param("amount", "int")
            .returns("int")
            .body(body());
        let corpus = cb.finish();

        let plan = plan_first_cluster(&corpus, &CorpusResolver).unwrap();
        assert_eq!(
            plan.ret,
            ReturnPlan::Explicit {
                ty: "int".to_string()
            }
        );
    }

    #[test]
    fn outer_write_rejects_the_cluster() {
        let mut cb = CorpusBuilder::new();
        // `counter` is never declared locally, so the assignment is a write
        // to an externally-declared variable.
        let body = || {
            vec![
                assign("counter", bin(ident("counter"), "+", int(1))),
                expr(call("log", vec![ident("counter")])),
                expr(call("flush", vec![])),
            ]
        };
        cb.method("src/A.java", "A", "one").body(body());
        cb.method("src/B.java", "B", "two").body(body());
        let corpus = cb.finish();

        let err = plan_first_cluster(&corpus, &CorpusResolver).unwrap_err();
        assert_eq!(
            err,
            RejectReason::OuterWrite {
                name: "counter".to_string()
            }
        );
    }

    #[test]
    fn zero_live_outs_plan_void() {
        let mut cb = CorpusBuilder::new();
        let body = || {
            vec![
                expr(mcall(ident("audit"), "open", vec![])),
                expr(mcall(ident("audit"), "log", vec![ident("event")])),
                expr(mcall(ident("audit"), "close", vec![])),
            ]
        };
        cb.method("src/A.java", "A", "one").param("event", "String").body(body());
        cb.method("src/B.java", "B", "two").param("event", "String").body(body());
        let corpus = cb.finish();

        let plan = plan_first_cluster(&corpus, &CorpusResolver).unwrap();
        assert_eq!(plan.ret, ReturnPlan::Void);
    }

    #[test]
    fn single_live_out_becomes_the_return_value() {
        let mut cb = CorpusBuilder::new();
        // Shared three-statement prefix; the statement after the region
        // differs so the prefix window is the maximal match.
        let prefix = || {
            vec![
                var("int", "total", bin(ident("price"), "*", ident("qty"))),
                expr(call("audit", vec![ident("total")])),
                expr(call("stamp", vec![])),
            ]
        };
        let mut a = prefix();
        a.push(expr(call("ship", vec![ident("total")])));
        let mut b = prefix();
        b.push(assign("out", ident("total")));
        cb.method("src/A.java", "A", "one")
            .param("price", "int")
            .param("qty", "int")
            .body(a);
        cb.method("src/B.java", "B", "two")
            .param("price", "int")
            .param("qty", "int")
            .body(b);
        let corpus = cb.finish();

        let report = analyze(&corpus, &WeldConfig::default());
        let cluster = report
            .clusters
            .iter()
            .find(|c| {
                let region = report.region(c.primary);
                region.offset == 0 && region.len() == 3
            })
            .expect("three-statement prefix window should cluster");
        let plan = SafetyAnalyzer::new(&corpus, &CorpusResolver)
            .plan(&report, cluster)
            .unwrap();
        assert_eq!(
            plan.ret,
            ReturnPlan::LiveOut {
                name: "total".to_string(),
                ty: "int".to_string()
            }
        );
    }

    #[test]
    fn two_live_outs_are_ambiguous() {
        let mut cb = CorpusBuilder::new();
        let body = || {
            vec![
                var("int", "net", bin(ident("amount"), "-", ident("fee"))),
                var("int", "tax", bin(ident("amount"), "/", ident("rate"))),
                expr(call("audit", vec![ident("net")])),
            ]
        };
        // Suffixes differ in statement kind so only the shared prefix
        // window qualifies; both `net` and `tax` are used after it.
        let mut a = body();
        a.push(expr(call("ship", vec![ident("net")])));
        a.push(expr(call("record", vec![ident("tax")])));
        let mut b = body();
        b.push(assign("sink", ident("net")));
        b.push(assign("kept", ident("tax")));
        cb.method("src/A.java", "A", "one")
            .param("amount", "int")
            .param("fee", "int")
            .param("rate", "int")
            .body(a);
        cb.method("src/B.java", "B", "two")
            .param("amount", "int")
            .param("fee", "int")
            .param("rate", "int")
            .body(b);
        let corpus = cb.finish();

        let report = analyze(&corpus, &WeldConfig::default());
        let cluster = report
            .clusters
            .iter()
            .find(|c| {
                let region = report.region(c.primary);
                region.offset == 0 && region.len() == 3
            })
            .expect("three-statement prefix window should cluster");
        let err = SafetyAnalyzer::new(&corpus, &CorpusResolver)
            .plan(&report, cluster)
            .unwrap_err();
        match err {
            RejectReason::AmbiguousReturn { names, .. } => {
                assert!(names.contains(&"net".to_string()));
                assert!(names.contains(&"tax".to_string()));
            }
            other => panic!("expected AmbiguousReturn, got {other:?}"),
        }
    }

    #[test]
    fn literal_slot_variation_becomes_typed_parameter() {
        let mut cb = CorpusBuilder::new();
        let body = |limit: i64| {
            vec![
                var("int", "limit", int(limit)),
                expr(mcall(ident("gate"), "check", vec![ident("limit")])),
                expr(mcall(ident("gate"), "open", vec![])),
            ]
        };
        cb.method("src/A.java", "A", "one").body(body(100));
        cb.method("src/B.java", "B", "two").body(body(250));
        let corpus = cb.finish();

        let plan = plan_first_cluster(&corpus, &CorpusResolver).unwrap();
        let param = plan
            .params
            .iter()
            .find(|p| matches!(p.source, ParamSource::SlotVariation { .. }))
            .expect("slot parameter");
        assert_eq!(param.ty, "int");
        assert_eq!(param.example_values, vec!["100", "250"]);
        // The unresolvable receiver `gate` rides along as an Object capture.
        assert!(plan
            .params
            .iter()
            .any(|p| p.name == "gate" && matches!(p.source, ParamSource::OuterRead)));
        assert_eq!(plan.ret, ReturnPlan::Void);
    }

    #[test]
    fn incompatible_slot_types_are_a_conflict() {
        let mut cb = CorpusBuilder::new();
        cb.method("src/A.java", "A", "one")
            .param("flag", "boolean")
            .body(vec![
                expr(call("save", vec![ident("flag")])),
                expr(call("audit", vec![int(1)])),
                expr(call("close", vec![])),
            ]);
        cb.method("src/B.java", "B", "two")
            .param("count", "int")
            .body(vec![
                expr(call("save", vec![ident("count")])),
                expr(call("audit", vec![int(1)])),
                expr(call("close", vec![])),
            ]);
        let corpus = cb.finish();

        let err = plan_first_cluster(&corpus, &CorpusResolver).unwrap_err();
        assert!(matches!(err, RejectReason::TypeConflict { .. }));
    }

    #[test]
    fn numeric_widening_warns_without_costing_a_fallback() {
        let mut cb = CorpusBuilder::new();
        cb.method("src/A.java", "A", "one")
            .param("count", "int")
            .body(vec![
                expr(call("save", vec![ident("count")])),
                expr(call("audit", vec![int(1)])),
                expr(call("close", vec![])),
            ]);
        cb.method("src/B.java", "B", "two")
            .param("total", "long")
            .body(vec![
                expr(call("save", vec![ident("total")])),
                expr(call("audit", vec![int(1)])),
                expr(call("close", vec![])),
            ]);
        let corpus = cb.finish();

        let plan = plan_first_cluster(&corpus, &CorpusResolver).unwrap();
        let param = plan
            .params
            .iter()
            .find(|p| matches!(p.source, ParamSource::SlotVariation { .. }))
            .expect("slot parameter");
        assert_eq!(param.ty, "long");
        assert!(plan.warnings.iter().any(|w| w.contains("widens to `long`")));
        assert_eq!(plan.type_fallbacks, 0);
    }

    #[test]
    fn reference_widening_to_object_costs_a_fallback() {
        let mut cb = CorpusBuilder::new();
        cb.method("src/A.java", "A", "one")
            .param("label", "String")
            .body(vec![
                expr(call("save", vec![ident("label")])),
                expr(call("audit", vec![int(1)])),
                expr(call("close", vec![])),
            ]);
        cb.method("src/B.java", "B", "two")
            .param("account", "Account")
            .body(vec![
                expr(call("save", vec![ident("account")])),
                expr(call("audit", vec![int(1)])),
                expr(call("close", vec![])),
            ]);
        let corpus = cb.finish();

        let plan = plan_first_cluster(&corpus, &CorpusResolver).unwrap();
        let param = plan
            .params
            .iter()
            .find(|p| matches!(p.source, ParamSource::SlotVariation { .. }))
            .expect("slot parameter");
        assert_eq!(param.ty, "Object");
        assert!(plan
            .warnings
            .iter()
            .any(|w| w.contains("widens to `Object`")));
        assert!(plan.type_fallbacks >= 1);
    }

    #[test]
    fn unresolvable_types_degrade_to_object_with_warning() {
        let mut cb = CorpusBuilder::new();
        let body = |name: &str| {
            vec![
                expr(call("save", vec![ident(name)])),
                expr(call("audit", vec![int(1)])),
                expr(call("close", vec![])),
            ]
        };
        cb.method("src/A.java", "A", "one").param("left", "int").body(body("left"));
        cb.method("src/B.java", "B", "two").param("right", "int").body(body("right"));
        let corpus = cb.finish();

        let plan = plan_first_cluster(&corpus, &NoResolver).unwrap();
        let param = plan
            .params
            .iter()
            .find(|p| matches!(p.source, ParamSource::SlotVariation { .. }))
            .expect("slot parameter");
        assert_eq!(param.ty, "Object");
        assert!(plan.type_fallbacks >= 1);
        assert!(plan.warnings.iter().any(|w| w.contains("Object")));
    }
}
