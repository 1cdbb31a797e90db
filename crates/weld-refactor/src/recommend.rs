//! Strategy selection and recommendation building.
//!
//! Takes a validated extraction plan and decides which refactoring shape
//! fits the cluster, what to call the helper, and how confident the
//! engine is that applying it automatically is safe.

use serde::Serialize;

use weld_analysis::types::{DuplicateCluster, DuplicationReport};
use weld_core::config::RefactorConfig;
use weld_core::errors::RejectReason;
use weld_core::resolve::{DeclarationLookup, TypeResolver};
use weld_core::syntax::{Corpus, DeclId, DeclKind, NodeId, NodeKind};
use weld_core::types::collections::FxHashMap;

use crate::safety::{ExtractionPlan, ReturnPlan, SafetyAnalyzer};
use crate::strategies::RefactoringStrategy;

/// Where a helper parameter's call-site argument comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ParamSource {
    /// An externally-declared variable read inside the region; every call
    /// site passes it by name.
    OuterRead,
    /// A value position that varies between members; each call site passes
    /// its own value.
    SlotVariation {
        /// Statement index within the region.
        position: usize,
        /// Slot index within the statement.
        slot: usize,
        /// The primary's node at this position, substituted by the
        /// parameter in the helper body.
        primary_node: NodeId,
    },
}

/// One parameter of the extracted helper.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    pub ty: String,
    pub source: ParamSource,
    /// Argument values per member, primary first.
    pub example_values: Vec<String>,
    pub first_use_line: u32,
}

/// A fully-planned refactoring for one cluster.
#[derive(Debug, Clone, Serialize)]
pub struct RefactoringRecommendation {
    pub strategy: RefactoringStrategy,
    /// Suggested helper name, already checked for collisions.
    pub name: String,
    pub params: Vec<ParameterSpec>,
    pub ret: ReturnPlan,
    /// In [0, 1]; the batch floor gates on this.
    pub confidence: f64,
    pub warnings: Vec<String>,
}

/// Penalty per warning attached to the plan.
const WARNING_PENALTY: f64 = 0.05;
/// Additional penalty per parameter that degraded to `Object`.
const FALLBACK_PENALTY: f64 = 0.10;

/// Validate a cluster and build its recommendation.
pub fn recommend<R: TypeResolver, L: DeclarationLookup>(
    corpus: &Corpus,
    report: &DuplicationReport,
    cluster: &DuplicateCluster,
    config: &RefactorConfig,
    resolver: &R,
    lookup: &L,
) -> Result<RefactoringRecommendation, RejectReason> {
    let mut plan = SafetyAnalyzer::new(corpus, resolver).plan(report, cluster)?;

    if plan.params.len() > config.parameter_soft_cap {
        plan.warnings.push(format!(
            "helper takes {} parameters (soft cap {})",
            plan.params.len(),
            config.parameter_soft_cap
        ));
    }

    let strategy = select_strategy(corpus, report, cluster);
    let primary_decl = corpus.decl(report.region(cluster.primary).decl);
    let name = helper_name(strategy, &primary_decl.name);

    match lookup.declarations_by_name(&name) {
        Some(existing) if !existing.is_empty() => {
            return Err(RejectReason::NameCollision { name });
        }
        Some(_) => {}
        None => {
            plan.warnings.push(format!(
                "declaration lookup unavailable; `{name}` was not checked for collisions"
            ));
        }
    }

    let confidence = confidence(cluster, &plan);
    tracing::debug!(
        strategy = strategy.name(),
        helper = %name,
        confidence,
        params = plan.params.len(),
        "cluster recommendation"
    );

    Ok(RefactoringRecommendation {
        strategy,
        name,
        params: plan.params,
        ret: plan.ret,
        confidence,
        warnings: plan.warnings,
    })
}

/// Pick the refactoring shape from what the members are.
fn select_strategy(
    corpus: &Corpus,
    report: &DuplicationReport,
    cluster: &DuplicateCluster,
) -> RefactoringStrategy {
    let decls: Vec<(DeclId, &weld_core::syntax::Declaration)> = cluster
        .members
        .iter()
        .map(|&m| {
            let id = report.region(m).decl;
            (id, corpus.decl(id))
        })
        .collect();

    if decls.iter().all(|(_, d)| d.kind == DeclKind::Constructor) {
        return RefactoringStrategy::ConstructorDelegation;
    }
    if decls.iter().all(|(_, d)| d.is_test)
        && cluster.members.len() >= 3
        && literal_only_variations(corpus, cluster)
    {
        return RefactoringStrategy::ParameterizedTest;
    }
    if decls.iter().all(|(_, d)| d.is_setup) {
        return RefactoringStrategy::SharedSetup;
    }

    let (_, first) = decls[0];
    let same_class = decls
        .iter()
        .all(|(_, d)| d.class_name == first.class_name && d.file == first.file);
    if same_class {
        RefactoringStrategy::HelperMethod
    } else {
        RefactoringStrategy::SharedBase
    }
}

/// True when every variation against the primary is a literal-for-literal
/// swap — the shape a parameterized test can absorb.
fn literal_only_variations(corpus: &Corpus, cluster: &DuplicateCluster) -> bool {
    let tree = corpus.tree();
    let is_literal = |node: Option<NodeId>| {
        node.is_some_and(|n| matches!(tree.kind(n), NodeKind::Literal(_)))
    };
    cluster.members.iter().all(|&member| {
        if member == cluster.primary {
            return true;
        }
        match cluster.match_with_primary(member) {
            Some(pair) => pair
                .result
                .variations
                .variations
                .iter()
                .all(|v| v.slot.is_some() && is_literal(v.left_node) && is_literal(v.right_node)),
            None => false,
        }
    })
}

fn helper_name(strategy: RefactoringStrategy, primary_name: &str) -> String {
    match strategy {
        RefactoringStrategy::HelperMethod => format!("{primary_name}Helper"),
        RefactoringStrategy::ConstructorDelegation => "init".to_string(),
        RefactoringStrategy::SharedBase => format!("{primary_name}Shared"),
        RefactoringStrategy::ParameterizedTest => format!("{primary_name}Scenario"),
        RefactoringStrategy::SharedSetup => "sharedSetUp".to_string(),
    }
}

/// Mean primary-match score, discounted per warning and per type fallback.
fn confidence(cluster: &DuplicateCluster, plan: &ExtractionPlan) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &member in &cluster.members {
        if member == cluster.primary {
            continue;
        }
        if let Some(pair) = cluster.match_with_primary(member) {
            sum += pair.result.combined;
            count += 1;
        }
    }
    let mean = if count == 0 { 0.0 } else { sum / count as f64 };
    let penalized = mean
        - WARNING_PENALTY * plan.warnings.len() as f64
        - FALLBACK_PENALTY * plan.type_fallbacks as f64;
    penalized.clamp(0.0, 1.0)
}

/// Name → declarations snapshot implementing the collision-check lookup.
pub struct NameIndex {
    by_name: FxHashMap<String, Vec<DeclId>>,
}

impl NameIndex {
    pub fn from_corpus(corpus: &Corpus) -> Self {
        let mut by_name: FxHashMap<String, Vec<DeclId>> = FxHashMap::default();
        for (id, decl) in corpus.decls() {
            by_name.entry(decl.name.clone()).or_default().push(id);
        }
        Self { by_name }
    }
}

impl DeclarationLookup for NameIndex {
    fn declarations_by_name(&self, name: &str) -> Option<Vec<DeclId>> {
        Some(self.by_name.get(name).cloned().unwrap_or_default())
    }
}

/// A lookup that is unavailable; recommendation degrades with a warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLookup;

impl DeclarationLookup for NoLookup {
    fn declarations_by_name(&self, _name: &str) -> Option<Vec<DeclId>> {
        None
    }
}
