//! The refactoring orchestrator: validate every cluster, order the
//! survivors, then walk each through backup → apply → verify → commit,
//! rolling back on verification failure.
//!
//! One failing cluster never stops the run; only a backup whose integrity
//! cannot be guaranteed aborts the session, because from that point a
//! rollback could silently lose source.

use tracing::{info, warn};

use weld_analysis::types::DuplicationReport;
use weld_core::config::WeldConfig;
use weld_core::errors::{RejectReason, SessionError};
use weld_core::resolve::TypeResolver;
use weld_core::syntax::Corpus;
use weld_core::types::collections::FxHashSet;

use crate::recommend::{recommend, NameIndex, RefactoringRecommendation};
use crate::session::{ClusterRecord, ClusterState, RefactoringSession};
use crate::strategies;
use crate::verify::Verifier;

pub use crate::session::RunMode;

/// Drives a full refactoring session over one corpus.
pub struct Orchestrator<'a, R: TypeResolver, V: Verifier> {
    config: &'a WeldConfig,
    resolver: &'a R,
    verifier: &'a V,
    /// Interactive-mode gate; `None` approves everything.
    approval: Option<Box<dyn Fn(&ClusterRecord) -> bool + 'a>>,
}

/// Run a session with the default orchestrator.
pub fn refactor<R: TypeResolver, V: Verifier>(
    corpus: &mut Corpus,
    report: &DuplicationReport,
    mode: RunMode,
    config: &WeldConfig,
    resolver: &R,
    verifier: &V,
) -> Result<RefactoringSession, SessionError> {
    Orchestrator::new(config, resolver, verifier).run(corpus, report, mode)
}

impl<'a, R: TypeResolver, V: Verifier> Orchestrator<'a, R, V> {
    pub fn new(config: &'a WeldConfig, resolver: &'a R, verifier: &'a V) -> Self {
        Self {
            config,
            resolver,
            verifier,
            approval: None,
        }
    }

    /// Install an interactive approval hook.
    pub fn with_approval(mut self, hook: impl Fn(&ClusterRecord) -> bool + 'a) -> Self {
        self.approval = Some(Box::new(hook));
        self
    }

    pub fn run(
        &self,
        corpus: &mut Corpus,
        report: &DuplicationReport,
        mode: RunMode,
    ) -> Result<RefactoringSession, SessionError> {
        let mut session = RefactoringSession::new(mode);
        let lookup = NameIndex::from_corpus(corpus);

        // Phase 1: validate and recommend every cluster. One record per
        // cluster, in report order.
        let mut planned: Vec<(usize, RefactoringRecommendation)> = Vec::new();
        for (idx, cluster) in report.clusters.iter().enumerate() {
            let primary = report.region(cluster.primary);
            let mut record = ClusterRecord::new(format!(
                "{}:{}-{}",
                primary.file, primary.start_line, primary.end_line
            ));
            record.state = ClusterState::Validating;

            match recommend(
                corpus,
                report,
                cluster,
                &self.config.refactor,
                self.resolver,
                &lookup,
            ) {
                Ok(rec) => {
                    record.strategy = Some(rec.strategy);
                    record.confidence = Some(rec.confidence);
                    for warning in &rec.warnings {
                        session.warnings.push(format!("{}: {warning}", record.location));
                    }
                    let floor = self.config.refactor.batch_confidence_floor;
                    if mode == RunMode::Batch && rec.confidence < floor {
                        let reason = RejectReason::BelowThreshold {
                            score: rec.confidence,
                            floor,
                        };
                        record.state = ClusterState::Rejected;
                        record.reason = Some(reason.to_string());
                    } else {
                        planned.push((idx, rec));
                    }
                }
                Err(reason) => {
                    record.state = ClusterState::Rejected;
                    record.reason = Some(reason.to_string());
                }
            }
            session.records.push(record);
        }

        // Phase 2: application order — strategy priority, then estimated
        // savings, then match score, then location for determinism.
        planned.sort_by(|(a_idx, a), (b_idx, b)| {
            b.strategy
                .priority()
                .cmp(&a.strategy.priority())
                .then_with(|| {
                    report.clusters[*b_idx]
                        .estimated_lines_saved
                        .cmp(&report.clusters[*a_idx].estimated_lines_saved)
                })
                .then_with(|| {
                    report.clusters[*b_idx]
                        .best_score()
                        .partial_cmp(&report.clusters[*a_idx].best_score())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| session.records[*a_idx].location.cmp(&session.records[*b_idx].location))
        });

        // Phase 3: walk each survivor through the apply state machine.
        let mut dirty: FxHashSet<String> = FxHashSet::default();
        for (idx, rec) in planned {
            let cluster = &report.clusters[idx];

            if mode == RunMode::DryRun {
                session.records[idx].reason = Some("validated without applying (dry run)".to_string());
                continue;
            }

            let files: Vec<String> = {
                let mut files: Vec<String> = cluster
                    .members
                    .iter()
                    .map(|&m| report.region(m).file.clone())
                    .collect();
                files.sort();
                files.dedup();
                files
            };
            // Regions were located against the pre-session corpus; a file
            // already rewritten makes those locations stale.
            if files.iter().any(|f| dirty.contains(f)) {
                session.records[idx].reason =
                    Some("superseded by an earlier change in this session".to_string());
                continue;
            }

            if mode == RunMode::Interactive {
                if let Some(hook) = &self.approval {
                    if !hook(&session.records[idx]) {
                        session.records[idx].reason = Some("declined".to_string());
                        continue;
                    }
                }
            }

            for file in &files {
                session.backup_file(corpus, file)?;
            }
            session.records[idx].state = ClusterState::BackedUp;

            let snapshot = corpus.clone();
            session.records[idx].state = ClusterState::Applying;
            match strategies::apply(corpus, report, cluster, &rec) {
                Err(reason) => {
                    // Construction fails before mutation, but restoring the
                    // snapshot keeps the invariant unconditional.
                    *corpus = snapshot;
                    warn!(cluster = %session.records[idx].location, %reason, "apply failed");
                    session.records[idx].state = ClusterState::Rejected;
                    session.records[idx].reason = Some(reason.to_string());
                }
                Ok(touched) => {
                    session.records[idx].state = ClusterState::Applied;
                    session.records[idx].state = ClusterState::Verifying;
                    let level = self.config.refactor.verify_level;
                    match self.verifier.verify(level, &touched, corpus) {
                        Ok(()) => {
                            session.records[idx].state = ClusterState::Committed;
                            session.records[idx].touched = touched;
                            dirty.extend(files);
                        }
                        Err(failure) => {
                            *corpus = snapshot;
                            session.verify_restored(corpus, &touched)?;
                            warn!(
                                cluster = %session.records[idx].location,
                                %failure,
                                "verification failed; rolled back"
                            );
                            session.records[idx].state = ClusterState::RolledBack;
                            session.records[idx].reason = Some(failure.to_string());
                        }
                    }
                }
            }
        }

        info!(
            mode = %mode,
            clusters = session.records.len(),
            committed = session.succeeded(),
            failed = session.failed(),
            skipped = session.skipped(),
            "session finished"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weld_analysis::analyze;
    use weld_core::config::VerifyLevel;
    use weld_core::errors::VerifyFailure;
    use weld_core::resolve::{CorpusResolver, NoResolver};
    use weld_core::syntax::builder::{
        assign, bin, call, expr, ident, int, mcall, var, CorpusBuilder, Stmt,
    };

    use crate::verify::NoVerifier;

    fn settle_body() -> Vec<Stmt> {
        vec![
            var("int", "fee", int(10)),
            expr(call("charge", vec![ident("fee")])),
            expr(call("log", vec![ident("fee")])),
        ]
    }

    fn two_file_corpus() -> Corpus {
        let mut cb = CorpusBuilder::new();
        cb.method("src/A.java", "A", "settle").body(settle_body());
        cb.method("src/B.java", "B", "settle").body(settle_body());
        cb.finish()
    }

    #[test]
    fn batch_mode_commits_a_clean_cluster() {
        let mut corpus = two_file_corpus();
        let config = WeldConfig::default();
        let report = analyze(&corpus, &config);

        let session = refactor(
            &mut corpus,
            &report,
            RunMode::Batch,
            &config,
            &CorpusResolver,
            &NoVerifier,
        )
        .unwrap();

        assert_eq!(session.succeeded(), 1);
        assert_eq!(session.failed(), 0);
        assert_eq!(session.records[0].state, ClusterState::Committed);
        assert!(!session.records[0].touched.is_empty());
        let source = corpus.source("src/A.java").unwrap();
        assert!(source.contains("settleShared"), "{source}");
    }

    #[test]
    fn dry_run_never_mutates() {
        let mut corpus = two_file_corpus();
        let before_a = corpus.source("src/A.java").unwrap().to_string();
        let before_b = corpus.source("src/B.java").unwrap().to_string();
        let config = WeldConfig::default();
        let report = analyze(&corpus, &config);

        let session = refactor(
            &mut corpus,
            &report,
            RunMode::DryRun,
            &config,
            &CorpusResolver,
            &NoVerifier,
        )
        .unwrap();

        assert_eq!(session.succeeded(), 0);
        assert_eq!(session.skipped(), 1);
        assert_eq!(corpus.source("src/A.java").unwrap(), before_a);
        assert_eq!(corpus.source("src/B.java").unwrap(), before_b);
    }

    #[test]
    fn batch_mode_rejects_below_the_confidence_floor() {
        // Unresolvable slot types degrade to Object captures, discounting
        // confidence below the batch floor.
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
        let mut corpus = cb.finish();
        let before = corpus.source("src/A.java").unwrap().to_string();
        let config = WeldConfig::default();
        let report = analyze(&corpus, &config);

        let session = refactor(
            &mut corpus,
            &report,
            RunMode::Batch,
            &config,
            &NoResolver,
            &NoVerifier,
        )
        .unwrap();

        assert_eq!(session.succeeded(), 0);
        assert_eq!(session.records[0].state, ClusterState::Rejected);
        assert!(session.records[0].reason.as_deref().unwrap().contains("floor"));
        assert_eq!(corpus.source("src/A.java").unwrap(), before);

        // The same cluster applies in interactive mode, where a human gates
        // instead of the floor.
        let session = refactor(
            &mut corpus,
            &report,
            RunMode::Interactive,
            &config,
            &NoResolver,
            &NoVerifier,
        )
        .unwrap();
        assert_eq!(session.succeeded(), 1);
    }

    #[test]
    fn verification_failure_rolls_back_byte_for_byte() {
        let mut corpus = two_file_corpus();
        let before_a = corpus.source("src/A.java").unwrap().to_string();
        let before_b = corpus.source("src/B.java").unwrap().to_string();
        let mut config = WeldConfig::default();
        config.refactor.verify_level = VerifyLevel::FastCompile;
        let report = analyze(&corpus, &config);

        let failing = |level: VerifyLevel, _touched: &[String], _corpus: &Corpus| {
            Err(VerifyFailure {
                level,
                message: "type error in Account.java".to_string(),
            })
        };
        let session = refactor(
            &mut corpus,
            &report,
            RunMode::Batch,
            &config,
            &CorpusResolver,
            &failing,
        )
        .unwrap();

        assert_eq!(session.succeeded(), 0);
        assert_eq!(session.records[0].state, ClusterState::RolledBack);
        assert!(session.records[0].reason.as_deref().unwrap().contains("fast-compile"));
        assert_eq!(corpus.source("src/A.java").unwrap(), before_a);
        assert_eq!(corpus.source("src/B.java").unwrap(), before_b);
    }

    #[test]
    fn nested_returns_are_never_applied() {
        let mut cb = CorpusBuilder::new();
        let body = || {
            vec![
                var("int", "fee", int(10)),
                weld_core::syntax::builder::if_stmt(
                    bin(ident("fee"), ">", int(5)),
                    vec![weld_core::syntax::builder::ret(ident("fee"))],
                ),
                expr(call("log", vec![ident("fee")])),
            ]
        };
        cb.method("src/A.java", "A", "one").returns("int").body(body());
        cb.method("src/B.java", "B", "two").returns("int").body(body());
        let mut corpus = cb.finish();
        let before = corpus.source("src/A.java").unwrap().to_string();
        let config = WeldConfig::default();
        let report = analyze(&corpus, &config);

        let session = refactor(
            &mut corpus,
            &report,
            RunMode::Batch,
            &config,
            &CorpusResolver,
            &NoVerifier,
        )
        .unwrap();

        assert_eq!(session.succeeded(), 0);
        assert_eq!(session.records[0].state, ClusterState::Rejected);
        assert!(session.records[0]
            .reason
            .as_deref()
            .unwrap()
            .contains("nested"));
        assert_eq!(corpus.source("src/A.java").unwrap(), before);
    }

    #[test]
    fn one_rejected_cluster_does_not_abort_the_run() {
        let mut cb = CorpusBuilder::new();
        // `counter` is a field write; this cluster must reject.
        let bad = || {
            vec![
                assign("counter", bin(ident("counter"), "+", int(1))),
                expr(call("log", vec![ident("counter")])),
                expr(call("flush", vec![])),
            ]
        };
        cb.method("src/A.java", "A", "bump").body(bad());
        cb.method("src/B.java", "B", "bump").body(bad());
        cb.method("src/C.java", "C", "settle").body(settle_body());
        cb.method("src/D.java", "D", "settle").body(settle_body());
        let mut corpus = cb.finish();
        let config = WeldConfig::default();
        let report = analyze(&corpus, &config);
        assert_eq!(report.clusters.len(), 2);

        let session = refactor(
            &mut corpus,
            &report,
            RunMode::Batch,
            &config,
            &CorpusResolver,
            &NoVerifier,
        )
        .unwrap();

        assert_eq!(session.succeeded(), 1);
        assert_eq!(session.failed(), 1);
        assert!(corpus.source("src/C.java").unwrap().contains("settleShared"));
        assert!(!corpus.source("src/A.java").unwrap().contains("Shared"));
    }

    #[test]
    fn application_order_ranks_by_match_score_then_location() {
        use std::cell::RefCell;

        // The unresolvable receiver `gate` discounts confidence but not the
        // match score, so the two clusters tie on score and order by
        // location; ordering by confidence would visit the clean cluster
        // first.
        let gate_body = || {
            vec![
                expr(mcall(ident("gate"), "open", vec![])),
                expr(mcall(ident("gate"), "check", vec![])),
                expr(mcall(ident("gate"), "close", vec![])),
            ]
        };
        let mut cb = CorpusBuilder::new();
        cb.method("src/A.java", "A", "gateOne").body(gate_body());
        cb.method("src/B.java", "B", "gateTwo").body(gate_body());
        cb.method("src/C.java", "C", "settle").body(settle_body());
        cb.method("src/D.java", "D", "settle").body(settle_body());
        let mut corpus = cb.finish();
        let config = WeldConfig::default();
        let report = analyze(&corpus, &config);
        assert_eq!(report.clusters.len(), 2);

        let visited = RefCell::new(Vec::new());
        let session = Orchestrator::new(&config, &CorpusResolver, &NoVerifier)
            .with_approval(|record| {
                visited.borrow_mut().push(record.location.clone());
                false
            })
            .run(&mut corpus, &report, RunMode::Interactive)
            .unwrap();

        let gate = session
            .records
            .iter()
            .find(|r| r.location.starts_with("src/A.java"))
            .unwrap();
        let settle = session
            .records
            .iter()
            .find(|r| r.location.starts_with("src/C.java"))
            .unwrap();
        assert!(gate.confidence.unwrap() < settle.confidence.unwrap());

        let visited = visited.into_inner();
        assert_eq!(visited.len(), 2);
        assert!(visited[0].starts_with("src/A.java"), "{visited:?}");
        assert!(visited[1].starts_with("src/C.java"), "{visited:?}");
    }

    #[test]
    fn interactive_approval_hook_can_decline() {
        let mut corpus = two_file_corpus();
        let before = corpus.source("src/A.java").unwrap().to_string();
        let config = WeldConfig::default();
        let report = analyze(&corpus, &config);

        let session = Orchestrator::new(&config, &CorpusResolver, &NoVerifier)
            .with_approval(|_record| false)
            .run(&mut corpus, &report, RunMode::Interactive)
            .unwrap();

        assert_eq!(session.succeeded(), 0);
        assert_eq!(session.skipped(), 1);
        assert_eq!(session.records[0].reason.as_deref(), Some("declined"));
        assert_eq!(corpus.source("src/A.java").unwrap(), before);
    }
}
