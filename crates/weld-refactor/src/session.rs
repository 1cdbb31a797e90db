//! Session state: per-cluster lifecycle records and file backups.
//!
//! A cluster moves Discovered → Validating, then either stops there
//! (rejected, or validated without applying), or proceeds BackedUp →
//! Applying → Applied → Verifying → Committed, falling to RolledBack when
//! verification fails. Backups snapshot each file's rendered source before
//! its first mutation in the session; a rollback must restore those bytes
//! exactly.

use std::fmt;

use serde::Serialize;

use weld_core::errors::SessionError;
use weld_core::syntax::Corpus;
use weld_core::types::collections::FxHashMap;

use crate::strategies::RefactoringStrategy;

/// How the orchestrator decides which validated clusters to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Validate and recommend only; never mutate.
    DryRun,
    /// Apply clusters an approval hook accepts (all, when none is set).
    Interactive,
    /// Apply automatically, gated on the confidence floor.
    Batch,
}

impl RunMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DryRun => "dry-run",
            Self::Interactive => "interactive",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle position of one cluster within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterState {
    Discovered,
    Validating,
    Rejected,
    BackedUp,
    Applying,
    Applied,
    Verifying,
    Committed,
    RolledBack,
}

impl ClusterState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Validating => "validating",
            Self::Rejected => "rejected",
            Self::BackedUp => "backed-up",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Verifying => "verifying",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
        }
    }

    /// Nothing further happens to a cluster in this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One cluster's outcome within a session.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterRecord {
    /// Primary region location, `file:start-end`.
    pub location: String,
    pub strategy: Option<RefactoringStrategy>,
    pub confidence: Option<f64>,
    pub state: ClusterState,
    /// Why the cluster stopped short of Committed, when it did.
    pub reason: Option<String>,
    /// Files modified by a committed apply.
    pub touched: Vec<String>,
}

impl ClusterRecord {
    pub fn new(location: String) -> Self {
        Self {
            location,
            strategy: None,
            confidence: None,
            state: ClusterState::Discovered,
            reason: None,
            touched: Vec::new(),
        }
    }
}

/// The outcome of one orchestrator run.
#[derive(Debug, Serialize)]
pub struct RefactoringSession {
    pub mode: RunMode,
    /// One record per cluster, in report order.
    pub records: Vec<ClusterRecord>,
    /// Session-level warnings, including per-cluster plan warnings.
    pub warnings: Vec<String>,
    /// Pre-mutation source snapshots, first write wins.
    #[serde(skip)]
    backups: FxHashMap<String, String>,
}

impl RefactoringSession {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            records: Vec::new(),
            warnings: Vec::new(),
            backups: FxHashMap::default(),
        }
    }

    /// Clusters applied and committed.
    pub fn succeeded(&self) -> usize {
        self.count(ClusterState::Committed)
    }

    /// Clusters rejected or rolled back.
    pub fn failed(&self) -> usize {
        self.count(ClusterState::Rejected) + self.count(ClusterState::RolledBack)
    }

    /// Clusters validated but deliberately not applied.
    pub fn skipped(&self) -> usize {
        self.count(ClusterState::Validating)
    }

    fn count(&self, state: ClusterState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    /// Snapshot `path`'s current source unless already backed up.
    pub fn backup_file(&mut self, corpus: &Corpus, path: &str) -> Result<(), SessionError> {
        if self.backups.contains_key(path) {
            return Ok(());
        }
        let source = corpus
            .source(path)
            .ok_or_else(|| SessionError::BackupFailed {
                path: path.to_string(),
                message: "file is not present in the corpus".to_string(),
            })?;
        self.backups.insert(path.to_string(), source.to_string());
        Ok(())
    }

    pub fn backup(&self, path: &str) -> Option<&str> {
        self.backups.get(path).map(String::as_str)
    }

    /// Check that every file in `files` matches its backup byte for byte.
    pub fn verify_restored(&self, corpus: &Corpus, files: &[String]) -> Result<(), SessionError> {
        for path in files {
            let backup = self
                .backups
                .get(path)
                .ok_or_else(|| SessionError::MissingBackup { path: path.clone() })?;
            let current = corpus.source(path).unwrap_or_default();
            if current != backup {
                return Err(SessionError::RestoreFailed {
                    path: path.clone(),
                    message: "restored source does not match its backup".to_string(),
                });
            }
        }
        Ok(())
    }
}
