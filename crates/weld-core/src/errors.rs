//! Error taxonomy for the Weld engine.
//!
//! Three recoverable families and one fatal one:
//! - `RejectReason` — a cluster cannot be refactored safely; recorded on the
//!   session and the run continues.
//! - `VerifyFailure` — post-apply verification failed; the cluster's files
//!   are rolled back and the run continues.
//! - `ConfigError` — malformed configuration.
//! - `SessionError` — backup integrity can no longer be guaranteed; the
//!   remaining session is aborted.

use thiserror::Error;

use crate::config::VerifyLevel;

/// Why a cluster was rejected or skipped instead of refactored.
///
/// Every variant renders to a human-readable reason attached to the session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    /// A `return` nested under a conditional or loop inside the region.
    #[error("region contains a return nested inside a conditional or loop at line {line}")]
    NestedReturn { line: u32 },

    /// A variable declared outside the region is assigned inside it.
    #[error("variable `{name}` declared outside the region is written inside it")]
    OuterWrite { name: String },

    /// More than one live-out candidate of the target type and no explicit
    /// return to disambiguate.
    #[error("ambiguous return value: multiple live-out candidates {names:?} of type `{ty}`")]
    AmbiguousReturn { ty: String, names: Vec<String> },

    /// A variation position has no safe common parameter type.
    #[error(
        "no safe common type at variation position {position}: `{left}` is incompatible with `{right}`"
    )]
    TypeConflict {
        position: usize,
        left: String,
        right: String,
    },

    /// The suggested name collides with an existing declaration.
    #[error("name `{name}` collides with an existing declaration")]
    NameCollision { name: String },

    /// The similarity score fell below the applicable floor for the run mode.
    #[error("score {score:.3} below the {floor:.2} floor for this mode")]
    BelowThreshold { score: f64, floor: f64 },

    /// Strategy construction failed partway; any partial mutation was undone.
    #[error("transformation construction failed: {message}")]
    ConstructionFailed { message: String },

    /// The cluster has no member eligible for the chosen strategy.
    #[error("no applicable refactoring strategy: {message}")]
    NoStrategy { message: String },
}

/// A post-apply verification failure. Triggers rollback, never session abort.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("verification at level {level} failed: {message}")]
pub struct VerifyFailure {
    pub level: VerifyLevel,
    pub message: String,
}

/// Malformed configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for `{field}`: {message}")]
    Invalid { field: String, message: String },
}

/// Fatal, session-aborting failures.
///
/// Only raised when a backup can no longer be trusted; per spec the rest of
/// the session must not proceed once backup integrity is in doubt.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to snapshot `{path}` for backup: {message}")]
    BackupFailed { path: String, message: String },

    #[error("failed to restore `{path}` from backup: {message}")]
    RestoreFailed { path: String, message: String },

    #[error("no backup recorded for modified file `{path}`")]
    MissingBackup { path: String },
}
