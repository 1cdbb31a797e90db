//! # weld-refactor
//!
//! Safety analysis and refactoring orchestration for the Weld engine.
//! Decides whether a duplicate cluster can be merged without changing
//! behavior (liveness, escape, and type-compatibility analysis), produces
//! an extraction plan and strategy recommendation, and applies it through
//! a validate → backup → apply → verify → rollback state machine.

pub mod escape;
pub mod orchestrator;
pub mod recommend;
pub mod safety;
pub mod session;
pub mod strategies;
pub mod verify;

pub use escape::{analyze_region, EscapeAnalysis, LiveOut};
pub use orchestrator::{refactor, Orchestrator, RunMode};
pub use recommend::{
    recommend, NameIndex, NoLookup, ParamSource, ParameterSpec, RefactoringRecommendation,
};
pub use safety::{ExtractionPlan, ReturnPlan, SafetyAnalyzer};
pub use session::{ClusterRecord, ClusterState, RefactoringSession};
pub use strategies::{apply, RefactoringStrategy};
pub use verify::{NoVerifier, Verifier};
