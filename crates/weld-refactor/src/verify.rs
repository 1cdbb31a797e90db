//! Post-apply verification boundary.
//!
//! Compilation and test execution live outside the engine; the
//! orchestrator only needs a yes/no with a message. Any `Err` triggers a
//! rollback of the cluster, never a session abort.

use weld_core::config::VerifyLevel;
use weld_core::errors::VerifyFailure;
use weld_core::syntax::Corpus;

/// Checks a corpus after one cluster has been applied.
pub trait Verifier {
    /// `touched` is the sorted list of files the apply modified.
    fn verify(
        &self,
        level: VerifyLevel,
        touched: &[String],
        corpus: &Corpus,
    ) -> Result<(), VerifyFailure>;
}

/// Accepts every apply; the default when no build tool is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVerifier;

impl Verifier for NoVerifier {
    fn verify(
        &self,
        _level: VerifyLevel,
        _touched: &[String],
        _corpus: &Corpus,
    ) -> Result<(), VerifyFailure> {
        Ok(())
    }
}

impl<F> Verifier for F
where
    F: Fn(VerifyLevel, &[String], &Corpus) -> Result<(), VerifyFailure>,
{
    fn verify(
        &self,
        level: VerifyLevel,
        touched: &[String],
        corpus: &Corpus,
    ) -> Result<(), VerifyFailure> {
        self(level, touched, corpus)
    }
}
