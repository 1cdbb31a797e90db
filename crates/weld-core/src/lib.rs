//! # weld-core
//!
//! Core types for the Weld duplicate-code detection and refactoring engine.
//! Contains the syntax arena, corpus, regions, type-resolution traits,
//! configuration, errors, and tracing setup shared by all Weld crates.

pub mod config;
pub mod errors;
pub mod observe;
pub mod region;
pub mod resolve;
pub mod syntax;
pub mod types;
