//! Shared type aliases and small value types.

pub mod collections;
