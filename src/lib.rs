//! rehome - owner-centric document restructuring
//!
//! Moves documents out of flat, multi-tenant collections into a strict
//! per-owner hierarchy, inferring each document's owner from whichever of
//! several fields carries it. Re-runs resume instead of duplicating, and
//! nothing is written unless the run is a COMMIT.

pub mod cli;
pub mod config;
pub mod context;
pub mod di;
pub mod engine;
pub mod error;
pub mod store;

// Re-export FromRef at crate root for di-macros generated code
pub use di::FromRef;
