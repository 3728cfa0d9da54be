//! Backend implementations of the document store traits.
//!
//! Each backend implements [`DocumentReader`](crate::store::DocumentReader)
//! and [`DocumentWriter`](crate::store::DocumentWriter), which makes it a
//! [`DocumentStore`](crate::store::DocumentStore).
//!
//! # Available Backends
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | In-process map | [`memory`] | Tests, smoke runs |
//! | JSON export | [`memory`] via `load_snapshot` / `save_snapshot` | Offline runs against an export |
//! | PostgreSQL JSONB table | [`postgres`] | Production |

pub mod memory;
pub mod postgres;
