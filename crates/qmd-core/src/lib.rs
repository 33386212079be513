//! QMD's indexing and hybrid retrieval engine.
//!
//! This crate is the portable core described by the specification: the data
//! model, the `Index` storage trait, the chunker, the `Gateway` capability
//! trait, the query compiler, the retrieval pipeline, and the scope guard.
//! It has no `sqlx`, no filesystem access, and no hard `tokio` runtime
//! dependency (`tokio`'s `macros`/`rt` features are a dev-dependency only,
//! for `#[tokio::test]`) — a SQLite-backed `Index` and concrete `Gateway`
//! implementations live in the `qmd` application crate.

pub mod chunk;
pub mod context;
pub mod error;
pub mod gateway;
pub mod intent;
pub mod models;
pub mod query;
pub mod retrieval;
pub mod rrf;
pub mod scope;
pub mod snippet;
pub mod store;

pub use error::{QmdError, Result};
