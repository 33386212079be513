//! Error taxonomy for the QMD indexing and retrieval engine.
//!
//! These are the error *kinds* enumerated in the specification, not a
//! one-to-one mirror of every failure a storage backend can produce.
//! Backend-specific failures (a `sqlx::Error`, an I/O error opening the
//! database file) are folded into [`QmdError::IoFailure`] at the point
//! they cross into the engine.

use thiserror::Error;

/// Errors the engine itself can raise, independent of storage backend.
///
/// Matches the taxonomy in the specification: each variant is a *kind*,
/// not a type hierarchy — callers match on variant, not on wrapped error
/// types.
#[derive(Debug, Error)]
pub enum QmdError {
    /// A structured or lexical query failed to parse.
    ///
    /// `line` is 1-based and refers to the offending line of a structured
    /// query document; it is `0` for errors that are not line-specific
    /// (e.g. an unmatched quote inside a single `lex:` line still reports
    /// that line's number, never 0, but a malformed standalone lexical
    /// string passed outside the structured-document parser reports 0).
    #[error("invalid query at line {line}: {message}")]
    InvalidQuery { line: usize, message: String },

    /// A Gateway call required credentials that were not configured.
    #[error("missing credentials for remote provider")]
    AuthMissing,

    /// A Gateway call failed with a transient upstream condition (HTTP
    /// 429 or 5xx) after exhausting the retry budget.
    #[error("provider request failed transiently after retries: {0}")]
    ProviderTransient(String),

    /// A vector was inserted whose dimensionality does not match the
    /// dimension already committed to the index.
    #[error("vector dimension mismatch: index is {expected}-dimensional, got {actual}")]
    VectorDimensionMismatch { expected: usize, actual: usize },

    /// The Scope Guard refused a vector read or write. The message is the
    /// full, human-readable, multi-line guard message.
    #[error("{0}")]
    ScopeViolation(String),

    /// A lookup by collection/path, hash, or docid found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A docid prefix matched more than one document and could not be
    /// disambiguated.
    #[error("docid {docid:?} is ambiguous across {candidates} documents")]
    AmbiguousDocId { docid: String, candidates: usize },

    /// The underlying durable store failed. No partial state is left
    /// visible: callers are expected to have rolled back any open
    /// transaction before this error escapes.
    #[error("storage failure: {0}")]
    IoFailure(String),
}

pub type Result<T> = std::result::Result<T, QmdError>;
