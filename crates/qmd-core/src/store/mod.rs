//! Storage abstraction for QMD.
//!
//! The [`Index`] trait defines every persistence operation the engine
//! needs — content/catalog, FTS, chunk vectors, scope meta, path/global
//! context, and search history — so that the retrieval pipeline, query
//! compiler, and scope guard never talk to SQL directly. A SQLite-backed
//! implementation lives in the `qmd` application crate; [`memory::InMemoryIndex`]
//! here is a test double used by this crate's own unit tests and by
//! downstream integration tests.
//!
//! Implementations must be `Send + Sync`: the retrieval pipeline fans the
//! per-channel searches of a hybrid query out across concurrent tasks
//! (§5), all holding a shared reference to the same `Index`.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{
    ApiScopeMeta, Collection, Document, PathContext, SearchHistoryEntry, UpsertResult,
};

/// A full-text hit: one active document and its raw (unnormalized) BM25
/// score.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub document_id: i64,
    pub raw_score: f64,
}

/// A nearest-neighbor hit: one chunk, the active document that owns it,
/// and its cosine similarity to the query vector.
#[derive(Debug, Clone)]
pub struct VecHit {
    pub document_id: i64,
    pub hash: String,
    pub seq: i64,
    pub pos: i64,
    pub cosine: f64,
}

/// A content hash with chunks still needing embeddings, as determined by
/// comparing expected chunk count to rows present in the vector store.
#[derive(Debug, Clone)]
pub struct PendingEmbed {
    pub hash: String,
    pub body: String,
}

/// One vector to persist for a `(hash, seq)` pair, produced by the
/// chunker + Gateway and written back transactionally per hash.
#[derive(Debug, Clone)]
pub struct ChunkVectorInsert {
    pub seq: i64,
    pub pos: i64,
    pub embedding: Vec<f32>,
    pub model: String,
}

/// A freshly-recorded search-history row, prior to id assignment.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub ts: i64,
    pub kind: String,
    pub query: String,
    pub result_count: i64,
    pub index_name: String,
}

/// Lightweight counts used by `qmd stats` and health checks.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub collections: i64,
    pub active_documents: i64,
    pub content_rows: i64,
    pub embedded_chunks: i64,
    pub vector_dims: Option<usize>,
}

/// Abstract storage backend for QMD: content store, document catalog,
/// FTS index, chunk vector store, scope meta, path/global context, and
/// search history all go through this one trait.
#[async_trait]
pub trait Index: Send + Sync {
    // ---- Collections ----------------------------------------------------

    /// Create or update a named collection's root/pattern/context.
    async fn upsert_collection(
        &self,
        name: &str,
        root: &str,
        pattern: &str,
        context: Option<&str>,
    ) -> Result<Collection>;

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>>;

    async fn list_collections(&self) -> Result<Vec<Collection>>;

    // ---- Content store & document catalog (§4.1) ------------------------

    /// Insert or update the document at `(collection, path)`.
    ///
    /// Computes the content hash, inserts a `Content` row if one doesn't
    /// already exist for it, deactivates any previously-active row at this
    /// slot, and inserts the new active row — all in one transaction.
    async fn upsert_document(
        &self,
        collection: &str,
        path: &str,
        title: &str,
        body: &str,
        modified_at: i64,
    ) -> Result<UpsertResult>;

    /// Soft-delete the active document at `(collection, path)`, if any.
    /// Content rows are left for `gc` to reclaim.
    async fn deactivate_document(&self, collection: &str, path: &str) -> Result<()>;

    async fn document_by_path(&self, collection: &str, path: &str) -> Result<Option<Document>>;

    /// All active documents currently referencing `hash` (usually zero or
    /// one, but content can be shared across collections/paths).
    async fn documents_by_hash(&self, hash: &str) -> Result<Vec<Document>>;

    /// Every active document in `collection`, for `sync` to diff the
    /// filesystem walk against and for `qmd stats`/listing.
    async fn list_active_documents(&self, collection: &str) -> Result<Vec<Document>>;

    /// Resolve a docid (a prefix of a content hash, conventionally 6 hex
    /// characters) to the single active document it identifies.
    ///
    /// Ties among documents sharing a hash prefix are broken by the
    /// latest `modified_at`; if more than one *distinct* hash matches the
    /// prefix, the lookup is ambiguous and returns
    /// [`crate::error::QmdError::AmbiguousDocId`].
    async fn document_by_docid(&self, docid: &str) -> Result<Document>;

    async fn get_document_by_id(&self, id: i64) -> Result<Option<Document>>;

    /// The body of the `Content` row for `hash`, if one exists.
    async fn content_body(&self, hash: &str) -> Result<Option<String>>;

    /// Delete `Content` rows referenced by no active `Document` and no
    /// `ChunkVector`. Returns the number of rows removed.
    async fn gc(&self) -> Result<u64>;

    /// Every content hash currently stored, with its body — used by
    /// `qmd embed --rebuild` to re-chunk and re-embed everything rather
    /// than only chunks [`Index::pending_embeds`] finds incomplete.
    async fn all_content(&self) -> Result<Vec<PendingEmbed>>;

    // ---- FTS index (§4.2) ------------------------------------------------

    /// Run a compiled FTS5 MATCH expression over `(title, body)` of active
    /// documents, returning raw (unnormalized) BM25 hits.
    async fn fts_search(&self, match_expr: &str, limit: i64) -> Result<Vec<FtsHit>>;

    // ---- Chunker + vector store (§4.3) -----------------------------------

    /// Content hashes (with bodies, for chunking) whose chunk coverage is
    /// incomplete: the number of `ChunkVector` rows present doesn't match
    /// the number of chunks the chunker would produce for that body.
    async fn pending_embeds(&self, max_file_bytes: u64, limit: usize) -> Result<Vec<PendingEmbed>>;

    /// Replace all chunk vectors for `hash` in one transaction: either
    /// every chunk's vector becomes visible, or none do.
    async fn replace_chunk_vectors(&self, hash: &str, vectors: &[ChunkVectorInsert]) -> Result<()>;

    /// The `seq` values currently present for `hash`, for coverage checks.
    async fn chunk_seqs(&self, hash: &str) -> Result<Vec<i64>>;

    /// Whether any `ChunkVector` rows exist at all (used by the scope
    /// guard's `AmbiguousLegacyVectors` check).
    async fn any_vectors_exist(&self) -> Result<bool>;

    /// The dimensionality committed to the index by the first successful
    /// embed, if any vectors have been written yet.
    async fn vector_dims(&self) -> Result<Option<usize>>;

    /// Approximate or exact nearest-neighbor search by cosine similarity.
    ///
    /// When `collections` is non-empty, results are restricted to vectors
    /// whose owning active document is in one of the named collections;
    /// implementations over-fetch internally so that an unrequested
    /// collection with many near-duplicate vectors cannot starve the
    /// requested collections out of the top-`k` (see scenario C).
    async fn search_vec(
        &self,
        query_vec: &[f32],
        k: usize,
        collections: &[String],
        hash_allowlist: Option<&[String]>,
    ) -> Result<Vec<VecHit>>;

    // ---- Scope meta (§4.7) -----------------------------------------------

    async fn get_scope_meta(&self) -> Result<Option<ApiScopeMeta>>;

    async fn set_scope_meta(&self, meta: ApiScopeMeta) -> Result<()>;

    async fn clear_scope_meta(&self) -> Result<()>;

    // ---- Path / global context (§10 supplement) --------------------------

    async fn path_contexts(&self, collection: &str) -> Result<Vec<PathContext>>;

    async fn set_path_context(&self, collection: &str, prefix: &str, text: &str) -> Result<()>;

    async fn global_context(&self) -> Result<Option<String>>;

    async fn set_global_context(&self, text: &str) -> Result<()>;

    // ---- Search history (§10 supplement) ----------------------------------

    async fn record_history(&self, entry: NewHistoryEntry) -> Result<i64>;

    async fn list_history(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>>;

    // ---- Stats -------------------------------------------------------------

    async fn stats(&self) -> Result<IndexStats>;
}
