//! Core data types shared across the indexing and retrieval engine.
//!
//! These mirror the entities in the data model one-for-one: [`Collection`],
//! [`Document`], [`Content`], [`ChunkVector`], [`PathContext`], and
//! [`SearchHistoryEntry`]. Storage backends ([`crate::store::Index`]
//! implementations) read and write these types; they carry no SQL- or
//! backend-specific fields.

use serde::{Deserialize, Serialize};

/// A named collection of Markdown files under a filesystem root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub root: String,
    pub pattern: String,
    pub context: Option<String>,
    pub created_at: i64,
}

/// A single version of a file at `(collection, path)`.
///
/// Only one `Document` row per `(collection, path)` has `active = true` at
/// a time; prior versions are soft-deleted, not removed, so their `hash`
/// can still be referenced by other live state until garbage collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: i64,
    pub collection: String,
    pub path: String,
    pub title: String,
    pub hash: String,
    pub display_path: Option<String>,
    pub active: bool,
    pub created_at: i64,
    pub modified_at: i64,
}

impl Document {
    /// The 6-hex-character docid used in CLI output and disambiguation.
    pub fn docid(&self) -> String {
        self.hash.chars().take(6).collect()
    }

    /// The path shown to users: `display_path` when set, else `path`.
    pub fn shown_path(&self) -> &str {
        self.display_path.as_deref().unwrap_or(&self.path)
    }
}

/// Immutable document body, keyed by content hash.
///
/// Multiple [`Document`] rows may share one `Content` row when their
/// bodies are byte-identical; the hash is what ties them together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub hash: String,
    pub body: String,
    pub created_at: i64,
}

/// The embedding for one chunk of a `Content` body.
///
/// Keyed by `(hash, seq)`. `pos` is the chunk's starting character offset
/// in the body, used to anchor snippets and chunk-selection results back
/// onto the source text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkVector {
    pub hash: String,
    pub seq: i64,
    pub pos: i64,
    pub embedding: Vec<f32>,
    pub model: String,
    pub embedded_at: i64,
}

/// Free-form context text attached to a path prefix within a collection.
///
/// When resolving the effective context for a document, the longest
/// matching prefix wins; see [`crate::context`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathContext {
    pub collection: String,
    pub prefix: String,
    pub context_text: String,
}

/// One row of the append-only search history log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub ts: i64,
    pub kind: String,
    pub query: String,
    pub result_count: i64,
    pub index_name: String,
}

/// Process-wide (but index-scoped) state recording which embedding
/// provider/model vectors in the index were written against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiScopeMeta {
    pub embed_base_url: String,
    pub embed_model: String,
}

/// The outcome of [`crate::store::Index::upsert_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new `(collection, path)` slot was created.
    Inserted,
    /// The body was byte-identical to the current active version; nothing
    /// changed logically (the hash is unchanged, no new row was needed).
    Unchanged,
    /// The prior active version at this slot was deactivated and a new
    /// active version inserted.
    Replaced,
}

/// The result of an `upsert_document` call: the content hash plus how it
/// was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertResult {
    pub hash: String,
    pub outcome: UpsertOutcome,
}

/// Compute the deterministic content digest of a document body.
///
/// SHA-256 over the UTF-8 bytes, rendered as lowercase hex. This is the
/// `hash` referenced throughout the data model: it is immutable, and
/// distinct bodies are (cryptographically) distinct under it.
pub fn hash_content(body: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_content("hello world");
        let b = hash_content("hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_bodies_hash_differently() {
        assert_ne!(hash_content("a"), hash_content("b"));
    }

    #[test]
    fn docid_is_first_six_hex_chars() {
        let doc = Document {
            id: 1,
            collection: "notes".into(),
            path: "a.md".into(),
            title: "A".into(),
            hash: "abcdef0123456789".into(),
            display_path: None,
            active: true,
            created_at: 0,
            modified_at: 0,
        };
        assert_eq!(doc.docid(), "abcdef");
    }

    #[test]
    fn shown_path_prefers_display_path() {
        let mut doc = Document {
            id: 1,
            collection: "notes".into(),
            path: "a.md".into(),
            title: "A".into(),
            hash: "abc".into(),
            display_path: None,
            active: true,
            created_at: 0,
            modified_at: 0,
        };
        assert_eq!(doc.shown_path(), "a.md");
        doc.display_path = Some("renamed.md".into());
        assert_eq!(doc.shown_path(), "renamed.md");
    }
}
