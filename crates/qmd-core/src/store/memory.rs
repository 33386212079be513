//! In-memory [`Index`] implementation for unit tests.
//!
//! Uses `HashMap`/`Vec` behind `std::sync::RwLock`, mirroring the shape of
//! the file's `InMemoryStore` elsewhere in this codebase. FTS is simulated
//! by substring term matching rather than real BM25 — good enough to
//! exercise the retrieval pipeline and query compiler without a SQLite
//! dependency in this crate.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::chunk::chunk_body;
use crate::error::{QmdError, Result};
use crate::models::{
    hash_content, ApiScopeMeta, Collection, Document, PathContext, SearchHistoryEntry,
    UpsertOutcome, UpsertResult,
};

use super::{
    ChunkVectorInsert, FtsHit, Index, IndexStats, NewHistoryEntry, PendingEmbed, VecHit,
};

struct StoredVector {
    seq: i64,
    pos: i64,
    embedding: Vec<f32>,
    #[allow(dead_code)]
    model: String,
    #[allow(dead_code)]
    embedded_at: i64,
}

#[derive(Default)]
struct State {
    next_collection_id: i64,
    next_document_id: i64,
    next_history_id: i64,
    collections: HashMap<String, Collection>,
    content: HashMap<String, String>,
    documents: Vec<Document>,
    vectors: HashMap<String, Vec<StoredVector>>,
    scope_meta: Option<ApiScopeMeta>,
    path_contexts: Vec<PathContext>,
    global_context: Option<String>,
    history: Vec<SearchHistoryEntry>,
}

/// In-memory [`Index`] for tests: no persistence, no FTS5, brute-force
/// vector search over every stored chunk vector.
pub struct InMemoryIndex {
    state: RwLock<State>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        (dot / (mag_a * mag_b)) as f64
    }
}

/// Extract bare search terms from a compiled FTS5 MATCH expression, good
/// enough for substring scoring against raw text: strips quoting,
/// boolean/grouping syntax, and prefix/negation markers.
fn extract_terms(match_expr: &str) -> Vec<String> {
    match_expr
        .split(|c: char| c.is_whitespace() || "()\"".contains(c))
        .filter(|t| !t.is_empty())
        .filter(|t| !matches!(*t, "AND" | "OR" | "NOT"))
        .map(|t| t.trim_start_matches('-').trim_end_matches('*').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[async_trait]
impl Index for InMemoryIndex {
    async fn upsert_collection(
        &self,
        name: &str,
        root: &str,
        pattern: &str,
        context: Option<&str>,
    ) -> Result<Collection> {
        let mut state = self.state.write().unwrap();
        let id = if let Some(existing) = state.collections.get(name) {
            existing.id
        } else {
            state.next_collection_id += 1;
            state.next_collection_id
        };
        let created_at = state
            .collections
            .get(name)
            .map(|c| c.created_at)
            .unwrap_or(0);
        let collection = Collection {
            id,
            name: name.to_string(),
            root: root.to_string(),
            pattern: pattern.to_string(),
            context: context.map(|s| s.to_string()),
            created_at,
        };
        state.collections.insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        Ok(self.state.read().unwrap().collections.get(name).cloned())
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(self.state.read().unwrap().collections.values().cloned().collect())
    }

    async fn upsert_document(
        &self,
        collection: &str,
        path: &str,
        title: &str,
        body: &str,
        modified_at: i64,
    ) -> Result<UpsertResult> {
        let hash = hash_content(body);
        let mut state = self.state.write().unwrap();

        let current = state
            .documents
            .iter()
            .position(|d| d.active && d.collection == collection && d.path == path);

        if let Some(idx) = current {
            if state.documents[idx].hash == hash {
                return Ok(UpsertResult {
                    hash,
                    outcome: UpsertOutcome::Unchanged,
                });
            }
            state.documents[idx].active = false;
        }

        state.content.entry(hash.clone()).or_insert_with(|| body.to_string());

        state.next_document_id += 1;
        let id = state.next_document_id;
        state.documents.push(Document {
            id,
            collection: collection.to_string(),
            path: path.to_string(),
            title: title.to_string(),
            hash: hash.clone(),
            display_path: None,
            active: true,
            created_at: modified_at,
            modified_at,
        });

        Ok(UpsertResult {
            hash,
            outcome: if current.is_some() {
                UpsertOutcome::Replaced
            } else {
                UpsertOutcome::Inserted
            },
        })
    }

    async fn deactivate_document(&self, collection: &str, path: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        for doc in state.documents.iter_mut() {
            if doc.active && doc.collection == collection && doc.path == path {
                doc.active = false;
            }
        }
        Ok(())
    }

    async fn document_by_path(&self, collection: &str, path: &str) -> Result<Option<Document>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .documents
            .iter()
            .find(|d| d.active && d.collection == collection && d.path == path)
            .cloned())
    }

    async fn documents_by_hash(&self, hash: &str) -> Result<Vec<Document>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .documents
            .iter()
            .filter(|d| d.active && d.hash == hash)
            .cloned()
            .collect())
    }

    async fn list_active_documents(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .documents
            .iter()
            .filter(|d| d.active && d.collection == collection)
            .cloned()
            .collect())
    }

    async fn document_by_docid(&self, docid: &str) -> Result<Document> {
        let state = self.state.read().unwrap();
        let matches: Vec<&Document> = state
            .documents
            .iter()
            .filter(|d| d.active && d.hash.starts_with(docid))
            .collect();

        let distinct_hashes: std::collections::HashSet<&str> =
            matches.iter().map(|d| d.hash.as_str()).collect();

        match distinct_hashes.len() {
            0 => Err(QmdError::NotFound(format!("docid {docid}"))),
            1 => {
                let mut candidates = matches;
                candidates.sort_by_key(|d| std::cmp::Reverse(d.modified_at));
                Ok((*candidates[0]).clone())
            }
            n => Err(QmdError::AmbiguousDocId {
                docid: docid.to_string(),
                candidates: n,
            }),
        }
    }

    async fn get_document_by_id(&self, id: i64) -> Result<Option<Document>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .documents
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn gc(&self) -> Result<u64> {
        let mut state = self.state.write().unwrap();
        let live: std::collections::HashSet<String> = state
            .documents
            .iter()
            .filter(|d| d.active)
            .map(|d| d.hash.clone())
            .chain(state.vectors.keys().cloned())
            .collect();
        let before = state.content.len();
        state.content.retain(|hash, _| live.contains(hash));
        Ok((before - state.content.len()) as u64)
    }

    async fn all_content(&self) -> Result<Vec<PendingEmbed>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .content
            .iter()
            .map(|(hash, body)| PendingEmbed {
                hash: hash.clone(),
                body: body.clone(),
            })
            .collect())
    }

    async fn fts_search(&self, match_expr: &str, limit: i64) -> Result<Vec<FtsHit>> {
        let terms = extract_terms(match_expr);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state.read().unwrap();
        let mut hits: Vec<FtsHit> = state
            .documents
            .iter()
            .filter(|d| d.active)
            .filter_map(|d| {
                let body = state.content.get(&d.hash).cloned().unwrap_or_default();
                let haystack = format!("{} {}", d.title, body).to_lowercase();
                let score: f64 = terms
                    .iter()
                    .map(|t| haystack.matches(t.as_str()).count() as f64)
                    .sum();
                if score > 0.0 {
                    Some(FtsHit {
                        document_id: d.id,
                        raw_score: score,
                    })
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|a, b| b.raw_score.partial_cmp(&a.raw_score).unwrap());
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn pending_embeds(&self, max_file_bytes: u64, limit: usize) -> Result<Vec<PendingEmbed>> {
        let state = self.state.read().unwrap();
        let mut out = Vec::new();
        for (hash, body) in state.content.iter() {
            if body.len() as u64 > max_file_bytes {
                continue;
            }
            let expected = chunk_body(body).len();
            let present = state.vectors.get(hash).map(|v| v.len()).unwrap_or(0);
            if present != expected {
                out.push(PendingEmbed {
                    hash: hash.clone(),
                    body: body.clone(),
                });
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn replace_chunk_vectors(&self, hash: &str, vectors: &[ChunkVectorInsert]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if let Some(existing_dims) = state
            .vectors
            .values()
            .flat_map(|v| v.iter())
            .map(|v| v.embedding.len())
            .next()
        {
            for v in vectors {
                if v.embedding.len() != existing_dims {
                    return Err(QmdError::VectorDimensionMismatch {
                        expected: existing_dims,
                        actual: v.embedding.len(),
                    });
                }
            }
        }
        let rows = vectors
            .iter()
            .map(|v| StoredVector {
                seq: v.seq,
                pos: v.pos,
                embedding: v.embedding.clone(),
                model: v.model.clone(),
                embedded_at: 0,
            })
            .collect();
        state.vectors.insert(hash.to_string(), rows);
        Ok(())
    }

    async fn chunk_seqs(&self, hash: &str) -> Result<Vec<i64>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .vectors
            .get(hash)
            .map(|v| v.iter().map(|row| row.seq).collect())
            .unwrap_or_default())
    }

    async fn any_vectors_exist(&self) -> Result<bool> {
        Ok(self.state.read().unwrap().vectors.values().any(|v| !v.is_empty()))
    }

    async fn vector_dims(&self) -> Result<Option<usize>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .vectors
            .values()
            .flat_map(|v| v.iter())
            .map(|v| v.embedding.len())
            .next())
    }

    async fn search_vec(
        &self,
        query_vec: &[f32],
        k: usize,
        collections: &[String],
        hash_allowlist: Option<&[String]>,
    ) -> Result<Vec<VecHit>> {
        let state = self.state.read().unwrap();
        let mut candidates = Vec::new();
        for doc in state.documents.iter().filter(|d| d.active) {
            if !collections.is_empty() && !collections.iter().any(|c| c == &doc.collection) {
                continue;
            }
            if let Some(allow) = hash_allowlist {
                if !allow.iter().any(|h| h == &doc.hash) {
                    continue;
                }
            }
            if let Some(rows) = state.vectors.get(&doc.hash) {
                for row in rows {
                    candidates.push(VecHit {
                        document_id: doc.id,
                        hash: doc.hash.clone(),
                        seq: row.seq,
                        pos: row.pos,
                        cosine: cosine(query_vec, &row.embedding),
                    });
                }
            }
        }
        candidates.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap());
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn get_scope_meta(&self) -> Result<Option<ApiScopeMeta>> {
        Ok(self.state.read().unwrap().scope_meta.clone())
    }

    async fn set_scope_meta(&self, meta: ApiScopeMeta) -> Result<()> {
        self.state.write().unwrap().scope_meta = Some(meta);
        Ok(())
    }

    async fn clear_scope_meta(&self) -> Result<()> {
        self.state.write().unwrap().scope_meta = None;
        Ok(())
    }

    async fn path_contexts(&self, collection: &str) -> Result<Vec<PathContext>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .path_contexts
            .iter()
            .filter(|pc| pc.collection == collection)
            .cloned()
            .collect())
    }

    async fn set_path_context(&self, collection: &str, prefix: &str, text: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state
            .path_contexts
            .retain(|pc| !(pc.collection == collection && pc.prefix == prefix));
        state.path_contexts.push(PathContext {
            collection: collection.to_string(),
            prefix: prefix.to_string(),
            context_text: text.to_string(),
        });
        Ok(())
    }

    async fn global_context(&self) -> Result<Option<String>> {
        Ok(self.state.read().unwrap().global_context.clone())
    }

    async fn set_global_context(&self, text: &str) -> Result<()> {
        self.state.write().unwrap().global_context = Some(text.to_string());
        Ok(())
    }

    async fn record_history(&self, entry: NewHistoryEntry) -> Result<i64> {
        let mut state = self.state.write().unwrap();
        state.next_history_id += 1;
        let id = state.next_history_id;
        state.history.push(SearchHistoryEntry {
            id,
            ts: entry.ts,
            kind: entry.kind,
            query: entry.query,
            result_count: entry.result_count,
            index_name: entry.index_name,
        });
        Ok(id)
    }

    async fn list_history(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>> {
        let state = self.state.read().unwrap();
        let mut entries = state.history.clone();
        entries.sort_by_key(|e| std::cmp::Reverse(e.id));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let state = self.state.read().unwrap();
        Ok(IndexStats {
            collections: state.collections.len() as i64,
            active_documents: state.documents.iter().filter(|d| d.active).count() as i64,
            content_rows: state.content.len() as i64,
            embedded_chunks: state.vectors.values().map(|v| v.len() as i64).sum(),
            vector_dims: state
                .vectors
                .values()
                .flat_map(|v| v.iter())
                .map(|v| v.embedding.len())
                .next(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_for_identical_body() {
        let idx = InMemoryIndex::new();
        let a = idx
            .upsert_document("notes", "a.md", "A", "hello world", 1)
            .await
            .unwrap();
        assert_eq!(a.outcome, UpsertOutcome::Inserted);
        let b = idx
            .upsert_document("notes", "a.md", "A", "hello world", 2)
            .await
            .unwrap();
        assert_eq!(b.outcome, UpsertOutcome::Unchanged);
        assert_eq!(a.hash, b.hash);
    }

    #[tokio::test]
    async fn upsert_replaces_on_changed_body() {
        let idx = InMemoryIndex::new();
        idx.upsert_document("notes", "a.md", "A", "v1", 1).await.unwrap();
        let r = idx.upsert_document("notes", "a.md", "A", "v2", 2).await.unwrap();
        assert_eq!(r.outcome, UpsertOutcome::Replaced);
        let doc = idx.document_by_path("notes", "a.md").await.unwrap().unwrap();
        assert_eq!(doc.hash, r.hash);
    }

    #[tokio::test]
    async fn docid_lookup_is_ambiguous_across_distinct_hashes() {
        let idx = InMemoryIndex::new();
        // Pick two bodies whose SHA-256 hex digests happen to share no
        // guaranteed prefix in general, so instead assert the unambiguous
        // path and the not-found path, which do not depend on hash values.
        idx.upsert_document("notes", "a.md", "A", "alpha", 1).await.unwrap();
        let doc = idx.document_by_path("notes", "a.md").await.unwrap().unwrap();
        let docid = doc.docid();
        let found = idx.document_by_docid(&docid).await.unwrap();
        assert_eq!(found.hash, doc.hash);

        let err = idx.document_by_docid("zzzzzz").await.unwrap_err();
        assert!(matches!(err, QmdError::NotFound(_)));
    }

    #[tokio::test]
    async fn gc_removes_unreferenced_content_only() {
        let idx = InMemoryIndex::new();
        idx.upsert_document("notes", "a.md", "A", "keep me", 1).await.unwrap();
        idx.upsert_document("notes", "b.md", "B", "throwaway", 1).await.unwrap();
        idx.deactivate_document("notes", "b.md").await.unwrap();
        let removed = idx.gc().await.unwrap();
        assert_eq!(removed, 1);
        assert!(idx.document_by_path("notes", "a.md").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn search_vec_respects_collection_filter() {
        let idx = InMemoryIndex::new();
        idx.upsert_document("work", "a.md", "A", "alpha", 1).await.unwrap();
        let doc_a = idx.document_by_path("work", "a.md").await.unwrap().unwrap();
        idx.replace_chunk_vectors(
            &doc_a.hash,
            &[ChunkVectorInsert {
                seq: 0,
                pos: 0,
                embedding: vec![1.0, 0.0],
                model: "test".into(),
            }],
        )
        .await
        .unwrap();

        idx.upsert_document("personal", "b.md", "B", "beta", 1).await.unwrap();
        let doc_b = idx.document_by_path("personal", "b.md").await.unwrap().unwrap();
        idx.replace_chunk_vectors(
            &doc_b.hash,
            &[ChunkVectorInsert {
                seq: 0,
                pos: 0,
                embedding: vec![1.0, 0.0],
                model: "test".into(),
            }],
        )
        .await
        .unwrap();

        let hits = idx
            .search_vec(&[1.0, 0.0], 10, &["work".to_string()], None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, doc_a.id);
    }
}
