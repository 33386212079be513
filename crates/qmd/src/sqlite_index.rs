//! SQLite-backed [`Index`] implementation.
//!
//! Maps every `Index` operation onto the schema created by [`crate::migrate`],
//! the way the teacher's `SqliteStore` maps `Store` onto its own schema: one
//! `struct` wrapping a [`SqlitePool`], one `impl` block, direct `sqlx::query`
//! calls, no query builder.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use qmd_core::chunk::chunk_body;
use qmd_core::error::{QmdError, Result};
use qmd_core::models::{
    ApiScopeMeta, Collection, Document, PathContext, SearchHistoryEntry, UpsertOutcome,
    UpsertResult,
};
use qmd_core::store::{
    ChunkVectorInsert, FtsHit, Index, IndexStats, NewHistoryEntry, PendingEmbed, VecHit,
};

use crate::vecutil::{blob_to_vec, cosine_similarity, vec_to_blob};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn io_err(e: impl std::fmt::Display) -> QmdError {
    QmdError::IoFailure(e.to_string())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: row.get::<i64, _>("id"),
        collection: row.get("collection"),
        path: row.get("path"),
        title: row.get("title"),
        hash: row.get("hash"),
        display_path: row.get("display_path"),
        active: row.get::<i64, _>("active") != 0,
        created_at: row.get("created_at"),
        modified_at: row.get("modified_at"),
    }
}

fn row_to_collection(row: &sqlx::sqlite::SqliteRow) -> Collection {
    Collection {
        id: row.get("id"),
        name: row.get("name"),
        root: row.get("root"),
        pattern: row.get("pattern"),
        context: row.get("context"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl Index for SqliteIndex {
    async fn upsert_collection(
        &self,
        name: &str,
        root: &str,
        pattern: &str,
        context: Option<&str>,
    ) -> Result<Collection> {
        sqlx::query(
            r#"
            INSERT INTO collections (name, root, pattern, context, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                root = excluded.root,
                pattern = excluded.pattern,
                context = excluded.context
            "#,
        )
        .bind(name)
        .bind(root)
        .bind(pattern)
        .bind(context)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(io_err)?;

        self.get_collection(name)
            .await?
            .ok_or_else(|| QmdError::NotFound(format!("collection {name:?}")))
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        let row = sqlx::query("SELECT * FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(row.as_ref().map(row_to_collection))
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let rows = sqlx::query("SELECT * FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(rows.iter().map(row_to_collection).collect())
    }

    async fn upsert_document(
        &self,
        collection: &str,
        path: &str,
        title: &str,
        body: &str,
        modified_at: i64,
    ) -> Result<UpsertResult> {
        let hash = qmd_core::models::hash_content(body);
        let mut tx = self.pool.begin().await.map_err(io_err)?;

        let existing_content: Option<String> =
            sqlx::query_scalar("SELECT hash FROM content WHERE hash = ?")
                .bind(&hash)
                .fetch_optional(&mut *tx)
                .await
                .map_err(io_err)?;
        if existing_content.is_none() {
            sqlx::query("INSERT INTO content (hash, body, created_at) VALUES (?, ?, ?)")
                .bind(&hash)
                .bind(body)
                .bind(now())
                .execute(&mut *tx)
                .await
                .map_err(io_err)?;
        }

        let existing = sqlx::query(
            "SELECT id, hash FROM documents WHERE collection = ? AND path = ? AND active = 1",
        )
        .bind(collection)
        .bind(path)
        .fetch_optional(&mut *tx)
        .await
        .map_err(io_err)?;

        let outcome = match &existing {
            Some(row) if row.get::<String, _>("hash") == hash => UpsertOutcome::Unchanged,
            Some(row) => {
                let old_id: i64 = row.get("id");
                sqlx::query("UPDATE documents SET active = 0 WHERE id = ?")
                    .bind(old_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(io_err)?;
                sqlx::query("DELETE FROM fts_documents WHERE document_id = ?")
                    .bind(old_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(io_err)?;
                UpsertOutcome::Replaced
            }
            None => UpsertOutcome::Inserted,
        };

        if outcome != UpsertOutcome::Unchanged {
            let created_at = now();
            let new_id: i64 = sqlx::query(
                r#"
                INSERT INTO documents (collection, path, title, hash, display_path, active, created_at, modified_at)
                VALUES (?, ?, ?, ?, NULL, 1, ?, ?)
                "#,
            )
            .bind(collection)
            .bind(path)
            .bind(title)
            .bind(&hash)
            .bind(created_at)
            .bind(modified_at)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?
            .last_insert_rowid();

            sqlx::query(
                "INSERT INTO fts_documents (document_id, title, body) VALUES (?, ?, ?)",
            )
            .bind(new_id)
            .bind(title)
            .bind(body)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;
        }

        tx.commit().await.map_err(io_err)?;
        Ok(UpsertResult { hash, outcome })
    }

    async fn deactivate_document(&self, collection: &str, path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(io_err)?;
        let row = sqlx::query(
            "SELECT id FROM documents WHERE collection = ? AND path = ? AND active = 1",
        )
        .bind(collection)
        .bind(path)
        .fetch_optional(&mut *tx)
        .await
        .map_err(io_err)?;

        if let Some(row) = row {
            let id: i64 = row.get("id");
            sqlx::query("UPDATE documents SET active = 0 WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(io_err)?;
            sqlx::query("DELETE FROM fts_documents WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(io_err)?;
        }
        tx.commit().await.map_err(io_err)?;
        Ok(())
    }

    async fn document_by_path(&self, collection: &str, path: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT * FROM documents WHERE collection = ? AND path = ? AND active = 1",
        )
        .bind(collection)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn documents_by_hash(&self, hash: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE hash = ? AND active = 1")
            .bind(hash)
            .fetch_all(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn list_active_documents(&self, collection: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents WHERE collection = ? AND active = 1")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn document_by_docid(&self, docid: &str) -> Result<Document> {
        let pattern = format!("{docid}%");
        let distinct_hashes: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT hash FROM documents WHERE active = 1 AND hash LIKE ?",
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(io_err)?;

        match distinct_hashes.len() {
            0 => Err(QmdError::NotFound(format!("docid {docid:?}"))),
            1 => {
                let row = sqlx::query(
                    "SELECT * FROM documents WHERE hash = ? AND active = 1 ORDER BY modified_at DESC LIMIT 1",
                )
                .bind(&distinct_hashes[0])
                .fetch_one(&self.pool)
                .await
                .map_err(io_err)?;
                Ok(row_to_document(&row))
            }
            n => Err(QmdError::AmbiguousDocId {
                docid: docid.to_string(),
                candidates: n,
            }),
        }
    }

    async fn get_document_by_id(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn content_body(&self, hash: &str) -> Result<Option<String>> {
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM content WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(body)
    }

    async fn gc(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM content
            WHERE hash NOT IN (SELECT DISTINCT hash FROM documents WHERE active = 1)
              AND hash NOT IN (SELECT DISTINCT hash FROM content_vectors)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(result.rows_affected())
    }

    async fn all_content(&self) -> Result<Vec<PendingEmbed>> {
        let rows = sqlx::query("SELECT hash, body FROM content")
            .fetch_all(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(rows
            .iter()
            .map(|row| PendingEmbed {
                hash: row.get("hash"),
                body: row.get("body"),
            })
            .collect())
    }

    async fn fts_search(&self, match_expr: &str, limit: i64) -> Result<Vec<FtsHit>> {
        let rows = sqlx::query(
            r#"
            SELECT f.document_id AS document_id, bm25(fts_documents) AS score
            FROM fts_documents f
            JOIN documents d ON d.id = f.document_id
            WHERE fts_documents MATCH ? AND d.active = 1
            ORDER BY score
            LIMIT ?
            "#,
        )
        .bind(match_expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(io_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let score: f64 = row.get("score");
                FtsHit {
                    document_id: row.get("document_id"),
                    // bm25() is a cost (lower is better); negate so higher is better,
                    // matching the "raw, unnormalized" convention the rest of the
                    // pipeline (normalize-by-top) expects.
                    raw_score: -score,
                }
            })
            .collect())
    }

    async fn pending_embeds(&self, max_file_bytes: u64, limit: usize) -> Result<Vec<PendingEmbed>> {
        let rows = sqlx::query("SELECT hash, body FROM content WHERE length(body) <= ?")
            .bind(max_file_bytes as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(io_err)?;

        let mut out = Vec::new();
        for row in rows {
            if out.len() >= limit {
                break;
            }
            let hash: String = row.get("hash");
            let body: String = row.get("body");
            let expected = chunk_body(&body).len();
            let present: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_vectors WHERE hash = ?")
                .bind(&hash)
                .fetch_one(&self.pool)
                .await
                .map_err(io_err)?;
            if present as usize != expected {
                out.push(PendingEmbed { hash, body });
            }
        }
        Ok(out)
    }

    async fn replace_chunk_vectors(&self, hash: &str, vectors: &[ChunkVectorInsert]) -> Result<()> {
        if let Some(existing_dims) = self.vector_dims().await? {
            for v in vectors {
                if v.embedding.len() != existing_dims {
                    return Err(QmdError::VectorDimensionMismatch {
                        expected: existing_dims,
                        actual: v.embedding.len(),
                    });
                }
            }
        }

        let mut tx = self.pool.begin().await.map_err(io_err)?;

        sqlx::query("DELETE FROM content_vectors WHERE hash = ?")
            .bind(hash)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;
        sqlx::query("DELETE FROM vectors_vec WHERE hash_seq LIKE ? || '_%'")
            .bind(hash)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;

        let ts = now();
        for v in vectors {
            sqlx::query(
                "INSERT INTO content_vectors (hash, seq, pos, model, embedded_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(hash)
            .bind(v.seq)
            .bind(v.pos)
            .bind(&v.model)
            .bind(ts)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;

            let hash_seq = format!("{hash}_{}", v.seq);
            let blob = vec_to_blob(&v.embedding);
            sqlx::query("INSERT INTO vectors_vec (hash_seq, embedding) VALUES (?, ?)")
                .bind(&hash_seq)
                .bind(&blob)
                .execute(&mut *tx)
                .await
                .map_err(io_err)?;
        }

        tx.commit().await.map_err(io_err)?;
        Ok(())
    }

    async fn chunk_seqs(&self, hash: &str) -> Result<Vec<i64>> {
        let seqs: Vec<i64> =
            sqlx::query_scalar("SELECT seq FROM content_vectors WHERE hash = ? ORDER BY seq")
                .bind(hash)
                .fetch_all(&self.pool)
                .await
                .map_err(io_err)?;
        Ok(seqs)
    }

    async fn any_vectors_exist(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(count > 0)
    }

    async fn vector_dims(&self) -> Result<Option<usize>> {
        let blob: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT embedding FROM vectors_vec LIMIT 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(io_err)?;
        Ok(blob.map(|b| b.len() / 4))
    }

    async fn search_vec(
        &self,
        query_vec: &[f32],
        k: usize,
        collections: &[String],
        hash_allowlist: Option<&[String]>,
    ) -> Result<Vec<VecHit>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id AS document_id, d.collection AS collection, cv.hash AS hash,
                   cv.seq AS seq, cv.pos AS pos, vv.embedding AS embedding
            FROM documents d
            JOIN content_vectors cv ON cv.hash = d.hash
            JOIN vectors_vec vv ON vv.hash_seq = cv.hash || '_' || cv.seq
            WHERE d.active = 1
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(io_err)?;

        let mut candidates: Vec<VecHit> = Vec::new();
        for row in rows {
            let collection: String = row.get("collection");
            if !collections.is_empty() && !collections.iter().any(|c| c == &collection) {
                continue;
            }
            let hash: String = row.get("hash");
            if let Some(allow) = hash_allowlist {
                if !allow.iter().any(|h| h == &hash) {
                    continue;
                }
            }
            let embedding: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&embedding);
            let cosine = cosine_similarity(query_vec, &vec) as f64;
            candidates.push(VecHit {
                document_id: row.get("document_id"),
                hash,
                seq: row.get("seq"),
                pos: row.get("pos"),
                cosine,
            });
        }

        candidates.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap_or(std::cmp::Ordering::Equal));
        candidates.truncate(k);
        Ok(candidates)
    }

    async fn get_scope_meta(&self) -> Result<Option<ApiScopeMeta>> {
        let base_url: Option<String> =
            sqlx::query_scalar("SELECT value FROM api_meta WHERE key = 'embed_base_url'")
                .fetch_optional(&self.pool)
                .await
                .map_err(io_err)?;
        let model: Option<String> =
            sqlx::query_scalar("SELECT value FROM api_meta WHERE key = 'embed_model'")
                .fetch_optional(&self.pool)
                .await
                .map_err(io_err)?;
        Ok(match (base_url, model) {
            (Some(embed_base_url), Some(embed_model)) => Some(ApiScopeMeta {
                embed_base_url,
                embed_model,
            }),
            _ => None,
        })
    }

    async fn set_scope_meta(&self, meta: ApiScopeMeta) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(io_err)?;
        for (key, value) in [
            ("embed_base_url", &meta.embed_base_url),
            ("embed_model", &meta.embed_model),
        ] {
            sqlx::query(
                "INSERT INTO api_meta (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;
        }
        tx.commit().await.map_err(io_err)?;
        Ok(())
    }

    async fn clear_scope_meta(&self) -> Result<()> {
        sqlx::query("DELETE FROM api_meta WHERE key IN ('embed_base_url', 'embed_model')")
            .execute(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(())
    }

    async fn path_contexts(&self, collection: &str) -> Result<Vec<PathContext>> {
        let rows = sqlx::query("SELECT * FROM path_contexts WHERE collection = ? ORDER BY prefix")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(rows
            .iter()
            .map(|row| PathContext {
                collection: row.get("collection"),
                prefix: row.get("prefix"),
                context_text: row.get("context_text"),
            })
            .collect())
    }

    async fn set_path_context(&self, collection: &str, prefix: &str, text: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO path_contexts (collection, prefix, context_text) VALUES (?, ?, ?)
            ON CONFLICT(collection, prefix) DO UPDATE SET context_text = excluded.context_text
            "#,
        )
        .bind(collection)
        .bind(prefix)
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(())
    }

    async fn global_context(&self) -> Result<Option<String>> {
        let text: Option<String> =
            sqlx::query_scalar("SELECT context_text FROM global_context WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(io_err)?;
        Ok(text)
    }

    async fn set_global_context(&self, text: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO global_context (id, context_text) VALUES (1, ?)
            ON CONFLICT(id) DO UPDATE SET context_text = excluded.context_text
            "#,
        )
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(())
    }

    async fn record_history(&self, entry: NewHistoryEntry) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO search_history (ts, kind, query, result_count, index_name) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.ts)
        .bind(&entry.kind)
        .bind(&entry.query)
        .bind(entry.result_count)
        .bind(&entry.index_name)
        .execute(&self.pool)
        .await
        .map_err(io_err)?
        .last_insert_rowid();
        Ok(id)
    }

    async fn list_history(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>> {
        let rows = sqlx::query("SELECT * FROM search_history ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(io_err)?;
        Ok(rows
            .iter()
            .map(|row| SearchHistoryEntry {
                id: row.get("id"),
                ts: row.get("ts"),
                kind: row.get("kind"),
                query: row.get("query"),
                result_count: row.get("result_count"),
                index_name: row.get("index_name"),
            })
            .collect())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let collections: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections")
            .fetch_one(&self.pool)
            .await
            .map_err(io_err)?;
        let active_documents: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE active = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(io_err)?;
        let content_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content")
            .fetch_one(&self.pool)
            .await
            .map_err(io_err)?;
        let embedded_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(io_err)?;
        let vector_dims = self.vector_dims().await?;

        Ok(IndexStats {
            collections,
            active_documents,
            content_rows,
            embedded_chunks,
            vector_dims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn test_index() -> SqliteIndex {
        let pool = db::connect(std::path::Path::new(":memory:")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteIndex::new(pool)
    }

    #[tokio::test]
    async fn upsert_idempotence() {
        let index = test_index().await;
        let r1 = index
            .upsert_document("notes", "a.md", "A", "hello world", 1)
            .await
            .unwrap();
        assert_eq!(r1.outcome, UpsertOutcome::Inserted);
        let r2 = index
            .upsert_document("notes", "a.md", "A", "hello world", 1)
            .await
            .unwrap();
        assert_eq!(r2.outcome, UpsertOutcome::Unchanged);
        assert_eq!(r1.hash, r2.hash);

        let doc = index.document_by_path("notes", "a.md").await.unwrap().unwrap();
        assert!(doc.active);
    }

    #[tokio::test]
    async fn upsert_replace_on_change() {
        let index = test_index().await;
        index
            .upsert_document("notes", "a.md", "A", "version one", 1)
            .await
            .unwrap();
        let r2 = index
            .upsert_document("notes", "a.md", "A", "version two", 2)
            .await
            .unwrap();
        assert_eq!(r2.outcome, UpsertOutcome::Replaced);

        let doc = index.document_by_path("notes", "a.md").await.unwrap().unwrap();
        assert_eq!(doc.hash, r2.hash);

        let hits = index.fts_search("\"one\"*", 10).await.unwrap();
        assert!(hits.is_empty(), "old version should no longer be searchable");
    }

    #[tokio::test]
    async fn docid_lookup_resolves_and_detects_ambiguity() {
        let index = test_index().await;
        index
            .upsert_document("notes", "a.md", "A", "unique body one", 1)
            .await
            .unwrap();
        let doc = index.document_by_path("notes", "a.md").await.unwrap().unwrap();
        let found = index.document_by_docid(&doc.docid()).await.unwrap();
        assert_eq!(found.id, doc.id);

        let missing = index.document_by_docid("ffffff").await;
        assert!(matches!(missing, Err(QmdError::NotFound(_))));
    }

    #[tokio::test]
    async fn gc_removes_orphaned_content() {
        let index = test_index().await;
        index
            .upsert_document("notes", "a.md", "A", "will be deleted", 1)
            .await
            .unwrap();
        index.deactivate_document("notes", "a.md").await.unwrap();
        let removed = index.gc().await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn fts_search_finds_active_documents() {
        let index = test_index().await;
        index
            .upsert_document("notes", "a.md", "Ownership", "rust ownership and borrowing", 1)
            .await
            .unwrap();
        let hits = index.fts_search("\"ownership\"*", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn vector_dimension_mismatch_is_rejected() {
        let index = test_index().await;
        index.upsert_document("notes", "a.md", "A", "body", 1).await.unwrap();
        let doc = index.document_by_path("notes", "a.md").await.unwrap().unwrap();
        index
            .replace_chunk_vectors(
                &doc.hash,
                &[ChunkVectorInsert {
                    seq: 0,
                    pos: 0,
                    embedding: vec![1.0, 0.0, 0.0],
                    model: "m".into(),
                }],
            )
            .await
            .unwrap();

        index.upsert_document("notes", "b.md", "B", "other body", 1).await.unwrap();
        let doc_b = index.document_by_path("notes", "b.md").await.unwrap().unwrap();
        let err = index
            .replace_chunk_vectors(
                &doc_b.hash,
                &[ChunkVectorInsert {
                    seq: 0,
                    pos: 0,
                    embedding: vec![1.0, 0.0],
                    model: "m".into(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QmdError::VectorDimensionMismatch { expected: 3, actual: 2 }));
    }
}
