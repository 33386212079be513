//! Retrieval Pipeline (§4.6): keyword search, semantic search, and the
//! hybrid "deep" pipeline (query expansion → per-channel search →
//! Reciprocal Rank Fusion → chunk selection → optional rerank).
//!
//! Every entry point takes `Arc<dyn Index>` and `Arc<dyn Gateway>` rather
//! than generic parameters, so that a caller wanting concurrent per-channel
//! searches (e.g. by handing each channel to its own `tokio::spawn`ed task)
//! can clone the `Arc`s into `'static` closures. The pipeline itself awaits
//! each channel in sequence and degrades a failing channel to a warning
//! rather than failing the whole search.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chunk::chunk_body;
use crate::error::{QmdError, Result};
use crate::gateway::{
    fallback_expansion, CancelToken, ExpandOptions, ExpandedSubQuery, Gateway, GatewayBackend,
    RerankDoc, RerankOptions,
};
use crate::intent::{extract_intent_terms, extract_query_terms, score_chunk};
use crate::models::{ApiScopeMeta, Document};
use crate::query::{compile_lex_query, validate_semantic_query, SubQueryKind};
use crate::rrf::{normalize_by_top, reciprocal_rank_fusion, WeightedList};
use crate::scope::{check_scope_guard, normalize_scope, ConfiguredBackend};
use crate::snippet::{extract_snippet, DEFAULT_SNIPPET_MAX_LEN};
use crate::store::{Index, VecHit};

/// Per-channel and per-list over-fetch multiplier: each channel asks the
/// store for `limit * OVER_FETCH` candidates before enrichment/fusion
/// narrows back down to `limit`, so that filtering (collection scope,
/// deduping by document) doesn't starve the final result set.
const OVER_FETCH: usize = 4;

/// RRF weight given to the user's own literal query relative to Gateway
/// expansion lists (§4.6.3 step 3).
const ORIGINAL_QUERY_WEIGHT: f64 = 2.0;
const EXPANSION_WEIGHT: f64 = 1.0;

/// Strong-signal bypass thresholds (§4.6.3 step 5, §8 invariant 7).
const BYPASS_MIN_TOP: f64 = 0.85;
const BYPASS_MIN_GAP: f64 = 0.15;

/// Number of fused candidates sent to the reranker (§4.6.3 step 6).
const RERANK_BODY_CHARS: usize = 500;

/// Which channel produced a [`SearchHit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSource {
    Fts,
    Vec,
    Deep,
}

impl HitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitSource::Fts => "fts",
            HitSource::Vec => "vec",
            HitSource::Deep => "deep",
        }
    }
}

/// One enriched, ready-to-display search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document_id: i64,
    pub docid: String,
    pub title: String,
    pub path: String,
    pub collection: String,
    pub modified_at: i64,
    pub score: f64,
    pub source: HitSource,
    pub snippet: String,
    pub snippet_line: usize,
    /// Starting character offset of the chunk that drove this hit, if the
    /// document was reached via a semantic channel (§4.6.4).
    pub chunk_pos: Option<i64>,
}

/// Common inputs to every search entry point.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_score: Option<f64>,
    pub collections: Vec<String>,
    /// Free-form text biasing chunk/snippet selection (§4.6.4). Disables
    /// the strong-signal bypass when present.
    pub intent: Option<String>,
}

impl SearchOptions {
    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            10
        } else {
            self.limit
        }
    }
}

fn apply_filters(mut hits: Vec<SearchHit>, opts: &SearchOptions) -> Vec<SearchHit> {
    if let Some(min) = opts.min_score {
        hits.retain(|h| h.score >= min);
    }
    hits.truncate(opts.effective_limit());
    hits
}

async fn enrich_fts_hit(
    index: &Arc<dyn Index>,
    document_id: i64,
    raw_score: f64,
    top_raw_score: f64,
    query_terms: &[String],
    intent: Option<&str>,
    source: HitSource,
) -> Result<Option<SearchHit>> {
    let Some(doc) = index.get_document_by_id(document_id).await? else {
        return Ok(None);
    };
    if !doc.active {
        return Ok(None);
    }
    let body = index.content_body(&doc.hash).await?.unwrap_or_default();
    let snippet = extract_snippet(&body, &query_terms.join(" "), intent, DEFAULT_SNIPPET_MAX_LEN);
    let score = if top_raw_score > 0.0 {
        raw_score / top_raw_score
    } else {
        0.0
    };
    Ok(Some(SearchHit {
        document_id,
        docid: doc.docid(),
        title: doc.title.clone(),
        path: doc.shown_path().to_string(),
        collection: doc.collection.clone(),
        modified_at: doc.modified_at,
        score,
        source,
        snippet: snippet.text,
        snippet_line: snippet.line,
        chunk_pos: None,
    }))
}

/// Keyword search (§4.6.1): compile the `lex:` body, consult the FTS
/// Index, enrich each hit with title/path/collection/modified/docid/snippet.
pub async fn keyword_search(
    index: &Arc<dyn Index>,
    query: &str,
    opts: &SearchOptions,
) -> Result<Vec<SearchHit>> {
    let Some(match_expr) = compile_lex_query(query, 0)? else {
        return Ok(Vec::new());
    };
    let fetch_k = (opts.effective_limit() * OVER_FETCH) as i64;
    let hits = index.fts_search(&match_expr, fetch_k).await?;
    let top_raw = hits.first().map(|h| h.raw_score).unwrap_or(0.0);
    let query_terms = extract_query_terms(query);

    let mut out = Vec::new();
    for hit in &hits {
        if !opts.collections.is_empty() {
            if let Some(doc) = index.get_document_by_id(hit.document_id).await? {
                if !opts.collections.iter().any(|c| c == &doc.collection) {
                    continue;
                }
            }
        }
        if let Some(sh) = enrich_fts_hit(
            index,
            hit.document_id,
            hit.raw_score,
            top_raw,
            &query_terms,
            opts.intent.as_deref(),
            HitSource::Fts,
        )
        .await?
        {
            out.push(sh);
        }
    }
    Ok(apply_filters(out, opts))
}

/// Resolve the [`Document`] and body for a vector hit's owning document,
/// returning `None` if it is no longer active (§8 invariant 4).
async fn active_document(index: &Arc<dyn Index>, document_id: i64) -> Result<Option<(Document, String)>> {
    let Some(doc) = index.get_document_by_id(document_id).await? else {
        return Ok(None);
    };
    if !doc.active {
        return Ok(None);
    }
    let body = index.content_body(&doc.hash).await?.unwrap_or_default();
    Ok(Some((doc, body)))
}

/// Pick the best chunk among a document's vector hits for snippet/position
/// anchoring (§4.6.4): intent-weighted term scoring over each candidate
/// chunk's own text, falling back to the hit with the highest cosine
/// similarity when no query/intent term matches any chunk.
fn best_chunk(
    hits: &[&VecHit],
    body: &str,
    query_terms: &[String],
    intent_terms: &[String],
) -> (i64, f64) {
    let spans = chunk_body(body);
    let mut best_pos = hits
        .iter()
        .max_by(|a, b| a.cosine.partial_cmp(&b.cosine).unwrap())
        .map(|h| h.pos)
        .unwrap_or(0);
    let mut best_score = f64::MIN;
    for hit in hits {
        let text = spans
            .iter()
            .find(|s| s.seq == hit.seq)
            .map(|s| s.text.as_str())
            .unwrap_or("");
        let score = score_chunk(text, query_terms, intent_terms);
        if score > best_score {
            best_score = score;
            best_pos = hit.pos;
        }
    }
    (best_pos, best_score)
}

async fn scope_guard_for_vectors(index: &Arc<dyn Index>, gateway: &Arc<dyn Gateway>) -> Result<()> {
    let model_info = gateway.model_info();
    let configured = match model_info.backend {
        GatewayBackend::Local => ConfiguredBackend::Local,
        GatewayBackend::Api => ConfiguredBackend::Api,
    };
    let current: Option<ApiScopeMeta> = match (&model_info.embed_base_url, &model_info.embed_model) {
        (Some(base_url), Some(model)) => Some(normalize_scope(base_url, model)),
        _ => None,
    };
    let stored: Option<ApiScopeMeta> = index.get_scope_meta().await?;
    let any_vectors = index.any_vectors_exist().await?;
    check_scope_guard(configured, stored.as_ref(), current.as_ref(), any_vectors)
}

/// Embed `text`, guarded by the Scope Guard, and run an approximate
/// nearest-neighbor search, returning one [`SearchHit`] per *document*
/// (best chunk only) rather than one per chunk.
async fn semantic_candidates(
    index: &Arc<dyn Index>,
    gateway: &Arc<dyn Gateway>,
    text: &str,
    opts: &SearchOptions,
    cancel: &CancelToken,
) -> Result<Vec<(i64, Vec<VecHit>)>> {
    validate_semantic_query(text, 0)?;
    scope_guard_for_vectors(index, gateway).await?;

    let Some(embedded) = gateway.embed(text, cancel).await? else {
        return Ok(Vec::new());
    };

    let k = opts.effective_limit() * OVER_FETCH;
    let hits = index
        .search_vec(&embedded.vector, k, &opts.collections, None)
        .await?;

    let mut by_doc: HashMap<i64, Vec<VecHit>> = HashMap::new();
    for hit in hits {
        by_doc.entry(hit.document_id).or_default().push(hit);
    }
    let mut grouped: Vec<(i64, Vec<VecHit>)> = by_doc.into_iter().collect();
    grouped.sort_by(|a, b| {
        let a_best = a.1.iter().map(|h| h.cosine).fold(f64::MIN, f64::max);
        let b_best = b.1.iter().map(|h| h.cosine).fold(f64::MIN, f64::max);
        b_best.partial_cmp(&a_best).unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(grouped)
}

/// Semantic search (§4.6.2): embed the query, search the vector store,
/// group by document keeping the best chunk, enrich.
pub async fn semantic_search(
    index: &Arc<dyn Index>,
    gateway: &Arc<dyn Gateway>,
    query: &str,
    opts: &SearchOptions,
) -> Result<Vec<SearchHit>> {
    let cancel = CancelToken::new();
    let grouped = semantic_candidates(index, gateway, query, opts, &cancel).await?;
    let query_terms = extract_query_terms(query);
    let intent_terms = opts
        .intent
        .as_deref()
        .map(extract_intent_terms)
        .unwrap_or_default();

    let mut out = Vec::new();
    for (document_id, hits) in grouped {
        let Some((doc, body)) = active_document(index, document_id).await? else {
            continue;
        };
        let refs: Vec<&VecHit> = hits.iter().collect();
        let (pos, _) = best_chunk(&refs, &body, &query_terms, &intent_terms);
        let best_cosine = hits.iter().map(|h| h.cosine).fold(f64::MIN, f64::max);
        let snippet = extract_snippet(&body, query, opts.intent.as_deref(), DEFAULT_SNIPPET_MAX_LEN);
        out.push(SearchHit {
            document_id,
            docid: doc.docid(),
            title: doc.title.clone(),
            path: doc.shown_path().to_string(),
            collection: doc.collection.clone(),
            modified_at: doc.modified_at,
            score: best_cosine,
            source: HitSource::Vec,
            snippet: snippet.text,
            snippet_line: snippet.line,
            chunk_pos: Some(pos),
        });
    }
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(apply_filters(out, opts))
}

/// One channel's ranked document-id list plus its RRF weight, produced
/// while running the deep pipeline's sub-queries (§4.6.3 steps 1-2).
struct ChannelResult {
    ranked_doc_ids: Vec<i64>,
    weight: f64,
    /// Retained so snippet/chunk selection can reuse the vector hits for
    /// `vec`/`hyde` channels without re-embedding.
    vec_hits: HashMap<i64, Vec<VecHit>>,
}

async fn run_channel(
    index: &Arc<dyn Index>,
    gateway: &Arc<dyn Gateway>,
    sub: &ExpandedSubQuery,
    weight: f64,
    opts: &SearchOptions,
    cancel: &CancelToken,
) -> Result<ChannelResult> {
    match sub.kind {
        SubQueryKind::Lex => {
            let Some(match_expr) = compile_lex_query(&sub.text, 0)? else {
                return Ok(ChannelResult {
                    ranked_doc_ids: Vec::new(),
                    weight,
                    vec_hits: HashMap::new(),
                });
            };
            let fetch_k = (opts.effective_limit() * OVER_FETCH) as i64;
            let hits = index.fts_search(&match_expr, fetch_k).await?;
            Ok(ChannelResult {
                ranked_doc_ids: hits.into_iter().map(|h| h.document_id).collect(),
                weight,
                vec_hits: HashMap::new(),
            })
        }
        SubQueryKind::Vec => {
            let grouped = semantic_candidates(index, gateway, &sub.text, opts, cancel).await?;
            let ranked_doc_ids = grouped.iter().map(|(id, _)| *id).collect();
            Ok(ChannelResult {
                ranked_doc_ids,
                weight,
                vec_hits: grouped.into_iter().collect(),
            })
        }
        SubQueryKind::Hyde => {
            let passage = gateway.generate(&sub.text, cancel).await?;
            let grouped = semantic_candidates(index, gateway, &passage, opts, cancel).await?;
            let ranked_doc_ids = grouped.iter().map(|(id, _)| *id).collect();
            Ok(ChannelResult {
                ranked_doc_ids,
                weight,
                vec_hits: grouped.into_iter().collect(),
            })
        }
    }
}

/// Collapse internal newlines to spaces and truncate to `max_len`
/// characters, per §4.6.3 step 6's rerank input preparation.
fn truncate_for_rerank(body: &str, max_len: usize) -> String {
    let collapsed: String = body.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();
    collapsed.chars().take(max_len).collect()
}

/// Pure form of the strong-signal bypass test (§4.6.3 step 5, §8
/// invariant 7): bypass triggers iff there is no intent, the top
/// (normalized) score is at least [`BYPASS_MIN_TOP`], and it leads the
/// runner-up by at least [`BYPASS_MIN_GAP`].
pub fn strong_signal_bypass(top: f64, second: f64, has_intent: bool) -> bool {
    !has_intent && top >= BYPASS_MIN_TOP && (top - second) >= BYPASS_MIN_GAP
}

/// Hybrid / "deep" search (§4.6.3): expand the query into typed
/// sub-queries, run each on its channel, fuse with RRF, optionally
/// rerank, enrich.
pub async fn deep_search(
    index: &Arc<dyn Index>,
    gateway: &Arc<dyn Gateway>,
    query: &str,
    opts: &SearchOptions,
) -> Result<Vec<SearchHit>> {
    let cancel = CancelToken::new();

    let expand_opts = ExpandOptions {
        include_lexical: true,
    };
    let expanded = match gateway.expand_query(query, &expand_opts, &cancel).await {
        Ok(subs) => subs,
        Err(QmdError::AuthMissing) => fallback_expansion(query),
        Err(e) => return Err(e),
    };
    if expanded.is_empty() {
        return Ok(Vec::new());
    }

    // The first `lex` sub-query is treated as the user's own literal
    // query and carries the stronger RRF weight (§4.6.3 step 3); every
    // other sub-query (additional lex lines, vec, hyde) is an expansion.
    let original_idx = expanded.iter().position(|s| s.kind == SubQueryKind::Lex);

    let mut channels = Vec::with_capacity(expanded.len());
    for (i, sub) in expanded.iter().enumerate() {
        let weight = if Some(i) == original_idx {
            ORIGINAL_QUERY_WEIGHT
        } else {
            EXPANSION_WEIGHT
        };
        match run_channel(index, gateway, sub, weight, opts, &cancel).await {
            Ok(channel) => channels.push(channel),
            Err(e) => {
                tracing::warn!(error = %e, sub_query = %sub.text, "deep search channel failed, degrading");
            }
        }
    }

    let lists: Vec<WeightedList<i64>> = channels
        .iter()
        .filter(|c| !c.ranked_doc_ids.is_empty())
        .map(|c| WeightedList::new(c.ranked_doc_ids.clone(), c.weight))
        .collect();
    if lists.is_empty() {
        return Ok(Vec::new());
    }

    let mut fused = reciprocal_rank_fusion(&lists);
    normalize_by_top(&mut fused);

    let top = fused.first().map(|(_, s)| *s).unwrap_or(0.0);
    let second = fused.get(1).map(|(_, s)| *s).unwrap_or(0.0);
    let bypass = strong_signal_bypass(top, second, opts.intent.is_some());

    let mut vec_hits_by_doc: HashMap<i64, Vec<VecHit>> = HashMap::new();
    for channel in &channels {
        for (doc_id, hits) in &channel.vec_hits {
            vec_hits_by_doc
                .entry(*doc_id)
                .or_default()
                .extend(hits.iter().cloned());
        }
    }

    let final_scores: Vec<(i64, f64)> = if bypass {
        fused
    } else if gateway.has_reranker() && fused.len() > 2 {
        let limit = opts.effective_limit();
        let top_n: Vec<(i64, f64)> = fused.into_iter().take(limit.max(1)).collect();
        let mut docs = Vec::with_capacity(top_n.len());
        let mut order = Vec::with_capacity(top_n.len());
        for (doc_id, _) in &top_n {
            let Some((doc, body)) = active_document(index, *doc_id).await? else {
                continue;
            };
            docs.push(RerankDoc {
                file: doc.docid(),
                body: truncate_for_rerank(&body, RERANK_BODY_CHARS),
            });
            order.push(*doc_id);
        }
        if docs.is_empty() {
            top_n
        } else {
            match gateway
                .rerank(query, &docs, &RerankOptions::default(), &cancel)
                .await
            {
                Ok(results) => {
                    let n = results.len() as f64;
                    let file_to_doc: HashMap<&str, i64> = docs
                        .iter()
                        .zip(order.iter())
                        .map(|(d, id)| (d.file.as_str(), *id))
                        .collect();
                    results
                        .into_iter()
                        .enumerate()
                        .filter_map(|(rank, r)| {
                            file_to_doc.get(r.file.as_str()).map(|id| {
                                let score = 1.0 - (rank as f64) / n.max(1.0);
                                (*id, score)
                            })
                        })
                        .collect()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "rerank failed, falling back to fused ranking");
                    top_n
                }
            }
        }
    } else {
        fused
    };

    let query_terms = extract_query_terms(query);
    let intent_terms = opts
        .intent
        .as_deref()
        .map(extract_intent_terms)
        .unwrap_or_default();

    let mut out = Vec::new();
    for (document_id, score) in final_scores {
        let Some((doc, body)) = active_document(index, document_id).await? else {
            continue;
        };
        let chunk_pos = vec_hits_by_doc.get(&document_id).map(|hits| {
            let refs: Vec<&VecHit> = hits.iter().collect();
            best_chunk(&refs, &body, &query_terms, &intent_terms).0
        });
        let snippet = extract_snippet(&body, query, opts.intent.as_deref(), DEFAULT_SNIPPET_MAX_LEN);
        out.push(SearchHit {
            document_id,
            docid: doc.docid(),
            title: doc.title.clone(),
            path: doc.shown_path().to_string(),
            collection: doc.collection.clone(),
            modified_at: doc.modified_at,
            score,
            source: HitSource::Deep,
            snippet: snippet.text,
            snippet_line: snippet.line,
            chunk_pos,
        });
    }
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(apply_filters(out, opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{EmbeddingResult, ModelInfo, RerankResult};
    use crate::store::memory::InMemoryIndex;
    use crate::store::ChunkVectorInsert;
    use async_trait::async_trait;

    #[test]
    fn scenario_seven_strong_signal_bypass() {
        assert!(strong_signal_bypass(0.9, 0.7, false));
        assert!(!strong_signal_bypass(0.9, 0.8, false), "gap too small");
        assert!(!strong_signal_bypass(0.8, 0.5, false), "top too low");
        assert!(!strong_signal_bypass(0.95, 0.5, true), "intent present");
    }

    struct FakeGateway {
        backend: GatewayBackend,
        reranker: bool,
    }

    #[async_trait]
    impl Gateway for FakeGateway {
        async fn embed(&self, text: &str, _cancel: &CancelToken) -> Result<Option<EmbeddingResult>> {
            // Deterministic pseudo-embedding: a 2-dim vector derived from
            // whether the text contains "alpha" or "beta", so unit tests can
            // construct predictable cosine similarities.
            let v = if text.to_lowercase().contains("alpha") {
                vec![1.0, 0.0]
            } else if text.to_lowercase().contains("beta") {
                vec![0.0, 1.0]
            } else {
                vec![0.5, 0.5]
            };
            Ok(Some(EmbeddingResult {
                vector: v,
                model: "fake".to_string(),
            }))
        }

        async fn embed_batch(
            &self,
            texts: &[String],
            cancel: &CancelToken,
        ) -> Result<Vec<Option<EmbeddingResult>>> {
            let mut out = Vec::with_capacity(texts.len());
            for t in texts {
                out.push(self.embed(t, cancel).await?);
            }
            Ok(out)
        }

        async fn expand_query(
            &self,
            query: &str,
            _opts: &ExpandOptions,
            _cancel: &CancelToken,
        ) -> Result<Vec<ExpandedSubQuery>> {
            Ok(vec![
                ExpandedSubQuery {
                    kind: SubQueryKind::Lex,
                    text: query.to_string(),
                },
                ExpandedSubQuery {
                    kind: SubQueryKind::Vec,
                    text: query.to_string(),
                },
            ])
        }

        async fn generate(&self, prompt: &str, _cancel: &CancelToken) -> Result<String> {
            Ok(format!("hypothetical answer about {prompt}"))
        }

        async fn rerank(
            &self,
            _query: &str,
            docs: &[RerankDoc],
            _opts: &RerankOptions,
            _cancel: &CancelToken,
        ) -> Result<Vec<RerankResult>> {
            Ok(docs
                .iter()
                .enumerate()
                .map(|(i, d)| RerankResult {
                    file: d.file.clone(),
                    score: 1.0 - i as f64 * 0.1,
                    index: i,
                })
                .collect())
        }

        fn has_reranker(&self) -> bool {
            self.reranker
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                backend: self.backend,
                embed_base_url: None,
                embed_model: None,
            }
        }
    }

    #[tokio::test]
    async fn keyword_search_finds_matching_document() {
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());
        index
            .upsert_document("notes", "a.md", "Rust Ownership", "a guide to rust ownership and borrowing", 1)
            .await
            .unwrap();

        let opts = SearchOptions {
            limit: 10,
            ..Default::default()
        };
        let hits = keyword_search(&index, "ownership", &opts).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Rust Ownership");
        assert_eq!(hits[0].source, HitSource::Fts);
    }

    #[tokio::test]
    async fn keyword_search_empty_for_all_negative_query() {
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());
        index
            .upsert_document("notes", "a.md", "A", "some content here", 1)
            .await
            .unwrap();
        let opts = SearchOptions::default();
        let hits = keyword_search(&index, "-nothing", &opts).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn scenario_c_multi_collection_vector_routing() {
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());

        for i in 0..60 {
            index
                .upsert_document("noisy", &format!("n{i}.md"), "Noisy", &format!("noisy doc {i}"), 1)
                .await
                .unwrap();
            let doc = index.document_by_path("noisy", &format!("n{i}.md")).await.unwrap().unwrap();
            index
                .replace_chunk_vectors(
                    &doc.hash,
                    &[ChunkVectorInsert {
                        seq: 0,
                        pos: 0,
                        embedding: vec![1.0, 0.0],
                        model: "fake".into(),
                    }],
                )
                .await
                .unwrap();
        }

        index
            .upsert_document("target-a", "a.md", "Alpha target", "alpha content", 1)
            .await
            .unwrap();
        let doc_a = index.document_by_path("target-a", "a.md").await.unwrap().unwrap();
        index
            .replace_chunk_vectors(
                &doc_a.hash,
                &[ChunkVectorInsert {
                    seq: 0,
                    pos: 0,
                    embedding: vec![1.0, 0.0],
                    model: "fake".into(),
                }],
            )
            .await
            .unwrap();

        index
            .upsert_document("target-b", "b.md", "Beta target", "beta content", 1)
            .await
            .unwrap();
        let doc_b = index.document_by_path("target-b", "b.md").await.unwrap().unwrap();
        index
            .replace_chunk_vectors(
                &doc_b.hash,
                &[ChunkVectorInsert {
                    seq: 0,
                    pos: 0,
                    embedding: vec![1.0, 0.0],
                    model: "fake".into(),
                }],
            )
            .await
            .unwrap();

        let gateway: Arc<dyn Gateway> = Arc::new(FakeGateway {
            backend: GatewayBackend::Local,
            reranker: false,
        });
        let opts = SearchOptions {
            limit: 10,
            collections: vec!["target-a".to_string(), "target-b".to_string()],
            ..Default::default()
        };
        let hits = semantic_search(&index, &gateway, "alpha", &opts).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.collection == "target-a" || h.collection == "target-b"));
    }

    #[tokio::test]
    async fn deep_search_fuses_lex_and_vec_channels() {
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());
        index
            .upsert_document("notes", "a.md", "Alpha doc", "alpha content about rust", 1)
            .await
            .unwrap();
        let doc = index.document_by_path("notes", "a.md").await.unwrap().unwrap();
        index
            .replace_chunk_vectors(
                &doc.hash,
                &[ChunkVectorInsert {
                    seq: 0,
                    pos: 0,
                    embedding: vec![1.0, 0.0],
                    model: "fake".into(),
                }],
            )
            .await
            .unwrap();

        let gateway: Arc<dyn Gateway> = Arc::new(FakeGateway {
            backend: GatewayBackend::Local,
            reranker: false,
        });
        let opts = SearchOptions {
            limit: 5,
            ..Default::default()
        };
        let hits = deep_search(&index, &gateway, "alpha", &opts).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, HitSource::Deep);
    }

    #[tokio::test]
    async fn deep_search_reranks_when_available_and_result_count_exceeds_two() {
        let index: Arc<dyn Index> = Arc::new(InMemoryIndex::new());
        for (path, title, body) in [
            ("a.md", "Alpha A", "alpha rust content one"),
            ("b.md", "Alpha B", "alpha rust content two"),
            ("c.md", "Alpha C", "alpha rust content three"),
        ] {
            index.upsert_document("notes", path, title, body, 1).await.unwrap();
        }

        let gateway: Arc<dyn Gateway> = Arc::new(FakeGateway {
            backend: GatewayBackend::Local,
            reranker: true,
        });
        let opts = SearchOptions {
            limit: 10,
            intent: Some("extra intent to disable bypass".to_string()),
            ..Default::default()
        };
        let hits = deep_search(&index, &gateway, "alpha rust", &opts).await.unwrap();
        assert!(hits.len() >= 2);
        // Reranked scores follow 1 - rank/N, so they're strictly descending.
        for w in hits.windows(2) {
            assert!(w[0].score >= w[1].score);
        }
    }
}
