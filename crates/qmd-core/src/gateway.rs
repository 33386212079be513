//! The Embedding / Rerank / Chat Gateway capability interface.
//!
//! `qmd-core` never talks to a network or a model runtime directly: it
//! depends only on the [`Gateway`] trait. Concrete providers (a
//! deterministic local stand-in, a remote OpenAI-/Cohere-/Voyage-compatible
//! HTTP client, and an optional disk-backed cache layered in front of
//! either) live in the `qmd` application crate.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::query::SubQueryKind;

/// A successful embedding: the vector plus the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub vector: Vec<f32>,
    pub model: String,
}

/// One typed sub-query produced by [`Gateway::expand_query`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedSubQuery {
    pub kind: SubQueryKind,
    pub text: String,
}

/// Options controlling query expansion.
#[derive(Debug, Clone, Default)]
pub struct ExpandOptions {
    /// Whether the expansion should include a `lex` sub-query derived from
    /// the literal user text (the retrieval pipeline passes `true` when it
    /// needs a guaranteed lexical channel).
    pub include_lexical: bool,
}

/// One document passed to [`Gateway::rerank`]: an opaque identifier (the
/// file/docid) and a body, already truncated by the caller per the
/// retrieval pipeline's rules.
#[derive(Debug, Clone)]
pub struct RerankDoc {
    pub file: String,
    pub body: String,
}

/// Options controlling reranking.
#[derive(Debug, Clone, Default)]
pub struct RerankOptions {
    pub top_k: Option<usize>,
}

/// One reranked result, ordered descending by relevance by the Gateway.
#[derive(Debug, Clone)]
pub struct RerankResult {
    pub file: String,
    pub score: f64,
    pub index: usize,
}

/// Which backend a Gateway implementation represents; consulted by the
/// Scope Guard (`qmd-core::scope`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayBackend {
    Local,
    Api,
}

/// Static facts about a Gateway's configured model(s), used by the scope
/// guard and by `qmd stats`. No network I/O: purely local configuration.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub backend: GatewayBackend,
    pub embed_base_url: Option<String>,
    pub embed_model: Option<String>,
}

/// A lightweight, `tokio`-free cancellation flag threaded through Gateway
/// calls and transactions. `qmd-core` stays free of a hard `tokio`
/// dependency (beyond `dev-dependencies`), so this mirrors the shape of
/// `tokio_util::sync::CancellationToken` without depending on it.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The capability interface the retrieval pipeline and embedding pipeline
/// invoke. Implementations own all network/model-runtime concerns; the
/// core only sees these contracts (§4.4, §6, §7).
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Embed a single text. Returns `Ok(None)` on a non-retryable
    /// configuration failure (e.g. missing credentials) rather than
    /// [`crate::error::QmdError::AuthMissing`], per §7: embedding degrades
    /// to null, it does not abort the caller.
    async fn embed(&self, text: &str, cancel: &CancelToken) -> Result<Option<EmbeddingResult>>;

    /// Embed a batch of texts; one slot per input, each a vector or
    /// `None` under the same non-retryable-failure rule as [`Gateway::embed`].
    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<Option<EmbeddingResult>>>;

    /// Expand a query into typed sub-queries. On
    /// [`crate::error::QmdError::AuthMissing`] the caller (retrieval
    /// pipeline) falls back to [`fallback_expansion`] rather than
    /// aborting; implementations may also perform that fallback
    /// themselves and return `Ok` directly.
    async fn expand_query(
        &self,
        query: &str,
        opts: &ExpandOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<ExpandedSubQuery>>;

    /// Generate a hypothetical-answer passage for HyDE retrieval, or any
    /// other free-form chat completion the pipeline needs.
    async fn generate(&self, prompt: &str, cancel: &CancelToken) -> Result<String>;

    /// Rerank `docs` against `query`. Implementations that have no
    /// reranker configured should not implement "passthrough" here —
    /// that fallback is the retrieval pipeline's responsibility (§4.6.3
    /// step 6: "if a reranker is available"); this method is only called
    /// when one is.
    async fn rerank(
        &self,
        query: &str,
        docs: &[RerankDoc],
        opts: &RerankOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<RerankResult>>;

    /// Whether this Gateway has a reranker configured at all.
    fn has_reranker(&self) -> bool;

    /// Static model/backend info, for the scope guard and `qmd stats`.
    fn model_info(&self) -> ModelInfo;
}

/// The expansion fallback used when a remote Gateway lacks credentials
/// (§7 `AuthMissing`): `[lex: q, vec: q, hyde: "Information about q"]`.
pub fn fallback_expansion(query: &str) -> Vec<ExpandedSubQuery> {
    vec![
        ExpandedSubQuery {
            kind: SubQueryKind::Lex,
            text: query.to_string(),
        },
        ExpandedSubQuery {
            kind: SubQueryKind::Vec,
            text: query.to_string(),
        },
        ExpandedSubQuery {
            kind: SubQueryKind::Hyde,
            text: format!("Information about {query}"),
        },
    ]
}
