//! Deterministic local Gateway: no network, no model runtime.
//!
//! Embeddings are a fixed-dimension hash projection of the input text —
//! not semantically meaningful, but stable and collision-resistant enough
//! to exercise the vector-search and scope-guard code paths without a real
//! embedding provider configured. Expansion falls back to the same
//! `[lex, vec, hyde]` shape a missing-credentials remote Gateway would
//! produce, since there is no query-understanding model to ask locally.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use qmd_core::error::{QmdError, Result};
use qmd_core::gateway::{
    fallback_expansion, CancelToken, EmbeddingResult, ExpandOptions, ExpandedSubQuery, Gateway,
    GatewayBackend, ModelInfo, RerankDoc, RerankOptions, RerankResult,
};

pub const LOCAL_EMBED_MODEL: &str = "local-hash-v1";
pub const LOCAL_EMBED_DIMS: usize = 256;

pub struct LocalGateway {
    dims: usize,
}

impl Default for LocalGateway {
    fn default() -> Self {
        Self { dims: LOCAL_EMBED_DIMS }
    }
}

impl LocalGateway {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dims);
        let mut counter: u32 = 0;
        while out.len() < self.dims {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            let digest = hasher.finalize();
            for chunk in digest.chunks_exact(4) {
                if out.len() >= self.dims {
                    break;
                }
                let bits = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                // Map to [-1.0, 1.0]; cosine similarity is scale-invariant so
                // the exact range only needs to be consistent across calls.
                out.push((bits as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32);
            }
            counter += 1;
        }
        out
    }
}

#[async_trait]
impl Gateway for LocalGateway {
    async fn embed(&self, text: &str, cancel: &CancelToken) -> Result<Option<EmbeddingResult>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(EmbeddingResult {
            vector: self.hash_embed(text),
            model: LOCAL_EMBED_MODEL.to_string(),
        }))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<Option<EmbeddingResult>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text, cancel).await?);
        }
        Ok(out)
    }

    async fn expand_query(
        &self,
        query: &str,
        _opts: &ExpandOptions,
        _cancel: &CancelToken,
    ) -> Result<Vec<ExpandedSubQuery>> {
        Ok(fallback_expansion(query))
    }

    async fn generate(&self, prompt: &str, _cancel: &CancelToken) -> Result<String> {
        Ok(format!("Notes related to: {prompt}"))
    }

    async fn rerank(
        &self,
        _query: &str,
        _docs: &[RerankDoc],
        _opts: &RerankOptions,
        _cancel: &CancelToken,
    ) -> Result<Vec<RerankResult>> {
        Err(QmdError::AuthMissing)
    }

    fn has_reranker(&self) -> bool {
        false
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            backend: GatewayBackend::Local,
            embed_base_url: None,
            embed_model: Some(LOCAL_EMBED_MODEL.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic_and_correctly_sized() {
        let gw = LocalGateway::new(16);
        let cancel = CancelToken::new();
        let a = gw.embed("hello world", &cancel).await.unwrap().unwrap();
        let b = gw.embed("hello world", &cancel).await.unwrap().unwrap();
        assert_eq!(a.vector, b.vector);
        assert_eq!(a.vector.len(), 16);
    }

    #[tokio::test]
    async fn distinct_text_yields_distinct_embeddings() {
        let gw = LocalGateway::new(16);
        let cancel = CancelToken::new();
        let a = gw.embed("alpha", &cancel).await.unwrap().unwrap();
        let b = gw.embed("beta", &cancel).await.unwrap().unwrap();
        assert_ne!(a.vector, b.vector);
    }
}
