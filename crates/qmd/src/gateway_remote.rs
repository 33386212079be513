//! Remote, OpenAI-/Cohere-/Voyage-compatible Gateway implementation.
//!
//! Retry/backoff is grounded in the teacher's `embed_openai` loop: capped
//! exponential backoff, retry on 429/5xx, fail fast on other 4xx, honor an
//! upstream `Retry-After` header when present. Request/response bodies are
//! read as loose `serde_json::Value` rather than strict typed structs,
//! since "OpenAI-/Cohere-/Voyage-compatible" covers more than one exact
//! wire shape.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use qmd_core::error::{QmdError, Result};
use qmd_core::gateway::{
    CancelToken, EmbeddingResult, ExpandOptions, ExpandedSubQuery, Gateway, GatewayBackend,
    ModelInfo, RerankDoc, RerankOptions, RerankResult,
};
use qmd_core::query::SubQueryKind;

use crate::config::GatewaySettings;

const MAX_RETRIES: u32 = 5;

pub struct RemoteGateway {
    client: reqwest::Client,
    settings: GatewaySettings,
}

impl RemoteGateway {
    pub fn new(settings: GatewaySettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn embed_conf(&self) -> Option<(&str, &str, &str)> {
        match (
            self.settings.embed_base_url.as_deref(),
            self.settings.embed_model.as_deref(),
            self.settings.embed_api_key.as_deref(),
        ) {
            (Some(u), Some(m), Some(k)) => Some((u, m, k)),
            _ => None,
        }
    }

    fn chat_conf(&self) -> Option<(&str, &str, &str)> {
        match (
            self.settings.chat_base_url.as_deref(),
            self.settings.chat_model.as_deref(),
            self.settings.chat_api_key.as_deref(),
        ) {
            (Some(u), Some(m), Some(k)) => Some((u, m, k)),
            _ => None,
        }
    }

    fn rerank_conf(&self) -> Option<(&str, &str, &str)> {
        match (
            self.settings.rerank_base_url.as_deref(),
            self.settings.rerank_model.as_deref(),
            self.settings.rerank_api_key.as_deref(),
        ) {
            (Some(u), Some(m), Some(k)) => Some((u, m, k)),
            _ => None,
        }
    }

    /// POST `body` to `url`, retrying on 429/5xx with capped exponential
    /// backoff (honoring `Retry-After` when the upstream sends one), and
    /// failing immediately on any other 4xx.
    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        body: Value,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let mut attempt: u32 = 0;
        let mut next_delay: Option<Duration> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(QmdError::ProviderTransient("request cancelled".into()));
            }
            if let Some(delay) = next_delay.take() {
                tokio::time::sleep(delay).await;
            }

            let sent = self
                .client
                .post(url)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await;

            let response = match sent {
                Ok(r) => r,
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(QmdError::ProviderTransient(e.to_string()));
                    }
                    next_delay = Some(Duration::from_secs(1u64 << attempt.min(5)));
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<Value>()
                    .await
                    .map_err(|e| QmdError::ProviderTransient(format!("invalid response body: {e}")));
            }

            if status.as_u16() == 429 || status.is_server_error() {
                if attempt >= MAX_RETRIES {
                    let text = response.text().await.unwrap_or_default();
                    return Err(QmdError::ProviderTransient(format!("status {status}: {text}")));
                }
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                next_delay = Some(retry_after.unwrap_or_else(|| Duration::from_secs(1u64 << attempt.min(5))));
                attempt += 1;
                continue;
            }

            // Any other 4xx is a permanent failure; don't burn the retry budget.
            let text = response.text().await.unwrap_or_default();
            return Err(QmdError::ProviderTransient(format!("status {status}: {text}")));
        }
    }

    fn parse_embedding(value: &Value) -> Result<Vec<f32>> {
        let arr = value
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| QmdError::ProviderTransient("missing data[0].embedding in response".into()))?;
        arr.iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| QmdError::ProviderTransient("non-numeric embedding element".into()))
            })
            .collect()
    }

    fn parse_embedding_batch(value: &Value, expected: usize) -> Result<Vec<Option<Vec<f32>>>> {
        let arr = value
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| QmdError::ProviderTransient("missing data[] in response".into()))?;
        let mut out = vec![None; expected];
        for (pos, item) in arr.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .map(|i| i as usize)
                .unwrap_or(pos);
            if index >= expected {
                continue;
            }
            if let Some(embedding) = item.get("embedding").and_then(|e| e.as_array()) {
                let vector: Result<Vec<f32>> = embedding
                    .iter()
                    .map(|v| {
                        v.as_f64()
                            .map(|f| f as f32)
                            .ok_or_else(|| QmdError::ProviderTransient("non-numeric embedding element".into()))
                    })
                    .collect();
                out[index] = Some(vector?);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl Gateway for RemoteGateway {
    async fn embed(&self, text: &str, cancel: &CancelToken) -> Result<Option<EmbeddingResult>> {
        let Some((base_url, model, api_key)) = self.embed_conf() else {
            return Ok(None);
        };
        let url = format!("{}/embeddings", base_url.trim_end_matches('/'));
        let body = json!({ "model": model, "input": text });
        let value = self.post_with_retry(&url, api_key, body, cancel).await?;
        let vector = Self::parse_embedding(&value)?;
        Ok(Some(EmbeddingResult {
            vector,
            model: model.to_string(),
        }))
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancelToken,
    ) -> Result<Vec<Option<EmbeddingResult>>> {
        let Some((base_url, model, api_key)) = self.embed_conf() else {
            return Ok(vec![None; texts.len()]);
        };
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", base_url.trim_end_matches('/'));
        let body = json!({ "model": model, "input": texts });
        let value = self.post_with_retry(&url, api_key, body, cancel).await?;
        let vectors = Self::parse_embedding_batch(&value, texts.len())?;
        Ok(vectors
            .into_iter()
            .map(|v| {
                v.map(|vector| EmbeddingResult {
                    vector,
                    model: model.to_string(),
                })
            })
            .collect())
    }

    async fn expand_query(
        &self,
        query: &str,
        opts: &ExpandOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<ExpandedSubQuery>> {
        let Some((base_url, model, api_key)) = self.chat_conf() else {
            return Err(QmdError::AuthMissing);
        };
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let prompt = format!(
            "Expand this search query into JSON {{\"sub_queries\": [{{\"kind\": \"lex\"|\"vec\"|\"hyde\", \"text\": \"...\"}}]}}. Query: {query}"
        );
        let mut body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if self.settings.chat_strict_json_output {
            body["response_format"] = json!({"type": "json_object"});
        }
        let value = self.post_with_retry(&url, api_key, body, cancel).await?;
        let content = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| QmdError::ProviderTransient("missing choices[0].message.content".into()))?;

        let parsed: Value = serde_json::from_str(content)
            .map_err(|e| QmdError::ProviderTransient(format!("invalid expansion JSON: {e}")))?;
        let subs = parsed
            .get("sub_queries")
            .and_then(|s| s.as_array())
            .ok_or_else(|| QmdError::ProviderTransient("missing sub_queries array".into()))?;

        let mut result = Vec::new();
        for sub in subs {
            let kind_str = sub.get("kind").and_then(|k| k.as_str()).unwrap_or("lex");
            let text = sub.get("text").and_then(|t| t.as_str()).unwrap_or(query).to_string();
            let kind = match kind_str {
                "vec" => SubQueryKind::Vec,
                "hyde" => SubQueryKind::Hyde,
                _ => SubQueryKind::Lex,
            };
            result.push(ExpandedSubQuery { kind, text });
        }

        if opts.include_lexical && !result.iter().any(|s| s.kind == SubQueryKind::Lex) {
            result.insert(
                0,
                ExpandedSubQuery {
                    kind: SubQueryKind::Lex,
                    text: query.to_string(),
                },
            );
        }
        Ok(result)
    }

    async fn generate(&self, prompt: &str, cancel: &CancelToken) -> Result<String> {
        let Some((base_url, model, api_key)) = self.chat_conf() else {
            return Err(QmdError::AuthMissing);
        };
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let value = self.post_with_retry(&url, api_key, body, cancel).await?;
        value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| QmdError::ProviderTransient("missing choices[0].message.content".into()))
    }

    async fn rerank(
        &self,
        query: &str,
        docs: &[RerankDoc],
        opts: &RerankOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<RerankResult>> {
        let Some((base_url, model, api_key)) = self.rerank_conf() else {
            return Err(QmdError::AuthMissing);
        };
        let url = format!("{}/rerank", base_url.trim_end_matches('/'));
        let mut body = json!({
            "model": model,
            "query": query,
            "documents": docs.iter().map(|d| d.body.clone()).collect::<Vec<_>>(),
        });
        if let Some(top_k) = opts.top_k {
            body["top_n"] = json!(top_k);
        }
        let value = self.post_with_retry(&url, api_key, body, cancel).await?;
        let results = value
            .get("results")
            .or_else(|| value.get("data"))
            .and_then(|r| r.as_array())
            .ok_or_else(|| QmdError::ProviderTransient("missing results/data array".into()))?;

        let mut out = Vec::new();
        for (rank, item) in results.iter().enumerate() {
            let index = item
                .get("index")
                .and_then(|i| i.as_u64())
                .ok_or_else(|| QmdError::ProviderTransient("missing results[].index".into()))? as usize;
            let score = item
                .get("relevance_score")
                .or_else(|| item.get("score"))
                .and_then(|s| s.as_f64())
                .unwrap_or(0.0);
            let Some(doc) = docs.get(index) else { continue };
            out.push(RerankResult {
                file: doc.file.clone(),
                score,
                index: rank,
            });
        }
        Ok(out)
    }

    fn has_reranker(&self) -> bool {
        self.rerank_conf().is_some()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            backend: GatewayBackend::Api,
            embed_base_url: self.settings.embed_base_url.clone(),
            embed_model: self.settings.embed_model.clone(),
        }
    }
}
