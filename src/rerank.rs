//! Cross-encoder reranker backed by fastembed.
//!
//! [`create_reranker`] resolves the reranker once at startup. Anything
//! that prevents a working reranker (provider disabled, binary built
//! without `local-models`, unknown model name) yields `None` and a log
//! line, and the query pipeline simply skips the stage.

use std::sync::Arc;

use grounded_core::rerank::Reranker;
use tracing::{info, warn};

use crate::config::RerankerConfig;
#[cfg(feature = "local-models")]
use crate::model_slot::ModelSlot;

/// Map a raw cross-encoder logit to `[0, 1]`.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Local cross-encoder. The model is loaded on first use and inference
/// runs on the blocking thread pool. A failed load is not retried.
#[cfg(feature = "local-models")]
pub struct LocalCrossEncoder {
    model_name: String,
    model: Arc<std::sync::Mutex<ModelSlot<fastembed::TextRerank>>>,
}

#[cfg(feature = "local-models")]
impl LocalCrossEncoder {
    pub fn new(model_name: &str) -> anyhow::Result<Self> {
        // Fail fast on unknown names; loading is deferred.
        config_to_reranker_model(model_name)?;
        Ok(Self {
            model_name: model_name.to_string(),
            model: Arc::new(std::sync::Mutex::new(ModelSlot::default())),
        })
    }
}

#[cfg(feature = "local-models")]
fn config_to_reranker_model(name: &str) -> anyhow::Result<fastembed::RerankerModel> {
    match name {
        "bge-reranker-base" => Ok(fastembed::RerankerModel::BGERerankerBase),
        "bge-reranker-v2-m3" => Ok(fastembed::RerankerModel::BGERerankerV2M3),
        "jina-reranker-v1-turbo-en" => Ok(fastembed::RerankerModel::JINARerankerV1TurboEn),
        other => anyhow::bail!(
            "Unknown reranker model: '{}'. Supported models: \
             bge-reranker-base, bge-reranker-v2-m3, jina-reranker-v1-turbo-en",
            other
        ),
    }
}

#[cfg(feature = "local-models")]
#[async_trait::async_trait]
impl Reranker for LocalCrossEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn score(&self, query: &str, passages: &[&str]) -> anyhow::Result<Vec<f32>> {
        use anyhow::anyhow;

        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let slot = Arc::clone(&self.model);
        let model_name = self.model_name.clone();
        let query = query.to_string();
        let docs: Vec<String> = passages.iter().map(|p| p.to_string()).collect();
        let n = docs.len();

        let results = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(usize, f32)>> {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow!("reranker model lock poisoned"))?;
            let model = guard.get_or_load("reranker model", &model_name, || {
                fastembed::TextRerank::try_new(
                    fastembed::RerankInitOptions::new(config_to_reranker_model(&model_name)?)
                        .with_show_download_progress(true),
                )
                .map_err(|e| anyhow!("Failed to initialize reranker: {}", e))
            })?;
            let documents: Vec<&str> = docs.iter().map(String::as_str).collect();
            let ranked = model
                .rerank(query.as_str(), documents, false, None)
                .map_err(|e| anyhow!("Reranking failed: {}", e))?;
            Ok(ranked.into_iter().map(|r| (r.index, r.score)).collect())
        })
        .await??;

        // Results come back sorted by score; put them back in passage order.
        let mut scores = vec![None; n];
        for (index, logit) in results {
            if let Some(slot) = scores.get_mut(index) {
                *slot = Some(sigmoid(logit));
            }
        }
        scores
            .into_iter()
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| anyhow!("reranker skipped some passages"))
    }
}

/// Resolve the configured reranker, or `None` if it cannot be used.
pub fn create_reranker(config: &RerankerConfig) -> Option<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        "disabled" => {
            info!("reranker disabled");
            None
        }
        #[cfg(feature = "local-models")]
        "local" => match LocalCrossEncoder::new(&config.model) {
            Ok(r) => Some(Arc::new(r)),
            Err(e) => {
                warn!("reranker unavailable, continuing without it: {:#}", e);
                None
            }
        },
        #[cfg(not(feature = "local-models"))]
        "local" => {
            warn!("reranker requires --features local-models, continuing without it");
            None
        }
        other => {
            warn!(provider = other, "unknown reranker provider, continuing without it");
            None
        }
    }
}
