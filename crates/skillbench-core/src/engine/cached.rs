use super::{AgentEngine, EngineError, EngineRequest, EngineResponse};
use crate::cache::{Cache, Fingerprint};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers repeated requests from a cache before reaching the wrapped engine.
///
/// Keys come from [`Fingerprint::for_request`] with the inner engine's
/// [`describe`](AgentEngine::describe) string. A failed cache write is logged
/// and the fresh response is still returned.
pub struct CachedEngine {
    inner: Arc<dyn AgentEngine>,
    cache: Arc<dyn Cache>,
}

impl CachedEngine {
    pub fn new(inner: Arc<dyn AgentEngine>, cache: Arc<dyn Cache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl AgentEngine for CachedEngine {
    async fn send_prompt(&self, request: &EngineRequest) -> Result<EngineResponse, EngineError> {
        let key = Fingerprint::for_request(request, &self.inner.describe());
        if let Some(entry) = self.cache.get(&key) {
            debug!(task = %request.task_id, trial = request.trial_index, %key, "cache hit");
            let mut response = entry.response;
            response.from_cache = true;
            return Ok(response);
        }

        let response = self.inner.send_prompt(request).await?;
        if let Err(e) = self.cache.put(&key, &response) {
            warn!(task = %request.task_id, %key, "failed to write cache entry: {e}");
        }
        Ok(response)
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.inner.shutdown().await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn is_deterministic(&self) -> bool {
        self.inner.is_deterministic()
    }
}
