use super::{AgentEngine, EngineError, EngineRequest, EngineResponse};
use async_trait::async_trait;

/// Echoes the prompt back without calling a model.
#[derive(Debug, Clone)]
pub struct MockEngine {
    model: String,
}

impl MockEngine {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl AgentEngine for MockEngine {
    async fn send_prompt(&self, request: &EngineRequest) -> Result<EngineResponse, EngineError> {
        Ok(EngineResponse::new(format!(
            "Mock response for: {}",
            request.prompt
        )))
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.model)
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_prompt() {
        let engine = MockEngine::new("m");
        let request = EngineRequest {
            task_id: "t".into(),
            model: "m".into(),
            trial_index: 0,
            prompt: "hello".into(),
            files: vec![],
            context_dir: None,
        };
        let response = engine.send_prompt(&request).await.unwrap();
        assert_eq!(response.output, "Mock response for: hello");
        assert_eq!(response.tool_calls, 0);
        assert!(!response.from_cache);
    }
}
