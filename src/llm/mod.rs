//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::LlmSection;
use crate::core::PipelineError;

pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::LlmClient;

/// 根据 [llm] 段创建远程客户端（mock 后端由 `agents::AgentClients` 直接构造）
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, PipelineError> {
    match cfg.provider.to_lowercase().as_str() {
        "openai" => {
            tracing::info!(model = %cfg.model, base_url = ?cfg.base_url, "Using OpenAI-compatible LLM");
            Ok(Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                cfg.api_key.as_deref(),
            )))
        }
        other => Err(PipelineError::ConfigError(format!(
            "unknown llm provider: {other}"
        ))),
    }
}
