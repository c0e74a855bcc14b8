//! LlmResearcher：每个搜索子任务一次 LLM 调用，返回灵感摘要

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::ask;
use crate::agents::prompts::RESEARCHER_PROMPT;
use crate::capability::SearchCapability;
use crate::core::CapabilityError;
use crate::llm::LlmClient;
use crate::model::SearchTask;

pub struct LlmResearcher {
    llm: Arc<dyn LlmClient>,
    prompt: String,
}

impl LlmResearcher {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            prompt: RESEARCHER_PROMPT.to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        if let Some(p) = prompt {
            self.prompt = p;
        }
        self
    }
}

#[async_trait]
impl SearchCapability for LlmResearcher {
    async fn search(&self, task: &SearchTask) -> Result<String, CapabilityError> {
        let user = format!("Search term: {}\nPurpose: {}", task.query, task.purpose);
        let reply = ask(self.llm.as_ref(), &self.prompt, user).await?;
        Ok(reply.trim().to_string())
    }
}
