//! Pipeline 构建器：统一组装能力实现与运行参数
//!
//! 测试中直接注入脚本化能力；CLI 通过 `Pipeline::from_config` 使用 LLM 角色。

use std::sync::Arc;

use crate::agents::{AgentClients, LlmGenerator, LlmGuardian, LlmResearcher};
use crate::capability::{EvaluationCapability, GenerationCapability, SearchCapability};
use crate::config::{AppConfig, PipelineSection};
use crate::core::PipelineError;
use crate::pipeline::coordinator::Pipeline;
use crate::pipeline::fanout::FanOutRunner;
use crate::pipeline::stage::StageExecutor;

#[derive(Default)]
pub struct PipelineBuilder {
    generator: Option<Arc<dyn GenerationCapability>>,
    search: Option<Arc<dyn SearchCapability>>,
    evaluator: Option<Arc<dyn EvaluationCapability>>,
    settings: PipelineSection,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generator(mut self, generator: Arc<dyn GenerationCapability>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn search(mut self, search: Arc<dyn SearchCapability>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn EvaluationCapability>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// 整体替换运行参数（[pipeline] 段）
    pub fn settings(mut self, settings: PipelineSection) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_revision_attempts(mut self, attempts: u32) -> Self {
        self.settings.max_revision_attempts = attempts;
        self
    }

    pub fn max_searches(mut self, searches: usize) -> Self {
        self.settings.max_searches = searches;
        self
    }

    pub fn min_research_results(mut self, results: usize) -> Self {
        self.settings.min_research_results = results;
        self
    }

    pub fn required_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.required_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn stage_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.stage_timeout_secs = secs;
        self
    }

    pub fn search_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.search_timeout_secs = secs;
        self
    }

    /// 三种能力必须齐全，超时必须为正
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let generator = self
            .generator
            .ok_or_else(|| PipelineError::ConfigError("generation capability not set".into()))?;
        let search = self
            .search
            .ok_or_else(|| PipelineError::ConfigError("search capability not set".into()))?;
        let evaluator = self
            .evaluator
            .ok_or_else(|| PipelineError::ConfigError("evaluation capability not set".into()))?;

        let settings = self.settings;
        if settings.stage_timeout_secs == 0 || settings.search_timeout_secs == 0 {
            return Err(PipelineError::ConfigError(
                "timeouts must be at least one second".into(),
            ));
        }

        let executor = StageExecutor::new(generator, evaluator, settings.stage_timeout_secs);
        let fanout = FanOutRunner::new(search, settings.search_timeout_secs);
        tracing::debug!(
            max_revision_attempts = settings.max_revision_attempts,
            max_searches = settings.max_searches,
            min_research_results = settings.min_research_results,
            "pipeline built"
        );
        Ok(Pipeline::new(executor, fanout, settings))
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// 按配置组装 LLM 角色（[llm] 选择后端，[prompts] 覆盖 system prompt）
    pub fn from_config(cfg: &AppConfig) -> Result<Pipeline, PipelineError> {
        let clients = AgentClients::from_config(&cfg.llm)?;
        Self::with_agents(clients, cfg)
    }

    pub fn with_agents(clients: AgentClients, cfg: &AppConfig) -> Result<Pipeline, PipelineError> {
        let prompts = &cfg.prompts;
        let generator = LlmGenerator::new(clients.planner, clients.writer)
            .with_prompts(prompts.planner.clone(), prompts.writer.clone());
        let researcher = LlmResearcher::new(clients.researcher).with_prompt(prompts.researcher.clone());
        let guardian = LlmGuardian::new(clients.guardian).with_prompt(prompts.guardian.clone());

        PipelineBuilder::new()
            .generator(Arc::new(generator))
            .search(Arc::new(researcher))
            .evaluator(Arc::new(guardian))
            .settings(cfg.pipeline.clone())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_missing_capability_is_config_error() {
        let err = PipelineBuilder::new()
            .search(Arc::new(LlmResearcher::new(Arc::new(MockLlmClient::new()))))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::ConfigError(msg) if msg.contains("generation")));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let llm: Arc<MockLlmClient> = Arc::new(MockLlmClient::new());
        let err = PipelineBuilder::new()
            .generator(Arc::new(LlmGenerator::new(llm.clone(), llm.clone())))
            .search(Arc::new(LlmResearcher::new(llm.clone())))
            .evaluator(Arc::new(LlmGuardian::new(llm)))
            .stage_timeout_secs(0)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[test]
    fn test_settings_from_config() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg.pipeline.max_revision_attempts = 7;

        let pipeline = Pipeline::from_config(&cfg).unwrap();
        assert_eq!(pipeline.settings().max_revision_attempts, 7);
        assert_eq!(pipeline.settings().max_searches, 5);
    }
}
