//! LlmGenerator：规划与撰写 / 修订两个角色
//!
//! 规划用 planner 客户端，撰写与修订共用 writer 客户端。回复中的 JSON 按 schema 解析后
//! 转换为流水线期望的形状（SearchPlan / Draft），形状校验仍由 StageExecutor 负责。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::agents::json::{parse_reply, schema_json};
use crate::agents::prompts::{PLANNER_PROMPT, PLAN_TASK, REVISE_TASK, WRITER_PROMPT, WRITE_TASK};
use crate::agents::{ask, task_message};
use crate::capability::{GenerationCapability, StageKind};
use crate::core::CapabilityError;
use crate::llm::LlmClient;
use crate::model::{Draft, SearchPlan, FUN_FACT_KEY, MORAL_LESSON_KEY, READING_TIME_KEY};

/// 作者回复的结构（故事正文与展示用元数据）
#[derive(Debug, Deserialize, JsonSchema)]
pub struct StoryDraftFormat {
    /// 故事标题
    pub title: String,
    /// 完整故事正文
    pub story: String,
    /// 预计朗读时间（分钟）
    pub reading_time_minutes: u32,
    /// 故事中出现的趣味知识（未要求时为空）
    #[serde(default)]
    pub fun_fact: Option<String>,
    /// 故事传达的道理
    pub moral_lesson: String,
}

impl StoryDraftFormat {
    pub fn into_draft(self) -> Draft {
        let mut draft = Draft::new(self.title, self.story)
            .with_metadata(READING_TIME_KEY, self.reading_time_minutes)
            .with_metadata(MORAL_LESSON_KEY, self.moral_lesson);
        if let Some(fact) = self.fun_fact.filter(|f| !f.trim().is_empty()) {
            draft = draft.with_metadata(FUN_FACT_KEY, fact);
        }
        draft
    }
}

pub struct LlmGenerator {
    planner: Arc<dyn LlmClient>,
    writer: Arc<dyn LlmClient>,
    planner_prompt: String,
    writer_prompt: String,
}

impl LlmGenerator {
    pub fn new(planner: Arc<dyn LlmClient>, writer: Arc<dyn LlmClient>) -> Self {
        Self {
            planner,
            writer,
            planner_prompt: PLANNER_PROMPT.to_string(),
            writer_prompt: WRITER_PROMPT.to_string(),
        }
    }

    /// 覆盖默认 system prompt（None 保持内置模板）
    pub fn with_prompts(mut self, planner: Option<String>, writer: Option<String>) -> Self {
        if let Some(p) = planner {
            self.planner_prompt = p;
        }
        if let Some(p) = writer {
            self.writer_prompt = p;
        }
        self
    }

    async fn plan(&self, input: &Value) -> Result<Value, CapabilityError> {
        let user = task_message(PLAN_TASK, input, &schema_json::<SearchPlan>());
        let reply = ask(self.planner.as_ref(), &self.planner_prompt, user).await?;
        let plan: SearchPlan = parse_reply(&reply)?;
        to_value(&plan)
    }

    async fn write(&self, task: &str, input: &Value) -> Result<Value, CapabilityError> {
        let user = task_message(task, input, &schema_json::<StoryDraftFormat>());
        let reply = ask(self.writer.as_ref(), &self.writer_prompt, user).await?;
        let story: StoryDraftFormat = parse_reply(&reply)?;
        to_value(&story.into_draft())
    }
}

#[async_trait]
impl GenerationCapability for LlmGenerator {
    async fn generate(&self, stage: StageKind, input: Value) -> Result<Value, CapabilityError> {
        match stage {
            StageKind::Planning => self.plan(&input).await,
            StageKind::Synthesis => self.write(WRITE_TASK, &input).await,
            StageKind::Revision => self.write(REVISE_TASK, &input).await,
            other => Err(CapabilityError::Unavailable(format!(
                "{other} is not a generation stage"
            ))),
        }
    }
}

fn to_value<T: serde::Serialize>(output: &T) -> Result<Value, CapabilityError> {
    serde_json::to_value(output).map_err(|e| CapabilityError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, Role};
    use serde_json::json;

    const STORY_REPLY: &str = r#"```json
{"title": "Mia and the Sleepy Dragon", "story": "Once upon a time...", "reading_time_minutes": 6, "fun_fact": "", "moral_lesson": "Sharing makes friends"}
```"#;

    fn generator(planner: Arc<MockLlmClient>, writer: Arc<MockLlmClient>) -> LlmGenerator {
        LlmGenerator::new(planner, writer)
    }

    #[tokio::test]
    async fn test_plan_parses_reply_and_sends_schema() {
        let planner = Arc::new(MockLlmClient::always(
            r#"Plan: {"theme": "Dragons", "searches": [{"query": "friendly dragon stories", "purpose": "ideas"}]}"#,
        ));
        let gen = generator(planner.clone(), Arc::new(MockLlmClient::new()));

        let value = gen
            .generate(StageKind::Planning, json!({"max_searches": 5}))
            .await
            .unwrap();
        assert_eq!(value["theme"], "Dragons");
        assert_eq!(value["searches"][0]["query"], "friendly dragon stories");

        let messages = planner.last_messages().await;
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("max_searches"));
        assert!(messages[1].content.contains("purpose"));
    }

    #[tokio::test]
    async fn test_story_maps_to_draft_metadata() {
        let gen = generator(
            Arc::new(MockLlmClient::new()),
            Arc::new(MockLlmClient::always(STORY_REPLY)),
        );
        let value = gen.generate(StageKind::Synthesis, json!({})).await.unwrap();
        let draft: Draft = serde_json::from_value(value).unwrap();

        assert_eq!(draft.title, "Mia and the Sleepy Dragon");
        assert_eq!(draft.body, "Once upon a time...");
        assert_eq!(draft.reading_time_minutes(), Some(6));
        assert_eq!(draft.moral_lesson(), Some("Sharing makes friends"));
        // 空的 fun_fact 不写入元数据
        assert_eq!(draft.fun_fact(), None);
    }

    #[tokio::test]
    async fn test_revision_uses_writer_with_revise_task() {
        let writer = Arc::new(MockLlmClient::always(STORY_REPLY));
        let gen = generator(Arc::new(MockLlmClient::new()), writer.clone());
        gen.generate(StageKind::Revision, json!({"issues": ["too scary"]}))
            .await
            .unwrap();

        let messages = writer.last_messages().await;
        assert!(messages[1].content.starts_with("Revise"));
        assert!(messages[1].content.contains("too scary"));
    }

    #[tokio::test]
    async fn test_backend_error_is_unavailable() {
        let planner = Arc::new(
            MockLlmClient::new().with_replies(vec![Err("connection reset".to_string())]),
        );
        let gen = generator(planner, Arc::new(MockLlmClient::new()));
        let err = gen.generate(StageKind::Planning, json!({})).await.unwrap_err();
        assert_eq!(err, CapabilityError::Unavailable("connection reset".to_string()));
    }

    #[tokio::test]
    async fn test_non_generation_stage_rejected() {
        let gen = generator(Arc::new(MockLlmClient::new()), Arc::new(MockLlmClient::new()));
        let err = gen.generate(StageKind::Evaluation, json!({})).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
    }
}
