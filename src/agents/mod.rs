//! 基于 LLM 的能力实现：规划 / 调研 / 撰写 / 审核四个角色
//!
//! 每个角色持有一个 LlmClient 与一段 system prompt；回复中的结构化输出由 `json` 提取。

pub mod generator;
pub mod guardian;
pub mod json;
pub mod prompts;
pub mod researcher;

use std::sync::Arc;

use serde_json::Value;

use crate::config::LlmSection;
use crate::core::{CapabilityError, PipelineError};
use crate::llm::{create_llm_from_config, LlmClient, Message, MockLlmClient};

pub use generator::{LlmGenerator, StoryDraftFormat};
pub use guardian::{GuardianVerdict, LlmGuardian};
pub use researcher::LlmResearcher;

/// 四个角色各自使用的 LLM 客户端（可相同）
#[derive(Clone)]
pub struct AgentClients {
    pub planner: Arc<dyn LlmClient>,
    pub researcher: Arc<dyn LlmClient>,
    pub writer: Arc<dyn LlmClient>,
    pub guardian: Arc<dyn LlmClient>,
}

impl AgentClients {
    /// 所有角色共用一个客户端
    pub fn shared(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            planner: llm.clone(),
            researcher: llm.clone(),
            writer: llm.clone(),
            guardian: llm,
        }
    }

    /// provider = "mock" 时使用离线演示客户端，否则按配置创建远程客户端
    pub fn from_config(cfg: &LlmSection) -> Result<Self, PipelineError> {
        if cfg.provider.eq_ignore_ascii_case("mock") {
            tracing::info!("Using offline mock agents");
            return Ok(Self::offline_demo());
        }
        create_llm_from_config(cfg).map(Self::shared)
    }

    /// 每个角色返回固定的合法回复，整条流水线可离线跑通
    pub fn offline_demo() -> Self {
        Self {
            planner: Arc::new(MockLlmClient::always(DEMO_PLAN)),
            researcher: Arc::new(MockLlmClient::always(DEMO_RESEARCH)),
            writer: Arc::new(MockLlmClient::always(DEMO_STORY)),
            guardian: Arc::new(MockLlmClient::always(DEMO_VERDICT)),
        }
    }
}

impl AgentClients {
    /// 累计 token 用量 (prompt, completion, total)；共享的客户端只计一次
    pub fn token_usage(&self) -> (u64, u64, u64) {
        let mut distinct: Vec<&Arc<dyn LlmClient>> = Vec::new();
        for client in [&self.planner, &self.researcher, &self.writer, &self.guardian] {
            if !distinct.iter().any(|seen| Arc::ptr_eq(seen, client)) {
                distinct.push(client);
            }
        }
        distinct
            .iter()
            .map(|client| client.token_usage())
            .fold((0, 0, 0), |acc, u| (acc.0 + u.0, acc.1 + u.1, acc.2 + u.2))
    }
}

/// system + user 两条消息的一次调用；后端错误为 Unavailable，空回复视为拒答
pub(crate) async fn ask(
    llm: &dyn LlmClient,
    system: &str,
    user: String,
) -> Result<String, CapabilityError> {
    let messages = [Message::system(system), Message::user(user)];
    let reply = llm
        .complete(&messages)
        .await
        .map_err(CapabilityError::Unavailable)?;
    if reply.trim().is_empty() {
        return Err(CapabilityError::Refused("empty reply".to_string()));
    }
    Ok(reply)
}

/// 任务说明 + 输入 JSON + 输出 schema
pub(crate) fn task_message(task: &str, input: &Value, schema: &str) -> String {
    let input = serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
    format!(
        "{task}\n\nInput:\n{input}\n\nRespond with a single JSON object matching this schema:\n{schema}"
    )
}

const DEMO_PLAN: &str = r#"{"theme": "A moonlit adventure with a gentle friend", "searches": [
  {"query": "gentle bedtime adventure ideas for children", "purpose": "story ideas"},
  {"query": "friendly animal companions in picture books", "purpose": "special character"},
  {"query": "stories about kindness for kids", "purpose": "moral lesson"},
  {"query": "fun facts about the moon for children", "purpose": "fun fact"}
]}"#;

const DEMO_RESEARCH: &str = "Soft moonlight, a friendly owl guide and a quiet meadow make a calm setting. \
Small acts of kindness resolve the gentle conflict, and the journey ends back home in bed.";

const DEMO_STORY: &str = r#"```json
{"title": "The Moonlit Meadow",
 "story": "Once upon a time, a curious little explorer found a silver path glowing under the moon. A sleepy owl named Hoot offered to lead the way. Together they helped a lost firefly find its family, sharing their light along the meadow. When the stars began to yawn, Hoot flew the explorer home, and the little one drifted off to sleep, warm and happy.",
 "reading_time_minutes": 5,
 "fun_fact": "The same side of the moon always faces the Earth.",
 "moral_lesson": "Small kindnesses light the way for others."}
```"#;

const DEMO_VERDICT: &str = r#"{"is_approved": true, "has_inappropriate_themes": false, "correct_language": true, "issues_found": [], "fix_instructions": ""}"#;
