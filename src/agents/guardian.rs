//! LlmGuardian：儿童内容安全审核
//!
//! 审核回复带有两个额外判定：是否含不适宜主题、语言是否正确。
//! 任一判定不合格时结论强制为不通过，并把原因并入 issues。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::agents::json::{parse_reply, schema_json};
use crate::agents::prompts::{EVALUATE_TASK, GUARDIAN_PROMPT};
use crate::agents::{ask, task_message};
use crate::capability::EvaluationCapability;
use crate::core::CapabilityError;
use crate::llm::LlmClient;
use crate::model::{Draft, Evaluation, RunRequest};

const INAPPROPRIATE_THEMES_ISSUE: &str = "story contains themes unsuitable for children";
const WRONG_LANGUAGE_ISSUE: &str = "story is not written in the requested language";

/// 审核员回复的结构
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GuardianVerdict {
    /// 故事是否可以直接给孩子
    pub is_approved: bool,
    /// 是否包含死亡、暴力、战争等不适宜主题
    #[serde(default)]
    pub has_inappropriate_themes: bool,
    /// 是否使用了请求的语言
    #[serde(default = "default_true")]
    pub correct_language: bool,
    /// 发现的问题
    #[serde(default)]
    pub issues_found: Vec<String>,
    /// 具体修改建议
    #[serde(default)]
    pub fix_instructions: String,
}

fn default_true() -> bool {
    true
}

impl GuardianVerdict {
    pub fn into_evaluation(self) -> Evaluation {
        let mut approved = self.is_approved;
        let mut issues = self.issues_found;

        if self.has_inappropriate_themes {
            approved = false;
            if issues.is_empty() {
                issues.push(INAPPROPRIATE_THEMES_ISSUE.to_string());
            }
        }
        if !self.correct_language {
            approved = false;
            issues.push(WRONG_LANGUAGE_ISSUE.to_string());
        }

        Evaluation {
            approved,
            issues,
            fix_instructions: self.fix_instructions,
        }
    }
}

pub struct LlmGuardian {
    llm: Arc<dyn LlmClient>,
    prompt: String,
}

impl LlmGuardian {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            prompt: GUARDIAN_PROMPT.to_string(),
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
impl EvaluationCapability for LlmGuardian {
    async fn evaluate(
        &self,
        draft: &Draft,
        request: &RunRequest,
    ) -> Result<Evaluation, CapabilityError> {
        let input = serde_json::json!({
            "request": request,
            "story": draft,
        });
        let user = task_message(EVALUATE_TASK, &input, &schema_json::<GuardianVerdict>());
        let reply = ask(self.llm.as_ref(), &self.prompt, user).await?;
        let verdict: GuardianVerdict = parse_reply(&reply)?;
        tracing::debug!(
            approved = verdict.is_approved,
            inappropriate = verdict.has_inappropriate_themes,
            correct_language = verdict.correct_language,
            issues = verdict.issues_found.len(),
            language = request.get_str("story_language").unwrap_or("unspecified"),
            "guardian verdict"
        );
        Ok(verdict.into_evaluation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    async fn evaluate(reply: &str) -> Result<Evaluation, CapabilityError> {
        let guardian = LlmGuardian::new(Arc::new(MockLlmClient::always(reply)));
        let request = RunRequest::new().with("story_language", "English");
        guardian.evaluate(&Draft::new("Title", "Body"), &request).await
    }

    #[tokio::test]
    async fn test_plain_approval() {
        let eval = evaluate(r#"{"is_approved": true, "has_inappropriate_themes": false, "correct_language": true}"#)
            .await
            .unwrap();
        assert_eq!(eval, Evaluation::approved());
    }

    #[tokio::test]
    async fn test_inappropriate_themes_override_approval() {
        let eval = evaluate(r#"{"is_approved": true, "has_inappropriate_themes": true}"#)
            .await
            .unwrap();
        assert!(!eval.approved);
        assert_eq!(eval.issues, vec![INAPPROPRIATE_THEMES_ISSUE.to_string()]);
    }

    #[tokio::test]
    async fn test_wrong_language_added_to_issues() {
        let eval = evaluate(
            r#"{"is_approved": false, "correct_language": false, "issues_found": ["battle scene"], "fix_instructions": "Rewrite in English without the battle"}"#,
        )
        .await
        .unwrap();
        assert!(!eval.approved);
        assert_eq!(eval.issues, vec!["battle scene".to_string(), WRONG_LANGUAGE_ISSUE.to_string()]);
        assert_eq!(eval.fix_instructions, "Rewrite in English without the battle");
    }

    #[tokio::test]
    async fn test_unparseable_verdict_is_malformed() {
        let err = evaluate("Looks great to me!").await.unwrap_err();
        assert!(matches!(err, CapabilityError::Malformed(_)));
    }
}
