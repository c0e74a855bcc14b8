//! 阶段执行器
//!
//! 持有生成 / 审核能力与单次调用超时。每次调用恰好请求一次外部能力，
//! 把输出解码为期望的结构并校验；任何不合格的输出都变为 CapabilityError，不做静默修正。
//! 每次调用输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::timeout;

use crate::capability::{EvaluationCapability, GenerationCapability, StageKind};
use crate::core::CapabilityError;
use crate::model::{Draft, Evaluation, RunRequest, SearchPlan, SearchResult};

/// 阶段输出：可从 JSON 解码，并能自检形状是否可用
pub trait StageOutput: DeserializeOwned + Send {
    fn validate(&self) -> Result<(), String>;
}

impl StageOutput for SearchPlan {
    fn validate(&self) -> Result<(), String> {
        match self.searches.iter().position(|s| s.query.trim().is_empty()) {
            Some(i) => Err(format!("search #{} has an empty query", i + 1)),
            None => Ok(()),
        }
    }
}

impl StageOutput for Draft {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("draft title is empty".to_string());
        }
        if self.body.trim().is_empty() {
            return Err("draft body is empty".to_string());
        }
        Ok(())
    }
}

/// 规划阶段输入
#[derive(Debug, Serialize)]
pub struct PlanningInput<'a> {
    pub request: &'a RunRequest,
    pub max_searches: usize,
}

/// 撰写阶段输入
#[derive(Debug, Serialize)]
pub struct SynthesisInput<'a> {
    pub request: &'a RunRequest,
    pub research: &'a [SearchResult],
}

/// 修订阶段输入：当前草稿 + 审核意见 + 原始请求 + 调研结果
#[derive(Debug, Serialize)]
pub struct RevisionInput<'a> {
    pub current_draft: &'a Draft,
    pub issues: &'a [String],
    pub fix_instructions: &'a str,
    pub request: &'a RunRequest,
    pub research: &'a [SearchResult],
}

/// 阶段执行器：对每次调用施加超时，并把结果映射为 CapabilityError
pub struct StageExecutor {
    generator: Arc<dyn GenerationCapability>,
    evaluator: Arc<dyn EvaluationCapability>,
    timeout: Duration,
}

impl StageExecutor {
    pub fn new(
        generator: Arc<dyn GenerationCapability>,
        evaluator: Arc<dyn EvaluationCapability>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            generator,
            evaluator,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 通用入口：一次生成调用 -> 解码 -> 校验
    pub async fn execute<I, O>(&self, stage: StageKind, input: &I) -> Result<O, CapabilityError>
    where
        I: Serialize + ?Sized,
        O: StageOutput,
    {
        let input = serde_json::to_value(input)
            .map_err(|e| CapabilityError::Malformed(format!("{stage} input: {e}")))?;

        let start = Instant::now();
        let outcome = match timeout(self.timeout, self.generator.generate(stage, input)).await {
            Ok(Ok(value)) => decode::<O>(value),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CapabilityError::Timeout(self.timeout.as_secs())),
        };
        audit(stage, &outcome, start);
        outcome
    }

    pub async fn plan(
        &self,
        request: &RunRequest,
        max_searches: usize,
    ) -> Result<SearchPlan, CapabilityError> {
        let input = PlanningInput {
            request,
            max_searches,
        };
        self.execute(StageKind::Planning, &input).await
    }

    pub async fn synthesize(
        &self,
        request: &RunRequest,
        research: &[SearchResult],
    ) -> Result<Draft, CapabilityError> {
        let input = SynthesisInput { request, research };
        self.execute(StageKind::Synthesis, &input).await
    }

    pub async fn revise(&self, input: &RevisionInput<'_>) -> Result<Draft, CapabilityError> {
        self.execute(StageKind::Revision, input).await
    }

    /// 审核：同样一次调用、同样的超时；不带 issues 的拒绝也是合法结论
    pub async fn evaluate(
        &self,
        draft: &Draft,
        request: &RunRequest,
    ) -> Result<Evaluation, CapabilityError> {
        let start = Instant::now();
        let outcome = match timeout(self.timeout, self.evaluator.evaluate(draft, request)).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(self.timeout.as_secs())),
        };
        audit(StageKind::Evaluation, &outcome, start);
        outcome
    }
}

fn decode<O: StageOutput>(value: serde_json::Value) -> Result<O, CapabilityError> {
    let output: O =
        serde_json::from_value(value).map_err(|e| CapabilityError::Malformed(e.to_string()))?;
    output.validate().map_err(CapabilityError::Malformed)?;
    Ok(output)
}

fn audit<T>(stage: StageKind, outcome: &Result<T, CapabilityError>, start: Instant) {
    let (ok, result) = match outcome {
        Ok(_) => (true, "ok"),
        Err(CapabilityError::Timeout(_)) => (false, "timeout"),
        Err(CapabilityError::Malformed(_)) => (false, "malformed"),
        Err(_) => (false, "error"),
    };
    let audit = serde_json::json!({
        "event": "stage_audit",
        "stage": stage.as_str(),
        "ok": ok,
        "outcome": result,
        "duration_ms": start.elapsed().as_millis() as u64,
    });
    if ok {
        tracing::info!(audit = %audit, "stage");
    } else {
        tracing::warn!(audit = %audit, error = ?outcome.as_ref().err(), "stage");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 固定返回同一个 JSON，并统计调用次数
    struct FixedGenerator {
        reply: Result<Value, CapabilityError>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FixedGenerator {
        fn new(reply: Result<Value, CapabilityError>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl GenerationCapability for FixedGenerator {
        async fn generate(&self, _stage: StageKind, _input: Value) -> Result<Value, CapabilityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply.clone()
        }
    }

    struct FixedEvaluator(Evaluation);

    #[async_trait]
    impl EvaluationCapability for FixedEvaluator {
        async fn evaluate(&self, _d: &Draft, _r: &RunRequest) -> Result<Evaluation, CapabilityError> {
            Ok(self.0.clone())
        }
    }

    fn executor(generator: Arc<FixedGenerator>, evaluation: Evaluation) -> StageExecutor {
        StageExecutor::new(generator, Arc::new(FixedEvaluator(evaluation)), 5)
    }

    #[tokio::test]
    async fn test_synthesize_decodes_draft_with_one_call() {
        let gen = Arc::new(FixedGenerator::new(Ok(json!({
            "title": "Pip and the Moon",
            "body": "Pip looked up...",
            "metadata": {"reading_time_minutes": 5}
        }))));
        let exec = executor(gen.clone(), Evaluation::approved());

        let draft = exec.synthesize(&RunRequest::new(), &[]).await.unwrap();
        assert_eq!(draft.title, "Pip and the Moon");
        assert_eq!(draft.reading_time_minutes(), Some(5));
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_shape_is_malformed_not_coerced() {
        let gen = Arc::new(FixedGenerator::new(Ok(json!({"story": "no title here"}))));
        let exec = executor(gen, Evaluation::approved());

        let err = exec.synthesize(&RunRequest::new(), &[]).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_empty_title_fails_validation() {
        let gen = Arc::new(FixedGenerator::new(Ok(json!({"title": " ", "body": "text"}))));
        let exec = executor(gen, Evaluation::approved());

        let err = exec.synthesize(&RunRequest::new(), &[]).await.unwrap_err();
        assert_eq!(err, CapabilityError::Malformed("draft title is empty".to_string()));
    }

    #[tokio::test]
    async fn test_plan_rejects_blank_query() {
        let gen = Arc::new(FixedGenerator::new(Ok(json!({
            "theme": "Space",
            "searches": [{"query": "rockets for kids", "purpose": "a"}, {"query": "", "purpose": "b"}]
        }))));
        let exec = executor(gen, Evaluation::approved());

        let err = exec.plan(&RunRequest::new(), 5).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Malformed(msg) if msg.contains("#2")));
    }

    #[tokio::test]
    async fn test_capability_error_passes_through() {
        let gen = Arc::new(FixedGenerator::new(Err(CapabilityError::Refused(
            "policy".to_string(),
        ))));
        let exec = executor(gen, Evaluation::approved());

        let err = exec.plan(&RunRequest::new(), 5).await.unwrap_err();
        assert_eq!(err, CapabilityError::Refused("policy".to_string()));
    }

    #[tokio::test]
    async fn test_slow_capability_times_out() {
        let mut slow = FixedGenerator::new(Ok(json!({"title": "t", "body": "b"})));
        slow.delay = Duration::from_secs(2);
        let exec = StageExecutor::new(
            Arc::new(slow),
            Arc::new(FixedEvaluator(Evaluation::approved())),
            1,
        );

        let err = exec.synthesize(&RunRequest::new(), &[]).await.unwrap_err();
        assert_eq!(err, CapabilityError::Timeout(1));
    }

    #[tokio::test]
    async fn test_feedbackless_rejection_passes_through() {
        let gen = Arc::new(FixedGenerator::new(Ok(json!({}))));
        let exec = executor(gen, Evaluation::rejected(vec![], ""));

        let eval = exec
            .evaluate(&Draft::new("t", "b"), &RunRequest::new())
            .await
            .unwrap();
        assert!(!eval.approved);
        assert!(eval.issues.is_empty());
    }
}
