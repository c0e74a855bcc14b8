//! 审核 / 修订循环
//!
//! 状态机：Drafting -> Evaluating -> {Approved | Revising -> Evaluating | Exhausted}。
//! 进入 Revising 时 attempt_count 加一，且始终不超过 max_attempts。
//! 审核调用本身失败时立即终止（Aborted）：无法验证的草稿绝不能当作通过。

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::capability::StageKind;
use crate::core::PipelineError;
use crate::model::{Draft, Evaluation, RunRequest, SearchResult};
use crate::pipeline::progress::{ProgressKind, ProgressSink};
use crate::pipeline::stage::{RevisionInput, StageExecutor};

/// 循环所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Drafting,
    Evaluating,
    Revising,
    /// 终态：当前草稿即最终输出
    Approved,
    /// 终态：修订次数用尽
    Exhausted,
    /// 终态：能力调用失败或被取消
    Aborted,
}

/// 一次审核后的状态转移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Approved,
    Revise { attempt: u32 },
    Exhausted,
}

/// 循环状态：仅由 RevisionLoop 修改
#[derive(Debug, Clone)]
pub struct RunState {
    attempt_count: u32,
    current_draft: Option<Draft>,
    /// 当前草稿的审核；换稿后清空
    current_evaluation: Option<Evaluation>,
    /// 最近一次成功的审核，换稿不清空
    last_evaluation: Option<Evaluation>,
    phase: LoopPhase,
}

impl RunState {
    fn new() -> Self {
        Self {
            attempt_count: 0,
            current_draft: None,
            current_evaluation: None,
            last_evaluation: None,
            phase: LoopPhase::Drafting,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempt_count
    }

    pub fn current_draft(&self) -> Option<&Draft> {
        self.current_draft.as_ref()
    }

    pub fn current_evaluation(&self) -> Option<&Evaluation> {
        self.current_evaluation.as_ref()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// 最近一次审核的问题列表；从未审核过时为空
    pub fn last_issues(&self) -> Vec<String> {
        self.last_evaluation
            .as_ref()
            .map(|e| e.issues.clone())
            .unwrap_or_default()
    }
}

/// 循环结束时的成功产物
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub draft: Draft,
    pub evaluation: Evaluation,
    pub attempts: u32,
}

/// drive 需要的只读上下文
#[derive(Debug, Clone, Copy)]
pub struct LoopContext<'a> {
    pub request: &'a RunRequest,
    pub research: &'a [SearchResult],
}

pub struct RevisionLoop {
    max_attempts: u32,
    state: RunState,
}

impl RevisionLoop {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            state: RunState::new(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Drafting / Revising -> Evaluating：新草稿整体替换旧草稿，当前审核作废
    fn accept_draft(&mut self, draft: &Draft) {
        debug_assert!(matches!(
            self.state.phase,
            LoopPhase::Drafting | LoopPhase::Revising
        ));
        self.state.current_draft = Some(draft.clone());
        self.state.current_evaluation = None;
        self.state.phase = LoopPhase::Evaluating;
    }

    /// Evaluating -> Approved / Revising / Exhausted
    fn record_evaluation(&mut self, evaluation: &Evaluation) -> Transition {
        debug_assert_eq!(self.state.phase, LoopPhase::Evaluating);
        self.state.current_evaluation = Some(evaluation.clone());
        self.state.last_evaluation = Some(evaluation.clone());

        if evaluation.approved {
            self.state.phase = LoopPhase::Approved;
            Transition::Approved
        } else if self.state.attempt_count < self.max_attempts {
            self.state.attempt_count += 1;
            self.state.phase = LoopPhase::Revising;
            Transition::Revise {
                attempt: self.state.attempt_count,
            }
        } else {
            self.state.phase = LoopPhase::Exhausted;
            Transition::Exhausted
        }
    }

    fn abort(&mut self, err: PipelineError) -> PipelineError {
        self.state.phase = LoopPhase::Aborted;
        err
    }

    /// 从初稿开始驱动循环直到终态
    ///
    /// 失败时 self.state() 仍保留尝试次数与最后一次审核，供 Coordinator 组装失败结果。
    pub async fn drive(
        &mut self,
        executor: &StageExecutor,
        first_draft: Draft,
        ctx: LoopContext<'_>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, PipelineError> {
        let mut draft = first_draft;
        self.accept_draft(&draft);

        loop {
            if cancel.is_cancelled() {
                return Err(self.abort(PipelineError::Cancelled(StageKind::Evaluation)));
            }

            progress.emit(ProgressKind::Evaluating {
                attempt: self.state.attempt_count,
            });
            let evaluation = match executor.evaluate(&draft, ctx.request).await {
                Ok(evaluation) => evaluation,
                Err(source) => {
                    return Err(self.abort(PipelineError::capability(StageKind::Evaluation)(source)))
                }
            };

            match self.record_evaluation(&evaluation) {
                Transition::Approved => {
                    tracing::info!(attempts = self.state.attempt_count, "draft approved");
                    progress.emit(ProgressKind::Approved {
                        attempts: self.state.attempt_count,
                    });
                    return Ok(LoopOutcome {
                        draft,
                        evaluation,
                        attempts: self.state.attempt_count,
                    });
                }
                Transition::Exhausted => {
                    tracing::warn!(attempts = self.state.attempt_count, "revision attempts exhausted");
                    return Err(PipelineError::RevisionExhausted {
                        attempts: self.state.attempt_count,
                        issues: evaluation.issues,
                    });
                }
                Transition::Revise { attempt } => {
                    let issues = evaluation.issues.clone();
                    tracing::info!(attempt, max = self.max_attempts, ?issues, "draft rejected, revising");
                    progress.emit(ProgressKind::Revising {
                        attempt,
                        max_attempts: self.max_attempts,
                        issues,
                    });

                    if cancel.is_cancelled() {
                        return Err(self.abort(PipelineError::Cancelled(StageKind::Revision)));
                    }

                    let input = RevisionInput {
                        current_draft: &draft,
                        issues: &evaluation.issues,
                        fix_instructions: &evaluation.fix_instructions,
                        request: ctx.request,
                        research: ctx.research,
                    };
                    let revised = executor.revise(&input).await;
                    match revised {
                        Ok(revised) => {
                            progress.emit(ProgressKind::Revised {
                                attempt,
                                title: revised.title.clone(),
                            });
                            draft = revised;
                            self.accept_draft(&draft);
                        }
                        Err(source) => {
                            return Err(
                                self.abort(PipelineError::capability(StageKind::Revision)(source))
                            )
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{EvaluationCapability, GenerationCapability};
    use crate::core::CapabilityError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// 修订时返回 "v{n}" 标题的新草稿
    struct Reviser {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl GenerationCapability for Reviser {
        async fn generate(&self, stage: StageKind, input: Value) -> Result<Value, CapabilityError> {
            assert_eq!(stage, StageKind::Revision);
            assert!(input.get("current_draft").is_some());
            assert!(input.get("fix_instructions").is_some());
            if self.fail {
                return Err(CapabilityError::Unavailable("writer offline".to_string()));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({"title": format!("v{n}"), "body": "revised"}))
        }
    }

    /// 按脚本依次返回审核结论；脚本耗尽后一直拒绝
    struct ScriptedJudge {
        verdicts: Mutex<VecDeque<Result<Evaluation, CapabilityError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedJudge {
        fn new(verdicts: Vec<Result<Evaluation, CapabilityError>>) -> Self {
            Self {
                verdicts: Mutex::new(verdicts.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EvaluationCapability for ScriptedJudge {
        async fn evaluate(&self, draft: &Draft, _r: &RunRequest) -> Result<Evaluation, CapabilityError> {
            self.seen.lock().unwrap().push(draft.title.clone());
            self.verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(reject("still scary")))
        }
    }

    fn reject(issue: &str) -> Evaluation {
        Evaluation::rejected(vec![issue.to_string()], "make it gentler")
    }

    async fn drive(
        max: u32,
        judge: Arc<ScriptedJudge>,
        reviser: Arc<Reviser>,
        cancel: &CancellationToken,
    ) -> (RevisionLoop, Result<LoopOutcome, PipelineError>) {
        let executor = StageExecutor::new(reviser, judge, 5);
        let request = RunRequest::new().with("child_name", "Lia");
        let mut revision = RevisionLoop::new(max);
        let result = revision
            .drive(
                &executor,
                Draft::new("v0", "first"),
                LoopContext {
                    request: &request,
                    research: &[],
                },
                &ProgressSink::disabled(),
                cancel,
            )
            .await;
        (revision, result)
    }

    fn reviser() -> Arc<Reviser> {
        Arc::new(Reviser {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    #[test]
    fn test_transitions_respect_max_attempts() {
        let mut revision = RevisionLoop::new(2);
        revision.accept_draft(&Draft::new("v0", "b"));
        assert_eq!(revision.record_evaluation(&reject("x")), Transition::Revise { attempt: 1 });
        revision.accept_draft(&Draft::new("v1", "b"));
        assert_eq!(revision.record_evaluation(&reject("x")), Transition::Revise { attempt: 2 });
        revision.accept_draft(&Draft::new("v2", "b"));
        assert_eq!(revision.record_evaluation(&reject("x")), Transition::Exhausted);
        assert_eq!(revision.state().attempts(), 2);
        assert_eq!(revision.state().phase(), LoopPhase::Exhausted);
    }

    #[test]
    fn test_new_draft_clears_current_but_not_last_evaluation() {
        let mut revision = RevisionLoop::new(3);
        revision.accept_draft(&Draft::new("v0", "b"));
        revision.record_evaluation(&reject("x"));
        revision.accept_draft(&Draft::new("v1", "b"));
        assert!(revision.state().current_evaluation().is_none());
        assert_eq!(revision.state().last_issues(), vec!["x".to_string()]);
        assert_eq!(revision.state().current_draft().unwrap().title, "v1");
        assert_eq!(revision.state().phase(), LoopPhase::Evaluating);
    }

    #[tokio::test]
    async fn test_first_approval_skips_revision() {
        let judge = Arc::new(ScriptedJudge::new(vec![Ok(Evaluation::approved())]));
        let reviser = reviser();
        let (revision, result) = drive(3, judge, reviser.clone(), &CancellationToken::new()).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.draft.title, "v0");
        assert_eq!(reviser.calls.load(Ordering::SeqCst), 0);
        assert_eq!(revision.state().phase(), LoopPhase::Approved);
    }

    #[tokio::test]
    async fn test_permanent_rejection_revises_exactly_max_times() {
        let judge = Arc::new(ScriptedJudge::new(vec![]));
        let reviser = reviser();
        let (revision, result) =
            drive(3, judge.clone(), reviser.clone(), &CancellationToken::new()).await;

        match result {
            Err(PipelineError::RevisionExhausted { attempts, issues }) => {
                assert_eq!(attempts, 3);
                assert_eq!(issues, vec!["still scary".to_string()]);
            }
            other => panic!("expected RevisionExhausted, got {other:?}"),
        }
        assert_eq!(reviser.calls.load(Ordering::SeqCst), 3);
        // 初稿 + 3 次修订，各审核一次
        assert_eq!(*judge.seen.lock().unwrap(), vec!["v0", "v1", "v2", "v3"]);
        assert_eq!(revision.state().attempts(), 3);
    }

    #[tokio::test]
    async fn test_evaluation_failure_aborts_even_after_drafts() {
        let judge = Arc::new(ScriptedJudge::new(vec![
            Ok(reject("too dark")),
            Err(CapabilityError::Timeout(30)),
        ]));
        let (revision, result) = drive(3, judge, reviser(), &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(PipelineError::Capability {
                stage: StageKind::Evaluation,
                ..
            })
        ));
        assert_eq!(revision.state().phase(), LoopPhase::Aborted);
        assert_eq!(revision.state().attempts(), 1);
        // 失败的审核不会覆盖草稿：当前仍是待审的 v1
        assert_eq!(revision.state().current_draft().unwrap().title, "v1");
        // v0 的审核意见仍可用于失败结果
        assert_eq!(revision.state().last_issues(), vec!["too dark".to_string()]);
    }

    #[tokio::test]
    async fn test_feedbackless_rejection_still_revises() {
        let judge = Arc::new(ScriptedJudge::new(vec![
            Ok(Evaluation::rejected(vec![], "")),
            Ok(Evaluation::approved()),
        ]));
        let reviser = reviser();
        let (_, result) = drive(3, judge, reviser.clone(), &CancellationToken::new()).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.draft.title, "v1");
        assert_eq!(reviser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revision_failure_keeps_last_issues() {
        let judge = Arc::new(ScriptedJudge::new(vec![Ok(reject("a storm"))]));
        let failing = Arc::new(Reviser {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let (revision, result) = drive(3, judge, failing, &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(PipelineError::Capability {
                stage: StageKind::Revision,
                ..
            })
        ));
        assert_eq!(revision.state().last_issues(), vec!["a storm".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_evaluation() {
        let judge = Arc::new(ScriptedJudge::new(vec![Ok(Evaluation::approved())]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (_, result) = drive(3, judge.clone(), reviser(), &cancel).await;

        assert_eq!(result.unwrap_err(), PipelineError::Cancelled(StageKind::Evaluation));
        assert!(judge.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_max_attempts_exhausts_on_first_rejection() {
        let judge = Arc::new(ScriptedJudge::new(vec![]));
        let reviser = reviser();
        let (_, result) = drive(0, judge, reviser.clone(), &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(PipelineError::RevisionExhausted { attempts: 0, .. })
        ));
        assert_eq!(reviser.calls.load(Ordering::SeqCst), 0);
    }
}
