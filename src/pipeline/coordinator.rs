//! Pipeline Coordinator：按顺序驱动 规划 -> 并行调研 -> 撰写 -> 审核修订
//!
//! 拥有一次运行的生命周期（RevisionLoop 及其 RunState 在运行结束时销毁），
//! 是唯一决定运行终止的组件；无论成败都恰好产出一个 TerminalResult。

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::capability::StageKind;
use crate::config::PipelineSection;
use crate::core::PipelineError;
use crate::model::RunRequest;
use crate::pipeline::fanout::FanOutRunner;
use crate::pipeline::progress::{FailureReason, ProgressKind, ProgressSink, TerminalResult};
use crate::pipeline::revision::{LoopContext, LoopOutcome, RevisionLoop};
use crate::pipeline::stage::StageExecutor;
use crate::pipeline::stream::RunStream;

/// 流水线：可廉价克隆，多次运行之间不共享任何可变状态
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    executor: StageExecutor,
    fanout: FanOutRunner,
    settings: PipelineSection,
}

impl Pipeline {
    pub(crate) fn new(executor: StageExecutor, fanout: FanOutRunner, settings: PipelineSection) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                executor,
                fanout,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &PipelineSection {
        &self.inner.settings
    }

    /// 在后台任务中启动一次运行，返回有序事件流（若干 Progress + 一个 Terminal）
    ///
    /// 需要在 tokio 运行时内调用。
    pub fn run(&self, request: RunRequest) -> RunStream {
        let (sink, rx) = ProgressSink::channel();
        let cancel = CancellationToken::new();
        let run_id = Uuid::new_v4().to_string();

        let pipeline = self.clone();
        let token = cancel.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            pipeline.execute_run(&id, request, &sink, token).await;
        });

        RunStream::new(run_id, rx, cancel)
    }

    /// 在当前任务内执行一次运行并返回最终结果；事件写入 progress（含 Terminal）
    pub async fn execute(
        &self,
        request: RunRequest,
        progress: &ProgressSink,
        cancel: CancellationToken,
    ) -> TerminalResult {
        let run_id = Uuid::new_v4().to_string();
        self.execute_run(&run_id, request, progress, cancel).await
    }

    async fn execute_run(
        &self,
        run_id: &str,
        request: RunRequest,
        progress: &ProgressSink,
        cancel: CancellationToken,
    ) -> TerminalResult {
        let span = tracing::info_span!("run", run_id = %run_id);
        async move {
            let start = Instant::now();
            tracing::info!(attributes = request.len(), "run started");
            progress.emit(ProgressKind::RunStarted {
                run_id: run_id.to_string(),
            });

            let mut revision = RevisionLoop::new(self.inner.settings.max_revision_attempts);
            let result = match self.stages(&request, progress, &cancel, &mut revision).await {
                Ok(outcome) => self.succeed(outcome, progress),
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        attempts = revision.state().attempts(),
                        phase = ?revision.state().phase(),
                        "run failed"
                    );
                    progress.emit(ProgressKind::Failed {
                        reason: err.to_string(),
                    });
                    let last_issues = match &err {
                        PipelineError::RevisionExhausted { issues, .. } => issues.clone(),
                        _ => revision.state().last_issues(),
                    };
                    TerminalResult::Failed {
                        reason: FailureReason::from(&err),
                        attempts: revision.state().attempts(),
                        last_issues,
                    }
                }
            };

            tracing::info!(
                success = result.is_success(),
                attempts = result.attempts(),
                duration_ms = start.elapsed().as_millis() as u64,
                "run finished"
            );
            progress.terminal(result.clone());
            result
        }
        .instrument(span)
        .await
    }

    async fn stages(
        &self,
        request: &RunRequest,
        progress: &ProgressSink,
        cancel: &CancellationToken,
        revision: &mut RevisionLoop,
    ) -> Result<LoopOutcome, PipelineError> {
        let settings = &self.inner.settings;
        let executor = &self.inner.executor;

        let missing = request.missing(&settings.required_attributes);
        if !missing.is_empty() {
            return Err(PipelineError::InvalidRequest(format!(
                "missing attributes: {}",
                missing.join(", ")
            )));
        }

        ensure_active(cancel, StageKind::Planning)?;
        progress.emit(ProgressKind::Planning);
        let plan = executor
            .plan(request, settings.max_searches)
            .await
            .map_err(PipelineError::capability(StageKind::Planning))?;
        let planned = plan.searches.len();
        let (theme, tasks) = plan.into_tasks(settings.max_searches);
        if planned > tasks.len() {
            tracing::warn!(planned, kept = tasks.len(), "search plan truncated");
        }
        tracing::info!(theme = %theme, searches = tasks.len(), "plan ready");
        progress.emit(ProgressKind::PlanReady {
            theme,
            searches: tasks.len(),
        });

        ensure_active(cancel, StageKind::Research)?;
        // 调研结果在此冻结：撰写与修订只看到这一份
        let research = self.inner.fanout.run(tasks, progress, cancel).await;
        if research.len() < settings.min_research_results {
            return Err(PipelineError::InsufficientResearch {
                found: research.len(),
                required: settings.min_research_results,
            });
        }

        ensure_active(cancel, StageKind::Synthesis)?;
        progress.emit(ProgressKind::Writing);
        let draft = executor
            .synthesize(request, &research)
            .await
            .map_err(PipelineError::capability(StageKind::Synthesis))?;
        tracing::info!(title = %draft.title, sources = research.len(), "draft ready");
        progress.emit(ProgressKind::DraftReady {
            title: draft.title.clone(),
        });

        let ctx = LoopContext {
            request,
            research: &research,
        };
        revision.drive(executor, draft, ctx, progress, cancel).await
    }

    fn succeed(&self, outcome: LoopOutcome, progress: &ProgressSink) -> TerminalResult {
        let draft = &outcome.draft;
        let reading_time_minutes = draft.reading_time_minutes();
        let moral_lesson = draft.moral_lesson().map(String::from);
        let fun_fact = draft.fun_fact().map(String::from);
        if reading_time_minutes.is_some() || moral_lesson.is_some() || fun_fact.is_some() {
            progress.emit(ProgressKind::StoryDetails {
                reading_time_minutes,
                moral_lesson,
                fun_fact,
            });
        }

        TerminalResult::Success {
            draft: outcome.draft,
            evaluation: outcome.evaluation,
            attempts: outcome.attempts,
        }
    }
}

fn ensure_active(cancel: &CancellationToken, next: StageKind) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        tracing::info!(stage = %next, "run cancelled at stage boundary");
        return Err(PipelineError::Cancelled(next));
    }
    Ok(())
}
