//! 并行调研：同时派发全部搜索任务，按完成顺序收集成功结果
//!
//! 单个任务失败（能力错误、超时、panic）只会让结果数变少，不会中断整批；
//! 没有重试，一次失败即终结该任务。取消在派发前检查一次：已取消则整批不派发；
//! 一旦派发，整批任务照常跑完。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::capability::SearchCapability;
use crate::core::{CapabilityError, SubtaskFailure};
use crate::model::{SearchResult, SearchTask};
use crate::pipeline::progress::{ProgressKind, ProgressSink};

pub struct FanOutRunner {
    search: Arc<dyn SearchCapability>,
    timeout: Duration,
}

impl FanOutRunner {
    pub fn new(search: Arc<dyn SearchCapability>, timeout_secs: u64) -> Self {
        Self {
            search,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行全部任务，返回成功结果（顺序为完成顺序，与输入顺序无关）
    ///
    /// 只发出两个聚合事件：ResearchStarted 与 ResearchCompleted。
    pub async fn run(
        &self,
        tasks: Vec<SearchTask>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Vec<SearchResult> {
        let total = tasks.len();
        progress.emit(ProgressKind::ResearchStarted { total });

        let mut set = JoinSet::new();
        if cancel.is_cancelled() {
            tracing::info!(total, "cancelled, searches not started");
        } else {
            for task in tasks {
                set.spawn(search_one(Arc::clone(&self.search), task, self.timeout));
            }
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(failure)) => {
                    tracing::warn!(task_id = failure.task_id, reason = %failure.reason, "search dropped")
                }
                Err(e) => tracing::warn!(error = %e, "search task aborted"),
            }
        }

        tracing::info!(succeeded = results.len(), total, "research finished");
        progress.emit(ProgressKind::ResearchCompleted {
            succeeded: results.len(),
            total,
        });
        results
    }
}

async fn search_one(
    search: Arc<dyn SearchCapability>,
    task: SearchTask,
    limit: Duration,
) -> Result<SearchResult, SubtaskFailure> {
    let start = Instant::now();
    let outcome = match timeout(limit, search.search(&task)).await {
        Ok(Ok(payload)) => Ok(SearchResult {
            task_id: task.id,
            payload,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(CapabilityError::Timeout(limit.as_secs())),
    };
    tracing::debug!(
        task_id = task.id,
        query = %task.query,
        ok = outcome.is_ok(),
        duration_ms = start.elapsed().as_millis() as u64,
        "search"
    );
    outcome.map_err(|e| SubtaskFailure {
        task_id: task.id,
        reason: e.to_string(),
    })
}
