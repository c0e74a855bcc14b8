//! 进度事件流：单一生产者、有序、以一个 Terminal 事件结束
//!
//! 进度（Progress）与最终结果（Terminal）是两种显式的事件类型，调用方不需要从文本里猜。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::capability::StageKind;
use crate::core::PipelineError;
use crate::model::{Draft, Evaluation};

/// 阶段推进时产生的状态事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressKind {
    /// 运行开始（携带 run_id，便于在日志中检索）
    RunStarted { run_id: String },
    /// 正在规划搜索
    Planning,
    /// 规划完成
    PlanReady { theme: String, searches: usize },
    /// 并行调研开始
    ResearchStarted { total: usize },
    /// 并行调研结束（只报聚合计数，不报单个任务）
    ResearchCompleted { succeeded: usize, total: usize },
    /// 正在撰写初稿
    Writing,
    /// 初稿完成
    DraftReady { title: String },
    /// 正在审核第 attempt 次修订后的草稿（0 为初稿）
    Evaluating { attempt: u32 },
    /// 审核未通过，进入第 attempt 次修订
    Revising {
        attempt: u32,
        max_attempts: u32,
        issues: Vec<String>,
    },
    /// 修订后的草稿完成
    Revised { attempt: u32, title: String },
    /// 审核通过
    Approved { attempts: u32 },
    /// 通过后的附加信息（阅读时长、寓意、趣味知识）
    StoryDetails {
        reading_time_minutes: Option<u64>,
        moral_lesson: Option<String>,
        fun_fact: Option<String>,
    },
    /// 运行失败（随后紧跟 Terminal 事件）
    Failed { reason: String },
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressKind::RunStarted { run_id } => write!(f, "Run {run_id} started"),
            ProgressKind::Planning => f.write_str("Planning your story..."),
            ProgressKind::PlanReady { theme, searches } => {
                write!(f, "Theme: {theme} ({searches} searches planned)")
            }
            ProgressKind::ResearchStarted { total } => {
                write!(f, "Researching inspiration ({total} searches)...")
            }
            ProgressKind::ResearchCompleted { succeeded, total } => {
                write!(f, "Found {succeeded} of {total} sources of inspiration")
            }
            ProgressKind::Writing => f.write_str("Writing your bedtime story..."),
            ProgressKind::DraftReady { title } => write!(f, "Draft complete: \"{title}\""),
            ProgressKind::Evaluating { attempt: 0 } => f.write_str("Checking the story..."),
            ProgressKind::Evaluating { attempt } => {
                write!(f, "Checking revision {attempt}...")
            }
            ProgressKind::Revising {
                attempt,
                max_attempts,
                issues,
            } => {
                write!(f, "Revising story (attempt {attempt}/{max_attempts})")?;
                if !issues.is_empty() {
                    write!(f, " - issues: {}", issues.join(", "))?;
                }
                Ok(())
            }
            ProgressKind::Revised { attempt, title } => {
                write!(f, "Revision {attempt} complete: \"{title}\"")
            }
            ProgressKind::Approved { attempts } => {
                write!(f, "Story approved after {attempts} revision(s)")
            }
            ProgressKind::StoryDetails {
                reading_time_minutes,
                moral_lesson,
                fun_fact,
            } => {
                let mut parts = Vec::new();
                if let Some(minutes) = reading_time_minutes {
                    parts.push(format!("reading time ~{minutes} min"));
                }
                if let Some(moral) = moral_lesson {
                    parts.push(format!("moral: {moral}"));
                }
                if let Some(fact) = fun_fact {
                    parts.push(format!("fun fact: {fact}"));
                }
                f.write_str(&parts.join("; "))
            }
            ProgressKind::Failed { reason } => write!(f, "Could not create the story: {reason}"),
        }
    }
}

/// 带序号与时间戳的进度事件；seq 在一次运行内严格递增
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ProgressKind,
}

/// 失败原因（可序列化，供调用方决定是否换参数重试）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Capability { stage: StageKind, message: String },
    RevisionExhausted,
    InsufficientResearch { found: usize, required: usize },
    Cancelled { stage: StageKind },
    InvalidRequest { message: String },
}

impl From<&PipelineError> for FailureReason {
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::Capability { stage, source } => FailureReason::Capability {
                stage: *stage,
                message: source.to_string(),
            },
            PipelineError::RevisionExhausted { .. } => FailureReason::RevisionExhausted,
            PipelineError::InsufficientResearch { found, required } => {
                FailureReason::InsufficientResearch {
                    found: *found,
                    required: *required,
                }
            }
            PipelineError::Cancelled(stage) => FailureReason::Cancelled { stage: *stage },
            PipelineError::InvalidRequest(message) | PipelineError::ConfigError(message) => {
                FailureReason::InvalidRequest {
                    message: message.clone(),
                }
            }
        }
    }
}

/// 一次运行的唯一最终结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TerminalResult {
    Success {
        draft: Draft,
        evaluation: Evaluation,
        attempts: u32,
    },
    Failed {
        reason: FailureReason,
        attempts: u32,
        /// 最后一次审核的问题列表（没有审核过则为空）
        last_issues: Vec<String>,
    },
}

impl TerminalResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalResult::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            TerminalResult::Success { attempts, .. } | TerminalResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn draft(&self) -> Option<&Draft> {
        match self {
            TerminalResult::Success { draft, .. } => Some(draft),
            TerminalResult::Failed { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            TerminalResult::Failed { reason, .. } => Some(reason),
            TerminalResult::Success { .. } => None,
        }
    }
}

/// 调用方看到的事件：若干 Progress，最后恰好一个 Terminal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Terminal(TerminalResult),
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Terminal(_))
    }
}

/// 进度发送端：由 Coordinator 持有，各组件借用它按执行顺序发送事件
///
/// 订阅方已离开时发送静默失败，不影响运行本身。
#[derive(Debug)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
    seq: AtomicU64,
}

impl ProgressSink {
    /// 创建有订阅方的发送端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                seq: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// 不发送任何事件（直接 await 结果的调用方使用）
    pub fn disabled() -> Self {
        Self {
            tx: None,
            seq: AtomicU64::new(0),
        }
    }

    pub fn emit(&self, kind: ProgressKind) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(seq, progress = %kind, "progress");
        if let Some(tx) = &self.tx {
            let _ = tx.send(PipelineEvent::Progress(ProgressEvent {
                seq,
                at: Utc::now(),
                kind,
            }));
        }
    }

    /// 发送最终结果；此后不应再有任何事件
    pub fn terminal(&self, result: TerminalResult) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(PipelineEvent::Terminal(result));
        }
    }
}
