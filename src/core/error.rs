//! 流水线错误类型
//!
//! - CapabilityError：外部能力（生成 / 搜索 / 审核）没有给出可用的结构化结果
//! - SubtaskFailure：单个并行搜索失败，只在 FanOutRunner 内部吸收，从不终止运行
//! - PipelineError：终止整次运行的错误，由 Coordinator 转为失败的 TerminalResult

use thiserror::Error;

use crate::capability::StageKind;

/// 外部能力调用失败（不可用、输出格式错误、拒绝、超时）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed output: {0}")]
    Malformed(String),

    /// 后端策略拒绝（与内容审核的「不通过」不同）
    #[error("Refused by capability: {0}")]
    Refused(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),
}

/// 单个搜索子任务失败：仅用于日志，结果集中直接缺席
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Search task {task_id} failed: {reason}")]
pub struct SubtaskFailure {
    pub task_id: usize,
    pub reason: String,
}

/// 终止一次运行的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{stage} stage failed: {source}")]
    Capability {
        stage: StageKind,
        #[source]
        source: CapabilityError,
    },

    /// 修订次数用尽仍未通过审核；携带最后一次审核的问题列表
    #[error("Revision exhausted after {attempts} attempts")]
    RevisionExhausted { attempts: u32, issues: Vec<String> },

    #[error("Insufficient research: {found} results, {required} required")]
    InsufficientResearch { found: usize, required: usize },

    #[error("Cancelled before {0} stage")]
    Cancelled(StageKind),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl PipelineError {
    pub fn capability(stage: StageKind) -> impl FnOnce(CapabilityError) -> Self {
        move |source| Self::Capability { stage, source }
    }
}
