//! 外部能力抽象：生成、搜索、审核
//!
//! 流水线只通过这三个 trait 与外部服务交互；LLM 实现见 `agents`，测试中可替换为脚本化实现。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::CapabilityError;
use crate::model::{Draft, Evaluation, RunRequest, SearchTask};

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Planning,
    Research,
    Synthesis,
    Evaluation,
    Revision,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Planning => "planning",
            StageKind::Research => "research",
            StageKind::Synthesis => "synthesis",
            StageKind::Evaluation => "evaluation",
            StageKind::Revision => "revision",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生成能力：规划、撰写、修订。输入输出均为 JSON，形状由 StageExecutor 校验
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(
        &self,
        stage: StageKind,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError>;
}

/// 搜索能力：每个并行子任务调用一次，返回灵感摘要
#[async_trait]
pub trait SearchCapability: Send + Sync {
    async fn search(&self, task: &SearchTask) -> Result<String, CapabilityError>;
}

/// 审核能力：对一份完整草稿给出通过 / 不通过及修改意见
#[async_trait]
pub trait EvaluationCapability: Send + Sync {
    async fn evaluate(
        &self,
        draft: &Draft,
        request: &RunRequest,
    ) -> Result<Evaluation, CapabilityError>;
}
