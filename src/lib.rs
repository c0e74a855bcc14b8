//! Dreamweaver - 分阶段的儿童睡前故事生成流水线
//!
//! 模块划分：
//! - **agents**: 基于 LLM 的四个角色（规划 / 调研 / 撰写 / 审核）
//! - **capability**: 流水线依赖的外部能力 trait 与阶段类型
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **model**: 请求、搜索任务、草稿、审核结论
//! - **observability**: tracing 订阅器初始化
//! - **pipeline**: 协调器、并行调研、修订循环、进度事件流

pub mod agents;
pub mod capability;
pub mod config;
pub mod core;
pub mod llm;
pub mod model;
pub mod observability;
pub mod pipeline;

pub use capability::{EvaluationCapability, GenerationCapability, SearchCapability, StageKind};
pub use core::{CapabilityError, PipelineError};
pub use model::{Draft, Evaluation, RunRequest, StoryRequest};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineEvent, ProgressKind, RunStream, TerminalResult};
