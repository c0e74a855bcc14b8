//! 故事生成流水线：规划 -> 并行调研 -> 撰写 -> 审核 / 修订循环
//!
//! - `coordinator`：Pipeline，驱动一次运行并产出唯一的 TerminalResult
//! - `stage`：单次能力调用的超时、解码与校验
//! - `fanout`：调研子任务并行执行，部分失败可容忍
//! - `revision`：有上限的审核 / 修订状态机
//! - `progress` / `stream`：有序进度事件与调用方可消费的事件流

pub mod builder;
pub mod coordinator;
pub mod fanout;
pub mod progress;
pub mod revision;
pub mod stage;
pub mod stream;

pub use builder::PipelineBuilder;
pub use coordinator::Pipeline;
pub use fanout::FanOutRunner;
pub use progress::{
    FailureReason, PipelineEvent, ProgressEvent, ProgressKind, ProgressSink, TerminalResult,
};
pub use revision::{LoopContext, LoopOutcome, LoopPhase, RevisionLoop, RunState, Transition};
pub use stage::{StageExecutor, StageOutput};
pub use stream::RunStream;
