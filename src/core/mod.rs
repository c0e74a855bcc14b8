//! 核心类型：错误分类

pub mod error;

pub use error::{CapabilityError, PipelineError, SubtaskFailure};
