//! 数据模型：请求、搜索任务与结果、草稿、审核结论

pub mod request;
pub mod story;

pub use request::{RunRequest, StoryLength, StoryRequest};
pub use story::{
    Draft, Evaluation, PlannedSearch, SearchPlan, SearchResult, SearchTask, FUN_FACT_KEY,
    MORAL_LESSON_KEY, READING_TIME_KEY,
};
