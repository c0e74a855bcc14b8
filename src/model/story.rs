//! 阶段间流转的数据：搜索计划 / 任务 / 结果、草稿、审核结论

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 草稿 metadata 中约定的键
pub const READING_TIME_KEY: &str = "reading_time_minutes";
pub const MORAL_LESSON_KEY: &str = "moral_lesson";
pub const FUN_FACT_KEY: &str = "fun_fact";

/// 规划阶段给出的一条搜索
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlannedSearch {
    /// 搜索词
    pub query: String,
    /// 这条搜索对故事有什么帮助
    pub purpose: String,
}

/// 规划阶段输出：主题 + 搜索列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchPlan {
    /// 由用户偏好归纳出的故事主题
    pub theme: String,
    pub searches: Vec<PlannedSearch>,
}

impl SearchPlan {
    /// 截断到 max 条并编号（id 从 1 开始），返回 (主题, 任务列表)
    pub fn into_tasks(self, max: usize) -> (String, Vec<SearchTask>) {
        let tasks = self
            .searches
            .into_iter()
            .take(max)
            .enumerate()
            .map(|(i, s)| SearchTask {
                id: i + 1,
                query: s.query,
                purpose: s.purpose,
            })
            .collect();
        (self.theme, tasks)
    }
}

/// 单个并行搜索任务，由 FanOutRunner 恰好消费一次
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTask {
    pub id: usize,
    pub query: String,
    pub purpose: String,
}

/// 成功的搜索结果；失败的任务不产生结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub task_id: usize,
    pub payload: String,
}

/// 候选稿：只通过整体替换更新（每次修订产出新的 Draft）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Draft {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Draft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn reading_time_minutes(&self) -> Option<u64> {
        self.metadata.get(READING_TIME_KEY).and_then(Value::as_u64)
    }

    pub fn moral_lesson(&self) -> Option<&str> {
        self.metadata_str(MORAL_LESSON_KEY)
    }

    pub fn fun_fact(&self) -> Option<&str> {
        self.metadata_str(FUN_FACT_KEY)
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Markdown 形式：一级标题 + 正文
    pub fn to_markdown(&self) -> String {
        format!("# {}\n\n{}", self.title, self.body)
    }
}

/// 审核结论：每份草稿恰好一次，之后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    pub approved: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub fix_instructions: String,
}

impl Evaluation {
    pub fn approved() -> Self {
        Self {
            approved: true,
            issues: Vec::new(),
            fix_instructions: String::new(),
        }
    }

    pub fn rejected(issues: Vec<String>, fix_instructions: impl Into<String>) -> Self {
        Self {
            approved: false,
            issues,
            fix_instructions: fix_instructions.into(),
        }
    }
}
