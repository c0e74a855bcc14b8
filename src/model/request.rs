//! 运行请求：RunRequest（自由属性表）与 StoryRequest（睡前故事参数）

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::PipelineError;

/// 一次运行的全部用户输入，创建后只读（流水线内以 Arc 共享）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunRequest {
    attributes: BTreeMap<String, Value>,
}

impl RunRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构建时追加属性（消费 self，构建完成后不再可变）
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// 属性存在且不为 null
    pub fn has(&self, key: &str) -> bool {
        self.get(key).map_or(false, |v| !v.is_null())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// 返回 required 中缺失（或为 null）的属性名
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|key| !self.has(key))
            .map(String::as_str)
            .collect()
    }
}

impl FromIterator<(String, Value)> for RunRequest {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            attributes: iter.into_iter().collect(),
        }
    }
}

/// 故事篇幅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoryLength {
    Short,
    #[default]
    Medium,
    Long,
}

/// 睡前故事参数：孩子是主角，其余字段决定主题、篇幅与语言
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRequest {
    pub child_name: String,
    pub age: u8,
    pub story_length: StoryLength,
    pub interests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_character: Option<String>,
    pub moral_lesson: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics_to_avoid: Option<String>,
    pub include_fun_fact: bool,
    pub story_language: String,
}

impl StoryRequest {
    /// 名字必填，兴趣至少一个；空白的可选字段视为未填
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.child_name.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "child name is required".to_string(),
            ));
        }
        if self.interests.iter().all(|i| i.trim().is_empty()) {
            return Err(PipelineError::InvalidRequest(
                "select at least one interest".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_run_request(mut self) -> Result<RunRequest, PipelineError> {
        self.validate()?;
        self.interests.retain(|i| !i.trim().is_empty());
        self.special_character = self.special_character.filter(|s| !s.trim().is_empty());
        self.topics_to_avoid = self.topics_to_avoid.filter(|s| !s.trim().is_empty());

        match serde_json::to_value(&self) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            Ok(other) => Err(PipelineError::InvalidRequest(format!(
                "story request serialized to non-object: {other}"
            ))),
            Err(e) => Err(PipelineError::InvalidRequest(e.to_string())),
        }
    }
}
