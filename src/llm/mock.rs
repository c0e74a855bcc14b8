//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! 先按顺序返回预置回复；预置回复用完后返回固定回复，未设置固定回复时回显最后一条 User 消息。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{LlmClient, Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    /// 最近一次收到的消息（便于测试检查 prompt）
    last_messages: Mutex<Vec<Message>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 始终返回同一段文本
    pub fn always(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    /// 依次返回给定回复（Err 模拟后端错误）
    pub fn with_replies<I>(mut self, replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, String>>,
    {
        self.replies = Mutex::new(replies.into_iter().collect());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_messages(&self) -> Vec<Message> {
        self.last_messages.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().await = messages.to_vec();

        if let Some(reply) = self.replies.lock().await.pop_front() {
            return reply;
        }
        if let Some(fallback) = &self.fallback {
            return Ok(fallback.clone());
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {last_user}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_fallback() {
        let mock = MockLlmClient::always("steady")
            .with_replies(vec![Ok("first".to_string()), Err("boom".to_string())]);
        let msgs = [Message::user("hi")];
        assert_eq!(mock.complete(&msgs).await, Ok("first".to_string()));
        assert_eq!(mock.complete(&msgs).await, Err("boom".to_string()));
        assert_eq!(mock.complete(&msgs).await, Ok("steady".to_string()));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_echo_without_script() {
        let mock = MockLlmClient::new();
        let reply = mock
            .complete(&[Message::system("sys"), Message::user("tell a story")])
            .await
            .unwrap();
        assert_eq!(reply, "Echo from Mock: tell a story");
    }
}
