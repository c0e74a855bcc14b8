//! 从 LLM 回复中提取结构化输出
//!
//! 支持 ```json ... ``` 代码块或回复中最外层的 `{...}`；Schema 由 schemars 生成后拼入 prompt。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::core::CapabilityError;

/// 回复预览最大字符数（写入错误信息）
const REPLY_PREVIEW_CHARS: usize = 200;

/// 提取 JSON 文本：优先 ```json 代码块，其次最外层花括号
pub fn extract_json(reply: &str) -> Option<&str> {
    let trimmed = reply.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + "```json".len()..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(body.trim());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析为目标结构；找不到或解析失败均为 Malformed
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Result<T, CapabilityError> {
    let json = extract_json(reply).ok_or_else(|| {
        CapabilityError::Malformed(format!("no JSON object in reply: {}", preview(reply)))
    })?;
    serde_json::from_str(json)
        .map_err(|e| CapabilityError::Malformed(format!("{e}: {}", preview(json))))
}

/// 目标结构的 JSON Schema 字符串，可拼入 prompt
pub fn schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

fn preview(text: &str) -> String {
    if text.chars().count() > REPLY_PREVIEW_CHARS {
        format!("{}...", text.chars().take(REPLY_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Evaluation;

    #[test]
    fn test_extract_fenced_block() {
        let reply = "Here you go:\n```json\n{\"approved\": true}\n```\nThanks";
        assert_eq!(extract_json(reply), Some("{\"approved\": true}"));
    }

    #[test]
    fn test_extract_outer_braces() {
        let reply = "Verdict {\"approved\": false, \"issues\": [\"{x}\"]} done";
        assert_eq!(
            extract_json(reply),
            Some("{\"approved\": false, \"issues\": [\"{x}\"]}")
        );
    }

    #[test]
    fn test_plain_text_is_malformed() {
        let err = parse_reply::<Evaluation>("I think the story is lovely").unwrap_err();
        assert!(matches!(err, CapabilityError::Malformed(msg) if msg.contains("no JSON")));
    }

    #[test]
    fn test_schema_names_fields() {
        let schema = schema_json::<Evaluation>();
        assert!(schema.contains("fix_instructions"));
    }
}
