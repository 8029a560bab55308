//! OpenAI 补全 API 数据模型
//!
//! 包含文本补全与聊天补全的请求、非流式响应以及流式 chunk 的结构定义。
use serde::{Deserialize, Serialize};

/// 文本补全默认模型
pub const DEFAULT_COMPLETION_MODEL: &str = "text-davinci-003";
/// 聊天补全默认模型
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
/// 默认最大输出 token 数
pub const DEFAULT_MAX_TOKENS: u32 = 1500;
/// 默认采样温度
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

// ============================================================================
// 文本补全
// ============================================================================

/// 文本补全请求
///
/// `stream` 字段不对调用方开放，由客户端根据调用方式在私有副本上设置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) stream: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            stop: None,
            stream: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// 是否为流式请求
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// 返回设置了 stream 标志的副本
    pub(crate) fn with_stream(&self, stream: bool) -> Self {
        let mut request = self.clone();
        request.stream = stream;
        request
    }
}

/// 文本补全的非流式响应
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
}

// ============================================================================
// 聊天补全
// ============================================================================

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// 从线上的角色字符串解析，未知角色返回 None
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// 聊天消息
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// 聊天补全请求
///
/// `messages` 的顺序即对话轮次顺序，序列化时保持不变。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) stream: bool,
}

impl ChatCompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: DEFAULT_CHAT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            stop: None,
            stream: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// 是否为流式请求
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// 返回设置了 stream 标志的副本
    pub(crate) fn with_stream(&self, stream: bool) -> Self {
        let mut request = self.clone();
        request.stream = stream;
        request
    }
}

/// 聊天补全的非流式响应
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatMessage,
}

// ============================================================================
// 流式 chunk
// ============================================================================

/// 文本补全的流式 chunk，与非流式响应结构相同
pub type CompletionChunk = CompletionResponse;

/// 聊天补全的流式 chunk
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunkChoice {
    pub delta: MessageDelta,
}

/// 聊天增量
///
/// 角色只在第一个 chunk 中出现；角色保持为原始字符串，由解码器决定如何处理未知值。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_defaults() {
        let request = CompletionRequest::new("internet explorer is");
        assert_eq!(request.model, DEFAULT_COMPLETION_MODEL);
        assert_eq!(request.max_tokens, 1500);
        assert_eq!(request.temperature, 0.2);
        assert!(request.stop.is_none());
        assert!(!request.is_stream());
    }

    #[test]
    fn test_completion_request_serialization_omits_missing_stop() {
        let request = CompletionRequest::new("hi").with_max_tokens(256);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["prompt"], "hi");
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["stream"], false);
        assert!(json.get("stop").is_none());

        let json = serde_json::to_value(request.with_stop(vec!["\n".into()])).unwrap();
        assert_eq!(json["stop"], serde_json::json!(["\n"]));
    }

    #[test]
    fn test_with_stream_leaves_original_untouched() {
        let request = CompletionRequest::new("hi");
        let streaming = request.with_stream(true);
        assert!(streaming.is_stream());
        assert!(!request.is_stream());
    }

    #[test]
    fn test_chat_request_preserves_message_order() {
        let request = ChatCompletionRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("bye"),
        ]);
        let json = serde_json::to_value(&request).unwrap();
        let roles: Vec<&str> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(json["model"], DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("tool"), None);
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn test_chat_message_equality_and_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(ChatMessage::user("a"));
        set.insert(ChatMessage::user("a"));
        set.insert(ChatMessage::assistant("a"));
        assert_eq!(set.len(), 2);
    }
}
