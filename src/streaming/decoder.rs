//! 增量解码器
//!
//! 把单个 SSE 事件的 data 负载解析为类型化的增量：
//! 文本补全得到文本片段，聊天补全得到角色与内容片段。
//! 解码是纯函数，不持有状态。

use crate::models::openai::{ChatCompletionChunk, ChatMessage, CompletionChunk, Role};
use crate::streaming::StreamError;
use tracing::debug;

/// 流结束标记
pub const DONE_SENTINEL: &str = "[DONE]";

/// 判断负载是否为流结束标记
pub fn is_done_sentinel(payload: &str) -> bool {
    payload.trim() == DONE_SENTINEL
}

/// 文本补全增量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta {
    pub text: String,
}

/// 聊天补全增量
///
/// `role` 只在响应的第一个增量中出现。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatDelta {
    pub role: Option<Role>,
    pub content: Option<String>,
}

/// 解码文本补全负载
///
/// 结束标记、空负载以及没有可用片段的 chunk 返回 `Ok(None)`；
/// 不符合结构的负载返回解码错误。
pub fn decode_text_delta(payload: &str) -> Result<Option<TextDelta>, StreamError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return Ok(None);
    }

    let chunk: CompletionChunk = serde_json::from_str(payload)
        .map_err(|e| StreamError::decode(format!("文本补全 chunk 解析失败: {}", e)))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.text)
        .filter(|text| !text.is_empty())
        .map(|text| TextDelta { text }))
}

/// 解码聊天补全负载
pub fn decode_chat_delta(payload: &str) -> Result<Option<ChatDelta>, StreamError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return Ok(None);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(payload)
        .map_err(|e| StreamError::decode(format!("聊天补全 chunk 解析失败: {}", e)))?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let role = match choice.delta.role.as_deref() {
        Some(raw) => {
            let role = Role::parse(raw);
            if role.is_none() {
                debug!(role = raw, "忽略未知的消息角色");
            }
            role
        }
        None => None,
    };
    let content = choice.delta.content.filter(|c| !c.is_empty());

    if role.is_none() && content.is_none() {
        return Ok(None);
    }

    Ok(Some(ChatDelta { role, content }))
}

/// 累积值
///
/// 为只关心文本的调用方提供扁平化的累积文本。
pub trait AccumulatedValue: Clone + Send + Sync + 'static {
    fn text(&self) -> &str;
}

impl AccumulatedValue for String {
    fn text(&self) -> &str {
        self
    }
}

impl AccumulatedValue for ChatMessage {
    fn text(&self) -> &str {
        &self.content
    }
}

/// 一种补全类型的增量解码器
///
/// 把"如何解码一个负载"与"如何把增量应用到累积值"绑定在一起，
/// 流式驱动逻辑对两种补全类型保持一致。
pub trait DeltaDecoder: Send + Sync + 'static {
    type Delta: Send;
    type Value: AccumulatedValue;

    /// 补全类型名称，用于日志
    const KIND: &'static str;

    /// 累积值的初始状态
    fn initial() -> Self::Value;

    fn decode(payload: &str) -> Result<Option<Self::Delta>, StreamError>;

    /// 把增量应用到累积值，返回值是否发生了变化
    fn apply(value: &mut Self::Value, delta: Self::Delta) -> bool;

    /// 增量会追加的字节数，用于有界缓冲区检查
    fn appended_len(delta: &Self::Delta) -> usize;
}

/// 文本补全解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCompletionDecoder;

impl DeltaDecoder for TextCompletionDecoder {
    type Delta = TextDelta;
    type Value = String;

    const KIND: &'static str = "completion";

    fn initial() -> String {
        String::new()
    }

    fn decode(payload: &str) -> Result<Option<TextDelta>, StreamError> {
        decode_text_delta(payload)
    }

    fn apply(value: &mut String, delta: TextDelta) -> bool {
        if delta.text.is_empty() {
            return false;
        }
        value.push_str(&delta.text);
        true
    }

    fn appended_len(delta: &TextDelta) -> usize {
        delta.text.len()
    }
}

/// 聊天补全解码器
///
/// 累积值初始角色为 assistant，增量中显式给出的角色会覆盖它。
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatCompletionDecoder;

impl DeltaDecoder for ChatCompletionDecoder {
    type Delta = ChatDelta;
    type Value = ChatMessage;

    const KIND: &'static str = "chat";

    fn initial() -> ChatMessage {
        ChatMessage::assistant("")
    }

    fn decode(payload: &str) -> Result<Option<ChatDelta>, StreamError> {
        decode_chat_delta(payload)
    }

    fn apply(value: &mut ChatMessage, delta: ChatDelta) -> bool {
        let mut changed = false;
        if let Some(role) = delta.role {
            if value.role != role {
                value.role = role;
                changed = true;
            }
        }
        if let Some(content) = delta.content {
            if !content.is_empty() {
                value.content.push_str(&content);
                changed = true;
            }
        }
        changed
    }

    fn appended_len(delta: &ChatDelta) -> usize {
        delta.content.as_ref().map_or(0, String::len)
    }
}

// ============================================================================
// 测试模块
// ============================================================================
