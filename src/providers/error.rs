//! 补全客户端错误类型
//!
//! 阻塞式补全调用的错误通道，并提供用户友好的中文错误信息。
//! 流式调用的错误不经过这里，而是折叠进句柄的终止状态（见 `StreamError`）。

use crate::streaming::StreamError;
use std::error::Error;
use std::fmt;

/// 补全客户端错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 响应中没有任何 choice
    NoChoices,

    /// 非预期的 HTTP 响应
    ///
    /// 阻塞调用要求状态码恰好为 200，其余状态码都会携带原始响应体返回。
    InvalidResponse {
        status: u16,
        body: String,
    },

    /// 响应体不符合预期的 JSON 结构
    DecodeError(String),

    /// 传输错误（含请求超时）
    TransportError(String),

    /// 配置错误
    /// origin 无效、请求无法序列化等
    ConfigurationError(String),
}

impl ProviderError {
    /// 获取用户友好的中文错误信息
    pub fn user_friendly_message(&self) -> String {
        match self {
            ProviderError::NoChoices => "响应中没有可用的结果".to_string(),
            ProviderError::InvalidResponse { status, body } => {
                format!(
                    "服务端返回了非预期的响应 (HTTP {})。详情：{}",
                    status,
                    truncate_message(body, 200)
                )
            }
            ProviderError::DecodeError(msg) => format!("数据解析失败。详情：{}", msg),
            ProviderError::TransportError(msg) => {
                format!("网络连接失败，请检查网络设置后重试。详情：{}", msg)
            }
            ProviderError::ConfigurationError(msg) => {
                format!("配置错误，请检查客户端设置。详情：{}", msg)
            }
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &str {
        match self {
            ProviderError::NoChoices => "NoChoices",
            ProviderError::InvalidResponse { .. } => "InvalidResponse",
            ProviderError::DecodeError(_) => "DecodeError",
            ProviderError::TransportError(_) => "TransportError",
            ProviderError::ConfigurationError(_) => "ConfigurationError",
        }
    }

    /// 获取 HTTP 状态码（如果有）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::InvalidResponse { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_friendly_message())
    }
}

impl Error for ProviderError {}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::DecodeError(err.to_string())
    }
}

/// 传输层错误映射到阻塞调用的错误类型
impl From<StreamError> for ProviderError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Transport(msg) => ProviderError::TransportError(msg),
            StreamError::Timeout => ProviderError::TransportError("请求超时".to_string()),
            StreamError::Decode(msg) => ProviderError::DecodeError(msg),
            StreamError::InvalidResponse { status, body } => {
                ProviderError::InvalidResponse { status, body }
            }
            other => ProviderError::TransportError(other.to_string()),
        }
    }
}

/// 截断消息到指定长度（按字符边界）
fn truncate_message(msg: &str, max_len: usize) -> String {
    if msg.len() <= max_len {
        return msg.to_string();
    }
    let mut end = max_len;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &msg[..end])
}
