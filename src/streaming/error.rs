//! 流式传输错误类型
//!
//! 定义流式补全过程中可能发生的各种错误类型。
//!
//! 流式调用不会把这些错误作为返回值抛给调用方，而是折叠进累积器的
//! 终止状态 `Error` 中，作为该模式下唯一的失败通道。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 流式传输错误类型
///
/// 涵盖流式传输过程中可能发生的所有错误情况。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum StreamError {
    /// 传输错误
    ///
    /// 当网络连接失败、DNS 解析失败或连接在读取过程中被重置时发生。
    Transport(String),

    /// 超时错误
    ///
    /// 整体超时或两个事件之间的空闲超时。
    Timeout,

    /// 解码错误
    ///
    /// SSE 帧格式错误，或 data 负载不符合预期的 JSON 结构。
    Decode(String),

    /// 非预期的 HTTP 响应
    ///
    /// 服务端返回非 2xx 状态码，携带原始响应体以便诊断。
    InvalidResponse {
        /// HTTP 状态码
        status: u16,
        /// 原始响应体
        body: String,
    },

    /// 调用方主动取消
    Cancelled,

    /// 缓冲区溢出
    ///
    /// 累积的文本超过配置的 `buffer_size`。
    BufferOverflow,

    /// 内部错误
    Internal(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Transport(msg) => write!(f, "传输错误: {}", msg),
            StreamError::Timeout => write!(f, "流式响应超时"),
            StreamError::Decode(msg) => write!(f, "解码错误: {}", msg),
            StreamError::InvalidResponse { status, body } => {
                write!(f, "非预期的响应 ({}): {}", status, body)
            }
            StreamError::Cancelled => write!(f, "流式请求已取消"),
            StreamError::BufferOverflow => write!(f, "缓冲区溢出"),
            StreamError::Internal(msg) => write!(f, "内部错误: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

// ============================================================================
// From trait 实现 - 用于错误转换
// ============================================================================

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Timeout
        } else if err.is_connect() {
            StreamError::Transport(format!("连接失败: {}", err))
        } else if err.is_request() {
            StreamError::Transport(format!("请求错误: {}", err))
        } else {
            StreamError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(err.to_string())
    }
}

// ============================================================================
// 辅助方法
// ============================================================================

impl StreamError {
    /// 创建传输错误
    pub fn transport(msg: impl Into<String>) -> Self {
        StreamError::Transport(msg.into())
    }

    /// 创建解码错误
    pub fn decode(msg: impl Into<String>) -> Self {
        StreamError::Decode(msg.into())
    }

    /// 创建非预期响应错误
    pub fn invalid_response(status: u16, body: impl Into<String>) -> Self {
        StreamError::InvalidResponse {
            status,
            body: body.into(),
        }
    }

    /// 创建内部错误
    pub fn internal(msg: impl Into<String>) -> Self {
        StreamError::Internal(msg.into())
    }

    /// 是否为解码错误
    pub fn is_decode(&self) -> bool {
        matches!(self, StreamError::Decode(_))
    }

    /// 是否为传输层错误（包括超时）
    pub fn is_transport(&self) -> bool {
        matches!(self, StreamError::Transport(_) | StreamError::Timeout)
    }

    /// 是否由调用方取消引起
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// 获取 HTTP 状态码（如果适用）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StreamError::InvalidResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            StreamError::Transport(_) => "transport_error",
            StreamError::Timeout => "timeout",
            StreamError::Decode(_) => "decode_error",
            StreamError::InvalidResponse { .. } => "invalid_response",
            StreamError::Cancelled => "cancelled",
            StreamError::BufferOverflow => "buffer_overflow",
            StreamError::Internal(_) => "internal_error",
        }
    }
}

// ============================================================================
// 测试模块
// ============================================================================
