//! HTTP 传输 Trait 定义
//!
//! 把"发送一个 HTTP 请求并拿到状态码与字节流"抽象成可注入的接口，
//! 使补全客户端可以在没有真实网络的情况下测试，并显式管理连接池的生命周期。

use crate::streaming::StreamError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;

/// 流式响应类型别名
///
/// 返回一个异步字节流，每个 Item 是一个 chunk 的字节数据或错误。
/// 使用 `Pin<Box<...>>` 以支持动态分发和异步迭代。
pub type StreamResponse = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// 待发送的 HTTP 请求
///
/// 方法固定为 POST，body 是已经序列化好的 JSON。
#[derive(Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportRequest {
    pub fn new(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 查找 header（名称大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// 生成用于调试日志的请求描述
    ///
    /// Authorization 中的凭证会被遮盖。
    pub fn describe(&self) -> String {
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| format!("{}: {}", k, redact_header(k, v)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "POST {}\nHeaders: [{}]\nBody: {}",
            self.url,
            headers,
            String::from_utf8_lossy(&self.body)
        )
    }
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), redact_header(k, v)))
            .collect();
        f.debug_struct("TransportRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

fn redact_header(name: &str, value: &str) -> String {
    if name.eq_ignore_ascii_case("authorization") {
        match value.split_once(' ') {
            Some((scheme, _)) => format!("{} ***", scheme),
            None => "***".to_string(),
        }
    } else {
        value.to_string()
    }
}

/// HTTP 响应：状态码与尚未读取的响应体字节流
pub struct TransportResponse {
    pub status: u16,
    pub body: StreamResponse,
}

impl TransportResponse {
    pub fn new(status: u16, body: StreamResponse) -> Self {
        Self { status, body }
    }

    /// 用一段完整的响应体构造响应，主要用于测试替身
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            body: Box::pin(futures::stream::iter(vec![Ok(body)])),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 读取完整响应体
    pub async fn bytes(self) -> Result<Bytes, StreamError> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// 读取完整响应体为文本（非法 UTF-8 有损替换）
    pub async fn text(self) -> Result<String, StreamError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// HTTP 传输 Trait
///
/// 实现方负责真正的网络 I/O。客户端对每次调用只发送一次请求，
/// 不做重试，也不做重连。
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// 发送 POST 请求
    ///
    /// 只要拿到了响应头就返回 `Ok`，无论状态码是多少；
    /// 连接失败等传输层问题返回 `Err`。
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, StreamError>;

    /// 传输实现名称，用于日志
    fn name(&self) -> &'static str;
}

// ============================================================================
// 辅助函数
// ============================================================================

/// 将 reqwest 的 bytes_stream 转换为 StreamResponse
pub fn reqwest_stream_to_stream_response(response: reqwest::Response) -> StreamResponse {
    let stream = response
        .bytes_stream()
        .map(|result| result.map_err(StreamError::from));

    Box::pin(stream)
}

// ============================================================================
// 测试替身
// ============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 按顺序返回预置响应，并记录收到的请求
    #[derive(Default)]
    pub struct MockTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, StreamError>>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(self, response: TransportResponse) -> Self {
            self.responses.lock().unwrap().push_back(Ok(response));
            self
        }

        pub fn with_error(self, error: StreamError) -> Self {
            self.responses.lock().unwrap().push_back(Err(error));
            self
        }

        pub fn requests(&self) -> Vec<TransportRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, StreamError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(StreamError::transport("no mock response left")))
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }
}

// ============================================================================
// 测试模块
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_redacts_bearer_token() {
        let request = TransportRequest::new("https://api.openai.com/v1/completions", b"{}".to_vec())
            .with_header("Authorization", "Bearer sk-secret")
            .with_header("Content-Type", "application/json");

        let description = request.describe();
        assert!(description.starts_with("POST https://api.openai.com/v1/completions"));
        assert!(description.contains("Authorization: Bearer ***"));
        assert!(!description.contains("sk-secret"));
        assert!(description.contains("Content-Type: application/json"));

        let debug = format!("{:?}", request);
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = TransportRequest::new("http://localhost", Vec::new())
            .with_header("OpenAI-Organization", "org-1");
        assert_eq!(request.header("openai-organization"), Some("org-1"));
        assert_eq!(request.header("accept"), None);
    }

    #[tokio::test]
    async fn test_response_text_collects_chunks() {
        let chunks: Vec<Result<Bytes, StreamError>> =
            vec![Ok(Bytes::from("hel")), Ok(Bytes::from("lo"))];
        let response = TransportResponse::new(200, Box::pin(futures::stream::iter(chunks)));
        assert!(response.is_success());
        assert_eq!(response.text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_response_text_propagates_transport_error() {
        let chunks: Vec<Result<Bytes, StreamError>> = vec![
            Ok(Bytes::from("hel")),
            Err(StreamError::transport("connection reset")),
        ];
        let response = TransportResponse::new(200, Box::pin(futures::stream::iter(chunks)));
        let err = response.text().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_response_is_success_range() {
        assert!(TransportResponse::from_bytes(204, "").is_success());
        assert!(!TransportResponse::from_bytes(301, "").is_success());
        assert!(!TransportResponse::from_bytes(500, "").is_success());
    }
}
