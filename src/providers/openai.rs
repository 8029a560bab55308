//! OpenAI 补全客户端
//!
//! 提供文本补全与聊天补全两类接口，每类都有阻塞与流式两种调用方式：
//!
//! - 阻塞调用：等待完整响应，返回 `Result`
//! - 流式调用：立即返回可观察句柄，失败折叠进句柄的终止状态，从不同步报错
use crate::config::ClientConfig;
use crate::models::openai::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionRequest,
    CompletionResponse,
};
use crate::providers::http::ReqwestTransport;
use crate::providers::ProviderError;
use crate::streaming::accumulator::{
    Accumulator, ChatStreamingCompletion, StreamingCompletion, TextStreamingCompletion,
};
use crate::streaming::decoder::{ChatCompletionDecoder, DeltaDecoder, TextCompletionDecoder};
use crate::streaming::manager::StreamManager;
use crate::streaming::traits::{HttpTransport, TransportRequest};
use crate::streaming::StreamError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPLETIONS_ENDPOINT: &str = "completions";
const CHAT_COMPLETIONS_ENDPOINT: &str = "chat/completions";

/// OpenAI 补全客户端
///
/// 可以在多个任务间共享（`Arc<OpenAIClient>`），每次调用彼此独立。
pub struct OpenAIClient {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    manager: StreamManager,
}

impl OpenAIClient {
    /// 使用默认的 reqwest 传输创建客户端
    pub fn new(config: ClientConfig) -> Result<Self, ProviderError> {
        let transport = ReqwestTransport::from_config(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// 使用自定义传输创建客户端
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ProviderError> {
        config
            .validate()
            .map_err(|e| ProviderError::ConfigurationError(e.to_string()))?;

        let manager = StreamManager::new(config.stream.clone());
        Ok(Self {
            config,
            transport,
            manager,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 构建完整的 API URL
    pub fn build_url(&self, endpoint: &str) -> String {
        self.config.endpoint_url(endpoint)
    }

    /// 构建 POST 请求
    fn build_request<T: Serialize>(
        &self,
        endpoint: &str,
        body: &T,
        streaming: bool,
    ) -> Result<TransportRequest, ProviderError> {
        let body = serde_json::to_vec(body)
            .map_err(|e| ProviderError::ConfigurationError(format!("请求序列化失败: {}", e)))?;

        let mut request = TransportRequest::new(self.build_url(endpoint), body)
            .with_header("Authorization", format!("Bearer {}", self.config.api_key))
            .with_header("Content-Type", "application/json");

        if let Some(org_id) = &self.config.org_id {
            request = request.with_header("OpenAI-Organization", org_id.as_str());
        }
        if streaming {
            request = request.with_header("Accept", "text/event-stream");
        }
        Ok(request)
    }

    // ========================================================================
    // 文本补全
    // ========================================================================

    /// 文本补全（阻塞）
    ///
    /// 返回第一个 choice 的文本。
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = request.with_stream(false);
        let http_request = self.build_request(COMPLETIONS_ENDPOINT, &body, false)?;

        info!(
            "[OPENAI] 发起补全请求: url={} model={}",
            http_request.url, request.model
        );

        let response: CompletionResponse = self.send_blocking(http_request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or(ProviderError::NoChoices)
    }

    /// 文本补全（流式）
    pub fn complete_streaming(&self, request: &CompletionRequest) -> TextStreamingCompletion {
        let body = request.with_stream(true);
        self.start_stream::<TextCompletionDecoder, _>(COMPLETIONS_ENDPOINT, &body, &request.model)
    }

    // ========================================================================
    // 聊天补全
    // ========================================================================

    /// 聊天补全（阻塞）
    ///
    /// 返回第一个 choice 的消息。
    pub async fn complete_chat(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatMessage, ProviderError> {
        let body = request.with_stream(false);
        let http_request = self.build_request(CHAT_COMPLETIONS_ENDPOINT, &body, false)?;

        info!(
            "[OPENAI] 发起聊天补全请求: url={} model={} messages={}",
            http_request.url,
            request.model,
            request.messages.len()
        );

        let response: ChatCompletionResponse = self.send_blocking(http_request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or(ProviderError::NoChoices)
    }

    /// 聊天补全（流式）
    pub fn complete_chat_streaming(
        &self,
        request: &ChatCompletionRequest,
    ) -> ChatStreamingCompletion {
        let body = request.with_stream(true);
        self.start_stream::<ChatCompletionDecoder, _>(
            CHAT_COMPLETIONS_ENDPOINT,
            &body,
            &request.model,
        )
    }

    // ========================================================================
    // 内部实现
    // ========================================================================

    fn start_stream<D, T>(
        &self,
        endpoint: &str,
        body: &T,
        model: &str,
    ) -> StreamingCompletion<D::Value>
    where
        D: DeltaDecoder,
        T: Serialize,
    {
        let http_request = match self.build_request(endpoint, body, true) {
            Ok(request) => request,
            Err(e) => {
                warn!("[OPENAI_STREAM] 构建请求失败: {}", e);
                let (accumulator, handle) =
                    Accumulator::for_decoder::<D>(uuid::Uuid::new_v4().to_string());
                accumulator.fail(StreamError::internal(e.to_string()), None);
                return handle;
            }
        };

        info!(
            "[OPENAI_STREAM] 发起流式请求: url={} model={}",
            http_request.url, model
        );
        debug!("[OPENAI_STREAM] 请求详情:\n{}", http_request.describe());

        self.manager
            .spawn::<D>(self.transport.clone(), http_request, model)
    }

    /// 发送阻塞请求并解析 JSON 响应
    ///
    /// 状态码必须恰好为 200；整个过程受 `request_timeout_ms` 限制。
    async fn send_blocking<R: DeserializeOwned>(
        &self,
        request: TransportRequest,
    ) -> Result<R, ProviderError> {
        debug!("[OPENAI] 请求详情:\n{}", request.describe());

        let exchange = async {
            let response = self.transport.send(request).await?;
            let status = response.status;
            let body = response.bytes().await?;
            Ok::<_, StreamError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.config.request_timeout(), exchange)
            .await
            .map_err(|_| {
                warn!(
                    timeout_ms = self.config.request_timeout_ms,
                    "[OPENAI] 请求超时"
                );
                ProviderError::TransportError("请求超时".to_string())
            })??;

        if status != 200 {
            let body = String::from_utf8_lossy(&body).into_owned();
            warn!(status, "[OPENAI] 服务端返回非预期状态: {}", body);
            return Err(ProviderError::InvalidResponse { status, body });
        }

        serde_json::from_slice(&body).map_err(|e| {
            warn!("[OPENAI] 响应解析失败: {}", e);
            ProviderError::DecodeError(format!("响应解析失败: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::openai::Role;
    use crate::streaming::accumulator::CompletionStatus;
    use crate::streaming::traits::mock::MockTransport;
    use crate::streaming::traits::TransportResponse;
    use async_trait::async_trait;

    fn client(transport: Arc<MockTransport>) -> OpenAIClient {
        OpenAIClient::with_transport(ClientConfig::new("sk-test"), transport).unwrap()
    }

    fn body_json(request: &TransportRequest) -> serde_json::Value {
        serde_json::from_slice(&request.body).unwrap()
    }

    #[test]
    fn test_build_url() {
        let transport = Arc::new(MockTransport::new());
        let client = OpenAIClient::with_transport(
            ClientConfig::new("k").with_origin("http://localhost:8080/v1"),
            transport,
        )
        .unwrap();
        assert_eq!(
            client.build_url("completions"),
            "http://localhost:8080/v1/completions"
        );
    }

    #[test]
    fn test_invalid_origin_is_configuration_error() {
        let result = OpenAIClient::with_transport(
            ClientConfig::new("k").with_origin("not-a-url"),
            Arc::new(MockTransport::new()),
        );
        assert!(matches!(
            result.err(),
            Some(ProviderError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice_text() {
        let transport = Arc::new(MockTransport::new().with_response(TransportResponse::from_bytes(
            200,
            r#"{"choices":[{"text":"hello"},{"text":"ignored"}]}"#,
        )));
        let text = client(transport.clone())
            .complete(&CompletionRequest::new("say hello"))
            .await
            .unwrap();
        assert_eq!(text, "hello");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.url, "https://api.openai.com/v1/completions");
        assert_eq!(request.header("Authorization"), Some("Bearer sk-test"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.header("Accept"), None);
        assert_eq!(request.header("OpenAI-Organization"), None);

        let body = body_json(request);
        assert_eq!(body["prompt"], "say hello");
        assert_eq!(body["stream"], false);
        assert_eq!(body["max_tokens"], 1500);
    }

    #[tokio::test]
    async fn test_complete_no_choices() {
        let transport = Arc::new(
            MockTransport::new().with_response(TransportResponse::from_bytes(200, r#"{"choices":[]}"#)),
        );
        let err = client(transport)
            .complete(&CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NoChoices);
    }

    #[tokio::test]
    async fn test_complete_non_200_carries_body() {
        for status in [500u16, 201] {
            let transport = Arc::new(
                MockTransport::new().with_response(TransportResponse::from_bytes(status, "upstream broke")),
            );
            let err = client(transport)
                .complete(&CompletionRequest::new("x"))
                .await
                .unwrap_err();
            assert_eq!(
                err,
                ProviderError::InvalidResponse {
                    status,
                    body: "upstream broke".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_complete_malformed_body() {
        let transport = Arc::new(
            MockTransport::new().with_response(TransportResponse::from_bytes(200, r#"{"data":1}"#)),
        );
        let err = client(transport)
            .complete(&CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::DecodeError(_)));
    }

    #[tokio::test]
    async fn test_complete_transport_error() {
        let transport = Arc::new(MockTransport::new().with_error(StreamError::transport("refused")));
        let err = client(transport)
            .complete(&CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::TransportError("refused".to_string()));
    }

    #[tokio::test]
    async fn test_complete_request_timeout() {
        struct Hanging;

        #[async_trait]
        impl HttpTransport for Hanging {
            async fn send(&self, _: TransportRequest) -> Result<TransportResponse, StreamError> {
                std::future::pending().await
            }

            fn name(&self) -> &'static str {
                "hanging"
            }
        }

        let client = OpenAIClient::with_transport(
            ClientConfig::new("k").with_request_timeout_ms(50),
            Arc::new(Hanging),
        )
        .unwrap();
        let err = client.complete(&CompletionRequest::new("x")).await.unwrap_err();
        assert!(matches!(err, ProviderError::TransportError(_)));
    }

    #[tokio::test]
    async fn test_complete_chat() {
        let transport = Arc::new(MockTransport::new().with_response(TransportResponse::from_bytes(
            200,
            r#"{"id":"chatcmpl-1","choices":[{"index":0,"message":{"role":"assistant","content":"Hi!"},"finish_reason":"stop"}]}"#,
        )));
        let config = ClientConfig::new("sk-test").with_org_id("org-42");
        let client = OpenAIClient::with_transport(config, transport.clone()).unwrap();

        let request = ChatCompletionRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hello"),
        ]);
        let message = client.complete_chat(&request).await.unwrap();
        assert_eq!(message, ChatMessage::assistant("Hi!"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(sent.header("OpenAI-Organization"), Some("org-42"));
        let body = body_json(sent);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[tokio::test]
    async fn test_complete_chat_bad_message_shape() {
        let transport = Arc::new(MockTransport::new().with_response(TransportResponse::from_bytes(
            200,
            r#"{"choices":[{"message":{"role":"robot","content":"x"}}]}"#,
        )));
        let err = client(transport)
            .complete_chat(&ChatCompletionRequest::new(vec![ChatMessage::user("x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::DecodeError(_)));
    }

    #[tokio::test]
    async fn test_complete_chat_no_choices() {
        let transport = Arc::new(
            MockTransport::new().with_response(TransportResponse::from_bytes(200, r#"{"choices":[]}"#)),
        );
        let err = client(transport)
            .complete_chat(&ChatCompletionRequest::new(vec![ChatMessage::user("x")]))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::NoChoices);
    }

    #[tokio::test]
    async fn test_complete_chat_non_200_carries_body() {
        for status in [429u16, 204] {
            let transport = Arc::new(
                MockTransport::new().with_response(TransportResponse::from_bytes(status, "rate limited")),
            );
            let err = client(transport)
                .complete_chat(&ChatCompletionRequest::new(vec![ChatMessage::user("x")]))
                .await
                .unwrap_err();
            assert_eq!(
                err,
                ProviderError::InvalidResponse {
                    status,
                    body: "rate limited".to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_complete_streaming_sets_stream_flag_and_accept_header() {
        let body = concat!(
            "data: {\"choices\":[{\"text\":\"Hel\"}]}\n\n",
            "data: {\"choices\":[{\"text\":\"lo\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        let transport = Arc::new(MockTransport::new().with_response(TransportResponse::from_bytes(200, body)));
        let handle = client(transport.clone()).complete_streaming(&CompletionRequest::new("x"));

        let state = handle.wait().await;
        assert_eq!(state.status, CompletionStatus::Complete);
        assert_eq!(state.value, "Hello");

        let sent = &transport.requests()[0];
        assert_eq!(sent.header("Accept"), Some("text/event-stream"));
        assert_eq!(body_json(sent)["stream"], true);
    }

    #[tokio::test]
    async fn test_complete_chat_streaming() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let transport = Arc::new(MockTransport::new().with_response(TransportResponse::from_bytes(200, body)));
        let handle = client(transport)
            .complete_chat_streaming(&ChatCompletionRequest::new(vec![ChatMessage::user("hey")]));

        let state = handle.wait().await;
        assert_eq!(state.status, CompletionStatus::Complete);
        assert_eq!(state.value, ChatMessage::new(Role::Assistant, "Hi there"));
        assert_eq!(handle.text(), "Hi there");
    }

    #[tokio::test]
    async fn test_streaming_never_fails_synchronously() {
        let transport = Arc::new(MockTransport::new().with_error(StreamError::transport("down")));
        let handle = client(transport).complete_streaming(&CompletionRequest::new("x"));

        let state = handle.wait().await;
        assert_eq!(state.status, CompletionStatus::Error);
        assert_eq!(state.error, Some(StreamError::transport("down")));
    }

    #[tokio::test]
    async fn test_concurrent_streams_are_isolated() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(TransportResponse::from_bytes(
                    200,
                    "data: {\"choices\":[{\"text\":\"one\"}]}\n\n",
                ))
                .with_response(TransportResponse::from_bytes(
                    200,
                    "data: {\"choices\":[{\"text\":\"two\"}]}\n\n",
                )),
        );
        let client = client(transport);
        let first = client.complete_streaming(&CompletionRequest::new("a"));
        let second = client.complete_streaming(&CompletionRequest::new("b"));
        assert_ne!(first.id(), second.id());

        let (a, b) = tokio::join!(first.wait(), second.wait());
        let mut texts = vec![a.value, b.value];
        texts.sort();
        assert_eq!(texts, vec!["one".to_string(), "two".to_string()]);
    }
}
