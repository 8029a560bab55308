//! 基于 reqwest 的 HTTP 传输
//!
//! 持有一个 `reqwest::Client` 连接池，所有调用共享。
//! 这里只设置连接超时；流式响应可能持续很久，整体超时由上层按调用方式分别控制。

use crate::config::ClientConfig;
use crate::providers::ProviderError;
use crate::streaming::traits::{
    reqwest_stream_to_stream_response, HttpTransport, TransportRequest, TransportResponse,
};
use crate::streaming::StreamError;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// 使用已有的 reqwest Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ProviderError::ConfigurationError(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, StreamError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.body(request.body).send().await?;
        let status = resp.status().as_u16();
        debug!(status, url = %request.url, "[HTTP] 收到响应头");

        Ok(TransportResponse::new(
            status,
            reqwest_stream_to_stream_response(resp),
        ))
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
