//! OpenAI 补全客户端
//!
//! 同时支持阻塞调用与可观察的 SSE 流式调用：
//!
//! ```ignore
//! use openai_streaming_lib::{ClientConfig, CompletionRequest, OpenAIClient};
//!
//! let client = OpenAIClient::new(ClientConfig::new(api_key))?;
//! let mut handle = client.complete_streaming(&CompletionRequest::new("internet explorer is"));
//! while let Some(state) = handle.changed().await {
//!     println!("{:?}: {}", state.status, state.text());
//!     if state.status.is_terminal() {
//!         break;
//!     }
//! }
//! ```

pub mod config;
pub mod models;
pub mod providers;
pub mod streaming;

pub use config::{ClientConfig, ConfigError};
pub use models::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, CompletionRequest,
    CompletionResponse, Role,
};
pub use providers::{OpenAIClient, ProviderError, ReqwestTransport};
pub use streaming::{
    AccumulatedValue, ChatStreamingCompletion, CompletionState, CompletionStatus, HttpTransport,
    StreamConfig, StreamError, StreamMetrics, StreamingCompletion, TextStreamingCompletion,
    TransportRequest, TransportResponse,
};
