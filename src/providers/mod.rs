//! 补全客户端模块
//!
//! - `openai`: OpenAI 补全客户端（阻塞与流式入口）
//! - `http`: 基于 reqwest 的默认 HTTP 传输
//! - `error`: 阻塞调用的错误类型

pub mod error;
pub mod http;
pub mod openai;

pub use error::ProviderError;
pub use http::ReqwestTransport;
pub use openai::OpenAIClient;
