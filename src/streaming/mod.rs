//! 流式补全核心模块
//!
//! 把一次 SSE 流式响应转换为可观察的实时更新值。
//!
//! # 主要组件
//!
//! - `traits`: HTTP 传输抽象与流式响应类型
//! - `reader`: SSE 事件流读取器
//! - `decoder`: 增量解码器
//! - `accumulator`: 累积器与可观察句柄
//! - `manager`: 流式管理器（每个流一个驱动任务）
//! - `metrics`: 流式指标
//! - `error`: 流式错误类型

pub mod accumulator;
pub mod decoder;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod reader;
pub mod traits;

// 重新导出核心类型
pub use accumulator::{
    Accumulator, ChatStreamingCompletion, CompletionState, CompletionStatus, StreamingCompletion,
    TextStreamingCompletion,
};
pub use decoder::{
    decode_chat_delta, decode_text_delta, is_done_sentinel, AccumulatedValue, ChatCompletionDecoder,
    ChatDelta, DeltaDecoder, TextCompletionDecoder, TextDelta, DONE_SENTINEL,
};
pub use error::StreamError;
pub use manager::{StreamConfig, StreamManager};
pub use metrics::StreamMetrics;
pub use reader::{read_events, EventStream, ReaderEvent, SseMessage, DEFAULT_EVENT_NAME};
pub use traits::{
    reqwest_stream_to_stream_response, HttpTransport, StreamResponse, TransportRequest,
    TransportResponse,
};
