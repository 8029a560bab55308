//! 流式管理器
//!
//! 负责一次流式补全的完整生命周期：发出请求、读取 SSE 事件、解码增量、
//! 写入累积器，并在以下任一情况发生时终止：
//!
//! - 服务端正常结束响应 → `Complete`
//! - 传输错误、非 2xx 响应、解码失败、缓冲区溢出 → `Error(..)`
//! - 整体超时或空闲超时 → `Error(Timeout)`
//! - 调用方调用 `cancel()` → `Error(Cancelled)`
//! - 所有句柄都被丢弃 → 静默关闭连接，不再写入
//!
//! 每个流由一个独立的 tokio 任务驱动，调用方拿到句柄后立即返回。

use crate::streaming::accumulator::{Accumulator, StreamingCompletion};
use crate::streaming::decoder::{is_done_sentinel, DeltaDecoder};
use crate::streaming::error::StreamError;
use crate::streaming::metrics::StreamMetrics;
use crate::streaming::reader::{read_events, ReaderEvent, DEFAULT_EVENT_NAME};
use crate::streaming::traits::{HttpTransport, TransportRequest};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ============================================================================
// 配置
// ============================================================================

/// 流式配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// 累积文本的上限（字节）
    ///
    /// 超过后流以 `BufferOverflow` 终止，已累积的内容保留。
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// 整个流式响应的最长时间（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 两个事件之间的最长等待时间（毫秒）
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,
}

fn default_buffer_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_timeout_ms() -> u64 {
    300_000 // 5 分钟
}

fn default_chunk_timeout_ms() -> u64 {
    30_000 // 30 秒
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            timeout_ms: default_timeout_ms(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_chunk_timeout_ms(mut self, chunk_timeout_ms: u64) -> Self {
        self.chunk_timeout_ms = chunk_timeout_ms;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn chunk_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }
}

// ============================================================================
// 流式处理上下文
// ============================================================================

/// 单个流式补全的上下文
#[derive(Debug)]
pub(crate) struct StreamContext {
    /// 流 ID，同时作为句柄 ID
    pub stream_id: String,
    /// 补全类型（completion / chat）
    pub kind: &'static str,
    pub model: String,
    pub metrics: StreamMetrics,
    pub start_time: Instant,
}

impl StreamContext {
    pub(crate) fn new(kind: &'static str, model: &str) -> Self {
        Self {
            stream_id: uuid::Uuid::new_v4().to_string(),
            kind,
            model: model.to_string(),
            metrics: StreamMetrics::new(),
            start_time: Instant::now(),
        }
    }
}

/// 驱动循环的结果
#[derive(Debug)]
enum DriveOutcome {
    Completed,
    Failed(StreamError),
    /// 所有句柄都已丢弃
    Abandoned,
}

// ============================================================================
// 流式管理器
// ============================================================================

/// 流式管理器
#[derive(Debug, Clone, Default)]
pub struct StreamManager {
    config: StreamConfig,
}

impl StreamManager {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// 启动一个流式补全
    ///
    /// 立即返回处于 `Loading` 状态的句柄，请求在后台任务中发出。
    /// 当前线程不在 tokio 运行时中时，返回的句柄直接处于 `Error(Internal)` 状态。
    pub fn spawn<D: DeltaDecoder>(
        &self,
        transport: Arc<dyn HttpTransport>,
        request: TransportRequest,
        model: &str,
    ) -> StreamingCompletion<D::Value> {
        let context = StreamContext::new(D::KIND, model);
        let cancel = CancellationToken::new();
        let (accumulator, handle) = Accumulator::with_cancel_token(
            D::initial(),
            context.stream_id.clone(),
            cancel.clone(),
        );

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(
                    stream_id = %context.stream_id,
                    "[STREAM] 没有可用的 tokio 运行时，无法启动流式补全: {}", e
                );
                accumulator.fail(
                    StreamError::internal(format!("没有可用的 tokio 运行时: {}", e)),
                    None,
                );
                return handle;
            }
        };

        info!(
            stream_id = %context.stream_id,
            kind = D::KIND,
            model = %context.model,
            transport = transport.name(),
            "[STREAM] 开始流式补全"
        );

        let config = self.config.clone();
        runtime.spawn(run::<D>(config, transport, request, accumulator, cancel, context));
        handle
    }
}

/// 驱动一个流直到终止，并把结果写入累积器
async fn run<D: DeltaDecoder>(
    config: StreamConfig,
    transport: Arc<dyn HttpTransport>,
    request: TransportRequest,
    accumulator: Accumulator<D::Value>,
    cancel: CancellationToken,
    mut context: StreamContext,
) {
    let outcome = drive::<D>(
        &config,
        transport.as_ref(),
        request,
        &accumulator,
        &cancel,
        &mut context.metrics,
    )
    .await;

    context.metrics.finish();
    let elapsed_ms = context.start_time.elapsed().as_millis() as u64;

    match outcome {
        DriveOutcome::Completed => {
            info!(
                stream_id = %context.stream_id,
                kind = context.kind,
                elapsed_ms,
                text_len = accumulator.text_len(),
                "[STREAM] 流式补全完成"
            );
            context.metrics.log_metrics(&context.stream_id, context.kind);
            accumulator.complete(Some(context.metrics));
        }
        DriveOutcome::Failed(err) => {
            if err.is_cancelled() {
                info!(stream_id = %context.stream_id, elapsed_ms, "[STREAM] 流式补全已取消");
            } else {
                warn!(
                    stream_id = %context.stream_id,
                    kind = context.kind,
                    elapsed_ms,
                    error_type = err.error_type(),
                    "[STREAM] 流式补全失败: {}", err
                );
            }
            context.metrics.log_metrics(&context.stream_id, context.kind);
            accumulator.fail(err, Some(context.metrics));
        }
        DriveOutcome::Abandoned => {
            debug!(
                stream_id = %context.stream_id,
                elapsed_ms,
                "[STREAM] 所有句柄已丢弃，关闭连接"
            );
        }
    }
}

async fn drive<D: DeltaDecoder>(
    config: &StreamConfig,
    transport: &dyn HttpTransport,
    request: TransportRequest,
    accumulator: &Accumulator<D::Value>,
    cancel: &CancellationToken,
    metrics: &mut StreamMetrics,
) -> DriveOutcome {
    let deadline = tokio::time::sleep(config.timeout_duration());
    tokio::pin!(deadline);

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return DriveOutcome::Failed(StreamError::Cancelled),
        _ = accumulator.closed() => return DriveOutcome::Abandoned,
        _ = &mut deadline => return DriveOutcome::Failed(StreamError::Timeout),
        result = transport.send(request) => match result {
            Ok(response) => response,
            Err(e) => return DriveOutcome::Failed(e),
        },
    };

    debug!(status = response.status, "[STREAM] 收到响应头");
    let mut events = read_events(response);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return DriveOutcome::Failed(StreamError::Cancelled),
            _ = accumulator.closed() => return DriveOutcome::Abandoned,
            _ = &mut deadline => return DriveOutcome::Failed(StreamError::Timeout),
            next = tokio::time::timeout(config.chunk_timeout_duration(), events.next()) => next,
        };

        let event = match next {
            Ok(Some(event)) => event,
            Ok(None) => {
                return DriveOutcome::Failed(StreamError::internal("事件流在终止事件之前结束"))
            }
            Err(_) => {
                warn!(
                    chunk_timeout_ms = config.chunk_timeout_ms,
                    "[STREAM] 等待下一个事件超时"
                );
                return DriveOutcome::Failed(StreamError::Timeout);
            }
        };

        match event {
            ReaderEvent::Message(message) => {
                metrics.record_chunk(message.data.len());
                if message.event != DEFAULT_EVENT_NAME {
                    debug!(event = %message.event, "[STREAM] 跳过非默认事件");
                    continue;
                }
                if is_done_sentinel(&message.data) {
                    metrics.record_done();
                    continue;
                }

                let delta = match D::decode(&message.data) {
                    Ok(Some(delta)) => delta,
                    Ok(None) => continue,
                    Err(e) => {
                        metrics.record_parse_error();
                        return DriveOutcome::Failed(e);
                    }
                };

                let appended = D::appended_len(&delta);
                let current = accumulator.text_len();
                if current + appended > config.buffer_size {
                    error!(
                        current_len = current,
                        incoming = appended,
                        buffer_limit = config.buffer_size,
                        "[STREAM] 缓冲区溢出"
                    );
                    return DriveOutcome::Failed(StreamError::BufferOverflow);
                }

                if accumulator.apply::<D>(delta) {
                    metrics.record_delta(appended);
                }
            }
            ReaderEvent::Completed { status } => {
                if (200..300).contains(&status) {
                    return DriveOutcome::Completed;
                }
                return DriveOutcome::Failed(StreamError::invalid_response(status, String::new()));
            }
            ReaderEvent::Failed(e) => return DriveOutcome::Failed(e),
        }
    }
}

// ============================================================================
// 测试模块
// ============================================================================
