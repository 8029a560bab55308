//! 流式累积器
//!
//! 保存一次流式调用的累积结果与状态，供任意数量的观察者读取。
//!
//! - 写端 [`Accumulator`] 只有一个，由驱动该流的任务独占，不可 Clone
//! - 读端 [`StreamingCompletion`] 可以任意 Clone，只能读取、订阅与取消
//!
//! 每次状态变化都以一次 `watch` 发布完成，观察者读到的始终是某个完整的修订版本，
//! 不会出现文本已更新而状态尚未更新的中间态。

use crate::models::openai::ChatMessage;
use crate::streaming::decoder::{AccumulatedValue, DeltaDecoder};
use crate::streaming::metrics::StreamMetrics;
use crate::streaming::StreamError;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// 流式补全状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// 正在接收
    Loading,
    /// 正常完成
    Complete,
    /// 出错结束
    Error,
}

impl CompletionStatus {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompletionStatus::Loading)
    }
}

/// 累积器的一个已发布修订版本
#[derive(Debug, Clone)]
pub struct CompletionState<V> {
    pub status: CompletionStatus,
    pub value: V,
    /// 仅在 `Error` 状态下存在
    pub error: Option<StreamError>,
    /// 每次发布加一
    pub revision: u64,
    /// 终止时附带的流式指标
    pub metrics: Option<StreamMetrics>,
}

impl<V: AccumulatedValue> CompletionState<V> {
    fn loading(value: V) -> Self {
        Self {
            status: CompletionStatus::Loading,
            value,
            error: None,
            revision: 0,
            metrics: None,
        }
    }

    /// 扁平化的累积文本
    pub fn text(&self) -> &str {
        self.value.text()
    }
}

// ============================================================================
// 写端
// ============================================================================

/// 累积器写端
pub struct Accumulator<V> {
    sender: watch::Sender<CompletionState<V>>,
}

impl<V: AccumulatedValue> Accumulator<V> {
    /// 以 `Loading` 状态和给定初始值创建累积器，同时返回读端句柄
    pub fn new(initial: V, id: impl Into<String>) -> (Self, StreamingCompletion<V>) {
        Self::with_cancel_token(initial, id, CancellationToken::new())
    }

    /// 使用给定取消令牌创建累积器
    pub fn with_cancel_token(
        initial: V,
        id: impl Into<String>,
        cancel: CancellationToken,
    ) -> (Self, StreamingCompletion<V>) {
        let (sender, receiver) = watch::channel(CompletionState::loading(initial));
        let handle = StreamingCompletion {
            id: id.into(),
            receiver,
            cancel,
        };
        (Self { sender }, handle)
    }

    /// 为某种补全类型创建累积器
    pub fn for_decoder<D>(id: impl Into<String>) -> (Self, StreamingCompletion<V>)
    where
        D: DeltaDecoder<Value = V>,
    {
        Self::new(D::initial(), id)
    }

    /// 当前状态
    pub fn status(&self) -> CompletionStatus {
        self.sender.borrow().status
    }

    /// 是否已进入终止状态
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// 当前累积文本的字节数
    pub fn text_len(&self) -> usize {
        self.sender.borrow().text().len()
    }

    /// 是否所有读端都已被丢弃
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// 等待所有读端被丢弃
    pub async fn closed(&self) {
        self.sender.closed().await
    }

    /// 应用一个增量
    ///
    /// 增量没有改变累积值时不发布任何修订；终止后收到的增量被忽略。
    /// 返回是否发布了新修订。
    pub fn apply<D>(&self, delta: D::Delta) -> bool
    where
        D: DeltaDecoder<Value = V>,
    {
        self.sender.send_if_modified(|state| {
            if state.status.is_terminal() {
                warn!(kind = D::KIND, "[STREAM] 终止后收到增量，已忽略");
                return false;
            }
            let changed = D::apply(&mut state.value, delta);
            if changed {
                state.revision += 1;
            }
            changed
        })
    }

    /// 标记为正常完成
    ///
    /// 只有在 `Loading` 状态下才会生效，返回是否发生了状态转换。
    pub fn complete(&self, metrics: Option<StreamMetrics>) -> bool {
        self.finish(CompletionStatus::Complete, None, metrics)
    }

    /// 标记为出错结束，已累积的内容保留
    pub fn fail(&self, error: StreamError, metrics: Option<StreamMetrics>) -> bool {
        self.finish(CompletionStatus::Error, Some(error), metrics)
    }

    fn finish(
        &self,
        status: CompletionStatus,
        error: Option<StreamError>,
        metrics: Option<StreamMetrics>,
    ) -> bool {
        self.sender.send_if_modified(|state| {
            if state.status.is_terminal() {
                warn!(
                    current = ?state.status,
                    requested = ?status,
                    "[STREAM] 累积器已终止，忽略重复的终止请求"
                );
                return false;
            }
            state.status = status;
            state.error = error;
            state.metrics = metrics;
            state.revision += 1;
            true
        })
    }
}

// ============================================================================
// 读端
// ============================================================================

/// 流式补全句柄
///
/// 可观察的实时更新值。所有句柄与订阅者都被丢弃后，驱动任务会关闭连接并停止写入。
#[derive(Debug, Clone)]
pub struct StreamingCompletion<V> {
    id: String,
    receiver: watch::Receiver<CompletionState<V>>,
    cancel: CancellationToken,
}

/// 文本补全句柄
pub type TextStreamingCompletion = StreamingCompletion<String>;
/// 聊天补全句柄
pub type ChatStreamingCompletion = StreamingCompletion<ChatMessage>;

impl<V: AccumulatedValue> StreamingCompletion<V> {
    /// 流 ID，与日志中的 stream_id 一致
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 当前修订版本的完整快照
    pub fn snapshot(&self) -> CompletionState<V> {
        self.receiver.borrow().clone()
    }

    pub fn status(&self) -> CompletionStatus {
        self.receiver.borrow().status
    }

    pub fn value(&self) -> V {
        self.receiver.borrow().value.clone()
    }

    /// 扁平化的累积文本
    pub fn text(&self) -> String {
        self.receiver.borrow().text().to_string()
    }

    pub fn error(&self) -> Option<StreamError> {
        self.receiver.borrow().error.clone()
    }

    pub fn revision(&self) -> u64 {
        self.receiver.borrow().revision
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// 订阅状态变化
    ///
    /// 返回的接收端同样会让流保持存活。
    pub fn subscribe(&self) -> watch::Receiver<CompletionState<V>> {
        let mut receiver = self.receiver.clone();
        receiver.mark_unchanged();
        receiver
    }

    /// 等待下一次发布，返回新的快照
    ///
    /// 写端已经结束且没有新的发布时返回 None。
    pub async fn changed(&mut self) -> Option<CompletionState<V>> {
        match self.receiver.changed().await {
            Ok(()) => Some(self.receiver.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// 等待进入终止状态，返回最终快照
    pub async fn wait(&self) -> CompletionState<V> {
        let mut receiver = self.receiver.clone();
        let result = receiver
            .wait_for(|state| state.status.is_terminal())
            .await
            .map(|state| state.clone());
        match result {
            Ok(state) => state,
            // 写端在终止前被丢弃（驱动任务异常退出），以最后的快照为准
            Err(_) => receiver.borrow().clone(),
        }
    }

    /// 取消流式请求
    ///
    /// 驱动任务会关闭连接，并把状态置为 `Error(Cancelled)`。
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ============================================================================
// 测试模块
// ============================================================================
