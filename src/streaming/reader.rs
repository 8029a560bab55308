//! SSE 事件流读取器
//!
//! 持有一次流式 HTTP 响应，按线上顺序产出 `(id, event, data)` 消息事件，
//! 最后产出且只产出一个终止事件。
//!
//! 不做任何重连：服务端关闭连接或出错后，读取器即结束，SSE 的 `retry:` 提示被忽略。
//! 丢弃读取器会同时丢弃底层响应体，从而关闭连接。

use crate::streaming::traits::TransportResponse;
use crate::streaming::StreamError;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tracing::{debug, warn};

/// 未指定 `event:` 字段时的事件名称
pub const DEFAULT_EVENT_NAME: &str = "message";

/// 一个 SSE 消息事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// 事件 ID（未设置时为 None）
    pub id: Option<String>,
    /// 事件名称，未设置时为 `message`
    pub event: String,
    /// 原始 data 负载
    pub data: String,
}

/// 读取器产出的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// 收到一条消息
    Message(SseMessage),
    /// 响应体正常结束
    Completed {
        /// HTTP 状态码
        status: u16,
    },
    /// 读取失败（非 2xx 响应、传输错误或帧格式错误）
    Failed(StreamError),
}

impl ReaderEvent {
    /// 是否为终止事件
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReaderEvent::Message(_))
    }
}

/// 读取器事件流
pub type EventStream = Pin<Box<dyn Stream<Item = ReaderEvent> + Send>>;

/// 开始读取一个流式响应
///
/// - 非 2xx 响应：读取完整响应体，产出 `Failed(InvalidResponse)`，不产出任何消息
/// - 读取过程中的传输错误：产出 `Failed(Transport)` 后结束
/// - SSE 帧或 UTF-8 错误：产出 `Failed(Decode)` 后结束
/// - 响应体结束：产出 `Completed { status }`
pub fn read_events(response: TransportResponse) -> EventStream {
    Box::pin(async_stream::stream! {
        let status = response.status;

        if !response.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => format!("<failed to read response body: {}>", e),
            };
            warn!(status, "[STREAM] 服务端返回非 2xx 状态");
            yield ReaderEvent::Failed(StreamError::invalid_response(status, body));
            return;
        }

        let mut events = Box::pin(response.body.eventsource());
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    debug!(
                        event = %event.event,
                        data_len = event.data.len(),
                        "[STREAM] 收到 SSE 事件"
                    );
                    yield ReaderEvent::Message(SseMessage {
                        id: if event.id.is_empty() { None } else { Some(event.id) },
                        event: event.event,
                        data: event.data,
                    });
                }
                Err(EventStreamError::Transport(e)) => {
                    yield ReaderEvent::Failed(e);
                    return;
                }
                Err(e) => {
                    yield ReaderEvent::Failed(StreamError::decode(format!("SSE 帧解析失败: {}", e)));
                    return;
                }
            }
        }

        yield ReaderEvent::Completed { status };
    })
}

// ============================================================================
// 测试模块
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response_from_chunks(status: u16, chunks: Vec<Result<Bytes, StreamError>>) -> TransportResponse {
        TransportResponse::new(status, Box::pin(futures::stream::iter(chunks)))
    }

    async fn collect(response: TransportResponse) -> Vec<ReaderEvent> {
        read_events(response).collect().await
    }

    #[tokio::test]
    async fn test_messages_then_completed() {
        let body = "data: {\"a\":1}\n\nid: 7\nevent: custom\ndata: two\n\ndata: [DONE]\n\n";
        let events = collect(TransportResponse::from_bytes(200, body)).await;

        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            ReaderEvent::Message(SseMessage {
                id: None,
                event: "message".to_string(),
                data: "{\"a\":1}".to_string(),
            })
        );
        assert_eq!(
            events[1],
            ReaderEvent::Message(SseMessage {
                id: Some("7".to_string()),
                event: "custom".to_string(),
                data: "two".to_string(),
            })
        );
        assert!(matches!(&events[2], ReaderEvent::Message(m) if m.data == "[DONE]"));
        assert_eq!(events[3], ReaderEvent::Completed { status: 200 });
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let chunks = vec![
            Ok(Bytes::from("data: hel")),
            Ok(Bytes::from("lo\n")),
            Ok(Bytes::from("\ndata: world\n\n")),
        ];
        let events = collect(response_from_chunks(200, chunks)).await;

        let data: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ReaderEvent::Message(m) => Some(m.data.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(data, vec!["hello", "world"]);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_non_success_status_carries_body() {
        let events = collect(TransportResponse::from_bytes(
            401,
            r#"{"error":{"message":"bad key"}}"#,
        ))
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            ReaderEvent::Failed(StreamError::InvalidResponse { status, body }) => {
                assert_eq!(*status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_error_is_terminal() {
        let chunks = vec![
            Ok(Bytes::from("data: one\n\n")),
            Err(StreamError::transport("connection reset")),
            Ok(Bytes::from("data: never\n\n")),
        ];
        let events = collect(response_from_chunks(200, chunks)).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ReaderEvent::Message(m) if m.data == "one"));
        assert_eq!(
            events[1],
            ReaderEvent::Failed(StreamError::transport("connection reset"))
        );
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_event() {
        let events = collect(TransportResponse::from_bytes(200, "data: x\n\n")).await;
        let terminals = events.iter().filter(|e| e.is_terminal()).count();
        assert_eq!(terminals, 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_empty_body_completes() {
        let events = collect(TransportResponse::from_bytes(200, "")).await;
        assert_eq!(events, vec![ReaderEvent::Completed { status: 200 }]);
    }
}
