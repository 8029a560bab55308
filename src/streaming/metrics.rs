//! 流式补全指标
//!
//! 记录一次流式补全从发起请求到终止的耗时、事件数与增量统计，
//! 终止时随最终状态一起发布给观察者，并写入一条汇总日志。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 流式补全指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// 首个事件时间（毫秒）
    ///
    /// 从请求发出到收到第一个 SSE 事件的时间。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,

    /// 收到的 SSE 事件数量（含结束标记）
    pub chunk_count: u32,

    /// 收到的 data 负载总字节数
    pub total_bytes: usize,

    /// 最小事件负载（字节）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_chunk_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_chunk_size: Option<usize>,

    /// 实际改变了累积值的增量数量
    pub delta_count: u32,

    /// 累积文本的字节数
    pub accumulated_bytes: usize,

    pub start_time: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_chunk_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_time: Option<DateTime<Utc>>,

    /// 解码失败次数（失败即终止，所以最多为 1）
    pub parse_error_count: u32,

    /// 是否因为结束标记而看到了流的正常结尾
    pub saw_done: bool,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self {
            ttfb_ms: None,
            chunk_count: 0,
            total_bytes: 0,
            min_chunk_size: None,
            max_chunk_size: None,
            delta_count: 0,
            accumulated_bytes: 0,
            start_time: Utc::now(),
            end_time: None,
            first_chunk_time: None,
            last_chunk_time: None,
            parse_error_count: 0,
            saw_done: false,
        }
    }
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录收到一个事件，第一次调用时同时计算 TTFB
    pub fn record_chunk(&mut self, bytes: usize) {
        let now = Utc::now();
        self.chunk_count += 1;
        self.total_bytes += bytes;
        self.last_chunk_time = Some(now);
        self.min_chunk_size = Some(self.min_chunk_size.map_or(bytes, |min| min.min(bytes)));
        self.max_chunk_size = Some(self.max_chunk_size.map_or(bytes, |max| max.max(bytes)));

        if self.first_chunk_time.is_none() {
            self.first_chunk_time = Some(now);
            self.ttfb_ms = Some((now - self.start_time).num_milliseconds().max(0) as u64);
        }
    }

    /// 记录一个被应用的增量
    pub fn record_delta(&mut self, appended: usize) {
        self.delta_count += 1;
        self.accumulated_bytes += appended;
    }

    pub fn record_parse_error(&mut self) {
        self.parse_error_count += 1;
    }

    pub fn record_done(&mut self) {
        self.saw_done = true;
    }

    /// 记录结束时间
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// 总耗时（毫秒），未结束时计算到当前时刻
    pub fn duration_ms(&self) -> u64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds().max(0) as u64
    }

    /// 平均事件间隔（毫秒），事件少于 2 个时为 None
    pub fn avg_chunk_interval_ms(&self) -> Option<f64> {
        if self.chunk_count < 2 {
            return None;
        }

        let first = self.first_chunk_time?;
        let last = self.last_chunk_time?;
        let interval_ms = (last - first).num_milliseconds().max(0) as f64;
        Some(interval_ms / (self.chunk_count - 1) as f64)
    }

    pub fn throughput_bytes_per_sec(&self) -> Option<f64> {
        let duration_ms = self.duration_ms();
        if duration_ms == 0 {
            return None;
        }
        Some(self.total_bytes as f64 / (duration_ms as f64 / 1000.0))
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn summary(&self) -> String {
        let ttfb = self
            .ttfb_ms
            .map(|t| format!("{}ms", t))
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            "chunks: {}, deltas: {}, bytes: {}, text: {}B, duration: {}ms, ttfb: {}, errors: {}",
            self.chunk_count,
            self.delta_count,
            self.total_bytes,
            self.accumulated_bytes,
            self.duration_ms(),
            ttfb,
            self.parse_error_count
        )
    }

    /// 写入一条汇总日志
    pub fn log_metrics(&self, stream_id: &str, kind: &str) {
        let throughput = self.throughput_bytes_per_sec().unwrap_or(0.0);
        let avg_interval = self.avg_chunk_interval_ms().unwrap_or(0.0);

        info!(
            stream_id = stream_id,
            kind = kind,
            chunk_count = self.chunk_count,
            delta_count = self.delta_count,
            total_bytes = self.total_bytes,
            min_chunk_size = ?self.min_chunk_size,
            max_chunk_size = ?self.max_chunk_size,
            accumulated_bytes = self.accumulated_bytes,
            duration_ms = self.duration_ms(),
            ttfb_ms = ?self.ttfb_ms,
            throughput_kbps = format!("{:.2}", throughput / 1024.0),
            avg_chunk_interval_ms = format!("{:.2}", avg_interval),
            parse_error_count = self.parse_error_count,
            saw_done = self.saw_done,
            "[STREAM] 流式补全指标"
        );
    }
}

// ============================================================================
// 测试模块
// ============================================================================
