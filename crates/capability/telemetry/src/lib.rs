//! 日志初始化、入站报文 ID 与采集计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub dropped_invalid: u64,
    pub dropped_unparsable: u64,
    pub dropped_store_offline: u64,
    pub rows_written: u64,
    pub rows_failed: u64,
    pub chunks_committed: u64,
    pub chunks_failed: u64,
    pub store_connect_attempts: u64,
    pub broker_disconnects: u64,
}

/// 进程内计数指标。
pub struct TelemetryMetrics {
    messages_received: AtomicU64,
    dropped_invalid: AtomicU64,
    dropped_unparsable: AtomicU64,
    dropped_store_offline: AtomicU64,
    rows_written: AtomicU64,
    rows_failed: AtomicU64,
    chunks_committed: AtomicU64,
    chunks_failed: AtomicU64,
    store_connect_attempts: AtomicU64,
    broker_disconnects: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            dropped_invalid: AtomicU64::new(0),
            dropped_unparsable: AtomicU64::new(0),
            dropped_store_offline: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            rows_failed: AtomicU64::new(0),
            chunks_committed: AtomicU64::new(0),
            chunks_failed: AtomicU64::new(0),
            store_connect_attempts: AtomicU64::new(0),
            broker_disconnects: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            dropped_invalid: self.dropped_invalid.load(Ordering::Relaxed),
            dropped_unparsable: self.dropped_unparsable.load(Ordering::Relaxed),
            dropped_store_offline: self.dropped_store_offline.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            rows_failed: self.rows_failed.load(Ordering::Relaxed),
            chunks_committed: self.chunks_committed.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
            store_connect_attempts: self.store_connect_attempts.load(Ordering::Relaxed),
            broker_disconnects: self.broker_disconnects.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info，可由 RUST_LOG 覆盖）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 为入站报文生成 message_id，贯穿该报文的全部日志。
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录入站报文次数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录结构校验失败丢弃次数。
pub fn record_dropped_invalid() {
    metrics().dropped_invalid.fetch_add(1, Ordering::Relaxed);
}

/// 记录解析失败丢弃次数。
pub fn record_dropped_unparsable() {
    metrics().dropped_unparsable.fetch_add(1, Ordering::Relaxed);
}

/// 记录存储离线丢弃次数。
pub fn record_dropped_store_offline() {
    metrics()
        .dropped_store_offline
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录一个已提交的块及其行数。
pub fn record_chunk_committed(rows: usize) {
    let metrics = metrics();
    metrics.chunks_committed.fetch_add(1, Ordering::Relaxed);
    metrics
        .rows_written
        .fetch_add(rows as u64, Ordering::Relaxed);
}

/// 记录一个失败的块及其行数。
pub fn record_chunk_failed(rows: usize) {
    let metrics = metrics();
    metrics.chunks_failed.fetch_add(1, Ordering::Relaxed);
    metrics
        .rows_failed
        .fetch_add(rows as u64, Ordering::Relaxed);
}

/// 记录存储连接尝试次数。
pub fn record_store_connect_attempt() {
    metrics()
        .store_connect_attempts
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录 Broker 断线次数。
pub fn record_broker_disconnect() {
    metrics().broker_disconnects.fetch_add(1, Ordering::Relaxed);
}
