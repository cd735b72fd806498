//! 采集流水线：校验 → 解析 → 存储在线检查 → 分块写入。
//!
//! 每条报文独立处理，任何失败都只记录日志并丢弃该报文，不向上游抛错；
//! 每条丢弃路径恰好一条日志。

use async_trait::async_trait;
use kpi_ingest::RawMessageHandler;
use kpi_message::{ParseError, ValidationError, parse, validate};
use kpi_storage::{StorageConnection, WriteError, WriteReport};
use kpi_telemetry::{
    new_message_id, record_dropped_invalid, record_dropped_store_offline,
    record_dropped_unparsable, record_message_received,
};
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};

/// 丢弃原因。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// 结构校验失败，附全部违规项。
    Invalid(Vec<String>),
    /// 非 JSON 或解析失败。
    Unparsable(ParseError),
    /// 存储不在线，报文不缓存。
    StoreOffline,
}

/// 单条报文的处理结果。
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Dropped(DropReason),
    Written(WriteReport),
}

impl IngestOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, IngestOutcome::Dropped(_))
    }

    pub fn report(&self) -> Option<&WriteReport> {
        match self {
            IngestOutcome::Written(report) => Some(report),
            IngestOutcome::Dropped(_) => None,
        }
    }
}

pub struct IngestPipeline {
    storage: Arc<StorageConnection>,
}

impl IngestPipeline {
    pub fn new(storage: Arc<StorageConnection>) -> Self {
        Self { storage }
    }

    /// 处理一条原始报文。
    pub async fn on_raw_message(&self, topic: &str, payload: &[u8]) -> IngestOutcome {
        record_message_received();
        let span = info_span!(
            target: "kpi.ingest",
            "ingest_message",
            message_id = %new_message_id(),
            topic = %topic,
            payload_size = payload.len()
        );
        self.process(payload).instrument(span).await
    }

    async fn process(&self, payload: &[u8]) -> IngestOutcome {
        match validate(payload) {
            Ok(()) => {}
            Err(ValidationError::NotJson(reason)) => {
                return drop_unparsable(ParseError::Json(reason));
            }
            Err(ValidationError::Violations(violations)) => {
                record_dropped_invalid();
                warn!(
                    target: "kpi.ingest",
                    violations = %violations.join("; "),
                    "message_dropped_invalid"
                );
                return IngestOutcome::Dropped(DropReason::Invalid(violations));
            }
        }

        let message = match parse(payload) {
            Ok(message) => message,
            Err(err) => return drop_unparsable(err),
        };

        if !self.storage.is_live() {
            return drop_store_offline(&message.source_id, message.readings.len());
        }

        match self
            .storage
            .write_batch(&message.source_id, message.timestamp_ms, &message.readings)
            .await
        {
            Ok(report) => {
                if report.is_complete() {
                    info!(
                        target: "kpi.ingest",
                        source_id = %message.source_id,
                        timestamp_ms = message.timestamp_ms,
                        written = report.written(),
                        chunks = report.committed_chunks(),
                        "message_written"
                    );
                } else {
                    warn!(
                        target: "kpi.ingest",
                        source_id = %message.source_id,
                        timestamp_ms = message.timestamp_ms,
                        written = report.written(),
                        failed = report.failed(),
                        failed_chunks = report.failed_chunks(),
                        "message_partially_written"
                    );
                }
                IngestOutcome::Written(report)
            }
            // 在线检查与写入之间连接丢失
            Err(WriteError::NotConnected) => {
                drop_store_offline(&message.source_id, message.readings.len())
            }
        }
    }
}

#[async_trait]
impl RawMessageHandler for IngestPipeline {
    async fn on_raw_message(&self, topic: &str, payload: &[u8]) {
        IngestPipeline::on_raw_message(self, topic, payload).await;
    }
}

fn drop_unparsable(err: ParseError) -> IngestOutcome {
    record_dropped_unparsable();
    warn!(target: "kpi.ingest", error = %err, "message_dropped_unparsable");
    IngestOutcome::Dropped(DropReason::Unparsable(err))
}

fn drop_store_offline(source_id: &str, readings: usize) -> IngestOutcome {
    record_dropped_store_offline();
    warn!(
        target: "kpi.ingest",
        source_id = %source_id,
        readings = readings,
        "message_dropped_store_offline"
    );
    IngestOutcome::Dropped(DropReason::StoreOffline)
}
