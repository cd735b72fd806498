//! 存储接口 Trait 定义
//!
//! - KpiStore：一条已建立的存储连接，按块事务写入 KPI
//! - StoreConnector：建立新连接（重连调度器唯一的调用方）

use crate::error::StorageError;
use async_trait::async_trait;
use domain::KpiReading;
use std::sync::Arc;

/// 已建立的 KPI 存储连接。
#[async_trait]
pub trait KpiStore: Send + Sync {
    /// 在一个事务内写入一块读数：全部提交或全部回滚。
    async fn insert_chunk(
        &self,
        equipment: &str,
        timestamp_ms: i64,
        readings: &[KpiReading],
    ) -> Result<(), StorageError>;

    /// 探活。
    async fn ping(&self) -> Result<(), StorageError>;
}

/// 存储连接工厂。
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn KpiStore>, StorageError>;

    /// 用于日志的目标描述（不含口令）。
    fn target(&self) -> String;
}
