//! KPI 写入内存实现
//!
//! 仅用于本地测试：可按调用序号注入数据拒绝或连接丢失。

use crate::error::StorageError;
use crate::traits::{KpiStore, StoreConnector};
use domain::KpiReading;
use bigdecimal::BigDecimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// 已落库的一行。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KpiRow {
    pub equipment: String,
    pub timestamp_ms: i64,
    pub name: String,
    pub unit_id: i32,
    pub value: BigDecimal,
}

/// KPI 内存存储
#[derive(Default)]
pub struct InMemoryKpiStore {
    rows: RwLock<Vec<KpiRow>>,
    calls: AtomicUsize,
    commits: AtomicUsize,
    rejected_calls: RwLock<HashSet<usize>>,
    lost_calls: RwLock<HashSet<usize>>,
    ping_fails: AtomicBool,
}

impl InMemoryKpiStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 第 `call` 次（从 0 计）`insert_chunk` 以数据拒绝失败。
    pub fn reject_call(&self, call: usize) {
        if let Ok(mut calls) = self.rejected_calls.write() {
            calls.insert(call);
        }
    }

    /// 第 `call` 次（从 0 计）`insert_chunk` 以连接丢失失败。
    pub fn lose_connection_on_call(&self, call: usize) {
        if let Ok(mut calls) = self.lost_calls.write() {
            calls.insert(call);
        }
    }

    pub fn set_ping_failure(&self, fails: bool) {
        self.ping_fails.store(fails, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<KpiRow> {
        self.rows.read().map(|rows| rows.clone()).unwrap_or_default()
    }

    /// `insert_chunk` 调用次数。
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 成功提交的事务次数。
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn is_marked(set: &RwLock<HashSet<usize>>, call: usize) -> bool {
        set.read().map(|calls| calls.contains(&call)).unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl KpiStore for InMemoryKpiStore {
    async fn insert_chunk(
        &self,
        equipment: &str,
        timestamp_ms: i64,
        readings: &[KpiReading],
    ) -> Result<(), StorageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if Self::is_marked(&self.lost_calls, call) {
            return Err(StorageError::connection("connection reset by peer"));
        }
        if Self::is_marked(&self.rejected_calls, call) {
            return Err(StorageError::new(
                "duplicate key value violates unique constraint \"kpis_pkey\"",
            ));
        }
        let chunk = readings.iter().map(|reading| KpiRow {
            equipment: equipment.to_string(),
            timestamp_ms,
            name: reading.name.clone(),
            unit_id: reading.unit_id,
            value: reading.value.clone(),
        });
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        rows.extend(chunk);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        if self.ping_fails.load(Ordering::SeqCst) {
            return Err(StorageError::connection("server closed the connection"));
        }
        Ok(())
    }
}

/// 内存连接工厂：前 N 次连接失败，之后返回同一个内存存储。
pub struct InMemoryConnector {
    store: Arc<InMemoryKpiStore>,
    failures_remaining: AtomicUsize,
    attempts: Mutex<Vec<tokio::time::Instant>>,
}

impl InMemoryConnector {
    pub fn new(store: Arc<InMemoryKpiStore>) -> Self {
        Self::failing(store, 0)
    }

    pub fn failing(store: Arc<InMemoryKpiStore>, failures: usize) -> Self {
        Self {
            store,
            failures_remaining: AtomicUsize::new(failures),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// 之后再失败 `failures` 次。
    pub fn fail_next(&self, failures: usize) {
        self.failures_remaining.store(failures, Ordering::SeqCst);
    }

    /// 每次连接尝试的时间点。
    pub fn attempts(&self) -> Vec<tokio::time::Instant> {
        self.attempts
            .lock()
            .map(|attempts| attempts.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn KpiStore>, StorageError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(tokio::time::Instant::now());
        }
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::connection("connection refused"));
        }
        Ok(self.store.clone())
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}
