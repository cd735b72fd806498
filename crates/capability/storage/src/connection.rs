//! 存储连接管理
//!
//! [`StorageConnection`] 持有唯一的存储连接，状态机：
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//! Connected -> Disconnected（写入时检测到连接丢失，或探活失败）
//! ```
//!
//! 重连由独立的调度任务完成（[`StorageConnection::connect_with_retry`]），
//! 同一时刻最多一个连接尝试在进行；失败后按 [`ReconnectBackoff`] 计算
//! `next_retry_at` 并协作式等待，不阻塞调用方。
//!
//! 写入按固定大小分块，每块一个事务；某块失败只影响该块。

use crate::backoff::ReconnectBackoff;
use crate::error::{StorageError, WriteError};
use crate::report::WriteReport;
use crate::traits::{KpiStore, StoreConnector};
use domain::{ConnectionState, KpiReading};
use kpi_telemetry::{record_chunk_committed, record_chunk_failed, record_store_connect_attempt};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 每个事务写入的读数条数。
pub const DEFAULT_CHUNK_SIZE: usize = 100;

pub struct StorageConnection {
    connector: Arc<dyn StoreConnector>,
    /// 仅在 Connected 时为 Some；重连期间不可读取。
    store: RwLock<Option<Arc<dyn KpiStore>>>,
    state: watch::Sender<ConnectionState>,
    next_retry_at: Mutex<Option<Instant>>,
    backoff: ReconnectBackoff,
    chunk_size: usize,
    liveness_interval: Option<Duration>,
}

impl StorageConnection {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            store: RwLock::new(None),
            state,
            next_retry_at: Mutex::new(None),
            backoff: ReconnectBackoff::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            liveness_interval: None,
        }
    }

    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// 连接期间按该间隔探活；`None` 关闭探活。
    pub fn with_liveness_interval(mut self, interval: Option<Duration>) -> Self {
        self.liveness_interval = interval.filter(|interval| !interval.is_zero());
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// 订阅连接状态变化。
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// 非阻塞探测连接是否可用。
    pub fn is_live(&self) -> bool {
        self.state().is_connected()
    }

    /// 下一次重连尝试时间（仅在等待重试时为 Some）。
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.next_retry_at.lock().ok().and_then(|slot| *slot)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 启动重连调度任务。
    ///
    /// 任务在状态为 Disconnected 时持续重连，连接成功后（可选）定期探活，
    /// 直到 `cancel` 被触发。
    pub fn connect_with_retry(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let connection = Arc::clone(self);
        tokio::spawn(async move { connection.run_reconnect_loop(cancel).await })
    }

    async fn run_reconnect_loop(self: Arc<Self>, cancel: CancellationToken) {
        let target = self.connector.target();
        let mut state_rx = self.state.subscribe();
        let mut backoff = self.backoff.clone();

        'schedule: loop {
            if self.is_live() {
                match self.liveness_interval {
                    Some(interval) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break 'schedule,
                            _ = tokio::time::sleep(interval) => self.probe_liveness().await,
                            changed = wait_disconnected(&mut state_rx) => {
                                if changed.is_err() {
                                    break 'schedule;
                                }
                            }
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = cancel.cancelled() => break 'schedule,
                            changed = wait_disconnected(&mut state_rx) => {
                                if changed.is_err() {
                                    break 'schedule;
                                }
                            }
                        }
                    }
                }
                continue;
            }

            backoff.reset();
            loop {
                self.set_state(ConnectionState::Connecting);
                record_store_connect_attempt();
                let attempt = tokio::select! {
                    _ = cancel.cancelled() => break 'schedule,
                    attempt = self.connector.connect() => attempt,
                };
                match attempt {
                    Ok(store) => {
                        self.install(store);
                        info!(target: "kpi.storage", target_db = %target, "store_connected");
                        break;
                    }
                    Err(err) => {
                        let delay = backoff.next_delay();
                        let retry_at = Instant::now() + delay;
                        self.set_next_retry_at(Some(retry_at));
                        self.set_state(ConnectionState::Disconnected);
                        warn!(
                            target: "kpi.storage",
                            target_db = %target,
                            attempt = backoff.failures(),
                            retry_in_secs = delay.as_secs(),
                            error = %err,
                            "store_connect_failed"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => break 'schedule,
                            _ = tokio::time::sleep_until(retry_at) => {}
                        }
                    }
                }
            }
        }

        self.set_next_retry_at(None);
        info!(target: "kpi.storage", target_db = %target, "store_reconnect_stopped");
    }

    /// 分块写入一条报文的全部读数。
    ///
    /// 没有可用连接时立即返回 [`WriteError::NotConnected`]，不做任何写入。
    /// 某块失败会记录在报告中并继续后续块；若失败属于连接丢失，
    /// 连接转为 Disconnected，剩余块不再发往已失效的连接，直接记为失败。
    pub async fn write_batch(
        &self,
        client_id: &str,
        timestamp_ms: i64,
        readings: &[KpiReading],
    ) -> Result<WriteReport, WriteError> {
        let store = self.live_store().ok_or(WriteError::NotConnected)?;
        let mut report = WriteReport::default();
        let mut lost: Option<StorageError> = None;

        for (index, chunk) in readings.chunks(self.chunk_size).enumerate() {
            if let Some(err) = &lost {
                record_chunk_failed(chunk.len());
                report.push_failed(index, chunk.len(), err.clone());
                continue;
            }
            match store.insert_chunk(client_id, timestamp_ms, chunk).await {
                Ok(()) => {
                    record_chunk_committed(chunk.len());
                    report.push_committed(index, chunk.len());
                }
                Err(err) => {
                    record_chunk_failed(chunk.len());
                    warn!(
                        target: "kpi.storage",
                        client_id = %client_id,
                        timestamp_ms = timestamp_ms,
                        chunk = index,
                        rows = chunk.len(),
                        connection_lost = err.is_connection_lost(),
                        error = %err,
                        "chunk_write_failed"
                    );
                    if err.is_connection_lost() {
                        self.mark_disconnected(&store);
                        lost = Some(err.clone());
                    }
                    report.push_failed(index, chunk.len(), err);
                }
            }
        }
        Ok(report)
    }

    fn live_store(&self) -> Option<Arc<dyn KpiStore>> {
        if !self.is_live() {
            return None;
        }
        self.store.read().ok().and_then(|slot| slot.clone())
    }

    async fn probe_liveness(&self) {
        let Some(store) = self.live_store() else {
            return;
        };
        if let Err(err) = store.ping().await {
            warn!(target: "kpi.storage", error = %err, "store_liveness_failed");
            self.mark_disconnected(&store);
        }
    }

    fn install(&self, store: Arc<dyn KpiStore>) {
        if let Ok(mut slot) = self.store.write() {
            *slot = Some(store);
        }
        self.set_next_retry_at(None);
        self.set_state(ConnectionState::Connected);
    }

    /// 仅当 `failed` 仍是当前连接时才断开，避免误伤已重建的新连接。
    fn mark_disconnected(&self, failed: &Arc<dyn KpiStore>) {
        let mut dropped = false;
        if let Ok(mut slot) = self.store.write() {
            if slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, failed))
            {
                *slot = None;
                dropped = true;
            }
        }
        if dropped {
            self.set_state(ConnectionState::Disconnected);
            warn!(target: "kpi.storage", "store_disconnected");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn set_next_retry_at(&self, value: Option<Instant>) {
        if let Ok(mut slot) = self.next_retry_at.lock() {
            *slot = value;
        }
    }
}

/// 等待连接离开 Connected；先检查当前值，不会错过已发生的断开。
async fn wait_disconnected(
    state_rx: &mut watch::Receiver<ConnectionState>,
) -> Result<(), watch::error::RecvError> {
    state_rx
        .wait_for(|state| !state.is_connected())
        .await
        .map(|_| ())
}
