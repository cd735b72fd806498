//! MQTT 数据接入：订阅全部 topic，并通过单一有序通道向下游投递事件。

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

mod session;
pub mod subscription;

pub use subscription::BrokerSubscription;

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid broker config: {0}")]
    InvalidConfig(String),
}

/// Broker 事件：连接状态变化与入站报文共用同一通道，保证顺序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Connected { reconnect: bool },
    Disconnected { reason: String },
    MessageArrived { topic: String, payload: Vec<u8> },
    Error { cause: String },
}

/// MQTT 订阅配置。
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic_filter: String,
    pub keep_alive: Duration,
    /// 投递通道容量；下游处理慢时会反压 MQTT 事件循环。
    pub channel_capacity: usize,
}

impl BrokerConfig {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            topic_filter: "#".to_string(),
            keep_alive: Duration::from_secs(30),
            channel_capacity: 64,
        }
    }
}

/// 原始报文处理器。
///
/// 每条入站报文调用一次，按到达顺序串行调用；实现不得无限期阻塞。
#[async_trait]
pub trait RawMessageHandler: Send + Sync {
    async fn on_raw_message(&self, topic: &str, payload: &[u8]);
}

/// 从事件通道串行取出报文交给 `handler`，直到通道关闭或 `cancel` 触发。
///
/// 正在处理的报文不会被取消打断。返回已投递的报文数。
pub async fn dispatch(
    mut events: mpsc::Receiver<BrokerEvent>,
    handler: &dyn RawMessageHandler,
    cancel: CancellationToken,
) -> u64 {
    let mut delivered = 0u64;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        match event {
            BrokerEvent::MessageArrived { topic, payload } => {
                debug!(target: "kpi.broker", topic = %topic, payload_size = payload.len(), "message_arrived");
                handler.on_raw_message(&topic, &payload).await;
                delivered += 1;
            }
            other => debug!(target: "kpi.broker", event = ?other, "broker_event"),
        }
    }
    delivered
}
