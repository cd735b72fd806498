//! 采集链路装配：MQTT 订阅 → 流水线 → 存储连接。

use kpi_config::BridgeConfig;
use kpi_ingest::{BrokerConfig, BrokerSubscription, IngestError, dispatch};
use kpi_pipeline::IngestPipeline;
use kpi_storage::StorageConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 运行中的采集任务。
pub struct IngestTasks {
    pub broker: JoinHandle<()>,
    pub dispatcher: JoinHandle<u64>,
}

/// 启动 MQTT 订阅与报文分发任务。
pub fn spawn_ingest(
    config: &BridgeConfig,
    storage: Arc<StorageConnection>,
    cancel: CancellationToken,
) -> Result<IngestTasks, IngestError> {
    let broker_config = BrokerConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        client_id: config.mqtt_client_id.clone(),
        topic_filter: config.mqtt_topic_filter.clone(),
        keep_alive: Duration::from_secs(config.mqtt_keep_alive_seconds),
        channel_capacity: config.mqtt_channel_capacity,
    };
    let subscription = BrokerSubscription::new(broker_config)?;
    let (events, broker) = subscription.connect_and_subscribe_all(cancel.clone());

    let pipeline = IngestPipeline::new(storage);
    let dispatcher = tokio::spawn(async move {
        let delivered = dispatch(events, &pipeline, cancel).await;
        info!(target: "kpi.bridge", delivered = delivered, "dispatcher_stopped");
        delivered
    });

    Ok(IngestTasks { broker, dispatcher })
}
