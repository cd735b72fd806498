//! KPI Bridge：订阅 MQTT 全部 topic，将 KPI 报文分块事务写入 PostgreSQL。

mod ingest;

use ingest::spawn_ingest;
use kpi_config::BridgeConfig;
use kpi_storage::{PgConnector, StorageConnection};
use kpi_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置，缺少必填项时直接退出
    let config = BridgeConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();
    info!(target: "kpi.bridge", config = ?config, "bridge_starting");

    let cancel = CancellationToken::new();

    // 存储连接：后台重连，首次连接失败不阻塞启动
    let connector = PgConnector::new(
        &config.database_url(),
        &config.postgres_user,
        &config.postgres_password,
    )?;
    let storage = Arc::new(
        StorageConnection::new(Arc::new(connector))
            .with_liveness_interval(config.store_liveness_interval()),
    );
    let scheduler = storage.connect_with_retry(cancel.clone());

    // MQTT 订阅与报文分发
    let tasks = spawn_ingest(&config, storage, cancel.clone())?;

    tokio::signal::ctrl_c().await?;
    info!(target: "kpi.bridge", "shutdown_requested");
    cancel.cancel();

    // 正在处理的报文会处理完再退出
    match tasks.dispatcher.await {
        Ok(delivered) => info!(target: "kpi.bridge", delivered = delivered, "dispatcher_joined"),
        Err(err) => warn!(target: "kpi.bridge", error = %err, "dispatcher_join_failed"),
    }
    if let Err(err) = tasks.broker.await {
        warn!(target: "kpi.bridge", error = %err, "broker_join_failed");
    }
    if let Err(err) = scheduler.await {
        warn!(target: "kpi.bridge", error = %err, "store_scheduler_join_failed");
    }

    let snapshot = metrics().snapshot();
    info!(target: "kpi.bridge", metrics = ?snapshot, "bridge_stopped");
    Ok(())
}
