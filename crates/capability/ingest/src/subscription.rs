//! MQTT 订阅：连接 Broker，订阅 topic filter（默认 `#`），断线后由 rumqttc 在下一次 poll 时重连。

use crate::session::{SessionAction, SessionTracker};
use crate::{BrokerConfig, BrokerEvent, IngestError};
use domain::ConnectionState;
use kpi_telemetry::record_broker_disconnect;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// MQTT 协议允许的最大报文长度，入站报文不做额外限制。
const MAX_PACKET_SIZE: usize = 268_435_455;
/// 事件循环出错后到下一次 poll（即重连）的间隔。
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

pub struct BrokerSubscription {
    config: BrokerConfig,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl BrokerSubscription {
    pub fn new(config: BrokerConfig) -> Result<Self, IngestError> {
        if config.client_id.trim().is_empty() || config.client_id.starts_with(char::is_whitespace) {
            return Err(IngestError::InvalidConfig(format!(
                "invalid client id: {:?}",
                config.client_id
            )));
        }
        if !config.keep_alive.is_zero() && config.keep_alive < Duration::from_secs(1) {
            return Err(IngestError::InvalidConfig(
                "keep alive must be zero or at least one second".to_string(),
            ));
        }
        if !rumqttc::valid_filter(&config.topic_filter) {
            return Err(IngestError::InvalidConfig(format!(
                "invalid topic filter: {}",
                config.topic_filter
            )));
        }
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            config,
            state: Arc::new(state),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// 连接并订阅全部 topic。
    ///
    /// 返回事件接收端与事件循环任务；连接失败只记录日志，任务持续重连直到 `cancel`。
    pub fn connect_and_subscribe_all(
        &self,
        cancel: CancellationToken,
    ) -> (mpsc::Receiver<BrokerEvent>, JoinHandle<()>) {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(self.config.keep_alive);
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        let (client, eventloop) = AsyncClient::new(options, 10);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        info!(
            target: "kpi.broker",
            host = %self.config.host,
            port = self.config.port,
            client_id = %self.config.client_id,
            topic_filter = %self.config.topic_filter,
            "broker_connecting"
        );
        let handle = tokio::spawn(run_event_loop(
            client,
            eventloop,
            self.config.clone(),
            self.state.clone(),
            tx,
            cancel,
        ));
        (rx, handle)
    }
}

async fn run_event_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    config: BrokerConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    tx: mpsc::Sender<BrokerEvent>,
    cancel: CancellationToken,
) {
    let mut tracker = SessionTracker::default();
    loop {
        if tracker.begin_poll() {
            state.send_replace(tracker.state());
        }
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = eventloop.poll() => polled,
        };
        let failed = polled.is_err();
        let action = match polled {
            Ok(Event::Incoming(packet)) => tracker.on_incoming(packet),
            Ok(Event::Outgoing(_)) => None,
            Err(err) => tracker.on_error(err.to_string()),
        };
        state.send_replace(tracker.state());

        if let Some(action) = action {
            let event = match action {
                SessionAction::Subscribe { reconnect } => {
                    info!(
                        target: "kpi.broker",
                        host = %config.host,
                        port = config.port,
                        reconnect = reconnect,
                        "broker_connected"
                    );
                    // 事件循环内不能 await 请求通道，否则通道满时会自锁。
                    if let Err(err) = client.try_subscribe(config.topic_filter.clone(), QoS::AtMostOnce) {
                        warn!(target: "kpi.broker", error = %err, "broker_subscribe_failed");
                    }
                    BrokerEvent::Connected { reconnect }
                }
                SessionAction::Emit(event) => {
                    log_event(&config, &event);
                    event
                }
            };
            let delivered = tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(event) => sent.is_ok(),
            };
            if !delivered {
                warn!(target: "kpi.broker", "broker_event_receiver_closed");
                break;
            }
        }

        if failed {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_PAUSE) => {}
            }
        }
    }

    if let Err(err) = client.try_disconnect() {
        debug!(target: "kpi.broker", error = %err, "broker_disconnect_request_failed");
    }
    state.send_replace(ConnectionState::Disconnected);
    info!(target: "kpi.broker", client_id = %config.client_id, "broker_subscription_stopped");
}

fn log_event(config: &BrokerConfig, event: &BrokerEvent) {
    match event {
        BrokerEvent::Disconnected { reason } => {
            record_broker_disconnect();
            warn!(
                target: "kpi.broker",
                host = %config.host,
                port = config.port,
                reason = %reason,
                "broker_disconnected"
            );
        }
        BrokerEvent::Error { cause } => {
            warn!(
                target: "kpi.broker",
                host = %config.host,
                port = config.port,
                error = %cause,
                "broker_error"
            );
        }
        BrokerEvent::Connected { .. } | BrokerEvent::MessageArrived { .. } => {}
    }
}
