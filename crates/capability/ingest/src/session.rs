//! MQTT 会话状态跟踪：把 rumqttc 的事件翻译为连接状态与 [`BrokerEvent`]。

use crate::BrokerEvent;
use domain::ConnectionState;
use rumqttc::{ConnectReturnCode, Packet, SubscribeReasonCode};

/// 事件循环需要执行的动作。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionAction {
    /// 连接建立：需要（重新）订阅，再向下游发出事件。
    Subscribe { reconnect: bool },
    Emit(BrokerEvent),
}

#[derive(Debug, Default)]
pub(crate) struct SessionTracker {
    state: ConnectionState,
    connected_once: bool,
}

impl SessionTracker {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// 即将 poll：断开状态下的 poll 即为一次连接尝试。
    pub(crate) fn begin_poll(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Connecting;
            return true;
        }
        false
    }

    pub(crate) fn on_incoming(&mut self, packet: Packet) -> Option<SessionAction> {
        match packet {
            Packet::ConnAck(ack) if ack.code == ConnectReturnCode::Success => {
                let reconnect = self.connected_once;
                self.connected_once = true;
                self.state = ConnectionState::Connected;
                Some(SessionAction::Subscribe { reconnect })
            }
            Packet::ConnAck(ack) => Some(SessionAction::Emit(BrokerEvent::Error {
                cause: format!("connection refused: {:?}", ack.code),
            })),
            Packet::SubAck(ack)
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure)) =>
            {
                Some(SessionAction::Emit(BrokerEvent::Error {
                    cause: "subscription rejected by broker".to_string(),
                }))
            }
            Packet::Publish(publish) => Some(SessionAction::Emit(BrokerEvent::MessageArrived {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            })),
            Packet::Disconnect => self.disconnect("broker sent disconnect".to_string()),
            _ => None,
        }
    }

    /// poll 出错：已连接时为断线，否则为一次失败的连接尝试。
    pub(crate) fn on_error(&mut self, reason: String) -> Option<SessionAction> {
        if self.state == ConnectionState::Connected {
            return self.disconnect(reason);
        }
        self.state = ConnectionState::Disconnected;
        Some(SessionAction::Emit(BrokerEvent::Error { cause: reason }))
    }

    fn disconnect(&mut self, reason: String) -> Option<SessionAction> {
        let was_connected = self.state == ConnectionState::Connected;
        self.state = ConnectionState::Disconnected;
        was_connected.then_some(SessionAction::Emit(BrokerEvent::Disconnected { reason }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, Publish, QoS, SubAck};

    fn connack(code: ConnectReturnCode) -> Packet {
        Packet::ConnAck(ConnAck {
            session_present: false,
            code,
        })
    }

    #[test]
    fn first_connack_subscribes_without_reconnect_flag() {
        let mut tracker = SessionTracker::default();
        assert!(tracker.begin_poll());
        assert_eq!(tracker.state(), ConnectionState::Connecting);
        assert_eq!(
            tracker.on_incoming(connack(ConnectReturnCode::Success)),
            Some(SessionAction::Subscribe { reconnect: false })
        );
        assert_eq!(tracker.state(), ConnectionState::Connected);
        assert!(!tracker.begin_poll());
    }

    #[test]
    fn error_after_connect_is_a_disconnect_then_reconnect() {
        let mut tracker = SessionTracker::default();
        tracker.begin_poll();
        tracker.on_incoming(connack(ConnectReturnCode::Success));

        assert_eq!(
            tracker.on_error("connection reset".to_string()),
            Some(SessionAction::Emit(BrokerEvent::Disconnected {
                reason: "connection reset".to_string()
            }))
        );
        assert_eq!(tracker.state(), ConnectionState::Disconnected);

        assert!(tracker.begin_poll());
        assert_eq!(
            tracker.on_incoming(connack(ConnectReturnCode::Success)),
            Some(SessionAction::Subscribe { reconnect: true })
        );
    }

    #[test]
    fn error_before_connect_is_reported_as_error() {
        let mut tracker = SessionTracker::default();
        tracker.begin_poll();
        assert_eq!(
            tracker.on_error("connection refused".to_string()),
            Some(SessionAction::Emit(BrokerEvent::Error {
                cause: "connection refused".to_string()
            }))
        );
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn refused_connack_is_an_error() {
        let mut tracker = SessionTracker::default();
        tracker.begin_poll();
        let action = tracker.on_incoming(connack(ConnectReturnCode::NotAuthorized));
        assert!(matches!(
            action,
            Some(SessionAction::Emit(BrokerEvent::Error { .. }))
        ));
        assert_ne!(tracker.state(), ConnectionState::Connected);
    }

    #[test]
    fn publish_becomes_message_event() {
        let mut tracker = SessionTracker::default();
        let publish = Publish::new("plant/line-1", QoS::AtMostOnce, b"{}".to_vec());
        assert_eq!(
            tracker.on_incoming(Packet::Publish(publish)),
            Some(SessionAction::Emit(BrokerEvent::MessageArrived {
                topic: "plant/line-1".to_string(),
                payload: b"{}".to_vec(),
            }))
        );
    }

    #[test]
    fn rejected_subscription_is_an_error() {
        let mut tracker = SessionTracker::default();
        let ack = SubAck::new(1, vec![SubscribeReasonCode::Failure]);
        assert!(matches!(
            tracker.on_incoming(Packet::SubAck(ack)),
            Some(SessionAction::Emit(BrokerEvent::Error { .. }))
        ));
        let ok = SubAck::new(2, vec![SubscribeReasonCode::Success(QoS::AtMostOnce)]);
        assert_eq!(tracker.on_incoming(Packet::SubAck(ok)), None);
    }
}
