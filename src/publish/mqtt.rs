//! MQTT transport backed by `rumqttc`.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Delivery, Publisher};
use crate::cli::BrokerAddress;
use crate::config::BrokerConfig;
use crate::error::{PublishError, SimError};
use crate::telemetry::TelemetryReading;

/// Resolved connection parameters for [`MqttPublisher::connect`].
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub qos: QoS,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub drain_timeout: Duration,
    pub channel_capacity: usize,
    /// Consecutive transport errors after which the link is closed.
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
}

impl MqttSettings {
    pub fn new(broker: &BrokerConfig, address: &BrokerAddress) -> Self {
        Self {
            host: address.host.clone(),
            port: address.port,
            client_id: broker.client_id.clone(),
            topic: broker.topic.clone(),
            qos: qos_from_level(broker.qos),
            keep_alive: Duration::from_secs(broker.keep_alive_secs),
            connect_timeout: Duration::from_secs(broker.connect_timeout_secs),
            drain_timeout: Duration::from_secs(broker.drain_timeout_secs),
            channel_capacity: broker.channel_capacity,
            max_reconnect_attempts: broker.max_reconnect_attempts,
            reconnect_backoff: Duration::from_millis(broker.reconnect_backoff_ms),
        }
    }
}

/// Maps a numeric QoS level; anything above 2 is treated as 2.
pub fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// An open MQTT connection that publishes readings to one topic.
///
/// Acquired with [`MqttPublisher::connect`], which only returns once the
/// broker has accepted the session, and released with
/// [`Publisher::disconnect`]. The event loop runs on its own task; publishes
/// only enqueue onto it unless confirmation is requested. If the broker stays
/// unreachable for `max_reconnect_attempts` polls in a row the task exits,
/// and every later publish fails with a link-lost error.
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    /// Length of the acknowledged prefix of QoS >= 1 publishes.
    acked: watch::Receiver<u64>,
    /// QoS >= 1 publishes issued so far.
    awaiting: u64,
    driver: Option<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl MqttPublisher {
    /// Connects and waits for the broker's CONNACK.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Connect`], [`SimError::Refused`] or
    /// [`SimError::ConnectTimeout`] when no session could be established.
    pub async fn connect(settings: &MqttSettings) -> Result<Self, SimError> {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, settings.channel_capacity);
        info!(host = %settings.host, port = settings.port, "connecting to MQTT broker");

        let handshake = wait_for_connack(&mut eventloop, settings);
        match tokio::time::timeout(settings.connect_timeout, handshake).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SimError::ConnectTimeout {
                    host: settings.host.clone(),
                    port: settings.port,
                });
            }
        }
        info!(host = %settings.host, port = settings.port, topic = %settings.topic, "connected to MQTT broker");

        let (ack_tx, ack_rx) = watch::channel(0u64);
        let driver = tokio::spawn(drive(eventloop, ack_tx, ReconnectPolicy::from(settings)));

        Ok(Self {
            client,
            topic: settings.topic.clone(),
            qos: settings.qos,
            acked: ack_rx,
            awaiting: 0,
            driver: Some(driver),
            drain_timeout: settings.drain_timeout,
        })
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop, settings: &MqttSettings) -> Result<(), SimError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(SimError::Refused {
                    host: settings.host.clone(),
                    port: settings.port,
                    code: ack.code,
                });
            }
            Ok(_) => {}
            Err(source) => {
                return Err(SimError::Connect {
                    host: settings.host.clone(),
                    port: settings.port,
                    source,
                });
            }
        }
    }
}

/// When the driver gives up on an unreachable broker.
#[derive(Debug, Clone, Copy)]
struct ReconnectPolicy {
    backoff: Duration,
    max_attempts: u32,
}

impl From<&MqttSettings> for ReconnectPolicy {
    fn from(settings: &MqttSettings) -> Self {
        Self {
            backoff: settings.reconnect_backoff,
            max_attempts: settings.max_reconnect_attempts.max(1),
        }
    }
}

/// Matches broker acknowledgements to publishes by packet id.
///
/// QoS >= 1 publishes are numbered in the order they are written to the
/// socket. The watermark is the number of publishes, counted from the first,
/// that are all acknowledged; publish `n` (1-based) is confirmed once the
/// watermark reaches `n`. Acks for unknown packet ids are ignored, so a
/// duplicate ack after a reconnect cannot release a later publish.
#[derive(Debug, Default)]
struct AckTracker {
    next_seq: u64,
    in_flight: HashMap<u16, u64>,
    acked: BTreeSet<u64>,
    watermark: u64,
}

impl AckTracker {
    fn sent(&mut self, pkid: u16) {
        // pkid 0 is QoS 0; a pkid already in flight is a retransmission
        if pkid == 0 || self.in_flight.contains_key(&pkid) {
            return;
        }
        self.in_flight.insert(pkid, self.next_seq);
        self.next_seq += 1;
    }

    /// Records an ack and returns the new watermark, if the pkid was in flight.
    fn acked(&mut self, pkid: u16) -> Option<u64> {
        let seq = self.in_flight.remove(&pkid)?;
        self.acked.insert(seq);
        while self.acked.remove(&self.watermark) {
            self.watermark += 1;
        }
        Some(self.watermark)
    }
}

/// Polls the event loop until the outgoing DISCONNECT has been written or the
/// broker stays unreachable for `policy.max_attempts` polls in a row.
///
/// Transport errors are logged and retried; rumqttc reconnects on the next
/// poll. Returning drops `acked`, which fails any confirmed waiter.
async fn drive(mut eventloop: EventLoop, acked: watch::Sender<u64>, policy: ReconnectPolicy) {
    let mut tracker = AckTracker::default();
    let mut failures = 0u32;
    loop {
        let event = match eventloop.poll().await {
            Ok(event) => {
                failures = 0;
                event
            }
            Err(err) => {
                failures += 1;
                if failures >= policy.max_attempts {
                    error!(error = %err, attempts = failures, "MQTT broker unreachable; closing link");
                    break;
                }
                warn!(error = %err, attempt = failures, "MQTT event loop error; retrying");
                tokio::time::sleep(policy.backoff).await;
                continue;
            }
        };
        let pkid = match event {
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                tracker.sent(pkid);
                continue;
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                debug!("MQTT disconnect written");
                break;
            }
            Event::Incoming(Packet::PubAck(ack)) => ack.pkid,
            Event::Incoming(Packet::PubComp(comp)) => comp.pkid,
            _ => continue,
        };
        if let Some(watermark) = tracker.acked(pkid) {
            acked.send_replace(watermark);
        }
    }
}

impl Publisher for MqttPublisher {
    async fn publish(
        &mut self,
        reading: &TelemetryReading,
        delivery: Delivery,
    ) -> Result<(), PublishError> {
        let payload = reading.to_json()?;
        self.client
            .publish(self.topic.as_str(), self.qos, false, payload)
            .await?;
        if self.qos == QoS::AtMostOnce {
            return Ok(());
        }
        self.awaiting += 1;
        if delivery == Delivery::Confirmed {
            let target = self.awaiting;
            self.acked
                .wait_for(|n| *n >= target)
                .await
                .map_err(|_| PublishError::LinkClosed)?;
        }
        Ok(())
    }

    async fn disconnect(mut self) -> Result<(), PublishError> {
        info!(topic = %self.topic, "disconnecting from MQTT broker");
        let requested = self.client.disconnect().await;
        if let Some(mut driver) = self.driver.take() {
            if tokio::time::timeout(self.drain_timeout, &mut driver)
                .await
                .is_err()
            {
                warn!(
                    timeout_secs = self.drain_timeout.as_secs(),
                    "timed out draining MQTT publishes; dropping connection"
                );
                driver.abort();
            }
        }
        requested.map_err(PublishError::from)
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::telemetry::{Header, Location, Measurements};

    fn reading() -> TelemetryReading {
        TelemetryReading {
            header: Header {
                event_id: Uuid::new_v4(),
                version: "1.0".to_string(),
                asset_id: "INV-1".to_string(),
            },
            location: Arc::new(Location {
                latitude: 40.4,
                longitude: -3.7,
                market_zone: "BZN|ES".to_string(),
                country_code: "ES".to_string(),
            }),
            measurements: Measurements {
                power_kw: 20.0,
                energy_total_kwh: 500.0,
                inverter_temp_c: Some(35.0),
            },
            timestamp: Utc::now(),
            virtual_time_hour: 12.0,
        }
    }

    #[test]
    fn maps_qos_levels() {
        assert_eq!(qos_from_level(0), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2), QoS::ExactlyOnce);
    }

    #[test]
    fn settings_follow_resolved_address() {
        let address = BrokerAddress {
            host: "broker.local".to_string(),
            port: 8883,
        };
        let settings = MqttSettings::new(&BrokerConfig::default(), &address);
        assert_eq!(settings.host, "broker.local");
        assert_eq!(settings.port, 8883);
        assert_eq!(settings.topic, "telemetry_raw");
        assert_eq!(settings.qos, QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn unreachable_broker_fails_to_connect() {
        let settings = MqttSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            client_id: "test".to_string(),
            topic: "telemetry_raw".to_string(),
            qos: QoS::AtLeastOnce,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(1),
            channel_capacity: 10,
            max_reconnect_attempts: 3,
            reconnect_backoff: Duration::from_millis(10),
        };
        let result = MqttPublisher::connect(&settings).await;
        assert!(matches!(
            result,
            Err(SimError::Connect { .. }) | Err(SimError::ConnectTimeout { .. })
        ));
    }

    #[test]
    fn in_order_acks_advance_watermark() {
        let mut tracker = AckTracker::default();
        tracker.sent(1);
        tracker.sent(2);
        assert_eq!(tracker.acked(1), Some(1));
        assert_eq!(tracker.acked(2), Some(2));
    }

    #[test]
    fn duplicate_ack_does_not_release_later_publish() {
        let mut tracker = AckTracker::default();
        tracker.sent(7);
        assert_eq!(tracker.acked(7), Some(1));
        tracker.sent(8);
        // repeated ack for 7 after a reconnect
        assert_eq!(tracker.acked(7), None);
        assert_eq!(tracker.watermark, 1);
        assert_eq!(tracker.acked(8), Some(2));
    }

    #[test]
    fn retransmitted_publish_is_counted_once() {
        let mut tracker = AckTracker::default();
        tracker.sent(3);
        tracker.sent(3);
        tracker.sent(4);
        assert_eq!(tracker.acked(3), Some(1));
        assert_eq!(tracker.acked(4), Some(2));
    }

    #[test]
    fn out_of_order_acks_wait_for_the_gap() {
        let mut tracker = AckTracker::default();
        tracker.sent(1);
        tracker.sent(2);
        tracker.sent(3);
        assert_eq!(tracker.acked(3), Some(0));
        assert_eq!(tracker.acked(2), Some(0));
        assert_eq!(tracker.acked(1), Some(3));
    }

    #[test]
    fn qos0_publishes_are_not_tracked() {
        let mut tracker = AckTracker::default();
        tracker.sent(0);
        assert!(tracker.in_flight.is_empty());
        assert_eq!(tracker.acked(0), None);
    }

    #[tokio::test]
    async fn driver_gives_up_and_fails_confirmed_publish() {
        let (client, eventloop) = AsyncClient::new(MqttOptions::new("test", "127.0.0.1", 1), 10);
        let (ack_tx, mut ack_rx) = watch::channel(0u64);
        let policy = ReconnectPolicy {
            backoff: Duration::from_millis(10),
            max_attempts: 3,
        };
        let driver = tokio::spawn(drive(eventloop, ack_tx, policy));
        tokio::time::timeout(Duration::from_secs(10), driver)
            .await
            .expect("driver should stop after its reconnect budget")
            .unwrap();
        assert!(ack_rx.changed().await.is_err());

        let mut publisher = MqttPublisher {
            client,
            topic: "telemetry_raw".to_string(),
            qos: QoS::AtLeastOnce,
            acked: ack_rx,
            awaiting: 0,
            driver: None,
            drain_timeout: Duration::from_secs(1),
        };
        let err = publisher
            .publish(&reading(), Delivery::Confirmed)
            .await
            .unwrap_err();
        assert!(err.is_link_lost());
    }
}
