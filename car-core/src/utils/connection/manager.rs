//! Broker connection lifecycle.
//!
//! [`ConnectionManager`] is polled once per control-loop cycle and never
//! blocks longer than a single connect attempt. While disconnected it keeps a
//! visible `next_retry_at` deadline; each attempt registers the offline
//! last-will, and a successful one re-subscribes to the command topic and
//! announces the car online (retained).

use alloc::{format, string::String};

use embassy_time::{Duration, Instant};
use heapless::Vec;
use rand_core::RngCore;

use super::{
    messages::{encode, EncodeError, Presence, StatusReport, SMALL_PAYLOAD},
    ConnectOptions,
    LastWill,
    MqttTransport,
    TransportError,
};
use crate::utils::config::{CarConfig, Topics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outcome of one [`ConnectionManager::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Already connected and the link is healthy.
    Idle,
    /// Disconnected, next attempt not yet due.
    Waiting,
    /// An attempt succeeded on this poll.
    Connected,
    /// An attempt failed; another is scheduled after the reconnect delay.
    RetryScheduled,
    /// The transport reported the session gone.
    LinkLost,
}

pub struct ConnectionManager {
    state: ConnectionState,
    next_retry_at: Instant,
    reconnect_delay: Duration,
    client_id_prefix: String,
    command_topic: String,
    status_topic: String,
    online: Vec<u8, SMALL_PAYLOAD>,
    offline: Vec<u8, SMALL_PAYLOAD>,
    attempts: u32,
}

impl ConnectionManager {
    /// Prepare the presence payloads up front; the first attempt is due
    /// immediately.
    pub fn new(
        config: &CarConfig,
        topics: &Topics,
    ) -> Result<Self, EncodeError> {
        let report = |status| StatusReport {
            device_id: &config.device_id,
            status,
            firmware: &config.firmware,
        };

        Ok(ConnectionManager {
            state: ConnectionState::Disconnected,
            next_retry_at: Instant::from_ticks(0),
            reconnect_delay: config.reconnect_delay(),
            client_id_prefix: config.client_id_prefix.clone(),
            command_topic: topics.command.clone(),
            status_topic: topics.status.clone(),
            online: encode(&report(Presence::Online))?,
            offline: encode(&report(Presence::Offline))?,
            attempts: 0,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// When the next connect attempt is allowed while disconnected.
    pub fn next_retry_at(&self) -> Instant {
        self.next_retry_at
    }

    /// Connect attempts made so far, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Advance the connection state machine by one step.
    pub fn poll<T, R>(
        &mut self,
        transport: &mut T,
        rng: &mut R,
        now: Instant,
    ) -> ConnectionEvent
    where
        T: MqttTransport,
        R: RngCore,
    {
        if self.state == ConnectionState::Connected {
            if transport.is_connected() {
                return ConnectionEvent::Idle;
            }
            tracing::warn!("broker link lost");
            self.state = ConnectionState::Disconnected;
            self.next_retry_at = now;
            return ConnectionEvent::LinkLost;
        }

        if now < self.next_retry_at {
            return ConnectionEvent::Waiting;
        }

        self.state = ConnectionState::Connecting;
        self.attempts += 1;
        let client_id = format!("{}-{:x}", self.client_id_prefix, rng.next_u32() & 0xffff);
        tracing::info!(%client_id, attempt = self.attempts, "attempting broker connection");

        match self.establish(transport, &client_id) {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                tracing::info!(topic = %self.command_topic, "connected, subscribed and announced online");
                ConnectionEvent::Connected
            }
            Err(error) => {
                self.state = ConnectionState::Disconnected;
                self.next_retry_at = now + self.reconnect_delay;
                tracing::warn!(
                    %error,
                    retry_in_ms = self.reconnect_delay.as_millis(),
                    "broker connection failed"
                );
                ConnectionEvent::RetryScheduled
            }
        }
    }

    /// Connect with the offline last-will, re-subscribe, announce online.
    /// A failure after the connect itself tears the session down so the
    /// broker never holds a session without the command subscription.
    fn establish<T: MqttTransport>(
        &self,
        transport: &mut T,
        client_id: &str,
    ) -> Result<(), TransportError> {
        let options = ConnectOptions {
            client_id,
            last_will: LastWill {
                topic: &self.status_topic,
                payload: &self.offline,
                retain: true,
            },
        };

        transport.connect(&options)?;
        let announced = transport
            .subscribe(&self.command_topic)
            .and_then(|()| transport.publish(&self.status_topic, &self.online, true));
        if let Err(error) = announced {
            tracing::debug!(%error, "session setup failed, disconnecting");
            transport.disconnect();
            return Err(error);
        }
        Ok(())
    }

    /// Publish only while connected. Returns `Ok(false)` when skipped; nothing
    /// is queued for later.
    pub fn publish<T: MqttTransport>(
        &self,
        transport: &mut T,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<bool, TransportError> {
        if !self.is_connected() {
            return Ok(false);
        }
        transport.publish(topic, payload, retain)?;
        Ok(true)
    }
}
