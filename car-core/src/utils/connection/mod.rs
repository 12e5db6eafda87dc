//! Module Exports
//!
//! This file defines the seam to the publish/subscribe transport and exports
//! the broker-facing modules.
//!
//! # Modules
//! - `manager`: connection lifecycle, retry schedule, presence announcements.
//! - `dispatcher`: inbound decoding and routing, acknowledgements, telemetry.
//! - `messages`: wire payloads and fixed-capacity encoding.

use alloc::{string::String, vec::Vec};
use core::fmt;

pub mod dispatcher;
pub mod manager;
pub mod messages;

pub use dispatcher::{decode, DecodeError, Dispatch, Dispatcher, ParsedMessage};
pub use manager::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use messages::{CommandAck, EncodeError, Presence, StatusReport, TelemetrySample};

/// Message registered with the broker at connect time and published by it if
/// the link drops without a clean disconnect.
#[derive(Debug, Clone, Copy)]
pub struct LastWill<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub retain: bool,
}

/// Parameters for a single connect attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub last_will: LastWill<'a>,
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Failures reported by a [`MqttTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The broker refused or never answered; carries the client's state code.
    ConnectFailed(i32),
    /// The operation needs a live session.
    NotConnected,
    SubscribeFailed,
    PublishFailed,
}

impl fmt::Display for TransportError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            TransportError::ConnectFailed(rc) => write!(f, "connect failed, rc={rc}"),
            TransportError::NotConnected => f.write_str("not connected"),
            TransportError::SubscribeFailed => f.write_str("subscribe failed"),
            TransportError::PublishFailed => f.write_str("publish failed"),
        }
    }
}

/// Publish/subscribe client primitives the car depends on.
///
/// Framing, QoS handling and keep-alive are the implementation's business;
/// every call here is expected to return promptly.
pub trait MqttTransport {
    fn connect(
        &mut self,
        options: &ConnectOptions<'_>,
    ) -> Result<(), TransportError>;

    /// Whether the session is still alive. Link loss is detected here.
    fn is_connected(&self) -> bool;

    fn subscribe(
        &mut self,
        topic: &str,
    ) -> Result<(), TransportError>;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), TransportError>;

    /// Take the next received message, if any.
    fn poll(&mut self) -> Option<InboundMessage>;

    /// Tear the session down. Must be safe to call on a dead session.
    fn disconnect(&mut self);
}

/// Link and platform health figures reported in telemetry.
pub trait LinkMonitor {
    /// Received signal strength of the network link, dBm.
    fn rssi(&self) -> i32;

    /// Free heap, bytes.
    fn free_heap(&self) -> u32;
}
