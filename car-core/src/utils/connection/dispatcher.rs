//! Inbound message routing and outbound report assembly.
//!
//! Payloads on the command topic are JSON objects. An `"action"` key makes a
//! command, a `"test"` key makes a liveness probe, anything else is ignored.
//! Accepted commands update the [`CommandState`] and are acknowledged on the
//! response topic; unknown actions and malformed payloads are dropped.

use alloc::string::{String, ToString};
use core::fmt;

use embassy_time::Instant;
use serde_json::Value;

use super::{
    manager::ConnectionManager,
    messages::{encode, CommandAck, TelemetrySample, EXECUTED, SMALL_PAYLOAD, TELEMETRY_PAYLOAD},
    InboundMessage,
    LinkMonitor,
    MqttTransport,
};
use crate::utils::{
    config::{CarConfig, Topics},
    controllers::{is_out_of_range, CommandState, DistanceSensor, Intent, RangingSensor},
};

/// Shape of a successfully decoded command-topic payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    /// Carries an `"action"`; the raw string is kept for the acknowledgement.
    Command(String),
    /// Carries a `"test"` key.
    Probe,
    Unrecognized,
}

#[derive(Debug)]
pub enum DecodeError {
    Malformed(serde_json::Error),
    /// Valid JSON, but not an object.
    NotAnObject,
    /// `"action"` present but not a string.
    InvalidAction,
}

impl fmt::Display for DecodeError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DecodeError::Malformed(e) => write!(f, "malformed JSON: {e}"),
            DecodeError::NotAnObject => f.write_str("payload is not a JSON object"),
            DecodeError::InvalidAction => f.write_str("\"action\" is not a string"),
        }
    }
}

/// Parse and classify one payload. `"action"` takes priority over `"test"`.
pub fn decode(payload: &[u8]) -> Result<ParsedMessage, DecodeError> {
    let document: Value = serde_json::from_slice(payload).map_err(DecodeError::Malformed)?;
    let Value::Object(fields) = document else {
        return Err(DecodeError::NotAnObject);
    };

    if let Some(action) = fields.get("action") {
        return action
            .as_str()
            .map(|action| ParsedMessage::Command(action.to_string()))
            .ok_or(DecodeError::InvalidAction);
    }
    if fields.contains_key("test") {
        return Ok(ParsedMessage::Probe);
    }
    Ok(ParsedMessage::Unrecognized)
}

/// What [`Dispatcher::handle`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Intent set; `acked` says whether the acknowledgement went out.
    Applied { intent: Intent, acked: bool },
    UnknownAction,
    Probe,
    Unrecognized,
    Malformed,
    /// Arrived on a topic other than the command topic.
    OtherTopic,
}

pub struct Dispatcher {
    device_id: String,
    command_topic: String,
    response_topic: String,
    telemetry_topic: String,
    message_count: u32,
}

impl Dispatcher {
    pub fn new(
        config: &CarConfig,
        topics: &Topics,
    ) -> Self {
        Dispatcher {
            device_id: config.device_id.clone(),
            command_topic: topics.command.clone(),
            response_topic: topics.response.clone(),
            telemetry_topic: topics.telemetry.clone(),
            message_count: 0,
        }
    }

    /// Telemetry samples built so far.
    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    /// Decode, classify and act on one inbound message.
    pub fn handle<T: MqttTransport>(
        &mut self,
        message: &InboundMessage,
        commands: &mut CommandState,
        link: &ConnectionManager,
        transport: &mut T,
        now: Instant,
    ) -> Dispatch {
        if message.topic != self.command_topic {
            tracing::debug!(topic = %message.topic, "ignoring message on unexpected topic");
            return Dispatch::OtherTopic;
        }

        let action = match decode(&message.payload) {
            Ok(ParsedMessage::Command(action)) => action,
            Ok(ParsedMessage::Probe) => {
                tracing::info!("test message received");
                return Dispatch::Probe;
            }
            Ok(ParsedMessage::Unrecognized) => {
                tracing::debug!("no 'action' or 'test' key in message");
                return Dispatch::Unrecognized;
            }
            Err(error) => {
                tracing::error!(%error, "dropping command payload");
                return Dispatch::Malformed;
            }
        };

        let intent = match action.parse::<Intent>() {
            Ok(intent) => intent,
            Err(_) => {
                tracing::warn!(%action, "unknown action, keeping current intent");
                return Dispatch::UnknownAction;
            }
        };

        commands.set_intent(intent, now);
        let acked = self.acknowledge(&action, link, transport, now);
        Dispatch::Applied { intent, acked }
    }

    fn acknowledge<T: MqttTransport>(
        &self,
        action: &str,
        link: &ConnectionManager,
        transport: &mut T,
        now: Instant,
    ) -> bool {
        let ack = CommandAck {
            device_id: &self.device_id,
            command: action,
            status: EXECUTED,
            timestamp: now.as_millis(),
        };
        let payload = match encode::<_, SMALL_PAYLOAD>(&ack) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, "acknowledgement not sent");
                return false;
            }
        };

        match link.publish(transport, &self.response_topic, &payload, false) {
            Ok(sent) => sent,
            Err(error) => {
                tracing::warn!(%error, "acknowledgement publish failed");
                false
            }
        }
    }

    /// Gather one telemetry sample. Bumps the sequence number every call.
    pub fn build_telemetry<S, L>(
        &mut self,
        sensor: &mut DistanceSensor<S>,
        monitor: &L,
        now: Instant,
    ) -> TelemetrySample
    where
        S: RangingSensor,
        L: LinkMonitor,
    {
        self.message_count = self.message_count.saturating_add(1);
        TelemetrySample {
            device_id: self.device_id.clone(),
            timestamp: now.as_millis(),
            message_count: self.message_count,
            distance_front: sensor.read_distance(),
            wifi_rssi: monitor.rssi(),
            free_heap: monitor.free_heap(),
        }
    }

    /// Encode and publish a sample. Best effort: oversized payloads, a down
    /// link and publish errors all just skip this sample.
    pub fn publish_telemetry<T: MqttTransport>(
        &self,
        sample: &TelemetrySample,
        link: &ConnectionManager,
        transport: &mut T,
    ) -> bool {
        let payload = match encode::<_, TELEMETRY_PAYLOAD>(sample) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, count = sample.message_count, "telemetry skipped");
                return false;
            }
        };

        match link.publish(transport, &self.telemetry_topic, &payload, false) {
            Ok(true) => {
                if is_out_of_range(sample.distance_front) {
                    tracing::info!(
                        count = sample.message_count,
                        rssi = sample.wifi_rssi,
                        "telemetry published, nothing in range"
                    );
                } else {
                    tracing::info!(
                        count = sample.message_count,
                        distance_cm = sample.distance_front,
                        rssi = sample.wifi_rssi,
                        "telemetry published"
                    );
                }
                true
            }
            Ok(false) => {
                tracing::debug!(count = sample.message_count, "offline, telemetry dropped");
                false
            }
            Err(error) => {
                tracing::warn!(%error, "telemetry publish failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_is_a_command() {
        assert_eq!(
            decode(br#"{"action":"forward"}"#).unwrap(),
            ParsedMessage::Command("forward".to_string())
        );
    }

    #[test]
    fn action_wins_over_test() {
        assert_eq!(
            decode(br#"{"test":true,"action":"left"}"#).unwrap(),
            ParsedMessage::Command("left".to_string())
        );
    }

    #[test]
    fn unknown_action_still_decodes() {
        assert_eq!(
            decode(br#"{"action":"jump"}"#).unwrap(),
            ParsedMessage::Command("jump".to_string())
        );
    }

    #[test]
    fn test_key_is_a_probe() {
        assert_eq!(decode(br#"{"test":1}"#).unwrap(), ParsedMessage::Probe);
        assert_eq!(decode(br#"{"test":null}"#).unwrap(), ParsedMessage::Probe);
    }

    #[test]
    fn other_objects_are_unrecognized() {
        assert_eq!(decode(br#"{"speed":3}"#).unwrap(), ParsedMessage::Unrecognized);
        assert_eq!(decode(b"{}").unwrap(), ParsedMessage::Unrecognized);
    }

    #[test]
    fn malformed_payloads_are_errors() {
        assert!(matches!(decode(b"{\"action\":"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(b"forward"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(b"[1,2]"), Err(DecodeError::NotAnObject)));
        assert!(matches!(decode(br#"{"action":7}"#), Err(DecodeError::InvalidAction)));
    }
}
