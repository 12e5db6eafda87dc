//! Wire payloads published by the car.
//!
//! Everything is JSON and is encoded into a fixed-capacity buffer; a payload
//! that does not fit is an [`EncodeError::Overflow`] and is never truncated.

use alloc::string::String;
use core::fmt;

use heapless::Vec;
use serde::Serialize;

/// Capacity for acknowledgements and status announcements.
pub const SMALL_PAYLOAD: usize = 128;
/// Capacity for telemetry samples.
pub const TELEMETRY_PAYLOAD: usize = 256;

/// Status marker carried by every acknowledgement.
pub const EXECUTED: &str = "executed";

#[derive(Debug)]
pub enum EncodeError {
    Serialize(serde_json::Error),
    Overflow { len: usize, capacity: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            EncodeError::Serialize(e) => write!(f, "serialization failed: {e}"),
            EncodeError::Overflow { len, capacity } => {
                write!(f, "payload of {len} bytes exceeds {capacity} byte buffer")
            }
        }
    }
}

/// Serialize `value` as JSON into a buffer of capacity `N`.
///
/// Serialization goes through a heap buffer first and the capacity is checked
/// afterwards, so `N` bounds what is kept and sent, not peak allocation.
pub fn encode<T: Serialize, const N: usize>(value: &T) -> Result<Vec<u8, N>, EncodeError> {
    let bytes = serde_json::to_vec(value).map_err(EncodeError::Serialize)?;
    Vec::from_slice(&bytes).map_err(|_| EncodeError::Overflow {
        len: bytes.len(),
        capacity: N,
    })
}

/// Published on the response topic after a command is accepted.
#[derive(Debug, Clone, Serialize)]
pub struct CommandAck<'a> {
    pub device_id: &'a str,
    /// The action exactly as received.
    pub command: &'a str,
    pub status: &'a str,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

/// Retained presence announcement on the status topic.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport<'a> {
    pub device_id: &'a str,
    pub status: Presence,
    pub firmware: &'a str,
}

/// One telemetry tick's worth of readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub device_id: String,
    /// Milliseconds since boot.
    pub timestamp: u64,
    /// Sequence number, strictly increasing for the life of the process.
    pub message_count: u32,
    /// Front distance in cm, or the out-of-range sentinel.
    pub distance_front: f32,
    pub wifi_rssi: i32,
    pub free_heap: u32,
}
