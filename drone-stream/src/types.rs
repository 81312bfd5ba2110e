//! Core types for the drone-stream crate.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a connected session.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a session ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random session ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the session ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a device (a drone).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Create a new device ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the device ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two per-device streams a session can observe.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum StreamKind {
    /// Device status and sensor data
    Telemetry,
    /// Real-time media negotiation data
    Signaling,
}

impl StreamKind {
    /// Every kind, in the order bindings are created for one device.
    pub const ALL: [StreamKind; 2] = [StreamKind::Telemetry, StreamKind::Signaling];

    /// Label used in queue names and routing keys.
    pub fn label(self) -> &'static str {
        match self {
            StreamKind::Telemetry => "drone",
            StreamKind::Signaling => "webrtc",
        }
    }

    /// Outbound session channel messages of this kind are forwarded on.
    pub fn channel(self) -> &'static str {
        match self {
            StreamKind::Telemetry => "drone-topic",
            StreamKind::Signaling => "webrtc-topic",
        }
    }

    /// Parse a routing key / queue name label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "drone" => Some(StreamKind::Telemetry),
            "webrtc" => Some(StreamKind::Signaling),
            _ => None,
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Ordered label -> device mapping supplied with a subscribe request.
///
/// Order is the order the client sent the entries in and decides the order
/// in which bindings are created. On the wire it is either a JSON object
/// (`{"a": "drone-1", "b": "drone-2"}`) or a JSON array, in which case the
/// labels are the positions (`"0"`, `"1"`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSet {
    entries: Vec<(String, DeviceId)>,
}

impl DeviceSet {
    /// Create an empty device set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a positional set from device IDs.
    pub fn from_devices<I, D>(devices: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceId>,
    {
        let entries = devices
            .into_iter()
            .enumerate()
            .map(|(i, d)| (i.to_string(), d.into()))
            .collect();
        Self { entries }
    }

    /// Number of devices in the set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labelled entries in order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DeviceId)> {
        self.entries.iter().map(|(label, id)| (label.as_str(), id))
    }

    /// Device IDs in order.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.entries.iter().map(|(_, id)| id)
    }

    /// First device ID that appears under more than one label.
    pub fn repeated_device(&self) -> Option<&DeviceId> {
        self.devices()
            .enumerate()
            .find(|(i, id)| self.devices().take(*i).any(|seen| seen == *id))
            .map(|(_, id)| id)
    }

    /// Routing key prefix used for outbound signaling.
    ///
    /// With one device this is its ID. With several it is every ID joined by
    /// `,`, which no device-side binding matches.
    pub fn signaling_prefix(&self) -> String {
        self.devices()
            .map(DeviceId::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<L, D> FromIterator<(L, D)> for DeviceSet
where
    L: Into<String>,
    D: Into<DeviceId>,
{
    fn from_iter<I: IntoIterator<Item = (L, D)>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|(label, device)| (label.into(), device.into()))
            .collect();
        Self { entries }
    }
}

fn device_id_from_value<E: de::Error>(value: Value) -> Result<DeviceId, E> {
    match value {
        Value::String(s) => Ok(DeviceId(s)),
        Value::Number(n) => Ok(DeviceId(n.to_string())),
        other => Err(E::custom(format!(
            "device identifier must be a string or number, got {other}"
        ))),
    }
}

impl<'de> Deserialize<'de> for DeviceSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Labelled(serde_json::Map<String, Value>),
            Positional(Vec<Value>),
        }

        let entries = match Repr::deserialize(deserializer)? {
            Repr::Labelled(map) => map
                .into_iter()
                .map(|(label, value)| Ok((label, device_id_from_value::<D::Error>(value)?)))
                .collect::<Result<Vec<_>, D::Error>>()?,
            Repr::Positional(values) => values
                .into_iter()
                .enumerate()
                .map(|(i, value)| Ok((i.to_string(), device_id_from_value::<D::Error>(value)?)))
                .collect::<Result<Vec<_>, D::Error>>()?,
        };
        Ok(Self { entries })
    }
}

/// One broker queue owned by a session, bound for one device and kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    /// Session-scoped queue name
    pub queue_name: String,
    /// Device whose stream the queue receives
    pub device_id: DeviceId,
    /// Which of the device's streams
    pub kind: StreamKind,
    /// Binding key on the shared exchange
    pub routing_key: String,
}

/// The shared wildcard queue used by admin sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminBinding {
    /// Fixed queue name shared by every admin session
    pub queue_name: String,
    /// Wildcard binding key
    pub routing_key: String,
}

/// Lifecycle states of a session's subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing is being consumed
    Idle,
    /// A subscribe batch is in progress
    Subscribing,
    /// Consumers are attached and forwarding
    Active,
    /// Consumers are being cancelled
    Canceling,
}
