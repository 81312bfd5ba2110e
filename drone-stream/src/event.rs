//! Session wire events.
//!
//! Both directions use a `{"event": <name>, "data": <payload>}` envelope.
//! Inbound event names accept the legacy spellings older clients still send.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::ADMIN_CHANNEL;
use crate::error::{Result, SessionError};
use crate::types::{DeviceId, DeviceSet, StreamKind};

/// Events pushed from a session to its client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// A queue was declared for this session
    QueueCreated(String),
    /// Telemetry from a subscribed device
    DroneTopic(Value),
    /// Signaling from a subscribed device
    WebrtcTopic(Value),
    /// Telemetry from any device, delivered through the admin queue
    AdminDroneTopic(Value),
}

impl SessionEvent {
    /// Wrap a device message for the channel of its stream kind.
    pub fn device(kind: StreamKind, payload: Value) -> Self {
        match kind {
            StreamKind::Telemetry => SessionEvent::DroneTopic(payload),
            StreamKind::Signaling => SessionEvent::WebrtcTopic(payload),
        }
    }

    /// Outbound channel name.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::QueueCreated(_) => "queue-created",
            SessionEvent::DroneTopic(_) => StreamKind::Telemetry.channel(),
            SessionEvent::WebrtcTopic(_) => StreamKind::Signaling.channel(),
            SessionEvent::AdminDroneTopic(_) => ADMIN_CHANNEL,
        }
    }
}

/// A command addressed to one device.
///
/// The device is named by `deviceId` (or the legacy `droneID`). The whole
/// object, including any extra fields, is the message payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub device_id: DeviceId,
    pub payload: Value,
}

impl TryFrom<Value> for Command {
    type Error = SessionError;

    fn try_from(payload: Value) -> Result<Self> {
        let Value::Object(fields) = &payload else {
            return Err(SessionError::MalformedRequest(
                "command must be a JSON object".to_string(),
            ));
        };

        let id = match fields.get("deviceId").or_else(|| fields.get("droneID")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => {
                return Err(SessionError::MalformedRequest(
                    "command device identifier must be a string or number".to_string(),
                ))
            }
            None => {
                return Err(SessionError::MalformedRequest(
                    "command has no device identifier".to_string(),
                ))
            }
        };

        Ok(Self {
            device_id: DeviceId::new(id),
            payload,
        })
    }
}

/// Requests a client can send to its session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Subscribe to the streams of a set of devices
    Subscribe(DeviceSet),
    /// Attach to the shared admin telemetry queue
    AdminSubscribe,
    /// Publish a command to one device
    SendCommand(Command),
    /// Publish signaling data to the last subscribed devices
    SendSignaling(Value),
    /// Cancel every consumer the session holds
    CancelSubscription,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| SessionError::MalformedRequest(format!("invalid event frame: {e}")))?;
        Self::from_parts(&envelope.event, envelope.data)
    }

    /// Build an event from its name and payload.
    pub fn from_parts(event: &str, data: Value) -> Result<Self> {
        match event {
            "subscribe" | "establish-rabbitmq-connection" => {
                let devices = serde_json::from_value(data).map_err(|e| {
                    SessionError::MalformedRequest(format!("invalid device set: {e}"))
                })?;
                Ok(ClientEvent::Subscribe(devices))
            }
            "admin-subscribe" | "drone-admin" => Ok(ClientEvent::AdminSubscribe),
            "send-command" | "send-drone" => Ok(ClientEvent::SendCommand(Command::try_from(data)?)),
            "send-signaling" | "send-webrtc" => Ok(ClientEvent::SendSignaling(data)),
            "cancel-subscription" | "cancel-consume" => Ok(ClientEvent::CancelSubscription),
            other => Err(SessionError::MalformedRequest(format!(
                "unknown event '{other}'"
            ))),
        }
    }

    /// Canonical event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Subscribe(_) => "subscribe",
            ClientEvent::AdminSubscribe => "admin-subscribe",
            ClientEvent::SendCommand(_) => "send-command",
            ClientEvent::SendSignaling(_) => "send-signaling",
            ClientEvent::CancelSubscription => "cancel-subscription",
        }
    }
}
