//! Binding key scheme.
//!
//! Pure derivation of queue names and routing keys; no I/O. Routing keys are
//! three dot-separated words, `{deviceId}.{origin}.{stream}`:
//!
//! | Direction | Origin | Example |
//! |---|---|---|
//! | device -> session | `phone` | `drone-1.phone.drone` |
//! | session -> device | `web` | `drone-1.web.drone` |
//!
//! Bindings are built from an explicit `(device, kind)` list, Telemetry then
//! Signaling for each device in [`DeviceSet`] order.

use std::str::FromStr;

use crate::error::{Result, SessionError};
use crate::types::{AdminBinding, DeviceId, DeviceSet, QueueBinding, SessionId, StreamKind};

/// Wildcard binding of the shared admin queue: every device's telemetry.
pub const ADMIN_ROUTING_KEY: &str = "*.phone.drone";

/// Outbound channel admin sessions receive telemetry on.
pub const ADMIN_CHANNEL: &str = "admin-drone-topic";

/// Which side of the bridge a message originates from.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Origin {
    /// Published by a device, consumed by sessions
    Phone,
    /// Published by a session, consumed by a device
    Web,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Phone => "phone",
            Origin::Web => "web",
        }
    }
}

/// A parsed `{deviceId}.{origin}.{stream}` routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingKey {
    pub device: String,
    pub origin: Origin,
    pub kind: StreamKind,
}

impl RoutingKey {
    pub fn new(device: impl Into<String>, origin: Origin, kind: StreamKind) -> Self {
        Self {
            device: device.into(),
            origin,
            kind,
        }
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.device, self.origin.as_str(), self.kind.label())
    }
}

impl FromStr for RoutingKey {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.');
        let (Some(device), Some(origin), Some(kind), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::MalformedRequest(format!(
                "routing key must have three segments: {s}"
            )));
        };

        let origin = match origin {
            "phone" => Origin::Phone,
            "web" => Origin::Web,
            other => {
                return Err(SessionError::MalformedRequest(format!(
                    "unknown origin '{other}' in routing key {s}"
                )))
            }
        };
        let kind = StreamKind::from_label(kind).ok_or_else(|| {
            SessionError::MalformedRequest(format!("unknown stream '{kind}' in routing key {s}"))
        })?;

        Ok(Self::new(device, origin, kind))
    }
}

/// Check that a device ID can be used as a routing key segment.
///
/// Dots would add segments and `*`/`#` would turn a binding into a wildcard.
pub fn validate_device_id(device: &DeviceId) -> Result<()> {
    let id = device.as_str();
    if id.is_empty() {
        return Err(SessionError::MalformedRequest(
            "device identifier must not be empty".to_string(),
        ));
    }
    if id.contains(['.', '*', '#']) {
        return Err(SessionError::MalformedRequest(format!(
            "device identifier '{id}' contains a routing key delimiter or wildcard"
        )));
    }
    Ok(())
}

/// Queue name for one device stream: `{sessionId}-{deviceId}-{kind}`.
pub fn queue_name(session: &SessionId, device: &DeviceId, kind: StreamKind) -> String {
    format!("{}-{}-{}", session, device, kind.label())
}

/// Binding key for messages a device publishes: `{deviceId}.phone.{kind}`.
pub fn inbound_routing_key(device: &DeviceId, kind: StreamKind) -> String {
    RoutingKey::new(device.as_str(), Origin::Phone, kind).to_string()
}

/// Routing key for messages sent to a device: `{prefix}.web.{kind}`.
pub fn outbound_routing_key(prefix: &str, kind: StreamKind) -> String {
    RoutingKey::new(prefix, Origin::Web, kind).to_string()
}

/// Every binding a subscribe batch needs, in creation order.
///
/// For N devices this is 2N bindings: `[T(d0), S(d0), T(d1), S(d1), ...]`.
pub fn binding_plan(session: &SessionId, devices: &DeviceSet) -> Vec<QueueBinding> {
    devices
        .devices()
        .flat_map(|device| StreamKind::ALL.into_iter().map(move |kind| (device, kind)))
        .map(|(device, kind)| QueueBinding {
            queue_name: queue_name(session, device, kind),
            device_id: device.clone(),
            kind,
            routing_key: inbound_routing_key(device, kind),
        })
        .collect()
}

/// The shared admin binding for a given queue name.
pub fn admin_binding(queue_name: &str) -> AdminBinding {
    AdminBinding {
        queue_name: queue_name.to_string(),
        routing_key: ADMIN_ROUTING_KEY.to_string(),
    }
}
