//! Command routing from sessions to devices.
//!
//! Publishes are fire-and-forget. Errors are returned so the caller can log
//! them; nothing is reported back to the client.

use broker_gateway::BrokerGateway;
use bytes::Bytes;
use serde_json::Value;

use crate::binding::{outbound_routing_key, validate_device_id};
use crate::error::{Result, SessionError};
use crate::event::Command;
use crate::types::{DeviceSet, StreamKind};

fn encode(value: &Value) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| SessionError::MalformedRequest(format!("unencodable payload: {e}")))
}

/// Publish a command object to `{deviceId}.web.drone`.
pub async fn send_command(gateway: &BrokerGateway, command: &Command) -> Result<()> {
    validate_device_id(&command.device_id)?;
    let routing_key = outbound_routing_key(command.device_id.as_str(), StreamKind::Telemetry);
    gateway.publish(&routing_key, encode(&command.payload)?).await?;
    tracing::debug!(device = %command.device_id, routing_key = %routing_key, "Command sent");
    Ok(())
}

/// Publish signaling data to the devices of the last subscribe request.
///
/// The routing key prefix is [`DeviceSet::signaling_prefix`]: the device ID
/// for a single-device set, every ID joined by `,` otherwise.
pub async fn send_signaling(
    gateway: &BrokerGateway,
    devices: Option<&DeviceSet>,
    data: &Value,
) -> Result<()> {
    let devices = devices.ok_or_else(|| {
        SessionError::MalformedRequest("signaling sent before any subscribe".to_string())
    })?;
    let routing_key = outbound_routing_key(&devices.signaling_prefix(), StreamKind::Signaling);
    gateway.publish(&routing_key, encode(data)?).await?;
    tracing::debug!(routing_key = %routing_key, "Signaling sent");
    Ok(())
}
