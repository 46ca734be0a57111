//! Typed gateway events.
//!
//! The gateway deserialises dispatch payloads into [`GatewayEvent`] so the
//! bot runtime and the event waiters can pattern-match on typed data.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::types::*;

/// A fully-parsed event coming off the Discord gateway.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// IDENTIFY succeeded; carries the bot's own user.
    Ready(ReadyEvent),

    /// A message was created in a channel we can see.
    MessageCreate(Message),

    /// A message was edited. Only the changed fields are present.
    MessageUpdate(MessageUpdate),

    MessageDelete(MessageDelete),

    /// A button on one of our messages was pressed.
    InteractionCreate(Interaction),

    /// Heartbeat ACK from the gateway (op 11).
    HeartbeatAck,

    /// The gateway is asking us to heartbeat immediately (op 1).
    HeartbeatRequest,

    /// Gateway told us to reconnect (op 7).
    Reconnect,

    /// Session invalidated (op 9); `true` when it can be resumed.
    InvalidSession(bool),

    /// Anything without a typed variant.
    Unknown {
        event_name: Option<String>,
        op: u8,
        data: Option<serde_json::Value>,
    },
}

impl GatewayEvent {
    /// Convert a raw [`GatewayPayload`]. Never fails; unrecognised or
    /// malformed events become [`GatewayEvent::Unknown`].
    pub fn from_payload(payload: GatewayPayload) -> Self {
        match payload.op {
            0 => Self::parse_dispatch(payload.t, payload.d),
            1 => GatewayEvent::HeartbeatRequest,
            7 => GatewayEvent::Reconnect,
            9 => GatewayEvent::InvalidSession(
                payload.d.as_ref().and_then(|v| v.as_bool()).unwrap_or(false),
            ),
            11 => GatewayEvent::HeartbeatAck,
            op => GatewayEvent::Unknown {
                event_name: payload.t,
                op,
                data: payload.d,
            },
        }
    }

    fn parse_dispatch(event_name: Option<String>, data: Option<serde_json::Value>) -> Self {
        let (Some(name), Some(d)) = (event_name.as_deref(), data.as_ref()) else {
            return GatewayEvent::Unknown {
                event_name,
                op: 0,
                data,
            };
        };

        let parsed = match name {
            "READY" => typed(name, d, GatewayEvent::Ready),
            "MESSAGE_CREATE" => typed(name, d, GatewayEvent::MessageCreate),
            "MESSAGE_UPDATE" => typed(name, d, GatewayEvent::MessageUpdate),
            "MESSAGE_DELETE" => typed(name, d, GatewayEvent::MessageDelete),
            "INTERACTION_CREATE" => typed(name, d, GatewayEvent::InteractionCreate),
            _ => None,
        };

        parsed.unwrap_or(GatewayEvent::Unknown {
            event_name,
            op: 0,
            data,
        })
    }

    /// The dispatch name, for logging.
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::Ready(_) => "READY",
            GatewayEvent::MessageCreate(_) => "MESSAGE_CREATE",
            GatewayEvent::MessageUpdate(_) => "MESSAGE_UPDATE",
            GatewayEvent::MessageDelete(_) => "MESSAGE_DELETE",
            GatewayEvent::InteractionCreate(_) => "INTERACTION_CREATE",
            GatewayEvent::HeartbeatAck => "HEARTBEAT_ACK",
            GatewayEvent::HeartbeatRequest => "HEARTBEAT",
            GatewayEvent::Reconnect => "RECONNECT",
            GatewayEvent::InvalidSession(_) => "INVALID_SESSION",
            GatewayEvent::Unknown { event_name, .. } => event_name.as_deref().unwrap_or("UNKNOWN"),
        }
    }
}

fn typed<T: DeserializeOwned>(
    name: &str,
    data: &serde_json::Value,
    wrap: fn(T) -> GatewayEvent,
) -> Option<GatewayEvent> {
    match serde_json::from_value::<T>(data.clone()) {
        Ok(value) => Some(wrap(value)),
        Err(e) => {
            warn!(event = name, error = %e, "failed to parse dispatch payload");
            None
        }
    }
}
