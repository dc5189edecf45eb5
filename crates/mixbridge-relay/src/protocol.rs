//! Client-facing message protocol.
//!
//! Both directions are closed sum types decoded once at the boundary.
//! On the wire every message is a JSON object whose `type` field names the
//! variant, with camelCase field names:
//!
//! ```text
//! -> {"type":"hello","clientId":"surface-1","protocolVersion":1}
//! -> {"type":"setFader","targetIndex":2,"value":0.75}
//! <- {"type":"returnState","targetIndex":2,"fader":0.75}
//! <- {"type":"connectionState","state":"STALE","lastConsoleReplyAt":1700000000000,"lastMeterFrameAt":null}
//! <- {"type":"error","code":"SAFE_STATE_BLOCK","message":"control writes blocked while STALE"}
//! ```
//!
//! Target indices on inbound control messages are carried as plain integers
//! and range-checked by the hub, so an out-of-range index is a validation
//! drop rather than a parse failure.

use mixbridge_core::error::{Error, Result};
use mixbridge_core::events::ConsoleEvent;
use mixbridge_core::types::{
    BusNamesPatch, BusSlot, ChannelPatch, LivenessState, ReturnPatch, TargetType,
};
use serde::{Deserialize, Serialize};

/// Version announced in `welcome`.
pub const PROTOCOL_VERSION: u32 = 1;

/// A request from a control-surface client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Hello {
        #[serde(default)]
        client_id: Option<String>,
        #[serde(default)]
        protocol_version: Option<u32>,
    },
    RequestFullState,
    RegisterTarget {
        target_type: TargetType,
        target_index: i64,
    },
    SetFader {
        target_index: i64,
        value: f64,
    },
    SetMute {
        target_index: i64,
        mute: bool,
    },
    SetBusAssignment {
        target_index: i64,
        bus_slot: BusSlot,
        assigned: bool,
    },
    ToggleChannelMute {
        target_type: TargetType,
        target_index: i64,
    },
}

impl ClientMessage {
    /// Parse one client text frame.
    ///
    /// Anything that is not a known message shape is [`Error::Protocol`].
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("bad client message: {e}")))
    }

    /// Parse a binary frame carrying the same JSON.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| Error::Protocol(format!("bad client message: {e}")))
    }

    /// Whether handling this message writes to the console.
    pub fn is_control_write(&self) -> bool {
        matches!(
            self,
            ClientMessage::SetFader { .. }
                | ClientMessage::SetMute { .. }
                | ClientMessage::SetBusAssignment { .. }
                | ClientMessage::ToggleChannelMute { .. }
        )
    }
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// A control write arrived while the session was not LIVE.
    SafeStateBlock,
}

/// A message from the bridge to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        protocol_version: u32,
    },
    /// Partial update of one return strip.
    ReturnState(ReturnPatch),
    /// Partial update of one registered channel.
    ChannelState(ChannelPatch),
    /// Partial update of the bus display names.
    BusNames(BusNamesPatch),
    ConnectionState {
        state: LivenessState,
        last_console_reply_at: Option<u64>,
        last_meter_frame_at: Option<u64>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The rejection sent for a control write while not LIVE.
    pub fn safe_state_block(state: LivenessState) -> Self {
        ServerMessage::Error {
            code: ErrorCode::SafeStateBlock,
            message: format!("control writes blocked while {state}"),
        }
    }
}

impl From<ConsoleEvent> for ServerMessage {
    fn from(event: ConsoleEvent) -> Self {
        match event {
            ConsoleEvent::ReturnChanged(patch) => ServerMessage::ReturnState(patch),
            ConsoleEvent::ChannelChanged(patch) => ServerMessage::ChannelState(patch),
            ConsoleEvent::BusNamesChanged(patch) => ServerMessage::BusNames(patch),
            ConsoleEvent::LivenessChanged {
                state,
                last_console_reply_at,
                last_meter_frame_at,
            } => ServerMessage::ConnectionState {
                state,
                last_console_reply_at,
                last_meter_frame_at,
            },
        }
    }
}
