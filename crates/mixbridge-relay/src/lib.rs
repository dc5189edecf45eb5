//! Client-facing relay for mixbridge.
//!
//! - [`protocol`] -- the JSON message types exchanged with clients.
//! - [`hub`] -- the event loop that owns the console session, gates control
//!   writes on liveness, and fans state out to clients.
//! - [`schedule`] -- cancelable one-shot tasks (session recovery).
//! - [`server`] -- the WebSocket endpoint clients connect to.

pub mod hub;
pub mod protocol;
pub mod schedule;
pub mod server;

pub use hub::{ClientConnection, ClientId, HubHandle, HubOptions, spawn_hub};
pub use protocol::{ClientMessage, ErrorCode, PROTOCOL_VERSION, ServerMessage};
pub use server::WsServer;
