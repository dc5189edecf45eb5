//! mixbridge-core: Core types, traits, and error definitions for mixbridge.
//!
//! This crate defines the console-agnostic vocabulary shared by the codec,
//! session, relay, and transport crates.
//!
//! # Key types
//!
//! - [`ConsoleLink`] -- datagram channel to the console
//! - [`ConsoleEvent`] -- console-derived state change notifications
//! - [`LivenessState`] -- OFFLINE / STALE / LIVE session health
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::ConsoleEvent;
pub use transport::ConsoleLink;
pub use types::*;
