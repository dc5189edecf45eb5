//! mixbridge-test-harness: Mock console links and a scripted UDP console
//! for testing mixbridge.
//!
//! This crate provides [`MockLink`] for deterministic unit testing of the
//! session and relay without a socket, and [`MockConsole`] for tests that
//! run the bridge against a real UDP socket on localhost.

pub mod mock_console;
pub mod mock_link;

pub use mock_console::MockConsole;
pub use mock_link::MockLink;
