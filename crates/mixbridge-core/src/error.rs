//! Error types for mixbridge.
//!
//! All fallible operations across the bridge return [`Result<T>`], which uses
//! [`Error`] as the error type. Socket failures, console protocol problems and
//! bad configuration are all captured here.

/// The error type for all mixbridge operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (UDP socket, WebSocket listener).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed console frame, bad client message).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for a datagram.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a console command.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The console link is not open.
    #[error("not connected")]
    NotConnected,

    /// The console link was closed underneath us.
    #[error("connection lost")]
    ConnectionLost,

    /// Invalid bridge configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
