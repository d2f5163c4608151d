use thiserror::Error;

use crate::phone::PhoneError;

/// Top-level error type for wabridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No session handle exists yet (nobody called `connect`).
    #[error("WhatsApp connection not established")]
    NotConnected,

    /// Error from the protocol client (open, send, close).
    #[error("transport error: {0}")]
    Transport(String),

    /// Session store could not be created or removed.
    #[error("session store error: {0}")]
    SessionStore(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Destination rejected by the phone-number policy.
    #[error(transparent)]
    InvalidPhone(#[from] PhoneError),

    /// QR rendering error.
    #[error("qr error: {0}")]
    Qr(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
