//! Connection lifecycle events emitted by the protocol client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Where the single WhatsApp session currently stands.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// `connect` was never called.
    #[default]
    Uninitialized,
    /// A client is running but not yet authenticated (QR may be pending).
    AwaitingPairing,
    /// Authenticated and ready to send.
    Open,
    /// Closed unexpectedly; a reconnect is scheduled.
    ClosedRetrying,
    /// Logged out remotely; session wiped, no reconnect.
    ClosedTerminal,
}

impl ConnectionState {
    /// Whether a session handle is expected to be alive in this state.
    pub fn is_live(self) -> bool {
        matches!(self, Self::AwaitingPairing | Self::Open)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::AwaitingPairing => "awaiting_pairing",
            Self::Open => "open",
            Self::ClosedRetrying => "closed_retrying",
            Self::ClosedTerminal => "closed_terminal",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the protocol connection closed.
///
/// Status codes follow the WhatsApp Web disconnect codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    Forbidden,
    MultideviceMismatch,
    BadSession,
    UnavailableService,
    RestartRequired,
    Unknown(Option<u16>),
}

impl CloseReason {
    pub fn from_status_code(code: u16) -> Self {
        match code {
            428 => Self::ConnectionClosed,
            408 => Self::ConnectionLost,
            440 => Self::ConnectionReplaced,
            401 => Self::LoggedOut,
            403 => Self::Forbidden,
            411 => Self::MultideviceMismatch,
            500 => Self::BadSession,
            503 => Self::UnavailableService,
            515 => Self::RestartRequired,
            other => Self::Unknown(Some(other)),
        }
    }

    pub fn status_code(self) -> Option<u16> {
        match self {
            Self::ConnectionClosed => Some(428),
            Self::ConnectionLost => Some(408),
            Self::ConnectionReplaced => Some(440),
            Self::LoggedOut => Some(401),
            Self::Forbidden => Some(403),
            Self::MultideviceMismatch => Some(411),
            Self::BadSession => Some(500),
            Self::UnavailableService => Some(503),
            Self::RestartRequired => Some(515),
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionClosed => "connection closed",
            Self::ConnectionLost => "connection lost",
            Self::ConnectionReplaced => "connection replaced",
            Self::LoggedOut => "logged out",
            Self::Forbidden => "forbidden",
            Self::MultideviceMismatch => "multi-device mismatch",
            Self::BadSession => "bad session",
            Self::UnavailableService => "service unavailable",
            Self::RestartRequired => "restart required",
            Self::Unknown(_) => "unknown",
        };
        match self.status_code() {
            Some(code) => write!(f, "{name} ({code})"),
            None => f.write_str(name),
        }
    }
}

/// The authenticated account behind an open session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub name: Option<String>,
}

/// A message received on the linked account. Only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Sender (user part of the JID).
    pub from: String,
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Everything the protocol client reports back.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The client persisted fresh credentials into the session store.
    CredentialsUpdated,
    /// A new pairing QR payload is available.
    PairingCode(String),
    /// Authentication succeeded.
    Open(Option<UserInfo>),
    /// The connection is gone.
    Close(CloseReason),
    Inbound(InboundMessage),
}

/// An event stamped with the generation of the session that produced it.
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: ClientEvent,
}

/// Handed to a transport on open; everything the client reports goes here.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::Sender<TaggedEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::Sender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event. Returns `false` once the consumer is gone.
    pub async fn emit(&self, event: ClientEvent) -> bool {
        let tagged = TaggedEvent {
            generation: self.generation,
            event,
        };
        if self.tx.send(tagged).await.is_err() {
            tracing::debug!("event consumer dropped (generation {})", self.generation);
            return false;
        }
        true
    }
}
