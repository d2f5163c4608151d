use crate::{error::BridgeError, event::EventSink};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Protocol client factory.
///
/// Each `open` starts a fresh client that loads and saves its credentials
/// under `session_dir` and reports lifecycle events into `events`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name.
    fn name(&self) -> &str;

    /// Start a client session.
    async fn open(
        &self,
        session_dir: &Path,
        events: EventSink,
    ) -> Result<Arc<dyn Session>, BridgeError>;
}

/// A running protocol client.
#[async_trait]
pub trait Session: Send + Sync {
    /// Send a text message to a JID and wait for the server ack.
    /// Returns the message ID.
    async fn send_text(&self, jid: &str, text: &str) -> Result<String, BridgeError>;

    /// Tear the client down. Must be safe to call more than once.
    async fn close(&self);
}
