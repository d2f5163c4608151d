//! Connection manager: owns the single WhatsApp session of the process.
//!
//! `connect()` is serialized and idempotent: while a session is live
//! (awaiting pairing or open) it hands back the existing handle. Lifecycle
//! events from the protocol client go through one queue and are applied by
//! a single consumer (see `events`). Every session open bumps a generation
//! counter; events stamped with an older generation are dropped.

mod events;

#[cfg(test)]
mod tests;

use crate::{reconnect::ReconnectPolicy, session_store::SessionStore};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use wabridge_core::{
    error::BridgeError,
    event::{ConnectionState, EventSink, TaggedEvent, UserInfo},
    message::{ConnectionStatus, SendOutcome},
    phone::PhoneNumber,
    traits::{Session, Transport},
};

/// Tuning knobs that are not part of the reconnect policy.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Render pairing codes as terminal QR codes in the log.
    pub print_qr: bool,
    /// Capacity of the lifecycle event queue.
    pub event_buffer: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            print_qr: false,
            event_buffer: 64,
        }
    }
}

/// Handle to the connection manager. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: SessionStore,
    policy: ReconnectPolicy,
    options: ManagerOptions,
    shared: Mutex<Shared>,
    /// Held for the whole of a session open so two opens never overlap.
    connect_lock: Mutex<()>,
    events_tx: mpsc::Sender<TaggedEvent>,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    session: Option<Arc<dyn Session>>,
    pairing_code: Option<String>,
    user: Option<UserInfo>,
    generation: u64,
}

impl ConnectionManager {
    /// Build the manager and spawn its event loop on the current runtime.
    pub fn start(
        transport: Arc<dyn Transport>,
        store: SessionStore,
        policy: ReconnectPolicy,
        options: ManagerOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(options.event_buffer.max(1));
        let inner = Arc::new(Inner {
            transport,
            store,
            policy,
            options,
            shared: Mutex::new(Shared::default()),
            connect_lock: Mutex::new(()),
            events_tx,
        });
        tokio::spawn(events::run(Arc::downgrade(&inner), events_rx));
        Self { inner }
    }

    /// Establish the session, or return the live one.
    pub async fn connect(&self) -> Result<Arc<dyn Session>, BridgeError> {
        let _guard = self.inner.connect_lock.lock().await;
        {
            let shared = self.inner.shared.lock().await;
            if shared.state.is_live() {
                if let Some(session) = shared.session.as_ref() {
                    debug!("connect: session #{} already {}", shared.generation, shared.state);
                    return Ok(session.clone());
                }
            }
        }
        self.inner.open_session().await
    }

    pub async fn status(&self) -> ConnectionStatus {
        let shared = self.inner.shared.lock().await;
        ConnectionStatus {
            is_connected: shared.state == ConnectionState::Open,
            qr_code: shared.pairing_code.clone(),
            state: shared.state,
            user: shared.user.clone(),
        }
    }

    /// Current pairing QR payload, present only while not open.
    pub async fn pairing_code(&self) -> Option<String> {
        self.inner.shared.lock().await.pairing_code.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.shared.lock().await.state
    }

    /// Account behind the open session.
    pub async fn user(&self) -> Option<UserInfo> {
        self.inner.shared.lock().await.user.clone()
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn transport_name(&self) -> &str {
        self.inner.transport.name()
    }

    /// Validate `destination` and send `body` as a text message.
    ///
    /// Only "never connected" is an `Err`. Once a connection has existed,
    /// a missing session (closed, reconnecting, logged out), validation and
    /// transport failures all come back as a failed [`SendOutcome`].
    pub async fn send_text(
        &self,
        destination: &str,
        body: &str,
    ) -> Result<SendOutcome, BridgeError> {
        let (session, state) = {
            let shared = self.inner.shared.lock().await;
            (shared.session.clone(), shared.state)
        };
        let Some(session) = session else {
            if state == ConnectionState::Uninitialized {
                return Err(BridgeError::NotConnected);
            }
            warn!("send to '{destination}' while {state}, no live session");
            return Ok(SendOutcome::failed(BridgeError::NotConnected));
        };

        let phone = match PhoneNumber::parse(destination) {
            Ok(phone) => phone,
            Err(e) => {
                warn!("rejected destination '{destination}': {e}");
                return Ok(SendOutcome::failed(e));
            }
        };

        let jid = phone.jid();
        match session.send_text(&jid, body).await {
            Ok(message_id) if !message_id.is_empty() => {
                info!("message sent: id={message_id}, to={jid}");
                Ok(SendOutcome::sent(message_id))
            }
            Ok(_) => {
                error!("send to {jid} returned no message id");
                Ok(SendOutcome::failed("Failed to send message"))
            }
            Err(e) => {
                error!("error sending message to {jid}: {e}");
                Ok(SendOutcome::failed(e))
            }
        }
    }

    /// Drop the session for good: close it, wipe the credentials, and stay
    /// down until the next explicit `connect()`.
    pub async fn logout(&self) -> Result<(), BridgeError> {
        let _guard = self.inner.connect_lock.lock().await;
        let session = {
            let mut shared = self.inner.shared.lock().await;
            shared.generation += 1;
            shared.state = ConnectionState::ClosedTerminal;
            shared.pairing_code = None;
            shared.user = None;
            shared.session.take()
        };
        if let Some(session) = session {
            session.close().await;
        }
        self.inner.store.wipe()?;
        info!("logged out, session store removed");
        Ok(())
    }
}

impl Inner {
    /// Open a fresh session. Caller must hold `connect_lock`.
    async fn open_session(&self) -> Result<Arc<dyn Session>, BridgeError> {
        self.store.ensure()?;

        let (generation, previous, leftover) = {
            let mut shared = self.shared.lock().await;
            shared.generation += 1;
            let previous = shared.state;
            shared.state = ConnectionState::AwaitingPairing;
            shared.pairing_code = None;
            shared.user = None;
            (shared.generation, previous, shared.session.take())
        };
        if let Some(old) = leftover {
            old.close().await;
        }

        info!(
            "opening WhatsApp session #{generation} via {} (credentials: {})",
            self.transport.name(),
            self.store.path().display()
        );
        let sink = EventSink::new(generation, self.events_tx.clone());

        match self.transport.open(self.store.path(), sink).await {
            Ok(session) => {
                let keep = {
                    let mut shared = self.shared.lock().await;
                    let keep = shared.generation == generation && shared.state.is_live();
                    if keep {
                        shared.session = Some(session.clone());
                    }
                    keep
                };
                if !keep {
                    // Closed (or superseded) before `open` even returned.
                    warn!("session #{generation} closed during open, discarding handle");
                    session.close().await;
                }
                Ok(session)
            }
            Err(e) => {
                let mut shared = self.shared.lock().await;
                if shared.generation == generation {
                    shared.state = previous;
                }
                error!("failed to open WhatsApp session #{generation}: {e}");
                Err(e)
            }
        }
    }
}
