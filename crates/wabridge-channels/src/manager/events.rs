//! Lifecycle event loop and the reconnect task.

use super::Inner;
use crate::{qr, reconnect::CloseAction};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wabridge_core::{
    error::BridgeError,
    event::{ClientEvent, CloseReason, ConnectionState, InboundMessage, TaggedEvent, UserInfo},
};

/// Consume lifecycle events in arrival order until the manager is dropped.
///
/// A failing reaction is logged and the loop moves on to the next event.
pub(super) async fn run(inner: Weak<Inner>, mut rx: mpsc::Receiver<TaggedEvent>) {
    while let Some(tagged) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if let Err(e) = handle_event(&inner, tagged).await {
            error!("connection event handler failed: {e}");
        }
    }
    debug!("connection event loop stopped");
}

async fn handle_event(inner: &Arc<Inner>, tagged: TaggedEvent) -> Result<(), BridgeError> {
    let TaggedEvent { generation, event } = tagged;
    {
        let shared = inner.shared.lock().await;
        if generation != shared.generation {
            debug!(
                "dropping event from stale session #{generation} (current #{})",
                shared.generation
            );
            return Ok(());
        }
    }

    match event {
        ClientEvent::CredentialsUpdated => {
            debug!(
                "session #{generation}: credentials saved to {}",
                inner.store.path().display()
            );
            Ok(())
        }
        ClientEvent::PairingCode(code) => on_pairing_code(inner, generation, code).await,
        ClientEvent::Open(user) => on_open(inner, generation, user).await,
        ClientEvent::Close(reason) => on_close(inner, generation, reason).await,
        ClientEvent::Inbound(message) => {
            log_inbound(&message);
            Ok(())
        }
    }
}

async fn on_pairing_code(
    inner: &Arc<Inner>,
    generation: u64,
    code: String,
) -> Result<(), BridgeError> {
    {
        let mut shared = inner.shared.lock().await;
        match shared.state {
            ConnectionState::Open => {
                warn!("session #{generation}: ignoring pairing code, connection already open");
                return Ok(());
            }
            state if !state.is_live() => {
                debug!("session #{generation}: ignoring pairing code while {state}");
                return Ok(());
            }
            _ => {}
        }
        shared.pairing_code = Some(code.clone());
        shared.state = ConnectionState::AwaitingPairing;
    }

    info!("new pairing QR code received (scan to link)");
    debug!("QR data: {code}");
    if inner.options.print_qr {
        let rendered = qr::render_terminal(&code)?;
        info!("scan with WhatsApp > Linked devices:\n{rendered}");
    }
    Ok(())
}

async fn on_open(
    inner: &Arc<Inner>,
    generation: u64,
    user: Option<UserInfo>,
) -> Result<(), BridgeError> {
    {
        let mut shared = inner.shared.lock().await;
        if !shared.state.is_live() {
            debug!(
                "session #{generation}: ignoring open while {}",
                shared.state
            );
            return Ok(());
        }
        shared.pairing_code = None;
        shared.state = ConnectionState::Open;
        shared.user = user.clone();
    }

    match user {
        Some(UserInfo { id, name }) => info!(
            "WhatsApp connection opened, connected as {} ({id})",
            name.as_deref().unwrap_or("<unnamed>")
        ),
        None => info!("WhatsApp connection opened"),
    }
    Ok(())
}

async fn on_close(
    inner: &Arc<Inner>,
    generation: u64,
    reason: CloseReason,
) -> Result<(), BridgeError> {
    let action = inner.policy.on_close(reason);
    let (session, was_live) = {
        let mut shared = inner.shared.lock().await;
        let was_live = shared.state.is_live();
        shared.pairing_code = None;
        shared.user = None;
        shared.state = match action {
            CloseAction::Reconnect(_) if !was_live => shared.state,
            CloseAction::Reconnect(_) => ConnectionState::ClosedRetrying,
            CloseAction::WipeSession => ConnectionState::ClosedTerminal,
        };
        (shared.session.take(), was_live)
    };

    warn!("session #{generation}: connection closed, reason: {reason}");
    if let Some(session) = session {
        session.close().await;
    }

    match action {
        CloseAction::Reconnect(_) if !was_live => {
            debug!("session #{generation}: already closed, reconnect already handled");
            Ok(())
        }
        CloseAction::Reconnect(delay) => {
            info!("attempting to reconnect in {}s", delay.as_secs_f64());
            schedule_reconnect(inner, generation, delay);
            Ok(())
        }
        CloseAction::WipeSession => {
            warn!("logged out by the phone, removing session; connect again to re-pair");
            inner.store.wipe()?;
            Ok(())
        }
    }
}

fn log_inbound(message: &InboundMessage) {
    info!(
        "received message: from={}, id={}, text={}",
        message.from,
        message.id,
        message.text.as_deref().unwrap_or("<non-text>")
    );
}

/// Spawn the delayed reconnect for a session that closed unexpectedly.
///
/// Becomes a no-op if anything else opened or closed a session in the
/// meantime. If the new session fails to open, tries again after the same
/// fixed delay.
fn schedule_reconnect(inner: &Arc<Inner>, closed_generation: u64, delay: Duration) {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        let mut generation = closed_generation;
        let mut delay = delay;
        loop {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match inner.reconnect(generation).await {
                Some(failed_generation) => {
                    generation = failed_generation;
                    delay = inner.policy.retry_after_failure();
                    warn!("reconnect failed, retrying in {}s", delay.as_secs_f64());
                }
                None => return,
            }
        }
    });
}

impl Inner {
    /// Reopen after the close of `closed_generation`.
    ///
    /// Returns the generation of a failed attempt so the caller can retry,
    /// `None` when done (reconnected or superseded).
    async fn reconnect(&self, closed_generation: u64) -> Option<u64> {
        let _guard = self.connect_lock.lock().await;
        {
            let shared = self.shared.lock().await;
            if shared.generation != closed_generation
                || shared.state != ConnectionState::ClosedRetrying
            {
                debug!(
                    "reconnect after session #{closed_generation} superseded (now #{} {})",
                    shared.generation, shared.state
                );
                return None;
            }
        }

        info!("reconnecting after close of session #{closed_generation}");
        match self.open_session().await {
            Ok(_) => None,
            Err(_) => Some(self.shared.lock().await.generation),
        }
    }
}
