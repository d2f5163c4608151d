//! What to do when the connection closes.
//!
//! The delay is fixed: every unexpected close waits the same amount of time
//! before the next attempt, regardless of how many attempts came before.

use std::time::Duration;
use wabridge_core::event::CloseReason;

/// Reaction to a close event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Wait, then open a new session with the stored credentials.
    Reconnect(Duration),
    /// Credentials were revoked: delete them and stay down.
    WipeSession,
}

/// Fixed-delay reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(10))
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn on_close(&self, reason: CloseReason) -> CloseAction {
        match reason {
            CloseReason::LoggedOut => CloseAction::WipeSession,
            CloseReason::ConnectionClosed
            | CloseReason::ConnectionLost
            | CloseReason::ConnectionReplaced
            | CloseReason::Forbidden
            | CloseReason::MultideviceMismatch
            | CloseReason::BadSession
            | CloseReason::UnavailableService
            | CloseReason::RestartRequired
            | CloseReason::Unknown(_) => CloseAction::Reconnect(self.delay),
        }
    }

    /// Delay used after a reconnect attempt failed to open at all.
    pub fn retry_after_failure(&self) -> Duration {
        self.delay
    }
}
