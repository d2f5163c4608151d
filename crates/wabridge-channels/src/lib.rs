//! # wabridge-channels
//!
//! WhatsApp connection lifecycle: session store, connection manager,
//! reconnect policy, QR rendering, and the `whatsapp-rust` transport.

pub mod manager;
pub mod qr;
pub mod reconnect;
pub mod session_store;
#[cfg(feature = "whatsapp-web")]
pub mod whatsapp;

pub use manager::{ConnectionManager, ManagerOptions};
pub use reconnect::{CloseAction, ReconnectPolicy};
pub use session_store::SessionStore;
