//! On-disk location of the WhatsApp credentials.
//!
//! The protocol client owns the contents; this only picks the directory,
//! makes sure it exists before a session opens, and removes it on logout.

use std::path::{Path, PathBuf};
use tracing::info;
use wabridge_core::error::BridgeError;

/// Directory holding the session credentials.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Whether the client has written anything yet (i.e. a prior pairing).
    pub fn has_credentials(&self) -> bool {
        std::fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Create the directory if needed.
    pub fn ensure(&self) -> Result<(), BridgeError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            BridgeError::SessionStore(format!("failed to create {}: {e}", self.dir.display()))
        })
    }

    /// Delete the whole directory. Returns `false` if there was nothing to delete.
    pub fn wipe(&self) -> Result<bool, BridgeError> {
        if !self.dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&self.dir).map_err(|e| {
            BridgeError::SessionStore(format!("failed to remove {}: {e}", self.dir.display()))
        })?;
        info!("cleaned up session directory: {}", self.dir.display());
        Ok(true)
    }
}
