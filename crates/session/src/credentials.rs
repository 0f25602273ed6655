//! Account credentials and their on-disk store.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CredentialError;

/// Device credentials used to log in.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub account_id: String,
    pub device_id: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("device_id", &self.device_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Boxed future returned by [`CredentialPrompt::request`].
pub type PromptFuture<'a> = Pin<Box<dyn Future<Output = Option<Credentials>> + Send + 'a>>;

/// Source of fresh credentials when none are stored.
pub trait CredentialPrompt: Send + Sync {
    /// Asks for credentials. `None` means none could be obtained.
    fn request(&self) -> PromptFuture<'_>;
}

/// Persistent credential store.
///
/// The credentials are cached in memory and persisted to a JSON file.
pub struct CredentialStore {
    path: PathBuf,
    current: RwLock<Option<Credentials>>,
}

impl CredentialStore {
    /// Creates a store, loading existing credentials from disk.
    pub fn new(path: PathBuf) -> Result<Self, CredentialError> {
        let current = load_credentials(&path)?;
        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }

    /// Returns the stored credentials, if any.
    pub fn get(&self) -> Option<Credentials> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the stored credentials.
    pub fn save(&self, credentials: &Credentials) -> Result<(), CredentialError> {
        let json = serde_json::to_string_pretty(credentials)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        debug!("persisted credentials to {:?}", self.path);
        Ok(())
    }

    /// Discards the stored credentials, in memory and on disk.
    pub fn clear(&self) -> Result<(), CredentialError> {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("removed credentials file {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Loads credentials from a JSON file on disk.
fn load_credentials(path: &Path) -> Result<Option<Credentials>, CredentialError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let credentials: Credentials = serde_json::from_str(&data)?;
    debug!("loaded credentials from {:?}", path);
    Ok(Some(credentials))
}
