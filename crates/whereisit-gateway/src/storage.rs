//! Persistence of the signed-in identity between runs
//!
//! Only what is needed to restore silently is stored: the subject, the
//! email, the display name and the refresh token. Identity tokens are
//! never persisted; a restore always refreshes.
//!
//! ## Components
//!
//! - [`IdentityStore`] - Load/save/clear seam used by the identity provider
//! - [`KeyringTokenStorage`] - OS credential store (GNOME Keyring, KWallet, Keychain)
//! - [`FileTokenStore`] - JSON file, for hosts without a secret service

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use whereisit_core::domain::{Email, SubjectId};

/// Keyring service name for the persisted identity
const KEYRING_SERVICE: &str = "whereisit";

/// Keyring username; the client holds a single identity at a time
const KEYRING_USER: &str = "default";

/// What is kept between runs
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedIdentity {
    /// Subject id at the identity service
    pub subject_id: SubjectId,
    /// Email of the identity
    pub email: Email,
    /// Display name, if the identity has one
    #[serde(default)]
    pub display_name: Option<String>,
    /// Long-lived refresh token
    pub refresh_token: String,
}

impl std::fmt::Debug for PersistedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedIdentity")
            .field("subject_id", &self.subject_id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Where the identity provider keeps the identity between runs
pub trait IdentityStore: Send + Sync {
    /// Returns the stored identity, if any
    fn load(&self) -> Result<Option<PersistedIdentity>>;

    /// Replaces the stored identity
    fn save(&self, identity: &PersistedIdentity) -> Result<()>;

    /// Forgets the stored identity; succeeds if nothing was stored
    fn clear(&self) -> Result<()>;
}

// ============================================================================
// KeyringTokenStorage
// ============================================================================

/// Stores the identity in the system keyring
///
/// The identity is serialized as JSON under the service name "whereisit".
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringTokenStorage;

impl KeyringTokenStorage {
    fn entry() -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).context("Failed to create keyring entry")
    }
}

impl IdentityStore for KeyringTokenStorage {
    fn load(&self) -> Result<Option<PersistedIdentity>> {
        match Self::entry()?.get_password() {
            Ok(json) => {
                let identity: PersistedIdentity = serde_json::from_str(&json)
                    .context("Failed to deserialize identity from keyring")?;
                debug!(email = %identity.email, "Loaded identity from keyring");
                Ok(Some(identity))
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No identity found in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    fn save(&self, identity: &PersistedIdentity) -> Result<()> {
        let json = serde_json::to_string(identity).context("Failed to serialize identity")?;
        Self::entry()?
            .set_password(&json)
            .context("Failed to store identity in keyring")?;
        debug!(email = %identity.email, "Stored identity in keyring");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) => {
                info!("Cleared identity from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!("No identity to clear from keyring");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

// ============================================================================
// FileTokenStore
// ============================================================================

/// Stores the identity as JSON in a file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store backed by `path`; the file is created on first save
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `$XDG_DATA_HOME/whereisit/identity.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("whereisit").join("identity.json"))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileTokenStore {
    fn load(&self) -> Result<Option<PersistedIdentity>> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read {}", self.path.display())))
            }
        };
        let identity = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(Some(identity))
    }

    fn save(&self, identity: &PersistedIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(identity).context("Failed to serialize identity")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!(path = %self.path.display(), "Stored identity in file");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to remove {}", self.path.display()))),
        }
    }
}
