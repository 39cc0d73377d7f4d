//! Session token storage for the delivery-status stream.
//!
//! The dashboard keeps the session's bearer token under the well-known key
//! `token`. The transport only ever reads it through [`CredentialSource`];
//! a missing token means "cannot connect", never an error.
//!
//! # Storage
//!
//! Production: OS keyring entry `prima/token`.
//! Test mode (`PRIMA_ENV=test`) or an explicit path: JSON file
//! `{ "token": "..." }` with owner-only permissions.

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Keyring service name.
const KEYRING_SERVICE: &str = "prima";
/// Well-known key holding the session token.
pub const TOKEN_KEY: &str = "token";

/// Source of the bearer token used to open the stream.
pub trait CredentialSource: Send + Sync + std::fmt::Debug {
    /// Current session token, or `None` if the user is not signed in.
    ///
    /// Empty tokens are reported as `None`.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token (or none), e.g. from `PRIMA_TOKEN`.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// Wrap `token`; an empty string counts as absent.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self((!token.is_empty()).then_some(token))
    }

    /// No token at all.
    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// On-disk shape of the file-backed store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

/// Persisted session token store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStore {
    /// OS keyring (macOS Keychain, Secret Service, Windows Credential Manager).
    Keyring,
    /// JSON file at the given path.
    File(PathBuf),
}

impl TokenStore {
    /// Store appropriate for the current environment.
    ///
    /// Test mode uses `<config_dir>/session.json` so tests never touch the
    /// real keyring.
    pub fn for_environment() -> Result<Self> {
        if crate::env::should_skip_keyring() {
            let dir = crate::config::Config::config_dir()?;
            Ok(Self::File(dir.join("session.json")))
        } else {
            Ok(Self::Keyring)
        }
    }

    /// Read the stored token.
    pub fn load(&self) -> Result<Option<String>> {
        match self {
            Self::Keyring => {
                let entry = Self::keyring_entry()?;
                match entry.get_password() {
                    Ok(token) => Ok(Some(token)),
                    Err(keyring::Error::NoEntry) => Ok(None),
                    Err(e) => Err(anyhow::anyhow!("Failed to read session token: {e:?}")),
                }
            }
            Self::File(path) => {
                if !path.exists() {
                    return Ok(None);
                }
                let content = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let session: SessionFile = serde_json::from_str(&content)
                    .with_context(|| format!("corrupted session file {}", path.display()))?;
                Ok(session.token)
            }
        }
    }

    /// Persist `token` as the session token.
    pub fn set_token(&self, token: &str) -> Result<()> {
        match self {
            Self::Keyring => {
                Self::keyring_entry()?
                    .set_password(token)
                    .map_err(|e| anyhow::anyhow!("Failed to store session token: {e:?}"))?;
                log::info!("Saved session token to OS keyring");
            }
            Self::File(path) => {
                let session = SessionFile {
                    token: Some(token.to_string()),
                };
                write_private(path, &serde_json::to_string_pretty(&session)?)?;
                log::debug!("Saved session token to {}", path.display());
            }
        }
        Ok(())
    }

    /// Remove the session token (logout).
    pub fn clear(&self) -> Result<()> {
        match self {
            Self::Keyring => {
                match Self::keyring_entry()?.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => {}
                    Err(e) => anyhow::bail!("Failed to delete session token: {e:?}"),
                }
                log::info!("Deleted session token from OS keyring");
            }
            Self::File(path) => {
                if path.exists() {
                    fs::remove_file(path)
                        .with_context(|| format!("failed to remove {}", path.display()))?;
                }
            }
        }
        Ok(())
    }

    fn keyring_entry() -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, TOKEN_KEY)
            .map_err(|e| anyhow::anyhow!("Failed to create keyring entry: {e:?}"))
    }
}

impl CredentialSource for TokenStore {
    fn bearer_token(&self) -> Option<String> {
        match self.load() {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                log::warn!("Session token unavailable: {:#}", e);
                None
            }
        }
    }
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}
