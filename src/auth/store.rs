//! The jip credentials file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Auth credentials for a single GitHub host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    pub oauth_token: String,
}

/// Reads and writes `<config-dir>/jip/config.json`, a JSON object mapping
/// host to credentials. The config directory is an explicit field so tests
/// can point the store at a temporary directory.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    config_dir: Option<PathBuf>,
}

impl CredentialStore {
    /// Store rooted at the platform config directory.
    pub fn new() -> Self {
        Self { config_dir: None }
    }

    /// Store rooted at an explicit directory.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: Some(dir.into()),
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        let dir = match &self.config_dir {
            Some(dir) => dir.clone(),
            None => dirs::config_dir().ok_or_else(|| {
                Error::Io(std::io::Error::other("no config directory for this platform"))
            })?,
        };
        Ok(dir.join("jip").join("config.json"))
    }

    /// Reads the credentials file.
    pub fn load(&self) -> Result<HashMap<String, HostConfig>> {
        let path = self.config_path()?;
        let data = fs::read(&path)?;
        let cfg = serde_json::from_slice(&data)
            .map_err(|e| Error::Parse(format!("credentials file {}: {e}", path.display())))?;
        Ok(cfg)
    }

    /// Stores an OAuth token for the given host. The parent directory is
    /// created with mode 0700 and the file written with mode 0600.
    pub fn save_token(&self, host: &str, token: &str) -> Result<()> {
        let mut cfg = self.load().unwrap_or_default();
        cfg.insert(
            host.to_string(),
            HostConfig {
                oauth_token: token.to_string(),
            },
        );

        let path = self.config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, fs::Permissions::from_mode(0o700))?;
            }
        }

        let data = serde_json::to_vec_pretty(&cfg)?;
        fs::write(&path, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}
