//! Refresh token persistence for the CLI. The library itself never touches disk.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

const FILE_NAME: &str = "session.toml";

/// TOML file holding the last issued refresh token.
///
/// # Example
/// ```no_run
/// use crestwatch::cli::store::RefreshTokenFile;
///
/// let store = RefreshTokenFile::new_default();
/// store.save("refresh-token")?;
/// assert_eq!(store.load()?.as_deref(), Some("refresh-token"));
/// # Ok::<(), crestwatch::error::SessionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RefreshTokenFile {
    path: PathBuf,
}

impl RefreshTokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.crestwatch/session.toml`.
    pub fn new_default() -> Self {
        Self::new(default_dir().join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<String>, SessionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: SessionFile = toml::from_str(&raw).map_err(|e| {
            SessionError::Configuration(format!("invalid {}: {e}", self.path.display()))
        })?;
        Ok(Some(file.refresh_token).filter(|token| !token.trim().is_empty()))
    }

    pub fn save(&self, refresh_token: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = SessionFile {
            version: 1,
            refresh_token: refresh_token.to_string(),
            saved_at: Utc::now(),
        };
        let serialized = toml::to_string(&file)
            .map_err(|e| SessionError::Configuration(format!("cannot serialize session: {e}")))?;
        // Owner-only from creation on; an existing file is truncated and
        // tightened before the token is written.
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut out = options.open(&self.path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            out.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        out.write_all(serialized.as_bytes())?;
        Ok(())
    }

    /// Remove the file. A missing file is not an error.
    pub fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    refresh_token: String,
    saved_at: DateTime<Utc>,
}

fn default_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".crestwatch"))
        .unwrap_or_else(|| PathBuf::from(".crestwatch"))
}
