// ABOUTME: Project-local credential override read from the working directory
// ABOUTME: Takes precedence over the per-user registry when present

use crate::{model::AccountRecord, storage::write_atomic, Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const LOCAL_FILE_NAME: &str = ".googlerc.json";

pub struct LocalOverride {
    path: PathBuf,
}

impl LocalOverride {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        LocalOverride {
            path: dir.as_ref().join(LOCAL_FILE_NAME),
        }
    }

    pub fn current_dir() -> Result<Self> {
        Ok(Self::in_dir(std::env::current_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// A missing file is `None`; a file that exists but does not parse is an error,
    /// since it is usually hand-edited.
    pub fn read(&self) -> Result<Option<AccountRecord>> {
        if !self.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let record: AccountRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    /// Written owner-only, the same as the per-user store.
    pub fn write(&self, record: &AccountRecord) -> Result<()> {
        let content = serde_json::to_string_pretty(record)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        write_atomic(&self.path, content.as_bytes(), dir)?;
        info!(path = %self.path.display(), account = %record.profile.email, "wrote local credentials");
        Ok(())
    }

    /// Fails only when there is no file. A file that does not parse is still
    /// deleted and reported as `None`.
    pub fn remove(&self) -> Result<Option<AccountRecord>> {
        if !self.exists() {
            return Err(Error::NotFound(format!(
                "no local credentials at {}",
                self.path.display()
            )));
        }

        let record = match self.read() {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "removing unreadable local credentials");
                None
            }
        };
        fs::remove_file(&self.path)?;
        info!(path = %self.path.display(), "removed local credentials");
        Ok(record)
    }
}
