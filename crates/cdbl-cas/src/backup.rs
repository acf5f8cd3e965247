//! Single-generation backups kept next to the file they protect.
//!
//! A backup is only ever created once per original path. Later swaps leave
//! it alone, so restoring always returns the client's unmodified content
//! rather than an intermediate replacement.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use cdbl_config::{log_swap_debug, log_swap_warn, DEFAULT_BACKUP_SUFFIX};

use crate::{Result, SwapError};

#[derive(Debug, Clone)]
pub struct BackupVault {
    suffix: String,
}

impl Default for BackupVault {
    fn default() -> Self {
        Self::new(DEFAULT_BACKUP_SUFFIX)
    }
}

impl BackupVault {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `<original>` + suffix, in the same directory.
    pub fn backup_path(&self, original: &Path) -> PathBuf {
        let mut name = OsString::from(original.as_os_str());
        name.push(&self.suffix);
        PathBuf::from(name)
    }

    pub fn has_backup(&self, original: &Path) -> bool {
        self.backup_path(original).is_file()
    }

    /// Copy `original` to its backup sibling unless one already exists.
    ///
    /// Returns whether a backup exists after the call. The copy goes through
    /// a temp file and a rename so a crash never leaves a truncated backup
    /// that would then be treated as authoritative.
    pub fn create_if_absent(&self, original: &Path) -> bool {
        let backup = self.backup_path(original);
        if backup.is_file() {
            log_swap_debug!("Backup already present", path = %backup.display());
            return true;
        }
        if !original.is_file() {
            return false;
        }

        let mut tmp_name = OsString::from(backup.as_os_str());
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let copied = fs::copy(original, &tmp).and_then(|_| fs::rename(&tmp, &backup));
        match copied {
            Ok(()) => {
                log_swap_debug!("Backup created", path = %backup.display());
                true
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                log_swap_warn!("Backup failed", path = %original.display(), error = %e);
                false
            }
        }
    }

    /// Copy the backup sibling back over `original`.
    ///
    /// The backup itself is kept.
    pub fn restore(&self, original: &Path) -> Result<()> {
        let backup = self.backup_path(original);
        if !backup.is_file() {
            return Err(SwapError::NoBackupFound {
                path: original.to_path_buf(),
            });
        }
        fs::copy(&backup, original)?;
        log_swap_debug!("Restored from backup", path = %original.display());
        Ok(())
    }
}
