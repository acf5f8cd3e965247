//! The client's settings file.
//!
//! The client rewrites this file on some updates, so after each write the
//! file is marked read-only. Writing first clears that bit again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use cdbl_config::{log_flags_debug, log_flags_warn};
use serde_json::Value;

use crate::{to_pretty_json, FlagError, FlagOperationResult, FlagSet, Result};

#[derive(Debug, Clone)]
pub struct FlagStore {
    path: PathBuf,
}

impl FlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Current flags. Missing or unparsable files read as empty.
    pub fn load(&self) -> FlagSet {
        if !self.path.exists() {
            return FlagSet::new();
        }
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                log_flags_warn!("Settings file unreadable", path = %self.path.display(), error = %e);
                return FlagSet::new();
            }
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => FlagSet::from_json_map(map),
            Ok(_) => {
                log_flags_warn!("Settings file is not a JSON object", path = %self.path.display());
                FlagSet::new()
            }
            Err(e) => {
                log_flags_warn!("Settings file is not valid JSON", path = %self.path.display(), error = %e);
                FlagSet::new()
            }
        }
    }

    /// Write `flags`, returning whether it succeeded.
    pub fn save(&self, flags: &FlagSet, set_readonly: bool) -> bool {
        match self.try_save(flags, set_readonly) {
            Ok(()) => true,
            Err(e) => {
                log_flags_warn!("Settings write failed", error = %e);
                false
            }
        }
    }

    pub fn try_save(&self, flags: &FlagSet, set_readonly: bool) -> Result<()> {
        let wrap = |source: io::Error| FlagError::SettingsWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        if self.path.exists() {
            set_writable(&self.path).map_err(wrap)?;
        }

        let bytes = to_pretty_json(flags)?;
        fs::write(&self.path, bytes).map_err(wrap)?;

        if set_readonly {
            // A write that landed but could not be locked still counts.
            if let Err(e) = set_readonly_bit(&self.path) {
                log_flags_warn!("Could not mark settings read-only", error = %e);
            }
        }
        log_flags_debug!("Settings written", path = %self.path.display(), count = flags.len());
        Ok(())
    }

    pub fn is_readonly(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.permissions().readonly())
            .unwrap_or(false)
    }

    /// Give the settings file back its write permission.
    pub fn unlock(&self) -> FlagOperationResult {
        if !self.path.exists() {
            return FlagOperationResult::failed(format!(
                "{} does not exist",
                self.path.display()
            ));
        }
        match set_writable(&self.path) {
            Ok(()) => FlagOperationResult::ok("Settings file permissions restored (read-only removed)"),
            Err(e) => FlagOperationResult::failed(format!(
                "Failed to remove read-only attribute: {e}"
            )),
        }
    }
}

fn set_readonly_bit(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)
}

fn set_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FlagStore) {
        let temp = TempDir::new().unwrap();
        let store = FlagStore::new(temp.path().join("ClientSettings").join("IxpSettings.json"));
        (temp, store)
    }

    #[test]
    fn test_load_missing_is_empty() {
        let (_t, store) = store();
        assert!(store.load().is_empty());
        assert!(!store.is_readonly());
    }

    #[test]
    fn test_load_garbage_is_empty() {
        let (_t, store) = store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_empty());

        fs::write(store.path(), "[1, 2]").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_creates_dir_and_marks_readonly() {
        let (_t, store) = store();
        let flags: FlagSet = [("FFlagFoo", "True")].into_iter().collect();

        assert!(store.save(&flags, true));
        assert!(store.is_readonly());
        assert_eq!(store.load(), flags);

        // Rewriting a read-only file works
        let more: FlagSet = [("FFlagFoo", "False")].into_iter().collect();
        assert!(store.save(&more, true));
        assert_eq!(store.load().get("FFlagFoo"), Some("False"));
    }

    #[test]
    fn test_save_without_readonly() {
        let (_t, store) = store();
        assert!(store.save(&FlagSet::new(), false));
        assert!(!store.is_readonly());
        assert_eq!(fs::read_to_string(store.path()).unwrap(), "{}");
    }

    #[test]
    fn test_unlock() {
        let (_t, store) = store();
        assert!(!store.unlock().success);

        assert!(store.save(&FlagSet::new(), true));
        assert!(store.is_readonly());

        let result = store.unlock();
        assert!(result.success, "{}", result.message);
        assert!(!store.is_readonly());
    }

    #[test]
    fn test_save_failure_reports_error() {
        let temp = TempDir::new().unwrap();
        // Parent path is a regular file, so the directory cannot be created
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let store = FlagStore::new(blocker.join("IxpSettings.json"));

        let err = store.try_save(&FlagSet::new(), false).unwrap_err();
        assert!(matches!(err, FlagError::SettingsWrite { .. }));
        assert!(!store.save(&FlagSet::new(), false));
    }
}
