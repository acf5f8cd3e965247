//! Hash-pair asset substitution.
//!
//! Every operation returns a [`SwapResult`]; nothing here panics or
//! propagates an error to the caller.

use std::fs;
use std::path::{Path, PathBuf};

use cdbl_config::{log_swap_info, log_swap_warn};
use serde::{Deserialize, Serialize};

use crate::{BackupVault, ContentStore, Result, SwapError, SwapErrorKind};

/// What a successful operation did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapAction {
    /// An existing cache file was backed up and overwritten
    Swapped,
    /// The target was absent and the replacement was copied in
    Placed,
    /// A cache file was restored from its backup sibling
    Restored,
    /// A placed file with no backup was deleted
    Removed,
}

/// Outcome of a single swap, place or restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResult {
    pub success: bool,
    pub message: String,
    pub errors: Vec<String>,
    /// The cache-side hash the operation targeted
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SwapAction>,
    /// Cache file written on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SwapErrorKind>,
}

impl SwapResult {
    fn ok(hash: &str, action: SwapAction, path: PathBuf) -> Self {
        let message = match action {
            SwapAction::Swapped => format!("Successfully swapped asset {hash}"),
            SwapAction::Placed => format!("Placed new asset {hash} in cache"),
            SwapAction::Restored => format!("Successfully restored asset {hash}"),
            SwapAction::Removed => format!("Removed placed asset {hash} from cache"),
        };
        Self {
            success: true,
            message,
            errors: Vec::new(),
            hash: hash.to_string(),
            action: Some(action),
            path: Some(path),
            error_kind: None,
        }
    }

    fn failed(hash: &str, err: &SwapError) -> Self {
        let message = err.to_string();
        Self {
            success: false,
            errors: vec![message.clone()],
            message,
            hash: hash.to_string(),
            action: None,
            path: None,
            error_kind: Some(err.kind()),
        }
    }

    fn from_outcome(hash: &str, outcome: Result<(SwapAction, PathBuf)>) -> Self {
        match outcome {
            Ok((action, path)) => {
                log_swap_info!("Asset updated", hash = hash, action = ?action, path = %path.display());
                Self::ok(hash, action, path)
            }
            Err(e) => {
                log_swap_warn!("Asset operation failed", hash = hash, error = %e);
                Self::failed(hash, &e)
            }
        }
    }
}

/// Where a replacement may land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// An existing cache file only
    Cached,
    /// An existing cache file, or a new one under the target hash
    Anywhere,
    /// A slot placed earlier, overwritten without a backup
    Placed,
}

/// find-replacement → backup-original → overwrite-original
#[derive(Debug, Clone)]
pub struct AssetSwapper {
    store: ContentStore,
    vault: BackupVault,
}

impl Default for AssetSwapper {
    fn default() -> Self {
        Self::new(ContentStore::default(), BackupVault::default())
    }
}

impl AssetSwapper {
    pub fn new(store: ContentStore, vault: BackupVault) -> Self {
        // Backup siblings must never be mistaken for assets.
        let store = store.with_skip_suffix(vault.suffix());
        Self { store, vault }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn vault(&self) -> &BackupVault {
        &self.vault
    }

    /// Replace an asset that must already be in the cache.
    pub fn swap(
        &self,
        original_hash: &str,
        replacement_hash: &str,
        cache_root: &Path,
        assets_root: &Path,
    ) -> SwapResult {
        let outcome =
            self.replace(original_hash, replacement_hash, cache_root, assets_root, Target::Cached);
        SwapResult::from_outcome(original_hash, outcome)
    }

    /// Replace an asset, or create it under `target_hash` when the client
    /// has not cached it yet.
    pub fn place_or_swap(
        &self,
        target_hash: &str,
        replacement_hash: &str,
        cache_root: &Path,
        assets_root: &Path,
    ) -> SwapResult {
        let outcome =
            self.replace(target_hash, replacement_hash, cache_root, assets_root, Target::Anywhere);
        SwapResult::from_outcome(target_hash, outcome)
    }

    /// Rewrite a slot this tool placed earlier. No backup is taken, so the
    /// slot stays removable.
    pub fn replace_placed(
        &self,
        target_hash: &str,
        replacement_hash: &str,
        cache_root: &Path,
        assets_root: &Path,
    ) -> SwapResult {
        let outcome =
            self.replace(target_hash, replacement_hash, cache_root, assets_root, Target::Placed);
        SwapResult::from_outcome(target_hash, outcome)
    }

    /// Put a swapped asset back from its backup sibling.
    pub fn restore(&self, asset_hash: &str, cache_root: &Path) -> SwapResult {
        let outcome = self.restore_inner(asset_hash, cache_root);
        SwapResult::from_outcome(asset_hash, outcome)
    }

    /// Undo this tool's change to an asset: restore its backup when there
    /// is one, otherwise delete the file, which can only have been placed.
    pub fn revert(&self, asset_hash: &str, cache_root: &Path) -> SwapResult {
        let outcome = self.revert_inner(asset_hash, cache_root);
        SwapResult::from_outcome(asset_hash, outcome)
    }

    /// Delete a slot this tool placed, along with any backup sibling a
    /// later swap may have taken of it.
    pub fn remove_placed(&self, asset_hash: &str, cache_root: &Path) -> SwapResult {
        let outcome = self.remove_placed_inner(asset_hash, cache_root);
        SwapResult::from_outcome(asset_hash, outcome)
    }

    fn replace(
        &self,
        target_hash: &str,
        replacement_hash: &str,
        cache_root: &Path,
        assets_root: &Path,
        target: Target,
    ) -> Result<(SwapAction, PathBuf)> {
        if !cache_root.is_dir() {
            return Err(SwapError::CacheRootMissing {
                path: cache_root.to_path_buf(),
            });
        }

        let replacement = self
            .store
            .find(replacement_hash, assets_root)
            .ok_or_else(|| SwapError::ReplacementNotFound {
                hash: replacement_hash.to_string(),
            })?;

        match (self.store.find_by_name(target_hash, cache_root), target) {
            // Our own earlier placement: its content is not the client's,
            // so it must not become a backup.
            (Some(existing), Target::Placed) => {
                fs::copy(&replacement, &existing)?;
                Ok((SwapAction::Placed, existing))
            }
            (Some(original), _) => {
                if !self.vault.create_if_absent(&original) {
                    return Err(SwapError::BackupFailed { path: original });
                }
                fs::copy(&replacement, &original)?;
                Ok((SwapAction::Swapped, original))
            }
            (None, Target::Cached) => Err(SwapError::OriginalNotFound {
                hash: target_hash.to_string(),
            }),
            (None, _) => {
                let destination = cache_root.join(target_hash);
                fs::copy(&replacement, &destination)?;
                Ok((SwapAction::Placed, destination))
            }
        }
    }

    fn restore_inner(&self, asset_hash: &str, cache_root: &Path) -> Result<(SwapAction, PathBuf)> {
        if !cache_root.is_dir() {
            return Err(SwapError::CacheRootMissing {
                path: cache_root.to_path_buf(),
            });
        }
        let path = self
            .store
            .find_by_name(asset_hash, cache_root)
            .ok_or_else(|| SwapError::OriginalNotFound {
                hash: asset_hash.to_string(),
            })?;
        self.vault.restore(&path)?;
        Ok((SwapAction::Restored, path))
    }

    fn revert_inner(&self, asset_hash: &str, cache_root: &Path) -> Result<(SwapAction, PathBuf)> {
        if !cache_root.is_dir() {
            return Err(SwapError::CacheRootMissing {
                path: cache_root.to_path_buf(),
            });
        }
        let path = self
            .store
            .find_by_name(asset_hash, cache_root)
            .ok_or_else(|| SwapError::OriginalNotFound {
                hash: asset_hash.to_string(),
            })?;
        if self.vault.has_backup(&path) {
            self.vault.restore(&path)?;
            Ok((SwapAction::Restored, path))
        } else {
            fs::remove_file(&path)?;
            Ok((SwapAction::Removed, path))
        }
    }

    fn remove_placed_inner(&self, asset_hash: &str, cache_root: &Path) -> Result<(SwapAction, PathBuf)> {
        if !cache_root.is_dir() {
            return Err(SwapError::CacheRootMissing {
                path: cache_root.to_path_buf(),
            });
        }
        let path = self
            .store
            .find_by_name(asset_hash, cache_root)
            .ok_or_else(|| SwapError::OriginalNotFound {
                hash: asset_hash.to_string(),
            })?;
        fs::remove_file(&path)?;
        let backup = self.vault.backup_path(&path);
        if backup.is_file() {
            fs::remove_file(&backup)?;
        }
        Ok((SwapAction::Removed, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Dirs {
        _temp: TempDir,
        cache: PathBuf,
        assets: PathBuf,
    }

    fn dirs() -> Dirs {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        let assets = temp.path().join("assets");
        fs::create_dir_all(&cache).unwrap();
        fs::create_dir_all(&assets).unwrap();
        Dirs {
            _temp: temp,
            cache,
            assets,
        }
    }

    #[test]
    fn test_swap_backs_up_then_overwrites() {
        let d = dirs();
        fs::write(d.cache.join("orig"), b"original").unwrap();
        fs::write(d.assets.join("repl"), b"replacement").unwrap();

        let swapper = AssetSwapper::default();
        let result = swapper.swap("orig", "repl", &d.cache, &d.assets);

        assert!(result.success, "{}", result.message);
        assert_eq!(result.action, Some(SwapAction::Swapped));
        assert_eq!(fs::read(d.cache.join("orig")).unwrap(), b"replacement");
        assert_eq!(
            fs::read(d.cache.join("orig.cdbl_backup")).unwrap(),
            b"original"
        );
    }

    #[test]
    fn test_second_swap_keeps_first_backup() {
        let d = dirs();
        fs::write(d.cache.join("orig"), b"original").unwrap();
        fs::write(d.assets.join("r1"), b"one").unwrap();
        fs::write(d.assets.join("r2"), b"two").unwrap();

        let swapper = AssetSwapper::default();
        assert!(swapper.swap("orig", "r1", &d.cache, &d.assets).success);
        assert!(swapper.swap("orig", "r2", &d.cache, &d.assets).success);

        assert_eq!(fs::read(d.cache.join("orig")).unwrap(), b"two");
        assert_eq!(
            fs::read(d.cache.join("orig.cdbl_backup")).unwrap(),
            b"original"
        );
    }

    #[test]
    fn test_swap_requires_original() {
        let d = dirs();
        fs::write(d.assets.join("repl"), b"replacement").unwrap();

        let result = AssetSwapper::default().swap("missing", "repl", &d.cache, &d.assets);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(SwapErrorKind::OriginalNotFound));
        assert_eq!(result.errors.len(), 1);
        assert!(!d.cache.join("missing").exists());
    }

    #[test]
    fn test_swap_missing_replacement() {
        let d = dirs();
        fs::write(d.cache.join("orig"), b"original").unwrap();

        let result = AssetSwapper::default().swap("orig", "nope", &d.cache, &d.assets);
        assert_eq!(result.error_kind, Some(SwapErrorKind::ReplacementNotFound));
        assert_eq!(fs::read(d.cache.join("orig")).unwrap(), b"original");
        assert!(!d.cache.join("orig.cdbl_backup").exists());
    }

    #[test]
    fn test_missing_cache_root_short_circuits() {
        let d = dirs();
        let result =
            AssetSwapper::default().place_or_swap("a", "b", &d.cache.join("gone"), &d.assets);
        assert_eq!(result.error_kind, Some(SwapErrorKind::CacheRootMissing));
    }

    #[test]
    fn test_place_or_swap_places_when_absent() {
        let d = dirs();
        fs::write(d.assets.join("repl"), b"replacement").unwrap();

        let result = AssetSwapper::default().place_or_swap("newslot", "repl", &d.cache, &d.assets);
        assert!(result.success);
        assert_eq!(result.action, Some(SwapAction::Placed));
        assert_eq!(fs::read(d.cache.join("newslot")).unwrap(), b"replacement");
        assert!(!d.cache.join("newslot.cdbl_backup").exists());
    }

    #[test]
    fn test_place_or_swap_swaps_nested_file() {
        let d = dirs();
        fs::create_dir_all(d.cache.join("sub")).unwrap();
        fs::write(d.cache.join("sub").join("ABC"), b"original").unwrap();
        fs::write(d.assets.join("repl"), b"replacement").unwrap();

        let result = AssetSwapper::default().place_or_swap("abc", "repl", &d.cache, &d.assets);
        assert_eq!(result.action, Some(SwapAction::Swapped));
        assert_eq!(fs::read(d.cache.join("sub").join("ABC")).unwrap(), b"replacement");
        assert!(d.cache.join("sub").join("ABC.cdbl_backup").exists());
    }

    #[test]
    fn test_restore_after_swap() {
        let d = dirs();
        fs::write(d.cache.join("orig"), b"original").unwrap();
        fs::write(d.assets.join("repl"), b"replacement").unwrap();

        let swapper = AssetSwapper::default();
        assert!(swapper.swap("orig", "repl", &d.cache, &d.assets).success);

        let restored = swapper.restore("orig", &d.cache);
        assert!(restored.success);
        assert_eq!(restored.action, Some(SwapAction::Restored));
        assert_eq!(fs::read(d.cache.join("orig")).unwrap(), b"original");
    }

    #[test]
    fn test_revert_swapped_and_placed() {
        let d = dirs();
        fs::write(d.cache.join("orig"), b"original").unwrap();
        fs::write(d.assets.join("repl"), b"replacement").unwrap();

        let swapper = AssetSwapper::default();
        assert!(swapper.place_or_swap("orig", "repl", &d.cache, &d.assets).success);
        assert!(swapper.place_or_swap("fresh", "repl", &d.cache, &d.assets).success);

        assert_eq!(swapper.revert("orig", &d.cache).action, Some(SwapAction::Restored));
        assert_eq!(fs::read(d.cache.join("orig")).unwrap(), b"original");

        assert_eq!(swapper.revert("fresh", &d.cache).action, Some(SwapAction::Removed));
        assert!(!d.cache.join("fresh").exists());

        let gone = swapper.revert("fresh", &d.cache);
        assert_eq!(gone.error_kind, Some(SwapErrorKind::OriginalNotFound));
    }

    #[test]
    fn test_swap_refuses_when_backup_cannot_be_written() {
        let d = dirs();
        fs::write(d.cache.join("orig"), b"original").unwrap();
        fs::write(d.assets.join("repl"), b"replacement").unwrap();
        // A directory in the temp file's place makes the backup copy fail
        fs::create_dir(d.cache.join("orig.cdbl_backup.tmp")).unwrap();

        let result = AssetSwapper::default().swap("orig", "repl", &d.cache, &d.assets);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(SwapErrorKind::BackupFailed));
        assert!(result.message.contains("original left untouched"));
        assert_eq!(fs::read(d.cache.join("orig")).unwrap(), b"original");
        assert!(!d.cache.join("orig.cdbl_backup").exists());
    }

    #[test]
    fn test_replace_placed_never_backs_up() {
        let d = dirs();
        fs::write(d.assets.join("r1"), b"one").unwrap();
        fs::write(d.assets.join("r2"), b"two").unwrap();

        let swapper = AssetSwapper::default();
        let first = swapper.place_or_swap("slot", "r1", &d.cache, &d.assets);
        assert_eq!(first.action, Some(SwapAction::Placed));

        let again = swapper.replace_placed("slot", "r2", &d.cache, &d.assets);
        assert_eq!(again.action, Some(SwapAction::Placed));
        assert_eq!(fs::read(d.cache.join("slot")).unwrap(), b"two");
        assert!(!d.cache.join("slot.cdbl_backup").exists());

        let removed = swapper.remove_placed("slot", &d.cache);
        assert_eq!(removed.action, Some(SwapAction::Removed));
        assert!(!d.cache.join("slot").exists());
    }

    #[test]
    fn test_remove_placed_drops_stale_backup() {
        let d = dirs();
        fs::write(d.cache.join("slot"), b"modded").unwrap();
        fs::write(d.cache.join("slot.cdbl_backup"), b"modded").unwrap();

        let removed = AssetSwapper::default().remove_placed("slot", &d.cache);
        assert!(removed.success, "{}", removed.message);
        assert!(!d.cache.join("slot").exists());
        assert!(!d.cache.join("slot.cdbl_backup").exists());
    }

    #[test]
    fn test_restore_without_backup() {
        let d = dirs();
        fs::write(d.cache.join("orig"), b"original").unwrap();

        let result = AssetSwapper::default().restore("orig", &d.cache);
        assert_eq!(result.error_kind, Some(SwapErrorKind::NoBackupFound));
    }

    #[test]
    fn test_result_serializes_without_empty_fields() {
        let d = dirs();
        let result = AssetSwapper::default().swap("a", "b", &d.cache, &d.assets);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("action").is_none());
        assert_eq!(json["error_kind"], "replacement_not_found");
    }
}
