//! # cdbl-cas
//!
//! Content-addressed lookup over the game client's disk cache, plus the
//! backup and swap machinery built on top of it.
//!
//! ## Cache Layout
//!
//! ```text
//! %TEMP%/Roblox/http/
//! ├── 3f2a...9c            # file named by its asset hash
//! ├── 3f2a...9c.cdbl_backup  # pre-swap copy (at most one per file)
//! └── nested/
//!     └── 71be...04
//! ```
//!
//! Replacement assets are stored flat under their hash in a separate
//! directory, so the direct `root/hash` probe almost always hits. The
//! recursive scans exist for the live cache, which nests files and whose
//! names are not guaranteed to be the content digest.

mod backup;
mod batch;
mod swap;

pub use backup::BackupVault;
pub use batch::{BatchMode, BatchOutcome, BatchRequest, BatchResult};
pub use swap::{AssetSwapper, SwapAction, SwapResult};

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::instrument;
use walkdir::WalkDir;

/// Read size for streaming digests
const HASH_CHUNK: usize = 4096;

/// Errors that can occur during cache operations
#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Cache directory not found: {}", path.display())]
    CacheRootMissing { path: PathBuf },

    #[error("Replacement asset with hash {hash} not found in extracted assets")]
    ReplacementNotFound { hash: String },

    #[error("Original asset with hash {hash} not found in cache")]
    OriginalNotFound { hash: String },

    #[error("No backup found for {}", path.display())]
    NoBackupFound { path: PathBuf },

    #[error("Could not back up {}; original left untouched", path.display())]
    BackupFailed { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SwapError {
    pub fn kind(&self) -> SwapErrorKind {
        match self {
            SwapError::CacheRootMissing { .. } => SwapErrorKind::CacheRootMissing,
            SwapError::ReplacementNotFound { .. } => SwapErrorKind::ReplacementNotFound,
            SwapError::OriginalNotFound { .. } => SwapErrorKind::OriginalNotFound,
            SwapError::NoBackupFound { .. } => SwapErrorKind::NoBackupFound,
            SwapError::BackupFailed { .. } => SwapErrorKind::BackupFailed,
            SwapError::Io(_) => SwapErrorKind::Io,
        }
    }
}

/// Serializable tag for [`SwapError`], carried inside result records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapErrorKind {
    CacheRootMissing,
    ReplacementNotFound,
    OriginalNotFound,
    NoBackupFound,
    BackupFailed,
    Io,
}

pub type Result<T> = std::result::Result<T, SwapError>;

/// Digest used when a file has to be identified by content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm: {other}")),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => f.write_str("sha256"),
            HashAlgorithm::Blake3 => f.write_str("blake3"),
        }
    }
}

enum StreamHasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamHasher {
    fn new(algo: HashAlgorithm) -> Self {
        match algo {
            HashAlgorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => StreamHasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Sha256(h) => h.update(data),
            StreamHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            StreamHasher::Sha256(h) => hex::encode(h.finalize()),
            StreamHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Lowercase hex digest of a byte slice.
pub fn hash_bytes(data: &[u8], algo: HashAlgorithm) -> String {
    let mut hasher = StreamHasher::new(algo);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Lowercase hex digest of a file, read in fixed-size chunks.
///
/// Returns `None` if the file cannot be opened or read.
pub fn hash_file(path: &Path, algo: HashAlgorithm) -> Option<String> {
    let mut file = File::open(path).ok()?;
    let mut hasher = StreamHasher::new(algo);
    let mut buf = [0u8; HASH_CHUNK];
    loop {
        let n = file.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Some(hasher.finalize_hex())
}

/// Locates files under a root directory by asset hash.
///
/// Lookups never fail: an unreadable root, a missing root or no match all
/// come back as `None`.
#[derive(Debug, Clone)]
pub struct ContentStore {
    algorithm: HashAlgorithm,
    skip_suffix: Option<String>,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl ContentStore {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            skip_suffix: None,
        }
    }

    /// Ignore files ending in `suffix` (backup siblings) during scans.
    pub fn with_skip_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.skip_suffix = Some(suffix.into());
        self
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Full lookup: direct path, then filename scan, then digest scan.
    #[instrument(skip(self), level = "debug")]
    pub fn find(&self, hash: &str, root: &Path) -> Option<PathBuf> {
        self.find_by_name(hash, root)
            .or_else(|| self.find_by_digest(hash, root))
    }

    /// Direct `root/hash` probe, then a recursive case-insensitive
    /// filename match.
    pub fn find_by_name(&self, hash: &str, root: &Path) -> Option<PathBuf> {
        if hash.is_empty() || !root.is_dir() {
            return None;
        }

        for candidate in [hash.to_string(), hash.to_ascii_lowercase(), hash.to_ascii_uppercase()] {
            let path = root.join(&candidate);
            if path.is_file() {
                return Some(path);
            }
        }

        self.walk(root).find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.eq_ignore_ascii_case(hash))
        })
    }

    /// Recursive scan comparing each file's digest to `hash`.
    pub fn find_by_digest(&self, hash: &str, root: &Path) -> Option<PathBuf> {
        if hash.is_empty() {
            return None;
        }
        self.walk(root).find(|path| {
            hash_file(path, self.algorithm).is_some_and(|digest| digest.eq_ignore_ascii_case(hash))
        })
    }

    /// Count the files under `root` (backup siblings reported separately).
    pub fn stats(&self, root: &Path) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if self.is_skipped(entry.path()) {
                stats.backup_count += 1;
                continue;
            }
            stats.file_count += 1;
            stats.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
        stats
    }

    fn walk<'a>(&'a self, root: &Path) -> impl Iterator<Item = PathBuf> + 'a {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(move |p| !self.is_skipped(p))
    }

    fn is_skipped(&self, path: &Path) -> bool {
        match (&self.skip_suffix, path.file_name().and_then(|n| n.to_str())) {
            (Some(suffix), Some(name)) => name.ends_with(suffix.as_str()),
            _ => false,
        }
    }
}

/// Summary of a cache root
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Regular (non-backup) files
    pub file_count: u64,
    /// Bytes in regular files
    pub total_bytes: u64,
    /// Backup siblings present
    pub backup_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // sha256("hello")
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_hash_bytes_sha256() {
        assert_eq!(hash_bytes(b"hello", HashAlgorithm::Sha256), HELLO_SHA256);
    }

    #[test]
    fn test_hash_file_matches_hash_bytes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blob");
        // Larger than one chunk so the streaming loop runs more than once
        let data = vec![7u8; HASH_CHUNK * 3 + 11];
        fs::write(&path, &data).unwrap();

        for algo in [HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
            assert_eq!(hash_file(&path, algo).unwrap(), hash_bytes(&data, algo));
        }
    }

    #[test]
    fn test_hash_file_missing() {
        assert!(hash_file(Path::new("/nonexistent/blob"), HashAlgorithm::Sha256).is_none());
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("SHA256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert_eq!("blake3".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Blake3));
        assert!("md5".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::Blake3.to_string(), "blake3");
    }

    #[test]
    fn test_find_direct_hit() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("abc123"), b"x").unwrap();

        let store = ContentStore::default();
        assert_eq!(
            store.find("abc123", temp.path()),
            Some(temp.path().join("abc123"))
        );
    }

    #[test]
    fn test_find_by_name_is_case_insensitive_and_recursive() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("DeadBeef"), b"x").unwrap();

        let store = ContentStore::default();
        assert_eq!(
            store.find_by_name("deadbeef", temp.path()),
            Some(nested.join("DeadBeef"))
        );
    }

    #[test]
    fn test_find_falls_back_to_digest_scan() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("sub");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("not-the-hash.bin"), b"hello").unwrap();

        let store = ContentStore::default();
        let upper = HELLO_SHA256.to_ascii_uppercase();
        assert_eq!(
            store.find(&upper, temp.path()),
            Some(nested.join("not-the-hash.bin"))
        );
    }

    #[test]
    fn test_find_skips_backup_siblings() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("x.cdbl_backup"), b"hello").unwrap();

        let store = ContentStore::default().with_skip_suffix(".cdbl_backup");
        assert!(store.find(HELLO_SHA256, temp.path()).is_none());
    }

    #[test]
    fn test_find_missing_root_is_none() {
        let store = ContentStore::default();
        assert!(store.find("abc", Path::new("/nonexistent/root")).is_none());
        assert!(store.find("", Path::new("/")).is_none());
    }

    #[test]
    fn test_stats() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), b"1234").unwrap();
        fs::write(temp.path().join("b"), b"56").unwrap();
        fs::write(temp.path().join("a.cdbl_backup"), b"old").unwrap();

        let stats = ContentStore::default()
            .with_skip_suffix(".cdbl_backup")
            .stats(temp.path());
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 6);
        assert_eq!(stats.backup_count, 1);
    }
}
