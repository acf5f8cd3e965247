//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - A temporary client cache root
//! - A prepared replacement-assets directory
//! - Settings and ledger file locations
//!
//! # Usage
//!
//! ```ignore
//! use cdbl_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let config = env.config();
//!     // every path in `config` lives under one TempDir
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::Config;

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Root of everything below
    pub root: PathBuf,
    /// Simulated live client cache
    pub cache_root: PathBuf,
    /// Prepared replacement assets
    pub assets_root: PathBuf,
    /// Assets mapping document (not created until written)
    pub assets_map: PathBuf,
    /// Client settings file (not created)
    pub settings_file: PathBuf,
    /// Tracking ledger (not created)
    pub ledger_file: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();

        let cache_root = root.join("cache").join("http");
        let assets_root = root.join("assets").join("extracted_assets");
        std::fs::create_dir_all(&cache_root)?;
        std::fs::create_dir_all(&assets_root)?;

        Ok(Self {
            assets_map: root.join("assets").join("assets.json"),
            settings_file: root.join("ClientSettings").join("IxpSettings.json"),
            ledger_file: root.join("CDBL").join("fastflags_tracking.json"),
            _temp_dir: temp_dir,
            root,
            cache_root,
            assets_root,
            test_id,
        })
    }

    /// Config whose every path points into this environment
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.paths.cache_root = Some(self.cache_root.clone());
        cfg.paths.cache_candidates = vec![self.cache_root.clone()];
        cfg.paths.assets_root = self.assets_root.clone();
        cfg.paths.assets_map = self.assets_map.clone();
        cfg.paths.settings_file = self.settings_file.clone();
        cfg.paths.ledger_file = self.ledger_file.clone();
        cfg
    }

    /// Create a file inside the cache root (relative path may nest)
    pub fn create_cache_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.cache_root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Create a replacement asset stored flat under its hash name
    pub fn create_asset(&self, hash: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.assets_root.join(hash);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Write the hash -> hash assets mapping document
    pub fn write_assets_map(&self, pairs: &BTreeMap<String, String>) -> anyhow::Result<PathBuf> {
        if let Some(parent) = self.assets_map.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.assets_map, serde_json::to_vec_pretty(pairs)?)?;
        Ok(self.assets_map.clone())
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
