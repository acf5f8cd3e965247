//! # cdbl-config
//!
//! Configuration management for CDBL.
//!
//! Loads configuration from:
//! 1. `~/.cdbl/config.toml` (global)
//! 2. `.cdbl/config.toml` (project-local, overrides global)
//! 3. An explicit `--config` file, if given
//! 4. Environment variables (highest priority)
//!
//! The resulting [`Config`] is built once at startup and handed to every
//! component constructor. There is no process-wide config instance.

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to a cache file to form its backup sibling.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".cdbl_backup";

/// Flag toggled by both the skybox and the no-arms fix.
pub const STORAGE_FLAG: &str = "FFlagHttpUseRbxStorage10";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub swap: SwapConfig,
    pub flags: FlagsConfig,
    pub fixes: FixesConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load config from standard locations, then layer `explicit` on top.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(&global_path)?;
            }
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            config.merge(Self::from_file(&project_path)?);
        }

        if let Some(path) = explicit {
            debug!("Loading explicit config from {:?}", path);
            config.merge(Self::from_file(path)?);
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a single TOML file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.cdbl/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".cdbl/config.toml"))
    }

    /// Project config path: .cdbl/config.toml relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".cdbl/config.toml")
    }

    /// Overlay every field of `other` that differs from the built-in default.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();

        let p = other.paths;
        let d = &defaults.paths;
        if p.cache_root.is_some() {
            self.paths.cache_root = p.cache_root;
        }
        if p.cache_candidates != d.cache_candidates {
            self.paths.cache_candidates = p.cache_candidates;
        }
        if p.assets_root != d.assets_root {
            self.paths.assets_root = p.assets_root;
        }
        if p.assets_map != d.assets_map {
            self.paths.assets_map = p.assets_map;
        }
        if p.settings_file != d.settings_file {
            self.paths.settings_file = p.settings_file;
        }
        if p.ledger_file != d.ledger_file {
            self.paths.ledger_file = p.ledger_file;
        }

        if other.swap.backup_suffix != defaults.swap.backup_suffix {
            self.swap.backup_suffix = other.swap.backup_suffix;
        }
        if other.swap.hash_algorithm != defaults.swap.hash_algorithm {
            self.swap.hash_algorithm = other.swap.hash_algorithm;
        }
        if other.swap.error_preview != defaults.swap.error_preview {
            self.swap.error_preview = other.swap.error_preview;
        }

        if other.flags != defaults.flags {
            self.flags = other.flags;
        }
        if other.fixes.skybox != defaults.fixes.skybox {
            self.fixes.skybox = other.fixes.skybox;
        }
        if other.fixes.no_arms != defaults.fixes.no_arms {
            self.fixes.no_arms = other.fixes.no_arms;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CDBL_CACHE_ROOT") {
            self.paths.cache_root = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("CDBL_ASSETS_ROOT") {
            self.paths.assets_root = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CDBL_SETTINGS_FILE") {
            self.paths.settings_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CDBL_LEDGER_FILE") {
            self.paths.ledger_file = PathBuf::from(path);
        }
    }

    /// Resolve the live client cache directory.
    ///
    /// An explicit `cache_root` always wins. Otherwise the first existing
    /// candidate is used, falling back to the first candidate even if it
    /// does not exist yet (swap operations then report a missing cache root).
    pub fn resolve_cache_root(&self) -> PathBuf {
        if let Some(root) = &self.paths.cache_root {
            return path::expand_tilde(root);
        }
        let candidates: Vec<PathBuf> = self
            .paths
            .cache_candidates
            .iter()
            .map(path::expand_tilde)
            .collect();
        path::first_existing(&candidates)
            .or_else(|| candidates.first().cloned())
            .unwrap_or_else(|| std::env::temp_dir().join("Roblox").join("http"))
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

fn local_data_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(std::env::temp_dir)
}

/// Filesystem locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Live client cache directory. When unset, `cache_candidates` are probed.
    pub cache_root: Option<PathBuf>,
    /// Known cache locations, probed in order
    pub cache_candidates: Vec<PathBuf>,
    /// Prepared replacement assets (flat, named by hash)
    pub assets_root: PathBuf,
    /// hash -> hash mapping document used by the skybox fix
    pub assets_map: PathBuf,
    /// Client-owned flag settings file
    pub settings_file: PathBuf,
    /// Tool-owned tracking ledger
    pub ledger_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let local = local_data_dir();
        let temp = std::env::temp_dir();
        let cdbl = local.join("CDBL");
        Self {
            cache_root: None,
            cache_candidates: vec![
                temp.join("Roblox").join("http"),
                local.join("Temp").join("Roblox").join("http"),
                local.join("Roblox").join("http"),
                local.join("RobloxPlayerBeta").join("http"),
                temp.join("RobloxPlayerBeta").join("http"),
            ],
            assets_root: cdbl
                .join("assets_cache")
                .join("archives")
                .join("extracted_assets"),
            assets_map: cdbl.join("assets_cache").join("assets.json"),
            settings_file: local
                .join("Roblox")
                .join("ClientSettings")
                .join("IxpSettings.json"),
            ledger_file: cdbl.join("fastflags_tracking.json"),
        }
    }
}

/// Asset swap behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Suffix for backup siblings
    pub backup_suffix: String,
    /// Digest used by the fallback hash scan: "sha256" or "blake3"
    pub hash_algorithm: String,
    /// How many per-item errors a summary shows
    pub error_preview: usize,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
            hash_algorithm: "sha256".to_string(),
            error_preview: 3,
        }
    }
}

/// Settings file behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsConfig {
    /// Mark the settings file read-only after each write
    pub set_readonly: bool,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self { set_readonly: true }
    }
}

/// Named fixes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixesConfig {
    pub skybox: FixConfig,
    pub no_arms: FixConfig,
}

impl Default for FixesConfig {
    fn default() -> Self {
        Self {
            skybox: FixConfig {
                use_assets_map: true,
                ..FixConfig::default()
            },
            no_arms: FixConfig::default(),
        }
    }
}

/// A single-flag toggle bundled with an asset batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    pub flag_name: String,
    pub flag_value: String,
    /// Pull asset pairs from `paths.assets_map`
    pub use_assets_map: bool,
    /// Additional fixed (cache hash -> replacement hash) pairs
    pub assets: BTreeMap<String, String>,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            flag_name: STORAGE_FLAG.to_string(),
            flag_value: "false".to_string(),
            use_assets_map: false,
            assets: BTreeMap::new(),
        }
    }
}
