//! Tool-owned record of every change made to the client's settings.
//!
//! ## Document layout
//!
//! ```json
//! {
//!     "applied_flags": { "FFlagHttpUseRbxStorage10": "false" },
//!     "backup": {},
//!     "backup_created": "2024-05-01T12:00:00.000000",
//!     "last_modified": "2024-05-01T12:00:00.000000",
//!     "swapped_assets": { "3f2a...": "71be..." },
//!     "placed_assets": ["71be..."],
//!     "skybox_fix": { "active": true, "flag_applied": "FFlagHttpUseRbxStorage10" }
//! }
//! ```
//!
//! Fix records live at the top level next to the fixed keys. Unknown keys
//! are carried through load and save untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cdbl_config::{log_ledger_debug, log_ledger_warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{to_pretty_json, FlagError, FlagSet, Result};

/// Timestamp format shared with ledgers written by earlier releases
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

fn now_stamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Persisted state of one named fix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixRecord {
    pub active: bool,
    pub flag_applied: Option<String>,
    /// Cache hashes this fix swapped or placed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerDoc {
    /// Flags this tool is responsible for
    pub applied_flags: FlagSet,
    /// Settings as they were before the first write
    pub backup: FlagSet,
    // Timestamps stay text so ledgers with naive local stamps still load.
    pub backup_created: Option<String>,
    pub last_modified: Option<String>,
    /// cache hash -> replacement hash
    pub swapped_assets: BTreeMap<String, String>,
    /// Cache hashes that had no client original when first written
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub placed_assets: BTreeSet<String>,
    /// Fix records plus anything this version does not know about
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LedgerDoc {
    /// Whether a pre-modification snapshot has been taken.
    ///
    /// An empty `backup` with a creation stamp is a valid snapshot of an
    /// empty settings file.
    pub fn has_snapshot(&self) -> bool {
        self.backup_created.is_some() || !self.backup.is_empty()
    }

    /// Snapshot `current` unless a snapshot already exists.
    pub fn ensure_backup(&mut self, current: &FlagSet) -> bool {
        if self.has_snapshot() {
            return false;
        }
        self.backup = current.clone();
        self.backup_created = Some(now_stamp());
        log_ledger_debug!("Snapshot taken", count = current.len());
        true
    }

    pub fn clear_backup(&mut self) {
        self.backup = FlagSet::new();
        self.backup_created = None;
    }

    pub fn record_applied(&mut self, name: &str, value: &str) {
        self.applied_flags.insert(name, value);
    }

    pub fn forget_applied(&mut self, name: &str) -> bool {
        self.applied_flags.remove(name).is_some()
    }

    pub fn record_swapped(&mut self, cache_hash: &str, replacement_hash: &str) {
        self.swapped_assets
            .insert(cache_hash.to_string(), replacement_hash.to_string());
    }

    pub fn forget_swapped(&mut self, cache_hash: &str) -> bool {
        self.placed_assets.remove(cache_hash);
        self.swapped_assets.remove(cache_hash).is_some()
    }

    pub fn record_placed(&mut self, cache_hash: &str) {
        self.placed_assets.insert(cache_hash.to_string());
    }

    pub fn is_placed(&self, cache_hash: &str) -> bool {
        self.placed_assets.contains(cache_hash)
    }

    /// The record stored under `fix`, or an inactive default.
    pub fn fix(&self, fix: &str) -> FixRecord {
        self.extra
            .get(fix)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn set_fix_active(&mut self, fix: &str, flag: &str, active: bool) {
        let mut record = self.fix(fix);
        record.active = active;
        record.flag_applied = Some(flag.to_string());
        self.put_fix(fix, &record);
    }

    /// Attribute `hashes` to `fix`, skipping ones it already owns.
    pub fn add_fix_assets<'a>(&mut self, fix: &str, hashes: impl IntoIterator<Item = &'a str>) {
        let mut record = self.fix(fix);
        for hash in hashes {
            if !record.assets.iter().any(|h| h == hash) {
                record.assets.push(hash.to_string());
            }
        }
        self.put_fix(fix, &record);
    }

    pub fn remove_fix_asset(&mut self, fix: &str, hash: &str) {
        let mut record = self.fix(fix);
        let before = record.assets.len();
        record.assets.retain(|h| h != hash);
        if record.assets.len() != before {
            self.put_fix(fix, &record);
        }
    }

    /// Whether an active fix other than `except` owns `hash`.
    pub fn asset_claimed_elsewhere(&self, hash: &str, except: &str) -> bool {
        self.fix_names().iter().filter(|name| *name != except).any(|name| {
            let record = self.fix(name);
            record.active && record.assets.iter().any(|h| h == hash)
        })
    }

    pub fn deactivate_fix(&mut self, fix: &str) {
        let mut record = self.fix(fix);
        if record.active {
            record.active = false;
            self.put_fix(fix, &record);
        }
    }

    /// Names of every fix record in the document.
    pub fn fix_names(&self) -> Vec<String> {
        self.extra
            .iter()
            .filter(|(_, v)| v.as_object().is_some_and(|o| o.contains_key("active")))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn deactivate_all_fixes(&mut self) {
        for name in self.fix_names() {
            self.deactivate_fix(&name);
        }
    }

    /// Other active fixes that claim `flag`.
    pub fn fixes_claiming(&self, flag: &str, except: &str) -> Vec<String> {
        self.fix_names()
            .into_iter()
            .filter(|name| name != except)
            .filter(|name| {
                let record = self.fix(name);
                record.active && record.flag_applied.as_deref() == Some(flag)
            })
            .collect()
    }

    /// `applied_flags` keys missing from `live`.
    ///
    /// Reporting only; the ledger is not modified.
    pub fn reconcile(&self, live: &FlagSet) -> Vec<String> {
        self.applied_flags
            .names()
            .filter(|name| !live.contains(name))
            .map(str::to_string)
            .collect()
    }

    fn put_fix(&mut self, fix: &str, record: &FixRecord) {
        match serde_json::to_value(record) {
            Ok(value) => {
                self.extra.insert(fix.to_string(), value);
            }
            Err(e) => log_ledger_warn!("Fix record not serializable", fix = fix, error = %e),
        }
    }
}

/// Load/save of a [`LedgerDoc`] at a fixed path
#[derive(Debug, Clone)]
pub struct TrackingLedger {
    path: PathBuf,
}

impl TrackingLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored document, or a fresh one if absent or corrupt.
    pub fn load(&self) -> LedgerDoc {
        if !self.path.exists() {
            return LedgerDoc::default();
        }
        let parsed = fs::read(&self.path)
            .map_err(FlagError::from)
            .and_then(|bytes| serde_json::from_slice::<LedgerDoc>(&bytes).map_err(FlagError::from));
        match parsed {
            Ok(doc) => doc,
            Err(e) => {
                log_ledger_warn!("Ledger unreadable, starting fresh", path = %self.path.display(), error = %e);
                LedgerDoc::default()
            }
        }
    }

    /// Stamp `last_modified` and write, returning whether it succeeded.
    pub fn save(&self, doc: &mut LedgerDoc) -> bool {
        match self.try_save(doc) {
            Ok(()) => true,
            Err(e) => {
                log_ledger_warn!("Ledger write failed", error = %e);
                false
            }
        }
    }

    /// Atomic write-rename save.
    pub fn try_save(&self, doc: &mut LedgerDoc) -> Result<()> {
        doc.last_modified = Some(now_stamp());
        let bytes = to_pretty_json(doc)?;

        let wrap = |source: io::Error| FlagError::LedgerWriteFailed {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(wrap)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let written = File::create(&tmp_path)
            .and_then(|mut file| {
                file.write_all(&bytes)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp_path, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(wrap(e));
        }

        log_ledger_debug!("Ledger saved", path = %self.path.display());
        Ok(())
    }
}
