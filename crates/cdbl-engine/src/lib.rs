//! # cdbl-engine
//!
//! The single entry point front-ends talk to. An [`Engine`] is built once
//! from a [`Config`] and owns the swapper, the flag service and the resolved
//! cache root; every operation returns a serializable result record.
//!
//! ```ignore
//! let engine = Engine::new(Config::load()?)?;
//! let result = engine.apply_skybox_fix();
//! println!("{}", result.message);
//! ```

mod assets_map;
mod fix;
mod status;
mod worker;

pub use assets_map::AssetsMap;
pub use fix::{FixKind, FixResult};
pub use status::StatusReport;
pub use worker::{JobEvent, JobHandle};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use cdbl_cas::{
    AssetSwapper, BackupVault, BatchMode, BatchOutcome, BatchRequest, ContentStore, HashAlgorithm,
    SwapErrorKind, SwapResult,
};
use cdbl_config::{log_engine_info, log_engine_warn, Config};
use cdbl_flags::{AppliedFlags, FastFlagService, FixStatus, FlagOperationResult, FlagSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Another job is already running")]
    Busy,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown fix: {0}")]
    UnknownFix(String),

    #[error("assets.json not found at {}", path.display())]
    AssetsMapMissing { path: PathBuf },

    #[error("Failed to load assets.json at {}: {reason}", path.display())]
    AssetsMapInvalid { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone)]
pub struct Engine {
    config: Config,
    cache_root: PathBuf,
    swapper: AssetSwapper,
    flags: FastFlagService,
    busy: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        let algorithm: HashAlgorithm = config
            .swap
            .hash_algorithm
            .parse()
            .map_err(EngineError::Config)?;
        let swapper = AssetSwapper::new(
            ContentStore::new(algorithm),
            BackupVault::new(config.swap.backup_suffix.clone()),
        );
        let cache_root = config.resolve_cache_root();
        log_engine_info!("Engine ready", cache_root = %cache_root.display());

        Ok(Self {
            flags: FastFlagService::from_config(&config),
            cache_root,
            swapper,
            config,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn assets_root(&self) -> &Path {
        &self.config.paths.assets_root
    }

    pub fn swapper(&self) -> &AssetSwapper {
        &self.swapper
    }

    pub fn flags(&self) -> &FastFlagService {
        &self.flags
    }

    // === Assets ===

    pub fn swap_asset(&self, original: &str, replacement: &str) -> SwapResult {
        self.swapper
            .swap(original, replacement, &self.cache_root, self.assets_root())
    }

    pub fn place_asset(&self, target: &str, replacement: &str) -> SwapResult {
        self.swapper
            .place_or_swap(target, replacement, &self.cache_root, self.assets_root())
    }

    pub fn restore_asset(&self, hash: &str) -> SwapResult {
        self.swapper.restore(hash, &self.cache_root)
    }

    // === FastFlags ===

    pub fn apply_fastflags(&self, flags: &FlagSet) -> FlagOperationResult {
        self.flags.apply(flags)
    }

    pub fn remove_fastflags(&self, names: Option<&[String]>) -> FlagOperationResult {
        self.flags.remove(names)
    }

    pub fn restore_original_settings(&self) -> FlagOperationResult {
        self.flags.restore_original()
    }

    pub fn unlock_settings(&self) -> FlagOperationResult {
        self.flags.store().unlock()
    }

    pub fn applied_fastflags(&self) -> AppliedFlags {
        self.flags.applied()
    }

    pub fn current_settings(&self) -> FlagSet {
        self.flags.current_settings()
    }

    pub fn create_initial_backup(&self) -> FlagOperationResult {
        self.flags.create_initial_backup()
    }

    // === Named fixes ===

    pub fn is_fix_active(&self, fix: FixKind) -> FixStatus {
        self.flags.fix_status(fix.ledger_key())
    }

    pub fn apply_skybox_fix(&self) -> FixResult {
        self.apply_fix(FixKind::Skybox)
    }

    pub fn apply_no_arms_fix(&self) -> FixResult {
        self.apply_fix(FixKind::NoArms)
    }

    pub fn remove_skybox_fix(&self) -> FixResult {
        self.remove_fix(FixKind::Skybox)
    }

    pub fn remove_no_arms_fix(&self) -> FixResult {
        self.remove_fix(FixKind::NoArms)
    }

    pub fn apply_fix(&self, fix: FixKind) -> FixResult {
        self.apply_fix_with(fix, None, |_, _, _| {})
    }

    /// Asset pairs a fix swaps: the assets map when the fix uses it, then
    /// the fix's own configured pairs.
    pub fn fix_pairs(&self, fix: FixKind) -> Result<Vec<(String, String)>> {
        let cfg = fix.config(&self.config);
        let mut pairs = if cfg.use_assets_map {
            AssetsMap::load(&self.config.paths.assets_map)?.into_pairs()
        } else {
            Vec::new()
        };
        for (original, replacement) in &cfg.assets {
            if !pairs.iter().any(|(o, _)| o == original) {
                pairs.push((original.clone(), replacement.clone()));
            }
        }
        Ok(pairs)
    }

    /// Flag first, then the asset batch. A flag failure leaves the cache
    /// untouched; asset failures only downgrade the outcome.
    pub fn apply_fix_with<F>(&self, fix: FixKind, cancel: Option<&AtomicBool>, on_item: F) -> FixResult
    where
        F: FnMut(usize, usize, &SwapResult),
    {
        let cfg = fix.config(&self.config);
        let label = fix.label();

        let pairs = match self.fix_pairs(fix) {
            Ok(pairs) => pairs,
            Err(e) => return FixResult::failed(fix, e.to_string()),
        };

        let flag = self
            .flags
            .apply_named_fix(fix.ledger_key(), &cfg.flag_name, &cfg.flag_value);
        if !flag.success {
            let mut result = FixResult::failed(fix, format!("Failed to apply {label} fastflags"));
            result.errors.extend(flag.errors);
            return result;
        }
        // Ledger warnings from the flag step ride along.
        let mut warnings = flag.errors;

        if pairs.is_empty() {
            return FixResult {
                fix,
                success: true,
                outcome: BatchOutcome::Full,
                message: format!("{label} applied ({}: {})", cfg.flag_name, cfg.flag_value),
                swapped: 0,
                failed: 0,
                swapped_assets: Vec::new(),
                errors: warnings,
                flag_applied: true,
                cancelled: false,
            };
        }

        let ledger = self.flags.ledger();
        let mut doc = ledger.load();
        let batch = self.swapper.run_batch(
            BatchRequest {
                pairs: &pairs,
                cache_root: &self.cache_root,
                assets_root: self.assets_root(),
                mode: BatchMode::Lenient,
                cancel,
                placed: Some(&doc.placed_assets),
            },
            on_item,
        );

        if !batch.swapped_assets.is_empty() {
            for (original, replacement) in &pairs {
                if batch.swapped_assets.contains(original) {
                    doc.record_swapped(original, replacement);
                }
            }
            for hash in &batch.placed_assets {
                doc.record_placed(hash);
            }
            doc.add_fix_assets(
                fix.ledger_key(),
                batch.swapped_assets.iter().map(String::as_str),
            );
            if !ledger.save(&mut doc) {
                warnings.push("Warning: Assets swapped but tracking data could not be saved".to_string());
            }
        }

        let mut message = match batch.outcome {
            BatchOutcome::Full => format!("{label} applied successfully ({} assets swapped)", batch.swapped),
            BatchOutcome::Partial if batch.failed > 0 => format!(
                "{label} applied with {} of {} assets swapped ({} failed)",
                batch.swapped, batch.total, batch.failed
            ),
            BatchOutcome::Partial => format!(
                "{label} applied with {} of {} assets swapped",
                batch.swapped, batch.total
            ),
            BatchOutcome::Failed if batch.failed > 0 => {
                format!("No assets were swapped ({} failed)", batch.failed)
            }
            BatchOutcome::Failed => "No assets were swapped".to_string(),
        };
        if batch.cancelled {
            message.push_str(" (cancelled)");
        }
        log_engine_info!("Fix applied", fix = %fix, swapped = batch.swapped, failed = batch.failed);

        let mut errors = batch.errors;
        errors.extend(warnings);
        FixResult {
            fix,
            success: batch.success,
            outcome: batch.outcome,
            message,
            swapped: batch.swapped,
            failed: batch.failed,
            swapped_assets: batch.swapped_assets,
            errors,
            flag_applied: true,
            cancelled: batch.cancelled,
        }
    }

    /// Revert the fix's assets, then drop its flag.
    ///
    /// Assets still owned by another active fix are left in place, as is a
    /// flag another active fix still claims.
    pub fn remove_fix(&self, fix: FixKind) -> FixResult {
        let key = fix.ledger_key();
        let label = fix.label();
        let ledger = self.flags.ledger();

        let mut doc = ledger.load();
        let owned = doc.fix(key).assets;
        let mut reverted = Vec::new();
        let mut failed = 0;
        let mut errors = Vec::new();

        for hash in &owned {
            if doc.asset_claimed_elsewhere(hash, key) {
                // Ownership passes to the other fix.
                doc.remove_fix_asset(key, hash);
                continue;
            }
            let result = if doc.is_placed(hash) {
                self.swapper.remove_placed(hash, &self.cache_root)
            } else {
                self.swapper.revert(hash, &self.cache_root)
            };
            // A file the client already evicted needs no revert.
            if result.success || result.error_kind == Some(SwapErrorKind::OriginalNotFound) {
                doc.forget_swapped(hash);
                doc.remove_fix_asset(key, hash);
                reverted.push(hash.clone());
            } else {
                failed += 1;
                errors.push(format!("Failed to restore {hash}: {}", result.message));
            }
        }
        if !owned.is_empty() && !ledger.save(&mut doc) {
            log_engine_warn!("Reverted assets not recorded", fix = %fix);
            errors.push("Warning: Assets restored but tracking data could not be saved".to_string());
        }

        let flag = self.flags.remove_named_fix(key);
        errors.extend(flag.errors.iter().cloned());

        let restored = reverted.len();
        let outcome = if restored + failed == 0 {
            BatchOutcome::Full
        } else {
            BatchOutcome::classify(restored, restored + failed)
        };
        let message = if !flag.success {
            format!("Failed to remove {label}: {}", flag.message)
        } else if restored + failed == 0 {
            flag.message.clone()
        } else {
            format!("{} ({restored} of {} assets restored)", flag.message, restored + failed)
        };
        log_engine_info!("Fix removed", fix = %fix, restored = restored, failed = failed);

        FixResult {
            fix,
            success: flag.success && (failed == 0 || restored > 0),
            outcome,
            message,
            swapped: restored,
            failed,
            swapped_assets: reverted,
            errors,
            flag_applied: flag.success,
            cancelled: false,
        }
    }

    pub fn status(&self) -> StatusReport {
        StatusReport::collect(self)
    }
}
