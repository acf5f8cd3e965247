//! Tracked apply/remove/restore over the settings file and the ledger.

use cdbl_config::{log_flags_info, log_flags_warn, Config, STORAGE_FLAG};

use crate::{
    value_text, AppliedFlags, FixStatus, FlagError, FlagOperationResult, FlagSet, FlagStore,
    LedgerDoc, TrackingLedger,
};

/// "skybox_fix" -> "Skybox fix"
fn fix_label(fix: &str) -> String {
    let spaced = fix.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

#[derive(Debug, Clone)]
pub struct FastFlagService {
    store: FlagStore,
    ledger: TrackingLedger,
    set_readonly: bool,
}

impl FastFlagService {
    pub fn new(store: FlagStore, ledger: TrackingLedger, set_readonly: bool) -> Self {
        Self {
            store,
            ledger,
            set_readonly,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            FlagStore::new(&config.paths.settings_file),
            TrackingLedger::new(&config.paths.ledger_file),
            config.flags.set_readonly,
        )
    }

    pub fn store(&self) -> &FlagStore {
        &self.store
    }

    pub fn ledger(&self) -> &TrackingLedger {
        &self.ledger
    }

    /// Merge `flags` into the live settings and take ownership of them.
    pub fn apply(&self, flags: &FlagSet) -> FlagOperationResult {
        if flags.is_empty() {
            return FlagOperationResult::failed("No fastflags provided to apply");
        }

        let mut current = self.store.load();
        let mut doc = self.ledger.load();
        doc.ensure_backup(&current);

        // Only the values written here are coerced to strings.
        for (name, value) in flags.iter() {
            let text = value_text(value);
            current.insert(name, text.as_ref());
            doc.record_applied(name, &text);
        }

        if let Err(e) = self.store.try_save(&current, self.set_readonly) {
            return FlagOperationResult::failed(format!("Failed to save fastflags: {e}"));
        }

        let count = flags.len();
        log_flags_info!("Fastflags applied", count = count);

        let mut result = if self.ledger.save(&mut doc) {
            FlagOperationResult::ok(format!("Successfully applied {count} fastflags to Roblox"))
        } else {
            FlagOperationResult::ok(format!("Applied {count} fastflags (tracking failed)"))
                .with_warning("Warning: Fastflags applied but tracking data could not be saved")
        };
        result.applied_flags = count;
        result
    }

    /// Remove tracked flags: all of them for `None`, otherwise the tracked
    /// subset of `names`. Untracked names are ignored.
    pub fn remove(&self, names: Option<&[String]>) -> FlagOperationResult {
        let mut doc = self.ledger.load();
        if doc.applied_flags.is_empty() {
            return FlagOperationResult::noop("No CDBL fastflags found to remove");
        }

        let targets: Vec<String> = match names {
            None => doc.applied_flags.names().map(str::to_string).collect(),
            Some(list) => {
                let mut picked: Vec<String> = Vec::new();
                for name in list {
                    if doc.applied_flags.contains(name) && !picked.contains(name) {
                        picked.push(name.clone());
                    }
                }
                picked
            }
        };
        if targets.is_empty() {
            return FlagOperationResult::noop("No matching CDBL fastflags found to remove");
        }

        let mut current = self.store.load();
        let mut removed = 0;
        for name in &targets {
            if current.remove(name).is_some() {
                removed += 1;
            }
            doc.forget_applied(name);
        }

        if let Err(e) = self.store.try_save(&current, self.set_readonly) {
            return FlagOperationResult::failed(format!("Failed to save updated settings: {e}"));
        }

        log_flags_info!("Fastflags removed", count = removed);

        let mut result = if self.ledger.save(&mut doc) {
            FlagOperationResult::ok(format!("Successfully removed {removed} CDBL fastflags"))
        } else {
            FlagOperationResult::ok(format!("Removed {removed} fastflags (tracking update failed)"))
                .with_warning("Warning: Fastflags removed but tracking data could not be updated")
        };
        result.removed_flags = removed;
        result
    }

    /// Write the pre-modification snapshot back and forget all tracking.
    pub fn restore_original(&self) -> FlagOperationResult {
        let mut doc = self.ledger.load();
        if !doc.has_snapshot() {
            return FlagOperationResult::failed(format!(
                "{}. Apply some fastflags or run setup first to create one.",
                FlagError::NoBackupFound
            ));
        }

        if let Err(e) = self.store.try_save(&doc.backup, self.set_readonly) {
            return FlagOperationResult::failed(format!("Failed to restore original settings: {e}"));
        }

        let restored = doc.backup.len();
        doc.applied_flags = FlagSet::new();
        doc.clear_backup();
        doc.deactivate_all_fixes();
        log_flags_info!("Original settings restored", count = restored);

        if self.ledger.save(&mut doc) {
            FlagOperationResult::ok("Successfully restored original Roblox settings")
        } else {
            FlagOperationResult::ok("Settings restored (tracking clear failed)")
                .with_warning("Warning: Settings restored but tracking data could not be cleared")
        }
    }

    /// Apply a single flag on behalf of a named fix.
    pub fn apply_named_fix(&self, fix: &str, flag: &str, value: &str) -> FlagOperationResult {
        let label = fix_label(fix);
        let mut result = self.apply(&[(flag, value)].into_iter().collect());
        if !result.success {
            result.message = format!("Failed to apply {label} FastFlag");
            return result;
        }

        let mut doc = self.ledger.load();
        doc.set_fix_active(fix, flag, true);
        if self.ledger.save(&mut doc) {
            result.message = format!("{label} FastFlag applied ({flag}: {value})");
        } else {
            result.message = format!("{label} FastFlag applied (tracking failed)");
            result.errors.push("Warning: FastFlag applied but tracking failed".to_string());
        }
        result
    }

    /// Deactivate a named fix and drop its flag unless another active fix
    /// still needs it.
    pub fn remove_named_fix(&self, fix: &str) -> FlagOperationResult {
        let label = fix_label(fix);
        let doc = self.ledger.load();
        let record = doc.fix(fix);
        if !record.active {
            return FlagOperationResult::ok(format!("{label} FastFlag is not currently active"));
        }

        let flag = record
            .flag_applied
            .unwrap_or_else(|| STORAGE_FLAG.to_string());

        let claimants = doc.fixes_claiming(&flag, fix);
        if !claimants.is_empty() {
            log_flags_info!("Shared flag kept", fix = fix, flag = %flag, claimed_by = ?claimants);
            let mut result = self.deactivate(fix, doc);
            result.message = format!("{label} deactivated; {flag} kept for {}", claimants.join(", "));
            return result;
        }

        let removal = self.remove(Some(std::slice::from_ref(&flag)));
        // A flag already gone from the ledger still lets the fix deactivate.
        if !removal.success && !removal.errors.is_empty() {
            return FlagOperationResult {
                message: format!("Failed to remove {label} FastFlag"),
                ..removal
            };
        }

        let mut result = self.deactivate(fix, self.ledger.load());
        result.removed_flags = removal.removed_flags;
        if result.errors.is_empty() {
            result.message = format!("{label} FastFlag removed ({flag})");
        }
        result
    }

    fn deactivate(&self, fix: &str, mut doc: LedgerDoc) -> FlagOperationResult {
        doc.deactivate_fix(fix);
        if self.ledger.save(&mut doc) {
            FlagOperationResult::ok(format!("{} deactivated", fix_label(fix)))
        } else {
            FlagOperationResult::ok(format!("{} FastFlag removed (tracking failed)", fix_label(fix)))
                .with_warning("Warning: FastFlag removed but tracking update failed")
        }
    }

    pub fn fix_status(&self, fix: &str) -> FixStatus {
        let record = self.ledger.load().fix(fix);
        let label = fix_label(fix);
        let message = match (&record.flag_applied, record.active) {
            (Some(flag), true) => format!("{label} is active (flag: {flag})"),
            _ => format!("{label} is not active"),
        };
        FixStatus {
            fix: fix.to_string(),
            active: record.active,
            flag_name: record.flag_applied,
            message,
        }
    }

    pub fn applied(&self) -> AppliedFlags {
        let doc = self.ledger.load();
        let count = doc.applied_flags.len();
        let message = if count > 0 {
            format!("Found {count} applied CDBL fastflags")
        } else {
            "No CDBL fastflags currently applied".to_string()
        };
        AppliedFlags {
            flags: doc.applied_flags,
            count,
            last_modified: doc.last_modified,
            message,
        }
    }

    pub fn current_settings(&self) -> FlagSet {
        self.store.load()
    }

    /// Tracked flags that are no longer in the live settings.
    pub fn reconcile(&self) -> Vec<String> {
        let drift = self.ledger.load().reconcile(&self.store.load());
        if !drift.is_empty() {
            log_flags_warn!("Tracked flags missing from settings", flags = ?drift);
        }
        drift
    }

    /// First-run snapshot. Creates an empty, writable settings file if the
    /// client has not written one yet.
    pub fn create_initial_backup(&self) -> FlagOperationResult {
        let mut doc = self.ledger.load();
        if doc.has_snapshot() {
            return FlagOperationResult::ok("Backup already exists, skipping creation");
        }

        let current = if self.store.exists() {
            self.store.load()
        } else {
            let empty = FlagSet::new();
            if let Err(e) = self.store.try_save(&empty, false) {
                return FlagOperationResult::failed(format!(
                    "Failed to create initial settings file: {e}"
                ));
            }
            empty
        };

        doc.ensure_backup(&current);
        if self.ledger.save(&mut doc) {
            FlagOperationResult::ok(format!(
                "Initial backup created successfully ({} settings)",
                current.len()
            ))
        } else {
            FlagOperationResult::failed("Failed to save backup tracking data")
        }
    }
}
