//! Read-only health snapshot of every file and directory the engine uses.

use std::path::PathBuf;

use cdbl_cas::CacheStats;
use cdbl_flags::FixStatus;
use serde::Serialize;

use crate::{AssetsMap, Engine, FixKind};

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub cache_root: PathBuf,
    pub cache_exists: bool,
    pub cache: CacheStats,

    pub assets_root: PathBuf,
    pub assets_exists: bool,
    pub assets: CacheStats,
    pub assets_map: PathBuf,
    /// Pair count, `None` when the map is missing or unreadable
    pub assets_map_pairs: Option<usize>,

    pub settings_file: PathBuf,
    pub settings_exists: bool,
    pub settings_readonly: bool,
    pub settings_count: usize,

    pub ledger_file: PathBuf,
    pub applied_count: usize,
    pub has_snapshot: bool,
    pub swapped_assets: usize,
    /// Tracked flags missing from the live settings
    pub drift: Vec<String>,
    pub fixes: Vec<FixStatus>,
}

impl StatusReport {
    pub(crate) fn collect(engine: &Engine) -> Self {
        let config = engine.config();
        let flags = engine.flags();
        let store = engine.swapper().store();
        let doc = flags.ledger().load();

        let cache_root = engine.cache_root().to_path_buf();
        let assets_root = engine.assets_root().to_path_buf();

        Self {
            cache_exists: cache_root.is_dir(),
            cache: store.stats(&cache_root),
            cache_root,

            assets_exists: assets_root.is_dir(),
            assets: store.stats(&assets_root),
            assets_root,
            assets_map: config.paths.assets_map.clone(),
            assets_map_pairs: AssetsMap::load(&config.paths.assets_map)
                .ok()
                .map(|m| m.len()),

            settings_file: flags.store().path().to_path_buf(),
            settings_exists: flags.store().exists(),
            settings_readonly: flags.store().is_readonly(),
            settings_count: flags.current_settings().len(),

            ledger_file: flags.ledger().path().to_path_buf(),
            applied_count: doc.applied_flags.len(),
            has_snapshot: doc.has_snapshot(),
            swapped_assets: doc.swapped_assets.len(),
            drift: flags.reconcile(),
            fixes: FixKind::ALL
                .iter()
                .map(|kind| engine.is_fix_active(*kind))
                .collect(),
        }
    }

    /// Whether anything needs the user's attention.
    pub fn has_problems(&self) -> bool {
        !self.cache_exists || !self.assets_exists || !self.drift.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdbl_config::testing::TestEnvironment;

    #[test]
    fn test_status_of_fresh_environment() {
        let env = TestEnvironment::new().unwrap();
        env.create_cache_file("aa/aaaa", b"1234").unwrap();

        let engine = Engine::new(env.config()).unwrap();
        let report = engine.status();

        assert!(report.cache_exists);
        assert_eq!(report.cache.file_count, 1);
        assert_eq!(report.cache.total_bytes, 4);
        assert!(report.assets_exists);
        assert_eq!(report.assets_map_pairs, None);
        assert!(!report.settings_exists);
        assert!(!report.has_snapshot);
        assert_eq!(report.fixes.len(), 2);
        assert!(!report.has_problems());
    }

    #[test]
    fn test_status_reports_drift() {
        let env = TestEnvironment::new().unwrap();
        let engine = Engine::new(env.config()).unwrap();
        let flags = [("A", "1"), ("B", "2")].into_iter().collect();
        assert!(engine.apply_fastflags(&flags).success);
        assert!(engine
            .flags()
            .store()
            .save(&[("A", "1")].into_iter().collect(), false));

        let report = engine.status();
        assert_eq!(report.drift, vec!["B"]);
        assert!(report.has_problems());
        assert!(report.has_snapshot);
        assert_eq!(report.applied_count, 2);
    }
}
