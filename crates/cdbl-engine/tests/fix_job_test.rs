//! Named fixes end to end, in the foreground and on the worker.

use std::collections::BTreeMap;
use std::fs;
use std::time::{Duration, Instant};

use cdbl_cas::BatchOutcome;
use cdbl_config::testing::TestEnvironment;
use cdbl_config::STORAGE_FLAG;
use cdbl_engine::{Engine, FixKind, JobEvent};

/// Six mapped pairs; the cache holds the first three originals and the
/// pack holds replacements for the first four.
fn skybox_env() -> TestEnvironment {
    let env = TestEnvironment::new().unwrap();
    let mut map = BTreeMap::new();
    for i in 0..6 {
        map.insert(format!("sky{i}"), format!("repl{i}"));
    }
    env.write_assets_map(&map).unwrap();
    for i in 0..3 {
        env.create_cache_file(&format!("{i}/sky{i}"), format!("original{i}").as_bytes())
            .unwrap();
    }
    for i in 0..4 {
        env.create_asset(&format!("repl{i}"), format!("replacement{i}").as_bytes())
            .unwrap();
    }
    env
}

#[test]
fn test_skybox_fix_partial_then_removed() {
    let env = skybox_env();
    let engine = Engine::new(env.config()).unwrap();

    let result = engine.apply_skybox_fix();
    assert!(result.success, "{}", result.message);
    assert!(result.flag_applied);
    assert_eq!(result.outcome, BatchOutcome::Partial);
    assert_eq!(result.swapped, 4);
    assert_eq!(result.failed, 2);
    assert_eq!(result.errors.len(), 2);
    assert_eq!(
        result.message,
        "Skybox fix applied with 4 of 6 assets swapped (2 failed)"
    );
    assert_eq!(result.preview_errors(1).len(), 1);

    // sky3 had no cached original, so it was placed
    assert_eq!(
        fs::read(env.cache_root.join("sky3")).unwrap(),
        b"replacement3"
    );
    assert_eq!(
        engine.current_settings().get(STORAGE_FLAG),
        Some("false")
    );
    assert!(engine.is_fix_active(FixKind::Skybox).active);
    assert_eq!(engine.status().swapped_assets, 4);

    let removed = engine.remove_skybox_fix();
    assert!(removed.success, "{}", removed.message);
    assert_eq!(removed.swapped, 4);
    assert_eq!(
        fs::read(env.cache_root.join("0").join("sky0")).unwrap(),
        b"original0"
    );
    assert!(!env.cache_root.join("sky3").exists());
    assert!(!engine.current_settings().contains(STORAGE_FLAG));
    assert!(!engine.is_fix_active(FixKind::Skybox).active);
    assert_eq!(engine.status().swapped_assets, 0);
}

#[test]
fn test_reapplied_fix_still_removes_placed_assets() {
    let env = skybox_env();
    let engine = Engine::new(env.config()).unwrap();

    assert!(engine.apply_skybox_fix().success);
    let again = engine.apply_skybox_fix();
    assert!(again.success, "{}", again.message);
    assert_eq!(again.swapped, 4);
    // The placed slot must not have picked up a backup of modded content
    assert!(!env.cache_root.join("sky3.cdbl_backup").exists());

    let removed = engine.remove_skybox_fix();
    assert!(removed.success, "{}", removed.message);
    assert!(!env.cache_root.join("sky3").exists());
    assert!(!env.cache_root.join("sky3.cdbl_backup").exists());
    assert_eq!(
        fs::read(env.cache_root.join("2").join("sky2")).unwrap(),
        b"original2"
    );
    assert_eq!(engine.status().swapped_assets, 0);
}

#[test]
fn test_skybox_fix_with_no_replacements_fails_but_keeps_flag() {
    let env = TestEnvironment::new().unwrap();
    let map: BTreeMap<String, String> =
        [("a".to_string(), "gone".to_string())].into_iter().collect();
    env.write_assets_map(&map).unwrap();
    let engine = Engine::new(env.config()).unwrap();

    let result = engine.apply_skybox_fix();
    assert!(!result.success);
    assert!(result.flag_applied);
    assert_eq!(result.outcome, BatchOutcome::Failed);
    assert_eq!(result.message, "No assets were swapped (1 failed)");
}

#[test]
fn test_no_arms_fix_with_configured_pairs_shares_assets() {
    let env = skybox_env();
    let mut config = env.config();
    config
        .fixes
        .no_arms
        .assets
        .insert("sky0".to_string(), "repl1".to_string());
    let engine = Engine::new(config).unwrap();

    assert!(engine.apply_skybox_fix().success);
    assert!(engine.apply_no_arms_fix().success);

    // sky0 still belongs to the no-arms fix
    let removed = engine.remove_skybox_fix();
    assert!(removed.success, "{}", removed.message);
    assert_eq!(
        fs::read(env.cache_root.join("0").join("sky0")).unwrap(),
        b"replacement1"
    );
    assert_eq!(
        engine.current_settings().get(STORAGE_FLAG),
        Some("false")
    );

    let removed = engine.remove_no_arms_fix();
    assert!(removed.success, "{}", removed.message);
    assert_eq!(
        fs::read(env.cache_root.join("0").join("sky0")).unwrap(),
        b"original0"
    );
    assert!(!engine.current_settings().contains(STORAGE_FLAG));
}

#[test]
fn test_worker_reports_progress_then_finishes() {
    let env = skybox_env();
    let engine = Engine::new(env.config()).unwrap();

    let handle = engine.spawn_fix(FixKind::Skybox).unwrap();
    let mut progress = 0;
    let mut started = false;
    let finished = loop {
        match handle.events().recv_timeout(Duration::from_secs(30)).unwrap() {
            JobEvent::Started { fix } => {
                assert_eq!(fix, FixKind::Skybox);
                started = true;
            }
            JobEvent::Progress { total, .. } => {
                assert_eq!(total, 6);
                progress += 1;
            }
            JobEvent::Finished(result) => break result,
        }
    };

    assert!(started);
    assert_eq!(progress, 6);
    assert_eq!(finished.swapped, 4);
    assert!(handle.wait().is_none());
}

#[test]
fn test_worker_frees_engine_after_job() {
    let env = skybox_env();
    let engine = Engine::new(env.config()).unwrap();

    let result = engine.spawn_fix(FixKind::Skybox).unwrap().wait().unwrap();
    assert!(result.success);
    assert!(!engine.is_busy());

    let again = engine.spawn_fix(FixKind::NoArms).unwrap().wait().unwrap();
    assert!(again.success, "{}", again.message);
}

#[test]
fn test_cancelled_before_first_pair() {
    let env = skybox_env();
    let engine = Engine::new(env.config()).unwrap();
    let cancel = std::sync::atomic::AtomicBool::new(true);

    let result = engine.apply_fix_with(FixKind::Skybox, Some(&cancel), |_, _, _| {});
    assert!(result.cancelled);
    assert!(result.flag_applied);
    assert_eq!(result.swapped, 0);
    assert!(result.message.ends_with("(cancelled)"));
    assert_eq!(
        fs::read(env.cache_root.join("0").join("sky0")).unwrap(),
        b"original0"
    );
}

#[test]
fn test_worker_finishes_without_a_reader() {
    let env = TestEnvironment::new().unwrap();
    let pairs = 300;
    let map: BTreeMap<String, String> = (0..pairs)
        .map(|i| (format!("slot{i}"), format!("r{i}")))
        .collect();
    env.write_assets_map(&map).unwrap();
    for i in 0..pairs {
        env.create_asset(&format!("r{i}"), format!("{i}").as_bytes())
            .unwrap();
    }
    let engine = Engine::new(env.config()).unwrap();

    // More pairs than the channel holds, and nobody reads until the end
    let handle = engine.spawn_fix(FixKind::Skybox).unwrap();
    let deadline = Instant::now() + Duration::from_secs(30);
    while !(0..pairs).all(|i| env.cache_root.join(format!("slot{i}")).exists()) {
        assert!(Instant::now() < deadline, "worker stalled on a full channel");
        std::thread::sleep(Duration::from_millis(20));
    }

    let result = handle.wait().unwrap();
    assert!(result.success, "{}", result.message);
    assert_eq!(result.swapped, pairs);
    assert_eq!(result.outcome, BatchOutcome::Full);
}
