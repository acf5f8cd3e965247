//! # cdbl status
//!
//! Health check of the cache, the replacement pack, the settings file and
//! the tracking ledger.

use std::process::ExitCode;

use anyhow::Result;
use cdbl_engine::{Engine, StatusReport};
use console::style;

use crate::output::{exit_code, CHECK, CROSS, DOT, WARN_ICON};

struct Tally {
    passed: u32,
    warned: u32,
    failed: u32,
}

impl Tally {
    fn new() -> Self {
        Self {
            passed: 0,
            warned: 0,
            failed: 0,
        }
    }

    fn pass(&mut self, msg: &str) {
        self.passed += 1;
        eprintln!("  {} {}", CHECK, style(msg).green());
    }

    fn warn(&mut self, msg: &str) {
        self.warned += 1;
        eprintln!("  {} {}", WARN_ICON, style(msg).yellow());
    }

    fn fail(&mut self, msg: &str) {
        self.failed += 1;
        eprintln!("  {} {}", CROSS, style(msg).red());
    }

    fn info(&self, msg: &str) {
        eprintln!("  {} {}", DOT, style(msg).dim());
    }
}

pub fn cmd_status(engine: &Engine, json: bool) -> Result<ExitCode> {
    let report = engine.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(exit_code(!report.has_problems()));
    }

    eprintln!();
    eprintln!("{}", style("CDBL Status").bold().cyan());
    eprintln!("{}", style("─".repeat(40)).dim());

    let mut t = Tally::new();

    eprintln!();
    eprintln!("{}", style("Cache").bold());
    check_cache(&report, &mut t);

    eprintln!();
    eprintln!("{}", style("Replacement assets").bold());
    check_assets(&report, &mut t);

    eprintln!();
    eprintln!("{}", style("Settings").bold());
    check_settings(&report, &mut t);

    eprintln!();
    eprintln!("{}", style("Ledger").bold());
    check_ledger(&report, &mut t);

    eprintln!();
    eprintln!("{}", style("Fixes").bold());
    for fix in &report.fixes {
        if fix.active {
            t.pass(&format!("{}: {}", fix.fix, fix.message));
        } else {
            t.info(&format!("{}: {}", fix.fix, fix.message));
        }
    }

    eprintln!();
    eprintln!("{}", style("─".repeat(40)).dim());
    eprintln!(
        "  {} passed, {} warnings, {} errors",
        style(t.passed).green().bold(),
        style(t.warned).yellow().bold(),
        style(t.failed).red().bold(),
    );
    if t.failed > 0 {
        eprintln!();
        eprintln!(
            "{}",
            style("Set --cache-root/--assets-root or fix the paths in config.toml.").dim()
        );
    } else if t.warned > 0 {
        eprintln!("{}", style("Some warnings detected.").dim());
    } else {
        eprintln!("{}", style("All checks passed.").dim());
    }
    eprintln!();

    Ok(exit_code(!report.has_problems()))
}

fn check_cache(r: &StatusReport, t: &mut Tally) {
    if !r.cache_exists {
        t.fail(&format!("Cache root missing: {}", r.cache_root.display()));
        return;
    }
    t.pass(&format!("Cache root: {}", r.cache_root.display()));
    t.info(&format!(
        "{} files, {} bytes",
        r.cache.file_count, r.cache.total_bytes
    ));
    if r.cache.backup_count > 0 {
        t.info(&format!("{} backups held", r.cache.backup_count));
    }
}

fn check_assets(r: &StatusReport, t: &mut Tally) {
    if r.assets_exists {
        t.pass(&format!(
            "Assets root: {} ({} files)",
            r.assets_root.display(),
            r.assets.file_count
        ));
    } else {
        t.fail(&format!("Assets root missing: {}", r.assets_root.display()));
    }
    match r.assets_map_pairs {
        Some(pairs) => t.pass(&format!("Assets map: {pairs} pairs")),
        None => t.warn(&format!(
            "Assets map unavailable: {}",
            r.assets_map.display()
        )),
    }
}

fn check_settings(r: &StatusReport, t: &mut Tally) {
    if !r.settings_exists {
        t.info(&format!(
            "Settings file not created yet: {}",
            r.settings_file.display()
        ));
        return;
    }
    t.pass(&format!(
        "Settings file: {} ({} flags)",
        r.settings_file.display(),
        r.settings_count
    ));
    if r.settings_readonly {
        t.info("Read-only (run 'cdbl flags unlock' to allow client writes)");
    }
}

fn check_ledger(r: &StatusReport, t: &mut Tally) {
    t.info(&format!("{}", r.ledger_file.display()));
    t.info(&format!(
        "{} tracked flags, {} swapped assets",
        r.applied_count, r.swapped_assets
    ));
    if r.has_snapshot {
        t.pass("Original settings snapshot present");
    } else {
        t.info("No settings snapshot yet");
    }
    if r.drift.is_empty() {
        t.pass("Tracked flags match the live settings");
    } else {
        t.fail(&format!(
            "Tracked flags missing from settings: {}",
            r.drift.join(", ")
        ));
    }
}
