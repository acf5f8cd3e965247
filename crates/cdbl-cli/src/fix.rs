//! `cdbl fix`: named fixes, applied on the engine's worker thread.

use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use cdbl_config::log_cli_debug;
use cdbl_engine::{Engine, FixKind, JobEvent};
use clap::Subcommand;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::{emit, WARN_ICON};

/// `skybox` or `no-arms`; ledger keys such as `skybox_fix` also parse.
pub(crate) fn parse_fix(s: &str) -> std::result::Result<FixKind, String> {
    s.parse::<FixKind>().map_err(|e| e.to_string())
}

#[derive(Subcommand)]
pub enum FixCommand {
    /// Set the fix's FastFlag and swap its assets into the cache
    Apply {
        /// skybox | no-arms
        #[arg(value_parser = parse_fix)]
        fix: FixKind,
    },
    /// Clear the fix's FastFlag and restore the assets it swapped
    Remove {
        /// skybox | no-arms
        #[arg(value_parser = parse_fix)]
        fix: FixKind,
    },
    /// Show whether a fix (or every fix) is active
    Status {
        /// skybox | no-arms
        #[arg(value_parser = parse_fix)]
        fix: Option<FixKind>,
    },
}

pub fn run(engine: &Engine, command: FixCommand, json: bool) -> Result<ExitCode> {
    let preview = engine.config().swap.error_preview;
    match command {
        FixCommand::Apply { fix } => {
            let result = apply(engine, fix, json)?;
            emit(&result, json, preview)
        }
        FixCommand::Remove { fix } => emit(&engine.remove_fix(fix), json, preview),
        FixCommand::Status { fix: Some(fix) } => emit(&engine.is_fix_active(fix), json, preview),
        FixCommand::Status { fix: None } => {
            let all: Vec<_> = FixKind::ALL
                .iter()
                .map(|kind| engine.is_fix_active(*kind))
                .collect();
            emit(&all, json, preview)
        }
    }
}

fn apply(engine: &Engine, fix: FixKind, json: bool) -> Result<cdbl_engine::FixResult> {
    let handle = engine
        .spawn_fix(fix)
        .with_context(|| format!("Failed to start {}", fix.label()))?;

    let pb = if json {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        pb
    };

    let mut finished = None;
    for event in handle.events().iter() {
        match event {
            JobEvent::Started { fix } => pb.set_message(format!("Applying {}", fix.label())),
            JobEvent::Progress {
                index,
                total,
                hash,
                success,
                message,
            } => {
                pb.set_length(total as u64);
                pb.set_position(index as u64 + 1);
                pb.set_message(hash.clone());
                if !success {
                    log_cli_debug!("Pair failed", hash = %hash, error = %message);
                    pb.println(format!("  {} {}", WARN_ICON, style(message).yellow()));
                }
            }
            JobEvent::Finished(result) => {
                finished = Some(result);
                break;
            }
        }
    }
    pb.finish_and_clear();

    // Joins the worker; no events remain after `Finished`.
    let leftover = handle.wait();
    finished
        .or(leftover)
        .ok_or_else(|| anyhow!("{} worker exited without a result", fix.label()))
}
