//! Rendering of result records, either styled for a terminal or as JSON.

use std::process::ExitCode;

use anyhow::Result;
use cdbl_cas::SwapResult;
use cdbl_engine::FixResult;
use cdbl_flags::{value_text, AppliedFlags, FixStatus, FlagOperationResult, FlagSet};
use console::{style, Emoji};
use serde::Serialize;

pub(crate) static CHECK: Emoji<'_, '_> = Emoji("✔ ", "[ok] ");
pub(crate) static CROSS: Emoji<'_, '_> = Emoji("✘ ", "[!!] ");
pub(crate) static WARN_ICON: Emoji<'_, '_> = Emoji("⚠ ", "[??] ");
pub(crate) static DOT: Emoji<'_, '_> = Emoji("● ", "[-] ");

/// A record the CLI can print and turn into an exit code.
pub(crate) trait Outcome: Serialize {
    fn succeeded(&self) -> bool;

    /// Human-readable rendering; at most `preview` errors are listed.
    fn render(&self, preview: usize);
}

/// Print `value` and map its success onto the process exit code.
pub(crate) fn emit<T: Outcome>(value: &T, json: bool, preview: usize) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        value.render(preview);
    }
    Ok(exit_code(value.succeeded()))
}

pub(crate) fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn headline(success: bool, message: &str) {
    if success {
        println!("{} {}", CHECK, style(message).green());
    } else {
        println!("{} {}", CROSS, style(message).red());
    }
}

fn error_list(errors: &[String], preview: usize) {
    for error in errors.iter().take(preview) {
        println!("    {} {}", style("-").dim(), error);
    }
    if errors.len() > preview {
        println!(
            "    {}",
            style(format!("... and {} more", errors.len() - preview)).dim()
        );
    }
}

impl Outcome for SwapResult {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn render(&self, _preview: usize) {
        headline(self.success, &self.message);
        if let Some(path) = &self.path {
            println!("  {} {}", DOT, style(path.display()).dim());
        }
    }
}

impl Outcome for FlagOperationResult {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn render(&self, preview: usize) {
        match (self.success, self.errors.is_empty()) {
            (true, true) => headline(true, &self.message),
            (true, false) => {
                headline(true, &self.message);
                for warning in self.errors.iter().take(preview) {
                    println!("  {} {}", WARN_ICON, style(warning).yellow());
                }
            }
            // Nothing to do
            (false, true) => println!("{} {}", DOT, style(&self.message).dim()),
            (false, false) => {
                headline(false, &self.message);
                // A single error is the message itself
                if self.errors.len() > 1 {
                    error_list(&self.errors, preview);
                }
            }
        }
    }
}

impl Outcome for FixResult {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn render(&self, preview: usize) {
        headline(self.success, &self.message);
        println!(
            "  {} flag {}, {} assets ok, {} failed",
            DOT,
            if self.flag_applied { "set" } else { "unchanged" },
            style(self.swapped).green(),
            style(self.failed).red(),
        );
        if self.cancelled {
            println!("  {} {}", WARN_ICON, style("Cancelled before all assets were processed").yellow());
        }
        error_list(&self.errors, preview);
    }
}

impl Outcome for FixStatus {
    fn succeeded(&self) -> bool {
        true
    }

    fn render(&self, _preview: usize) {
        if self.active {
            println!("{} {}: {}", CHECK, style(&self.fix).bold(), self.message);
        } else {
            println!("{} {}: {}", DOT, style(&self.fix).bold(), self.message);
        }
    }
}

impl Outcome for Vec<FixStatus> {
    fn succeeded(&self) -> bool {
        true
    }

    fn render(&self, preview: usize) {
        for status in self {
            status.render(preview);
        }
    }
}

impl Outcome for AppliedFlags {
    fn succeeded(&self) -> bool {
        true
    }

    fn render(&self, _preview: usize) {
        println!("{}", style(&self.message).bold());
        for (name, value) in self.flags.iter() {
            println!("  {name} = {}", style(value_text(value)).cyan());
        }
        if let Some(when) = &self.last_modified {
            println!("  {}", style(format!("last modified {when}")).dim());
        }
    }
}

impl Outcome for FlagSet {
    fn succeeded(&self) -> bool {
        true
    }

    fn render(&self, _preview: usize) {
        if self.is_empty() {
            println!("{} {}", DOT, style("No settings found").dim());
            return;
        }
        for (name, value) in self.iter() {
            println!("  {name} = {}", style(value_text(value)).cyan());
        }
    }
}
