//! Batch swaps with partial-success reporting.
//!
//! A batch never stops at the first failure: cache files legitimately go
//! missing for assets the player has not loaded yet. The only early exit is
//! a cooperative cancel flag, checked between items.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use cdbl_config::{log_swap_info, log_swap_warn};
use serde::{Deserialize, Serialize};

use crate::{AssetSwapper, SwapAction, SwapResult};

/// Which single-pair operation each item uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Original must already be cached
    Strict,
    /// Missing originals are placed
    Lenient,
}

/// Ternary classification of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOutcome {
    Full,
    Partial,
    Failed,
}

impl BatchOutcome {
    /// `total` counts every requested pair, including ones a cancel skipped.
    pub fn classify(swapped: usize, total: usize) -> Self {
        if swapped == 0 {
            BatchOutcome::Failed
        } else if swapped >= total {
            BatchOutcome::Full
        } else {
            BatchOutcome::Partial
        }
    }
}

pub struct BatchRequest<'a> {
    /// (cache hash, replacement hash)
    pub pairs: &'a [(String, String)],
    pub cache_root: &'a Path,
    pub assets_root: &'a Path,
    pub mode: BatchMode,
    pub cancel: Option<&'a AtomicBool>,
    /// Cache hashes an earlier run placed; these are rewritten in place
    /// instead of being backed up
    pub placed: Option<&'a BTreeSet<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub success: bool,
    pub outcome: BatchOutcome,
    pub message: String,
    pub swapped: usize,
    pub failed: usize,
    /// Pairs requested, processed or not
    pub total: usize,
    /// Cache hashes that were written
    pub swapped_assets: Vec<String>,
    /// The subset of `swapped_assets` that had no client original
    pub placed_assets: Vec<String>,
    /// One entry per failed pair
    pub errors: Vec<String>,
    pub cancelled: bool,
}

impl BatchResult {
    /// The first `limit` errors, for short UI messages.
    pub fn preview_errors(&self, limit: usize) -> &[String] {
        &self.errors[..self.errors.len().min(limit)]
    }
}

impl AssetSwapper {
    /// Run every pair in `req`, invoking `on_item(index, total, result)`
    /// after each one.
    pub fn run_batch<F>(&self, req: BatchRequest<'_>, mut on_item: F) -> BatchResult
    where
        F: FnMut(usize, usize, &SwapResult),
    {
        let total = req.pairs.len();
        let mut swapped_assets = Vec::new();
        let mut placed_assets = Vec::new();
        let mut errors = Vec::new();
        let mut cancelled = false;

        for (index, (original, replacement)) in req.pairs.iter().enumerate() {
            if req.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                log_swap_warn!("Batch cancelled", done = index, total = total);
                cancelled = true;
                break;
            }

            let was_placed = req.placed.is_some_and(|placed| placed.contains(original));
            let result = match req.mode {
                BatchMode::Strict => self.swap(original, replacement, req.cache_root, req.assets_root),
                BatchMode::Lenient if was_placed => {
                    self.replace_placed(original, replacement, req.cache_root, req.assets_root)
                }
                BatchMode::Lenient => {
                    self.place_or_swap(original, replacement, req.cache_root, req.assets_root)
                }
            };

            if result.success {
                if result.action == Some(SwapAction::Placed) {
                    placed_assets.push(original.clone());
                }
                swapped_assets.push(original.clone());
            } else {
                errors.push(format!("Failed to swap {}: {}", original, result.message));
            }
            on_item(index, total, &result);
        }

        let swapped = swapped_assets.len();
        let failed = errors.len();
        let outcome = BatchOutcome::classify(swapped, total);

        let mut message = match outcome {
            BatchOutcome::Full => format!("Swapped {swapped} assets"),
            BatchOutcome::Partial if failed > 0 => {
                format!("Swapped {swapped} of {total} assets ({failed} failed)")
            }
            BatchOutcome::Partial => format!("Swapped {swapped} of {total} assets"),
            BatchOutcome::Failed if failed > 0 => {
                format!("No assets were swapped ({failed} failed)")
            }
            BatchOutcome::Failed => "No assets were swapped".to_string(),
        };
        if cancelled {
            message.push_str(" (cancelled)");
        }

        log_swap_info!("Batch finished", swapped = swapped, failed = failed, cancelled = cancelled);

        BatchResult {
            success: swapped > 0,
            outcome,
            message,
            swapped,
            failed,
            total,
            swapped_assets,
            placed_assets,
            errors,
            cancelled,
        }
    }
}
