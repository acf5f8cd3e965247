//! Named fixes: one FastFlag plus a batch of asset swaps.

use std::fmt;
use std::str::FromStr;

use cdbl_cas::BatchOutcome;
use cdbl_config::{Config, FixConfig};
use cdbl_flags::{NO_ARMS_FIX, SKYBOX_FIX};
use serde::{Deserialize, Serialize};

use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixKind {
    Skybox,
    NoArms,
}

impl FixKind {
    pub const ALL: [FixKind; 2] = [FixKind::Skybox, FixKind::NoArms];

    /// Key of the fix record in the tracking ledger
    pub fn ledger_key(self) -> &'static str {
        match self {
            FixKind::Skybox => SKYBOX_FIX,
            FixKind::NoArms => NO_ARMS_FIX,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FixKind::Skybox => "Skybox fix",
            FixKind::NoArms => "No arms fix",
        }
    }

    pub fn config(self, config: &Config) -> &FixConfig {
        match self {
            FixKind::Skybox => &config.fixes.skybox,
            FixKind::NoArms => &config.fixes.no_arms,
        }
    }
}

impl fmt::Display for FixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixKind::Skybox => f.write_str("skybox"),
            FixKind::NoArms => f.write_str("no-arms"),
        }
    }
}

impl FromStr for FixKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "skybox" | "skybox-fix" => Ok(FixKind::Skybox),
            "no-arms" | "no-arms-fix" | "noarms" => Ok(FixKind::NoArms),
            other => Err(EngineError::UnknownFix(other.to_string())),
        }
    }
}

/// Outcome of applying or removing a named fix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixResult {
    pub fix: FixKind,
    pub success: bool,
    pub outcome: BatchOutcome,
    pub message: String,
    /// Assets swapped (apply) or reverted (remove)
    pub swapped: usize,
    pub failed: usize,
    pub swapped_assets: Vec<String>,
    pub errors: Vec<String>,
    /// Whether the fix's flag change went through
    pub flag_applied: bool,
    pub cancelled: bool,
}

impl FixResult {
    pub(crate) fn failed(fix: FixKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            fix,
            success: false,
            outcome: BatchOutcome::Failed,
            errors: vec![message.clone()],
            message,
            swapped: 0,
            failed: 0,
            swapped_assets: Vec::new(),
            flag_applied: false,
            cancelled: false,
        }
    }

    pub fn preview_errors(&self, limit: usize) -> &[String] {
        &self.errors[..self.errors.len().min(limit)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for kind in FixKind::ALL {
            assert_eq!(kind.to_string().parse::<FixKind>().unwrap(), kind);
        }
        assert_eq!("NO_ARMS".parse::<FixKind>().unwrap(), FixKind::NoArms);
        assert!("sunset".parse::<FixKind>().is_err());
    }

    #[test]
    fn test_ledger_keys_are_distinct() {
        assert_eq!(FixKind::Skybox.ledger_key(), "skybox_fix");
        assert_eq!(FixKind::NoArms.ledger_key(), "no_arms_fix");
    }

    #[test]
    fn test_serializes_kebab_case() {
        assert_eq!(serde_json::to_value(FixKind::NoArms).unwrap(), "no-arms");
    }
}
