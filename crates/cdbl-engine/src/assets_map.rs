//! The replacement pack's `assets.json`: a flat object of cache hash to
//! replacement hash.

use std::fs;
use std::path::Path;

use cdbl_config::log_engine_warn;
use serde_json::Value;

use crate::{EngineError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetsMap {
    pairs: Vec<(String, String)>,
}

impl AssetsMap {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(EngineError::AssetsMapMissing {
                path: path.to_path_buf(),
            });
        }
        let bytes = fs::read(path)?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|source| EngineError::AssetsMapInvalid {
                path: path.to_path_buf(),
                reason: source.to_string(),
            })?;
        Self::from_value(value).map_err(|reason| EngineError::AssetsMapInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Entries whose value is not a string are skipped.
    pub fn from_value(value: Value) -> std::result::Result<Self, String> {
        let Value::Object(map) = value else {
            return Err("expected a JSON object of hash pairs".to_string());
        };
        let mut pairs = Vec::with_capacity(map.len());
        for (original, replacement) in map {
            match replacement {
                Value::String(replacement) => pairs.push((original, replacement)),
                other => {
                    log_engine_warn!("Skipping non-string asset mapping", hash = %original, value = %other)
                }
            }
        }
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
