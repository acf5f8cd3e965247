//! # cdbl-flags
//!
//! Reversible FastFlag overrides for the game client.
//!
//! The client reads a flat JSON object of flag name to string value from its
//! settings file. This crate writes into that file while keeping a separate
//! ledger of what it changed, so the changes can later be removed one by one
//! or rolled back wholesale to a snapshot taken before the first write.
//!
//! ```text
//! FastFlagService
//!   ├── FlagStore      (client-owned IxpSettings.json)
//!   └── TrackingLedger (tool-owned fastflags_tracking.json)
//! ```
//!
//! Settings are always written before the ledger. A settings failure fails
//! the operation with the ledger untouched; a ledger failure after a good
//! settings write is reported as a warning only.

mod ledger;
mod service;
mod store;

pub use ledger::{FixRecord, LedgerDoc, TrackingLedger};
pub use service::FastFlagService;
pub use store::FlagStore;

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use thiserror::Error;

/// Ledger key of the skybox fix record
pub const SKYBOX_FIX: &str = "skybox_fix";

/// Ledger key of the no-arms fix record
pub const NO_ARMS_FIX: &str = "no_arms_fix";

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("No backup found to restore from")]
    NoBackupFound,

    #[error("Failed to write settings file {}: {source}", path.display())]
    SettingsWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write tracking ledger {}: {source}", path.display())]
    LedgerWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, FlagError>;

/// Flag name to JSON value, in file order.
///
/// Values this tool writes are always strings. Values read from disk keep
/// their JSON type, so a client-owned `5` or `true` is written back exactly
/// as it was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet(Map<String, Value>);

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an arbitrary JSON object as-is.
    pub fn from_json_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// The value of `name` if it is a string.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert or overwrite. Existing keys keep their position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), Value::String(value.into()));
    }

    /// Remove a key, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every entry of `other` in, overwriting on collision.
    pub fn extend_from(&mut self, other: &FlagSet) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }
}

/// A flag value as the client reads it: strings bare, anything else as
/// JSON text.
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = FlagSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl Serialize for FlagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FlagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Map::deserialize(deserializer).map(FlagSet::from_json_map)
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={}", value_text(value))?;
        }
        Ok(())
    }
}

/// Outcome of a flag apply/remove/restore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagOperationResult {
    pub success: bool,
    pub message: String,
    /// Failure reasons, or warnings when `success` is true
    pub errors: Vec<String>,
    pub applied_flags: usize,
    pub removed_flags: usize,
}

impl FlagOperationResult {
    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Not an error, but nothing was done.
    pub(crate) fn noop(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            errors: vec![message.clone()],
            message,
            ..Self::default()
        }
    }

    pub(crate) fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.errors.push(warning.into());
        self
    }
}

/// Activation state of a named fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixStatus {
    pub fix: String,
    pub active: bool,
    /// Flag the fix applied; `None` if it has never been applied
    pub flag_name: Option<String>,
    pub message: String,
}

/// Snapshot of the ledger's `applied_flags`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedFlags {
    pub flags: FlagSet,
    pub count: usize,
    pub last_modified: Option<String>,
    pub message: String,
}

/// Pretty JSON with the 4-space indent the client itself writes.
pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flagset_keeps_foreign_value_types() {
        let value = json!({"A": "x", "B": 1, "C": true, "D": {"nested": 1}});
        let set: FlagSet = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(set.get("A"), Some("x"));
        assert_eq!(set.get("B"), None);
        assert_eq!(set.get_value("B"), Some(&json!(1)));
        assert_eq!(set.get_value("C"), Some(&json!(true)));
        assert_eq!(serde_json::to_value(&set).unwrap(), value);
        assert_eq!(set.to_string(), r#"A=x, B=1, C=true, D={"nested":1}"#);
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!("False")), "False");
        assert_eq!(value_text(&json!(42)), "42");
    }

    #[test]
    fn test_flagset_preserves_order_on_remove() {
        let mut set: FlagSet = [("z", "1"), ("a", "2"), ("m", "3")].into_iter().collect();
        set.remove("z");
        set.insert("b", "4");
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["a", "m", "b"]);
    }

    #[test]
    fn test_flagset_overwrite_keeps_position() {
        let mut set: FlagSet = [("first", "1"), ("second", "2")].into_iter().collect();
        set.insert("first", "updated");
        assert_eq!(set.names().next(), Some("first"));
        assert_eq!(set.get("first"), Some("updated"));
        assert_eq!(set.to_string(), "first=updated, second=2");
    }

    #[test]
    fn test_pretty_json_uses_four_spaces() {
        let set: FlagSet = [("FFlagFoo", "True")].into_iter().collect();
        let text = String::from_utf8(to_pretty_json(&set).unwrap()).unwrap();
        assert_eq!(text, "{\n    \"FFlagFoo\": \"True\"\n}");
    }

    #[test]
    fn test_result_constructors() {
        let failed = FlagOperationResult::failed("boom");
        assert!(!failed.success);
        assert_eq!(failed.errors, vec!["boom"]);

        let noop = FlagOperationResult::noop("nothing");
        assert!(!noop.success);
        assert!(noop.errors.is_empty());

        let warned = FlagOperationResult::ok("done").with_warning("careful");
        assert!(warned.success);
        assert_eq!(warned.errors.len(), 1);
    }
}
