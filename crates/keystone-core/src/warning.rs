//! Warning accumulation on a parent key.
//!
//! Non-fatal diagnostics are recorded as metadata on the caller's parent
//! key (`warnings` holds the count, `warnings/#n/...` the entries) and
//! mirrored to `tracing::warn!`. Hard failures are `Err` values; warnings
//! never abort a call.

use crate::key::Key;

/// Metadata name holding the number of accumulated warnings.
pub const WARNINGS_META: &str = "warnings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Empty or otherwise questionable parent key name.
    InvalidName,
    /// Handle bootstrap could not load the mount configuration.
    Bootstrap,
    /// A storage plugin returned keys outside its mountpoint, or the
    /// post-update scope filtering failed.
    Appoint,
    /// A partition failed during prepare after another partition had
    /// already failed; only the first failure becomes the error.
    PrepareFailed,
    /// A commit or post-commit plugin failed after the commit boundary.
    CommitFailed,
    /// An error plugin failed during rollback.
    RollbackFailed,
    /// The key that caused a Set failure is not amongst the keys the
    /// caller passed in.
    ErrorKeyMissing,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::InvalidName => "invalid-name",
            WarningKind::Bootstrap => "bootstrap",
            WarningKind::Appoint => "appoint",
            WarningKind::PrepareFailed => "prepare-failed",
            WarningKind::CommitFailed => "commit-failed",
            WarningKind::RollbackFailed => "rollback-failed",
            WarningKind::ErrorKeyMissing => "error-key-missing",
        }
    }
}

/// One recorded warning, as read back from a parent key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: String,
    pub message: String,
}

/// Record a warning on the parent key and emit it via `tracing`.
pub fn add_warning(parent: &mut Key, kind: WarningKind, message: impl Into<String>) {
    let message = message.into();
    tracing::warn!(
        parent = parent.name(),
        kind = kind.as_str(),
        "{message}"
    );
    let n = warning_count(parent);
    parent.set_meta(format!("{WARNINGS_META}/#{n}/kind"), kind.as_str());
    parent.set_meta(format!("{WARNINGS_META}/#{n}/message"), message);
    parent.set_meta(WARNINGS_META, (n + 1).to_string());
}

/// Number of warnings recorded on the key.
pub fn warning_count(key: &Key) -> usize {
    key.meta(WARNINGS_META)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// All warnings recorded on the key, in order.
pub fn warnings(key: &Key) -> Vec<Warning> {
    (0..warning_count(key))
        .filter_map(|n| {
            let kind = key.meta(&format!("{WARNINGS_META}/#{n}/kind"))?;
            let message = key.meta(&format!("{WARNINGS_META}/#{n}/message"))?;
            Some(Warning {
                kind: kind.to_string(),
                message: message.to_string(),
            })
        })
        .collect()
}

/// Whether a warning of the given kind was recorded on the key.
pub fn has_warning(key: &Key, kind: WarningKind) -> bool {
    warnings(key).iter().any(|w| w.kind == kind.as_str())
}
