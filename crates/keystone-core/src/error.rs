use std::fmt;
use std::io;
use thiserror::Error;

/// Phase of a Get/Set transaction in which a plugin was invoked.
///
/// Carried inside [`KeystoneError::Plugin`] so callers can tell whether a
/// failure happened before any durable write (`CheckUpdate`, `Update`,
/// `Prepare`) or after the commit boundary (`Commit`, `PostCommit`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    CheckUpdate,
    Update,
    Prepare,
    Commit,
    PostCommit,
    Rollback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::CheckUpdate => "check-update",
            Phase::Update => "update",
            Phase::Prepare => "prepare",
            Phase::Commit => "commit",
            Phase::PostCommit => "post-commit",
            Phase::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum KeystoneError {
    #[error("invalid handle or argument: {0}")]
    InvalidArgument(String),

    #[error("namespace of \"{name}\" rejected: {reason}")]
    NamespaceRejected { name: String, reason: String },

    #[error("split buildup failed: {0}")]
    SplitBuildup(String),

    #[error("invalid sync state: {0}")]
    SyncState(String),

    #[error("plugin \"{plugin}\" failed in {phase} phase for mountpoint \"{mountpoint}\": {message}")]
    Plugin {
        plugin: String,
        phase: Phase,
        mountpoint: String,
        message: String,
    },

    /// The set-resolver detected a concurrent modification. The caller must
    /// run a fresh Get before retrying the Set.
    #[error("conflict at mountpoint \"{mountpoint}\": {message}")]
    Conflict { mountpoint: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KeystoneError>;

// Custom plugin errors:
//
// Plugins can surface their own error types through the
// `#[from] anyhow::Error` variant. Any error implementing
// `std::error::Error + Send + Sync + 'static` converts into
// `KeystoneError::Other`. For structured handling, implement
// `From<YourError> for KeystoneError` directly.
