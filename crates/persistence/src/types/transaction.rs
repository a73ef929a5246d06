//! Transaction identity, state and mode types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a context applies its document operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// The document store buffers writes and commits them atomically.
    Native,
    /// Writes are applied one by one at commit time and undone by compensation.
    Fallback,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Native => write!(f, "native"),
            ExecutionMode::Fallback => write!(f, "fallback"),
        }
    }
}

/// Lifecycle state of a transaction context.
///
/// `Open` is the only non-terminal state. No transition leaves a terminal
/// state, and `Expired` is treated exactly like `RolledBack` by every call
/// made against the context afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionState {
    /// Accepting uploads, reads and staged operations.
    Open,
    /// Every staged operation was applied.
    Committed,
    /// Aborted by the caller or by a failure; compensation has run.
    RolledBack,
    /// The time-to-live elapsed before commit; compensation has run.
    Expired,
}

impl TransactionState {
    /// Returns whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Open)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Open => write!(f, "open"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::RolledBack => write!(f, "rolled-back"),
            TransactionState::Expired => write!(f, "expired"),
        }
    }
}

/// Finer-grained progress of an operation through the two-phase protocol.
///
/// Objects are uploaded first; once document staging begins no further
/// uploads are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// Objects are being uploaded.
    Uploading,
    /// Document operations are being read or staged.
    Staging,
    /// A uniqueness check is in flight.
    ConflictChecking,
    /// Staged operations are being applied.
    Committing,
    /// Terminal success.
    Committed,
    /// Compensation is in flight.
    RollingBack,
    /// Terminal failure.
    RolledBack,
}

impl Phase {
    /// Returns whether objects may still be uploaded in this phase.
    pub fn accepts_uploads(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Uploading)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Uploading => "uploading",
            Phase::Staging => "staging",
            Phase::ConflictChecking => "conflict-checking",
            Phase::Committing => "committing",
            Phase::Committed => "committed",
            Phase::RollingBack => "rolling-back",
            Phase::RolledBack => "rolled-back",
        };
        write!(f, "{}", name)
    }
}
