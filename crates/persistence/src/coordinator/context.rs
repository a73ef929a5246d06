//! Transaction contexts.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::compensation::{CompensationAction, CompensationEngine, CompensationLog};
use crate::core::DocumentTransaction;
use crate::types::{
    ExecutionMode, HandleStatus, OperationKind, Phase, ResourceHandle, ResourceKind, ResourceRef,
    StagedOperation, TransactionId, TransactionState, UniquenessConstraint,
};

/// The unit of atomicity tracked by the coordinator.
///
/// A context owns an append-only log of [`StagedOperation`]s while it is
/// open, plus the compensation log of everything actually applied to a
/// backend. It is created by
/// [`TransactionCoordinator::begin`](super::TransactionCoordinator::begin)
/// and driven to a terminal state by the coordinator.
///
/// Dropping a context that is still open with applied resources (for example
/// because the caller's future was cancelled) spawns their compensation on
/// the current tokio runtime.
pub struct TransactionContext {
    pub(super) id: TransactionId,
    pub(super) mode: ExecutionMode,
    pub(super) ttl: Duration,
    pub(super) deadline: Instant,
    pub(super) created_at: DateTime<Utc>,
    pub(super) state: TransactionState,
    pub(super) phase: Phase,
    pub(super) operations: Vec<StagedOperation>,
    pub(super) handles: Vec<ResourceHandle>,
    pub(super) compensations: CompensationLog,
    pub(super) native: Option<Box<dyn DocumentTransaction>>,
    engine: CompensationEngine,
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("ttl", &self.ttl)
            .field("state", &self.state)
            .field("phase", &self.phase)
            .field("operations", &self.operations.len())
            .field("applied", &self.compensations.len())
            .field("native_open", &self.native.is_some())
            .finish_non_exhaustive()
    }
}

impl TransactionContext {
    pub(super) fn new(mode: ExecutionMode, ttl: Duration, engine: CompensationEngine) -> Self {
        Self {
            id: TransactionId::new(),
            mode,
            ttl,
            deadline: Instant::now() + ttl,
            created_at: Utc::now(),
            state: TransactionState::Open,
            phase: Phase::Idle,
            operations: Vec::new(),
            handles: Vec::new(),
            compensations: CompensationLog::new(),
            native: None,
            engine,
        }
    }

    /// Returns the context identifier.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the execution mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Returns the time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns when the context was opened.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the state as observed now.
    ///
    /// An open context whose time-to-live has elapsed reports `Expired`
    /// even before the coordinator has compensated it.
    pub fn state(&self) -> TransactionState {
        if self.state == TransactionState::Open && self.is_past_deadline() {
            TransactionState::Expired
        } else {
            self.state
        }
    }

    /// Returns the protocol phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the operation log in staging order.
    pub fn operations(&self) -> &[StagedOperation] {
        &self.operations
    }

    /// Returns the handles of every touched resource.
    pub fn handles(&self) -> &[ResourceHandle] {
        &self.handles
    }

    /// Returns how many resources have been applied and would need
    /// compensation.
    pub fn applied(&self) -> usize {
        self.compensations.len()
    }

    /// Returns the time left before expiry.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub(super) fn is_past_deadline(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub(super) fn append(
        &mut self,
        kind: OperationKind,
        target: ResourceRef,
        payload: Value,
        expected_version: Option<u64>,
        constraints: Vec<UniquenessConstraint>,
    ) -> StagedOperation {
        let operation = StagedOperation {
            sequence: self.operations.len() as u64 + 1,
            kind,
            target: target.clone(),
            payload,
            expected_version,
            constraints,
        };
        self.operations.push(operation.clone());
        self.handles.push(ResourceHandle::staged(target, self.id));
        operation
    }

    pub(super) fn record_applied(&mut self, action: CompensationAction) {
        self.compensations.push(action);
    }

    /// Staged document operations in reverse staging order.
    pub(super) fn staged_documents_rev(&self) -> Vec<ResourceRef> {
        self.operations
            .iter()
            .rev()
            .filter(|op| op.resource_kind() == ResourceKind::Document)
            .map(|op| op.target.clone())
            .collect()
    }

    pub(super) fn settle(&mut self, state: TransactionState, phase: Phase, status: HandleStatus) {
        self.state = state;
        self.phase = phase;
        for handle in &mut self.handles {
            handle.settle(status);
        }
    }

    pub(super) fn engine(&self) -> &CompensationEngine {
        &self.engine
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if self.state != TransactionState::Open {
            return;
        }

        if self.compensations.is_empty() {
            if self.native.is_some() {
                debug!(transaction_id = %self.id, "Open transaction dropped; discarding native writes");
            }
            return;
        }

        let log = self.compensations.take();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    transaction_id = %id,
                    applied = log.len(),
                    "Open transaction dropped; compensating applied resources"
                );
                let engine = self.engine.clone();
                handle.spawn(async move {
                    engine.compensate(id, log).await;
                });
            }
            Err(_) => {
                for action in log.iter() {
                    error!(
                        transaction_id = %id,
                        resource = %action.resource(),
                        "Open transaction dropped outside a runtime; resource requires manual cleanup"
                    );
                }
            }
        }
    }
}
