use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::id::HolderId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationState {
    /// Checks are running; nothing has been written
    Pending,
    /// Every check passed and the full set of mutations is known
    Validated,
    /// Mutations applied and events emitted
    Committed,
    /// A check failed; nothing was written
    Reverted,
}

impl OperationState {
    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        matches!(
            (self, next),
            (OperationState::Pending, OperationState::Validated)
                | (OperationState::Pending, OperationState::Reverted)
                | (OperationState::Validated, OperationState::Committed)
                | (OperationState::Validated, OperationState::Reverted)
        )
    }
}

/// Operation surface of the ledger facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Issue,
    IssueByPartition,
    IssueOwned,
    Transfer,
    TransferWithData,
    TransferFromWithData,
    TransferByPartition,
    OperatorTransferByPartition,
    ControllerTransfer,
    Redeem,
    RedeemByPartition,
    RedeemFrom,
    OperatorRedeemByPartition,
    ControllerRedeem,
    Approve,
    ApproveByPartition,
    AuthorizeOperator,
    RevokeOperator,
    AuthorizeOperatorByPartition,
    RevokeOperatorByPartition,
    SetDefaultPartitions,
    GrantRole,
    RevokeRole,
    RenounceRole,
    Pause,
    Unpause,
    SetDocument,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A receipt of a processed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationReceipt {
    /// Position of the operation in the ledger's commit order
    pub sequence: u64,

    /// Which operation ran
    pub kind: OperationKind,

    /// The account that invoked the operation
    pub caller: HolderId,

    /// Ledger clock reading when the operation ran (Unix seconds)
    pub timestamp: u64,

    /// Final state of the operation
    pub state: OperationState,

    /// Events emitted by the operation, in emission order
    pub events: Vec<LedgerEvent>,
}

impl OperationReceipt {
    /// Open a receipt for an operation whose checks have not run yet
    pub fn pending(sequence: u64, kind: OperationKind, caller: HolderId, timestamp: u64) -> Self {
        Self {
            sequence,
            kind,
            caller,
            timestamp,
            state: OperationState::Pending,
            events: Vec::new(),
        }
    }

    /// Add an event to the receipt
    pub fn add_event(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Mark every check as passed
    pub fn validate(&mut self) -> Result<(), LedgerError> {
        self.transition(OperationState::Validated)
    }

    /// Mark the operation as committed
    pub fn commit(&mut self) -> Result<(), LedgerError> {
        self.transition(OperationState::Committed)
    }

    /// Mark the operation as reverted, dropping its events
    pub fn revert(&mut self) -> Result<(), LedgerError> {
        self.transition(OperationState::Reverted)?;
        self.events.clear();
        Ok(())
    }

    fn transition(&mut self, next: OperationState) -> Result<(), LedgerError> {
        if !self.state.can_transition_to(next) {
            return Err(LedgerError::InvariantViolation(format!(
                "{} #{} cannot move from {:?} to {:?}",
                self.kind, self.sequence, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.state == OperationState::Committed
    }

    /// Names of the emitted events, in order
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.iter().map(LedgerEvent::name).collect()
    }
}
