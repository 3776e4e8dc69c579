use crate::id::HolderId;
use crate::partition::Partition;
use crate::Amount;
use serde::{Deserialize, Serialize};

/// Domain events emitted by committed operations.
///
/// Balance movements are reported twice, once in the partition-agnostic
/// `Transfer` form (issuance comes from the zero address, redemption goes to
/// it) and once in the partition-aware form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Transfer {
        from: HolderId,
        to: HolderId,
        amount: Amount,
    },
    TransferByPartition {
        from_partition: Partition,
        operator: HolderId,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
        operator_data: Vec<u8>,
    },
    ChangedPartition {
        from_partition: Partition,
        to_partition: Partition,
        amount: Amount,
    },
    Issued {
        operator: HolderId,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    IssuedByPartition {
        partition: Partition,
        operator: HolderId,
        to: HolderId,
        amount: Amount,
        /// Acquisition timestamp recorded for the new lot
        timestamp: u64,
        data: Vec<u8>,
        operator_data: Vec<u8>,
    },
    Redeemed {
        operator: HolderId,
        from: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    RedeemedByPartition {
        partition: Partition,
        operator: HolderId,
        from: HolderId,
        amount: Amount,
        operator_data: Vec<u8>,
    },
    ControllerTransfer {
        controller: HolderId,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
        operator_data: Vec<u8>,
    },
    ControllerRedemption {
        controller: HolderId,
        holder: HolderId,
        amount: Amount,
        data: Vec<u8>,
        operator_data: Vec<u8>,
    },
    Approval {
        owner: HolderId,
        spender: HolderId,
        amount: Amount,
    },
    ApprovalByPartition {
        partition: Partition,
        owner: HolderId,
        spender: HolderId,
        amount: Amount,
    },
    AuthorizedOperator {
        operator: HolderId,
        holder: HolderId,
    },
    RevokedOperator {
        operator: HolderId,
        holder: HolderId,
    },
    AuthorizedOperatorByPartition {
        partition: Partition,
        operator: HolderId,
        holder: HolderId,
    },
    RevokedOperatorByPartition {
        partition: Partition,
        operator: HolderId,
        holder: HolderId,
    },
    DefaultPartitionsSet {
        partitions: Vec<Partition>,
    },
    RoleGranted {
        role: String,
        account: HolderId,
        sender: HolderId,
    },
    RoleRevoked {
        role: String,
        account: HolderId,
        sender: HolderId,
    },
    Paused {
        account: HolderId,
    },
    Unpaused {
        account: HolderId,
    },
    Document {
        name: String,
        uri: String,
        document_hash: [u8; 32],
    },
}

impl LedgerEvent {
    /// Short event name, as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Transfer { .. } => "Transfer",
            LedgerEvent::TransferByPartition { .. } => "TransferByPartition",
            LedgerEvent::ChangedPartition { .. } => "ChangedPartition",
            LedgerEvent::Issued { .. } => "Issued",
            LedgerEvent::IssuedByPartition { .. } => "IssuedByPartition",
            LedgerEvent::Redeemed { .. } => "Redeemed",
            LedgerEvent::RedeemedByPartition { .. } => "RedeemedByPartition",
            LedgerEvent::ControllerTransfer { .. } => "ControllerTransfer",
            LedgerEvent::ControllerRedemption { .. } => "ControllerRedemption",
            LedgerEvent::Approval { .. } => "Approval",
            LedgerEvent::ApprovalByPartition { .. } => "ApprovalByPartition",
            LedgerEvent::AuthorizedOperator { .. } => "AuthorizedOperator",
            LedgerEvent::RevokedOperator { .. } => "RevokedOperator",
            LedgerEvent::AuthorizedOperatorByPartition { .. } => "AuthorizedOperatorByPartition",
            LedgerEvent::RevokedOperatorByPartition { .. } => "RevokedOperatorByPartition",
            LedgerEvent::DefaultPartitionsSet { .. } => "DefaultPartitionsSet",
            LedgerEvent::RoleGranted { .. } => "RoleGranted",
            LedgerEvent::RoleRevoked { .. } => "RoleRevoked",
            LedgerEvent::Paused { .. } => "Paused",
            LedgerEvent::Unpaused { .. } => "Unpaused",
            LedgerEvent::Document { .. } => "Document",
        }
    }
}
