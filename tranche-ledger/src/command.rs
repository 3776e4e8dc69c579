use crate::roles::Role;
use serde::{Deserialize, Serialize};
use tranche_core::id::HolderId;
use tranche_core::operation::OperationKind;
use tranche_core::partition::Partition;
use tranche_core::Amount;

/// A state that a command reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resource {
    /// A holder's balances, lots, allowances and operator approvals
    Holder(HolderId),
    /// Total and per-partition supply
    Supply,
    /// Roles, pause flag, default partitions and documents
    Settings,
}

/// Intended access to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessIntent {
    /// Shared read access
    Read,
    /// Exclusive read-write access
    Write,
}

/// A serialisable request for one ledger operation. The caller travels
/// separately, see [`crate::token::SecurityToken::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Issue {
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    IssueByPartition {
        partition: Partition,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    IssueOwned {
        partition: Partition,
        timestamp: u64,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    Transfer {
        to: HolderId,
        amount: Amount,
    },
    TransferWithData {
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    TransferFromWithData {
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    TransferByPartition {
        partition: Partition,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    OperatorTransferByPartition {
        partition: Partition,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
        operator_data: Vec<u8>,
    },
    ControllerTransfer {
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: Vec<u8>,
        operator_data: Vec<u8>,
    },
    Redeem {
        amount: Amount,
        data: Vec<u8>,
    },
    RedeemByPartition {
        partition: Partition,
        amount: Amount,
        data: Vec<u8>,
    },
    RedeemFrom {
        from: HolderId,
        amount: Amount,
        data: Vec<u8>,
    },
    OperatorRedeemByPartition {
        partition: Partition,
        holder: HolderId,
        amount: Amount,
        operator_data: Vec<u8>,
    },
    ControllerRedeem {
        holder: HolderId,
        amount: Amount,
        data: Vec<u8>,
        operator_data: Vec<u8>,
    },
    Approve {
        spender: HolderId,
        amount: Amount,
    },
    ApproveByPartition {
        partition: Partition,
        spender: HolderId,
        amount: Amount,
    },
    AuthorizeOperator {
        operator: HolderId,
    },
    RevokeOperator {
        operator: HolderId,
    },
    AuthorizeOperatorByPartition {
        partition: Partition,
        operator: HolderId,
    },
    RevokeOperatorByPartition {
        partition: Partition,
        operator: HolderId,
    },
    SetDefaultPartitions {
        partitions: Vec<Partition>,
    },
    GrantRole {
        role: Role,
        account: HolderId,
    },
    RevokeRole {
        role: Role,
        account: HolderId,
    },
    RenounceRole {
        role: Role,
    },
    Pause,
    Unpause,
    SetDocument {
        name: String,
        uri: String,
        document_hash: [u8; 32],
    },
}

impl Command {
    pub fn kind(&self) -> OperationKind {
        match self {
            Command::Issue { .. } => OperationKind::Issue,
            Command::IssueByPartition { .. } => OperationKind::IssueByPartition,
            Command::IssueOwned { .. } => OperationKind::IssueOwned,
            Command::Transfer { .. } => OperationKind::Transfer,
            Command::TransferWithData { .. } => OperationKind::TransferWithData,
            Command::TransferFromWithData { .. } => OperationKind::TransferFromWithData,
            Command::TransferByPartition { .. } => OperationKind::TransferByPartition,
            Command::OperatorTransferByPartition { .. } => OperationKind::OperatorTransferByPartition,
            Command::ControllerTransfer { .. } => OperationKind::ControllerTransfer,
            Command::Redeem { .. } => OperationKind::Redeem,
            Command::RedeemByPartition { .. } => OperationKind::RedeemByPartition,
            Command::RedeemFrom { .. } => OperationKind::RedeemFrom,
            Command::OperatorRedeemByPartition { .. } => OperationKind::OperatorRedeemByPartition,
            Command::ControllerRedeem { .. } => OperationKind::ControllerRedeem,
            Command::Approve { .. } => OperationKind::Approve,
            Command::ApproveByPartition { .. } => OperationKind::ApproveByPartition,
            Command::AuthorizeOperator { .. } => OperationKind::AuthorizeOperator,
            Command::RevokeOperator { .. } => OperationKind::RevokeOperator,
            Command::AuthorizeOperatorByPartition { .. } => OperationKind::AuthorizeOperatorByPartition,
            Command::RevokeOperatorByPartition { .. } => OperationKind::RevokeOperatorByPartition,
            Command::SetDefaultPartitions { .. } => OperationKind::SetDefaultPartitions,
            Command::GrantRole { .. } => OperationKind::GrantRole,
            Command::RevokeRole { .. } => OperationKind::RevokeRole,
            Command::RenounceRole { .. } => OperationKind::RenounceRole,
            Command::Pause => OperationKind::Pause,
            Command::Unpause => OperationKind::Unpause,
            Command::SetDocument { .. } => OperationKind::SetDocument,
        }
    }

    /// Resources this command touches when submitted by `caller`.
    ///
    /// Every command reads `Settings` (roles, pause flag, defaults). Balance
    /// movements write the holders on both ends; issuance and redemption also
    /// write `Supply`, as does a transfer carrying a partition-change flag.
    pub fn footprint(&self, caller: &HolderId) -> Vec<(Resource, AccessIntent)> {
        use AccessIntent::{Read, Write};

        let mut footprint = Vec::new();
        match self {
            Command::Issue { to, .. }
            | Command::IssueByPartition { to, .. }
            | Command::IssueOwned { to, .. } => {
                footprint.push((Resource::Holder(*to), Write));
                footprint.push((Resource::Supply, Write));
            }
            Command::Transfer { to, .. }
            | Command::TransferWithData { to, .. }
            | Command::TransferByPartition { to, .. } => {
                footprint.push((Resource::Holder(*caller), Write));
                footprint.push((Resource::Holder(*to), Write));
            }
            Command::TransferFromWithData { from, to, .. }
            | Command::ControllerTransfer { from, to, .. } => {
                footprint.push((Resource::Holder(*from), Write));
                footprint.push((Resource::Holder(*to), Write));
            }
            Command::OperatorTransferByPartition { from, to, data, .. } => {
                footprint.push((Resource::Holder(*from), Write));
                footprint.push((Resource::Holder(*to), Write));
                if Partition::change_request(data).is_some() {
                    footprint.push((Resource::Supply, Write));
                }
            }
            Command::Redeem { .. } | Command::RedeemByPartition { .. } => {
                footprint.push((Resource::Holder(*caller), Write));
                footprint.push((Resource::Supply, Write));
            }
            Command::RedeemFrom { from: holder, .. }
            | Command::OperatorRedeemByPartition { holder, .. }
            | Command::ControllerRedeem { holder, .. } => {
                footprint.push((Resource::Holder(*holder), Write));
                footprint.push((Resource::Supply, Write));
            }
            Command::Approve { .. }
            | Command::ApproveByPartition { .. }
            | Command::AuthorizeOperator { .. }
            | Command::RevokeOperator { .. }
            | Command::AuthorizeOperatorByPartition { .. }
            | Command::RevokeOperatorByPartition { .. } => {
                footprint.push((Resource::Holder(*caller), Write));
            }
            Command::SetDefaultPartitions { .. }
            | Command::GrantRole { .. }
            | Command::RevokeRole { .. }
            | Command::RenounceRole { .. }
            | Command::Pause
            | Command::Unpause
            | Command::SetDocument { .. } => {
                footprint.push((Resource::Settings, Write));
                return footprint;
            }
        }
        footprint.push((Resource::Settings, Read));
        footprint
    }
}
