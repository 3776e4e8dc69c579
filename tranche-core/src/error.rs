use crate::id::HolderId;
use crate::partition::Partition;
use crate::Amount;
use std::io;
use thiserror::Error;

/// Request is malformed or violates a static token rule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("zero address is not a valid {0}")]
    ZeroAddress(&'static str),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("amount {amount} is not a multiple of the granularity {granularity}")]
    NotGranular { amount: u128, granularity: u128 },

    #[error("issuing {amount} would overflow the supply of partition {partition}")]
    SupplyOverflow { partition: Partition, amount: u128 },

    #[error("granularity must be at least 1")]
    InvalidGranularity,

    #[error("no default partitions are configured")]
    EmptyDefaultPartitions,

    #[error("partition {0} appears more than once in the default partitions")]
    DuplicateDefaultPartition(Partition),

    #[error("a holder cannot authorize or revoke itself as operator")]
    SelfAuthorization,

    #[error("token is no longer issuable")]
    NotIssuable,

    #[error("document {0:?} does not exist")]
    UnknownDocument(String),

    #[error("token holder index {index} out of range ({count} holders)")]
    HolderIndexOutOfRange { index: usize, count: usize },
}

/// Caller lacks the capability required for the operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("{account} is missing role {role}")]
    MissingRole { role: String, account: HolderId },

    #[error("{operator} is not an operator for {holder}")]
    NotOperator { operator: HolderId, holder: HolderId },

    #[error("{operator} is not an operator for {holder} in partition {partition}")]
    NotPartitionOperator {
        operator: HolderId,
        holder: HolderId,
        partition: Partition,
    },

    #[error("allowance of {spender} over {holder} is {available}, {requested} requested")]
    InsufficientAllowance {
        holder: HolderId,
        spender: HolderId,
        available: Amount,
        requested: Amount,
    },

    #[error("token is paused")]
    Paused,

    #[error("token is not controllable")]
    NotControllable,
}

/// The eligibility gate denied the operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestrictionError {
    #[error("transfer from {from} to {to} is restricted")]
    TransferRestricted { from: HolderId, to: HolderId },
}

/// Not enough balance in the place the operation draws from
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InsufficientBalanceError {
    #[error("{holder} holds {available} in partition {partition}, {requested} requested")]
    Partition {
        holder: HolderId,
        partition: Partition,
        available: Amount,
        requested: Amount,
    },

    #[error("{holder} holds {available} across default partitions, {requested} requested")]
    DefaultPartitions {
        holder: HolderId,
        available: Amount,
        requested: Amount,
    },

    #[error("{holder} owns {available} across ownership lots, {requested} requested")]
    OwnedLots {
        holder: HolderId,
        available: Amount,
        requested: Amount,
    },
}

/// Represents all possible errors that can occur when operating the ledger
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed request (zero address, non-granular amount, ...)
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Missing role, operator approval or allowance
    #[error("not authorized: {0}")]
    Authorization(#[from] AuthorizationError),

    /// Denied by the eligibility gate
    #[error("restricted: {0}")]
    Restriction(#[from] RestrictionError),

    /// Partition, default-partition or owned-lot balance too small
    #[error("insufficient balance: {0}")]
    InsufficientBalance(#[from] InsufficientBalanceError),

    /// A lot chain's timestamp index disagrees with the chain itself
    #[error("ownership lot at timestamp {timestamp} for {holder} is out of order")]
    DuplicateTimestampOutOfOrder { holder: HolderId, timestamp: u64 },

    /// Internal consistency failure; indicates a bug, never a user error
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// IO errors that occur when reading/writing journal files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors that occur during journal operations
    #[error("Journal error: {0}")]
    Journal(String),

    /// Invalid token configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether this error reports a bug in the ledger rather than a
    /// legitimate rejection of the request.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::InvariantViolation(_) | LedgerError::DuplicateTimestampOutOfOrder { .. }
        )
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(err: bincode::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_classification() {
        let bug = LedgerError::InvariantViolation("lots drifted".to_string());
        assert!(bug.is_invariant_violation());

        let out_of_order = LedgerError::DuplicateTimestampOutOfOrder {
            holder: HolderId::named("alice"),
            timestamp: 7,
        };
        assert!(out_of_order.is_invariant_violation());

        let rejection: LedgerError = ValidationError::ZeroAmount.into();
        assert!(!rejection.is_invariant_violation());
    }

    #[test]
    fn test_messages_name_the_failure() {
        let err: LedgerError = ValidationError::NotGranular {
            amount: 3,
            granularity: 2,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "validation failed: amount 3 is not a multiple of the granularity 2"
        );
    }
}
