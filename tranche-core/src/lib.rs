pub mod error;
pub mod events;
pub mod id;
pub mod lots;
pub mod operation;
pub mod partition;
pub mod partitions;
pub mod router;

/// Token amounts. Always an integral number of base units.
pub type Amount = u128;

// Re-export the main types for convenience
pub use error::{
    AuthorizationError, InsufficientBalanceError, LedgerError, RestrictionError, Result,
    ValidationError,
};
pub use events::LedgerEvent;
pub use id::HolderId;
pub use lots::{ConsumptionOrder, OwnershipLedger, OwnershipSlice};
pub use operation::{OperationKind, OperationReceipt, OperationState};
pub use partition::{Partition, CHANGE_PARTITION_FLAG};
pub use partitions::PartitionTable;
pub use router::{DefaultPartitionRouter, PartitionDraw};
