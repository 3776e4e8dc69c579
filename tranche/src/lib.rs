//! Tranche: a regulated, partitioned security-token ledger
//!
//! This crate re-exports all the components of the Tranche workspace.

pub use tranche_core::*;
pub use tranche_ledger::*;
pub use tranche_storage::*;
