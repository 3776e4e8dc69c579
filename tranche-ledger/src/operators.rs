use std::collections::{HashMap, HashSet};
use tranche_core::error::{AuthorizationError, Result};
use tranche_core::id::HolderId;
use tranche_core::partition::Partition;
use tranche_core::Amount;

/// Operator approvals and spending allowances granted by holders
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    /// (holder, operator) pairs allowed across every partition
    operators: HashSet<(HolderId, HolderId)>,
    /// (holder, partition, operator) triples
    partition_operators: HashSet<(HolderId, Partition, HolderId)>,
    /// (owner, spender) → amount
    allowances: HashMap<(HolderId, HolderId), Amount>,
    /// (owner, partition, spender) → amount
    partition_allowances: HashMap<(HolderId, Partition, HolderId), Amount>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authorize(&mut self, holder: HolderId, operator: HolderId) {
        self.operators.insert((holder, operator));
    }

    pub fn revoke(&mut self, holder: &HolderId, operator: &HolderId) {
        self.operators.remove(&(*holder, *operator));
    }

    pub fn authorize_for_partition(&mut self, holder: HolderId, partition: Partition, operator: HolderId) {
        self.partition_operators.insert((holder, partition, operator));
    }

    pub fn revoke_for_partition(&mut self, holder: &HolderId, partition: &Partition, operator: &HolderId) {
        self.partition_operators
            .remove(&(*holder, *partition, *operator));
    }

    /// Explicit global approval; role-based controllers are resolved by the token
    pub fn is_operator(&self, operator: &HolderId, holder: &HolderId) -> bool {
        self.operators.contains(&(*holder, *operator))
    }

    /// Global approval or approval for this partition
    pub fn is_operator_for_partition(&self, partition: &Partition, operator: &HolderId, holder: &HolderId) -> bool {
        self.is_operator(operator, holder)
            || self
                .partition_operators
                .contains(&(*holder, *partition, *operator))
    }

    /// Overwrite the allowance (ERC20 semantics, not additive)
    pub fn approve(&mut self, owner: HolderId, spender: HolderId, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    pub fn approve_for_partition(&mut self, owner: HolderId, partition: Partition, spender: HolderId, amount: Amount) {
        if amount == 0 {
            self.partition_allowances.remove(&(owner, partition, spender));
        } else {
            self.partition_allowances
                .insert((owner, partition, spender), amount);
        }
    }

    pub fn allowance(&self, owner: &HolderId, spender: &HolderId) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    pub fn allowance_for_partition(&self, owner: &HolderId, partition: &Partition, spender: &HolderId) -> Amount {
        self.partition_allowances
            .get(&(*owner, *partition, *spender))
            .copied()
            .unwrap_or(0)
    }

    /// Fail unless the allowance covers `amount`. Does not spend.
    pub fn check_allowance(&self, owner: &HolderId, spender: &HolderId, amount: Amount) -> Result<()> {
        let available = self.allowance(owner, spender);
        if available < amount {
            return Err(AuthorizationError::InsufficientAllowance {
                holder: *owner,
                spender: *spender,
                available,
                requested: amount,
            }
            .into());
        }
        Ok(())
    }

    pub fn check_partition_allowance(
        &self,
        owner: &HolderId,
        partition: &Partition,
        spender: &HolderId,
        amount: Amount,
    ) -> Result<()> {
        let available = self.allowance_for_partition(owner, partition, spender);
        if available < amount {
            return Err(AuthorizationError::InsufficientAllowance {
                holder: *owner,
                spender: *spender,
                available,
                requested: amount,
            }
            .into());
        }
        Ok(())
    }

    /// Decrease the allowance after a checked transfer
    pub fn spend_allowance(&mut self, owner: &HolderId, spender: &HolderId, amount: Amount) -> Result<()> {
        self.check_allowance(owner, spender, amount)?;
        let remaining = self.allowance(owner, spender) - amount;
        self.approve(*owner, *spender, remaining);
        Ok(())
    }

    pub fn spend_partition_allowance(
        &mut self,
        owner: &HolderId,
        partition: &Partition,
        spender: &HolderId,
        amount: Amount,
    ) -> Result<()> {
        self.check_partition_allowance(owner, partition, spender, amount)?;
        let remaining = self.allowance_for_partition(owner, partition, spender) - amount;
        self.approve_for_partition(*owner, *partition, *spender, remaining);
        Ok(())
    }
}
