use crate::error::{InsufficientBalanceError, LedgerError, Result};
use crate::id::HolderId;
use crate::partition::Partition;
use crate::Amount;
use std::collections::HashMap;

/// Partition balances of a single holder
#[derive(Debug, Clone, Default)]
struct HolderPartitions {
    /// Balance per partition; zero entries are kept once created
    balances: HashMap<Partition, Amount>,

    /// Partitions with a nonzero balance, in the order they were first credited
    held: Vec<Partition>,

    /// Sum of all partition balances
    total: Amount,
}

/// Per-holder, per-partition balances and per-partition supply
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    holders: HashMap<HolderId, HolderPartitions>,
    supply_by_partition: HashMap<Partition, Amount>,
    /// Every partition that has ever held supply, in first-credit order
    all_partitions: Vec<Partition>,
    total_supply: Amount,
}

impl PartitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increase `holder`'s balance in `partition` and the partition's supply.
    ///
    /// A zero amount is a no-op.
    pub fn credit_partition(
        &mut self,
        holder: &HolderId,
        partition: &Partition,
        amount: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }

        let supply = self.supply_by_partition.get(partition).copied().unwrap_or(0);
        let new_supply = supply
            .checked_add(amount)
            .ok_or_else(|| overflow("partition supply", partition))?;
        let new_total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| overflow("total supply", partition))?;

        let entry = self.holders.entry(*holder).or_default();
        let balance = entry.balances.entry(*partition).or_insert(0);
        if *balance == 0 {
            entry.held.push(*partition);
        }
        *balance += amount;
        entry.total += amount;

        if supply == 0 && !self.all_partitions.contains(partition) {
            self.all_partitions.push(*partition);
        }
        self.supply_by_partition.insert(*partition, new_supply);
        self.total_supply = new_total_supply;

        Ok(())
    }

    /// Decrease `holder`'s balance in `partition` and the partition's supply.
    ///
    /// Fails without touching anything if the holder's partition balance is
    /// smaller than `amount`. A partition whose balance drops to zero is
    /// removed from the holder's enumeration but stays in the global set.
    pub fn debit_partition(
        &mut self,
        holder: &HolderId,
        partition: &Partition,
        amount: Amount,
    ) -> Result<()> {
        let available = self.balance_of_partition(holder, partition);
        if available < amount {
            return Err(InsufficientBalanceError::Partition {
                holder: *holder,
                partition: *partition,
                available,
                requested: amount,
            }
            .into());
        }
        if amount == 0 {
            return Ok(());
        }

        let supply = self.supply_by_partition.get(partition).copied().unwrap_or(0);
        if supply < amount || self.total_supply < amount {
            return Err(LedgerError::InvariantViolation(format!(
                "partition {} supply {} is below holder balance {}",
                partition, supply, available
            )));
        }

        // Presence was established by balance_of_partition above
        if let Some(entry) = self.holders.get_mut(holder) {
            let remaining = available - amount;
            entry.balances.insert(*partition, remaining);
            entry.total -= amount;
            if remaining == 0 {
                entry.held.retain(|p| p != partition);
            }
        }

        self.supply_by_partition.insert(*partition, supply - amount);
        self.total_supply -= amount;

        Ok(())
    }

    pub fn balance_of(&self, holder: &HolderId) -> Amount {
        self.holders.get(holder).map(|h| h.total).unwrap_or(0)
    }

    pub fn balance_of_partition(&self, holder: &HolderId, partition: &Partition) -> Amount {
        self.holders
            .get(holder)
            .and_then(|h| h.balances.get(partition))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn total_supply_of_partition(&self, partition: &Partition) -> Amount {
        self.supply_by_partition.get(partition).copied().unwrap_or(0)
    }

    /// Partitions in which `holder` has a nonzero balance, in first-credit order
    pub fn partitions_of(&self, holder: &HolderId) -> Vec<Partition> {
        self.holders
            .get(holder)
            .map(|h| h.held.clone())
            .unwrap_or_default()
    }

    /// Every partition that has ever held supply
    pub fn all_partitions(&self) -> &[Partition] {
        &self.all_partitions
    }

    /// Holders that have ever been credited
    pub fn holders(&self) -> impl Iterator<Item = &HolderId> {
        self.holders.keys()
    }

    /// Check that every holder's partition balances add up to its total and
    /// that partition supplies add up to the total supply.
    pub fn check_consistency(&self) -> Result<()> {
        let mut by_partition: HashMap<Partition, Amount> = HashMap::new();
        let mut holders_total: Amount = 0;

        for (holder, entry) in &self.holders {
            let sum: Amount = entry.balances.values().sum();
            if sum != entry.total {
                return Err(LedgerError::InvariantViolation(format!(
                    "{} partition balances sum to {} but total is {}",
                    holder, sum, entry.total
                )));
            }
            for (partition, balance) in &entry.balances {
                *by_partition.entry(*partition).or_insert(0) += balance;
                let listed = entry.held.contains(partition);
                if listed != (*balance > 0) {
                    return Err(LedgerError::InvariantViolation(format!(
                        "{} enumeration of partition {} disagrees with balance {}",
                        holder, partition, balance
                    )));
                }
            }
            holders_total += entry.total;
        }

        for (partition, supply) in &self.supply_by_partition {
            let held = by_partition.get(partition).copied().unwrap_or(0);
            if held != *supply {
                return Err(LedgerError::InvariantViolation(format!(
                    "partition {} supply is {} but holders own {}",
                    partition, supply, held
                )));
            }
        }

        let supply_sum: Amount = self.supply_by_partition.values().sum();
        if supply_sum != self.total_supply || holders_total != self.total_supply {
            return Err(LedgerError::InvariantViolation(format!(
                "total supply {} disagrees with partition supplies {} and holder balances {}",
                self.total_supply, supply_sum, holders_total
            )));
        }

        Ok(())
    }
}

fn overflow(what: &str, partition: &Partition) -> LedgerError {
    LedgerError::InvariantViolation(format!("{} overflow in partition {}", what, partition))
}
