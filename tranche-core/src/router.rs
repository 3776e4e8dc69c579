use crate::error::{InsufficientBalanceError, Result, ValidationError};
use crate::id::HolderId;
use crate::partition::Partition;
use crate::partitions::PartitionTable;
use crate::Amount;
use serde::{Deserialize, Serialize};

/// Amount taken from one partition while resolving a partition-agnostic debit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDraw {
    pub partition: Partition,
    pub amount: Amount,
}

impl PartitionDraw {
    pub fn new(partition: Partition, amount: Amount) -> Self {
        Self { partition, amount }
    }
}

/// Resolves plain issue/transfer/redeem calls onto concrete partitions using
/// the issuer's ordered list of default partitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultPartitionRouter {
    partitions: Vec<Partition>,
}

impl DefaultPartitionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from an initial list, rejecting duplicates
    pub fn with_partitions(partitions: Vec<Partition>) -> Result<Self> {
        let mut router = Self::new();
        router.set_default_partitions(partitions)?;
        Ok(router)
    }

    /// Replace the default list. Authorization is the caller's concern.
    pub fn set_default_partitions(&mut self, partitions: Vec<Partition>) -> Result<()> {
        for (i, partition) in partitions.iter().enumerate() {
            if partitions[..i].contains(partition) {
                return Err(ValidationError::DuplicateDefaultPartition(*partition).into());
            }
        }
        self.partitions = partitions;
        Ok(())
    }

    pub fn default_partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Partition credited by issuance without an explicit partition: always
    /// the first default partition.
    pub fn resolve_credit(&self) -> Result<Partition> {
        self.partitions
            .first()
            .copied()
            .ok_or_else(|| ValidationError::EmptyDefaultPartitions.into())
    }

    /// Plan a partition-agnostic debit of `amount` from `holder`.
    ///
    /// Drains default partitions in list order until `amount` is covered and
    /// returns the draws in that order. Partitions outside the default list
    /// are never used. Nothing is mutated; the caller applies the plan.
    pub fn resolve_debit(
        &self,
        table: &PartitionTable,
        holder: &HolderId,
        amount: Amount,
    ) -> Result<Vec<PartitionDraw>> {
        if self.partitions.is_empty() {
            return Err(ValidationError::EmptyDefaultPartitions.into());
        }

        let mut draws = Vec::new();
        let mut remaining = amount;
        let mut available: Amount = 0;

        for partition in &self.partitions {
            if remaining == 0 {
                break;
            }
            let balance = table.balance_of_partition(holder, partition);
            available = available.saturating_add(balance);
            if balance == 0 {
                continue;
            }
            let taken = balance.min(remaining);
            draws.push(PartitionDraw::new(*partition, taken));
            remaining -= taken;
        }

        if remaining > 0 {
            return Err(InsufficientBalanceError::DefaultPartitions {
                holder: *holder,
                available,
                requested: amount,
            }
            .into());
        }

        Ok(draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    fn p(label: &'static str) -> Partition {
        Partition::label(label)
    }

    fn table_with(holder: &HolderId, balances: &[(&'static str, Amount)]) -> PartitionTable {
        let mut table = PartitionTable::new();
        for (label, amount) in balances {
            table.credit_partition(holder, &p(label), *amount).unwrap();
        }
        table
    }

    #[test]
    fn test_debit_drains_defaults_in_list_order() {
        let holder = HolderId::named("alice");
        let table = table_with(&holder, &[("reserved", 1000), ("issued", 1000), ("locked", 1000)]);
        let router =
            DefaultPartitionRouter::with_partitions(vec![p("locked"), p("reserved"), p("issued")]).unwrap();

        let draws = router.resolve_debit(&table, &holder, 2500).unwrap();
        assert_eq!(
            draws,
            vec![
                PartitionDraw::new(p("locked"), 1000),
                PartitionDraw::new(p("reserved"), 1000),
                PartitionDraw::new(p("issued"), 500),
            ]
        );
    }

    #[test]
    fn test_debit_skips_empty_partitions() {
        let holder = HolderId::named("alice");
        let table = table_with(&holder, &[("issued", 30)]);
        let router = DefaultPartitionRouter::with_partitions(vec![p("reserved"), p("issued")]).unwrap();

        let draws = router.resolve_debit(&table, &holder, 20).unwrap();
        assert_eq!(draws, vec![PartitionDraw::new(p("issued"), 20)]);
    }

    #[test]
    fn test_debit_never_touches_partitions_outside_list() {
        let holder = HolderId::named("alice");
        let table = table_with(&holder, &[("reserved", 100), ("locked", 1000)]);
        let router = DefaultPartitionRouter::with_partitions(vec![p("reserved")]).unwrap();

        let err = router.resolve_debit(&table, &holder, 150).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance(InsufficientBalanceError::DefaultPartitions {
                available: 100,
                requested: 150,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_list_fails_both_directions() {
        let holder = HolderId::named("alice");
        let table = table_with(&holder, &[("reserved", 100)]);
        let router = DefaultPartitionRouter::new();

        assert!(matches!(
            router.resolve_credit(),
            Err(LedgerError::Validation(ValidationError::EmptyDefaultPartitions))
        ));
        assert!(matches!(
            router.resolve_debit(&table, &holder, 1),
            Err(LedgerError::Validation(ValidationError::EmptyDefaultPartitions))
        ));
    }

    #[test]
    fn test_credit_uses_first_default() {
        let router = DefaultPartitionRouter::with_partitions(vec![p("issued"), p("reserved")]).unwrap();
        assert_eq!(router.resolve_credit().unwrap(), p("issued"));
    }

    #[test]
    fn test_duplicates_rejected_and_list_kept() {
        let mut router = DefaultPartitionRouter::with_partitions(vec![p("issued")]).unwrap();
        let err = router
            .set_default_partitions(vec![p("reserved"), p("locked"), p("reserved")])
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::DuplicateDefaultPartition(_))
        ));
        assert_eq!(router.default_partitions(), &[p("issued")]);
    }
}
