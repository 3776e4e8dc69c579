//! Ownership lots: per-holder provenance of balance.
//!
//! Every holder owns one chain of lots ordered by strictly increasing
//! timestamp. A chain is an arena of nodes linked through index handles:
//! `prev` points at the next older lot, `next` at the next newer one. The
//! chain keeps both ends so that transfers (newest first) and redemptions
//! (oldest first) start in O(1), and a timestamp index so that issuance at an
//! existing timestamp merges into the lot already there.

use crate::error::{InsufficientBalanceError, LedgerError, Result};
use crate::id::HolderId;
use crate::Amount;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque index of a lot inside its holder's chain arena
type LotHandle = usize;

/// A timestamped slice of a holder's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipSlice {
    /// When this part of the balance was acquired (Unix seconds)
    pub timestamp: u64,

    /// How much of the balance the slice covers
    pub amount: Amount,
}

impl OwnershipSlice {
    pub fn new(timestamp: u64, amount: Amount) -> Self {
        Self { timestamp, amount }
    }
}

/// Which end of the chain a consumption starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumptionOrder {
    /// Start from the most recently acquired lot (transfers)
    NewestFirst,
    /// Start from the longest held lot (redemptions)
    OldestFirst,
}

#[derive(Debug, Clone)]
struct LotNode {
    amount: Amount,
    timestamp: u64,
    /// Next older lot
    prev: Option<LotHandle>,
    /// Next newer lot
    next: Option<LotHandle>,
}

/// One holder's chain of ownership lots
#[derive(Debug, Clone, Default)]
struct LotChain {
    nodes: Vec<Option<LotNode>>,
    free: Vec<LotHandle>,
    /// Newest lot
    head: Option<LotHandle>,
    /// Oldest lot
    tail: Option<LotHandle>,
    by_timestamp: HashMap<u64, LotHandle>,
    total: Amount,
}

impl LotChain {
    fn node(&self, handle: LotHandle) -> Result<&LotNode> {
        self.nodes
            .get(handle)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| dangling(handle))
    }

    fn node_mut(&mut self, handle: LotHandle) -> Result<&mut LotNode> {
        self.nodes
            .get_mut(handle)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| dangling(handle))
    }

    fn allocate(&mut self, node: LotNode) -> LotHandle {
        match self.free.pop() {
            Some(handle) => {
                self.nodes[handle] = Some(node);
                handle
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn record(&mut self, holder: &HolderId, timestamp: u64, amount: Amount) -> Result<()> {
        let new_total = self.total.checked_add(amount).ok_or_else(|| {
            LedgerError::InvariantViolation(format!("owned balance overflow for {}", holder))
        })?;

        if let Some(&handle) = self.by_timestamp.get(&timestamp) {
            let node = self.node_mut(handle)?;
            if node.timestamp != timestamp {
                return Err(LedgerError::DuplicateTimestampOutOfOrder {
                    holder: *holder,
                    timestamp,
                });
            }
            node.amount += amount;
            self.total = new_total;
            return Ok(());
        }

        // Find the neighbours: `older` is the newest lot strictly older than
        // `timestamp`, `newer` the oldest lot strictly newer.
        let mut newer: Option<LotHandle> = None;
        let mut older = self.head;
        while let Some(handle) = older {
            let node = self.node(handle)?;
            if node.timestamp < timestamp {
                break;
            }
            if node.timestamp == timestamp {
                // Present in the chain but missing from the index
                return Err(LedgerError::DuplicateTimestampOutOfOrder {
                    holder: *holder,
                    timestamp,
                });
            }
            newer = Some(handle);
            older = node.prev;
        }

        let handle = self.allocate(LotNode {
            amount,
            timestamp,
            prev: older,
            next: newer,
        });

        match older {
            Some(o) => self.node_mut(o)?.next = Some(handle),
            None => self.tail = Some(handle),
        }
        match newer {
            Some(n) => self.node_mut(n)?.prev = Some(handle),
            None => self.head = Some(handle),
        }

        self.by_timestamp.insert(timestamp, handle);
        self.total = new_total;
        Ok(())
    }

    fn unlink(&mut self, handle: LotHandle) -> Result<()> {
        let (prev, next, timestamp) = {
            let node = self.node(handle)?;
            (node.prev, node.next, node.timestamp)
        };

        match prev {
            Some(p) => self.node_mut(p)?.next = next,
            None => self.tail = next,
        }
        match next {
            Some(n) => self.node_mut(n)?.prev = prev,
            None => self.head = prev,
        }

        self.by_timestamp.remove(&timestamp);
        self.nodes[handle] = None;
        self.free.push(handle);
        Ok(())
    }

    fn consume(
        &mut self,
        holder: &HolderId,
        amount: Amount,
        order: ConsumptionOrder,
    ) -> Result<Vec<OwnershipSlice>> {
        if self.total < amount {
            return Err(insufficient(holder, self.total, amount));
        }

        let mut consumed = Vec::new();
        let mut remaining = amount;
        let mut cursor = match order {
            ConsumptionOrder::NewestFirst => self.head,
            ConsumptionOrder::OldestFirst => self.tail,
        };

        while remaining > 0 {
            let handle = cursor.ok_or_else(|| {
                LedgerError::InvariantViolation(format!(
                    "lot chain of {} ended with {} left to consume",
                    holder, remaining
                ))
            })?;

            let node = self.node_mut(handle)?;
            let taken = remaining.min(node.amount);
            node.amount -= taken;
            remaining -= taken;
            consumed.push(OwnershipSlice::new(node.timestamp, taken));

            let emptied = node.amount == 0;
            cursor = match order {
                ConsumptionOrder::NewestFirst => node.prev,
                ConsumptionOrder::OldestFirst => node.next,
            };

            if emptied {
                self.unlink(handle)?;
            }
        }

        self.total -= amount;
        Ok(consumed)
    }

    fn describe(&self, holder: &HolderId, amount: Amount) -> Result<Vec<OwnershipSlice>> {
        if self.total < amount {
            return Err(insufficient(holder, self.total, amount));
        }

        let mut slices = Vec::new();
        let mut remaining = amount;
        let mut cursor = self.tail;

        while remaining > 0 {
            let Some(handle) = cursor else {
                return Err(LedgerError::InvariantViolation(format!(
                    "lot chain of {} ended with {} left to describe",
                    holder, remaining
                )));
            };
            let node = self.node(handle)?;
            let taken = remaining.min(node.amount);
            slices.push(OwnershipSlice::new(node.timestamp, taken));
            remaining -= taken;
            cursor = node.next;
        }

        Ok(slices)
    }

    fn iter(&self) -> LotIter<'_> {
        LotIter {
            chain: self,
            cursor: self.tail,
        }
    }

    fn check(&self, holder: &HolderId) -> Result<()> {
        let mut sum: Amount = 0;
        let mut count = 0usize;
        let mut last: Option<(LotHandle, u64)> = None;
        let mut cursor = self.tail;

        while let Some(handle) = cursor {
            let node = self.node(handle)?;
            let fail = |what: &str| {
                Err(LedgerError::InvariantViolation(format!(
                    "lot chain of {} at timestamp {}: {}",
                    holder, node.timestamp, what
                )))
            };

            if node.amount == 0 {
                return fail("empty lot left linked");
            }
            if node.prev != last.map(|(h, _)| h) {
                return fail("backward link does not match traversal");
            }
            if let Some((_, ts)) = last {
                if ts >= node.timestamp {
                    return fail("timestamps not strictly increasing");
                }
            }
            if self.by_timestamp.get(&node.timestamp) != Some(&handle) {
                return fail("timestamp index disagrees with chain");
            }

            sum += node.amount;
            count += 1;
            last = Some((handle, node.timestamp));
            cursor = node.next;
        }

        if self.head != last.map(|(h, _)| h) {
            return Err(LedgerError::InvariantViolation(format!(
                "lot chain head of {} is not its newest lot",
                holder
            )));
        }
        if count != self.by_timestamp.len() || sum != self.total {
            return Err(LedgerError::InvariantViolation(format!(
                "lot chain of {} holds {} lots totalling {}, index has {} entries and total {}",
                holder,
                count,
                sum,
                self.by_timestamp.len(),
                self.total
            )));
        }
        Ok(())
    }
}

/// Oldest to newest traversal of a chain
struct LotIter<'a> {
    chain: &'a LotChain,
    cursor: Option<LotHandle>,
}

impl Iterator for LotIter<'_> {
    type Item = OwnershipSlice;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.cursor?;
        let node = self.chain.nodes.get(handle)?.as_ref()?;
        self.cursor = node.next;
        Some(OwnershipSlice::new(node.timestamp, node.amount))
    }
}

/// Lot chains for every holder
#[derive(Debug, Clone, Default)]
pub struct OwnershipLedger {
    chains: HashMap<HolderId, LotChain>,
}

impl OwnershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `holder` acquired `amount` at `timestamp`.
    ///
    /// Merges into the lot at exactly `timestamp` when one exists, otherwise
    /// links a new lot in timestamp order. Appending at or after the newest
    /// lot is O(1); backdated lots cost a scan from the newest end.
    pub fn record_ownership(&mut self, holder: &HolderId, timestamp: u64, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.chains
            .entry(*holder)
            .or_default()
            .record(holder, timestamp, amount)
    }

    /// Consume `amount` starting from the newest lot. Used by transfers.
    pub fn consume_newest_first(&mut self, holder: &HolderId, amount: Amount) -> Result<Vec<OwnershipSlice>> {
        self.consume(holder, amount, ConsumptionOrder::NewestFirst)
    }

    /// Consume `amount` starting from the oldest lot. Used by redemptions.
    pub fn consume_oldest_first(&mut self, holder: &HolderId, amount: Amount) -> Result<Vec<OwnershipSlice>> {
        self.consume(holder, amount, ConsumptionOrder::OldestFirst)
    }

    /// Consume `amount` from `holder`'s lots in the given order.
    ///
    /// Lots that reach zero are unlinked. Fails with
    /// `InsufficientBalance::OwnedLots` and leaves the chain untouched when the
    /// holder owns less than `amount`.
    pub fn consume(
        &mut self,
        holder: &HolderId,
        amount: Amount,
        order: ConsumptionOrder,
    ) -> Result<Vec<OwnershipSlice>> {
        if amount == 0 {
            return Ok(Vec::new());
        }
        match self.chains.get_mut(holder) {
            Some(chain) => chain.consume(holder, amount, order),
            None => Err(insufficient(holder, 0, amount)),
        }
    }

    /// Decompose `amount` of `holder`'s balance into lots, oldest first.
    ///
    /// The last slice may cover only part of its lot. This never mutates and
    /// always reports oldest first, whichever order a later operation will
    /// consume in.
    pub fn describe_ownership(&self, holder: &HolderId, amount: Amount) -> Result<Vec<OwnershipSlice>> {
        match self.chains.get(holder) {
            Some(chain) => chain.describe(holder, amount),
            None if amount == 0 => Ok(Vec::new()),
            None => Err(insufficient(holder, 0, amount)),
        }
    }

    /// Every lot of `holder`, oldest first
    pub fn lots_of(&self, holder: &HolderId) -> Vec<OwnershipSlice> {
        self.chains
            .get(holder)
            .map(|chain| chain.iter().collect())
            .unwrap_or_default()
    }

    /// Sum of all of `holder`'s lots
    pub fn owned_balance(&self, holder: &HolderId) -> Amount {
        self.chains.get(holder).map(|c| c.total).unwrap_or(0)
    }

    /// Holders that have a chain
    pub fn holders(&self) -> impl Iterator<Item = &HolderId> {
        self.chains.keys()
    }

    /// Verify links, ordering and totals of every chain
    pub fn check_consistency(&self) -> Result<()> {
        for (holder, chain) in &self.chains {
            chain.check(holder)?;
        }
        Ok(())
    }
}

fn insufficient(holder: &HolderId, available: Amount, requested: Amount) -> LedgerError {
    InsufficientBalanceError::OwnedLots {
        holder: *holder,
        available,
        requested,
    }
    .into()
}

fn dangling(handle: LotHandle) -> LedgerError {
    LedgerError::InvariantViolation(format!("lot handle {} points at a free slot", handle))
}
