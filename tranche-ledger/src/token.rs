use crate::clock::{Clock, SystemClock};
use crate::command::Command;
use crate::compliance::{EligibilityGate, Unrestricted};
use crate::config::TokenConfig;
use crate::operators::OperatorRegistry;
use crate::roles::{Role, RoleCheck, RoleTable};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tranche_core::error::{
    AuthorizationError, InsufficientBalanceError, LedgerError, RestrictionError, Result,
    ValidationError,
};
use tranche_core::events::LedgerEvent;
use tranche_core::id::HolderId;
use tranche_core::lots::{ConsumptionOrder, OwnershipLedger, OwnershipSlice};
use tranche_core::operation::{OperationKind, OperationReceipt};
use tranche_core::partition::Partition;
use tranche_core::partitions::PartitionTable;
use tranche_core::router::{DefaultPartitionRouter, PartitionDraw};
use tranche_core::Amount;
use tranche_storage::LedgerJournal;

/// A document attached to the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub uri: String,
    pub document_hash: [u8; 32],
    /// Ledger clock reading when the document was last set
    pub timestamp: u64,
}

/// A single state change, applied only after the whole operation validated
#[derive(Debug, Clone)]
enum Mutation {
    Credit {
        holder: HolderId,
        partition: Partition,
        amount: Amount,
    },
    Debit {
        holder: HolderId,
        partition: Partition,
        amount: Amount,
    },
    RecordLot {
        holder: HolderId,
        timestamp: u64,
        amount: Amount,
    },
    ConsumeLots {
        holder: HolderId,
        amount: Amount,
        order: ConsumptionOrder,
    },
    RegisterHolder(HolderId),
    SpendAllowance {
        owner: HolderId,
        spender: HolderId,
        amount: Amount,
    },
    SpendPartitionAllowance {
        owner: HolderId,
        partition: Partition,
        spender: HolderId,
        amount: Amount,
    },
    Approve {
        owner: HolderId,
        spender: HolderId,
        amount: Amount,
    },
    ApproveByPartition {
        owner: HolderId,
        partition: Partition,
        spender: HolderId,
        amount: Amount,
    },
    AuthorizeOperator {
        holder: HolderId,
        operator: HolderId,
    },
    RevokeOperator {
        holder: HolderId,
        operator: HolderId,
    },
    AuthorizeOperatorByPartition {
        holder: HolderId,
        partition: Partition,
        operator: HolderId,
    },
    RevokeOperatorByPartition {
        holder: HolderId,
        partition: Partition,
        operator: HolderId,
    },
    GrantRole {
        role: Role,
        account: HolderId,
    },
    RevokeRole {
        role: Role,
        account: HolderId,
    },
    SetPaused(bool),
    SetDefaultPartitions(Vec<Partition>),
    SetDocument {
        name: String,
        document: Document,
    },
}

/// A validated operation: its receipt (with the events it will emit) and the
/// mutations that commit it
struct Plan {
    receipt: OperationReceipt,
    mutations: Vec<Mutation>,
}

impl Plan {
    fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.receipt.add_event(event);
    }

    fn now(&self) -> u64 {
        self.receipt.timestamp
    }
}

/// A balance movement between two holders, drawn from one or more partitions
struct Movement<'a> {
    operator: HolderId,
    from: HolderId,
    to: HolderId,
    draws: Vec<PartitionDraw>,
    /// Credit every draw to this partition instead of the one it came from
    to_partition: Option<Partition>,
    data: &'a [u8],
    operator_data: &'a [u8],
}

/// A partitioned security token.
///
/// Every operation takes the calling account first, runs all of its checks
/// against current state, journals the validated receipt and only then
/// mutates the partition table and the ownership lots. A rejected operation
/// changes nothing.
pub struct SecurityToken {
    config: TokenConfig,
    table: PartitionTable,
    lots: OwnershipLedger,
    router: DefaultPartitionRouter,
    roles: RoleTable,
    operators: OperatorRegistry,
    documents: HashMap<String, Document>,
    /// Holders in order of first receipt
    token_holders: Vec<HolderId>,
    registered: HashSet<HolderId>,
    paused: bool,
    sequence: u64,
    gate: Box<dyn EligibilityGate>,
    clock: Box<dyn Clock>,
    journal: Option<Box<dyn LedgerJournal>>,
}

impl SecurityToken {
    /// Create a token owned by `deployer`, who receives every role.
    ///
    /// Starts with no eligibility restrictions, the system clock and no
    /// journal; see the `with_*` builders.
    pub fn new(config: TokenConfig, deployer: HolderId) -> Result<Self> {
        config.validate()?;
        require_address(&deployer, "deployer")?;

        let router = DefaultPartitionRouter::with_partitions(config.default_partitions.clone())?;
        let mut roles = RoleTable::new();
        for role in [
            Role::Admin,
            Role::Minter,
            Role::Burner,
            Role::Controller,
            Role::Pauser,
        ] {
            roles.grant(role, deployer);
        }

        log::info!(
            "created token {} ({}) with granularity {} for {}",
            config.name,
            config.symbol,
            config.granularity,
            deployer
        );

        Ok(Self {
            config,
            table: PartitionTable::new(),
            lots: OwnershipLedger::new(),
            router,
            roles,
            operators: OperatorRegistry::new(),
            documents: HashMap::new(),
            token_holders: Vec::new(),
            registered: HashSet::new(),
            paused: false,
            sequence: 0,
            gate: Box::new(Unrestricted),
            clock: Box::new(SystemClock),
            journal: None,
        })
    }

    pub fn with_gate<G: EligibilityGate + 'static>(mut self, gate: G) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_journal<J: LedgerJournal + 'static>(mut self, journal: J) -> Self {
        self.journal = Some(Box::new(journal));
        self
    }

    // ------------------------------------------------------------------
    // Issuance
    // ------------------------------------------------------------------

    /// Issue into the first default partition with a lot at "now"
    pub fn issue(&mut self, caller: HolderId, to: HolderId, amount: Amount, data: &[u8]) -> Result<OperationReceipt> {
        let planned = self.plan_issue(OperationKind::Issue, caller, None, None, to, amount, data);
        self.run(OperationKind::Issue, planned)
    }

    pub fn issue_by_partition(
        &mut self,
        caller: HolderId,
        partition: Partition,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::IssueByPartition;
        let planned = self.plan_issue(kind, caller, Some(partition), None, to, amount, data);
        self.run(kind, planned)
    }

    /// Issue with an explicit acquisition timestamp for the new lot
    pub fn issue_owned(
        &mut self,
        caller: HolderId,
        partition: Partition,
        timestamp: u64,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::IssueOwned;
        let planned = self.plan_issue(kind, caller, Some(partition), Some(timestamp), to, amount, data);
        self.run(kind, planned)
    }

    // ------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------

    pub fn transfer(&mut self, caller: HolderId, to: HolderId, amount: Amount) -> Result<OperationReceipt> {
        let kind = OperationKind::Transfer;
        let planned = self.plan_holder_transfer(kind, caller, to, amount, &[]);
        self.run(kind, planned)
    }

    pub fn transfer_with_data(
        &mut self,
        caller: HolderId,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::TransferWithData;
        let planned = self.plan_holder_transfer(kind, caller, to, amount, data);
        self.run(kind, planned)
    }

    /// Transfer on behalf of `from`, as its operator or within its allowance
    pub fn transfer_from_with_data(
        &mut self,
        caller: HolderId,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::TransferFromWithData;
        let planned = self.plan_transfer_from(caller, from, to, amount, data);
        self.run(kind, planned)
    }

    /// Transfer from one of the caller's partitions. The recipient is
    /// credited in the same partition; partition-change flags are ignored.
    pub fn transfer_by_partition(
        &mut self,
        caller: HolderId,
        partition: Partition,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::TransferByPartition;
        let planned = self.plan_transfer_by_partition(caller, partition, to, amount, data);
        self.run(kind, planned)
    }

    /// Operator transfer from `from`'s `partition`.
    ///
    /// `data` carrying a partition-change flag credits the recipient in the
    /// flagged partition instead. A zero amount is accepted and changes nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn operator_transfer_by_partition(
        &mut self,
        caller: HolderId,
        partition: Partition,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: &[u8],
        operator_data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::OperatorTransferByPartition;
        let planned = self.plan_operator_transfer(caller, partition, from, to, amount, data, operator_data);
        self.run(kind, planned)
    }

    /// Forced transfer through the default partitions; ignores pause and
    /// operator approvals
    pub fn controller_transfer(
        &mut self,
        caller: HolderId,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: &[u8],
        operator_data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::ControllerTransfer;
        let planned = self.plan_controller_transfer(caller, from, to, amount, data, operator_data);
        self.run(kind, planned)
    }

    // ------------------------------------------------------------------
    // Redemption
    // ------------------------------------------------------------------

    pub fn redeem(&mut self, caller: HolderId, amount: Amount, data: &[u8]) -> Result<OperationReceipt> {
        let kind = OperationKind::Redeem;
        let planned = self.plan_redeem(kind, caller, caller, None, amount, data, &[]);
        self.run(kind, planned)
    }

    pub fn redeem_by_partition(
        &mut self,
        caller: HolderId,
        partition: Partition,
        amount: Amount,
        data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::RedeemByPartition;
        let planned = self.plan_redeem(kind, caller, caller, Some(partition), amount, data, &[]);
        self.run(kind, planned)
    }

    pub fn redeem_from(
        &mut self,
        caller: HolderId,
        from: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::RedeemFrom;
        let planned = self.plan_redeem(kind, caller, from, None, amount, data, &[]);
        self.run(kind, planned)
    }

    pub fn operator_redeem_by_partition(
        &mut self,
        caller: HolderId,
        partition: Partition,
        holder: HolderId,
        amount: Amount,
        operator_data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::OperatorRedeemByPartition;
        let planned = self.plan_redeem(kind, caller, holder, Some(partition), amount, &[], operator_data);
        self.run(kind, planned)
    }

    pub fn controller_redeem(
        &mut self,
        caller: HolderId,
        holder: HolderId,
        amount: Amount,
        data: &[u8],
        operator_data: &[u8],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::ControllerRedeem;
        let planned = self.plan_controller_redeem(caller, holder, amount, data, operator_data);
        self.run(kind, planned)
    }

    // ------------------------------------------------------------------
    // Allowances and operators
    // ------------------------------------------------------------------

    /// Set (not add to) `spender`'s allowance over the caller's balance
    pub fn approve(&mut self, caller: HolderId, spender: HolderId, amount: Amount) -> Result<OperationReceipt> {
        let kind = OperationKind::Approve;
        let planned = require_address(&spender, "spender").map(|_| {
            let mut plan = self.begin(kind, caller);
            plan.push(Mutation::Approve {
                owner: caller,
                spender,
                amount,
            });
            plan.emit(LedgerEvent::Approval {
                owner: caller,
                spender,
                amount,
            });
            plan
        });
        self.run(kind, planned)
    }

    pub fn approve_by_partition(
        &mut self,
        caller: HolderId,
        partition: Partition,
        spender: HolderId,
        amount: Amount,
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::ApproveByPartition;
        let planned = require_address(&spender, "spender").map(|_| {
            let mut plan = self.begin(kind, caller);
            plan.push(Mutation::ApproveByPartition {
                owner: caller,
                partition,
                spender,
                amount,
            });
            plan.emit(LedgerEvent::ApprovalByPartition {
                partition,
                owner: caller,
                spender,
                amount,
            });
            plan
        });
        self.run(kind, planned)
    }

    pub fn authorize_operator(&mut self, caller: HolderId, operator: HolderId) -> Result<OperationReceipt> {
        let kind = OperationKind::AuthorizeOperator;
        let planned = require_other_operator(&caller, &operator).map(|_| {
            let mut plan = self.begin(kind, caller);
            plan.push(Mutation::AuthorizeOperator {
                holder: caller,
                operator,
            });
            plan.emit(LedgerEvent::AuthorizedOperator {
                operator,
                holder: caller,
            });
            plan
        });
        self.run(kind, planned)
    }

    pub fn revoke_operator(&mut self, caller: HolderId, operator: HolderId) -> Result<OperationReceipt> {
        let kind = OperationKind::RevokeOperator;
        let planned = require_other_operator(&caller, &operator).map(|_| {
            let mut plan = self.begin(kind, caller);
            plan.push(Mutation::RevokeOperator {
                holder: caller,
                operator,
            });
            plan.emit(LedgerEvent::RevokedOperator {
                operator,
                holder: caller,
            });
            plan
        });
        self.run(kind, planned)
    }

    pub fn authorize_operator_by_partition(
        &mut self,
        caller: HolderId,
        partition: Partition,
        operator: HolderId,
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::AuthorizeOperatorByPartition;
        let planned = require_other_operator(&caller, &operator).map(|_| {
            let mut plan = self.begin(kind, caller);
            plan.push(Mutation::AuthorizeOperatorByPartition {
                holder: caller,
                partition,
                operator,
            });
            plan.emit(LedgerEvent::AuthorizedOperatorByPartition {
                partition,
                operator,
                holder: caller,
            });
            plan
        });
        self.run(kind, planned)
    }

    pub fn revoke_operator_by_partition(
        &mut self,
        caller: HolderId,
        partition: Partition,
        operator: HolderId,
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::RevokeOperatorByPartition;
        let planned = require_other_operator(&caller, &operator).map(|_| {
            let mut plan = self.begin(kind, caller);
            plan.push(Mutation::RevokeOperatorByPartition {
                holder: caller,
                partition,
                operator,
            });
            plan.emit(LedgerEvent::RevokedOperatorByPartition {
                partition,
                operator,
                holder: caller,
            });
            plan
        });
        self.run(kind, planned)
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Replace the default partitions. An empty list is allowed and makes
    /// partition-agnostic operations fail until defaults are set again.
    pub fn set_default_partitions(&mut self, caller: HolderId, partitions: Vec<Partition>) -> Result<OperationReceipt> {
        let kind = OperationKind::SetDefaultPartitions;
        let planned = self.plan_set_default_partitions(caller, partitions);
        self.run(kind, planned)
    }

    pub fn grant_role(&mut self, caller: HolderId, role: Role, account: HolderId) -> Result<OperationReceipt> {
        let kind = OperationKind::GrantRole;
        let planned = self
            .roles
            .require_role(Role::Admin, &caller)
            .and_then(|_| require_address(&account, "account"))
            .map(|_| {
                let mut plan = self.begin(kind, caller);
                if !self.roles.has_role(role, &account) {
                    plan.push(Mutation::GrantRole { role, account });
                    plan.emit(LedgerEvent::RoleGranted {
                        role: role.to_string(),
                        account,
                        sender: caller,
                    });
                }
                plan
            });
        self.run(kind, planned)
    }

    pub fn revoke_role(&mut self, caller: HolderId, role: Role, account: HolderId) -> Result<OperationReceipt> {
        let kind = OperationKind::RevokeRole;
        let planned = self.roles.require_role(Role::Admin, &caller).map(|_| self.plan_revoke_role(kind, caller, role, account));
        self.run(kind, planned)
    }

    /// Drop one of the caller's own roles
    pub fn renounce_role(&mut self, caller: HolderId, role: Role) -> Result<OperationReceipt> {
        let kind = OperationKind::RenounceRole;
        let planned = Ok(self.plan_revoke_role(kind, caller, role, caller));
        self.run(kind, planned)
    }

    pub fn pause(&mut self, caller: HolderId) -> Result<OperationReceipt> {
        let kind = OperationKind::Pause;
        let planned = self.plan_set_paused(kind, caller, true);
        self.run(kind, planned)
    }

    pub fn unpause(&mut self, caller: HolderId) -> Result<OperationReceipt> {
        let kind = OperationKind::Unpause;
        let planned = self.plan_set_paused(kind, caller, false);
        self.run(kind, planned)
    }

    /// Attach or replace a named document
    pub fn set_document(
        &mut self,
        caller: HolderId,
        name: &str,
        uri: &str,
        document_hash: [u8; 32],
    ) -> Result<OperationReceipt> {
        let kind = OperationKind::SetDocument;
        let planned = self.roles.require_role(Role::Controller, &caller).map(|_| {
            let mut plan = self.begin(kind, caller);
            let document = Document {
                uri: uri.to_string(),
                document_hash,
                timestamp: plan.now(),
            };
            plan.push(Mutation::SetDocument {
                name: name.to_string(),
                document,
            });
            plan.emit(LedgerEvent::Document {
                name: name.to_string(),
                uri: uri.to_string(),
                document_hash,
            });
            plan
        });
        self.run(kind, planned)
    }

    /// Dispatch a serialised command to the matching operation
    pub fn apply(&mut self, caller: HolderId, command: Command) -> Result<OperationReceipt> {
        match command {
            Command::Issue { to, amount, data } => self.issue(caller, to, amount, &data),
            Command::IssueByPartition {
                partition,
                to,
                amount,
                data,
            } => self.issue_by_partition(caller, partition, to, amount, &data),
            Command::IssueOwned {
                partition,
                timestamp,
                to,
                amount,
                data,
            } => self.issue_owned(caller, partition, timestamp, to, amount, &data),
            Command::Transfer { to, amount } => self.transfer(caller, to, amount),
            Command::TransferWithData { to, amount, data } => self.transfer_with_data(caller, to, amount, &data),
            Command::TransferFromWithData { from, to, amount, data } => {
                self.transfer_from_with_data(caller, from, to, amount, &data)
            }
            Command::TransferByPartition {
                partition,
                to,
                amount,
                data,
            } => self.transfer_by_partition(caller, partition, to, amount, &data),
            Command::OperatorTransferByPartition {
                partition,
                from,
                to,
                amount,
                data,
                operator_data,
            } => self.operator_transfer_by_partition(caller, partition, from, to, amount, &data, &operator_data),
            Command::ControllerTransfer {
                from,
                to,
                amount,
                data,
                operator_data,
            } => self.controller_transfer(caller, from, to, amount, &data, &operator_data),
            Command::Redeem { amount, data } => self.redeem(caller, amount, &data),
            Command::RedeemByPartition {
                partition,
                amount,
                data,
            } => self.redeem_by_partition(caller, partition, amount, &data),
            Command::RedeemFrom { from, amount, data } => self.redeem_from(caller, from, amount, &data),
            Command::OperatorRedeemByPartition {
                partition,
                holder,
                amount,
                operator_data,
            } => self.operator_redeem_by_partition(caller, partition, holder, amount, &operator_data),
            Command::ControllerRedeem {
                holder,
                amount,
                data,
                operator_data,
            } => self.controller_redeem(caller, holder, amount, &data, &operator_data),
            Command::Approve { spender, amount } => self.approve(caller, spender, amount),
            Command::ApproveByPartition {
                partition,
                spender,
                amount,
            } => self.approve_by_partition(caller, partition, spender, amount),
            Command::AuthorizeOperator { operator } => self.authorize_operator(caller, operator),
            Command::RevokeOperator { operator } => self.revoke_operator(caller, operator),
            Command::AuthorizeOperatorByPartition { partition, operator } => {
                self.authorize_operator_by_partition(caller, partition, operator)
            }
            Command::RevokeOperatorByPartition { partition, operator } => {
                self.revoke_operator_by_partition(caller, partition, operator)
            }
            Command::SetDefaultPartitions { partitions } => self.set_default_partitions(caller, partitions),
            Command::GrantRole { role, account } => self.grant_role(caller, role, account),
            Command::RevokeRole { role, account } => self.revoke_role(caller, role, account),
            Command::RenounceRole { role } => self.renounce_role(caller, role),
            Command::Pause => self.pause(caller),
            Command::Unpause => self.unpause(caller),
            Command::SetDocument {
                name,
                uri,
                document_hash,
            } => self.set_document(caller, &name, &uri, document_hash),
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Decompose `amount` of `holder`'s balance into lots, oldest first
    pub fn describe_ownership(&self, holder: &HolderId, amount: Amount) -> Result<Vec<OwnershipSlice>> {
        self.lots.describe_ownership(holder, amount)
    }

    pub fn lots_of(&self, holder: &HolderId) -> Vec<OwnershipSlice> {
        self.lots.lots_of(holder)
    }

    pub fn balance_of(&self, holder: &HolderId) -> Amount {
        self.table.balance_of(holder)
    }

    pub fn balance_of_by_partition(&self, partition: &Partition, holder: &HolderId) -> Amount {
        self.table.balance_of_partition(holder, partition)
    }

    pub fn total_supply(&self) -> Amount {
        self.table.total_supply()
    }

    pub fn total_supply_by_partition(&self, partition: &Partition) -> Amount {
        self.table.total_supply_of_partition(partition)
    }

    /// Partitions in which `holder` has a nonzero balance
    pub fn partitions_of(&self, holder: &HolderId) -> Vec<Partition> {
        self.table.partitions_of(holder)
    }

    /// Every partition that has ever held supply
    pub fn total_partitions(&self) -> Vec<Partition> {
        self.table.all_partitions().to_vec()
    }

    pub fn default_partitions(&self) -> &[Partition] {
        self.router.default_partitions()
    }

    pub fn token_holders_count(&self) -> usize {
        self.token_holders.len()
    }

    pub fn token_holder(&self, index: usize) -> Result<HolderId> {
        self.token_holders.get(index).copied().ok_or_else(|| {
            ValidationError::HolderIndexOutOfRange {
                index,
                count: self.token_holders.len(),
            }
            .into()
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.config.decimals
    }

    pub fn granularity(&self) -> Amount {
        self.config.granularity
    }

    pub fn is_controllable(&self) -> bool {
        self.config.controllable
    }

    pub fn is_issuable(&self) -> bool {
        self.config.issuable
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_role(&self, role: Role, account: &HolderId) -> bool {
        self.roles.has_role(role, account)
    }

    /// Controller or admin of a controllable token
    pub fn is_controller(&self, account: &HolderId) -> bool {
        self.config.controllable
            && (self.roles.has_role(Role::Controller, account) || self.roles.has_role(Role::Admin, account))
    }

    /// Holders operate their own balance; controllers operate everyone's
    pub fn is_operator(&self, operator: &HolderId, holder: &HolderId) -> bool {
        operator == holder || self.operators.is_operator(operator, holder) || self.is_controller(operator)
    }

    pub fn is_operator_for_partition(&self, partition: &Partition, operator: &HolderId, holder: &HolderId) -> bool {
        self.is_operator(operator, holder)
            || self
                .operators
                .is_operator_for_partition(partition, operator, holder)
    }

    pub fn allowance(&self, owner: &HolderId, spender: &HolderId) -> Amount {
        self.operators.allowance(owner, spender)
    }

    pub fn allowance_by_partition(&self, partition: &Partition, owner: &HolderId, spender: &HolderId) -> Amount {
        self.operators
            .allowance_for_partition(owner, partition, spender)
    }

    pub fn document(&self, name: &str) -> Result<&Document> {
        self.documents
            .get(name)
            .ok_or_else(|| ValidationError::UnknownDocument(name.to_string()).into())
    }

    /// Sequence number the next operation will carry
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Check that the partition table and the lot ledger agree for every
    /// holder and in total, and that both are internally consistent.
    pub fn verify_invariants(&self) -> Result<()> {
        self.table.check_consistency()?;
        self.lots.check_consistency()?;

        let holders: HashSet<&HolderId> = self.table.holders().chain(self.lots.holders()).collect();
        let mut owned_total: Amount = 0;
        for holder in holders {
            let balance = self.table.balance_of(holder);
            let owned = self.lots.owned_balance(holder);
            if balance != owned {
                return Err(LedgerError::InvariantViolation(format!(
                    "{} holds {} in partitions but {} across ownership lots",
                    holder, balance, owned
                )));
            }
            owned_total = owned_total.checked_add(owned).ok_or_else(|| {
                LedgerError::InvariantViolation("sum of owned balances overflows".to_string())
            })?;
        }

        if owned_total != self.table.total_supply() {
            return Err(LedgerError::InvariantViolation(format!(
                "lots total {} but total supply is {}",
                owned_total,
                self.table.total_supply()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Planning
    // ------------------------------------------------------------------

    fn begin(&self, kind: OperationKind, caller: HolderId) -> Plan {
        Plan {
            receipt: OperationReceipt::pending(self.sequence, kind, caller, self.clock.now()),
            mutations: Vec::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_issue(
        &self,
        kind: OperationKind,
        caller: HolderId,
        partition: Option<Partition>,
        timestamp: Option<u64>,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<Plan> {
        self.roles.require_role(Role::Minter, &caller)?;
        if !self.config.issuable {
            return Err(ValidationError::NotIssuable.into());
        }
        require_address(&to, "recipient")?;
        self.require_amount(amount)?;
        self.require_eligible(&to, HolderId::ZERO, to)?;

        let partition = match partition {
            Some(partition) => partition,
            None => self.router.resolve_credit()?,
        };
        let fits = self
            .table
            .total_supply()
            .checked_add(amount)
            .and(self.table.total_supply_of_partition(&partition).checked_add(amount))
            .is_some();
        if !fits {
            return Err(ValidationError::SupplyOverflow { partition, amount }.into());
        }

        let mut plan = self.begin(kind, caller);
        let timestamp = timestamp.unwrap_or_else(|| plan.now());
        plan.push(Mutation::Credit {
            holder: to,
            partition,
            amount,
        });
        plan.push(Mutation::RecordLot {
            holder: to,
            timestamp,
            amount,
        });
        self.plan_registration(&mut plan, to);

        plan.emit(LedgerEvent::Transfer {
            from: HolderId::ZERO,
            to,
            amount,
        });
        plan.emit(LedgerEvent::Issued {
            operator: caller,
            to,
            amount,
            data: data.to_vec(),
        });
        plan.emit(LedgerEvent::IssuedByPartition {
            partition,
            operator: caller,
            to,
            amount,
            timestamp,
            data: data.to_vec(),
            operator_data: Vec::new(),
        });
        Ok(plan)
    }

    fn plan_holder_transfer(
        &self,
        kind: OperationKind,
        caller: HolderId,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<Plan> {
        require_address(&to, "recipient")?;
        self.require_amount(amount)?;
        self.require_not_paused(&caller)?;
        self.require_transferable(&caller, &to)?;

        let draws = self.router.resolve_debit(&self.table, &caller, amount)?;
        let mut plan = self.begin(kind, caller);
        self.plan_movement(
            &mut plan,
            Movement {
                operator: caller,
                from: caller,
                to,
                draws,
                to_partition: None,
                data,
                operator_data: &[],
            },
        )?;
        Ok(plan)
    }

    fn plan_transfer_from(
        &self,
        caller: HolderId,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<Plan> {
        require_address(&from, "holder")?;
        require_address(&to, "recipient")?;
        self.require_amount(amount)?;
        self.require_not_paused(&caller)?;

        let spends_allowance = if self.is_operator(&caller, &from) {
            false
        } else {
            if self.operators.allowance(&from, &caller) == 0 {
                return Err(AuthorizationError::NotOperator {
                    operator: caller,
                    holder: from,
                }
                .into());
            }
            self.operators.check_allowance(&from, &caller, amount)?;
            true
        };
        self.require_transferable(&from, &to)?;

        let draws = self.router.resolve_debit(&self.table, &from, amount)?;
        let mut plan = self.begin(OperationKind::TransferFromWithData, caller);
        self.plan_movement(
            &mut plan,
            Movement {
                operator: caller,
                from,
                to,
                draws,
                to_partition: None,
                data,
                operator_data: &[],
            },
        )?;
        if spends_allowance {
            plan.push(Mutation::SpendAllowance {
                owner: from,
                spender: caller,
                amount,
            });
        }
        Ok(plan)
    }

    fn plan_transfer_by_partition(
        &self,
        caller: HolderId,
        partition: Partition,
        to: HolderId,
        amount: Amount,
        data: &[u8],
    ) -> Result<Plan> {
        require_address(&to, "recipient")?;
        self.require_amount(amount)?;
        self.require_not_paused(&caller)?;
        self.require_transferable(&caller, &to)?;

        let draws = self.draw_partition(&caller, partition, amount)?;
        let mut plan = self.begin(OperationKind::TransferByPartition, caller);
        self.plan_movement(
            &mut plan,
            Movement {
                operator: caller,
                from: caller,
                to,
                draws,
                to_partition: None,
                data,
                operator_data: &[],
            },
        )?;
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_operator_transfer(
        &self,
        caller: HolderId,
        partition: Partition,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: &[u8],
        operator_data: &[u8],
    ) -> Result<Plan> {
        require_address(&from, "holder")?;
        require_address(&to, "recipient")?;
        self.require_not_paused(&caller)?;

        let spends_allowance = if self.is_operator_for_partition(&partition, &caller, &from) {
            false
        } else {
            if self
                .operators
                .allowance_for_partition(&from, &partition, &caller)
                == 0
            {
                return Err(AuthorizationError::NotPartitionOperator {
                    operator: caller,
                    holder: from,
                    partition,
                }
                .into());
            }
            self.operators
                .check_partition_allowance(&from, &partition, &caller, amount)?;
            true
        };

        let mut plan = self.begin(OperationKind::OperatorTransferByPartition, caller);
        if amount == 0 {
            return Ok(plan);
        }

        self.require_granular(amount)?;
        if !self.bypasses_gate(&caller) {
            self.require_transferable(&from, &to)?;
        }

        let draws = self.draw_partition(&from, partition, amount)?;
        self.plan_movement(
            &mut plan,
            Movement {
                operator: caller,
                from,
                to,
                draws,
                to_partition: Partition::change_request(data),
                data,
                operator_data,
            },
        )?;
        if spends_allowance {
            plan.push(Mutation::SpendPartitionAllowance {
                owner: from,
                partition,
                spender: caller,
                amount,
            });
        }
        Ok(plan)
    }

    fn plan_controller_transfer(
        &self,
        caller: HolderId,
        from: HolderId,
        to: HolderId,
        amount: Amount,
        data: &[u8],
        operator_data: &[u8],
    ) -> Result<Plan> {
        self.require_controller(&caller)?;
        require_address(&from, "holder")?;
        require_address(&to, "recipient")?;
        self.require_amount(amount)?;
        if !self.config.controller_bypasses_gate {
            self.require_transferable(&from, &to)?;
        }

        let draws = self.router.resolve_debit(&self.table, &from, amount)?;
        let mut plan = self.begin(OperationKind::ControllerTransfer, caller);
        self.plan_movement(
            &mut plan,
            Movement {
                operator: caller,
                from,
                to,
                draws,
                to_partition: None,
                data,
                operator_data,
            },
        )?;
        plan.emit(LedgerEvent::ControllerTransfer {
            controller: caller,
            from,
            to,
            amount,
            data: data.to_vec(),
            operator_data: operator_data.to_vec(),
        });
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_redeem(
        &self,
        kind: OperationKind,
        caller: HolderId,
        from: HolderId,
        partition: Option<Partition>,
        amount: Amount,
        data: &[u8],
        operator_data: &[u8],
    ) -> Result<Plan> {
        self.roles.require_role(Role::Burner, &caller)?;
        require_address(&from, "holder")?;
        self.require_amount(amount)?;

        match partition {
            Some(partition) if !self.is_operator_for_partition(&partition, &caller, &from) => {
                return Err(AuthorizationError::NotPartitionOperator {
                    operator: caller,
                    holder: from,
                    partition,
                }
                .into());
            }
            None if !self.is_operator(&caller, &from) => {
                return Err(AuthorizationError::NotOperator {
                    operator: caller,
                    holder: from,
                }
                .into());
            }
            _ => {}
        }
        self.require_eligible(&from, from, HolderId::ZERO)?;

        let draws = match partition {
            Some(partition) => self.draw_partition(&from, partition, amount)?,
            None => self.router.resolve_debit(&self.table, &from, amount)?,
        };
        let mut plan = self.begin(kind, caller);
        self.plan_redemption(&mut plan, caller, from, draws, data, operator_data)?;
        Ok(plan)
    }

    fn plan_controller_redeem(
        &self,
        caller: HolderId,
        holder: HolderId,
        amount: Amount,
        data: &[u8],
        operator_data: &[u8],
    ) -> Result<Plan> {
        self.require_controller(&caller)?;
        require_address(&holder, "holder")?;
        self.require_amount(amount)?;
        if !self.config.controller_bypasses_gate {
            self.require_eligible(&holder, holder, HolderId::ZERO)?;
        }

        let draws = self.router.resolve_debit(&self.table, &holder, amount)?;
        let mut plan = self.begin(OperationKind::ControllerRedeem, caller);
        self.plan_redemption(&mut plan, caller, holder, draws, data, operator_data)?;
        plan.emit(LedgerEvent::ControllerRedemption {
            controller: caller,
            holder,
            amount,
            data: data.to_vec(),
            operator_data: operator_data.to_vec(),
        });
        Ok(plan)
    }

    fn plan_set_default_partitions(&self, caller: HolderId, partitions: Vec<Partition>) -> Result<Plan> {
        self.roles.require_role(Role::Admin, &caller)?;
        // Same duplicate check the router applies at commit
        DefaultPartitionRouter::with_partitions(partitions.clone())?;

        let mut plan = self.begin(OperationKind::SetDefaultPartitions, caller);
        plan.emit(LedgerEvent::DefaultPartitionsSet {
            partitions: partitions.clone(),
        });
        plan.push(Mutation::SetDefaultPartitions(partitions));
        Ok(plan)
    }

    fn plan_revoke_role(&self, kind: OperationKind, caller: HolderId, role: Role, account: HolderId) -> Plan {
        let mut plan = self.begin(kind, caller);
        if self.roles.has_role(role, &account) {
            plan.push(Mutation::RevokeRole { role, account });
            plan.emit(LedgerEvent::RoleRevoked {
                role: role.to_string(),
                account,
                sender: caller,
            });
        }
        plan
    }

    fn plan_set_paused(&self, kind: OperationKind, caller: HolderId, paused: bool) -> Result<Plan> {
        self.roles.require_role(Role::Pauser, &caller)?;

        let mut plan = self.begin(kind, caller);
        if self.paused != paused {
            plan.push(Mutation::SetPaused(paused));
            plan.emit(if paused {
                LedgerEvent::Paused { account: caller }
            } else {
                LedgerEvent::Unpaused { account: caller }
            });
        }
        Ok(plan)
    }

    /// Debit every draw from `from`, credit it to `to`, then move the lots.
    ///
    /// A holder moving balance to itself keeps its lots untouched.
    fn plan_movement(&self, plan: &mut Plan, movement: Movement<'_>) -> Result<()> {
        let Movement {
            operator,
            from,
            to,
            draws,
            to_partition,
            data,
            operator_data,
        } = movement;

        let mut total: Amount = 0;
        for draw in &draws {
            let target = to_partition.unwrap_or(draw.partition);
            plan.push(Mutation::Debit {
                holder: from,
                partition: draw.partition,
                amount: draw.amount,
            });
            plan.push(Mutation::Credit {
                holder: to,
                partition: target,
                amount: draw.amount,
            });

            plan.emit(LedgerEvent::Transfer {
                from,
                to,
                amount: draw.amount,
            });
            plan.emit(LedgerEvent::TransferByPartition {
                from_partition: draw.partition,
                operator,
                from,
                to,
                amount: draw.amount,
                data: data.to_vec(),
                operator_data: operator_data.to_vec(),
            });
            if target != draw.partition {
                plan.emit(LedgerEvent::ChangedPartition {
                    from_partition: draw.partition,
                    to_partition: target,
                    amount: draw.amount,
                });
            }
            total += draw.amount;
        }

        if from != to {
            self.require_owned(&from, total)?;
            plan.push(Mutation::ConsumeLots {
                holder: from,
                amount: total,
                order: ConsumptionOrder::NewestFirst,
            });
            let now = plan.now();
            plan.push(Mutation::RecordLot {
                holder: to,
                timestamp: now,
                amount: total,
            });
            self.plan_registration(plan, to);
        }
        Ok(())
    }

    fn plan_redemption(
        &self,
        plan: &mut Plan,
        operator: HolderId,
        from: HolderId,
        draws: Vec<PartitionDraw>,
        data: &[u8],
        operator_data: &[u8],
    ) -> Result<()> {
        let mut total: Amount = 0;
        for draw in &draws {
            plan.push(Mutation::Debit {
                holder: from,
                partition: draw.partition,
                amount: draw.amount,
            });

            plan.emit(LedgerEvent::Transfer {
                from,
                to: HolderId::ZERO,
                amount: draw.amount,
            });
            plan.emit(LedgerEvent::Redeemed {
                operator,
                from,
                amount: draw.amount,
                data: data.to_vec(),
            });
            plan.emit(LedgerEvent::RedeemedByPartition {
                partition: draw.partition,
                operator,
                from,
                amount: draw.amount,
                operator_data: operator_data.to_vec(),
            });
            total += draw.amount;
        }

        self.require_owned(&from, total)?;
        plan.push(Mutation::ConsumeLots {
            holder: from,
            amount: total,
            order: ConsumptionOrder::OldestFirst,
        });
        Ok(())
    }

    fn plan_registration(&self, plan: &mut Plan, holder: HolderId) {
        if !self.registered.contains(&holder) {
            plan.push(Mutation::RegisterHolder(holder));
        }
    }

    /// Single-partition draw, checked against the holder's partition balance
    fn draw_partition(&self, holder: &HolderId, partition: Partition, amount: Amount) -> Result<Vec<PartitionDraw>> {
        let available = self.table.balance_of_partition(holder, &partition);
        if available < amount {
            return Err(InsufficientBalanceError::Partition {
                holder: *holder,
                partition,
                available,
                requested: amount,
            }
            .into());
        }
        Ok(vec![PartitionDraw::new(partition, amount)])
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    fn require_granular(&self, amount: Amount) -> Result<()> {
        if amount % self.config.granularity != 0 {
            return Err(ValidationError::NotGranular {
                amount,
                granularity: self.config.granularity,
            }
            .into());
        }
        Ok(())
    }

    fn require_amount(&self, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        self.require_granular(amount)
    }

    /// Paused tokens only move by controllers
    fn require_not_paused(&self, caller: &HolderId) -> Result<()> {
        if self.paused && !self.is_controller(caller) {
            return Err(AuthorizationError::Paused.into());
        }
        Ok(())
    }

    fn require_controller(&self, caller: &HolderId) -> Result<()> {
        if !self.config.controllable {
            return Err(AuthorizationError::NotControllable.into());
        }
        if !self.is_controller(caller) {
            return Err(AuthorizationError::MissingRole {
                role: Role::Controller.to_string(),
                account: *caller,
            }
            .into());
        }
        Ok(())
    }

    fn bypasses_gate(&self, caller: &HolderId) -> bool {
        self.config.controller_bypasses_gate && self.is_controller(caller)
    }

    fn require_transferable(&self, from: &HolderId, to: &HolderId) -> Result<()> {
        if !self.gate.can_transfer(from, to) {
            return Err(RestrictionError::TransferRestricted { from: *from, to: *to }.into());
        }
        Ok(())
    }

    /// Single-sided gate check for issuance and redemption
    fn require_eligible(&self, holder: &HolderId, from: HolderId, to: HolderId) -> Result<()> {
        if !self.gate.is_eligible(holder) {
            return Err(RestrictionError::TransferRestricted { from, to }.into());
        }
        Ok(())
    }

    /// The lot ledger must cover what the partition table allowed
    fn require_owned(&self, holder: &HolderId, amount: Amount) -> Result<()> {
        let owned = self.lots.owned_balance(holder);
        if owned < amount {
            return Err(LedgerError::InvariantViolation(format!(
                "{} owns {} across lots but partitions allow moving {}",
                holder, owned, amount
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    fn run(&mut self, kind: OperationKind, planned: Result<Plan>) -> Result<OperationReceipt> {
        let validated = planned.and_then(|mut plan| {
            plan.receipt.validate()?;
            Ok(plan)
        });
        match validated {
            Ok(plan) => self.execute(plan),
            Err(e) => {
                if e.is_invariant_violation() {
                    log::error!("{} rejected by an invariant check: {}", kind, e);
                } else {
                    log::debug!("{} rejected: {}", kind, e);
                }
                Err(e)
            }
        }
    }

    /// Journal the validated receipt, apply its mutations, then journal the
    /// receipt again in its final state.
    fn execute(&mut self, plan: Plan) -> Result<OperationReceipt> {
        let Plan {
            mut receipt,
            mutations,
        } = plan;

        if let Err(e) = self.journal_receipt(&receipt) {
            log::warn!("{} #{} not journaled, reverting: {}", receipt.kind, receipt.sequence, e);
            receipt.revert()?;
            return Err(e);
        }
        // A journaled receipt owns its sequence number whatever happens next
        self.sequence += 1;

        for mutation in mutations {
            if let Err(e) = self.apply_mutation(mutation) {
                log::error!("{} #{} failed during commit: {}", receipt.kind, receipt.sequence, e);
                let e = if e.is_invariant_violation() {
                    e
                } else {
                    LedgerError::InvariantViolation(format!("{} failed after validation: {}", receipt.kind, e))
                };
                receipt.revert()?;
                if let Err(journal_err) = self.journal_receipt(&receipt) {
                    log::error!("revert of #{} not journaled: {}", receipt.sequence, journal_err);
                }
                return Err(e);
            }
        }

        receipt.commit()?;
        if let Err(e) = self.journal_receipt(&receipt) {
            log::error!("{} #{} committed but not journaled as such: {}", receipt.kind, receipt.sequence, e);
        }
        log::debug!(
            "committed {} #{} by {} ({} events)",
            receipt.kind,
            receipt.sequence,
            receipt.caller,
            receipt.events.len()
        );
        Ok(receipt)
    }

    fn journal_receipt(&self, receipt: &OperationReceipt) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.record(receipt),
            None => Ok(()),
        }
    }

    fn apply_mutation(&mut self, mutation: Mutation) -> Result<()> {
        match mutation {
            Mutation::Credit {
                holder,
                partition,
                amount,
            } => self.table.credit_partition(&holder, &partition, amount)?,
            Mutation::Debit {
                holder,
                partition,
                amount,
            } => self.table.debit_partition(&holder, &partition, amount)?,
            Mutation::RecordLot {
                holder,
                timestamp,
                amount,
            } => self.lots.record_ownership(&holder, timestamp, amount)?,
            Mutation::ConsumeLots { holder, amount, order } => {
                self.lots.consume(&holder, amount, order)?;
            }
            Mutation::RegisterHolder(holder) => {
                if self.registered.insert(holder) {
                    self.token_holders.push(holder);
                }
            }
            Mutation::SpendAllowance { owner, spender, amount } => {
                self.operators.spend_allowance(&owner, &spender, amount)?
            }
            Mutation::SpendPartitionAllowance {
                owner,
                partition,
                spender,
                amount,
            } => self
                .operators
                .spend_partition_allowance(&owner, &partition, &spender, amount)?,
            Mutation::Approve { owner, spender, amount } => self.operators.approve(owner, spender, amount),
            Mutation::ApproveByPartition {
                owner,
                partition,
                spender,
                amount,
            } => self
                .operators
                .approve_for_partition(owner, partition, spender, amount),
            Mutation::AuthorizeOperator { holder, operator } => self.operators.authorize(holder, operator),
            Mutation::RevokeOperator { holder, operator } => self.operators.revoke(&holder, &operator),
            Mutation::AuthorizeOperatorByPartition {
                holder,
                partition,
                operator,
            } => self
                .operators
                .authorize_for_partition(holder, partition, operator),
            Mutation::RevokeOperatorByPartition {
                holder,
                partition,
                operator,
            } => self
                .operators
                .revoke_for_partition(&holder, &partition, &operator),
            Mutation::GrantRole { role, account } => {
                self.roles.grant(role, account);
            }
            Mutation::RevokeRole { role, account } => {
                self.roles.revoke(role, &account);
            }
            Mutation::SetPaused(paused) => self.paused = paused,
            Mutation::SetDefaultPartitions(partitions) => self.router.set_default_partitions(partitions)?,
            Mutation::SetDocument { name, document } => {
                self.documents.insert(name, document);
            }
        }
        Ok(())
    }
}

fn require_address(account: &HolderId, what: &'static str) -> Result<()> {
    if account.is_zero() {
        return Err(ValidationError::ZeroAddress(what).into());
    }
    Ok(())
}

fn require_other_operator(holder: &HolderId, operator: &HolderId) -> Result<()> {
    require_address(operator, "operator")?;
    if holder == operator {
        return Err(ValidationError::SelfAuthorization.into());
    }
    Ok(())
}
