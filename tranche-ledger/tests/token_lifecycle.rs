use tranche_core::error::{
    AuthorizationError, InsufficientBalanceError, LedgerError, RestrictionError, ValidationError,
};
use tranche_core::events::LedgerEvent;
use tranche_core::id::HolderId;
use tranche_core::lots::OwnershipSlice;
use tranche_core::operation::OperationKind;
use tranche_core::partition::Partition;
use tranche_ledger::{
    plan_batches, AllowList, BasicConflictChecker, Command, ManualClock, Role, SecurityToken, Submission,
    TokenConfig,
};
use tranche_storage::{FileJournal, LedgerJournal};

fn p(label: &'static str) -> Partition {
    Partition::label(label)
}

struct Accounts {
    owner: HolderId,
    alice: HolderId,
    bob: HolderId,
    operator: HolderId,
}

fn accounts() -> Accounts {
    Accounts {
        owner: HolderId::named("owner"),
        alice: HolderId::named("alice"),
        bob: HolderId::named("bob"),
        operator: HolderId::named("operator"),
    }
}

fn token_with(config: TokenConfig, clock: &ManualClock) -> SecurityToken {
    SecurityToken::new(config, accounts().owner)
        .unwrap()
        .with_clock(clock.clone())
}

fn default_token(clock: &ManualClock) -> SecurityToken {
    token_with(
        TokenConfig::new("Security Token", "SEC").with_default_partitions(vec![p("issued")]),
        clock,
    )
}

#[test]
fn conservation_holds_across_a_mixed_workload() {
    let Accounts {
        owner,
        alice,
        bob,
        operator,
    } = accounts();
    let clock = ManualClock::new(100);
    let mut token = token_with(
        TokenConfig::new("Security Token", "SEC").with_default_partitions(vec![p("reserved"), p("issued")]),
        &clock,
    );

    token.issue_by_partition(owner, p("reserved"), alice, 500, &[]).unwrap();
    clock.advance(10);
    token.issue_by_partition(owner, p("issued"), alice, 300, &[]).unwrap();
    clock.advance(10);
    token.transfer(alice, bob, 650).unwrap();
    token.authorize_operator(bob, operator).unwrap();
    clock.advance(10);
    token
        .operator_transfer_by_partition(operator, p("issued"), bob, alice, 100, &[], &[])
        .unwrap();
    token.grant_role(owner, Role::Burner, bob).unwrap();
    token.redeem_by_partition(bob, p("reserved"), 200, &[]).unwrap();

    token.verify_invariants().unwrap();
    assert_eq!(token.total_supply(), 600);
    assert_eq!(token.balance_of(&alice) + token.balance_of(&bob), 600);
    assert_eq!(
        token.total_supply_by_partition(&p("reserved")) + token.total_supply_by_partition(&p("issued")),
        600
    );

    for holder in [alice, bob] {
        let balance = token.balance_of(&holder);
        let slices = token.describe_ownership(&holder, balance).unwrap();
        assert_eq!(slices.iter().map(|s| s.amount).sum::<u128>(), balance);
        assert!(slices.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }
}

#[test]
fn describe_ownership_reports_oldest_first_with_partial_tail() {
    let Accounts { owner, alice, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);

    token.issue_owned(owner, p("issued"), 10, alice, 100, &[]).unwrap();
    token.issue_owned(owner, p("issued"), 20, alice, 200, &[]).unwrap();

    assert_eq!(
        token.describe_ownership(&alice, 100).unwrap(),
        vec![OwnershipSlice::new(10, 100)]
    );
    assert_eq!(
        token.describe_ownership(&alice, 250).unwrap(),
        vec![OwnershipSlice::new(10, 100), OwnershipSlice::new(20, 150)]
    );
    assert!(matches!(
        token.describe_ownership(&alice, 301),
        Err(LedgerError::InsufficientBalance(InsufficientBalanceError::OwnedLots { .. }))
    ));

    // A backdated issuance lands between the existing lots
    token.issue_owned(owner, p("issued"), 15, alice, 5, &[]).unwrap();
    assert_eq!(
        token.lots_of(&alice),
        vec![
            OwnershipSlice::new(10, 100),
            OwnershipSlice::new(15, 5),
            OwnershipSlice::new(20, 200)
        ]
    );
    token.verify_invariants().unwrap();
}

#[test]
fn default_partitions_are_drained_in_list_order() {
    let Accounts { owner, alice, bob, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = token_with(
        TokenConfig::new("Security Token", "SEC").with_default_partitions(vec![p("locked"), p("reserved"), p("issued")]),
        &clock,
    );

    for partition in [p("reserved"), p("issued"), p("locked")] {
        token.issue_by_partition(owner, partition, alice, 1000, &[]).unwrap();
    }

    let receipt = token.transfer(alice, bob, 2500).unwrap();
    let drawn: Vec<(Partition, u128)> = receipt
        .events
        .iter()
        .filter_map(|event| match event {
            LedgerEvent::TransferByPartition {
                from_partition, amount, ..
            } => Some((*from_partition, *amount)),
            _ => None,
        })
        .collect();

    assert_eq!(
        drawn,
        vec![(p("locked"), 1000), (p("reserved"), 1000), (p("issued"), 500)]
    );
    assert_eq!(token.balance_of_by_partition(&p("issued"), &alice), 500);
    assert_eq!(token.partitions_of(&alice), vec![p("issued")]);
    assert_eq!(token.partitions_of(&bob), vec![p("locked"), p("reserved"), p("issued")]);
    assert_eq!(token.total_partitions(), vec![p("reserved"), p("issued"), p("locked")]);
}

#[test]
fn partitions_outside_the_default_list_are_never_drawn() {
    let Accounts { owner, alice, bob, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);

    token.issue_by_partition(owner, p("locked"), alice, 1000, &[]).unwrap();
    token.issue_by_partition(owner, p("issued"), alice, 10, &[]).unwrap();

    let err = token.transfer(alice, bob, 20).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance(InsufficientBalanceError::DefaultPartitions {
            available: 10,
            requested: 20,
            ..
        })
    ));

    token.set_default_partitions(owner, vec![]).unwrap();
    assert!(matches!(
        token.transfer(alice, bob, 1),
        Err(LedgerError::Validation(ValidationError::EmptyDefaultPartitions))
    ));
    assert!(matches!(
        token.issue(owner, alice, 1, &[]),
        Err(LedgerError::Validation(ValidationError::EmptyDefaultPartitions))
    ));
}

#[test]
fn set_default_partitions_rejects_duplicates_and_non_admins() {
    let Accounts { owner, alice, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);

    assert!(matches!(
        token.set_default_partitions(owner, vec![p("issued"), p("issued")]),
        Err(LedgerError::Validation(ValidationError::DuplicateDefaultPartition(_)))
    ));
    assert!(matches!(
        token.set_default_partitions(alice, vec![p("reserved")]),
        Err(LedgerError::Authorization(AuthorizationError::MissingRole { .. }))
    ));
    assert_eq!(token.default_partitions(), &[p("issued")]);

    let receipt = token
        .set_default_partitions(owner, vec![p("reserved"), p("issued")])
        .unwrap();
    assert_eq!(receipt.event_names(), vec!["DefaultPartitionsSet"]);
    assert_eq!(token.default_partitions(), &[p("reserved"), p("issued")]);
}

#[test]
fn granularity_is_enforced_before_mutation() {
    let Accounts {
        owner,
        alice,
        bob,
        operator,
    } = accounts();
    let clock = ManualClock::new(0);
    let mut token = token_with(
        TokenConfig::new("Security Token", "SEC")
            .with_granularity(2)
            .with_default_partitions(vec![p("issued")]),
        &clock,
    );

    assert!(matches!(
        token.issue(owner, alice, 3, &[]),
        Err(LedgerError::Validation(ValidationError::NotGranular { amount: 3, granularity: 2 }))
    ));
    token.issue(owner, alice, 10, &[]).unwrap();

    assert!(matches!(
        token.transfer(alice, bob, 5),
        Err(LedgerError::Validation(ValidationError::NotGranular { .. }))
    ));
    assert!(matches!(
        token.redeem(owner, 1, &[]),
        Err(LedgerError::Validation(ValidationError::NotGranular { .. }))
    ));
    assert!(matches!(
        token.transfer_by_partition(alice, p("issued"), bob, 0, &[]),
        Err(LedgerError::Validation(ValidationError::ZeroAmount))
    ));

    token.authorize_operator(alice, operator).unwrap();
    let receipt = token
        .operator_transfer_by_partition(operator, p("issued"), alice, bob, 0, &[], &[])
        .unwrap();
    assert!(receipt.is_committed());
    assert!(receipt.events.is_empty());

    assert_eq!(token.balance_of(&alice), 10);
    assert_eq!(token.balance_of(&bob), 0);
    token.verify_invariants().unwrap();
}

#[test]
fn eligibility_gate_blocks_unlisted_holders() {
    let Accounts { owner, alice, bob, .. } = accounts();
    let clock = ManualClock::new(0);
    let allow_list = AllowList::with_holders([alice]);
    let mut token = default_token(&clock).with_gate(allow_list.clone());

    assert!(matches!(
        token.issue(owner, bob, 10, &[]),
        Err(LedgerError::Restriction(RestrictionError::TransferRestricted { .. }))
    ));

    token.issue(owner, alice, 100, &[]).unwrap();
    let err = token.transfer(alice, bob, 10).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Restriction(RestrictionError::TransferRestricted { from, to }) if from == alice && to == bob
    ));
    assert_eq!(token.balance_of(&alice), 100);
    assert_eq!(token.balance_of(&bob), 0);
    assert_eq!(token.lots_of(&alice).len(), 1);

    // Controllers are gated too unless configured otherwise
    assert!(matches!(
        token.controller_transfer(owner, alice, bob, 10, &[], &[]),
        Err(LedgerError::Restriction(_))
    ));

    allow_list.add(bob);
    token.transfer(alice, bob, 10).unwrap();

    allow_list.remove(&alice);
    token.grant_role(owner, Role::Burner, alice).unwrap();
    assert!(matches!(
        token.redeem(alice, 10, &[]),
        Err(LedgerError::Restriction(_))
    ));
}

#[test]
fn controller_may_bypass_the_gate_when_configured() {
    let Accounts { owner, alice, bob, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = token_with(
        TokenConfig::new("Security Token", "SEC")
            .with_default_partitions(vec![p("issued")])
            .with_controller_bypasses_gate(true),
        &clock,
    )
    .with_gate(AllowList::with_holders([alice]));

    token.issue(owner, alice, 100, &[]).unwrap();
    let receipt = token.controller_transfer(owner, alice, bob, 40, b"court order", &[]).unwrap();

    assert_eq!(
        receipt.event_names(),
        vec!["Transfer", "TransferByPartition", "ControllerTransfer"]
    );
    assert_eq!(token.balance_of(&bob), 40);

    let receipt = token.controller_redeem(owner, bob, 40, &[], &[]).unwrap();
    assert_eq!(
        receipt.event_names(),
        vec!["Transfer", "Redeemed", "RedeemedByPartition", "ControllerRedemption"]
    );
    assert_eq!(token.balance_of(&bob), 0);
    token.verify_invariants().unwrap();
}

#[test]
fn controller_operations_require_a_controllable_token() {
    let Accounts { owner, alice, bob, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = token_with(
        TokenConfig::new("Security Token", "SEC")
            .with_default_partitions(vec![p("issued")])
            .with_controllable(false),
        &clock,
    );

    token.issue(owner, alice, 100, &[]).unwrap();
    assert!(matches!(
        token.controller_transfer(owner, alice, bob, 10, &[], &[]),
        Err(LedgerError::Authorization(AuthorizationError::NotControllable))
    ));
    assert!(!token.is_controller(&owner));
    assert!(!token.is_operator(&owner, &alice));
}

#[test]
fn vesting_claim_converts_partition_and_keeps_provenance() {
    let Accounts {
        owner,
        alice: beneficiary,
        operator: escrow,
        ..
    } = accounts();
    let clock = ManualClock::new(1_622_677_982);
    let mut token = default_token(&clock);

    // The escrow holds the locked grant
    token.issue_owned(owner, p("reserved"), 1_622_677_982, escrow, 100, &[]).unwrap();
    assert_eq!(token.token_holders_count(), 1);
    assert_eq!(token.token_holder(0).unwrap(), escrow);

    clock.set(1_633_218_782);
    let receipt = token
        .operator_transfer_by_partition(
            escrow,
            p("reserved"),
            escrow,
            beneficiary,
            25,
            &p("vested").change_data(),
            b"claim",
        )
        .unwrap();

    assert_eq!(
        receipt.event_names(),
        vec!["Transfer", "TransferByPartition", "ChangedPartition"]
    );
    assert_eq!(token.balance_of_by_partition(&p("vested"), &beneficiary), 25);
    assert_eq!(token.balance_of_by_partition(&p("reserved"), &escrow), 75);
    assert_eq!(token.total_supply_by_partition(&p("vested")), 25);
    assert_eq!(token.lots_of(&beneficiary), vec![OwnershipSlice::new(1_633_218_782, 25)]);
    assert_eq!(token.token_holders_count(), 2);
    token.verify_invariants().unwrap();
}

#[test]
fn holder_transfers_ignore_the_partition_change_flag() {
    let Accounts { owner, alice, bob, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);

    token.issue(owner, alice, 50, &[]).unwrap();
    let receipt = token
        .transfer_by_partition(alice, p("issued"), bob, 20, &p("vested").change_data())
        .unwrap();

    assert_eq!(receipt.event_names(), vec!["Transfer", "TransferByPartition"]);
    assert_eq!(token.balance_of_by_partition(&p("issued"), &bob), 20);
    assert_eq!(token.balance_of_by_partition(&p("vested"), &bob), 0);
}

#[test]
fn self_conversion_keeps_lots() {
    let Accounts { owner, alice, .. } = accounts();
    let clock = ManualClock::new(5);
    let mut token = default_token(&clock);

    token.issue(owner, alice, 50, &[]).unwrap();
    clock.advance(100);
    token
        .operator_transfer_by_partition(alice, p("issued"), alice, alice, 30, &p("locked").change_data(), &[])
        .unwrap();

    assert_eq!(token.balance_of_by_partition(&p("issued"), &alice), 20);
    assert_eq!(token.balance_of_by_partition(&p("locked"), &alice), 30);
    assert_eq!(token.lots_of(&alice), vec![OwnershipSlice::new(5, 50)]);
    token.verify_invariants().unwrap();
}

#[test]
fn allowances_authorize_and_are_spent() {
    let Accounts {
        owner,
        alice,
        bob,
        operator: spender,
    } = accounts();
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);
    token.issue(owner, alice, 100, &[]).unwrap();

    assert!(matches!(
        token.transfer_from_with_data(spender, alice, bob, 10, &[]),
        Err(LedgerError::Authorization(AuthorizationError::NotOperator { .. }))
    ));

    token.approve(alice, spender, 30).unwrap();
    assert_eq!(token.allowance(&alice, &spender), 30);
    token.transfer_from_with_data(spender, alice, bob, 20, &[]).unwrap();
    assert_eq!(token.allowance(&alice, &spender), 10);
    assert!(matches!(
        token.transfer_from_with_data(spender, alice, bob, 20, &[]),
        Err(LedgerError::Authorization(AuthorizationError::InsufficientAllowance {
            available: 10,
            requested: 20,
            ..
        }))
    ));

    token.approve_by_partition(alice, p("issued"), spender, 15).unwrap();
    token
        .operator_transfer_by_partition(spender, p("issued"), alice, bob, 15, &[], &[])
        .unwrap();
    assert_eq!(token.allowance_by_partition(&p("issued"), &alice, &spender), 0);
    assert!(matches!(
        token.operator_transfer_by_partition(spender, p("issued"), alice, bob, 1, &[], &[]),
        Err(LedgerError::Authorization(AuthorizationError::NotPartitionOperator { .. }))
    ));

    assert_eq!(token.balance_of(&bob), 35);
    token.verify_invariants().unwrap();
}

#[test]
fn operators_and_self_authorization() {
    let Accounts {
        owner,
        alice,
        bob,
        operator,
    } = accounts();
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);
    token.issue(owner, alice, 100, &[]).unwrap();

    assert!(matches!(
        token.authorize_operator(alice, alice),
        Err(LedgerError::Validation(ValidationError::SelfAuthorization))
    ));

    token.authorize_operator_by_partition(alice, p("issued"), operator).unwrap();
    assert!(token.is_operator_for_partition(&p("issued"), &operator, &alice));
    assert!(!token.is_operator(&operator, &alice));
    token
        .operator_transfer_by_partition(operator, p("issued"), alice, bob, 10, &[], &[])
        .unwrap();

    token.revoke_operator_by_partition(alice, p("issued"), operator).unwrap();
    assert!(token
        .operator_transfer_by_partition(operator, p("issued"), alice, bob, 10, &[], &[])
        .is_err());

    // Controllers operate every holder
    assert!(token.is_operator(&owner, &alice));
    token.grant_role(owner, Role::Burner, operator).unwrap();
    assert!(matches!(
        token.redeem_from(operator, alice, 10, &[]),
        Err(LedgerError::Authorization(AuthorizationError::NotOperator { .. }))
    ));
    token.authorize_operator(alice, operator).unwrap();
    token.redeem_from(operator, alice, 10, &[]).unwrap();
    token
        .operator_redeem_by_partition(operator, p("issued"), alice, 10, b"op")
        .unwrap();
    token.revoke_operator(alice, operator).unwrap();
    assert!(!token.is_operator(&operator, &alice));

    assert_eq!(token.balance_of(&alice), 70);
    assert_eq!(token.total_supply(), 80);
    token.verify_invariants().unwrap();
}

#[test]
fn pause_stops_holder_and_operator_transfers_only() {
    let Accounts {
        owner,
        alice,
        bob,
        operator,
    } = accounts();
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);
    token.issue(owner, alice, 100, &[]).unwrap();
    token.authorize_operator(alice, operator).unwrap();

    assert!(token.pause(alice).is_err());
    let receipt = token.pause(owner).unwrap();
    assert_eq!(receipt.event_names(), vec!["Paused"]);
    assert!(token.is_paused());

    assert!(matches!(
        token.transfer(alice, bob, 1),
        Err(LedgerError::Authorization(AuthorizationError::Paused))
    ));
    assert!(matches!(
        token.operator_transfer_by_partition(operator, p("issued"), alice, bob, 1, &[], &[]),
        Err(LedgerError::Authorization(AuthorizationError::Paused))
    ));

    // Privileged paths continue
    token.controller_transfer(owner, alice, bob, 5, &[], &[]).unwrap();
    token.issue(owner, alice, 5, &[]).unwrap();

    token.unpause(owner).unwrap();
    token.transfer(alice, bob, 1).unwrap();
    assert_eq!(token.balance_of(&bob), 6);
}

#[test]
fn role_management() {
    let Accounts { owner, alice, bob, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);

    assert!(token.grant_role(alice, Role::Minter, alice).is_err());

    let receipt = token.grant_role(owner, Role::Minter, alice).unwrap();
    assert_eq!(receipt.event_names(), vec!["RoleGranted"]);
    assert!(token.has_role(Role::Minter, &alice));
    token.issue(alice, bob, 10, &[]).unwrap();

    // Granting again changes nothing
    assert!(token.grant_role(owner, Role::Minter, alice).unwrap().events.is_empty());

    token.renounce_role(alice, Role::Minter).unwrap();
    assert!(!token.has_role(Role::Minter, &alice));
    assert!(token.issue(alice, bob, 10, &[]).is_err());

    token.grant_role(owner, Role::Minter, alice).unwrap();
    assert!(token.revoke_role(alice, Role::Minter, alice).is_err());
    let receipt = token.revoke_role(owner, Role::Minter, alice).unwrap();
    assert_eq!(receipt.event_names(), vec!["RoleRevoked"]);
    assert!(!token.has_role(Role::Minter, &alice));
}

#[test]
fn issuance_can_be_disabled() {
    let Accounts { owner, alice, .. } = accounts();
    let clock = ManualClock::new(0);
    let mut token = token_with(
        TokenConfig::new("Security Token", "SEC")
            .with_default_partitions(vec![p("issued")])
            .with_issuable(false),
        &clock,
    );

    assert!(!token.is_issuable());
    assert!(matches!(
        token.issue(owner, alice, 10, &[]),
        Err(LedgerError::Validation(ValidationError::NotIssuable))
    ));
    assert!(matches!(
        token.token_holder(0),
        Err(LedgerError::Validation(ValidationError::HolderIndexOutOfRange { index: 0, count: 0 }))
    ));
}

#[test]
fn file_journal_separates_committed_operations_from_rejected_ones() {
    let Accounts { owner, alice, bob, .. } = accounts();
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("token.journal");
    let clock = ManualClock::new(0);

    let mut token = default_token(&clock).with_journal(FileJournal::open(&path).unwrap());
    token.issue(owner, alice, 100, &[]).unwrap();
    assert!(token.transfer(alice, bob, 1_000).is_err());
    token.transfer(alice, bob, 40).unwrap();
    drop(token);

    let journal = FileJournal::open(&path).unwrap();
    let entries: Vec<_> = journal
        .iterate_entries()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 4);

    let committed = journal.committed_receipts().unwrap();
    let kinds: Vec<OperationKind> = committed.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![OperationKind::Issue, OperationKind::Transfer]);
    assert_eq!(committed[1].sequence, 1);
    assert_eq!(committed[1].events.len(), 2);
}

#[test]
fn metadata_and_json_config() {
    let config = TokenConfig::from_json_str(
        r#"{"name": "Tranche A", "symbol": "TRA", "decimals": 0, "default_partitions": ["issued"]}"#,
    )
    .unwrap();
    let clock = ManualClock::new(0);
    let token = token_with(config, &clock);

    assert_eq!(token.name(), "Tranche A");
    assert_eq!(token.symbol(), "TRA");
    assert_eq!(token.decimals(), 0);
    assert_eq!(token.granularity(), 1);
    assert!(token.is_controllable());
    assert!(!token.is_paused());
}

#[test]
fn scheduled_batches_commit_like_sequential_order() {
    let Accounts {
        owner,
        alice,
        bob,
        operator: carol,
    } = accounts();
    let dave = HolderId::named("dave");
    let clock = ManualClock::new(0);
    let mut token = default_token(&clock);
    token.issue(owner, alice, 100, &[]).unwrap();
    token.issue(owner, carol, 100, &[]).unwrap();

    let submissions = vec![
        Submission::new(alice, Command::Transfer { to: bob, amount: 30 }),
        Submission::new(carol, Command::Transfer { to: dave, amount: 20 }),
        Submission::new(bob, Command::Transfer { to: dave, amount: 10 }),
    ];
    let batches = plan_batches(&BasicConflictChecker::new(), &submissions);
    assert_eq!(batches, vec![vec![0, 1], vec![2]]);

    for batch in &batches {
        for index in batch {
            let submission = submissions[*index].clone();
            token.apply(submission.caller, submission.command).unwrap();
        }
    }

    assert_eq!(token.balance_of(&alice), 70);
    assert_eq!(token.balance_of(&bob), 20);
    assert_eq!(token.balance_of(&carol), 80);
    assert_eq!(token.balance_of(&dave), 30);
    token.verify_invariants().unwrap();
}
