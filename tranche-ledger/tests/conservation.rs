use proptest::prelude::*;
use tranche_core::id::HolderId;
use tranche_core::partition::Partition;
use tranche_core::Amount;
use tranche_ledger::{ManualClock, Role, SecurityToken, TokenConfig};

const HOLDERS: [&str; 3] = ["alice", "bob", "carol"];
const PARTITIONS: [&str; 3] = ["reserved", "issued", "locked"];

#[derive(Debug, Clone)]
enum Step {
    Issue { to: usize, amount: Amount },
    IssueOwned { partition: usize, timestamp: u64, to: usize, amount: Amount },
    Transfer { from: usize, to: usize, amount: Amount },
    TransferByPartition { from: usize, partition: usize, to: usize, amount: Amount },
    Convert { holder: usize, partition: usize, target: usize, amount: Amount },
    Redeem { holder: usize, amount: Amount },
    Tick(u64),
}

fn holder(i: usize) -> HolderId {
    HolderId::named(HOLDERS[i])
}

fn partition(i: usize) -> Partition {
    Partition::label(PARTITIONS[i])
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let who = 0..HOLDERS.len();
    let which = 0..PARTITIONS.len();
    let amount = 1u128..500;
    prop_oneof![
        (who.clone(), amount.clone()).prop_map(|(to, amount)| Step::Issue { to, amount }),
        (which.clone(), 0u64..2_000, who.clone(), amount.clone()).prop_map(|(partition, timestamp, to, amount)| {
            Step::IssueOwned {
                partition,
                timestamp,
                to,
                amount,
            }
        }),
        (who.clone(), who.clone(), amount.clone()).prop_map(|(from, to, amount)| Step::Transfer { from, to, amount }),
        (who.clone(), which.clone(), who.clone(), amount.clone()).prop_map(|(from, partition, to, amount)| {
            Step::TransferByPartition {
                from,
                partition,
                to,
                amount,
            }
        }),
        (who.clone(), which.clone(), which, amount.clone()).prop_map(|(holder, partition, target, amount)| {
            Step::Convert {
                holder,
                partition,
                target,
                amount,
            }
        }),
        (who, amount).prop_map(|(holder, amount)| Step::Redeem { holder, amount }),
        (0u64..50).prop_map(Step::Tick),
    ]
}

fn build_token(clock: &ManualClock) -> SecurityToken {
    let owner = HolderId::named("owner");
    let config = TokenConfig::new("Security Token", "SEC").with_default_partitions(vec![partition(0), partition(1)]);
    let mut token = SecurityToken::new(config, owner).unwrap().with_clock(clock.clone());
    for i in 0..HOLDERS.len() {
        token.grant_role(owner, Role::Burner, holder(i)).unwrap();
    }
    token
}

fn apply(token: &mut SecurityToken, clock: &ManualClock, step: &Step) -> Result<(), tranche_core::error::LedgerError> {
    let owner = HolderId::named("owner");
    match *step {
        Step::Issue { to, amount } => token.issue(owner, holder(to), amount, &[]).map(drop),
        Step::IssueOwned {
            partition: p,
            timestamp,
            to,
            amount,
        } => token
            .issue_owned(owner, partition(p), timestamp, holder(to), amount, &[])
            .map(drop),
        Step::Transfer { from, to, amount } => token.transfer(holder(from), holder(to), amount).map(drop),
        Step::TransferByPartition {
            from,
            partition: p,
            to,
            amount,
        } => token
            .transfer_by_partition(holder(from), partition(p), holder(to), amount, &[])
            .map(drop),
        Step::Convert {
            holder: h,
            partition: p,
            target,
            amount,
        } => token
            .operator_transfer_by_partition(
                holder(h),
                partition(p),
                holder(h),
                holder(h),
                amount,
                &partition(target).change_data(),
                &[],
            )
            .map(drop),
        Step::Redeem { holder: h, amount } => token.redeem(holder(h), amount, &[]).map(drop),
        Step::Tick(seconds) => {
            clock.advance(seconds);
            Ok(())
        }
    }
}

fn check_books(token: &SecurityToken) -> Result<(), TestCaseError> {
    let verified = token.verify_invariants();
    prop_assert!(verified.is_ok(), "{:?}", verified);

    let mut supply: Amount = 0;
    for i in 0..HOLDERS.len() {
        let h = holder(i);
        let balance = token.balance_of(&h);
        supply += balance;

        let by_partition: Amount = token
            .partitions_of(&h)
            .iter()
            .map(|p| token.balance_of_by_partition(p, &h))
            .sum();
        prop_assert_eq!(by_partition, balance);

        let slices = token.describe_ownership(&h, balance).unwrap();
        prop_assert_eq!(slices.iter().map(|s| s.amount).sum::<Amount>(), balance);
        prop_assert!(slices.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        prop_assert!(slices.iter().all(|s| s.amount > 0));
    }
    prop_assert_eq!(supply, token.total_supply());

    let by_partition: Amount = PARTITIONS
        .iter()
        .map(|label| token.total_supply_by_partition(&Partition::label(label)))
        .sum();
    prop_assert_eq!(by_partition, token.total_supply());
    Ok(())
}

proptest! {
    /// Partition balances, lots and supplies agree after every step
    #[test]
    fn books_agree_after_every_step(steps in prop::collection::vec(step_strategy(), 1..60)) {
        let clock = ManualClock::new(1_000);
        let mut token = build_token(&clock);

        for step in &steps {
            let before = token.sequence();
            match apply(&mut token, &clock, step) {
                Ok(()) => {}
                Err(e) => {
                    prop_assert!(!e.is_invariant_violation(), "{:?} broke the ledger: {}", step, e);
                    prop_assert_eq!(token.sequence(), before);
                }
            }
            check_books(&token)?;
        }
    }
}
