use crate::command::{AccessIntent, Command, Resource};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tranche_core::id::HolderId;

/// A command together with the account submitting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub caller: HolderId,
    pub command: Command,
}

impl Submission {
    pub fn new(caller: HolderId, command: Command) -> Self {
        Self { caller, command }
    }

    /// Resources touched, with `Write` winning over `Read` for duplicates
    pub fn access_map(&self) -> HashMap<Resource, AccessIntent> {
        let mut access = HashMap::new();
        for (resource, intent) in self.command.footprint(&self.caller) {
            let entry = access.entry(resource).or_insert(intent);
            if intent == AccessIntent::Write {
                *entry = AccessIntent::Write;
            }
        }
        access
    }
}

/// Outcome of a conflict check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictResult {
    /// The submission writes nothing
    ReadOnly,
    /// No overlap with any other submission
    NoConflict,
    /// Indices of the conflicting submissions
    Conflict(Vec<usize>),
}

/// Trait for command conflict checking
pub trait ConflictChecker {
    /// Check `submission` against `others`
    fn check_conflicts(&self, submission: &Submission, others: &[Submission]) -> ConflictResult;

    /// Check if a submission is read-only
    fn is_read_only(&self, submission: &Submission) -> bool {
        submission
            .access_map()
            .values()
            .all(|intent| *intent == AccessIntent::Read)
    }

    /// Extract resources with write intent
    fn extract_write_resources(&self, submission: &Submission) -> HashSet<Resource> {
        submission
            .access_map()
            .into_iter()
            .filter(|(_, intent)| *intent == AccessIntent::Write)
            .map(|(resource, _)| resource)
            .collect()
    }
}

/// Two submissions conflict when either writes a resource the other touches
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicConflictChecker;

impl BasicConflictChecker {
    pub fn new() -> Self {
        Self
    }

    fn conflicts(&self, a: &Submission, b: &Submission) -> bool {
        let a_access = a.access_map();
        let b_access = b.access_map();
        a_access.iter().any(|(resource, intent)| match b_access.get(resource) {
            Some(other) => *intent == AccessIntent::Write || *other == AccessIntent::Write,
            None => false,
        })
    }
}

impl ConflictChecker for BasicConflictChecker {
    fn check_conflicts(&self, submission: &Submission, others: &[Submission]) -> ConflictResult {
        if self.is_read_only(submission) {
            return ConflictResult::ReadOnly;
        }

        let conflicts: Vec<usize> = others
            .iter()
            .enumerate()
            .filter(|(_, other)| self.conflicts(submission, other))
            .map(|(i, _)| i)
            .collect();

        if conflicts.is_empty() {
            ConflictResult::NoConflict
        } else {
            ConflictResult::Conflict(conflicts)
        }
    }
}

/// Group `submissions` into batches of mutually non-conflicting commands.
///
/// Returns indices into `submissions`. A submission lands in the batch after
/// the latest batch holding an earlier submission it conflicts with, so
/// conflicting commands keep their submission order. Within a batch the
/// indices are ascending, and the token-holder registry follows that order.
pub fn plan_batches<C: ConflictChecker>(checker: &C, submissions: &[Submission]) -> Vec<Vec<usize>> {
    let mut batch_of: Vec<usize> = Vec::with_capacity(submissions.len());
    let mut batches: Vec<Vec<usize>> = Vec::new();

    for (i, submission) in submissions.iter().enumerate() {
        let batch = match checker.check_conflicts(submission, &submissions[..i]) {
            ConflictResult::Conflict(earlier) => earlier
                .iter()
                .map(|j| batch_of[*j] + 1)
                .max()
                .unwrap_or(0),
            ConflictResult::ReadOnly | ConflictResult::NoConflict => 0,
        };

        if batch == batches.len() {
            batches.push(Vec::new());
        }
        batches[batch].push(i);
        batch_of.push(batch);
    }

    log::debug!(
        "planned {} submissions into {} batches",
        submissions.len(),
        batches.len()
    );
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use tranche_core::partition::Partition;

    fn transfer(from: &str, to: &str) -> Submission {
        Submission::new(
            HolderId::named(from),
            Command::Transfer {
                to: HolderId::named(to),
                amount: 1,
            },
        )
    }

    #[test]
    fn test_disjoint_transfers_do_not_conflict() {
        let checker = BasicConflictChecker::new();
        let a = transfer("alice", "bob");
        let b = transfer("carol", "dave");

        assert_eq!(checker.check_conflicts(&a, &[b]), ConflictResult::NoConflict);
    }

    #[test]
    fn test_shared_holder_conflicts() {
        let checker = BasicConflictChecker::new();
        let a = transfer("alice", "bob");
        let b = transfer("carol", "dave");
        let c = transfer("bob", "erin");

        assert_eq!(
            checker.check_conflicts(&c, &[a, b]),
            ConflictResult::Conflict(vec![0])
        );
    }

    #[test]
    fn test_settings_write_conflicts_with_everything() {
        let checker = BasicConflictChecker::new();
        let pause = Submission::new(HolderId::named("pauser"), Command::Pause);
        let a = transfer("alice", "bob");

        assert_eq!(
            checker.check_conflicts(&pause, &[a.clone()]),
            ConflictResult::Conflict(vec![0])
        );
        assert!(!checker.is_read_only(&a));
        assert!(checker
            .extract_write_resources(&pause)
            .contains(&Resource::Settings));
    }

    #[test]
    fn test_plan_batches_preserves_conflict_order() {
        let checker = BasicConflictChecker::new();
        let submissions = vec![
            transfer("alice", "bob"),
            transfer("carol", "dave"),
            transfer("bob", "erin"),
            transfer("frank", "grace"),
            transfer("erin", "alice"),
        ];

        let batches = plan_batches(&checker, &submissions);
        assert_eq!(batches, vec![vec![0, 1, 3], vec![2], vec![4]]);
    }

    #[test]
    fn test_issuance_serialises_on_supply() {
        let checker = BasicConflictChecker::new();
        let minter = HolderId::named("minter");
        let issue = |to: &str| {
            Submission::new(
                minter,
                Command::IssueByPartition {
                    partition: Partition::label("issued"),
                    to: HolderId::named(to),
                    amount: 5,
                    data: vec![],
                },
            )
        };

        let batches = plan_batches(&checker, &[issue("alice"), issue("bob")]);
        assert_eq!(batches, vec![vec![0], vec![1]]);
    }
}
