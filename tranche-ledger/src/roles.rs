use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tranche_core::error::{AuthorizationError, Result};
use tranche_core::id::HolderId;

/// Capabilities that can be granted to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Grants and revokes roles, sets default partitions
    Admin,
    /// Issues new tokens
    Minter,
    /// Redeems (burns) tokens
    Burner,
    /// Forces transfers and redemptions, attaches documents
    Controller,
    /// Pauses and unpauses holder transfers
    Pauser,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "ADMIN_ROLE",
            Role::Minter => "MINTER_ROLE",
            Role::Burner => "BURNER_ROLE",
            Role::Controller => "CONTROLLER_ROLE",
            Role::Pauser => "PAUSER_ROLE",
        };
        f.write_str(name)
    }
}

/// Permission lookup consulted by the ledger before privileged operations
pub trait RoleCheck {
    fn has_role(&self, role: Role, account: &HolderId) -> bool;

    /// Fail with `MissingRole` unless `account` holds `role`
    fn require_role(&self, role: Role, account: &HolderId) -> Result<()> {
        if self.has_role(role, account) {
            Ok(())
        } else {
            Err(AuthorizationError::MissingRole {
                role: role.to_string(),
                account: *account,
            }
            .into())
        }
    }
}

/// Capability table: account → set of roles
#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    grants: HashMap<HolderId, HashSet<Role>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role`; returns false if the account already held it
    pub fn grant(&mut self, role: Role, account: HolderId) -> bool {
        self.grants.entry(account).or_default().insert(role)
    }

    /// Revoke `role`; returns false if the account did not hold it
    pub fn revoke(&mut self, role: Role, account: &HolderId) -> bool {
        match self.grants.get_mut(account) {
            Some(roles) => {
                let removed = roles.remove(&role);
                if roles.is_empty() {
                    self.grants.remove(account);
                }
                removed
            }
            None => false,
        }
    }
}

impl RoleCheck for RoleTable {
    fn has_role(&self, role: Role, account: &HolderId) -> bool {
        self.grants
            .get(account)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }
}
