use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tranche_core::id::HolderId;

/// Transfer-eligibility gate consulted before any balance-affecting operation.
///
/// Answers must be definite and synchronous; a `false` result turns into a
/// `TransferRestricted` failure before anything is mutated.
pub trait EligibilityGate: Send {
    /// Whether `holder` may hold, receive or redeem tokens
    fn is_eligible(&self, holder: &HolderId) -> bool;

    /// Whether a transfer from `from` to `to` is allowed
    fn can_transfer(&self, from: &HolderId, to: &HolderId) -> bool {
        self.is_eligible(from) && self.is_eligible(to)
    }
}

/// Gate that allows everything
#[derive(Debug, Default, Clone, Copy)]
pub struct Unrestricted;

impl EligibilityGate for Unrestricted {
    fn is_eligible(&self, _holder: &HolderId) -> bool {
        true
    }
}

/// Allow-list gate. Clones share the same list, so an issuer can keep a
/// handle and edit the list after handing the gate to a token.
#[derive(Debug, Default, Clone)]
pub struct AllowList {
    allowed: Arc<RwLock<HashSet<HolderId>>>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_holders<I: IntoIterator<Item = HolderId>>(holders: I) -> Self {
        let list = Self::new();
        for holder in holders {
            list.add(holder);
        }
        list
    }

    /// Returns false if the holder was already listed
    pub fn add(&self, holder: HolderId) -> bool {
        match self.allowed.write() {
            Ok(mut allowed) => {
                let added = allowed.insert(holder);
                if added {
                    log::info!("allow-list: added {}", holder);
                }
                added
            }
            Err(e) => {
                log::error!("allow-list lock poisoned: {}", e);
                false
            }
        }
    }

    /// Returns false if the holder was not listed
    pub fn remove(&self, holder: &HolderId) -> bool {
        match self.allowed.write() {
            Ok(mut allowed) => {
                let removed = allowed.remove(holder);
                if removed {
                    log::info!("allow-list: removed {}", holder);
                }
                removed
            }
            Err(e) => {
                log::error!("allow-list lock poisoned: {}", e);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.allowed.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EligibilityGate for AllowList {
    fn is_eligible(&self, holder: &HolderId) -> bool {
        // A poisoned list denies everyone
        self.allowed
            .read()
            .map(|allowed| allowed.contains(holder))
            .unwrap_or(false)
    }
}
